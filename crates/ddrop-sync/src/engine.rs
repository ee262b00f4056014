//! Shared pieces of the send and pickup pipelines: options, observers,
//! cancellation.

use std::time::Duration;

use ddrop_chunks::SelectionLimits;
use ddrop_core::config::DropConfig;
use ddrop_core::types::{ReceivePhase, SendPhase};
use ddrop_core::{BurnSchedule, DropError, DropResult};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Progress callback type (bytes_done, bytes_total, message)
pub type ProgressFn = Box<dyn Fn(u64, u64, &str) + Send + Sync>;

/// State transition callback
pub type PhaseFn<P> = Box<dyn Fn(P) + Send + Sync>;

/// Observers and cancellation for one run of a pipeline
pub struct Hooks<'a, P> {
    pub on_phase: Option<&'a PhaseFn<P>>,
    pub progress: Option<&'a ProgressFn>,
    /// Honoured up to the manifest upload; after that a drop runs to completion.
    pub cancel: Option<CancellationToken>,
}

impl<P> Default for Hooks<'_, P> {
    fn default() -> Self {
        Self {
            on_phase: None,
            progress: None,
            cancel: None,
        }
    }
}

impl<P: std::fmt::Debug + Copy> Hooks<'_, P> {
    pub(crate) fn phase(&self, phase: P) {
        debug!(?phase, "phase");
        if let Some(cb) = self.on_phase {
            cb(phase);
        }
    }

    pub(crate) fn progress(&self, done: u64, total: u64, msg: &str) {
        if let Some(cb) = self.progress {
            cb(done, total, msg);
        }
    }

    pub(crate) fn check_cancelled(&self) -> DropResult<()> {
        match &self.cancel {
            Some(token) if token.is_cancelled() => Err(DropError::Cancelled),
            _ => Ok(()),
        }
    }
}

/// Run CPU-heavy chunk work (key derivation, AES-GCM, hashing) on the
/// blocking pool so the async workers stay responsive.
pub(crate) async fn run_blocking<T, F>(f: F) -> DropResult<T>
where
    F: FnOnce() -> DropResult<T> + Send + 'static,
    T: Send + 'static,
{
    match tokio::task::spawn_blocking(f).await {
        Ok(result) => result,
        Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
        Err(_) => Err(DropError::Cancelled),
    }
}

pub type SendHooks<'a> = Hooks<'a, SendPhase>;
pub type ReceiveHooks<'a> = Hooks<'a, ReceivePhase>;

/// Knobs for `send_drop`
#[derive(Debug, Clone)]
pub struct SendOptions {
    pub chunk_size: usize,
    /// Chunk uploads in flight at once
    pub concurrency: usize,
    pub pbkdf2_iterations: u32,
    pub limits: SelectionLimits,
    /// Drop lifetime requested from the backend; `None` leaves it to the backend
    pub burn_schedule: Option<BurnSchedule>,
    pub burn_after_read: bool,
    /// Record a whole-payload SHA-256 in the manifest
    pub payload_digest: bool,
}

impl Default for SendOptions {
    fn default() -> Self {
        Self::from_config(&DropConfig::default())
    }
}

impl SendOptions {
    pub fn from_config(cfg: &DropConfig) -> Self {
        Self {
            chunk_size: cfg.transfer.chunk_size,
            concurrency: cfg.transfer.concurrency.max(1),
            pbkdf2_iterations: cfg.crypto.pbkdf2_iterations,
            limits: SelectionLimits::from(&cfg.limits),
            burn_schedule: None,
            burn_after_read: false,
            payload_digest: true,
        }
    }
}

/// Knobs for the pickup pipeline
#[derive(Debug, Clone)]
pub struct ReceiveOptions {
    /// Chunk downloads in flight at once; results are still appended in order
    pub concurrency: usize,
    /// Used only when the manifest does not state its own iteration count
    pub pbkdf2_iterations: u32,
    pub burn_countdown: Duration,
    pub not_ready_retries: u32,
    pub not_ready_delay: Duration,
    /// Unpack ZIP bundles after download (and remove the archive)
    pub extract: bool,
}

impl Default for ReceiveOptions {
    fn default() -> Self {
        Self::from_config(&DropConfig::default())
    }
}

impl ReceiveOptions {
    pub fn from_config(cfg: &DropConfig) -> Self {
        Self {
            concurrency: cfg.transfer.concurrency.max(1),
            pbkdf2_iterations: cfg.crypto.pbkdf2_iterations,
            burn_countdown: Duration::from_secs(cfg.pickup.burn_countdown_secs),
            not_ready_retries: cfg.pickup.not_ready_retries,
            not_ready_delay: Duration::from_millis(cfg.pickup.not_ready_delay_ms),
            extract: false,
        }
    }
}
