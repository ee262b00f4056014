//! Burn-after-read countdown and explicit burns.

use std::sync::Arc;
use std::time::Duration;

use ddrop_core::api::{BurnRequest, BurnResponse};
use ddrop_core::types::ReceivePhase;
use ddrop_core::{DropError, DropResult};
use ddrop_transfer::DropBackend;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::engine::ReceiveHooks;

/// Reason sent with countdown burns
pub const BURN_AFTER_READ_REASON: &str = "burn_after_read";

/// A pending burn, running in the background.
///
/// Dropping the handle does not stop the countdown; call `cancel`.
#[derive(Debug)]
pub struct BurnCountdown {
    drop_id: String,
    delay: Duration,
    cancel: CancellationToken,
    handle: JoinHandle<DropResult<Option<BurnResponse>>>,
}

impl BurnCountdown {
    pub fn drop_id(&self) -> &str {
        &self.drop_id
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Stop the countdown before it fires. No effect once the burn request
    /// has been sent.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Wait for the countdown. `None` means it was cancelled first.
    pub async fn wait(self) -> DropResult<Option<BurnResponse>> {
        match self.handle.await {
            Ok(result) => result,
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            Err(_) => Ok(None),
        }
    }
}

/// Start a countdown that burns `drop_id` after `delay`.
pub fn schedule_burn(backend: Arc<dyn DropBackend>, drop_id: &str, delay: Duration) -> BurnCountdown {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    let id = drop_id.to_string();

    let handle = tokio::spawn(async move {
        tokio::select! {
            _ = token.cancelled() => {
                info!(drop_id = %id, "burn countdown cancelled");
                Ok(None)
            }
            _ = tokio::time::sleep(delay) => {
                burn_now(backend.as_ref(), &id, Some(BURN_AFTER_READ_REASON)).await.map(Some)
            }
        }
    });

    BurnCountdown {
        drop_id: drop_id.to_string(),
        delay,
        cancel,
        handle,
    }
}

/// Ask the backend to burn a drop immediately.
pub async fn burn_now(
    backend: &dyn DropBackend,
    drop_id: &str,
    reason: Option<&str>,
) -> DropResult<BurnResponse> {
    let resp = backend
        .burn_drop(
            drop_id,
            &BurnRequest {
                reason: reason.map(str::to_string),
            },
        )
        .await
        .inspect_err(|e| warn!(drop_id, error = %e, "burn request failed"))?;
    if resp.drop_id != drop_id {
        return Err(DropError::InvalidResponse(format!(
            "burn answered for drop {}, expected {drop_id}",
            resp.drop_id
        )));
    }
    info!(drop_id, status = %resp.status, reason = reason.unwrap_or("-"), "drop burned");
    Ok(resp)
}

/// Wait out a countdown and report `Burned` once the backend accepted it.
pub async fn complete_burn(
    countdown: BurnCountdown,
    hooks: &ReceiveHooks<'_>,
) -> DropResult<Option<BurnResponse>> {
    let resp = countdown.wait().await?;
    if resp.is_some() {
        hooks.phase(ReceivePhase::Burned);
    }
    Ok(resp)
}
