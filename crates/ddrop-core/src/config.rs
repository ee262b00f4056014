use serde::{Deserialize, Serialize};

use crate::error::{DropError, DropResult};
use crate::DEFAULT_CHUNK_SIZE;

const GIB: u64 = 1024 * 1024 * 1024;

/// PBKDF2 iteration floor; configs asking for fewer are rejected
pub const MIN_PBKDF2_ITERATIONS: u32 = 10_000;

/// Top-level client configuration (loaded from ddrop.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DropConfig {
    pub log: LogConfig,
    pub backend: BackendConfig,
    pub transfer: TransferConfig,
    pub limits: LimitsConfig,
    pub crypto: CryptoConfig,
    pub pickup: PickupConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Log level (default: info)
    pub level: String,
    /// Log format: "json" or "text"
    pub format: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Base URL of the drop API (presign, finalize, resolve, burn)
    pub api_base_url: String,
    /// Per-request timeout for API calls and presigned transfers
    pub timeout_secs: u64,
    /// Refuse plaintext HTTP API endpoints
    pub enforce_tls: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferConfig {
    /// Fixed chunk size in bytes (default: 1 MiB)
    pub chunk_size: usize,
    /// Chunk transfers in flight at once (1 = strictly sequential)
    pub concurrency: usize,
}

/// Selection limits checked before anything is read or sent
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    pub max_files: usize,
    /// Per-file ceiling in bytes (default: 2 GiB)
    pub max_file_size: u64,
    /// Whole-selection ceiling in bytes (default: 5 GiB)
    pub max_total_size: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CryptoConfig {
    /// PBKDF2-SHA256 iterations for per-chunk key derivation (default: 10000)
    pub pbkdf2_iterations: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PickupConfig {
    /// Delay between a completed burn-after-read download and the burn request
    pub burn_countdown_secs: u64,
    /// How often a 409 "not ready" drop is re-polled before giving up
    pub not_ready_retries: u32,
    /// Delay between "not ready" polls
    pub not_ready_delay_ms: u64,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

impl BackendConfig {
    /// Refuse (or warn about) a plaintext API endpoint.
    ///
    /// If `enforce_tls` is true and the URL uses HTTP, this returns an error.
    /// Otherwise, a warning is logged for non-HTTPS endpoints.
    pub fn check_endpoint(&self) -> DropResult<()> {
        let url = &self.api_base_url;
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(DropError::Config(format!(
                "backend.api_base_url must start with http:// or https://, got {url}"
            )));
        }
        if url.starts_with("http://") {
            if self.enforce_tls {
                return Err(DropError::Config(format!(
                    "backend.api_base_url uses plaintext HTTP ({url}), but enforce_tls is enabled. \
                     Use an HTTPS endpoint or set backend.enforce_tls = false for local development."
                )));
            }
            tracing::warn!(
                endpoint = %url,
                "drop API uses plaintext HTTP. Set backend.enforce_tls = true and use HTTPS in production."
            );
        }
        Ok(())
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:8080".into(),
            timeout_secs: 30,
            enforce_tls: false,
        }
    }
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            concurrency: 1,
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_files: 5,
            max_file_size: 2 * GIB,
            max_total_size: 5 * GIB,
        }
    }
}

impl Default for CryptoConfig {
    fn default() -> Self {
        Self {
            pbkdf2_iterations: MIN_PBKDF2_ITERATIONS,
        }
    }
}

impl Default for PickupConfig {
    fn default() -> Self {
        Self {
            burn_countdown_secs: 30,
            not_ready_retries: 3,
            not_ready_delay_ms: 2000,
        }
    }
}

impl DropConfig {
    pub fn from_toml(s: &str) -> DropResult<Self> {
        let config: DropConfig =
            toml::from_str(s).map_err(|e| DropError::Config(format!("parsing config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> DropResult<()> {
        if self.transfer.chunk_size == 0 {
            return Err(DropError::Config("transfer.chunk_size must be > 0".into()));
        }
        if self.transfer.concurrency == 0 {
            return Err(DropError::Config("transfer.concurrency must be >= 1".into()));
        }
        if self.crypto.pbkdf2_iterations < MIN_PBKDF2_ITERATIONS {
            return Err(DropError::Config(format!(
                "crypto.pbkdf2_iterations must be >= {MIN_PBKDF2_ITERATIONS}"
            )));
        }
        if self.limits.max_files == 0 {
            return Err(DropError::Config("limits.max_files must be >= 1".into()));
        }
        self.backend.check_endpoint()?;
        Ok(())
    }
}
