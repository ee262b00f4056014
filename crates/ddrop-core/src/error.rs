use std::fmt;

use thiserror::Error;

pub type DropResult<T> = Result<T, DropError>;

/// Which object a transfer or integrity error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectRef {
    Chunk(u64),
    Manifest,
    /// The reassembled payload as a whole
    Payload,
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ObjectRef::Chunk(i) => write!(f, "chunk {i}"),
            ObjectRef::Manifest => f.write_str("manifest"),
            ObjectRef::Payload => f.write_str("payload"),
        }
    }
}

/// HTTP status of a failed transfer; `None` when no response arrived
/// (connect failure, timeout).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpStatus(pub Option<u16>);

impl fmt::Display for HttpStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(code) => write!(f, "status {code}"),
            None => f.write_str("no response"),
        }
    }
}

#[derive(Debug, Error)]
pub enum DropError {
    // ── selection validation ──────────────────────────────────────────────
    #[error("no files selected")]
    NoFiles,

    #[error("too many files: {count} selected, maximum {max}")]
    TooManyFiles { count: usize, max: usize },

    #[error("file \"{name}\" is {size} bytes, exceeding the single-file limit of {max} bytes")]
    FileTooLarge { name: String, size: u64, max: u64 },

    #[error("selection totals {total} bytes, exceeding the limit of {max} bytes")]
    SelectionTooLarge { total: u64, max: u64 },

    #[error("duplicate file name in selection: {0}")]
    DuplicateFileName(String),

    // ── local ─────────────────────────────────────────────────────────────
    #[error("crypto provider unavailable: {0}")]
    CryptoUnavailable(String),

    #[error("I/O error ({context}): {source}")]
    IoFailure {
        context: String,
        #[source]
        source: std::io::Error,
    },

    // ── transport ─────────────────────────────────────────────────────────
    #[error("upload of {target} rejected ({status}): {body}")]
    UploadRejected {
        target: ObjectRef,
        status: HttpStatus,
        body: String,
    },

    #[error("presigned URL for {target} has expired; restart the drop")]
    PresignedUrlExpired { target: ObjectRef },

    #[error("download of {target} failed ({status})")]
    DownloadFailed { target: ObjectRef, status: HttpStatus },

    // ── integrity ─────────────────────────────────────────────────────────
    #[error("integrity violation on {target}: {detail}")]
    IntegrityViolation { target: ObjectRef, detail: String },

    // ── backend resolution ────────────────────────────────────────────────
    #[error("not found: {0}")]
    NotFound(String),

    #[error("drop not ready yet: {0}")]
    NotReady(String),

    #[error("backend request failed ({status}): {body}")]
    Backend { status: HttpStatus, body: String },

    #[error("invalid backend response: {0}")]
    InvalidResponse(String),

    // ── input ─────────────────────────────────────────────────────────────
    #[error("invalid short code {0:?}: expected 6 letters or digits")]
    InvalidShortCode(String),

    #[error("invalid drop secret: {0}")]
    InvalidSecret(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("drop cancelled before the manifest was uploaded")]
    Cancelled,
}

impl DropError {
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        DropError::IoFailure {
            context: context.into(),
            source,
        }
    }

    pub fn integrity(target: ObjectRef, detail: impl Into<String>) -> Self {
        DropError::IntegrityViolation {
            target,
            detail: detail.into(),
        }
    }

    /// Selection errors are raised before any side effect happens.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            DropError::NoFiles
                | DropError::TooManyFiles { .. }
                | DropError::FileTooLarge { .. }
                | DropError::SelectionTooLarge { .. }
                | DropError::DuplicateFileName(_)
        )
    }

    /// Transport and integrity failures leave nothing addressable; the only
    /// recovery is to run the whole drop again.
    pub fn requires_restart(&self) -> bool {
        matches!(
            self,
            DropError::UploadRejected { .. }
                | DropError::PresignedUrlExpired { .. }
                | DropError::DownloadFailed { .. }
                | DropError::IntegrityViolation { .. }
        )
    }
}
