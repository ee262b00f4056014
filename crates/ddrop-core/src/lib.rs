//! ddrop-core: shared vocabulary for the deaddrop workspace
//!
//! - `types`: drop-level values (short codes, burn schedules, file entries)
//! - `manifest`: the persisted JSON manifest a receiver reassembles from
//! - `api`: request/response bodies of the backend collaborator
//! - `config`: TOML configuration schema
//! - `error`: the error taxonomy shared by every crate

pub mod api;
pub mod config;
pub mod error;
pub mod manifest;
pub mod types;

pub use error::{DropError, DropResult, HttpStatus, ObjectRef};
pub use manifest::{ChunkRecord, EncryptionMeta, Manifest, ManifestMeta};
pub use types::{BurnSchedule, FileEntry, ShortCode};

/// Default chunk size: 1 MiB
pub const DEFAULT_CHUNK_SIZE: usize = 1024 * 1024;

/// Length of a short code in characters
pub const SHORT_CODE_LEN: usize = 6;
