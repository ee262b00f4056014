//! Drop manifest: the single persisted record of a drop's chunk layout
//!
//! Wire format (JSON):
//! ```text
//! {
//!   "meta": { "filename", "size", "created_at", "original_files"?, "is_zip"? },
//!   "chunks": [ { "key", "size", "hash", "iv" } ],
//!   "burn_after_read"?,
//!   "encryption"?, "payload_sha256"?
//! }
//! ```
//!
//! The manifest never carries the salt or any key: the receiver gets those
//! out-of-band. `iv` is `null` only in legacy plaintext drops.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{DropError, DropResult};
use crate::types::FileEntry;

/// One chunk as actually uploaded
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkRecord {
    /// Object store key
    pub key: String,
    /// Size of the transmitted (encrypted) bytes
    pub size: u64,
    /// SHA-256 of the transmitted bytes (lowercase hex)
    pub hash: String,
    /// 12-byte AES-GCM nonce, unpadded base64url
    pub iv: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestMeta {
    /// Display name: the single file's name, or the bundle name
    pub filename: String,
    /// Payload size in bytes (before encryption)
    pub size: u64,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_files: Option<Vec<FileEntry>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_zip: Option<bool>,
}

/// Public description of the chunk cipher. Deliberately has no salt field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptionMeta {
    pub alg: String,
    pub kdf: String,
    pub iterations: u32,
    pub chunk_size: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub meta: ManifestMeta,
    pub chunks: Vec<ChunkRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub burn_after_read: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encryption: Option<EncryptionMeta>,
    /// SHA-256 of the whole plaintext payload, checked after assembly
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload_sha256: Option<String>,
}

impl Manifest {
    pub fn is_zip(&self) -> bool {
        self.meta.is_zip.unwrap_or(false)
    }

    pub fn burn_after_read(&self) -> bool {
        self.burn_after_read.unwrap_or(false)
    }

    /// Original files for display: the embedded list for bundles, otherwise
    /// the single payload file.
    pub fn display_files(&self) -> Vec<FileEntry> {
        match &self.meta.original_files {
            Some(files) if !files.is_empty() => files.clone(),
            _ => vec![FileEntry {
                name: self.meta.filename.clone(),
                size: self.meta.size,
            }],
        }
    }

    /// Sum of transmitted chunk sizes
    pub fn transmitted_size(&self) -> u64 {
        self.chunks.iter().map(|c| c.size).sum()
    }

    pub fn to_bytes(&self) -> DropResult<Vec<u8>> {
        serde_json::to_vec(self)
            .map_err(|e| DropError::InvalidResponse(format!("manifest serialization: {e}")))
    }

    pub fn from_bytes(data: &[u8]) -> DropResult<Self> {
        serde_json::from_slice(data)
            .map_err(|e| DropError::InvalidResponse(format!("manifest deserialization: {e}")))
    }
}
