//! Request and response bodies of the backend collaborator.
//!
//! Field names follow the backend's JSON exactly; do not rename.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::manifest::Manifest;
use crate::types::{FileEntry, ShortCode};

/// Header names and values a presigned PUT must carry verbatim.
pub type FieldMap = BTreeMap<String, String>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkInfo {
    pub hash: String,
    pub size: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresignMeta {
    pub size: u64,
    pub files: Vec<FileEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub burn_after_secs: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub burn_after_read: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresignRequest {
    pub chunks: Vec<ChunkInfo>,
    pub meta: PresignMeta,
}

/// Upload target for one chunk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresignedChunk {
    pub hash: String,
    pub url: String,
    pub key: String,
    pub size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fields: Option<FieldMap>,
}

/// Upload target for the manifest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresignedObject {
    pub url: String,
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fields: Option<FieldMap>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresignResponse {
    pub drop_id: String,
    pub presigned: Vec<PresignedChunk>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manifest_presigned: Option<PresignedObject>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalizeRequest {
    pub drop_id: String,
    pub manifest_s3_key: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalizeResponse {
    pub drop_id: String,
    pub short_code: ShortCode,
    pub manifest_s3_key: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShortCodeResponse {
    pub drop_id: String,
    pub short_code: ShortCode,
    pub status: String,
}

/// Download target for one chunk, as listed by `get_drop`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkDownload {
    pub key: String,
    pub url: String,
    pub size: u64,
    pub hash: String,
    #[serde(default)]
    pub iv: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DropResponse {
    pub drop_id: String,
    pub status: String,
    pub short_code: ShortCode,
    pub manifest: Manifest,
    pub chunks: Vec<ChunkDownload>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PickupRequest {
    /// Client wall clock, milliseconds since the Unix epoch
    pub client_time: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent_redacted: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BurnRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BurnResponse {
    pub drop_id: String,
    pub status: String,
    #[serde(default)]
    pub message: String,
}
