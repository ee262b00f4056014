//! Manifest assembly on the sender and response checks on both sides.

use chrono::Utc;
use ddrop_chunks::Bundle;
use ddrop_core::api::{DropResponse, PresignResponse, PresignedObject};
use ddrop_core::{ChunkRecord, DropError, DropResult, EncryptionMeta, Manifest, ManifestMeta};

/// What pass one learned about a chunk: enough to presign it and to
/// reproduce its ciphertext on pass two.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedChunk {
    pub index: u64,
    /// base64url nonce
    pub iv: String,
    /// hex SHA-256 of the ciphertext
    pub hash: String,
    /// ciphertext length
    pub size: u64,
}

/// Reject a presign response that does not line up with the request:
/// one target per chunk, in order, plus a manifest target.
pub fn check_presign<'a>(
    resp: &'a PresignResponse,
    planned: &[PlannedChunk],
) -> DropResult<&'a PresignedObject> {
    if resp.presigned.len() != planned.len() {
        return Err(DropError::InvalidResponse(format!(
            "presign returned {} targets for {} chunks",
            resp.presigned.len(),
            planned.len()
        )));
    }
    if let Some((i, _)) = resp
        .presigned
        .iter()
        .zip(planned)
        .enumerate()
        .find(|(_, (target, plan))| !target.hash.eq_ignore_ascii_case(&plan.hash))
    {
        return Err(DropError::InvalidResponse(format!(
            "presign target {i} is for a different chunk"
        )));
    }
    resp.manifest_presigned
        .as_ref()
        .ok_or_else(|| DropError::InvalidResponse("presign response has no manifest target".into()))
}

/// Build the manifest from the bundle and the confirmed chunk tuples.
pub fn build_manifest(
    bundle: &Bundle,
    chunks: Vec<ChunkRecord>,
    burn_after_read: bool,
    encryption: EncryptionMeta,
    payload_sha256: Option<String>,
) -> Manifest {
    Manifest {
        meta: ManifestMeta {
            filename: bundle.name().to_string(),
            size: bundle.size(),
            created_at: Utc::now(),
            original_files: Some(bundle.original_files().to_vec()),
            is_zip: Some(bundle.is_zip()),
        },
        chunks,
        burn_after_read: Some(burn_after_read),
        encryption: Some(encryption),
        payload_sha256,
    }
}

/// The download list must name the same objects as the manifest, in the
/// same order. The manifest stays authoritative for hashes and nonces.
pub fn check_drop(drop: &DropResponse) -> DropResult<()> {
    let manifest = &drop.manifest;
    if drop.chunks.len() != manifest.chunks.len() {
        return Err(DropError::InvalidResponse(format!(
            "drop lists {} download URLs for {} manifest chunks",
            drop.chunks.len(),
            manifest.chunks.len()
        )));
    }
    for (i, (dl, rec)) in drop.chunks.iter().zip(&manifest.chunks).enumerate() {
        if dl.key != rec.key {
            return Err(DropError::InvalidResponse(format!(
                "download URL {i} is for {}, manifest expects {}",
                dl.key, rec.key
            )));
        }
    }
    Ok(())
}
