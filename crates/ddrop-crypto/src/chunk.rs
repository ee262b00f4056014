//! Per-chunk AES-256-GCM encryption/decryption
//!
//! Nonce layout (96 bits):
//! ```text
//! [8 bytes: chunk index, big-endian][4 bytes: random]
//! ```
//! Ciphertext is `plaintext || 16-byte tag`; the nonce is not prepended, it
//! travels in the manifest as unpadded base64url.
//!
//! The index prefix binds each nonce to its position. Decryption refuses a
//! nonce whose prefix disagrees with the expected index, so a chunk record
//! moved to another manifest slot is rejected before the cipher runs.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use ddrop_core::{DropError, DropResult, ObjectRef};
use rand::rngs::OsRng;
use rand::RngCore;

use crate::kdf::ChunkKey;
use crate::{NONCE_SIZE, TAG_SIZE};

/// The 12-byte nonce used for one chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkIv([u8; NONCE_SIZE]);

impl ChunkIv {
    /// Fresh nonce for chunk `index`: index prefix plus 4 random bytes.
    pub fn generate(index: u64) -> DropResult<Self> {
        let mut bytes = [0u8; NONCE_SIZE];
        bytes[..8].copy_from_slice(&index.to_be_bytes());
        OsRng
            .try_fill_bytes(&mut bytes[8..])
            .map_err(|e| DropError::CryptoUnavailable(format!("OS RNG: {e}")))?;
        Ok(Self(bytes))
    }

    pub fn from_bytes(bytes: [u8; NONCE_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; NONCE_SIZE] {
        &self.0
    }

    /// The chunk index encoded in the prefix
    pub fn index(&self) -> u64 {
        let mut prefix = [0u8; 8];
        prefix.copy_from_slice(&self.0[..8]);
        u64::from_be_bytes(prefix)
    }

    pub fn to_base64(&self) -> String {
        URL_SAFE_NO_PAD.encode(self.0)
    }

    /// Parse the manifest form. `target` names the chunk in errors.
    pub fn from_base64(target: ObjectRef, s: &str) -> DropResult<Self> {
        let raw = URL_SAFE_NO_PAD
            .decode(s.trim())
            .map_err(|e| DropError::integrity(target, format!("malformed iv: {e}")))?;
        let bytes: [u8; NONCE_SIZE] = raw.try_into().map_err(|v: Vec<u8>| {
            DropError::integrity(
                target,
                format!("iv is {} bytes, expected {NONCE_SIZE}", v.len()),
            )
        })?;
        Ok(Self(bytes))
    }
}

/// Encrypt one chunk.
///
/// Deterministic for a given key and iv, which lets the sender re-encrypt a
/// chunk on a second pass and get byte-identical ciphertext.
pub fn encrypt_chunk(key: &ChunkKey, iv: &ChunkIv, plaintext: &[u8]) -> DropResult<Vec<u8>> {
    let target = ObjectRef::Chunk(key.index());
    if iv.index() != key.index() {
        return Err(DropError::integrity(
            target,
            format!("iv prefix {} does not match chunk index", iv.index()),
        ));
    }

    let cipher = Aes256Gcm::new(key.as_bytes().into());
    cipher
        .encrypt(Nonce::from_slice(iv.as_bytes()), plaintext)
        .map_err(|e| DropError::CryptoUnavailable(format!("chunk encryption failed: {e}")))
}

/// Decrypt one chunk and authenticate it.
///
/// Never returns plaintext unless the tag verifies.
pub fn decrypt_chunk(key: &ChunkKey, iv: &ChunkIv, ciphertext: &[u8]) -> DropResult<Vec<u8>> {
    let target = ObjectRef::Chunk(key.index());
    if iv.index() != key.index() {
        return Err(DropError::integrity(
            target,
            format!(
                "iv prefix {} does not match chunk index {}",
                iv.index(),
                key.index()
            ),
        ));
    }
    if ciphertext.len() < TAG_SIZE {
        return Err(DropError::integrity(
            target,
            format!("ciphertext too short: {} bytes", ciphertext.len()),
        ));
    }

    let cipher = Aes256Gcm::new(key.as_bytes().into());
    cipher
        .decrypt(Nonce::from_slice(iv.as_bytes()), ciphertext)
        .map_err(|_| DropError::integrity(target, "authentication tag mismatch"))
}
