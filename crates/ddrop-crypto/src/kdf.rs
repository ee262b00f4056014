//! Key derivation: drop master + salt + chunk index → per-chunk key

use ddrop_core::config::MIN_PBKDF2_ITERATIONS;
use ddrop_core::{DropError, DropResult};
use pbkdf2::pbkdf2_hmac;
use sha2::Sha256;
use zeroize::Zeroize;

use crate::KEY_SIZE;

/// The 256-bit master key material of one drop.
///
/// Used only as PBKDF2 password input, never as a cipher key directly.
/// Zeroized on drop to prevent secrets lingering in memory.
#[derive(Clone)]
pub struct MasterKey {
    bytes: [u8; KEY_SIZE],
}

impl MasterKey {
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }
}

impl Drop for MasterKey {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl std::fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MasterKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// AES-256 key for exactly one chunk. Zeroized on drop.
pub struct ChunkKey {
    index: u64,
    bytes: [u8; KEY_SIZE],
}

impl ChunkKey {
    /// Chunk index this key was derived for
    pub fn index(&self) -> u64 {
        self.index
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }
}

impl Drop for ChunkKey {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl std::fmt::Debug for ChunkKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChunkKey")
            .field("index", &self.index)
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// Derive the key for chunk `index`.
///
/// Chunk salt is `salt || u64_be(index)`; PBKDF2-HMAC-SHA256 with
/// `iterations` rounds yields 32 bytes. Same inputs always give the same key.
/// Iteration counts below [`MIN_PBKDF2_ITERATIONS`] are refused.
pub fn derive_chunk_key(
    master: &MasterKey,
    index: u64,
    salt: &[u8],
    iterations: u32,
) -> DropResult<ChunkKey> {
    if iterations < MIN_PBKDF2_ITERATIONS {
        return Err(DropError::Config(format!(
            "pbkdf2 iterations {iterations} below minimum {MIN_PBKDF2_ITERATIONS}"
        )));
    }

    let mut chunk_salt = Vec::with_capacity(salt.len() + 8);
    chunk_salt.extend_from_slice(salt);
    chunk_salt.extend_from_slice(&index.to_be_bytes());

    let mut bytes = [0u8; KEY_SIZE];
    pbkdf2_hmac::<Sha256>(master.as_bytes(), &chunk_salt, iterations, &mut bytes);

    Ok(ChunkKey { index, bytes })
}

#[cfg(test)]
mod tests {
    use super::*;

    const ITER: u32 = MIN_PBKDF2_ITERATIONS;

    fn master() -> MasterKey {
        MasterKey::from_bytes([42u8; KEY_SIZE])
    }

    #[test]
    fn test_derivation_deterministic() {
        let salt = [7u8; 32];
        let k1 = derive_chunk_key(&master(), 3, &salt, ITER).unwrap();
        let k2 = derive_chunk_key(&master(), 3, &salt, ITER).unwrap();
        assert_eq!(k1.as_bytes(), k2.as_bytes(), "KDF must be deterministic");
        assert_eq!(k1.index(), 3);
    }

    #[test]
    fn test_distinct_indices_give_distinct_keys() {
        let salt = [7u8; 32];
        let k0 = derive_chunk_key(&master(), 0, &salt, ITER).unwrap();
        let k1 = derive_chunk_key(&master(), 1, &salt, ITER).unwrap();
        assert_ne!(k0.as_bytes(), k1.as_bytes());
    }

    #[test]
    fn test_different_salts() {
        let k1 = derive_chunk_key(&master(), 0, &[1u8; 32], ITER).unwrap();
        let k2 = derive_chunk_key(&master(), 0, &[2u8; 32], ITER).unwrap();
        assert_ne!(k1.as_bytes(), k2.as_bytes());
    }

    #[test]
    fn test_different_masters() {
        let salt = [1u8; 32];
        let other = MasterKey::from_bytes([43u8; KEY_SIZE]);
        let k1 = derive_chunk_key(&master(), 0, &salt, ITER).unwrap();
        let k2 = derive_chunk_key(&other, 0, &salt, ITER).unwrap();
        assert_ne!(k1.as_bytes(), k2.as_bytes());
    }

    #[test]
    fn test_matches_direct_pbkdf2() {
        let salt = [9u8; 32];
        let mut expected_salt = salt.to_vec();
        expected_salt.extend_from_slice(&5u64.to_be_bytes());
        let mut expected = [0u8; KEY_SIZE];
        pbkdf2_hmac::<Sha256>(master().as_bytes(), &expected_salt, ITER, &mut expected);

        let key = derive_chunk_key(&master(), 5, &salt, ITER).unwrap();
        assert_eq!(key.as_bytes(), &expected);
    }

    #[test]
    fn test_low_iteration_count_rejected() {
        assert!(matches!(
            derive_chunk_key(&master(), 0, &[0u8; 32], 1_000),
            Err(DropError::Config(_))
        ));
    }

    #[test]
    fn test_debug_redacts() {
        let key = derive_chunk_key(&master(), 0, &[0u8; 32], ITER).unwrap();
        let dbg = format!("{key:?} {:?}", master());
        assert!(dbg.contains("REDACTED"));
        assert!(!dbg.contains("42"));
    }
}
