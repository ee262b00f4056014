//! SHA-256 integrity digests
//!
//! Every chunk is hashed on its own (never a running hash over the file) so a
//! single chunk can be verified without touching the rest of the drop.
//! Digests travel as 64 lowercase hex chars.

use std::io::Read;
use std::path::Path;

use ddrop_core::{DropError, DropResult, ObjectRef};
use sha2::{Digest as _, Sha256};

/// A SHA-256 digest (32 bytes)
pub type Digest = [u8; 32];

/// Hash a byte slice in memory.
pub fn hash_bytes(data: &[u8]) -> Digest {
    Sha256::digest(data).into()
}

/// Format a digest as a lowercase hex string (64 chars)
pub fn hash_to_hex(digest: &Digest) -> String {
    hex::encode(digest)
}

/// Hash a byte slice straight to hex, the form the manifest stores.
pub fn hash_hex(data: &[u8]) -> String {
    hash_to_hex(&hash_bytes(data))
}

/// Stream a reader through SHA-256 without buffering it whole.
pub fn hash_reader<R: Read>(mut reader: R) -> DropResult<Digest> {
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; 64 * 1024];

    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(DropError::io("reading for hash", e)),
        };
        hasher.update(&buf[..n]);
    }

    Ok(hasher.finalize().into())
}

/// Hash a whole file from disk (streaming).
pub fn hash_file(path: &Path) -> DropResult<Digest> {
    let file = std::fs::File::open(path)
        .map_err(|e| DropError::io(format!("opening {} for hashing", path.display()), e))?;
    hash_reader(file)
}

/// Incremental SHA-256 for data that arrives piecewise (e.g. chunk by chunk)
#[derive(Clone, Default)]
pub struct StreamHasher(Sha256);

impl StreamHasher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, data: &[u8]) {
        self.0.update(data);
    }

    pub fn finalize_hex(self) -> String {
        hex::encode(self.0.finalize())
    }
}

/// Check downloaded bytes against the digest recorded for them.
pub fn verify_chunk(target: ObjectRef, data: &[u8], expected_hex: &str) -> DropResult<()> {
    let actual = hash_hex(data);
    if actual.eq_ignore_ascii_case(expected_hex.trim()) {
        Ok(())
    } else {
        Err(DropError::integrity(
            target,
            format!("sha256 mismatch: expected {expected_hex}, got {actual}"),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn known_vector() {
        // sha256("abc")
        assert_eq!(
            hash_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn reader_matches_slice() {
        let data: Vec<u8> = (0u32..200_000).map(|i| (i % 251) as u8).collect();
        assert_eq!(hash_reader(&data[..]).unwrap(), hash_bytes(&data));
    }

    #[test]
    fn verify_accepts_uppercase_hex() {
        let hex = hash_hex(b"chunk").to_uppercase();
        verify_chunk(ObjectRef::Chunk(0), b"chunk", &hex).unwrap();
    }

    #[test]
    fn verify_flags_single_bit_flip() {
        let data = vec![0u8; 1024];
        let expected = hash_hex(&data);
        let mut tampered = data.clone();
        tampered[512] ^= 0x01;

        let err = verify_chunk(ObjectRef::Chunk(4), &tampered, &expected).unwrap_err();
        match err {
            DropError::IntegrityViolation { target, .. } => assert_eq!(target, ObjectRef::Chunk(4)),
            other => panic!("expected IntegrityViolation, got {other:?}"),
        }
    }

    #[test]
    fn stream_hasher_matches_one_shot() {
        let data: Vec<u8> = (0u32..10_000).map(|i| (i % 7) as u8).collect();
        let mut h = StreamHasher::new();
        for piece in data.chunks(333) {
            h.update(piece);
        }
        assert_eq!(h.finalize_hex(), hash_hex(&data));
    }

    proptest! {
        #[test]
        fn hash_is_deterministic(data in proptest::collection::vec(any::<u8>(), 0..=4096)) {
            let h1 = hash_hex(&data);
            let h2 = hash_hex(&data);
            prop_assert_eq!(h1.len(), 64);
            prop_assert!(h1.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b)));
            prop_assert_eq!(h1, h2, "SHA-256 must be deterministic for same input");
        }
    }
}
