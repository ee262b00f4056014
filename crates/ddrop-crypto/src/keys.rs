//! Per-drop key material and its out-of-band encoding

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use ddrop_core::{DropError, DropResult};
use rand::rngs::OsRng;
use rand::RngCore;
use secrecy::{ExposeSecret, SecretString};
use zeroize::Zeroize;

use crate::kdf::{derive_chunk_key, ChunkKey, MasterKey};
use crate::{KEY_SIZE, SALT_SIZE};

/// The public-safe per-drop salt
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Salt([u8; SALT_SIZE]);

impl Salt {
    pub fn from_bytes(bytes: [u8; SALT_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; SALT_SIZE] {
        &self.0
    }

    /// Unpadded base64url form
    pub fn to_base64(&self) -> String {
        URL_SAFE_NO_PAD.encode(self.0)
    }
}

impl std::fmt::Debug for Salt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Salt").field(&self.to_base64()).finish()
    }
}

/// Key material of one drop: master + salt, passed explicitly through the
/// pipeline. Two drops never share a `DropKeys`.
#[derive(Clone, Debug)]
pub struct DropKeys {
    master: MasterKey,
    salt: Salt,
}

impl DropKeys {
    pub fn new(master: MasterKey, salt: Salt) -> Self {
        Self { master, salt }
    }

    pub fn master(&self) -> &MasterKey {
        &self.master
    }

    pub fn salt(&self) -> &Salt {
        &self.salt
    }

    pub fn salt_string(&self) -> String {
        self.salt.to_base64()
    }

    /// Derive the AES key for chunk `index`.
    pub fn chunk_key(&self, index: u64, iterations: u32) -> DropResult<ChunkKey> {
        derive_chunk_key(&self.master, index, self.salt.as_bytes(), iterations)
    }

    /// Encode for the receiver.
    pub fn to_secret(&self) -> DropSecret {
        let mut raw = [0u8; KEY_SIZE + SALT_SIZE];
        raw[..KEY_SIZE].copy_from_slice(self.master.as_bytes());
        raw[KEY_SIZE..].copy_from_slice(self.salt.as_bytes());
        let encoded = URL_SAFE_NO_PAD.encode(raw);
        raw.zeroize();
        DropSecret(SecretString::from(encoded))
    }
}

/// Generate fresh key material for a new drop from the OS RNG.
///
/// Fails with `CryptoUnavailable` rather than falling back to a weaker
/// source.
pub fn initialize_drop() -> DropResult<DropKeys> {
    let mut master = [0u8; KEY_SIZE];
    let mut salt = [0u8; SALT_SIZE];
    OsRng
        .try_fill_bytes(&mut master)
        .and_then(|_| OsRng.try_fill_bytes(&mut salt))
        .map_err(|e| DropError::CryptoUnavailable(format!("OS RNG: {e}")))?;

    let keys = DropKeys::new(MasterKey::from_bytes(master), Salt::from_bytes(salt));
    master.zeroize();
    tracing::debug!(salt = %keys.salt_string(), "drop key material initialized");
    Ok(keys)
}

/// `master || salt` as unpadded base64url (86 chars).
///
/// The capability a receiver needs to decrypt a drop. Never logged, never
/// sent to the backend.
#[derive(Clone)]
pub struct DropSecret(SecretString);

impl DropSecret {
    /// Length of the encoded form
    pub const ENCODED_LEN: usize = 86;

    pub fn parse(raw: &str) -> DropResult<Self> {
        let raw = raw.trim();
        if raw.len() != Self::ENCODED_LEN {
            return Err(DropError::InvalidSecret(format!(
                "expected {} characters, got {}",
                Self::ENCODED_LEN,
                raw.len()
            )));
        }
        let mut bytes = URL_SAFE_NO_PAD
            .decode(raw)
            .map_err(|e| DropError::InvalidSecret(e.to_string()))?;
        if bytes.len() != KEY_SIZE + SALT_SIZE {
            bytes.zeroize();
            return Err(DropError::InvalidSecret(format!(
                "decoded to {} bytes",
                bytes.len()
            )));
        }
        bytes.zeroize();
        Ok(Self(SecretString::from(raw.to_string())))
    }

    /// The encoded text, for display to the sender only
    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }

    pub fn keys(&self) -> DropResult<DropKeys> {
        let mut bytes = URL_SAFE_NO_PAD
            .decode(self.0.expose_secret())
            .map_err(|e| DropError::InvalidSecret(e.to_string()))?;
        if bytes.len() != KEY_SIZE + SALT_SIZE {
            bytes.zeroize();
            return Err(DropError::InvalidSecret("wrong length".into()));
        }
        let mut master = [0u8; KEY_SIZE];
        let mut salt = [0u8; SALT_SIZE];
        master.copy_from_slice(&bytes[..KEY_SIZE]);
        salt.copy_from_slice(&bytes[KEY_SIZE..]);
        bytes.zeroize();

        let keys = DropKeys::new(MasterKey::from_bytes(master), Salt::from_bytes(salt));
        master.zeroize();
        Ok(keys)
    }
}

impl std::fmt::Debug for DropSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("DropSecret([REDACTED])")
    }
}

impl std::str::FromStr for DropSecret {
    type Err = DropError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_keys_differ() {
        let a = initialize_drop().unwrap();
        let b = initialize_drop().unwrap();
        assert_ne!(a.master().as_bytes(), b.master().as_bytes());
        assert_ne!(a.salt(), b.salt());
        assert_ne!(
            a.master().as_bytes(),
            a.salt().as_bytes(),
            "master and salt must be independent draws"
        );
    }

    #[test]
    fn test_salt_string_is_base64url() {
        let keys = initialize_drop().unwrap();
        let s = keys.salt_string();
        assert_eq!(s.len(), 43);
        assert!(s
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_'));
    }

    #[test]
    fn test_secret_carries_master_and_salt() {
        let keys = initialize_drop().unwrap();
        let secret = keys.to_secret();
        assert_eq!(secret.expose().len(), DropSecret::ENCODED_LEN);

        let parsed: DropSecret = secret.expose().parse().unwrap();
        let back = parsed.keys().unwrap();
        assert_eq!(back.master().as_bytes(), keys.master().as_bytes());
        assert_eq!(back.salt(), keys.salt());
    }

    #[test]
    fn test_secret_rejects_garbage() {
        assert!(matches!(
            DropSecret::parse("short"),
            Err(DropError::InvalidSecret(_))
        ));
        let bad = "!".repeat(DropSecret::ENCODED_LEN);
        assert!(matches!(
            DropSecret::parse(&bad),
            Err(DropError::InvalidSecret(_))
        ));
    }

    #[test]
    fn test_secret_debug_redacted() {
        let keys = initialize_drop().unwrap();
        let secret = keys.to_secret();
        let dbg = format!("{secret:?} {keys:?}");
        assert!(!dbg.contains(secret.expose()));
        assert!(dbg.contains("REDACTED"));
    }
}
