//! ddrop-crypto: client-side encryption for dead drops
//!
//! Every drop gets fresh key material; nothing is reused across drops.
//!
//! Key hierarchy:
//! ```text
//! Drop master (32 random bytes) + salt (32 random bytes)    -- DropKeys
//!   └── Chunk key i = PBKDF2-HMAC-SHA256(master, salt || u64_be(i), 10k+)
//!       └── AES-256-GCM (key=chunk key i, nonce=u64_be(i) || 4 random bytes)
//! ```
//!
//! The master and salt leave the sender only as a [`DropSecret`], handed to
//! the receiver out of band. The backend and the manifest never see either.

pub mod chunk;
pub mod kdf;
pub mod keys;

pub use chunk::{decrypt_chunk, encrypt_chunk, ChunkIv};
pub use kdf::{derive_chunk_key, ChunkKey, MasterKey};
pub use keys::{initialize_drop, DropKeys, DropSecret, Salt};

use ddrop_core::EncryptionMeta;

/// Size of a master or chunk key in bytes (256-bit)
pub const KEY_SIZE: usize = 32;

/// Size of the per-drop salt in bytes
pub const SALT_SIZE: usize = 32;

/// Size of an AES-GCM nonce (96-bit)
pub const NONCE_SIZE: usize = 12;

/// Size of a GCM authentication tag
pub const TAG_SIZE: usize = 16;

pub const CIPHER_NAME: &str = "AES-256-GCM";
pub const KDF_NAME: &str = "PBKDF2-SHA256";

/// Describe the scheme for the manifest. Carries no key material.
pub fn encryption_meta(iterations: u32, chunk_size: usize) -> EncryptionMeta {
    EncryptionMeta {
        alg: CIPHER_NAME.into(),
        kdf: KDF_NAME.into(),
        iterations,
        chunk_size: chunk_size as u64,
    }
}
