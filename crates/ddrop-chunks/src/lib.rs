//! ddrop-chunks: fixed-size chunking, SHA-256 integrity hashing, and bundling
//!
//! # Overview
//! - `chunker`: streams a payload as 1 MiB (configurable) chunks, one at a time
//! - `digest`: per-chunk SHA-256, hex-encoded for the manifest and the API
//! - `bundle`: selection limits, and ZIP bundling when more than one file is sent

pub mod bundle;
pub mod chunker;
pub mod digest;

// Convenience re-exports for the most common operations
pub use bundle::{
    build_bundle, extract_bundle, select_files, validate_selection, Bundle, BundleEvent,
    BundleProgressFn, SelectedFile, SelectionLimits,
};
pub use chunker::{chunk_count, chunk_file, chunk_slice, Chunk, FixedChunker};
pub use digest::{
    hash_bytes, hash_file, hash_hex, hash_reader, hash_to_hex, verify_chunk, Digest, StreamHasher,
};
