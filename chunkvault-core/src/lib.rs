//! chunkvault core library
//!
//! Core building blocks of the chunkvault deduplicating store.
//! This crate provides:
//! - Content-defined chunking (fixed, Rabin, FastCDC-style gear hashing)
//! - Blake3 content hashing and a bounded parallel hashing stage
//! - Content-addressed chunk identifiers
//! - Chunk compression (zstd, gzip)
//! - Common error handling

pub mod chunk;
pub mod chunker;
pub mod compression;
pub mod error;
pub mod hash;

pub use chunk::{reassemble_chunks, ChunkId};
pub use chunker::{Chunker, ChunkerConfig, ChunkingAlgorithm};
pub use compression::{
    CodecCompressor, Compressed, CompressionHint, CompressionMethod, Compressor,
};
pub use error::{ChunkVaultError, Result};
pub use hash::{ContentHash, HashPool};

/// Chunk size constants
pub const MIN_CHUNK_SIZE: usize = 4 * 1024; // 4 KB
pub const DEFAULT_CHUNK_SIZE: usize = 32 * 1024; // 32 KB
pub const MAX_CHUNK_SIZE: usize = 64 * 1024; // 64 KB

/// Chunks hashed together by one worker of the hashing stage
pub const HASH_BATCH_SIZE: usize = 10;

/// Backend key prefix for chunk blobs
pub const CHUNK_KEY_PREFIX: &str = "/.cas/chunks/";

/// Backend key of the persisted index snapshot
pub const INDEX_SNAPSHOT_KEY: &str = "/.cas/index.json";
