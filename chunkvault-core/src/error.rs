//! Error types for chunkvault
//!
//! Provides a unified error type for chunking, hashing, compression,
//! storage and index operations.

use crate::chunk::ChunkId;
use crate::compression::CompressionMethod;
use thiserror::Error;

/// Result type alias for chunkvault operations
pub type Result<T> = std::result::Result<T, ChunkVaultError>;

/// Unified error type for chunkvault
#[derive(Error, Debug)]
pub enum ChunkVaultError {
    // ===== Chunking Errors =====
    #[error("Invalid chunker configuration: {0}")]
    InvalidChunkerConfig(String),

    // ===== Chunk Errors =====
    #[error("Invalid chunk ID: {0}")]
    InvalidChunkId(String),

    #[error("Chunk missing from index: {0}")]
    ChunkMissing(ChunkId),

    #[error("Chunk {hash} has no blob at {key}")]
    ChunkBlobMissing { hash: ChunkId, key: String },

    #[error("Chunk corrupted: expected {expected}, got {actual}")]
    ChunkCorrupted { expected: ChunkId, actual: ChunkId },

    #[error("Size mismatch: expected {expected} bytes, got {actual}")]
    SizeMismatch { expected: u64, actual: u64 },

    // ===== Compression Errors =====
    #[error("Compression error: {0}")]
    Compression(String),

    #[error("Decompression error ({method}): {reason}")]
    Decompression {
        method: CompressionMethod,
        reason: String,
    },

    // ===== Storage Errors =====
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Storage full: {used} / {capacity} bytes")]
    StorageFull { used: u64, capacity: u64 },

    #[error("Invalid storage key: {0}")]
    InvalidKey(String),

    // ===== I/O Errors =====
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // ===== Serialization Errors =====
    #[error("Serialization error: {0}")]
    Serialization(String),

    // ===== Configuration Errors =====
    #[error("Configuration error: {0}")]
    Configuration(String),

    // ===== Generic Errors =====
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<serde_json::Error> for ChunkVaultError {
    fn from(err: serde_json::Error) -> Self {
        ChunkVaultError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ChunkVaultError::SizeMismatch {
            expected: 10,
            actual: 8,
        };
        assert_eq!(err.to_string(), "Size mismatch: expected 10 bytes, got 8");

        let err = ChunkVaultError::Decompression {
            method: CompressionMethod::Zstd,
            reason: "bad magic".to_string(),
        };
        assert_eq!(err.to_string(), "Decompression error (zstd): bad magic");
    }

    #[test]
    fn test_chunk_missing_shows_hex() {
        let id = ChunkId::from_data(b"gone");
        let err = ChunkVaultError::ChunkMissing(id);
        assert!(err.to_string().ends_with(&id.to_hex()));
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: ChunkVaultError = io_err.into();
        assert!(matches!(err, ChunkVaultError::Io(_)));
    }

    #[test]
    fn test_error_from_json() {
        let json_err = serde_json::from_str::<u32>("not json").unwrap_err();
        let err: ChunkVaultError = json_err.into();
        assert!(matches!(err, ChunkVaultError::Serialization(_)));
    }
}
