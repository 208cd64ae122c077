//! Content hashing for chunkvault
//!
//! Provides:
//! - Blake3 content hashing (fast, parallelizable)
//! - A bounded worker pool that hashes batches of chunks concurrently

use crate::chunk::ChunkId;
use crate::error::{ChunkVaultError, Result};
use rayon::prelude::*;
use std::fmt;
use tracing::debug;

/// Blake3 hash wrapper for content addressing
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContentHash(blake3::Hash);

impl ContentHash {
    /// Compute Blake3 hash of data
    pub fn compute(data: &[u8]) -> Self {
        Self(blake3::hash(data))
    }

    /// Compute Blake3 hash of data using multiple threads (for large data)
    pub fn compute_parallel(data: &[u8]) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update_rayon(data);
        Self(hasher.finalize())
    }

    /// Get the raw hash bytes
    pub fn as_bytes(&self) -> &[u8; 32] {
        self.0.as_bytes()
    }

    /// Convert to hex string
    pub fn to_hex(&self) -> String {
        self.0.to_hex().to_string()
    }

    /// Parse from hex string
    pub fn from_hex(hex: &str) -> Result<Self> {
        let hash = blake3::Hash::from_hex(hex)
            .map_err(|e| ChunkVaultError::InvalidChunkId(e.to_string()))?;
        Ok(Self(hash))
    }

    /// Verify that data matches this hash
    pub fn verify(&self, data: &[u8]) -> bool {
        let computed = Self::compute(data);
        self == &computed
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHash({})", &self.to_hex()[..16])
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// Bounded-concurrency hashing stage between the chunker and the index.
///
/// Chunks are split into batches of `batch_size` and the batches are hashed
/// on a dedicated pool of `threads` workers. Output order always matches
/// input order.
pub struct HashPool {
    pool: rayon::ThreadPool,
    batch_size: usize,
}

impl HashPool {
    /// Create a pool with `threads` workers (0 = one per CPU)
    pub fn new(threads: usize, batch_size: usize) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("chunkvault-hash-{}", i))
            .build()
            .map_err(|e| ChunkVaultError::Internal(format!("Failed to build hash pool: {}", e)))?;

        Ok(Self {
            pool,
            batch_size: batch_size.max(1),
        })
    }

    /// Number of worker threads
    pub fn threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Chunks hashed together by one worker
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Hash every chunk, returning one id per chunk in input order
    pub fn hash_chunks<T: AsRef<[u8]> + Sync>(&self, chunks: &[T]) -> Vec<ChunkId> {
        if chunks.is_empty() {
            return Vec::new();
        }

        let batch_size = self.batch_size;
        let ids: Vec<ChunkId> = self.pool.install(|| {
            chunks
                .par_chunks(batch_size)
                .flat_map_iter(|batch| batch.iter().map(|c| ChunkId::from_data(c.as_ref())))
                .collect()
        });

        debug!(chunks = ids.len(), batch_size, "Hashed chunk batch");
        ids
    }
}

impl fmt::Debug for HashPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HashPool")
            .field("threads", &self.threads())
            .field("batch_size", &self.batch_size)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_hash() {
        let data = b"hello world";
        let hash = ContentHash::compute(data);

        // Same data produces same hash
        let hash2 = ContentHash::compute(data);
        assert_eq!(hash, hash2);

        // Different data produces different hash
        let hash3 = ContentHash::compute(b"different data");
        assert_ne!(hash, hash3);

        assert!(hash.verify(data));
        assert!(!hash.verify(b"wrong data"));
    }

    #[test]
    fn test_content_hash_parallel() {
        let data = vec![0u8; 1024 * 1024]; // 1 MB
        let hash1 = ContentHash::compute(&data);
        let hash2 = ContentHash::compute_parallel(&data);
        assert_eq!(hash1, hash2);
    }

    #[test]
    fn test_hex_roundtrip() {
        let hash = ContentHash::compute(b"hex");
        let back = ContentHash::from_hex(&hash.to_hex()).unwrap();
        assert_eq!(hash, back);
        assert!(ContentHash::from_hex("nope").is_err());
    }

    #[test]
    fn test_hash_pool_preserves_order() {
        let pool = HashPool::new(4, 3).unwrap();
        let chunks: Vec<Vec<u8>> = (0..50u32).map(|i| i.to_le_bytes().to_vec()).collect();

        let ids = pool.hash_chunks(&chunks);
        assert_eq!(ids.len(), chunks.len());
        for (chunk, id) in chunks.iter().zip(&ids) {
            assert_eq!(*id, ChunkId::from_data(chunk));
        }
    }

    #[test]
    fn test_hash_pool_empty_and_zero_batch() {
        let pool = HashPool::new(1, 0).unwrap();
        assert_eq!(pool.batch_size(), 1);
        let none: Vec<Vec<u8>> = Vec::new();
        assert!(pool.hash_chunks(&none).is_empty());
    }
}
