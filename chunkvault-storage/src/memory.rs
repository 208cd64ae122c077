//! In-memory storage backend
//!
//! Used for testing and development. Not persistent.

use crate::backend::{validate_key, StorageBackendSync, StorageId, StorageStats};
use bytes::Bytes;
use chunkvault_core::error::{ChunkVaultError, Result};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// In-memory storage backend
pub struct MemoryBackend {
    /// Blob storage, ordered so prefix listing is a range scan
    blobs: RwLock<BTreeMap<String, Bytes>>,

    /// Maximum capacity (0 = unlimited)
    max_capacity: u64,

    /// Current bytes used
    bytes_used: AtomicU64,

    /// Operation counters
    reads: AtomicU64,
    writes: AtomicU64,
    deletes: AtomicU64,
}

impl MemoryBackend {
    /// Create a new in-memory backend
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    /// Create with a maximum capacity
    pub fn with_capacity(max_bytes: u64) -> Self {
        Self {
            blobs: RwLock::new(BTreeMap::new()),
            max_capacity: max_bytes,
            bytes_used: AtomicU64::new(0),
            reads: AtomicU64::new(0),
            writes: AtomicU64::new(0),
            deletes: AtomicU64::new(0),
        }
    }

    /// Number of `put` calls so far
    pub fn writes(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }

    /// Number of stored blobs
    pub fn len(&self) -> usize {
        self.blobs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.read().is_empty()
    }

    /// Clear all stored blobs
    pub fn clear(&self) {
        let mut blobs = self.blobs.write();
        blobs.clear();
        self.bytes_used.store(0, Ordering::SeqCst);
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl StorageBackendSync for MemoryBackend {
    fn name(&self) -> &str {
        "memory"
    }

    fn put(&self, key: &str, data: Bytes) -> Result<StorageId> {
        validate_key(key)?;
        let data_len = data.len() as u64;

        let mut blobs = self.blobs.write();
        let replaced = blobs.get(key).map(|old| old.len() as u64).unwrap_or(0);

        // Check capacity
        if self.max_capacity > 0 {
            let current = self.bytes_used.load(Ordering::SeqCst);
            if current - replaced + data_len > self.max_capacity {
                return Err(ChunkVaultError::StorageFull {
                    used: current,
                    capacity: self.max_capacity,
                });
            }
        }

        blobs.insert(key.to_string(), data);
        self.bytes_used.fetch_sub(replaced, Ordering::SeqCst);
        self.bytes_used.fetch_add(data_len, Ordering::SeqCst);
        self.writes.fetch_add(1, Ordering::Relaxed);

        Ok(StorageId(key.to_string()))
    }

    fn get(&self, key: &str) -> Result<Option<Bytes>> {
        self.reads.fetch_add(1, Ordering::Relaxed);
        let blobs = self.blobs.read();
        Ok(blobs.get(key).cloned())
    }

    fn delete(&self, key: &str) -> Result<bool> {
        let mut blobs = self.blobs.write();

        if let Some(old) = blobs.remove(key) {
            self.bytes_used.fetch_sub(old.len() as u64, Ordering::SeqCst);
            self.deletes.fetch_add(1, Ordering::Relaxed);
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.blobs.read().contains_key(key))
    }

    fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let blobs = self.blobs.read();
        Ok(blobs
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, _)| k.clone())
            .collect())
    }

    fn stats(&self) -> Result<StorageStats> {
        let blobs = self.blobs.read();
        Ok(StorageStats {
            object_count: blobs.len() as u64,
            bytes_used: self.bytes_used.load(Ordering::SeqCst),
            bytes_capacity: self.max_capacity,
            reads: self.reads.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
        })
    }

    fn flush(&self) -> Result<()> {
        // No-op for in-memory storage
        Ok(())
    }
}
