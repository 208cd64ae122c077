//! Sled-based blob storage
//!
//! Stores every blob in a single sled tree keyed by its backend key.
//! Sled provides crash-safe writes and is pure Rust.

use crate::backend::{validate_key, StorageBackendSync, StorageId, StorageStats};
use bytes::Bytes;
use chunkvault_core::error::{ChunkVaultError, Result};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info};

/// Name of the tree holding blobs
const BLOB_TREE: &str = "blobs";

fn storage_err(e: sled::Error) -> ChunkVaultError {
    ChunkVaultError::Storage(e.to_string())
}

/// Sled-based blob store
pub struct SledBackend {
    db: sled::Db,
    blobs: sled::Tree,
    max_capacity: u64,
    reads: AtomicU64,
    writes: AtomicU64,
    deletes: AtomicU64,
}

impl SledBackend {
    /// Open or create a store at `path`
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        info!(path = ?path.as_ref(), "Opening Sled blob store");

        let db = sled::open(path.as_ref())
            .map_err(|e| ChunkVaultError::Storage(format!("Failed to open Sled: {}", e)))?;
        Self::from_db(db)
    }

    /// Open an in-memory store (for testing)
    pub fn open_temporary() -> Result<Self> {
        let config = sled::Config::new().temporary(true);
        let db = config
            .open()
            .map_err(|e| ChunkVaultError::Storage(format!("Failed to open Sled: {}", e)))?;
        Self::from_db(db)
    }

    fn from_db(db: sled::Db) -> Result<Self> {
        let blobs = db.open_tree(BLOB_TREE).map_err(storage_err)?;
        Ok(Self {
            db,
            blobs,
            max_capacity: 0,
            reads: AtomicU64::new(0),
            writes: AtomicU64::new(0),
            deletes: AtomicU64::new(0),
        })
    }

    /// Set maximum capacity (0 = unlimited)
    pub fn with_max_capacity(mut self, bytes: u64) -> Self {
        self.max_capacity = bytes;
        self
    }

    fn bytes_used(&self) -> Result<u64> {
        let mut total = 0u64;
        for item in self.blobs.iter() {
            let (_, value) = item.map_err(storage_err)?;
            total += value.len() as u64;
        }
        Ok(total)
    }

    /// Get database size estimate
    pub fn size_on_disk(&self) -> u64 {
        self.db.size_on_disk().unwrap_or(0)
    }
}

impl StorageBackendSync for SledBackend {
    fn name(&self) -> &str {
        "sled"
    }

    fn put(&self, key: &str, data: Bytes) -> Result<StorageId> {
        validate_key(key)?;

        if self.max_capacity > 0 {
            let used = self.bytes_used()?;
            let replaced = self
                .blobs
                .get(key.as_bytes())
                .map_err(storage_err)?
                .map(|v| v.len() as u64)
                .unwrap_or(0);
            if used - replaced + data.len() as u64 > self.max_capacity {
                return Err(ChunkVaultError::StorageFull {
                    used,
                    capacity: self.max_capacity,
                });
            }
        }

        self.blobs
            .insert(key.as_bytes(), data.as_ref())
            .map_err(storage_err)?;
        self.writes.fetch_add(1, Ordering::Relaxed);

        debug!(key, size = data.len(), "Stored blob");
        Ok(StorageId(key.to_string()))
    }

    fn get(&self, key: &str) -> Result<Option<Bytes>> {
        self.reads.fetch_add(1, Ordering::Relaxed);
        Ok(self
            .blobs
            .get(key.as_bytes())
            .map_err(storage_err)?
            .map(|v| Bytes::copy_from_slice(&v)))
    }

    fn delete(&self, key: &str) -> Result<bool> {
        let removed = self.blobs.remove(key.as_bytes()).map_err(storage_err)?;
        if removed.is_some() {
            self.deletes.fetch_add(1, Ordering::Relaxed);
        }
        Ok(removed.is_some())
    }

    fn exists(&self, key: &str) -> Result<bool> {
        self.blobs.contains_key(key.as_bytes()).map_err(storage_err)
    }

    fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        for item in self.blobs.scan_prefix(prefix.as_bytes()) {
            let (key, _) = item.map_err(storage_err)?;
            keys.push(String::from_utf8_lossy(&key).into_owned());
        }
        Ok(keys)
    }

    fn stats(&self) -> Result<StorageStats> {
        Ok(StorageStats {
            object_count: self.blobs.len() as u64,
            bytes_used: self.bytes_used()?,
            bytes_capacity: self.max_capacity,
            reads: self.reads.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
        })
    }

    fn flush(&self) -> Result<()> {
        self.db.flush().map_err(storage_err)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_put_get_delete() {
        let store = SledBackend::open_temporary().unwrap();

        store.put("/.cas/chunks/aa", Bytes::from_static(b"blob")).unwrap();
        assert_eq!(
            store.get("/.cas/chunks/aa").unwrap().unwrap().as_ref(),
            b"blob"
        );
        assert!(store.exists("/.cas/chunks/aa").unwrap());

        assert!(store.delete("/.cas/chunks/aa").unwrap());
        assert!(!store.delete("/.cas/chunks/aa").unwrap());
        assert!(store.get("/.cas/chunks/aa").unwrap().is_none());
    }

    #[test]
    fn test_list_prefix() {
        let store = SledBackend::open_temporary().unwrap();
        for key in ["/.cas/chunks/b", "/.cas/chunks/a", "/.cas/index.json"] {
            store.put(key, Bytes::from_static(b"x")).unwrap();
        }

        let keys = store.list("/.cas/chunks/").unwrap();
        assert_eq!(keys, vec!["/.cas/chunks/a", "/.cas/chunks/b"]);
    }

    #[test]
    fn test_capacity_limit() {
        let store = SledBackend::open_temporary().unwrap().with_max_capacity(10);
        store.put("a", Bytes::from(vec![1u8; 8])).unwrap();
        assert!(matches!(
            store.put("b", Bytes::from(vec![1u8; 8])),
            Err(ChunkVaultError::StorageFull { .. })
        ));
    }

    #[test]
    fn test_persists_across_reopen() {
        let dir = TempDir::new().unwrap();

        {
            let store = SledBackend::open(dir.path()).unwrap();
            store.put("/k", Bytes::from_static(b"durable")).unwrap();
            store.flush().unwrap();
        }

        let store = SledBackend::open(dir.path()).unwrap();
        assert_eq!(store.get("/k").unwrap().unwrap().as_ref(), b"durable");
        let stats = store.stats().unwrap();
        assert_eq!(stats.object_count, 1);
        assert_eq!(stats.bytes_used, 7);
    }
}
