//! Storage backend trait
//!
//! Defines the interface that all blob stores must follow. Backends are
//! plain key/value stores; keys are slash-separated strings such as
//! `/.cas/chunks/<hex>`.

use bytes::Bytes;
use chunkvault_core::error::{ChunkVaultError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::pin::Pin;

/// Opaque identifier a backend hands back for a stored blob
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StorageId(pub String);

impl StorageId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StorageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for StorageId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Storage statistics
#[derive(Debug, Clone, Default)]
pub struct StorageStats {
    /// Number of stored blobs
    pub object_count: u64,

    /// Total bytes used by blobs
    pub bytes_used: u64,

    /// Total storage capacity (0 = unlimited)
    pub bytes_capacity: u64,

    /// Number of read operations
    pub reads: u64,

    /// Number of write operations
    pub writes: u64,

    /// Number of delete operations
    pub deletes: u64,
}

impl StorageStats {
    /// Calculate usage percentage
    pub fn usage_percent(&self) -> f64 {
        if self.bytes_capacity == 0 {
            0.0
        } else {
            (self.bytes_used as f64 / self.bytes_capacity as f64) * 100.0
        }
    }

    /// Check if storage is full
    pub fn is_full(&self) -> bool {
        self.bytes_capacity > 0 && self.bytes_used >= self.bytes_capacity
    }

    /// Available space in bytes
    pub fn bytes_available(&self) -> u64 {
        if self.bytes_capacity == 0 {
            u64::MAX
        } else {
            self.bytes_capacity.saturating_sub(self.bytes_used)
        }
    }
}

/// Reject empty keys and keys that could escape a backend's namespace
pub fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(ChunkVaultError::InvalidKey("empty key".to_string()));
    }
    if key.contains('\0') || key.split(['/', '\\']).any(|part| part == "..") {
        return Err(ChunkVaultError::InvalidKey(key.to_string()));
    }
    Ok(())
}

/// Async storage backend trait
///
/// All storage implementations must be Send + Sync for use in async contexts.
pub trait StorageBackend: Send + Sync {
    /// Short backend name recorded on every chunk stored through it
    fn name(&self) -> &str;

    /// Store a blob, replacing any previous value under `key`
    fn put<'a>(
        &'a self,
        key: &'a str,
        data: Bytes,
    ) -> Pin<Box<dyn Future<Output = Result<StorageId>> + Send + 'a>>;

    /// Retrieve a blob
    fn get<'a>(
        &'a self,
        key: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<Bytes>>> + Send + 'a>>;

    /// Delete a blob; `false` if it did not exist
    fn delete<'a>(&'a self, key: &'a str)
        -> Pin<Box<dyn Future<Output = Result<bool>> + Send + 'a>>;

    /// Check if a blob exists
    fn exists<'a>(&'a self, key: &'a str)
        -> Pin<Box<dyn Future<Output = Result<bool>> + Send + 'a>>;

    /// List every key starting with `prefix`, sorted
    fn list<'a>(
        &'a self,
        prefix: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<String>>> + Send + 'a>>;

    /// Get storage statistics
    fn stats<'a>(&'a self) -> Pin<Box<dyn Future<Output = Result<StorageStats>> + Send + 'a>>;

    /// Flush any pending writes to disk
    fn flush<'a>(&'a self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;
}

/// Synchronous storage backend trait (for simpler implementations)
pub trait StorageBackendSync: Send + Sync {
    /// Short backend name
    fn name(&self) -> &str;

    /// Store a blob
    fn put(&self, key: &str, data: Bytes) -> Result<StorageId>;

    /// Retrieve a blob
    fn get(&self, key: &str) -> Result<Option<Bytes>>;

    /// Delete a blob
    fn delete(&self, key: &str) -> Result<bool>;

    /// Check if a blob exists
    fn exists(&self, key: &str) -> Result<bool>;

    /// List keys under a prefix, sorted
    fn list(&self, prefix: &str) -> Result<Vec<String>>;

    /// Get storage statistics
    fn stats(&self) -> Result<StorageStats>;

    /// Flush any pending writes
    fn flush(&self) -> Result<()>;
}

/// Wrapper to convert sync backend to async
pub struct AsyncWrapper<T: StorageBackendSync>(pub T);

impl<T: StorageBackendSync> AsyncWrapper<T> {
    /// Borrow the wrapped backend
    pub fn inner(&self) -> &T {
        &self.0
    }
}

impl<T: StorageBackendSync + 'static> StorageBackend for AsyncWrapper<T> {
    fn name(&self) -> &str {
        self.0.name()
    }

    fn put<'a>(
        &'a self,
        key: &'a str,
        data: Bytes,
    ) -> Pin<Box<dyn Future<Output = Result<StorageId>> + Send + 'a>> {
        Box::pin(async move { self.0.put(key, data) })
    }

    fn get<'a>(
        &'a self,
        key: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<Bytes>>> + Send + 'a>> {
        Box::pin(async move { self.0.get(key) })
    }

    fn delete<'a>(
        &'a self,
        key: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<bool>> + Send + 'a>> {
        Box::pin(async move { self.0.delete(key) })
    }

    fn exists<'a>(
        &'a self,
        key: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<bool>> + Send + 'a>> {
        Box::pin(async move { self.0.exists(key) })
    }

    fn list<'a>(
        &'a self,
        prefix: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<String>>> + Send + 'a>> {
        Box::pin(async move { self.0.list(prefix) })
    }

    fn stats<'a>(&'a self) -> Pin<Box<dyn Future<Output = Result<StorageStats>> + Send + 'a>> {
        Box::pin(async move { self.0.stats() })
    }

    fn flush<'a>(&'a self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move { self.0.flush() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_key() {
        assert!(validate_key("/.cas/chunks/abc").is_ok());
        assert!(validate_key("/.cas/index.json").is_ok());
        assert!(validate_key("").is_err());
        assert!(validate_key("/.cas/../etc/passwd").is_err());
        assert!(validate_key("..\\windows").is_err());
        // Dots inside a segment are fine
        assert!(validate_key("/a/..b/c").is_ok());
    }

    #[test]
    fn test_usage_percent() {
        let stats = StorageStats {
            bytes_used: 25,
            bytes_capacity: 100,
            ..Default::default()
        };
        assert_eq!(stats.usage_percent(), 25.0);
        assert_eq!(stats.bytes_available(), 75);
        assert!(!stats.is_full());

        let unlimited = StorageStats::default();
        assert_eq!(unlimited.usage_percent(), 0.0);
        assert_eq!(unlimited.bytes_available(), u64::MAX);
    }
}
