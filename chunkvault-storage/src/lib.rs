//! chunkvault Storage Backend
//!
//! Provides blob storage abstractions and implementations:
//! - `StorageBackend` trait for pluggable storage
//! - `FileBackend` for one-file-per-blob repositories
//! - `SledBackend` for embedded database storage
//! - `MemoryBackend` for testing

pub mod backend;
pub mod file_backend;
pub mod memory;
pub mod sled_backend;

pub use backend::{AsyncWrapper, StorageBackend, StorageBackendSync, StorageId, StorageStats};
pub use file_backend::FileBackend;
pub use memory::MemoryBackend;
pub use sled_backend::SledBackend;

use chunkvault_core::error::{ChunkVaultError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Which backend implementation to open
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Files under a directory
    #[default]
    File,
    /// Sled database
    Sled,
    /// Process memory, lost on exit
    Memory,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BackendKind::File => "file",
            BackendKind::Sled => "sled",
            BackendKind::Memory => "memory",
        })
    }
}

impl FromStr for BackendKind {
    type Err = ChunkVaultError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "file" | "fs" => Ok(BackendKind::File),
            "sled" => Ok(BackendKind::Sled),
            "memory" | "mem" => Ok(BackendKind::Memory),
            other => Err(ChunkVaultError::Configuration(format!(
                "unknown backend '{}' (expected file, sled or memory)",
                other
            ))),
        }
    }
}

/// Storage configuration
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Path to storage directory
    pub path: std::path::PathBuf,

    /// Backend implementation
    pub kind: BackendKind,

    /// Maximum storage capacity in bytes (0 = unlimited)
    pub max_capacity: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: std::path::PathBuf::from("./chunkvault_data"),
            kind: BackendKind::default(),
            max_capacity: 0, // Unlimited
        }
    }
}

impl StorageConfig {
    /// Create a new storage config with the given path
    pub fn new(path: impl Into<std::path::PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    /// Set the backend implementation
    pub fn with_kind(mut self, kind: BackendKind) -> Self {
        self.kind = kind;
        self
    }

    /// Set maximum capacity
    pub fn with_max_capacity(mut self, bytes: u64) -> Self {
        self.max_capacity = bytes;
        self
    }
}

/// Open the backend described by `config`
pub async fn open_backend(config: &StorageConfig) -> Result<Arc<dyn StorageBackend>> {
    let backend: Arc<dyn StorageBackend> = match config.kind {
        BackendKind::File => Arc::new(
            FileBackend::open(&config.path)
                .await?
                .with_max_capacity(config.max_capacity),
        ),
        BackendKind::Sled => {
            let path = config.path.clone();
            let store = tokio::task::spawn_blocking(move || SledBackend::open(path))
                .await
                .map_err(|e| ChunkVaultError::Internal(format!("sled open task failed: {}", e)))??;
            Arc::new(AsyncWrapper(store.with_max_capacity(config.max_capacity)))
        }
        BackendKind::Memory => Arc::new(AsyncWrapper(MemoryBackend::with_capacity(
            config.max_capacity,
        ))),
    };
    Ok(backend)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use tempfile::TempDir;

    #[test]
    fn test_backend_kind_parse() {
        assert_eq!("sled".parse::<BackendKind>().unwrap(), BackendKind::Sled);
        assert_eq!("FILE".parse::<BackendKind>().unwrap(), BackendKind::File);
        assert!("s3".parse::<BackendKind>().is_err());
        assert_eq!(BackendKind::Memory.to_string(), "memory");
    }

    #[tokio::test]
    async fn test_open_each_backend() {
        let dir = TempDir::new().unwrap();

        for kind in [BackendKind::File, BackendKind::Sled, BackendKind::Memory] {
            let config = StorageConfig::new(dir.path().join(kind.to_string())).with_kind(kind);
            let backend = open_backend(&config).await.unwrap();
            assert_eq!(backend.name(), kind.to_string());

            backend.put("/probe", Bytes::from_static(b"ok")).await.unwrap();
            assert_eq!(backend.get("/probe").await.unwrap().unwrap().as_ref(), b"ok");
        }
    }
}
