//! Filesystem storage backend
//!
//! One file per key under a root directory. `/.cas/chunks/ab..` lands at
//! `<root>/.cas/chunks/ab..`. Writes go to a synced temp file in the staging
//! directory and are persisted into place, so readers never observe a partial
//! blob and a persisted blob survives a crash.

use crate::backend::{validate_key, StorageBackend, StorageId, StorageStats};
use bytes::Bytes;
use chunkvault_core::error::{ChunkVaultError, Result};
use std::future::Future;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use tempfile::NamedTempFile;
use tokio::fs;
use tracing::{debug, info, warn};

/// Directory under the root holding in-flight writes
const STAGING_DIR: &str = ".staging";

/// Filesystem blob store
pub struct FileBackend {
    root: PathBuf,
    max_capacity: u64,
    reads: AtomicU64,
    writes: AtomicU64,
    deletes: AtomicU64,
}

impl FileBackend {
    /// Open (creating if needed) a store rooted at `root`.
    /// Leftovers of interrupted writes in the staging area are removed.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        let staging = root.join(STAGING_DIR);
        fs::create_dir_all(&staging).await?;
        let cleared = clear_staging(&staging).await?;
        if cleared > 0 {
            warn!(path = ?staging, cleared, "Removed stale staged writes");
        }
        info!(path = ?root, "Opened file blob store");

        Ok(Self {
            root,
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

    /// Root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        validate_key(key)?;
        let relative = key.trim_start_matches('/');
        if relative.is_empty() || relative.ends_with('/') {
            return Err(ChunkVaultError::InvalidKey(key.to_string()));
        }
        Ok(self.root.join(relative))
    }

    fn key_for(&self, path: &Path) -> Option<String> {
        let relative = path.strip_prefix(&self.root).ok()?;
        let parts: Vec<String> = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        Some(format!("/{}", parts.join("/")))
    }

    /// Every stored file with its size, staging area excluded
    async fn walk(&self) -> Result<Vec<(PathBuf, u64)>> {
        let mut files = Vec::new();
        let mut pending = vec![self.root.clone()];
        let staging = self.root.join(STAGING_DIR);

        while let Some(dir) = pending.pop() {
            let mut entries = match fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                let file_type = entry.file_type().await?;
                if file_type.is_dir() {
                    if path != staging {
                        pending.push(path);
                    }
                } else if file_type.is_file() {
                    let len = entry.metadata().await?.len();
                    files.push((path, len));
                }
            }
        }
        Ok(files)
    }

    async fn put_inner(&self, key: &str, data: Bytes) -> Result<StorageId> {
        let path = self.path_for(key)?;

        if self.max_capacity > 0 {
            let used: u64 = self.walk().await?.iter().map(|(_, len)| len).sum();
            let replaced = match fs::metadata(&path).await {
                Ok(meta) => meta.len(),
                Err(_) => 0,
            };
            if used.saturating_sub(replaced) + data.len() as u64 > self.max_capacity {
                return Err(ChunkVaultError::StorageFull {
                    used,
                    capacity: self.max_capacity,
                });
            }
        }

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let staging = self.root.join(STAGING_DIR);
        let size = data.len();
        tokio::task::spawn_blocking(move || write_durable(&staging, &path, &data))
            .await
            .map_err(|e| ChunkVaultError::Internal(format!("blob write task failed: {}", e)))??;

        self.writes.fetch_add(1, Ordering::Relaxed);
        debug!(key, size, "Wrote blob file");
        Ok(StorageId(key.to_string()))
    }

    async fn get_inner(&self, key: &str) -> Result<Option<Bytes>> {
        let path = self.path_for(key)?;
        self.reads.fetch_add(1, Ordering::Relaxed);
        match fs::read(&path).await {
            Ok(data) => Ok(Some(Bytes::from(data))),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete_inner(&self, key: &str) -> Result<bool> {
        let path = self.path_for(key)?;
        match fs::remove_file(&path).await {
            Ok(()) => {
                self.deletes.fetch_add(1, Ordering::Relaxed);
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn list_inner(&self, prefix: &str) -> Result<Vec<String>> {
        let mut keys: Vec<String> = self
            .walk()
            .await?
            .into_iter()
            .filter_map(|(path, _)| self.key_for(&path))
            .filter(|key| key.starts_with(prefix))
            .collect();
        keys.sort();
        Ok(keys)
    }

    async fn stats_inner(&self) -> Result<StorageStats> {
        let files = self.walk().await?;
        Ok(StorageStats {
            object_count: files.len() as u64,
            bytes_used: files.iter().map(|(_, len)| len).sum(),
            bytes_capacity: self.max_capacity,
            reads: self.reads.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
        })
    }
}

impl StorageBackend for FileBackend {
    fn name(&self) -> &str {
        "file"
    }

    fn put<'a>(
        &'a self,
        key: &'a str,
        data: Bytes,
    ) -> Pin<Box<dyn Future<Output = Result<StorageId>> + Send + 'a>> {
        Box::pin(self.put_inner(key, data))
    }

    fn get<'a>(
        &'a self,
        key: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<Bytes>>> + Send + 'a>> {
        Box::pin(self.get_inner(key))
    }

    fn delete<'a>(
        &'a self,
        key: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<bool>> + Send + 'a>> {
        Box::pin(self.delete_inner(key))
    }

    fn exists<'a>(
        &'a self,
        key: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<bool>> + Send + 'a>> {
        Box::pin(async move {
            let path = self.path_for(key)?;
            Ok(fs::try_exists(&path).await?)
        })
    }

    fn list<'a>(
        &'a self,
        prefix: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<String>>> + Send + 'a>> {
        Box::pin(self.list_inner(prefix))
    }

    fn stats<'a>(&'a self) -> Pin<Box<dyn Future<Output = Result<StorageStats>> + Send + 'a>> {
        Box::pin(self.stats_inner())
    }

    fn flush<'a>(&'a self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        // Blobs and their directory entries are synced by put; this covers
        // directories created along the way
        Box::pin(async move {
            let root = self.root.clone();
            tokio::task::spawn_blocking(move || sync_tree_dirs(&root))
                .await
                .map_err(|e| ChunkVaultError::Internal(format!("flush task failed: {}", e)))??;
            Ok(())
        })
    }
}

/// Write `data` to a temp file in `staging`, sync it, move it to `path` and
/// sync the directory entry
fn write_durable(staging: &Path, path: &Path, data: &[u8]) -> Result<()> {
    let mut tmp = NamedTempFile::new_in(staging)?;
    tmp.write_all(data)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| ChunkVaultError::Io(e.error))?;
    if let Some(parent) = path.parent() {
        sync_dir(parent)?;
    }
    Ok(())
}

/// fsync a directory so renames into it are durable
#[cfg(unix)]
fn sync_dir(dir: &Path) -> std::io::Result<()> {
    std::fs::File::open(dir)?.sync_all()
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> std::io::Result<()> {
    Ok(())
}

/// fsync every directory under `root`, staging excluded
fn sync_tree_dirs(root: &Path) -> std::io::Result<()> {
    let staging = root.join(STAGING_DIR);
    let mut pending = vec![root.to_path_buf()];
    while let Some(dir) = pending.pop() {
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() && entry.path() != staging {
                pending.push(entry.path());
            }
        }
        sync_dir(&dir)?;
    }
    Ok(())
}

/// Remove everything in the staging directory, returning the entry count
async fn clear_staging(staging: &Path) -> Result<usize> {
    let mut cleared = 0;
    let mut entries = fs::read_dir(staging).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if entry.file_type().await?.is_dir() {
            fs::remove_dir_all(&path).await?;
        } else {
            fs::remove_file(&path).await?;
        }
        cleared += 1;
    }
    Ok(cleared)
}
