//! Content-addressed file repository
//!
//! Splits files into chunks, stores each distinct chunk once (compressed) in
//! a [`StorageBackend`], and keeps the manifests needed to rebuild whole files
//! or byte ranges. Both indices are persisted together as one JSON snapshot.
//!
//! Locking:
//! - the index is a `parking_lot::RwLock`, only held for short synchronous
//!   sections and never across an `.await`;
//! - dedup-or-insert of a hash runs under that hash's [`KeyedLock`] entry,
//!   covering compress, upload and insert;
//! - mutations hold the gate shared, `save_index` holds it exclusively, so a
//!   snapshot never sees half of a store.

use crate::chunk_index::{ChunkLocation, ChunkNode};
use crate::index::{DedupIndex, IndexStats};
use crate::keyed_lock::KeyedLock;
use crate::manifest::FileManifest;
use crate::snapshot::IndexSnapshot;
use bytes::{Bytes, BytesMut};
use chunkvault_core::{
    ChunkId, ChunkVaultError, Chunker, ChunkerConfig, CompressionHint, Compressor, HashPool,
    Result, CHUNK_KEY_PREFIX, HASH_BATCH_SIZE, INDEX_SNAPSHOT_KEY,
};
use chunkvault_storage::{StorageBackend, StorageStats};
use futures::stream::{self, StreamExt, TryStreamExt};
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::Arc;
use tokio::task::JoinError;
use tracing::{debug, info, warn};

/// Repository configuration
#[derive(Debug, Clone)]
pub struct RepositoryConfig {
    /// Chunk boundaries
    pub chunker: ChunkerConfig,

    /// Hashing workers (0 = one per CPU)
    pub hash_threads: usize,

    /// Chunks per hashing batch
    pub hash_batch_size: usize,

    /// Novel chunks compressed and uploaded at once
    pub upload_concurrency: usize,

    /// Chunks fetched ahead while reading
    pub read_concurrency: usize,

    /// Passed to the compressor for every novel chunk
    pub compression_hint: CompressionHint,

    /// Re-hash every chunk after decompression
    pub verify_reads: bool,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            chunker: ChunkerConfig::default(),
            hash_threads: 0,
            hash_batch_size: HASH_BATCH_SIZE,
            upload_concurrency: 8,
            read_concurrency: 8,
            compression_hint: CompressionHint::Auto,
            verify_reads: true,
        }
    }
}

impl RepositoryConfig {
    pub fn with_chunker(mut self, chunker: ChunkerConfig) -> Self {
        self.chunker = chunker;
        self
    }

    pub fn with_hash_threads(mut self, threads: usize) -> Self {
        self.hash_threads = threads;
        self
    }

    pub fn with_hash_batch_size(mut self, batch_size: usize) -> Self {
        self.hash_batch_size = batch_size;
        self
    }

    pub fn with_upload_concurrency(mut self, n: usize) -> Self {
        self.upload_concurrency = n;
        self
    }

    pub fn with_read_concurrency(mut self, n: usize) -> Self {
        self.read_concurrency = n;
        self
    }

    pub fn with_compression_hint(mut self, hint: CompressionHint) -> Self {
        self.compression_hint = hint;
        self
    }

    pub fn with_verify_reads(mut self, verify: bool) -> Self {
        self.verify_reads = verify;
        self
    }
}

/// Outcome of [`Repository::store_file`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreReport {
    pub path: String,
    pub size: u64,
    pub chunk_count: usize,
    /// Chunks uploaded by this call
    pub new_chunks: usize,
    /// Chunks that were already stored
    pub deduplicated_chunks: usize,
    /// Compressed bytes uploaded by this call
    pub bytes_written: u64,
}

/// Per-position result of the upload stage
#[derive(Debug, Clone, Copy)]
struct ChunkOutcome {
    hash: ChunkId,
    inserted: bool,
    stored_size: u64,
}

fn task_failed(e: JoinError) -> ChunkVaultError {
    ChunkVaultError::Internal(format!("blocking task failed: {}", e))
}

pub struct Repository {
    config: RepositoryConfig,
    chunker: Chunker,
    hasher: Arc<HashPool>,
    backend: Arc<dyn StorageBackend>,
    compressor: Arc<dyn Compressor>,
    index: RwLock<DedupIndex>,
    chunk_locks: KeyedLock<ChunkId>,
    gate: tokio::sync::RwLock<()>,
}

impl Repository {
    /// Create a repository with an empty index
    pub fn new(
        config: RepositoryConfig,
        backend: Arc<dyn StorageBackend>,
        compressor: Arc<dyn Compressor>,
    ) -> Result<Self> {
        let chunker = Chunker::new(config.chunker.clone())?;
        let hasher = HashPool::new(config.hash_threads, config.hash_batch_size)?;

        info!(
            backend = backend.name(),
            algorithm = %chunker.algorithm(),
            target_chunk_size = config.chunker.target_chunk_size,
            hash_threads = hasher.threads(),
            "Created repository"
        );

        Ok(Self {
            config,
            chunker,
            hasher: Arc::new(hasher),
            backend,
            compressor,
            index: RwLock::new(DedupIndex::new()),
            chunk_locks: KeyedLock::new(),
            gate: tokio::sync::RwLock::new(()),
        })
    }

    /// Create a repository and load its persisted index
    pub async fn open(
        config: RepositoryConfig,
        backend: Arc<dyn StorageBackend>,
        compressor: Arc<dyn Compressor>,
    ) -> Result<Self> {
        let repo = Self::new(config, backend, compressor)?;
        repo.load_index().await?;
        Ok(repo)
    }

    pub fn config(&self) -> &RepositoryConfig {
        &self.config
    }

    pub fn backend(&self) -> &Arc<dyn StorageBackend> {
        &self.backend
    }

    // ===== Store =====

    /// Store `data` under `path`, replacing any file already there
    pub async fn store_file(&self, path: &str, data: Bytes) -> Result<StoreReport> {
        let chunks = self.chunker.split_bytes(&data);
        let (chunks, hashes) = self.hash_chunks(chunks).await?;

        let gate = self.gate.read().await;

        let positions = chunks.into_iter().zip(hashes.iter().copied());
        let outcomes: Vec<Result<ChunkOutcome>> = stream::iter(positions)
            .map(|(chunk, hash)| self.put_chunk(hash, chunk))
            .buffer_unordered(self.config.upload_concurrency.max(1))
            .collect()
            .await;

        let mut taken = Vec::with_capacity(outcomes.len());
        let mut failure = None;
        for outcome in outcomes {
            match outcome {
                Ok(o) => taken.push(o),
                Err(e) => {
                    failure.get_or_insert(e);
                }
            }
        }

        if let Some(err) = failure {
            let freed: Vec<ChunkNode> = {
                let mut index = self.index.write();
                taken.iter().filter_map(|o| index.release(&o.hash)).collect()
            };
            drop(gate);
            warn!(
                path,
                error = %err,
                released = taken.len(),
                "Store failed; released chunk references"
            );
            self.delete_blobs(freed).await;
            return Err(err);
        }

        let new_chunks = taken.iter().filter(|o| o.inserted).count();
        let report = StoreReport {
            path: path.to_string(),
            size: data.len() as u64,
            chunk_count: hashes.len(),
            new_chunks,
            deduplicated_chunks: hashes.len() - new_chunks,
            bytes_written: taken.iter().map(|o| o.stored_size).sum(),
        };

        let chunk_size = self.config.chunker.target_chunk_size as u64;
        let freed = self
            .index
            .write()
            .register_file(path, hashes, data.len() as u64, chunk_size);
        drop(gate);

        self.save_index().await?;
        self.delete_blobs(freed).await;

        info!(
            path,
            size = report.size,
            chunks = report.chunk_count,
            new_chunks = report.new_chunks,
            deduplicated = report.deduplicated_chunks,
            "Stored file"
        );
        Ok(report)
    }

    /// Hash on the pool, off the async executor
    async fn hash_chunks(&self, chunks: Vec<Bytes>) -> Result<(Vec<Bytes>, Vec<ChunkId>)> {
        let pool = self.hasher.clone();
        tokio::task::spawn_blocking(move || {
            let hashes = pool.hash_chunks(&chunks);
            (chunks, hashes)
        })
        .await
        .map_err(task_failed)
    }

    /// Take one reference on `hash`, uploading the chunk if it is new
    async fn put_chunk(&self, hash: ChunkId, data: Bytes) -> Result<ChunkOutcome> {
        let _lock = self.chunk_locks.lock(hash).await;

        let retained = self.index.write().retain(&hash);
        if retained.is_some() {
            debug!(hash = %hash, "Chunk already stored");
            return Ok(ChunkOutcome {
                hash,
                inserted: false,
                stored_size: 0,
            });
        }

        let size = data.len() as u64;
        let compressor = self.compressor.clone();
        let hint = self.config.compression_hint;
        let compressed = tokio::task::spawn_blocking(move || compressor.compress(&data, hint))
            .await
            .map_err(task_failed)??;

        let key = hash.storage_key();
        let stored_size = compressed.data.len() as u64;
        let storage_id = self.backend.put(&key, compressed.data).await?;

        let location = ChunkLocation {
            backend: self.backend.name().to_string(),
            storage_id: storage_id.0,
            compression: compressed.method,
            stored_size,
        };
        self.index.write().add_hashed_chunk(hash, size, location);

        debug!(hash = %hash, size, stored_size, method = %compressed.method, "Uploaded chunk");
        Ok(ChunkOutcome {
            hash,
            inserted: true,
            stored_size,
        })
    }

    // ===== Read =====

    /// Rebuild the whole file. `None` if `path` is unknown.
    pub async fn read_file(&self, path: &str) -> Result<Option<Bytes>> {
        let manifest = self.index.read().manifest(path).cloned();
        let Some(manifest) = manifest else {
            return Ok(None);
        };

        let mut out = BytesMut::with_capacity(manifest.size() as usize);
        let verify = self.config.verify_reads;
        let mut parts = stream::iter(manifest.chunks.iter().copied())
            .map(|hash| self.fetch_chunk(hash, verify))
            .buffered(self.config.read_concurrency.max(1));

        while let Some(part) = parts.next().await {
            out.extend_from_slice(&part?);
        }

        if out.len() as u64 != manifest.size() {
            return Err(ChunkVaultError::SizeMismatch {
                expected: manifest.size(),
                actual: out.len() as u64,
            });
        }

        debug!(path, size = out.len(), chunks = manifest.chunk_count(), "Read file");
        Ok(Some(out.freeze()))
    }

    /// Read `length` bytes starting at `offset`, fetching only the chunks
    /// that overlap the range. Truncated at end of file.
    pub async fn read_range(&self, path: &str, offset: u64, length: u64) -> Result<Option<Bytes>> {
        let manifest = self.index.read().manifest(path).cloned();
        let Some(manifest) = manifest else {
            return Ok(None);
        };

        let size = manifest.size();
        if offset >= size || length == 0 {
            return Ok(Some(Bytes::new()));
        }
        let end = offset.saturating_add(length).min(size);

        // (hash, start within chunk, end within chunk)
        let spans: Vec<(ChunkId, usize, usize)> = {
            let index = self.index.read();
            let mut spans = Vec::new();
            let mut pos = 0u64;
            for hash in &manifest.chunks {
                if pos >= end {
                    break;
                }
                let node = index.peek(hash).ok_or(ChunkVaultError::ChunkMissing(*hash))?;
                let chunk_end = pos + node.size;
                if chunk_end > offset {
                    let from = offset.saturating_sub(pos) as usize;
                    let to = (end.min(chunk_end) - pos) as usize;
                    spans.push((*hash, from, to));
                }
                pos = chunk_end;
            }
            spans
        };

        let mut out = BytesMut::with_capacity((end - offset) as usize);
        let verify = self.config.verify_reads;
        let mut parts = stream::iter(spans)
            .map(|(hash, from, to)| async move {
                let data = self.fetch_chunk(hash, verify).await?;
                Ok::<_, ChunkVaultError>(data.slice(from..to))
            })
            .buffered(self.config.read_concurrency.max(1));

        while let Some(part) = parts.next().await {
            out.extend_from_slice(&part?);
        }

        debug!(path, offset, length = out.len(), "Read range");
        Ok(Some(out.freeze()))
    }

    /// Fetch, decompress and check one chunk
    async fn fetch_chunk(&self, hash: ChunkId, verify: bool) -> Result<Bytes> {
        let node = self
            .index
            .write()
            .get_chunk(&hash)
            .cloned()
            .ok_or(ChunkVaultError::ChunkMissing(hash))?;

        let stored = self
            .backend
            .get(&node.storage_id)
            .await?
            .ok_or_else(|| ChunkVaultError::ChunkBlobMissing {
                hash,
                key: node.storage_id.clone(),
            })?;

        let compressor = self.compressor.clone();
        tokio::task::spawn_blocking(move || {
            let data = compressor.decompress(&stored, node.compression)?;
            if data.len() as u64 != node.size {
                return Err(ChunkVaultError::SizeMismatch {
                    expected: node.size,
                    actual: data.len() as u64,
                });
            }
            if verify && !hash.verify(&data) {
                return Err(ChunkVaultError::ChunkCorrupted {
                    expected: hash,
                    actual: ChunkId::from_data(&data),
                });
            }
            Ok(data)
        })
        .await
        .map_err(task_failed)?
    }

    /// Re-read every distinct chunk of `path` and check its digest.
    /// Returns the number of chunks checked, `None` if `path` is unknown.
    pub async fn verify_file(&self, path: &str) -> Result<Option<usize>> {
        let manifest = self.index.read().manifest(path).cloned();
        let Some(manifest) = manifest else {
            return Ok(None);
        };

        let mut distinct = manifest.chunks.clone();
        distinct.sort();
        distinct.dedup();

        let checked = stream::iter(distinct)
            .map(|hash| self.fetch_chunk(hash, true))
            .buffer_unordered(self.config.read_concurrency.max(1))
            .try_fold(0usize, |n, _| async move { Ok(n + 1) })
            .await?;

        info!(path, chunks = checked, "Verified file");
        Ok(Some(checked))
    }

    // ===== Remove and reclaim =====

    /// Remove `path`, deleting chunks no other file uses. `false` if unknown.
    pub async fn remove_file(&self, path: &str) -> Result<bool> {
        let gate = self.gate.read().await;
        let freed = self.index.write().remove_file(path);
        drop(gate);
        let Some(freed) = freed else {
            return Ok(false);
        };

        self.save_index().await?;
        let deleted = self.delete_blobs(freed).await;
        info!(path, deleted, "Removed file");
        Ok(true)
    }

    /// Drop every chunk with no references and delete its blob
    pub async fn garbage_collect(&self) -> Result<usize> {
        let gate = self.gate.read().await;
        let swept = self.index.write().garbage_collect();
        drop(gate);
        let count = swept.len();
        if count > 0 {
            self.save_index().await?;
            self.delete_blobs(swept).await;
        }
        info!(swept = count, "Garbage collection finished");
        Ok(count)
    }

    /// Evict unreferenced chunks, least recently used first, until at most
    /// `max_chunks` remain
    pub async fn evict_lru(&self, max_chunks: usize) -> Result<usize> {
        let gate = self.gate.read().await;
        let evicted = self.index.write().evict_lru(max_chunks);
        drop(gate);
        let count = evicted.len();
        if count > 0 {
            self.save_index().await?;
            self.delete_blobs(evicted).await;
        }
        info!(evicted = count, max_chunks, "LRU eviction finished");
        Ok(count)
    }

    /// Delete chunk blobs that no index entry points at
    pub async fn sweep_orphans(&self) -> Result<usize> {
        let keys = self.backend.list(CHUNK_KEY_PREFIX).await?;
        let mut deleted = 0;

        for key in keys {
            let parsed = key
                .strip_prefix(CHUNK_KEY_PREFIX)
                .and_then(|hex| hex.parse::<ChunkId>().ok());
            let Some(hash) = parsed else {
                debug!(key = %key, "Skipping non-chunk key");
                continue;
            };
            let _lock = self.chunk_locks.lock(hash).await;
            let indexed = self.index.read().chunks().contains(&hash);
            if !indexed && self.backend.delete(&key).await? {
                deleted += 1;
            }
        }

        if deleted > 0 {
            info!(deleted, "Deleted orphaned chunk blobs");
        }
        Ok(deleted)
    }

    /// Delete the blobs of freed nodes. A hash that was stored again in the
    /// meantime keeps its blob. Failures leave an orphan behind and are only
    /// logged; `sweep_orphans` reclaims them.
    async fn delete_blobs(&self, nodes: Vec<ChunkNode>) -> usize {
        let mut deleted = 0;
        for node in nodes {
            let _lock = self.chunk_locks.lock(node.hash).await;
            let present = self.index.read().chunks().contains(&node.hash);
            if present {
                debug!(hash = %node.hash, "Chunk re-added before deletion; keeping blob");
                continue;
            }

            match self.backend.delete(&node.storage_id).await {
                Ok(true) => deleted += 1,
                Ok(false) => debug!(key = %node.storage_id, "Chunk blob already gone"),
                Err(e) => warn!(key = %node.storage_id, error = %e, "Failed to delete chunk blob"),
            }
        }
        deleted
    }

    // ===== Persistence =====

    /// Write both indices to the backend as one snapshot
    pub async fn save_index(&self) -> Result<()> {
        let _gate = self.gate.write().await;
        let snapshot = self.index.read().export();
        let json = snapshot.to_json()?;
        let size = json.len();

        self.backend.put(INDEX_SNAPSHOT_KEY, json).await?;
        self.backend.flush().await?;

        debug!(
            files = snapshot.manifests.len(),
            chunks = snapshot.chunks.len(),
            size,
            "Saved index snapshot"
        );
        Ok(())
    }

    /// Replace the in-memory indices with the persisted snapshot. A missing
    /// or unreadable snapshot yields empty indices.
    pub async fn load_index(&self) -> Result<()> {
        let _gate = self.gate.write().await;

        let loaded = match self.backend.get(INDEX_SNAPSHOT_KEY).await? {
            None => {
                info!(key = INDEX_SNAPSHOT_KEY, "No index snapshot; starting empty");
                DedupIndex::new()
            }
            Some(data) => match IndexSnapshot::from_json(&data) {
                Ok(snapshot) => DedupIndex::import(snapshot),
                Err(e) => {
                    warn!(
                        key = INDEX_SNAPSHOT_KEY,
                        error = %e,
                        "Index snapshot is unreadable; starting empty"
                    );
                    DedupIndex::new()
                }
            },
        };

        *self.index.write() = loaded;
        Ok(())
    }

    // ===== Queries =====

    pub fn stats(&self) -> IndexStats {
        self.index.read().stats()
    }

    pub async fn backend_stats(&self) -> Result<StorageStats> {
        self.backend.stats().await
    }

    /// Stored paths, sorted
    pub fn list_files(&self) -> Vec<String> {
        self.index
            .read()
            .manifests()
            .paths()
            .map(str::to_string)
            .collect()
    }

    pub fn manifest(&self, path: &str) -> Option<FileManifest> {
        self.index.read().manifest(path).cloned()
    }

    pub fn contains(&self, path: &str) -> bool {
        self.index.read().manifests().contains(path)
    }

    /// Look up a chunk, updating its access time
    pub fn chunk(&self, hash: &ChunkId) -> Option<ChunkNode> {
        self.index.write().get_chunk(hash).cloned()
    }
}

impl std::fmt::Debug for Repository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repository")
            .field("backend", &self.backend.name())
            .field("config", &self.config)
            .field("hasher", &self.hasher)
            .finish()
    }
}
