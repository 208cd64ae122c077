//! Hash-indexed chunk table
//!
//! Every distinct chunk stored in the repository has one [`ChunkNode`]
//! recording where its compressed bytes live and how many manifest positions
//! reference it.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use chunkvault_core::{ChunkId, CompressionMethod};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, warn};

/// Where and how a chunk's compressed bytes are stored
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkLocation {
    /// Backend name
    pub backend: String,
    /// Identifier returned by the backend
    pub storage_id: String,
    /// Method the bytes were compressed with
    pub compression: CompressionMethod,
    /// Compressed length
    pub stored_size: u64,
}

/// One deduplicated unit of content
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkNode {
    /// Digest of the uncompressed bytes
    pub hash: ChunkId,
    /// Uncompressed length
    pub size: u64,
    /// Manifest positions referencing this chunk
    pub ref_count: u32,
    pub backend: String,
    pub storage_id: String,
    pub compression: CompressionMethod,
    pub stored_size: u64,
    pub created_at: DateTime<Utc>,
    pub last_accessed_at: DateTime<Utc>,
    /// Monotonic access counter, breaks timestamp ties in LRU order
    #[serde(default)]
    pub access_tick: u64,
}

impl ChunkNode {
    fn new(hash: ChunkId, size: u64, location: ChunkLocation, tick: u64) -> Self {
        let now = Utc::now();
        Self {
            hash,
            size,
            ref_count: 1,
            backend: location.backend,
            storage_id: location.storage_id,
            compression: location.compression,
            stored_size: location.stored_size,
            created_at: now,
            last_accessed_at: now,
            access_tick: tick,
        }
    }

    /// Backend key of the compressed bytes
    pub fn storage_key(&self) -> &str {
        &self.storage_id
    }

    fn lru_key(&self) -> (DateTime<Utc>, u64) {
        (self.last_accessed_at, self.access_tick)
    }
}

/// Result of [`ChunkIndex::add_chunk`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddedChunk {
    pub hash: ChunkId,
    /// `false` when the hash was already present; the caller must not upload
    pub inserted: bool,
}

/// Map from hash to [`ChunkNode`]
#[derive(Debug, Default)]
pub struct ChunkIndex {
    nodes: HashMap<ChunkId, ChunkNode>,
    tick: u64,
}

impl ChunkIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from exported nodes
    pub fn from_nodes(nodes: impl IntoIterator<Item = (ChunkId, ChunkNode)>) -> Self {
        let nodes: HashMap<ChunkId, ChunkNode> = nodes.into_iter().collect();
        let tick = nodes.values().map(|n| n.access_tick).max().unwrap_or(0);
        Self { nodes, tick }
    }

    fn next_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }

    /// Hash `data` and add one reference to it
    pub fn add_chunk(&mut self, data: &Bytes, location: ChunkLocation) -> AddedChunk {
        let hash = ChunkId::from_data(data);
        self.add_hashed_chunk(hash, data.len() as u64, location)
    }

    /// Add one reference to an already hashed chunk, inserting it if novel
    pub fn add_hashed_chunk(&mut self, hash: ChunkId, size: u64, location: ChunkLocation) -> AddedChunk {
        if self.retain(&hash).is_some() {
            return AddedChunk {
                hash,
                inserted: false,
            };
        }

        let tick = self.next_tick();
        self.nodes.insert(hash, ChunkNode::new(hash, size, location, tick));
        debug!(hash = %hash, size, "Indexed new chunk");
        AddedChunk {
            hash,
            inserted: true,
        }
    }

    /// Increment the count of a known chunk and touch it
    pub fn retain(&mut self, hash: &ChunkId) -> Option<u32> {
        let tick = self.next_tick();
        let node = self.nodes.get_mut(hash)?;
        node.ref_count = node.ref_count.saturating_add(1);
        node.last_accessed_at = Utc::now();
        node.access_tick = tick;
        Some(node.ref_count)
    }

    /// Look up a chunk, updating its access time
    pub fn get_chunk(&mut self, hash: &ChunkId) -> Option<&ChunkNode> {
        let tick = self.next_tick();
        let node = self.nodes.get_mut(hash)?;
        node.last_accessed_at = Utc::now();
        node.access_tick = tick;
        Some(node)
    }

    /// Look up a chunk without touching it
    pub fn peek(&self, hash: &ChunkId) -> Option<&ChunkNode> {
        self.nodes.get(hash)
    }

    pub fn contains(&self, hash: &ChunkId) -> bool {
        self.nodes.contains_key(hash)
    }

    /// Drop one reference. A node reaching zero is removed and returned.
    pub fn release(&mut self, hash: &ChunkId) -> Option<ChunkNode> {
        let node = self.nodes.get_mut(hash)?;
        node.ref_count = node.ref_count.saturating_sub(1);
        if node.ref_count == 0 {
            return self.nodes.remove(hash);
        }
        None
    }

    /// Remove every node with no references
    pub fn garbage_collect(&mut self) -> Vec<ChunkNode> {
        let dead: Vec<ChunkId> = self
            .nodes
            .values()
            .filter(|n| n.ref_count == 0)
            .map(|n| n.hash)
            .collect();
        dead.iter().filter_map(|h| self.nodes.remove(h)).collect()
    }

    /// Remove unreferenced nodes, least recently used first, until at most
    /// `max_chunks` remain. Referenced nodes are never evicted.
    pub fn evict_lru(&mut self, max_chunks: usize) -> Vec<ChunkNode> {
        if self.nodes.len() <= max_chunks {
            return Vec::new();
        }

        let mut candidates: Vec<(DateTime<Utc>, u64, ChunkId)> = self
            .nodes
            .values()
            .filter(|n| n.ref_count == 0)
            .map(|n| {
                let (at, tick) = n.lru_key();
                (at, tick, n.hash)
            })
            .collect();
        candidates.sort();

        let excess = self.nodes.len() - max_chunks;
        let evicted: Vec<ChunkNode> = candidates
            .into_iter()
            .take(excess)
            .filter_map(|(_, _, hash)| self.nodes.remove(&hash))
            .collect();

        if evicted.len() < excess {
            warn!(
                max_chunks,
                remaining = self.nodes.len(),
                "Chunk index still above limit; remaining chunks are referenced"
            );
        }
        evicted
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ChunkNode> {
        self.nodes.values()
    }

    #[cfg(test)]
    pub(crate) fn nodes_mut(&mut self) -> impl Iterator<Item = &mut ChunkNode> {
        self.nodes.values_mut()
    }
}
