//! Combined chunk and manifest index
//!
//! [`DedupIndex`] keeps the chunk table and the manifest table consistent:
//! every manifest position holds exactly one reference on its chunk.

use crate::chunk_index::{AddedChunk, ChunkIndex, ChunkLocation, ChunkNode};
use crate::manifest::{FileManifest, ManifestIndex, ManifestMetadata};
use crate::snapshot::IndexSnapshot;
use bytes::Bytes;
use chunkvault_core::ChunkId;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, info};

/// Aggregate index statistics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexStats {
    pub total_chunks: usize,
    pub total_files: usize,
    /// Sum of manifest original sizes
    pub total_size: u64,
    /// Sum of chunk sizes (each distinct chunk once)
    pub deduplicated_size: u64,
    /// Sum of compressed chunk sizes
    pub stored_size: u64,
    pub average_ref_count: f64,
    /// `total_size / deduplicated_size`
    pub compression_ratio: f64,
}

#[derive(Debug, Default)]
pub struct DedupIndex {
    chunks: ChunkIndex,
    manifests: ManifestIndex,
}

impl DedupIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn chunks(&self) -> &ChunkIndex {
        &self.chunks
    }

    pub fn manifests(&self) -> &ManifestIndex {
        &self.manifests
    }

    pub fn add_chunk(&mut self, data: &Bytes, location: ChunkLocation) -> AddedChunk {
        self.chunks.add_chunk(data, location)
    }

    pub fn add_hashed_chunk(&mut self, hash: ChunkId, size: u64, location: ChunkLocation) -> AddedChunk {
        self.chunks.add_hashed_chunk(hash, size, location)
    }

    pub fn retain(&mut self, hash: &ChunkId) -> Option<u32> {
        self.chunks.retain(hash)
    }

    pub fn release(&mut self, hash: &ChunkId) -> Option<ChunkNode> {
        self.chunks.release(hash)
    }

    pub fn get_chunk(&mut self, hash: &ChunkId) -> Option<&ChunkNode> {
        self.chunks.get_chunk(hash)
    }

    pub fn peek(&self, hash: &ChunkId) -> Option<&ChunkNode> {
        self.chunks.peek(hash)
    }

    pub fn manifest(&self, path: &str) -> Option<&FileManifest> {
        self.manifests.get(path)
    }

    /// Record the manifest for `path`. The caller has already taken one
    /// reference per entry of `hashes`.
    ///
    /// When a previous manifest existed its references are released after
    /// the new ones are in place; chunks that dropped to zero are returned
    /// so their blobs can be deleted.
    pub fn register_file(
        &mut self,
        path: &str,
        hashes: Vec<ChunkId>,
        original_size: u64,
        chunk_size: u64,
    ) -> Vec<ChunkNode> {
        let mut seen = HashSet::with_capacity(hashes.len());
        let deduplicated_size: u64 = hashes
            .iter()
            .filter(|h| seen.insert(**h))
            .filter_map(|h| self.chunks.peek(h))
            .map(|n| n.size)
            .sum();

        let manifest = FileManifest {
            path: path.to_string(),
            chunks: hashes,
            metadata: ManifestMetadata::new(original_size, deduplicated_size, chunk_size),
        };
        debug!(
            path,
            chunks = manifest.chunks.len(),
            original_size,
            deduplicated_size,
            "Registered manifest"
        );

        match self.manifests.insert(manifest) {
            Some(old) => {
                let freed = self.release_all(&old.chunks);
                debug!(path, freed = freed.len(), "Replaced existing manifest");
                freed
            }
            None => Vec::new(),
        }
    }

    /// Drop a manifest and all of its references. `None` if the path is
    /// unknown, otherwise the chunks that reached zero.
    pub fn remove_file(&mut self, path: &str) -> Option<Vec<ChunkNode>> {
        let manifest = self.manifests.remove(path)?;
        let freed = self.release_all(&manifest.chunks);
        debug!(path, freed = freed.len(), "Removed manifest");
        Some(freed)
    }

    fn release_all(&mut self, hashes: &[ChunkId]) -> Vec<ChunkNode> {
        hashes.iter().filter_map(|h| self.chunks.release(h)).collect()
    }

    pub fn garbage_collect(&mut self) -> Vec<ChunkNode> {
        self.chunks.garbage_collect()
    }

    pub fn evict_lru(&mut self, max_chunks: usize) -> Vec<ChunkNode> {
        self.chunks.evict_lru(max_chunks)
    }

    pub fn stats(&self) -> IndexStats {
        let total_chunks = self.chunks.len();
        let total_size: u64 = self.manifests.iter().map(|m| m.size()).sum();
        let deduplicated_size: u64 = self.chunks.iter().map(|n| n.size).sum();
        let stored_size: u64 = self.chunks.iter().map(|n| n.stored_size).sum();
        let total_refs: u64 = self.chunks.iter().map(|n| n.ref_count as u64).sum();

        IndexStats {
            total_chunks,
            total_files: self.manifests.len(),
            total_size,
            deduplicated_size,
            stored_size,
            average_ref_count: if total_chunks == 0 {
                0.0
            } else {
                total_refs as f64 / total_chunks as f64
            },
            compression_ratio: if deduplicated_size == 0 {
                1.0
            } else {
                total_size as f64 / deduplicated_size as f64
            },
        }
    }

    /// Copy both tables into a snapshot, sorted for stable output
    pub fn export(&self) -> IndexSnapshot {
        let manifests = self
            .manifests
            .iter()
            .map(|m| (m.path.clone(), m.clone()))
            .collect();
        let mut chunks: Vec<(ChunkId, ChunkNode)> =
            self.chunks.iter().map(|n| (n.hash, n.clone())).collect();
        chunks.sort_by_key(|(hash, _)| *hash);

        IndexSnapshot { manifests, chunks }
    }

    /// Rebuild from a snapshot
    pub fn import(snapshot: IndexSnapshot) -> Self {
        let index = Self {
            chunks: ChunkIndex::from_nodes(snapshot.chunks),
            manifests: snapshot.manifests.into_iter().collect(),
        };
        info!(
            files = index.manifests.len(),
            chunks = index.chunks.len(),
            "Imported index snapshot"
        );
        index
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chunkvault_core::CompressionMethod;

    fn location(hash: &ChunkId) -> ChunkLocation {
        ChunkLocation {
            backend: "memory".to_string(),
            storage_id: hash.storage_key(),
            compression: CompressionMethod::None,
            stored_size: 10,
        }
    }

    /// Take references the way the repository does, then register
    fn store(index: &mut DedupIndex, path: &str, parts: &[&[u8]]) -> Vec<ChunkNode> {
        let mut hashes = Vec::new();
        for part in parts {
            let hash = ChunkId::from_data(part);
            index.add_hashed_chunk(hash, part.len() as u64, location(&hash));
            hashes.push(hash);
        }
        let size = parts.iter().map(|p| p.len() as u64).sum();
        index.register_file(path, hashes, size, 4)
    }

    #[test]
    fn test_register_counts_positions() {
        let mut index = DedupIndex::new();
        store(&mut index, "/a", &[b"xxxx", b"yyyy", b"xxxx"]);

        let x = ChunkId::from_data(b"xxxx");
        assert_eq!(index.peek(&x).unwrap().ref_count, 2);

        let manifest = index.manifest("/a").unwrap();
        assert_eq!(manifest.metadata.original_size, 12);
        assert_eq!(manifest.metadata.deduplicated_size, 8);
        assert_eq!(manifest.metadata.compression_ratio, 1.5);
    }

    #[test]
    fn test_remove_releases_every_position() {
        let mut index = DedupIndex::new();
        store(&mut index, "/a", &[b"xxxx", b"xxxx"]);
        store(&mut index, "/b", &[b"xxxx", b"zzzz"]);

        let freed = index.remove_file("/a").unwrap();
        assert!(freed.is_empty());
        assert_eq!(index.peek(&ChunkId::from_data(b"xxxx")).unwrap().ref_count, 1);

        let freed = index.remove_file("/b").unwrap();
        assert_eq!(freed.len(), 2);
        assert!(index.chunks().is_empty());
        assert!(index.remove_file("/b").is_none());
    }

    #[test]
    fn test_replace_keeps_shared_chunks() {
        let mut index = DedupIndex::new();
        store(&mut index, "/a", &[b"keep", b"drop"]);

        let freed = store(&mut index, "/a", &[b"keep", b"new!"]);
        assert_eq!(freed.len(), 1);
        assert_eq!(freed[0].hash, ChunkId::from_data(b"drop"));

        let keep = index.peek(&ChunkId::from_data(b"keep")).unwrap();
        assert_eq!(keep.ref_count, 1);
        assert_eq!(index.manifests().len(), 1);
    }

    #[test]
    fn test_stats() {
        let mut index = DedupIndex::new();
        assert_eq!(index.stats().compression_ratio, 1.0);
        assert_eq!(index.stats().average_ref_count, 0.0);

        store(&mut index, "/a", &[b"aaaa", b"bbbb"]);
        store(&mut index, "/b", &[b"aaaa", b"bbbb"]);

        let stats = index.stats();
        assert_eq!(stats.total_files, 2);
        assert_eq!(stats.total_chunks, 2);
        assert_eq!(stats.total_size, 16);
        assert_eq!(stats.deduplicated_size, 8);
        assert_eq!(stats.stored_size, 20);
        assert_eq!(stats.average_ref_count, 2.0);
        assert_eq!(stats.compression_ratio, 2.0);
    }

    #[test]
    fn test_gc_sweeps_zero_count_nodes() {
        let mut index = DedupIndex::new();
        store(&mut index, "/a", &[b"live"]);
        let orphan = ChunkId::from_data(b"orphan");
        index.add_hashed_chunk(orphan, 6, location(&orphan));
        for node in index.chunks.nodes_mut() {
            if node.hash == orphan {
                node.ref_count = 0;
            }
        }

        let swept = index.garbage_collect();
        assert_eq!(swept.len(), 1);
        assert!(index.chunks().iter().all(|n| n.ref_count > 0));
    }

    #[test]
    fn test_export_import() {
        let mut index = DedupIndex::new();
        store(&mut index, "/a", &[b"1111", b"2222"]);
        store(&mut index, "/b", &[b"2222"]);

        let snapshot = index.export();
        let json = snapshot.to_json().unwrap();
        let restored = DedupIndex::import(IndexSnapshot::from_json(&json).unwrap());

        assert_eq!(restored.export(), snapshot);
        assert_eq!(restored.stats(), index.stats());
        assert_eq!(
            restored.manifest("/a").unwrap().chunks,
            index.manifest("/a").unwrap().chunks
        );
    }
}
