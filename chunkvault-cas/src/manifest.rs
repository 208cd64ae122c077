//! File manifests
//!
//! A manifest maps a logical path to the ordered list of chunk hashes whose
//! concatenation is the file's content.

use chrono::{DateTime, Utc};
use chunkvault_core::ChunkId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Size bookkeeping for a stored file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestMetadata {
    /// Length of the file as stored
    pub original_size: u64,
    /// Sum of the sizes of the file's distinct chunks
    pub deduplicated_size: u64,
    /// `original_size / deduplicated_size`
    pub compression_ratio: f64,
    /// Target chunk size the file was split with
    pub chunk_size: u64,
    pub created_at: DateTime<Utc>,
}

impl ManifestMetadata {
    pub fn new(original_size: u64, deduplicated_size: u64, chunk_size: u64) -> Self {
        let compression_ratio = if deduplicated_size == 0 {
            1.0
        } else {
            original_size as f64 / deduplicated_size as f64
        };
        Self {
            original_size,
            deduplicated_size,
            compression_ratio,
            chunk_size,
            created_at: Utc::now(),
        }
    }
}

/// Path to ordered chunk list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileManifest {
    pub path: String,
    /// In file order; a hash may repeat
    pub chunks: Vec<ChunkId>,
    pub metadata: ManifestMetadata,
}

impl FileManifest {
    pub fn size(&self) -> u64 {
        self.metadata.original_size
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }
}

/// All manifests, keyed by path
#[derive(Debug, Default)]
pub struct ManifestIndex {
    manifests: BTreeMap<String, FileManifest>,
}

impl ManifestIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert, returning the manifest previously stored at the same path
    pub fn insert(&mut self, manifest: FileManifest) -> Option<FileManifest> {
        self.manifests.insert(manifest.path.clone(), manifest)
    }

    pub fn get(&self, path: &str) -> Option<&FileManifest> {
        self.manifests.get(path)
    }

    pub fn remove(&mut self, path: &str) -> Option<FileManifest> {
        self.manifests.remove(path)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.manifests.contains_key(path)
    }

    /// Paths in sorted order
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.manifests.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &FileManifest> {
        self.manifests.values()
    }

    pub fn len(&self) -> usize {
        self.manifests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.manifests.is_empty()
    }
}

impl FromIterator<(String, FileManifest)> for ManifestIndex {
    fn from_iter<I: IntoIterator<Item = (String, FileManifest)>>(iter: I) -> Self {
        Self {
            manifests: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manifest(path: &str, size: u64) -> FileManifest {
        FileManifest {
            path: path.to_string(),
            chunks: vec![ChunkId::from_data(path.as_bytes())],
            metadata: ManifestMetadata::new(size, size, 32 * 1024),
        }
    }

    #[test]
    fn test_ratio() {
        assert_eq!(ManifestMetadata::new(200, 100, 1).compression_ratio, 2.0);
        assert_eq!(ManifestMetadata::new(0, 0, 1).compression_ratio, 1.0);
    }

    #[test]
    fn test_insert_replaces() {
        let mut index = ManifestIndex::new();
        assert!(index.insert(manifest("/a", 1)).is_none());
        let old = index.insert(manifest("/a", 2)).unwrap();
        assert_eq!(old.size(), 1);
        assert_eq!(index.get("/a").unwrap().size(), 2);
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_paths_sorted() {
        let mut index = ManifestIndex::new();
        for path in ["/c", "/a", "/b"] {
            index.insert(manifest(path, 1));
        }
        let paths: Vec<&str> = index.paths().collect();
        assert_eq!(paths, vec!["/a", "/b", "/c"]);

        assert!(index.remove("/b").is_some());
        assert!(!index.contains("/b"));
    }

    #[test]
    fn test_serde_shape() {
        let m = manifest("/doc.txt", 10);
        let json = serde_json::to_value(&m).unwrap();
        assert_eq!(json["path"], "/doc.txt");
        assert_eq!(json["metadata"]["originalSize"], 10);
        assert!(json["chunks"][0].is_string());
    }
}
