//! chunkvault content-addressed store
//!
//! Deduplicating file repository built on the core chunker and hasher:
//! - `ChunkIndex`: hash → chunk node with reference counts, GC and LRU eviction
//! - `ManifestIndex`: path → ordered chunk hashes
//! - `DedupIndex`: both tables kept consistent, with stats and snapshots
//! - `Repository`: store, read, range-read and remove files over any
//!   `StorageBackend`

pub mod chunk_index;
pub mod index;
pub mod keyed_lock;
pub mod manifest;
pub mod repository;
pub mod snapshot;

pub use chunk_index::{AddedChunk, ChunkIndex, ChunkLocation, ChunkNode};
pub use index::{DedupIndex, IndexStats};
pub use keyed_lock::KeyedLock;
pub use manifest::{FileManifest, ManifestIndex, ManifestMetadata};
pub use repository::{Repository, RepositoryConfig, StoreReport};
pub use snapshot::IndexSnapshot;
