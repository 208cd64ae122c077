//! Persisted form of the combined index
//!
//! Stored as JSON at `/.cas/index.json`:
//! `{"manifests": [[path, manifest], ...], "chunks": [[hash, node], ...]}`

use crate::chunk_index::ChunkNode;
use crate::manifest::FileManifest;
use bytes::Bytes;
use chunkvault_core::{ChunkId, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndexSnapshot {
    pub manifests: Vec<(String, FileManifest)>,
    pub chunks: Vec<(ChunkId, ChunkNode)>,
}

impl IndexSnapshot {
    pub fn to_json(&self) -> Result<Bytes> {
        Ok(Bytes::from(serde_json::to_vec(self)?))
    }

    pub fn from_json(data: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(data)?)
    }

    pub fn is_empty(&self) -> bool {
        self.manifests.is_empty() && self.chunks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chunkvault_core::ChunkVaultError;

    #[test]
    fn test_empty_shape() {
        let json = IndexSnapshot::default().to_json().unwrap();
        assert_eq!(json.as_ref(), br#"{"manifests":[],"chunks":[]}"#);
    }

    #[test]
    fn test_garbage_is_serialization_error() {
        assert!(matches!(
            IndexSnapshot::from_json(b"{not json"),
            Err(ChunkVaultError::Serialization(_))
        ));
        assert!(IndexSnapshot::from_json(br#"{"manifests":{}}"#).is_err());
    }
}
