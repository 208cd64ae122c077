//! Chunk identifiers
//!
//! Chunks are the unit of deduplication in chunkvault.
//! Each chunk is content-addressed by the Blake3 hash of its uncompressed bytes.

use crate::error::{ChunkVaultError, Result};
use crate::hash::ContentHash;
use crate::CHUNK_KEY_PREFIX;
use bytes::{Bytes, BytesMut};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Content-addressed chunk identifier
///
/// Rendered as 64 lowercase hex characters, which is also the form used in
/// backend keys (`/.cas/chunks/<hex>`) and in the index snapshot.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChunkId([u8; 32]);

impl ChunkId {
    /// Create a new ChunkId from raw bytes
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Create a ChunkId from a Blake3 hash
    pub fn from_hash(hash: &ContentHash) -> Self {
        Self(*hash.as_bytes())
    }

    /// Compute ChunkId from data (content-addressing)
    pub fn from_data(data: &[u8]) -> Self {
        let hash = ContentHash::compute(data);
        Self::from_hash(&hash)
    }

    /// Get the raw bytes
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Convert to lowercase hex
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from a 64-character hex string
    pub fn from_hex(s: &str) -> Result<Self> {
        let bytes = hex::decode(s).map_err(|e| ChunkVaultError::InvalidChunkId(e.to_string()))?;

        if bytes.len() != 32 {
            return Err(ChunkVaultError::InvalidChunkId(format!(
                "Invalid length: expected 32, got {}",
                bytes.len()
            )));
        }

        let mut arr = [0u8; 32];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }

    /// Backend key under which the compressed chunk is stored
    pub fn storage_key(&self) -> String {
        format!("{}{}", CHUNK_KEY_PREFIX, self.to_hex())
    }

    /// Check that `data` hashes to this identifier
    pub fn verify(&self, data: &[u8]) -> bool {
        Self::from_data(data) == *self
    }
}

impl fmt::Debug for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChunkId({})", &self.to_hex()[..16])
    }
}

impl fmt::Display for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl FromStr for ChunkId {
    type Err = ChunkVaultError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_hex(s)
    }
}

impl Serialize for ChunkId {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for ChunkId {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// Concatenate chunk payloads in order
pub fn reassemble_chunks<T: AsRef<[u8]>>(chunks: &[T]) -> Bytes {
    let total_size: usize = chunks.iter().map(|c| c.as_ref().len()).sum();
    let mut result = BytesMut::with_capacity(total_size);
    for chunk in chunks {
        result.extend_from_slice(chunk.as_ref());
    }
    result.freeze()
}
