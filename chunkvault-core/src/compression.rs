//! Chunk compression
//!
//! The repository compresses each novel chunk before handing it to the
//! backend and records the method on the chunk's index entry. The same
//! method must be passed back on decompression.

use crate::error::{ChunkVaultError, Result};
use bytes::Bytes;
use flate2::read::{GzDecoder, GzEncoder};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Read;
use std::str::FromStr;

/// Default zstd level (matches the zstd CLI default)
pub const DEFAULT_ZSTD_LEVEL: i32 = 3;

/// Default gzip level
pub const DEFAULT_GZIP_LEVEL: u32 = 6;

/// How a stored chunk was encoded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressionMethod {
    /// Stored as-is
    #[default]
    None,
    Zstd,
    Gzip,
}

impl CompressionMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            CompressionMethod::None => "none",
            CompressionMethod::Zstd => "zstd",
            CompressionMethod::Gzip => "gzip",
        }
    }
}

impl fmt::Display for CompressionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CompressionMethod {
    type Err = ChunkVaultError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "none" | "store" => Ok(CompressionMethod::None),
            "zstd" => Ok(CompressionMethod::Zstd),
            "gzip" | "gz" => Ok(CompressionMethod::Gzip),
            other => Err(ChunkVaultError::Configuration(format!(
                "unknown compression method '{}' (expected none, zstd or gzip)",
                other
            ))),
        }
    }
}

/// Caller preference passed along with each compression request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressionHint {
    /// Configured method and level; raw if compression does not help
    #[default]
    Auto,
    /// Favor throughput
    Speed,
    /// Favor ratio
    Ratio,
    /// Do not compress
    Store,
}

/// Output of [`Compressor::compress`]
#[derive(Debug, Clone)]
pub struct Compressed {
    pub data: Bytes,
    pub method: CompressionMethod,
}

/// Compression collaborator used by the repository
pub trait Compressor: Send + Sync {
    /// Compress a chunk, reporting the method actually used
    fn compress(&self, data: &[u8], hint: CompressionHint) -> Result<Compressed>;

    /// Decode data produced with `method`
    fn decompress(&self, data: &[u8], method: CompressionMethod) -> Result<Bytes>;
}

/// zstd / gzip compressor
#[derive(Debug, Clone)]
pub struct CodecCompressor {
    method: CompressionMethod,
    level: Option<i32>,
}

impl Default for CodecCompressor {
    fn default() -> Self {
        Self::new(CompressionMethod::Zstd)
    }
}

impl CodecCompressor {
    /// Compressor for `method` at its default level
    pub fn new(method: CompressionMethod) -> Self {
        Self {
            method,
            level: None,
        }
    }

    /// Compressor that never compresses
    pub fn store_only() -> Self {
        Self::new(CompressionMethod::None)
    }

    /// Override the compression level
    pub fn with_level(mut self, level: i32) -> Self {
        self.level = Some(level);
        self
    }

    /// Preferred method
    pub fn method(&self) -> CompressionMethod {
        self.method
    }

    fn zstd_level(&self, hint: CompressionHint) -> i32 {
        match hint {
            CompressionHint::Speed => 1,
            CompressionHint::Ratio => 19,
            _ => self.level.unwrap_or(DEFAULT_ZSTD_LEVEL).clamp(1, 22),
        }
    }

    fn gzip_level(&self, hint: CompressionHint) -> flate2::Compression {
        match hint {
            CompressionHint::Speed => flate2::Compression::fast(),
            CompressionHint::Ratio => flate2::Compression::best(),
            _ => flate2::Compression::new(
                self.level
                    .map(|l| l.clamp(0, 9) as u32)
                    .unwrap_or(DEFAULT_GZIP_LEVEL),
            ),
        }
    }

    fn encode(&self, data: &[u8], hint: CompressionHint) -> Result<Vec<u8>> {
        match self.method {
            CompressionMethod::None => Ok(data.to_vec()),
            CompressionMethod::Zstd => zstd::encode_all(data, self.zstd_level(hint))
                .map_err(|e| ChunkVaultError::Compression(format!("zstd: {}", e))),
            CompressionMethod::Gzip => {
                let mut encoder = GzEncoder::new(data, self.gzip_level(hint));
                let mut out = Vec::new();
                encoder
                    .read_to_end(&mut out)
                    .map_err(|e| ChunkVaultError::Compression(format!("gzip: {}", e)))?;
                Ok(out)
            }
        }
    }
}

impl Compressor for CodecCompressor {
    fn compress(&self, data: &[u8], hint: CompressionHint) -> Result<Compressed> {
        if hint == CompressionHint::Store || self.method == CompressionMethod::None {
            return Ok(Compressed {
                data: Bytes::copy_from_slice(data),
                method: CompressionMethod::None,
            });
        }

        let encoded = self.encode(data, hint)?;
        if hint == CompressionHint::Auto && encoded.len() >= data.len() {
            return Ok(Compressed {
                data: Bytes::copy_from_slice(data),
                method: CompressionMethod::None,
            });
        }

        Ok(Compressed {
            data: Bytes::from(encoded),
            method: self.method,
        })
    }

    fn decompress(&self, data: &[u8], method: CompressionMethod) -> Result<Bytes> {
        let decode_err = |reason: String| ChunkVaultError::Decompression { method, reason };

        match method {
            CompressionMethod::None => Ok(Bytes::copy_from_slice(data)),
            CompressionMethod::Zstd => zstd::decode_all(data)
                .map(Bytes::from)
                .map_err(|e| decode_err(e.to_string())),
            CompressionMethod::Gzip => {
                let mut decoder = GzDecoder::new(data);
                let mut out = Vec::new();
                decoder
                    .read_to_end(&mut out)
                    .map_err(|e| decode_err(e.to_string()))?;
                Ok(Bytes::from(out))
            }
        }
    }
}
