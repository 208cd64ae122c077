//! Content-defined chunking
//!
//! Splits a byte buffer into chunks so that a small edit only changes the
//! chunks next to it. Three algorithms are available:
//!
//! - `Fixed`: cut every `target_chunk_size` bytes. Any insertion shifts every
//!   later boundary, so there is no dedup across edits. Useful as a baseline.
//! - `Rabin`: polynomial rolling hash over a 48-byte window, cut when the low
//!   13 bits are zero (about 8 KiB past the minimum).
//! - `FastCdc` (default): gear rolling hash with two masks, a strict one below
//!   the target size and a coarser one between target and maximum.
//!
//! Boundaries depend only on the bytes and the configuration. **Changing the
//! configuration or the gear seed changes every boundary** and defeats
//! deduplication against previously stored data.

use crate::error::{ChunkVaultError, Result};
use crate::{DEFAULT_CHUNK_SIZE, MAX_CHUNK_SIZE, MIN_CHUNK_SIZE};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Seed of the gear table.
pub const GEAR_SEED: u64 = 0x6368_756e_6b76_6c74;

/// Rabin rolling window in bytes
const RABIN_WINDOW: usize = 48;

/// 13 bits: one cut every ~8 KiB on random input
const RABIN_MASK: u64 = (1 << 13) - 1;

/// Odd multiplier for the Rabin polynomial
const RABIN_PRIME: u64 = 0x0000_0100_0000_01b3;

/// `RABIN_PRIME ^ RABIN_WINDOW`, used to drop the byte leaving the window
const RABIN_OUT_FACTOR: u64 = wrapping_pow(RABIN_PRIME, RABIN_WINDOW);

static GEAR: [u64; 256] = build_gear_table(GEAR_SEED);

const fn splitmix64(state: u64) -> (u64, u64) {
    let state = state.wrapping_add(0x9e37_79b9_7f4a_7c15);
    let mut z = state;
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    (state, z ^ (z >> 31))
}

const fn build_gear_table(seed: u64) -> [u64; 256] {
    let mut table = [0u64; 256];
    let mut state = seed;
    let mut i = 0;
    while i < 256 {
        let (next, value) = splitmix64(state);
        state = next;
        table[i] = value;
        i += 1;
    }
    table
}

const fn wrapping_pow(base: u64, exp: usize) -> u64 {
    let mut acc = 1u64;
    let mut i = 0;
    while i < exp {
        acc = acc.wrapping_mul(base);
        i += 1;
    }
    acc
}

/// Mask with the top `bits` bits set.
///
/// The gear hash shifts left once per byte, so the top bits cover the last
/// 64 bytes of input while the low bits only cover the last few.
fn top_bits_mask(bits: u32) -> u64 {
    match bits.min(63) {
        0 => 0,
        b => u64::MAX << (64 - b),
    }
}

/// Chunk boundary algorithm
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkingAlgorithm {
    Fixed,
    Rabin,
    #[default]
    #[serde(rename = "fastcdc")]
    FastCdc,
}

impl ChunkingAlgorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChunkingAlgorithm::Fixed => "fixed",
            ChunkingAlgorithm::Rabin => "rabin",
            ChunkingAlgorithm::FastCdc => "fastcdc",
        }
    }
}

impl fmt::Display for ChunkingAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChunkingAlgorithm {
    type Err = ChunkVaultError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "fixed" => Ok(ChunkingAlgorithm::Fixed),
            "rabin" => Ok(ChunkingAlgorithm::Rabin),
            "fastcdc" | "fast-cdc" | "gear" => Ok(ChunkingAlgorithm::FastCdc),
            other => Err(ChunkVaultError::InvalidChunkerConfig(format!(
                "unknown chunking algorithm '{}' (expected fixed, rabin or fastcdc)",
                other
            ))),
        }
    }
}

/// Chunker configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkerConfig {
    /// No content-defined cut below this size (the last chunk may be smaller)
    pub min_chunk_size: usize,

    /// A cut is forced at this size
    pub max_chunk_size: usize,

    /// Average size aimed for; the fixed chunker cuts exactly here
    pub target_chunk_size: usize,

    /// Boundary algorithm
    pub algorithm: ChunkingAlgorithm,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            min_chunk_size: MIN_CHUNK_SIZE,
            max_chunk_size: MAX_CHUNK_SIZE,
            target_chunk_size: DEFAULT_CHUNK_SIZE,
            algorithm: ChunkingAlgorithm::default(),
        }
    }
}

impl ChunkerConfig {
    /// Create a config with explicit sizes
    pub fn new(min: usize, target: usize, max: usize, algorithm: ChunkingAlgorithm) -> Self {
        Self {
            min_chunk_size: min,
            max_chunk_size: max,
            target_chunk_size: target,
            algorithm,
        }
    }

    /// Set the algorithm
    pub fn with_algorithm(mut self, algorithm: ChunkingAlgorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    /// Read overrides from the environment, falling back to the defaults.
    ///
    /// Variables: `CHUNKVAULT_MIN_CHUNK_SIZE`, `CHUNKVAULT_TARGET_CHUNK_SIZE`,
    /// `CHUNKVAULT_MAX_CHUNK_SIZE`, `CHUNKVAULT_CHUNKING`.
    pub fn from_env() -> Self {
        fn size_var(name: &str, default: usize) -> usize {
            std::env::var(name)
                .ok()
                .and_then(|v| v.parse::<usize>().ok())
                .unwrap_or(default)
        }

        let defaults = Self::default();
        Self {
            min_chunk_size: size_var("CHUNKVAULT_MIN_CHUNK_SIZE", defaults.min_chunk_size),
            max_chunk_size: size_var("CHUNKVAULT_MAX_CHUNK_SIZE", defaults.max_chunk_size),
            target_chunk_size: size_var("CHUNKVAULT_TARGET_CHUNK_SIZE", defaults.target_chunk_size),
            algorithm: std::env::var("CHUNKVAULT_CHUNKING")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.algorithm),
        }
    }

    /// Check `0 < min <= target <= max`
    pub fn validate(&self) -> Result<()> {
        if self.min_chunk_size == 0 || self.target_chunk_size == 0 {
            return Err(ChunkVaultError::InvalidChunkerConfig(
                "chunk sizes must be greater than zero".to_string(),
            ));
        }
        if self.min_chunk_size > self.target_chunk_size {
            return Err(ChunkVaultError::InvalidChunkerConfig(format!(
                "min_chunk_size ({}) exceeds target_chunk_size ({})",
                self.min_chunk_size, self.target_chunk_size
            )));
        }
        if self.target_chunk_size > self.max_chunk_size {
            return Err(ChunkVaultError::InvalidChunkerConfig(format!(
                "target_chunk_size ({}) exceeds max_chunk_size ({})",
                self.target_chunk_size, self.max_chunk_size
            )));
        }
        Ok(())
    }
}

/// Splits buffers into chunks according to a [`ChunkerConfig`]
#[derive(Debug, Clone)]
pub struct Chunker {
    config: ChunkerConfig,
    mask_s: u64,
    mask_l: u64,
}

impl Chunker {
    /// Create a chunker, validating the configuration
    pub fn new(config: ChunkerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::from_valid(config))
    }

    fn from_valid(config: ChunkerConfig) -> Self {
        let bits = config.target_chunk_size.ilog2();
        Self {
            mask_s: top_bits_mask(bits),
            mask_l: top_bits_mask(bits + 1),
            config,
        }
    }

    /// The configuration in use
    pub fn config(&self) -> &ChunkerConfig {
        &self.config
    }

    /// The boundary algorithm in use
    pub fn algorithm(&self) -> ChunkingAlgorithm {
        self.config.algorithm
    }

    /// Exclusive end offsets of each chunk. Empty input has no chunks.
    pub fn cut_points(&self, data: &[u8]) -> Vec<usize> {
        let mut cuts = Vec::with_capacity(data.len() / self.config.target_chunk_size + 1);
        let mut start = 0;
        while start < data.len() {
            let len = self.next_chunk_len(&data[start..]);
            start += len;
            cuts.push(start);
        }
        cuts
    }

    /// Split `data` into borrowed chunks whose concatenation is `data`
    pub fn split_into_chunks<'a>(&self, data: &'a [u8]) -> Vec<&'a [u8]> {
        let mut start = 0;
        self.cut_points(data)
            .into_iter()
            .map(|end| {
                let chunk = &data[start..end];
                start = end;
                chunk
            })
            .collect()
    }

    /// Split `data` into zero-copy `Bytes` views
    pub fn split_bytes(&self, data: &Bytes) -> Vec<Bytes> {
        let mut start = 0;
        self.cut_points(data)
            .into_iter()
            .map(|end| {
                let chunk = data.slice(start..end);
                start = end;
                chunk
            })
            .collect()
    }

    /// Length of the chunk starting at `src[0]`. `src` is never empty.
    fn next_chunk_len(&self, src: &[u8]) -> usize {
        match self.config.algorithm {
            ChunkingAlgorithm::Fixed => src.len().min(self.config.target_chunk_size),
            ChunkingAlgorithm::Rabin => self.rabin_cut(src),
            ChunkingAlgorithm::FastCdc => self.fastcdc_cut(src),
        }
    }

    fn rabin_cut(&self, src: &[u8]) -> usize {
        let min = self.config.min_chunk_size;
        let max = src.len().min(self.config.max_chunk_size);
        if src.len() <= min {
            return src.len();
        }

        let mut hash: u64 = 0;
        for i in 0..max {
            hash = hash
                .wrapping_mul(RABIN_PRIME)
                .wrapping_add(src[i] as u64 + 1);
            if i >= RABIN_WINDOW {
                let outgoing = src[i - RABIN_WINDOW] as u64 + 1;
                hash = hash.wrapping_sub(outgoing.wrapping_mul(RABIN_OUT_FACTOR));
            }
            if i + 1 >= min && hash & RABIN_MASK == 0 {
                return i + 1;
            }
        }
        max
    }

    fn fastcdc_cut(&self, src: &[u8]) -> usize {
        let min = self.config.min_chunk_size;
        if src.len() <= min {
            return src.len();
        }
        let max = src.len().min(self.config.max_chunk_size);
        let normal = self.config.target_chunk_size.min(max);

        let mut hash: u64 = 0;
        let mut i = min;

        while i < normal {
            hash = (hash << 1).wrapping_add(GEAR[src[i] as usize]);
            if hash & self.mask_s == 0 {
                return i + 1;
            }
            i += 1;
        }

        while i < max {
            hash = (hash << 1).wrapping_add(GEAR[src[i] as usize]);
            if hash & self.mask_l == 0 {
                return i + 1;
            }
            i += 1;
        }

        max
    }
}

impl Default for Chunker {
    fn default() -> Self {
        Self::from_valid(ChunkerConfig::default())
    }
}
