//! Configuration management
//!
//! Handles storing and loading CLI configuration.
//! Config directory: ~/.chunkvault/ (override with CHUNKVAULT_HOME)
//!
//! Config file format (~/.chunkvault/config.toml):
//! ```toml
//! [repository]
//! path = "/home/me/.chunkvault/repo"
//! backend = "file"
//!
//! [chunking]
//! min_chunk_size = 4096
//! target_chunk_size = 32768
//! max_chunk_size = 65536
//! algorithm = "fastcdc"
//!
//! [compression]
//! method = "zstd"
//! level = 3
//! ```

use chunkvault_core::{ChunkerConfig, ChunkingAlgorithm, CodecCompressor, CompressionMethod};
use chunkvault_storage::BackendKind;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use thiserror::Error;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Could not determine home directory")]
    NoHomeDir,

    #[error("Failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Unknown config key: {0}. Valid keys: {keys}", keys = VALID_KEYS.join(", "))]
    UnknownKey(String),

    #[error("Invalid value for {key}: {reason}")]
    InvalidValue { key: String, reason: String },
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Keys accepted by `chunkvault config set`
pub const VALID_KEYS: &[&str] = &[
    "repository.path",
    "repository.backend",
    "chunking.min_chunk_size",
    "chunking.target_chunk_size",
    "chunking.max_chunk_size",
    "chunking.algorithm",
    "compression.method",
    "compression.level",
];

/// Structure of ~/.chunkvault/config.toml
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ChunkVaultConfig {
    /// Where the repository lives
    #[serde(default)]
    pub repository: RepositorySettings,

    /// Chunk boundaries
    #[serde(default)]
    pub chunking: ChunkingSettings,

    /// Chunk compression
    #[serde(default)]
    pub compression: CompressionSettings,
}

/// Repository location settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepositorySettings {
    /// Repository directory
    #[serde(default = "default_repo_path")]
    pub path: PathBuf,

    /// Backend implementation
    #[serde(default = "default_backend")]
    pub backend: BackendKind,
}

impl Default for RepositorySettings {
    fn default() -> Self {
        Self {
            path: default_repo_path(),
            backend: default_backend(),
        }
    }
}

fn default_repo_path() -> PathBuf {
    match std::env::var("CHUNKVAULT_REPO") {
        Ok(path) => PathBuf::from(path),
        Err(_) => config_dir_path()
            .map(|dir| dir.join("repo"))
            .unwrap_or_else(|_| PathBuf::from("./chunkvault_data")),
    }
}

fn default_backend() -> BackendKind {
    std::env::var("CHUNKVAULT_BACKEND")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or_default()
}

/// Chunking settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkingSettings {
    #[serde(default = "default_min_chunk_size")]
    pub min_chunk_size: usize,

    #[serde(default = "default_target_chunk_size")]
    pub target_chunk_size: usize,

    #[serde(default = "default_max_chunk_size")]
    pub max_chunk_size: usize,

    #[serde(default = "default_algorithm")]
    pub algorithm: ChunkingAlgorithm,
}

impl Default for ChunkingSettings {
    fn default() -> Self {
        Self {
            min_chunk_size: default_min_chunk_size(),
            target_chunk_size: default_target_chunk_size(),
            max_chunk_size: default_max_chunk_size(),
            algorithm: default_algorithm(),
        }
    }
}

fn default_min_chunk_size() -> usize {
    ChunkerConfig::from_env().min_chunk_size
}

fn default_target_chunk_size() -> usize {
    ChunkerConfig::from_env().target_chunk_size
}

fn default_max_chunk_size() -> usize {
    ChunkerConfig::from_env().max_chunk_size
}

fn default_algorithm() -> ChunkingAlgorithm {
    ChunkerConfig::from_env().algorithm
}

impl ChunkingSettings {
    pub fn to_chunker_config(&self) -> ChunkerConfig {
        ChunkerConfig::new(
            self.min_chunk_size,
            self.target_chunk_size,
            self.max_chunk_size,
            self.algorithm,
        )
    }
}

/// Compression settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompressionSettings {
    #[serde(default = "default_compression_method")]
    pub method: CompressionMethod,

    /// Codec level; codec default when unset
    #[serde(default)]
    pub level: Option<i32>,
}

impl Default for CompressionSettings {
    fn default() -> Self {
        Self {
            method: default_compression_method(),
            level: None,
        }
    }
}

fn default_compression_method() -> CompressionMethod {
    std::env::var("CHUNKVAULT_COMPRESSION")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(CompressionMethod::Zstd)
}

impl CompressionSettings {
    pub fn to_compressor(&self) -> CodecCompressor {
        let codec = CodecCompressor::new(self.method);
        match self.level {
            Some(level) => codec.with_level(level),
            None => codec,
        }
    }
}

impl ChunkVaultConfig {
    /// Set a value by dotted key, as used by `config set`
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        fn invalid(key: &str, reason: impl ToString) -> ConfigError {
            ConfigError::InvalidValue {
                key: key.to_string(),
                reason: reason.to_string(),
            }
        }
        fn size(key: &str, value: &str) -> Result<usize> {
            value.parse().map_err(|e| invalid(key, e))
        }

        match key {
            "repository.path" => self.repository.path = PathBuf::from(value),
            "repository.backend" => {
                self.repository.backend = value.parse().map_err(|e| invalid(key, e))?
            }
            "chunking.min_chunk_size" => self.chunking.min_chunk_size = size(key, value)?,
            "chunking.target_chunk_size" => self.chunking.target_chunk_size = size(key, value)?,
            "chunking.max_chunk_size" => self.chunking.max_chunk_size = size(key, value)?,
            "chunking.algorithm" => {
                self.chunking.algorithm = value.parse().map_err(|e| invalid(key, e))?
            }
            "compression.method" => {
                self.compression.method = value.parse().map_err(|e| invalid(key, e))?
            }
            "compression.level" => {
                self.compression.level = if value == "default" {
                    None
                } else {
                    Some(value.parse().map_err(|e| invalid(key, e))?)
                }
            }
            _ => return Err(ConfigError::UnknownKey(key.to_string())),
        }

        if key.starts_with("chunking.") {
            self.chunking
                .to_chunker_config()
                .validate()
                .map_err(|e| invalid(key, e))?;
        }
        Ok(())
    }
}

fn config_dir_path() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var("CHUNKVAULT_HOME") {
        return Ok(PathBuf::from(dir));
    }
    let home = dirs::home_dir().ok_or(ConfigError::NoHomeDir)?;
    Ok(home.join(".chunkvault"))
}

/// Get the config directory path (~/.chunkvault/), creating it if needed
pub fn config_dir() -> Result<PathBuf> {
    let config_dir = config_dir_path()?;

    if !config_dir.exists() {
        fs::create_dir_all(&config_dir).map_err(|source| ConfigError::Io {
            path: config_dir.clone(),
            source,
        })?;
    }

    Ok(config_dir)
}

/// Get the config file path
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join("config.toml"))
}

/// Read the config file; defaults if it does not exist
pub fn try_load_config() -> Result<ChunkVaultConfig> {
    let path = config_file_path()?;
    if !path.exists() {
        return Ok(ChunkVaultConfig::default());
    }
    let content = fs::read_to_string(&path).map_err(|source| ConfigError::Io {
        path: path.clone(),
        source,
    })?;
    Ok(toml::from_str(&content)?)
}

/// Load configuration from file
/// Falls back to defaults if the file is missing or broken
pub fn load_config() -> ChunkVaultConfig {
    match try_load_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Warning: {}", e);
            ChunkVaultConfig::default()
        }
    }
}

/// Save configuration to file
pub fn save_config(config: &ChunkVaultConfig) -> Result<()> {
    let path = config_file_path()?;
    let content = toml::to_string_pretty(config)?;
    fs::write(&path, content).map_err(|source| ConfigError::Io { path, source })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ChunkVaultConfig::default();
        assert!(config.chunking.min_chunk_size <= config.chunking.target_chunk_size);
        assert!(config.chunking.target_chunk_size <= config.chunking.max_chunk_size);
        assert!(config.chunking.to_chunker_config().validate().is_ok());
    }

    #[test]
    fn test_config_serialization() {
        let config = ChunkVaultConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();

        // Should contain all sections
        assert!(toml_str.contains("[repository]"));
        assert!(toml_str.contains("[chunking]"));
        assert!(toml_str.contains("[compression]"));
        assert!(toml_str.contains("target_chunk_size"));
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: ChunkVaultConfig = toml::from_str(
            r#"
            [chunking]
            algorithm = "rabin"
            "#,
        )
        .unwrap();
        assert_eq!(config.chunking.algorithm, ChunkingAlgorithm::Rabin);
        assert!(config.chunking.target_chunk_size > 0);
        assert_eq!(config.compression.level, None);
    }

    #[test]
    fn test_set_values() {
        let mut config = ChunkVaultConfig::default();

        config.set("repository.backend", "sled").unwrap();
        assert_eq!(config.repository.backend, BackendKind::Sled);

        config.set("compression.method", "gzip").unwrap();
        config.set("compression.level", "9").unwrap();
        assert_eq!(config.compression.method, CompressionMethod::Gzip);
        assert_eq!(config.compression.level, Some(9));
        config.set("compression.level", "default").unwrap();
        assert_eq!(config.compression.level, None);

        config.set("chunking.algorithm", "fixed").unwrap();
        assert_eq!(config.chunking.algorithm, ChunkingAlgorithm::Fixed);
    }

    #[test]
    fn test_set_rejects_bad_input() {
        let mut config = ChunkVaultConfig::default();

        assert!(matches!(
            config.set("nope.key", "1"),
            Err(ConfigError::UnknownKey(_))
        ));
        assert!(matches!(
            config.set("chunking.min_chunk_size", "lots"),
            Err(ConfigError::InvalidValue { .. })
        ));
        // min above target fails validation
        assert!(matches!(
            config.set("chunking.min_chunk_size", "1000000"),
            Err(ConfigError::InvalidValue { .. })
        ));
    }
}
