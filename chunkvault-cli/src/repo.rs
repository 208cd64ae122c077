//! Repository access for commands
//!
//! Resolves the effective settings (config file overridden by flags) and opens
//! the repository with its persisted index.

use crate::config::ChunkVaultConfig;
use anyhow::{Context, Result};
use chunkvault_cas::{Repository, RepositoryConfig};
use chunkvault_storage::{open_backend, BackendKind, StorageConfig};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

/// Flags that override the config file
#[derive(Debug, Clone, Default)]
pub struct RepoOverrides {
    pub path: Option<PathBuf>,
    pub backend: Option<BackendKind>,
}

/// Open the repository described by `cfg` and `overrides`
pub async fn open(cfg: &ChunkVaultConfig, overrides: &RepoOverrides) -> Result<Repository> {
    let path = overrides
        .path
        .clone()
        .unwrap_or_else(|| cfg.repository.path.clone());
    let kind = overrides.backend.unwrap_or(cfg.repository.backend);

    debug!(path = %path.display(), backend = %kind, "Opening repository");

    let storage = StorageConfig::new(&path).with_kind(kind);
    let backend = open_backend(&storage)
        .await
        .with_context(|| format!("Failed to open {} backend at {}", kind, path.display()))?;

    let config = RepositoryConfig::default().with_chunker(cfg.chunking.to_chunker_config());
    let compressor = Arc::new(cfg.compression.to_compressor());

    Repository::open(config, backend, compressor)
        .await
        .context("Failed to load repository index")
}

/// Persist the index after a mutating command
pub async fn save(repo: &Repository) -> Result<()> {
    repo.save_index()
        .await
        .context("Failed to save repository index")
}
