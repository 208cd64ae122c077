//! Get and Cat Commands
//!
//! Reassembles a stored file, whole or by byte range.

use super::{format_bytes, spinner};
use crate::{repo, symbols};
use anyhow::{Context, Result};
use chunkvault_cas::Repository;
use console::style;
use std::path::PathBuf;
use tokio::fs;
use tokio::io::AsyncWriteExt;

/// Get configuration
pub struct GetConfig {
    pub path: String,
    /// Output file; stdout when unset
    pub output: Option<PathBuf>,
}

/// Cat (range read) configuration
pub struct CatConfig {
    pub path: String,
    pub offset: u64,
    pub length: Option<u64>,
}

/// Run get command
pub async fn run(repo: &Repository, config: GetConfig) -> Result<()> {
    let pb = match config.output {
        Some(_) => Some(spinner(format!("Reading {}", config.path))?),
        None => None,
    };
    let result = repo.read_file(&config.path).await;
    if let Some(pb) = pb {
        pb.finish_and_clear();
    }

    let data = result
        .with_context(|| format!("Failed to read {}", config.path))?
        .ok_or_else(|| anyhow::anyhow!("File not found: {}", config.path))?;

    match config.output {
        Some(output) => {
            if let Some(parent) = output.parent() {
                if !parent.as_os_str().is_empty() {
                    fs::create_dir_all(parent).await?;
                }
            }
            fs::write(&output, &data)
                .await
                .with_context(|| format!("Failed to write {}", output.display()))?;

            println!(
                "{} {} -> {} ({})",
                style(symbols::CHECK).green(),
                config.path,
                output.display(),
                format_bytes(data.len() as u64)
            );
        }
        None => write_stdout(&data).await?,
    }

    // Reads refresh chunk recency for eviction
    repo::save(repo).await
}

/// Run cat command
pub async fn cat(repo: &Repository, config: CatConfig) -> Result<()> {
    let length = match config.length {
        Some(length) => length,
        None => repo
            .manifest(&config.path)
            .map(|m| m.size().saturating_sub(config.offset))
            .unwrap_or(0),
    };

    let data = repo
        .read_range(&config.path, config.offset, length)
        .await
        .with_context(|| format!("Failed to read {}", config.path))?
        .ok_or_else(|| anyhow::anyhow!("File not found: {}", config.path))?;

    write_stdout(&data).await?;
    repo::save(repo).await
}

async fn write_stdout(data: &[u8]) -> Result<()> {
    let mut stdout = tokio::io::stdout();
    stdout.write_all(data).await?;
    stdout.flush().await?;
    Ok(())
}
