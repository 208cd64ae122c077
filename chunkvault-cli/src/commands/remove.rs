//! Remove Command
//!
//! Removes a file; chunks no other file references are deleted with it.

use crate::symbols;
use anyhow::{Context, Result};
use chunkvault_cas::Repository;
use console::style;

/// Remove configuration
pub struct RemoveConfig {
    pub path: String,
}

/// Run remove command
pub async fn run(repo: &Repository, config: RemoveConfig) -> Result<()> {
    let before = repo.stats().total_chunks;

    let removed = repo
        .remove_file(&config.path)
        .await
        .with_context(|| format!("Failed to remove {}", config.path))?;

    if !removed {
        anyhow::bail!("File not found: {}", config.path);
    }

    let freed = before.saturating_sub(repo.stats().total_chunks);
    println!(
        "{} Removed {} ({} chunks freed)",
        style(symbols::CHECK).green(),
        config.path,
        freed
    );

    Ok(())
}
