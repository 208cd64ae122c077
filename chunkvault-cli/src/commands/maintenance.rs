//! Maintenance Commands
//!
//! Garbage collection, LRU eviction and integrity checks.

use crate::symbols;
use anyhow::{Context, Result};
use chunkvault_cas::Repository;
use console::style;

/// Evict configuration
pub struct EvictConfig {
    pub max_chunks: usize,
}

/// Verify configuration
pub struct VerifyConfig {
    pub path: String,
}

/// Run gc: drop unreferenced chunks, then unindexed blobs
pub async fn gc(repo: &Repository) -> Result<()> {
    let collected = repo
        .garbage_collect()
        .await
        .context("Garbage collection failed")?;
    let swept = repo
        .sweep_orphans()
        .await
        .context("Orphan sweep failed")?;

    println!(
        "{} Collected {} unreferenced chunks, swept {} orphaned blobs",
        style(symbols::CHECK).green(),
        collected,
        swept
    );
    Ok(())
}

/// Run evict: trim unreferenced chunks down to `max_chunks`
pub async fn evict(repo: &Repository, config: EvictConfig) -> Result<()> {
    let evicted = repo
        .evict_lru(config.max_chunks)
        .await
        .context("Eviction failed")?;

    let remaining = repo.stats().total_chunks;
    println!(
        "{} Evicted {} chunks ({} remaining)",
        style(symbols::CHECK).green(),
        evicted,
        remaining
    );
    if remaining > config.max_chunks {
        println!(
            "{} {} chunks are still referenced by files",
            style(symbols::WARN).yellow(),
            remaining
        );
    }
    Ok(())
}

/// Run verify: re-hash every chunk of a file
pub async fn verify(repo: &Repository, config: VerifyConfig) -> Result<()> {
    let result = repo.verify_file(&config.path).await;

    match result {
        Ok(Some(chunks)) => {
            println!(
                "{} {} verified ({} distinct chunks)",
                style(symbols::CHECK).green(),
                config.path,
                chunks
            );
            Ok(())
        }
        Ok(None) => anyhow::bail!("File not found: {}", config.path),
        Err(e) => {
            println!(
                "{} {} failed verification",
                style(symbols::CROSS).red(),
                config.path
            );
            Err(e).with_context(|| format!("Verification of {} failed", config.path))
        }
    }
}
