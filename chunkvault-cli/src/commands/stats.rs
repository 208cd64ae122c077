//! Stats Command
//!
//! Shows deduplication and backend statistics.

use super::format_bytes;
use crate::symbols;
use anyhow::{Context, Result};
use chunkvault_cas::Repository;
use console::style;

/// Stats configuration
pub struct StatsConfig {
    /// Print machine-readable JSON
    pub json: bool,
}

/// Run stats command
pub async fn run(repo: &Repository, config: StatsConfig) -> Result<()> {
    let stats = repo.stats();
    let backend = repo
        .backend_stats()
        .await
        .context("Failed to read backend statistics")?;

    if config.json {
        let value = serde_json::json!({
            "index": serde_json::to_value(&stats)?,
            "backend": {
                "name": repo.backend().name(),
                "objects": backend.object_count,
                "bytesUsed": backend.bytes_used,
                "bytesCapacity": backend.bytes_capacity,
            },
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    println!();
    println!("{}", style("Repository Statistics").bold().underlined());
    println!("{}", symbols::HLINE);
    println!("  Files:              {}", stats.total_files);
    println!("  Chunks:             {}", stats.total_chunks);
    println!("  Logical size:       {}", format_bytes(stats.total_size));
    println!("  Deduplicated size:  {}", format_bytes(stats.deduplicated_size));
    println!("  Stored size:        {}", format_bytes(stats.stored_size));
    println!("  Average refs/chunk: {:.2}", stats.average_ref_count);
    println!(
        "  Dedup ratio:        {}",
        style(format!("{:.2}x", stats.compression_ratio)).cyan()
    );
    println!();
    println!("{}", style("Backend").bold().underlined());
    println!("{}", symbols::HLINE);
    println!("  Type:               {}", repo.backend().name());
    println!("  Objects:            {}", backend.object_count);
    println!("  Used:               {}", format_bytes(backend.bytes_used));
    if backend.bytes_capacity > 0 {
        println!(
            "  Capacity:           {} ({:.1}% used)",
            format_bytes(backend.bytes_capacity),
            backend.usage_percent()
        );
        if backend.is_full() {
            println!("  {} Backend is full", style(symbols::WARN).yellow());
        }
    }
    println!();

    Ok(())
}
