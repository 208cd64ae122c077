//! List Command
//!
//! Lists files stored in the repository.

use super::format_bytes;
use anyhow::Result;
use chunkvault_cas::Repository;
use console::style;

/// List configuration
pub struct ListConfig {
    pub prefix: Option<String>,
    pub long_format: bool,
    pub human_readable: bool,
}

/// Run list command
pub async fn run(repo: &Repository, config: ListConfig) -> Result<()> {
    let paths: Vec<String> = repo
        .list_files()
        .into_iter()
        .filter(|p| match &config.prefix {
            Some(prefix) => p.starts_with(prefix.as_str()),
            None => true,
        })
        .collect();

    if paths.is_empty() {
        println!(
            "{} No files found with prefix '{}'",
            style("Info:").cyan(),
            config.prefix.as_deref().unwrap_or("(none)")
        );
        return Ok(());
    }

    if !config.long_format {
        for path in &paths {
            println!("{}", path);
        }
        return Ok(());
    }

    println!(
        "{:<40} {:>12} {:>8} {:>8} {}",
        style("PATH").bold(),
        style("SIZE").bold(),
        style("CHUNKS").bold(),
        style("RATIO").bold(),
        style("CREATED").bold()
    );
    println!("{}", "-".repeat(96));

    let mut total_size: u64 = 0;

    for path in &paths {
        let Some(manifest) = repo.manifest(path) else {
            continue;
        };
        total_size += manifest.size();

        let size_str = if config.human_readable {
            format_bytes(manifest.size())
        } else {
            manifest.size().to_string()
        };

        println!(
            "{:<40} {:>12} {:>8} {:>8.2} {}",
            truncate_path(path, 40),
            size_str,
            manifest.chunk_count(),
            manifest.metadata.compression_ratio,
            manifest.metadata.created_at.format("%Y-%m-%d %H:%M:%S")
        );
    }

    println!("{}", "-".repeat(96));
    println!(
        "{} files, {} total",
        paths.len(),
        if config.human_readable {
            format_bytes(total_size)
        } else {
            format!("{} bytes", total_size)
        }
    );

    Ok(())
}

/// Truncate a path to fit the column, keeping its tail
fn truncate_path(path: &str, max_len: usize) -> String {
    let count = path.chars().count();
    if count <= max_len {
        path.to_string()
    } else {
        let tail: String = path.chars().skip(count - (max_len - 3)).collect();
        format!("...{}", tail)
    }
}
