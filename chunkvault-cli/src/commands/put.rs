//! Put Command
//!
//! Stores a local file, or every file under a directory, in the repository.

use super::{format_bytes, spinner};
use crate::symbols;
use anyhow::{Context, Result};
use bytes::Bytes;
use chunkvault_cas::{Repository, StoreReport};
use console::style;
use std::path::{Path, PathBuf};
use tokio::fs;

/// Put configuration
pub struct PutConfig {
    pub file: PathBuf,
    /// Logical path (or prefix for directories)
    pub target: Option<String>,
}

/// Run put command
pub async fn run(repo: &Repository, config: PutConfig) -> Result<()> {
    let path = config.file.as_path();

    if !path.exists() {
        anyhow::bail!("Path does not exist: {}", path.display());
    }

    if path.is_file() {
        let target = match config.target {
            Some(target) => normalize_path(&target),
            None => logical_path(None, Path::new(file_name(path))),
        };
        let report = put_file(repo, path, &target).await?;
        print_report(&report);
    } else if path.is_dir() {
        put_directory(repo, path, config.target.as_deref()).await?;
    } else {
        anyhow::bail!("Path is neither a file nor directory: {}", path.display());
    }

    Ok(())
}

async fn put_file(repo: &Repository, path: &Path, target: &str) -> Result<StoreReport> {
    let data = fs::read(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;

    let pb = spinner(format!("Storing {} ({})", target, format_bytes(data.len() as u64)))?;
    let result = repo.store_file(target, Bytes::from(data)).await;
    pb.finish_and_clear();

    result.with_context(|| format!("Failed to store {}", target))
}

async fn put_directory(repo: &Repository, dir: &Path, prefix: Option<&str>) -> Result<()> {
    let files = collect_files(dir).await?;

    if files.is_empty() {
        println!("{}", style("No files to store").yellow());
        return Ok(());
    }

    println!("{} {} files to store", style("Found").cyan(), files.len());

    let mut total_bytes: u64 = 0;
    let mut new_chunks = 0;
    let mut deduplicated_chunks = 0;

    for file in &files {
        let relative = file.strip_prefix(dir).unwrap_or(file);
        let target = logical_path(prefix, relative);
        let report = put_file(repo, file, &target).await?;

        println!(
            "  {} {} ({})",
            style(symbols::CHECK).green(),
            report.path,
            format_bytes(report.size)
        );

        total_bytes += report.size;
        new_chunks += report.new_chunks;
        deduplicated_chunks += report.deduplicated_chunks;
    }

    println!(
        "\n{} {} files, {} ({} new chunks, {} deduplicated)",
        style("Stored:").green().bold(),
        files.len(),
        format_bytes(total_bytes),
        new_chunks,
        deduplicated_chunks
    );

    Ok(())
}

fn print_report(report: &StoreReport) {
    println!(
        "{} {}\n  Size: {}\n  Chunks: {} ({} new, {} deduplicated)\n  Written: {}",
        style("Stored:").green().bold(),
        report.path,
        format_bytes(report.size),
        report.chunk_count,
        report.new_chunks,
        report.deduplicated_chunks,
        format_bytes(report.bytes_written)
    );
}

fn file_name(path: &Path) -> &str {
    path.file_name().and_then(|n| n.to_str()).unwrap_or("file")
}

/// Ensure a leading slash and no trailing one
fn normalize_path(path: &str) -> String {
    format!("/{}", path.trim_matches('/'))
}

/// Logical path for a file relative to an optional prefix
fn logical_path(prefix: Option<&str>, relative: &Path) -> String {
    let relative = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/");

    match prefix {
        Some(p) if !p.trim_matches('/').is_empty() => {
            format!("/{}/{}", p.trim_matches('/'), relative)
        }
        _ => format!("/{}", relative),
    }
}

/// Collect all files in a directory recursively
async fn collect_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let mut stack = vec![dir.to_path_buf()];

    while let Some(current) = stack.pop() {
        let mut entries = fs::read_dir(&current).await?;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();

            if path.is_dir() {
                stack.push(path);
            } else if path.is_file() {
                files.push(path);
            }
        }
    }

    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_logical_path() {
        assert_eq!(logical_path(None, Path::new("a.txt")), "/a.txt");
        assert_eq!(
            logical_path(Some("backups/"), Path::new("dir/a.txt")),
            "/backups/dir/a.txt"
        );
        assert_eq!(logical_path(Some("/"), Path::new("a.txt")), "/a.txt");
    }

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path("docs/a.txt"), "/docs/a.txt");
        assert_eq!(normalize_path("/docs/a.txt/"), "/docs/a.txt");
    }

    #[tokio::test]
    async fn test_collect_files_recurses() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("nested/deeper")).unwrap();
        std::fs::write(dir.path().join("top.txt"), b"1").unwrap();
        std::fs::write(dir.path().join("nested/deeper/leaf.txt"), b"2").unwrap();

        let files = collect_files(dir.path()).await.unwrap();
        assert_eq!(files.len(), 2);
        assert!(files.iter().any(|f| f.ends_with("nested/deeper/leaf.txt")));
    }
}
