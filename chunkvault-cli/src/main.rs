//! chunkvault CLI
//!
//! Command-line client for a local deduplicating chunk repository.
//!
//! # Commands
//! - `put` - Store a file or directory
//! - `get` - Reassemble a stored file
//! - `cat` - Print a byte range of a stored file
//! - `rm` - Remove a stored file
//! - `ls` - List stored files
//! - `stats` - Show deduplication statistics
//! - `gc` - Collect unreferenced chunks and orphaned blobs
//! - `evict` - Evict least recently used unreferenced chunks
//! - `verify` - Re-hash every chunk of a file
//! - `config` - Show or edit configuration
//!
//! # Configuration
//! Config file: ~/.chunkvault/config.toml

use anyhow::Result;
use chunkvault_storage::BackendKind;
use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;

mod commands;
mod config;
mod repo;
mod symbols;

use commands::{get, list, maintenance, put, remove, stats};
use repo::RepoOverrides;

#[derive(Parser)]
#[command(name = "chunkvault")]
#[command(about = "Deduplicating content-addressed file store")]
#[command(version)]
struct Cli {
    /// Repository directory (overrides config file)
    #[arg(long, global = true, env = "CHUNKVAULT_REPO")]
    repo: Option<PathBuf>,

    /// Storage backend: file or sled (overrides config file)
    #[arg(long, global = true)]
    backend: Option<BackendKind>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Store a file or directory
    Put {
        /// Local file or directory
        file: PathBuf,

        /// Logical path (prefix when storing a directory)
        #[arg(long = "as")]
        target: Option<String>,
    },

    /// Reassemble a stored file
    Get {
        /// Logical path
        path: String,

        /// Output file (stdout if omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print a byte range of a stored file
    Cat {
        /// Logical path
        path: String,

        /// First byte to read
        #[arg(long, default_value = "0")]
        offset: u64,

        /// Bytes to read (to end of file if omitted)
        #[arg(long)]
        length: Option<u64>,
    },

    /// Remove a stored file
    Rm {
        /// Logical path
        path: String,
    },

    /// List stored files
    Ls {
        /// Filter by path prefix
        #[arg(short, long)]
        prefix: Option<String>,

        /// Show detailed information
        #[arg(short, long)]
        long: bool,

        /// Human-readable sizes
        #[arg(short = 'H', long)]
        human_readable: bool,
    },

    /// Show deduplication statistics
    Stats {
        /// Print JSON
        #[arg(long)]
        json: bool,
    },

    /// Collect unreferenced chunks and orphaned blobs
    Gc,

    /// Evict least recently used unreferenced chunks
    Evict {
        /// Chunk count to trim the index down to
        #[arg(long)]
        max_chunks: usize,
    },

    /// Re-hash every chunk of a stored file
    Verify {
        /// Logical path
        path: String,
    },

    /// Show or initialize configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Show current configuration
    Show,

    /// Show config file path
    Path,

    /// Initialize config file with defaults
    Init {
        /// Overwrite existing config
        #[arg(short, long)]
        force: bool,
    },

    /// Set a configuration value
    Set {
        /// Configuration key (e.g., repository.backend, chunking.algorithm)
        key: String,
        /// Value to set
        value: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let level = match cli.verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()),
        )
        .init();

    // Load configuration from ~/.chunkvault/config.toml
    let cfg = config::load_config();

    // CLI args override config file
    let overrides = RepoOverrides {
        path: cli.repo,
        backend: cli.backend,
    };
    let open = || repo::open(&cfg, &overrides);

    match cli.command {
        Commands::Put { file, target } => {
            let config = put::PutConfig { file, target };
            put::run(&open().await?, config).await?;
        }

        Commands::Get { path, output } => {
            let config = get::GetConfig { path, output };
            get::run(&open().await?, config).await?;
        }

        Commands::Cat {
            path,
            offset,
            length,
        } => {
            let config = get::CatConfig {
                path,
                offset,
                length,
            };
            get::cat(&open().await?, config).await?;
        }

        Commands::Rm { path } => {
            let config = remove::RemoveConfig { path };
            remove::run(&open().await?, config).await?;
        }

        Commands::Ls {
            prefix,
            long,
            human_readable,
        } => {
            let config = list::ListConfig {
                prefix,
                long_format: long,
                human_readable,
            };
            list::run(&open().await?, config).await?;
        }

        Commands::Stats { json } => {
            let config = stats::StatsConfig { json };
            stats::run(&open().await?, config).await?;
        }

        Commands::Gc => {
            maintenance::gc(&open().await?).await?;
        }

        Commands::Evict { max_chunks } => {
            let config = maintenance::EvictConfig { max_chunks };
            maintenance::evict(&open().await?, config).await?;
        }

        Commands::Verify { path } => {
            let config = maintenance::VerifyConfig { path };
            maintenance::verify(&open().await?, config).await?;
        }

        Commands::Config { command } => {
            handle_config_command(command)?;
        }
    }

    Ok(())
}

/// Handle config subcommands
fn handle_config_command(command: Option<ConfigCommands>) -> Result<()> {
    use console::style;

    match command {
        None | Some(ConfigCommands::Show) => {
            // Show current configuration
            let cfg = config::try_load_config()?;
            println!();
            println!("{}", style("chunkvault Configuration").bold().underlined());
            println!();
            println!("{}", style("[repository]").cyan());
            println!("  path = \"{}\"", cfg.repository.path.display());
            println!("  backend = \"{}\"", cfg.repository.backend);
            println!();
            println!("{}", style("[chunking]").cyan());
            println!("  min_chunk_size = {}", cfg.chunking.min_chunk_size);
            println!("  target_chunk_size = {}", cfg.chunking.target_chunk_size);
            println!("  max_chunk_size = {}", cfg.chunking.max_chunk_size);
            println!("  algorithm = \"{}\"", cfg.chunking.algorithm);
            println!();
            println!("{}", style("[compression]").cyan());
            println!("  method = \"{}\"", cfg.compression.method);
            match cfg.compression.level {
                Some(level) => println!("  level = {}", level),
                None => println!("  level = {}", style("(codec default)").dim()),
            }
            println!();

            // Show config file path
            if let Ok(path) = config::config_file_path() {
                println!("{} {}", style("Config file:").dim(), path.display());
                if !path.exists() {
                    println!(
                        "{} Run '{}' to create it",
                        style("(not created yet)").yellow(),
                        style("chunkvault config init").green()
                    );
                }
            }
        }

        Some(ConfigCommands::Path) => {
            if let Ok(path) = config::config_file_path() {
                println!("{}", path.display());
            }
        }

        Some(ConfigCommands::Init { force }) => {
            let path = config::config_file_path()?;
            if path.exists() && !force {
                println!(
                    "{} Config file already exists at {}",
                    style(symbols::WARN).yellow(),
                    path.display()
                );
                println!("Use --force to overwrite");
                return Ok(());
            }

            config::save_config(&config::ChunkVaultConfig::default())?;
            println!(
                "{} Config file created at {}",
                style(symbols::CHECK).green(),
                path.display()
            );
        }

        Some(ConfigCommands::Set { key, value }) => {
            let mut cfg = config::try_load_config()?;
            cfg.set(&key, &value)?;
            config::save_config(&cfg)?;
            println!("{} Configuration updated", style(symbols::CHECK).green());
        }
    }

    Ok(())
}
