//! Weft CLI entry point

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;
mod config;

#[derive(Parser)]
#[command(name = "weft")]
#[command(about = "Incremental build engine for embedded GraphQL definitions", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Project root path (defaults to current directory)
    #[arg(short, long, default_value = ".")]
    root: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the artifact once and exit
    Build {
        /// Write the artifact here instead of the configured output
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Ignore the on-disk discovery cache
        #[arg(long)]
        no_cache: bool,
    },
    /// Build, then rebuild incrementally on every change
    Watch {
        /// Milliseconds of quiet before a batch of changes is built
        #[arg(long, default_value = "150")]
        debounce_ms: u64,
    },
    /// Clear the discovery cache
    Clear,
    /// Show version
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(format!(
            "weft={log_level},weft_core={log_level},weft_indexer={log_level},weft_builder={log_level},weft_watcher={log_level}"
        )))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::debug!("Weft v{}", env!("CARGO_PKG_VERSION"));
    tracing::debug!("Project root: {}", cli.root.display());

    match cli.command {
        Commands::Build { output, no_cache } => commands::build(cli.root, output, no_cache).await,
        Commands::Watch { debounce_ms } => commands::watch(cli.root, debounce_ms).await,
        Commands::Clear => commands::clear(cli.root),
        Commands::Version => {
            println!("weft v{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}
