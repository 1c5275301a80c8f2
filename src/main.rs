//! Sentinel placement CLI

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use sentinel_placement::commands::{self, AppState};
use sentinel_placement::config::Settings;
use sentinel_placement::utils::CancellationToken;
use serde::Serialize;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "sentinel-placement")]
#[command(version)]
#[command(about = "Ensemble file classification and adaptive folder placement")]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "SENTINEL_CONFIG")]
    config: Option<PathBuf>,

    /// Log decisions without touching the filesystem
    #[arg(long)]
    dry_run: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Watch the configured directories and place new files until Ctrl+C
    Watch,

    /// Classify a file without moving it
    Classify {
        file: PathBuf,
    },

    /// Classify, route and place a single file
    Process {
        file: PathBuf,
    },

    /// Move a file into a folder through the transaction log
    Move {
        source: PathBuf,
        dest_folder: PathBuf,
    },

    /// Undo the most recent move
    Undo,

    /// Rebuild the folder atlas
    Index {
        /// Roots to scan (defaults to the configured scan roots)
        #[arg(long = "root")]
        roots: Vec<PathBuf>,
    },

    /// Reconcile transactions interrupted by a crash
    Recover,

    /// Print the transaction log
    History,

    /// Show the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("sentinel_placement={}", log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut settings = Settings::load(cli.config.as_deref()).context("loading settings")?;
    if cli.dry_run {
        settings.dry_run = true;
    }

    if let Commands::Config = cli.command {
        return print_json(&settings);
    }

    let state = AppState::new(settings)?;

    match cli.command {
        Commands::Watch => run_watch(&state).await?,
        Commands::Classify { file } => {
            print_json(&commands::classify_file(&state, &file).await?)?;
        }
        Commands::Process { file } => {
            print_json(&commands::process_file(&state, &file).await?)?;
        }
        Commands::Move { source, dest_folder } => {
            print_json(&commands::move_file(&state, &source, &dest_folder)?)?;
        }
        Commands::Undo => {
            let record = commands::undo_last(&state)?;
            println!(
                "Restored {} -> {}",
                record.destination.display(),
                record.rollback.original_path.display()
            );
        }
        Commands::Index { roots } => run_index(&state, roots).await?,
        Commands::Recover => {
            print_json(&commands::recover(&state)?)?;
        }
        Commands::History => {
            print_json(&commands::history(&state))?;
        }
        Commands::Config => {}
    }

    Ok(())
}

async fn run_watch(state: &AppState) -> Result<()> {
    let report = commands::recover(state)?;
    if report.committed + report.failed > 0 {
        tracing::info!(
            "Recovered {} committed and {} failed transactions",
            report.committed,
            report.failed
        );
    }

    let cancel = CancellationToken::new();
    let session = commands::start_watching(state)?;
    tracing::info!("Watching. Press Ctrl+C to stop.");

    let scan = commands::initialize_atlas(state, cancel.clone());
    tokio::pin!(scan);
    let mut scanning = true;

    loop {
        tokio::select! {
            result = &mut scan, if scanning => {
                scanning = false;
                match result {
                    Ok(Some(summary)) => tracing::info!("Initial scan indexed {} folders", summary.folders_discovered),
                    Ok(None) => {}
                    Err(e) => tracing::error!("Initial scan failed: {}", e),
                }
            }
            signal = tokio::signal::ctrl_c() => {
                signal?;
                break;
            }
        }
    }

    tracing::info!("Shutting down...");
    cancel.cancel();
    commands::stop_watching(state, session).await?;
    Ok(())
}

async fn run_index(state: &AppState, roots: Vec<PathBuf>) -> Result<()> {
    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Cancelling scan...");
            on_interrupt.cancel();
        }
    });

    let summary = commands::build_atlas(
        state,
        roots,
        |p| tracing::info!("[{}/{}] {}", p.current, p.total, p.message),
        cancel,
    )
    .await?;
    print_json(&summary)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
