//! Snapshotter - redacted Slack workspace snapshots
//!
//! Main entry point for the snapshotter CLI.

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;

use commands::{auth, collect};

/// Environment variable overriding the console log filter.
const LOG_ENV: &str = "SNAPSHOTTER_LOG";

// ─────────────────────────────────────────────────────────────────────────────
// CLI Structure
// ─────────────────────────────────────────────────────────────────────────────

/// Snapshotter - collect member tokens, then snapshot a Slack workspace
#[derive(Parser)]
#[command(name = "snapshotter")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the OAuth service that collects member tokens
    Auth(auth::AuthArgs),

    /// Harvest a redacted snapshot with the collected tokens
    Collect(collect::CollectArgs),
}

// ─────────────────────────────────────────────────────────────────────────────
// Main
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Console (human-readable) + rotating JSON file
    let filter = if cli.verbose {
        "snapshotter=debug,snapshotter_slack=debug,snapshotter_harvest=debug,snapshotter_oauth=debug,tower_http=debug,info"
    } else {
        "snapshotter=info,snapshotter_slack=info,snapshotter_harvest=info,snapshotter_oauth=info,warn"
    };
    let console_filter = std::env::var(LOG_ENV)
        .ok()
        .filter(|f| !f.is_empty())
        .unwrap_or_else(|| filter.to_string());

    let log_dir = dirs::cache_dir()
        .map(|d| d.join("snapshotter").join("logs"))
        .unwrap_or_else(|| std::path::PathBuf::from("logs"));
    let file_appender = tracing_appender::rolling::daily(&log_dir, "snapshotter.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    use tracing_subscriber::prelude::*;
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_writer(std::io::stderr)
                .with_filter(tracing_subscriber::EnvFilter::new(console_filter)),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(non_blocking)
                .with_filter(tracing_subscriber::EnvFilter::new(
                    "snapshotter=trace,snapshotter_slack=debug,snapshotter_harvest=trace,snapshotter_oauth=trace,info",
                )),
        )
        .init();

    let ctx = commands::Context {
        verbose: cli.verbose,
    };

    match cli.command {
        Commands::Auth(args) => auth::run(args, &ctx).await,
        Commands::Collect(args) => collect::run(args, &ctx).await,
    }
}
