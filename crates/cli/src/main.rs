//! Carton Count CLI - stack counting for bin captures
//!
//! Command-line interface over the stack-counting pipeline.

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

mod commands;

use commands::batch::BatchCommand;
use commands::count::CountCommand;

#[derive(Parser)]
#[command(
    name = "carton-count",
    version,
    about = "Count cartons in warehouse bin captures",
    long_about = "Count cartons stacked in a pile from one RGB capture and an optional depth map.\n\n\
                  Two execution modes:\n  \
                  - count: Single capture, human-readable or JSON report\n  \
                  - batch: Manifest of captures, counted in parallel as JSON lines",
    after_help = "EXAMPLES:\n  \
                  # Count one capture with its sidecar detections\n  \
                  carton-count count --image bins/A-01/main.jpeg --pile-id 3 --pile-config pile_config.json\n\n  \
                  # Include a depth map and print the full report\n  \
                  carton-count count --image main.jpeg --depth depth.png --pile-id 3 --json\n\n  \
                  # Count every capture in a manifest on 4 threads\n  \
                  carton-count batch --manifest captures.json --threads 4 --config counting.yaml"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Count cartons in a single capture
    Count(CountCommand),

    /// Count cartons for every capture listed in a manifest
    Batch(BatchCommand),
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { Level::DEBUG } else { Level::INFO };

    // Reports go to stdout, logs to stderr
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;

    match cli.command {
        Commands::Count(cmd) => cmd.execute(),
        Commands::Batch(cmd) => cmd.execute(),
    }
}
