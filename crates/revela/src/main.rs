//! Revela CLI - calibrate and export rolls of scanned film negatives.
//!
//! # Usage
//!
//! ```bash
//! # Calibrate a roll (cached under <roll>/.cache)
//! revela analyze ./scans/roll_07 --film-type Portra400
//!
//! # Render frame 3 to a PNG preview
//! revela preview ./scans/roll_07 --frame 3 --out frame3.png
//!
//! # Export frames 1 and 3 to 5 as 16-bit TIFF
//! revela export ./scans/roll_07 --frames 1,3-5 --format tif16
//!
//! # View configuration
//! revela config show
//! ```

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use revela_core::Config;

mod cli;
mod logging;

/// Revela - calibrate and export rolls of scanned film negatives.
#[derive(Parser, Debug)]
#[command(name = "revela")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose (debug) logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output logs in JSON format
    #[arg(long, global = true)]
    json_logs: bool,

    /// Config file to use instead of the default location
    #[arg(long, global = true, env = "REVELA_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Calibrate a roll and print its calibration profile
    Analyze(cli::analyze::AnalyzeArgs),

    /// Render one frame to a PNG preview
    Preview(cli::preview::PreviewArgs),

    /// Render and encode frames into an export folder
    Export(cli::export::ExportArgs),

    /// View and manage configuration
    Config(cli::config::ConfigArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logging isn't initialized yet, so config warnings go through eprintln.
    let config = match &cli.config {
        Some(path) => {
            let path = PathBuf::from(shellexpand::tilde(&path.to_string_lossy()).into_owned());
            Config::load_from(&path)
                .with_context(|| format!("Failed to load config from {}", path.display()))?
        }
        None => match Config::load() {
            Ok(config) => config,
            Err(e) => {
                eprintln!(
                    "Warning: Failed to load config: {e}\n  \
                     Using default configuration. Check your config file with `revela config path`."
                );
                Config::default()
            }
        },
    };
    logging::init(&config.logging, cli.verbose, cli.json_logs);

    tracing::debug!("Revela v{}", revela_core::VERSION);

    match cli.command {
        Commands::Analyze(args) => cli::analyze::execute(config, args).await,
        Commands::Preview(args) => cli::preview::execute(config, args).await,
        Commands::Export(args) => cli::export::execute(config, args).await,
        Commands::Config(args) => cli::config::execute(config, cli.config, args).await,
    }
}
