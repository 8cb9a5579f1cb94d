// SPDX-License-Identifier: GPL-3.0-only

use camera_lifecycle::Config;
use camera_lifecycle::constants::app_info;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod cli;

#[derive(Parser)]
#[command(name = "camera-lifecycle")]
#[command(about = "Camera availability and device lifecycle tracker")]
#[command(version = app_info::version())]
struct Cli {
    /// Configuration file (default: <config dir>/camera-lifecycle/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a scripted scenario against the simulated platform
    Scenario {
        /// Scenario to run
        #[arg(value_enum)]
        name: cli::Scenario,

        /// Run on a tokio runtime with the configured callback executor instead of inline
        #[arg(long)]
        threaded: bool,
    },

    /// Show the effective configuration
    Config {
        /// Write the configuration file
        #[arg(long)]
        write: bool,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config_path = cli.config.or_else(|| Config::default_path().ok());
    let (config, load_error) = match config_path.as_deref() {
        Some(path) => Config::load_reporting(path),
        None => (Config::default(), None),
    };

    // Initialize logging
    // Set RUST_LOG environment variable to control log level
    // Examples: RUST_LOG=debug, RUST_LOG=camera_lifecycle=debug, RUST_LOG=info
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_filter)),
        )
        .with_target(true)
        .with_level(true)
        .init();

    if let Some(error) = load_error {
        tracing::warn!(%error, "Failed to load configuration, using defaults");
    }

    match cli.command {
        Commands::Scenario { name, threaded } => cli::run_scenario(name, threaded, &config),
        Commands::Config { write } => cli::show_config(&config, config_path.as_deref(), write),
    }
}
