//! Binary entry point for reclaim.
//!
//! This binary provides the CLI interface for the reclaim resource registry.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(missing_docs)]
// Allow print_stderr in main binary for CLI output
#![allow(clippy::print_stderr)]
#![allow(clippy::print_stdout)]
// Allow needless_pass_by_value for command functions
#![allow(clippy::needless_pass_by_value)]
// Allow multiple crate versions from transitive dependencies
#![allow(clippy::multiple_crate_versions)]

mod commands;

use clap::{Parser, Subcommand};
use commands::StoresAction;
use reclaim::ReclaimConfig;
use reclaim::observability::{self, InitOptions, ObservabilityHandle};
use std::path::PathBuf;
use std::process::ExitCode;

/// Reclaim - resource lifecycle tracking with ttl sweeps.
#[derive(Parser)]
#[command(name = "reclaim")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to configuration file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands.
#[derive(Subcommand)]
enum Commands {
    /// Run a synthetic workload and watch resources get swept.
    Simulate {
        /// Number of resources to create.
        #[arg(short, long, default_value = "24")]
        resources: usize,

        /// How long to run (e.g. 30s, 2m).
        #[arg(short, long, default_value = "30s")]
        duration: String,

        /// Tick and heartbeat interval.
        #[arg(short, long, default_value = "2s")]
        touch_every: String,

        /// Ttl for every trigger and for manual collection.
        #[arg(long, default_value = "6s")]
        ttl: String,

        /// Expose metrics on the configured port while running.
        #[arg(long)]
        expose_metrics: bool,
    },

    /// Show the effective configuration.
    Config {
        /// Print as TOML.
        #[arg(long)]
        toml: bool,
    },

    /// Inspect persisted stores.
    Stores {
        #[command(subcommand)]
        action: StoresAction,
    },
}

/// Main entry point.
#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config = match ReclaimConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            return ExitCode::FAILURE;
        },
    };

    let expose_metrics = matches!(
        cli.command,
        Commands::Simulate {
            expose_metrics: true,
            ..
        }
    );
    let observability = match observability::init_from_config(
        &config,
        InitOptions {
            verbose: cli.verbose,
            metrics_expose: expose_metrics,
        },
    ) {
        Ok(handle) => handle,
        Err(e) => {
            eprintln!("Failed to initialize observability: {e}");
            return ExitCode::FAILURE;
        },
    };

    match run_command(cli.command, &config, &observability).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        },
    }
}

/// Runs the selected command.
async fn run_command(
    command: Commands,
    config: &ReclaimConfig,
    observability: &ObservabilityHandle,
) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Commands::Simulate {
            resources,
            duration,
            touch_every,
            ttl,
            expose_metrics: _,
        } => {
            commands::cmd_simulate(
                config,
                observability,
                resources,
                &duration,
                &touch_every,
                &ttl,
            )
            .await
        },

        Commands::Config { toml } => commands::cmd_config(config, toml),

        Commands::Stores { action } => commands::cmd_stores(config, action),
    }
}
