//! adreel CLI binary.
//!
//! This binary drives the concept-to-video ad pipeline:
//! - Execute a run from a configuration file
//! - Preview the stage plan of an entry mode
//! - Inspect the artifacts of an existing run

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use clap::Parser;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

mod cli;

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    use cli::{Cli, Commands, inspect_run, print_plan, run_pipeline};

    // API keys may live in .env
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.json_logs);

    match cli.command {
        Commands::Run {
            config,
            run_id,
            entry,
        } => {
            let report = run_pipeline(config.as_deref(), run_id, entry).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            if report.is_halted() {
                return Ok(ExitCode::FAILURE);
            }
        }

        Commands::Plan {
            config,
            entry,
            show_config,
        } => {
            print_plan(config.as_deref(), entry, show_config)?;
        }

        Commands::Inspect { run_id, config } => {
            inspect_run(config.as_deref(), &run_id).await?;
        }
    }

    Ok(ExitCode::SUCCESS)
}

/// Install the fmt subscriber on stderr so stdout stays machine-readable.
fn init_tracing(verbose: bool, json: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}
