//! CLI command definitions.

use adreel_core::EntryMode;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// adreel - Turn an ad concept or brand brief into a finished video
#[derive(Parser, Debug)]
#[command(name = "adreel")]
#[command(about = "Turn an ad concept or brand brief into a finished video", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub json_logs: bool,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Execute a run and print its report as JSON
    Run {
        /// Configuration file layered over the defaults
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Run id to create or resume
        #[arg(long)]
        run_id: Option<String>,

        /// Entry mode: direct-concept, brand-brief or pre-evaluated
        #[arg(long)]
        entry: Option<EntryMode>,
    },

    /// Print the stage plan without running anything
    Plan {
        /// Configuration file layered over the defaults
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Entry mode to plan for
        #[arg(long)]
        entry: Option<EntryMode>,

        /// Also print the resolved configuration as TOML
        #[arg(long)]
        show_config: bool,
    },

    /// List the manifests and debug units of an existing run
    Inspect {
        /// Run id to inspect
        #[arg(long)]
        run_id: String,

        /// Configuration file locating the output root
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}
