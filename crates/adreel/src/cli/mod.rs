//! Command-line interface module.
//!
//! This module provides the CLI structure and command handlers for the adreel binary.

mod commands;
mod inspect;
mod plan;
mod run;

pub use commands::{Cli, Commands};
pub use inspect::inspect_run;
pub use plan::print_plan;
pub use run::run_pipeline;
