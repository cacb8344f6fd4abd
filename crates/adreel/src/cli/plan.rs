//! Plan command handler.

use super::run::{resolve_config, resolve_entry};
use adreel_core::EntryMode;
use adreel_error::{AdreelResult, ConfigError};
use adreel_pipeline::{PipelineConfig, StagePlan};
use std::fmt::Write;
use std::path::Path;

/// Render a plan as numbered stages with their requirements.
pub fn render_plan(plan: &StagePlan) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Entry mode: {}", plan.mode());
    for (index, stage) in plan.stages().iter().enumerate() {
        let requirements = plan.requirements(*stage);
        if requirements.is_empty() {
            let _ = writeln!(out, "{:>2}. {}", index + 1, stage);
        } else {
            let names = requirements
                .iter()
                .map(|s| s.name())
                .collect::<Vec<_>>()
                .join(", ");
            let _ = writeln!(out, "{:>2}. {} (after {})", index + 1, stage, names);
        }
    }
    out
}

/// Plan a run from configuration without touching any service.
pub fn plan_for(config: &PipelineConfig, entry: Option<EntryMode>) -> StagePlan {
    let mode = resolve_entry(config, entry);
    StagePlan::new(mode, *config.direct().judge_and_revise())
}

/// Print the stage plan, and the resolved configuration when asked.
pub fn print_plan(config_path: Option<&Path>, entry: Option<EntryMode>, show_config: bool) -> AdreelResult<()> {
    let config = resolve_config(config_path, None)?;
    let plan = plan_for(&config, entry);

    print!("{}", render_plan(&plan));
    if let Err(e) = config.validate_for(plan.mode()) {
        println!("\nConfiguration is not ready for this mode: {}", e);
    }

    if show_config {
        let rendered = toml::to_string_pretty(&config)
            .map_err(|e| ConfigError::new(format!("Failed to render configuration: {}", e)))?;
        println!("\n{}", rendered);
    }
    Ok(())
}
