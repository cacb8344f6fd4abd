//! Inspect command handler.

use super::run::resolve_config;
use adreel_core::{ArtifactKey, MANIFEST_UNIT, RunId, StageId};
use adreel_error::AdreelResult;
use adreel_pipeline::{RUN_RECORD, RUN_REPORT, RunRecord, RunReport};
use adreel_storage::{ArtifactStore, FileSystemArtifactStore, get_json};
use serde::Serialize;
use std::path::Path;
use strum::IntoEnumIterator;

/// Artifacts one stage has committed for a run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageArtifacts {
    /// Stage
    pub stage: StageId,
    /// Whether the stage manifest exists
    pub manifest: bool,
    /// Output units, manifest excluded
    pub units: Vec<String>,
    /// Units with recorded debug context
    pub debug_units: Vec<String>,
}

/// Everything on record for a run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunInventory {
    /// Run identifier
    pub run_id: RunId,
    /// Recorded inputs, if the run was started
    pub record: Option<RunRecord>,
    /// Latest report, if a run finished
    pub report: Option<RunReport>,
    /// Per-stage artifacts in plan order
    pub stages: Vec<StageArtifacts>,
}

/// Collect the inventory of a run.
///
/// Stages come from the recorded plan; without one every stage is listed.
pub async fn collect_inventory(store: &dyn ArtifactStore, run: &RunId) -> AdreelResult<RunInventory> {
    let record: Option<RunRecord> = optional_record(store, run, RUN_RECORD).await?;
    let report: Option<RunReport> = optional_record(store, run, RUN_REPORT).await?;

    let planned = match &record {
        Some(record) => record.plan.stages().to_vec(),
        None => StageId::iter().collect(),
    };

    let mut stages = Vec::with_capacity(planned.len());
    for stage in planned {
        let keys = store.list(run, stage).await?;
        let mut artifacts = StageArtifacts {
            stage,
            manifest: false,
            units: Vec::new(),
            debug_units: Vec::new(),
        };
        for key in keys {
            if key.debug {
                artifacts.debug_units.push(key.unit);
            } else if key.unit == MANIFEST_UNIT {
                artifacts.manifest = true;
            } else {
                artifacts.units.push(key.unit);
            }
        }
        stages.push(artifacts);
    }

    Ok(RunInventory {
        run_id: run.clone(),
        record,
        report,
        stages,
    })
}

async fn optional_record<T>(store: &dyn ArtifactStore, run: &RunId, name: &str) -> AdreelResult<Option<T>>
where
    T: serde::de::DeserializeOwned,
{
    let key = ArtifactKey::run_record(run, name);
    if !store.exists(&key).await? {
        return Ok(None);
    }
    match get_json(store, &key).await {
        Ok(value) => Ok(Some(value)),
        Err(e) => {
            tracing::warn!(key = %key, error = %e, "Ignoring unreadable run record");
            Ok(None)
        }
    }
}

/// Render an inventory for the terminal.
pub fn render_inventory(inventory: &RunInventory) -> String {
    let mut out = format!("Run: {}\n", inventory.run_id);
    if let Some(record) = &inventory.record {
        out.push_str(&format!(
            "Entry mode: {} (started {})\n",
            record.entry_mode,
            record.created_at.format("%Y-%m-%d %H:%M:%S UTC")
        ));
    }
    match &inventory.report {
        Some(report) => match (report.halted_at, &report.cause) {
            (Some(stage), Some(cause)) => {
                out.push_str(&format!("Status: halted at {}: {}\n", stage, cause))
            }
            (Some(stage), None) => out.push_str(&format!("Status: halted at {}\n", stage)),
            _ => {
                let (ok, total) = report.unit_totals();
                out.push_str(&format!("Status: completed ({}/{} units succeeded)\n", ok, total));
            }
        },
        None => out.push_str("Status: no report\n"),
    }

    for stage in &inventory.stages {
        let marker = if stage.manifest { "x" } else { " " };
        out.push_str(&format!(
            "[{}] {} ({} units, {} debug)\n",
            marker,
            stage.stage,
            stage.units.len(),
            stage.debug_units.len()
        ));
        for unit in &stage.debug_units {
            out.push_str(&format!("      debug/{}\n", unit));
        }
    }
    out
}

/// Print what a run has on record.
pub async fn inspect_run(config_path: Option<&Path>, run_id: &str) -> AdreelResult<()> {
    let config = resolve_config(config_path, None)?;
    let store = FileSystemArtifactStore::new(config.run().output_dir().clone())?;
    let inventory = collect_inventory(&store, &RunId::new(run_id)).await?;
    print!("{}", render_inventory(&inventory));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use adreel_core::EntryMode;
    use adreel_storage::InMemoryArtifactStore;

    #[tokio::test]
    async fn test_inventory_of_unknown_run() {
        let store = InMemoryArtifactStore::new();
        let inventory = collect_inventory(&store, &RunId::new("nothing")).await.unwrap();
        assert!(inventory.record.is_none());
        assert!(inventory.report.is_none());
        assert_eq!(inventory.stages.len(), StageId::iter().count());
        assert!(inventory.stages.iter().all(|s| !s.manifest && s.units.is_empty()));
    }

    #[tokio::test]
    async fn test_inventory_splits_units() {
        let store = InMemoryArtifactStore::new();
        let run = RunId::new("r1");
        let stage = StageId::GenerateFirstFrames;
        store.put(&ArtifactKey::manifest(&run, stage), b"{}").await.unwrap();
        store.put(&ArtifactKey::unit(&run, stage, "scene_1.png"), b"png").await.unwrap();
        store
            .put(&ArtifactKey::debug(&run, stage, "scene_1.json"), b"{}")
            .await
            .unwrap();

        let mut report = RunReport::new(run.clone(), EntryMode::BrandBrief);
        report.halt_with(stage, "rejected".to_string(), adreel_error::ErrorClass::ContentPolicy);
        adreel_storage::put_json(&store, &ArtifactKey::run_record(&run, RUN_REPORT), &report)
            .await
            .unwrap();

        let inventory = collect_inventory(&store, &run).await.unwrap();
        let frames = inventory.stages.iter().find(|s| s.stage == stage).unwrap();
        assert!(frames.manifest);
        assert_eq!(frames.units, vec!["scene_1.png".to_string()]);
        assert_eq!(frames.debug_units, vec!["scene_1.json".to_string()]);

        let rendered = render_inventory(&inventory);
        assert!(rendered.contains("Status: halted at generate_first_frames: rejected"));
        assert!(rendered.contains("[x] generate_first_frames (1 units, 1 debug)"));
        assert!(rendered.contains("      debug/scene_1.json"));
    }
}
