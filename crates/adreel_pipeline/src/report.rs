//! Run and stage reports.

use crate::{StageOutcome, UnitReport, UnitStatus};
use adreel_core::{EntryMode, RunId, StageId};
use adreel_error::{AdreelError, ErrorClass};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What happened to one planned stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StageReport {
    /// The stage ran
    Executed {
        /// Stage
        stage: StageId,
        /// Tri-state outcome
        outcome: StageOutcome,
        /// Per-unit results in unit order
        units: Vec<UnitReport>,
    },
    /// The stage's manifest existed and its skip flag was set
    Skipped {
        /// Stage
        stage: StageId,
    },
}

impl StageReport {
    /// Stage the report is about.
    pub fn stage(&self) -> StageId {
        match self {
            StageReport::Executed { stage, .. } | StageReport::Skipped { stage } => *stage,
        }
    }

    /// Whether the stage ran.
    pub fn executed(&self) -> bool {
        matches!(self, StageReport::Executed { .. })
    }
}

/// Outcome of a whole run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    /// Run identifier
    pub run_id: RunId,
    /// Entry mode
    pub entry_mode: EntryMode,
    /// Reports for every stage reached, in plan order
    pub stages: Vec<StageReport>,
    /// Stage that halted the run
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub halted_at: Option<StageId>,
    /// Root cause of the halt
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cause: Option<String>,
    /// Class of the root cause
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class: Option<ErrorClass>,
    /// Start time
    pub started_at: DateTime<Utc>,
    /// Finish time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl RunReport {
    /// Empty report for a starting run.
    pub fn new(run_id: RunId, entry_mode: EntryMode) -> Self {
        Self {
            run_id,
            entry_mode,
            stages: Vec::new(),
            halted_at: None,
            cause: None,
            class: None,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    /// Record a halt caused by an error.
    pub fn halt(&mut self, stage: StageId, error: &AdreelError) {
        self.halt_with(stage, error.to_string(), error.class());
    }

    /// Record a halt from an already-classified cause.
    pub fn halt_with(&mut self, stage: StageId, cause: String, class: ErrorClass) {
        tracing::error!(stage = %stage, class = %class, cause = %cause, "Run halted");
        self.halted_at = Some(stage);
        self.cause = Some(cause);
        self.class = Some(class);
    }

    /// Whether a stage failure stopped the run.
    pub fn is_halted(&self) -> bool {
        self.halted_at.is_some()
    }

    /// Number of stages that ran.
    pub fn executed_count(&self) -> usize {
        self.stages.iter().filter(|s| s.executed()).count()
    }

    /// Number of stages skipped.
    pub fn skipped_count(&self) -> usize {
        self.stages.len() - self.executed_count()
    }

    /// Report for a stage, if it was reached.
    pub fn stage(&self, stage: StageId) -> Option<&StageReport> {
        self.stages.iter().find(|s| s.stage() == stage)
    }

    /// Succeeded and total units across executed stages.
    pub fn unit_totals(&self) -> (usize, usize) {
        self.stages
            .iter()
            .filter_map(|s| match s {
                StageReport::Executed { units, .. } => Some(units),
                StageReport::Skipped { .. } => None,
            })
            .flatten()
            .fold((0, 0), |(ok, total), unit| {
                let ok = ok + usize::from(unit.status() == &UnitStatus::Succeeded);
                (ok, total + 1)
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use adreel_error::{PipelineError, PipelineErrorKind};

    #[test]
    fn test_halt_records_stage_and_class() {
        let mut report = RunReport::new(RunId::new("r1"), EntryMode::BrandBrief);
        report.stages.push(StageReport::Skipped {
            stage: StageId::GenerateConcepts,
        });
        let error: AdreelError = PipelineError::new(PipelineErrorKind::MissingDependency {
            stage: "judge_concepts".into(),
            upstream: "generate_concepts".into(),
        })
        .into();
        report.halt(StageId::JudgeConcepts, &error);

        assert!(report.is_halted());
        assert_eq!(report.class, Some(ErrorClass::MissingDependency));
        assert_eq!(report.executed_count(), 0);
        assert_eq!(report.skipped_count(), 1);

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["halted_at"], "judge_concepts");
        assert_eq!(json["stages"][0]["status"], "skipped");
    }
}
