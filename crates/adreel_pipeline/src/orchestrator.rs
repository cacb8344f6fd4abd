//! Run orchestration: stage ordering, skip-if-exists, dependency checks and
//! the run report.

use crate::manifest::verify_payload;
use crate::{
    PipelineConfig, RunReport, Services, StageContext, StageOutcome, StagePlan, StageReport,
    run_stage,
};
use adreel_core::{ArtifactKey, EntryMode, RunId, StageId};
use adreel_error::{AdreelError, AdreelResult, ErrorClass, PipelineError, PipelineErrorKind};
use adreel_storage::{ArtifactStore, get_json, put_json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Run-level record name for the run's inputs.
pub const RUN_RECORD: &str = "run.json";

/// Run-level record name for the latest report.
pub const RUN_REPORT: &str = "run_report.json";

/// Inputs a run was started with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    /// Run identifier
    pub run_id: RunId,
    /// Entry mode
    pub entry_mode: EntryMode,
    /// First start time
    pub created_at: DateTime<Utc>,
    /// Planned stages
    pub plan: StagePlan,
    /// Resolved configuration
    pub config: PipelineConfig,
}

/// Drives a run through its stage plan.
pub struct PipelineOrchestrator {
    store: Arc<dyn ArtifactStore>,
    services: Services,
}

impl PipelineOrchestrator {
    /// Create an orchestrator over a store and a set of services.
    pub fn new(store: Arc<dyn ArtifactStore>, services: Services) -> Self {
        Self { store, services }
    }

    /// Artifact store in use.
    pub fn store(&self) -> &dyn ArtifactStore {
        self.store.as_ref()
    }

    /// Run id a configuration resolves to.
    pub fn resolve_run_id(config: &PipelineConfig) -> RunId {
        match config.run().run_id() {
            Some(id) if !id.trim().is_empty() => RunId::new(id.trim()),
            _ => {
                let brand = config.brief().brand_name().trim();
                RunId::generate(if brand.is_empty() { "adreel" } else { brand })
            }
        }
    }

    /// Execute a run.
    ///
    /// Configuration problems are returned as an error before any stage
    /// runs. Stage failures halt the run and are recorded in the returned
    /// report, which is also persisted as a run-level record.
    #[tracing::instrument(skip(self, config), fields(mode = %entry_mode))]
    pub async fn run(&self, entry_mode: EntryMode, config: &PipelineConfig) -> AdreelResult<RunReport> {
        config.validate_for(entry_mode)?;

        let run = Self::resolve_run_id(config);
        let plan = StagePlan::new(entry_mode, *config.direct().judge_and_revise());
        tracing::info!(run = %run, stages = plan.stages().len(), backend = self.store.backend_name(), "Starting run");

        self.record_run(&run, entry_mode, &plan, config).await?;

        let ctx = StageContext {
            run: &run,
            config,
            plan: &plan,
            store: self.store.as_ref(),
            services: &self.services,
        };

        let mut report = RunReport::new(run.clone(), entry_mode);
        for &stage in plan.stages() {
            if self.can_skip(&ctx, stage).await? {
                tracing::info!(stage = %stage, "Skipping stage with committed manifest");
                report.stages.push(StageReport::Skipped { stage });
                continue;
            }

            if let Some(upstream) = self.missing_requirement(&ctx, stage).await? {
                let error: AdreelError = PipelineError::new(PipelineErrorKind::MissingDependency {
                    stage: stage.to_string(),
                    upstream: upstream.to_string(),
                })
                .into();
                report.halt(stage, &error);
                break;
            }

            tracing::info!(stage = %stage, "Running stage");
            match run_stage(stage, &ctx).await {
                Ok(execution) => {
                    let outcome = execution.outcome;
                    report.stages.push(StageReport::Executed {
                        stage,
                        outcome,
                        units: execution.units,
                    });
                    if outcome == StageOutcome::Fatal {
                        let (cause, class) = execution.cause.unwrap_or_else(|| {
                            ("stage produced no usable output".to_string(), ErrorClass::Other)
                        });
                        report.halt_with(stage, cause, class);
                        break;
                    }
                    tracing::info!(stage = %stage, outcome = %outcome, "Stage finished");
                }
                Err(e) => {
                    report.stages.push(StageReport::Executed {
                        stage,
                        outcome: StageOutcome::Fatal,
                        units: Vec::new(),
                    });
                    report.halt(stage, &e);
                    break;
                }
            }
        }

        report.finished_at = Some(Utc::now());
        put_json(self.store.as_ref(), &ArtifactKey::run_record(&run, RUN_REPORT), &report).await?;

        let (ok, total) = report.unit_totals();
        tracing::info!(
            run = %run,
            executed = report.executed_count(),
            skipped = report.skipped_count(),
            units_ok = ok,
            units_total = total,
            halted = report.is_halted(),
            "Run finished"
        );
        Ok(report)
    }

    /// Latest persisted report of a run.
    pub async fn load_report(&self, run: &RunId) -> AdreelResult<RunReport> {
        get_json(self.store.as_ref(), &ArtifactKey::run_record(run, RUN_REPORT)).await
    }

    async fn record_run(
        &self,
        run: &RunId,
        entry_mode: EntryMode,
        plan: &StagePlan,
        config: &PipelineConfig,
    ) -> AdreelResult<()> {
        let key = ArtifactKey::run_record(run, RUN_RECORD);
        if self.store.exists(&key).await? {
            tracing::debug!(run = %run, "Resuming existing run");
            return Ok(());
        }
        let record = RunRecord {
            run_id: run.clone(),
            entry_mode,
            created_at: Utc::now(),
            plan: plan.clone(),
            config: config.clone(),
        };
        put_json(self.store.as_ref(), &key, &record).await
    }

    async fn can_skip(&self, ctx: &StageContext<'_>, stage: StageId) -> AdreelResult<bool> {
        if !ctx.config.skip().enabled(stage) {
            return Ok(false);
        }
        if !self.store.exists(&ArtifactKey::manifest(ctx.run, stage)).await? {
            return Ok(false);
        }
        match verify_payload(self.store.as_ref(), ctx.run, stage).await {
            Ok(()) => Ok(true),
            Err(e) => {
                tracing::warn!(stage = %stage, error = %e, "Committed manifest is unusable, re-running stage");
                Ok(false)
            }
        }
    }

    async fn missing_requirement(
        &self,
        ctx: &StageContext<'_>,
        stage: StageId,
    ) -> AdreelResult<Option<StageId>> {
        for upstream in ctx.plan.requirements(stage) {
            if !self.store.exists(&ArtifactKey::manifest(ctx.run, upstream)).await? {
                return Ok(Some(upstream));
            }
        }
        Ok(None)
    }
}
