//! Stage implementations.
//!
//! Every stage follows the same shape: read upstream payloads, build its
//! units, run them through a [`StageExecutor`], and commit a manifest unless
//! the outcome is fatal.

mod concept;
mod media;
mod scenes;
mod universe;

use crate::{
    ArbiterDecision, ExecutionPolicy, ExecutionPolicyBuilder, PipelineConfig, StageExecutor,
    StageOutcome, StagePlan, StageRun, UnitAttempt, UnitReport, read_payload,
};
use adreel_core::{ArtifactKey, ConceptRecord, LlmRequest, LlmRequestBuilder, Message, RunId, StageId};
use adreel_error::{AdreelError, AdreelResult, ConfigError, ErrorClass};
use adreel_interface::{ImageService, LlmService, MediaMerger, VideoService};
use adreel_storage::ArtifactStore;
use std::sync::Arc;
use std::time::Duration;

/// External services the stages call.
#[derive(Clone)]
pub struct Services {
    /// Text model
    pub llm: Arc<dyn LlmService>,
    /// Image model
    pub image: Arc<dyn ImageService>,
    /// Video model
    pub video: Arc<dyn VideoService>,
    /// Clip concatenation
    pub merger: Arc<dyn MediaMerger>,
}

impl std::fmt::Debug for Services {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Services")
            .field("llm", &self.llm.model_name())
            .field("image", &self.image.model_name())
            .field("video", &self.video.model_name())
            .finish_non_exhaustive()
    }
}

/// Everything a stage needs from the run it belongs to.
#[derive(Clone, Copy)]
pub struct StageContext<'a> {
    /// Owning run
    pub run: &'a RunId,
    /// Resolved configuration
    pub config: &'a PipelineConfig,
    /// Stage plan of the run
    pub plan: &'a StagePlan,
    /// Artifact store
    pub store: &'a dyn ArtifactStore,
    /// External services
    pub services: &'a Services,
}

impl<'a> StageContext<'a> {
    /// Execution policy from configuration with the given worker count.
    pub fn policy(&self, workers: usize) -> AdreelResult<ExecutionPolicy> {
        let exec = self.config.execution();
        ExecutionPolicyBuilder::default()
            .workers(workers)
            .unit_timeout(exec.unit_timeout())
            .max_unit_retries(*exec.max_unit_retries())
            .retry_backoff_ms(*exec.retry_backoff_ms())
            .max_retry_delay(Duration::from_secs(*exec.max_retry_delay_secs()))
            .min_success_ratio(*exec.min_success_ratio())
            .build()
            .map_err(|e| ConfigError::new(format!("Invalid execution policy: {}", e)).into())
    }

    /// Executor for one stage of this run.
    pub fn executor(&self, stage: StageId, policy: ExecutionPolicy) -> StageExecutor<'a> {
        StageExecutor::new(self.store, self.run, stage, policy)
    }

    /// Key of a unit artifact of this run.
    pub fn key(&self, stage: StageId, unit: impl Into<String>) -> ArtifactKey {
        ArtifactKey::unit(self.run, stage, unit)
    }

    /// Concept downstream stages consume.
    pub async fn canonical_concept(&self, consumer: StageId) -> AdreelResult<ConceptRecord> {
        match self.plan.concept_source() {
            StageId::ArbitrateRevision => {
                let decision: ArbiterDecision =
                    read_payload(self.store, self.run, StageId::ArbitrateRevision, consumer).await?;
                Ok(decision.canonical)
            }
            source => read_payload(self.store, self.run, source, consumer).await,
        }
    }

    /// Text request against the configured LLM model.
    pub(crate) fn text_request(&self, messages: Vec<Message>, temperature: f32) -> AdreelResult<LlmRequest> {
        self.request(messages, self.config.models().llm_model(), temperature)
    }

    /// Text request against a specific model.
    pub(crate) fn request(
        &self,
        messages: Vec<Message>,
        model: &str,
        temperature: f32,
    ) -> AdreelResult<LlmRequest> {
        LlmRequestBuilder::default()
            .messages(messages)
            .model(Some(model.to_string()))
            .temperature(Some(temperature))
            .build()
            .map_err(|e| ConfigError::new(format!("Failed to build LLM request: {}", e)).into())
    }

    /// Store a unit's successful output, turning a store failure into a unit failure.
    pub(crate) async fn persist<T>(
        &self,
        stage: StageId,
        unit: &str,
        attempt: UnitAttempt<T>,
        bytes: impl FnOnce(&T) -> AdreelResult<Vec<u8>>,
    ) -> UnitAttempt<T> {
        let UnitAttempt { debug, result } = attempt;
        let result = match result {
            Ok(value) => match bytes(&value) {
                Ok(data) => self.store.put(&self.key(stage, unit), &data).await.map(|_| value),
                Err(e) => Err(e),
            },
            Err(e) => Err(e),
        };
        UnitAttempt { debug, result }
    }
}

/// Result of one stage invocation.
#[derive(Debug)]
pub struct StageExecution {
    /// Tri-state outcome
    pub outcome: StageOutcome,
    /// Per-unit reports in unit order
    pub units: Vec<UnitReport>,
    /// Root cause of a fatal outcome
    pub cause: Option<(String, ErrorClass)>,
}

impl StageExecution {
    /// Summarize an executor run.
    pub fn from_run<T>(run: &StageRun<T>, policy: &ExecutionPolicy) -> Self {
        let cause = match run.outcome {
            StageOutcome::Fatal => run
                .cause(policy)
                .map(|e: &AdreelError| (e.to_string(), e.class())),
            _ => None,
        };
        Self {
            outcome: run.outcome,
            units: run.reports(),
            cause,
        }
    }
}

/// Run one stage.
///
/// An `Err` means the stage could not even build its units, for instance
/// because an upstream payload is unreadable. Unit failures are reported
/// through the returned outcome instead.
#[tracing::instrument(skip(ctx), fields(run = %ctx.run))]
pub async fn run_stage(stage: StageId, ctx: &StageContext<'_>) -> AdreelResult<StageExecution> {
    match stage {
        StageId::ExpandConcept => concept::expand_concept(ctx).await,
        StageId::GenerateConcepts => concept::generate_concepts(ctx).await,
        StageId::JudgeConcepts => concept::judge_concepts(ctx).await,
        StageId::ExtractBestConcept => concept::extract_best_concept(ctx).await,
        StageId::ReviseConcept => concept::revise_concept(ctx).await,
        StageId::ArbitrateRevision => concept::arbitrate_revision(ctx).await,
        StageId::GenerateUniverse => universe::generate_universe(ctx).await,
        StageId::GenerateReferenceImages => universe::generate_reference_images(ctx).await,
        StageId::GenerateScenePrompts => scenes::generate_scene_prompts(ctx).await,
        StageId::GenerateFirstFrames => media::generate_first_frames(ctx).await,
        StageId::GenerateVideoClips => media::generate_video_clips(ctx).await,
        StageId::MergeClips => media::merge_clips(ctx).await,
    }
}

/// JSON bytes of a unit output.
pub(crate) fn json_bytes<T: serde::Serialize>(value: &T) -> AdreelResult<Vec<u8>> {
    serde_json::to_vec_pretty(value)
        .map_err(|e| adreel_error::JsonError::new(format!("Failed to serialize unit output: {}", e)).into())
}

/// Image resolution matching a video resolution.
pub(crate) fn image_resolution(video_resolution: &str) -> &'static str {
    if video_resolution == "480p" { "1K" } else { "2K" }
}
