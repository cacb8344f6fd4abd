//! Stage orchestration for adreel.
//!
//! This crate turns a brief or a concept into a finished ad video by running
//! a fixed sequence of stages over an artifact store. Every stage commits a
//! manifest when it finishes, so an interrupted run can resume from the last
//! committed stage.
//!
//! # Features
//!
//! - **Layered configuration**: bundled defaults, user file, working directory, explicit path
//! - **Bounded parallelism**: per-unit retries, deadlines and failure isolation
//! - **Structured output validation**: extraction and repair of model JSON
//! - **Reference selection**: per-scene, capped, version-aware
//! - **Arbitration**: a revision only replaces its original when it scores higher
//!
//! # Example
//!
//! ```rust,ignore
//! use adreel_pipeline::{PipelineConfig, PipelineOrchestrator, Services};
//!
//! # async fn example(services: Services) -> Result<(), Box<dyn std::error::Error>> {
//! let config = PipelineConfig::load(None)?;
//! let store = std::sync::Arc::new(adreel_storage::FileSystemArtifactStore::new("runs")?);
//! let report = PipelineOrchestrator::new(store, services)
//!     .run(*config.entry().mode(), &config)
//!     .await?;
//! println!("{} stages ran", report.executed_count());
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod arbiter;
mod config;
mod duration;
mod executor;
mod judge;
mod manifest;
mod orchestrator;
mod plan;
pub mod prompts;
mod references;
mod report;
mod stages;
mod structured;
mod validator;

pub use arbiter::{Arbiter, ArbiterDecision, arbitrate_scored, decide};
pub use config::{
    BriefSection, ConceptGenerationSection, DirectSection, EntrySection, EvaluationSection,
    ExecutionSection, ModelsSection, PipelineConfig, RunSection, SkipSection, VideoSection,
};
pub use duration::{
    DEFAULT_UNIT_COUNT, DurationRequest, MAX_UNIT_COUNT, NormalizedDuration, SORA_DURATIONS,
    VEO_DURATIONS, allowed_durations_for, nearest_allowed, normalize,
};
pub use executor::{
    ExecutionPolicy, ExecutionPolicyBuilder, StageExecutor, StageOutcome, StageRun, UnitAttempt,
    UnitReport, UnitResult, UnitStatus, classify_outcome,
};
pub use judge::ConceptJudge;
pub use manifest::{
    MediaPayload, MergePayload, RevisionPayload, ScenePayload, StageManifest, read_payload,
    write_manifest,
};
pub use orchestrator::{PipelineOrchestrator, RUN_RECORD, RUN_REPORT, RunRecord};
pub use plan::{DOWNSTREAM, StagePlan};
pub use references::{MAX_REFERENCES, ReferenceSelector, SelectedReference, resolve_version};
pub use report::{RunReport, StageReport};
pub use stages::{Services, StageContext, StageExecution, run_stage};
pub use structured::StructuredCaller;
pub use validator::{
    SchemaShape, StructuredOutputValidator, ValidationFailure, decode, extract_candidate, repair,
};
