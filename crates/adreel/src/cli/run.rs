//! Run command handler.

use adreel_core::EntryMode;
use adreel_error::AdreelResult;
use adreel_models::{FfmpegMerger, OpenRouterClient, ReplicateClient, ReplicateImageModel, ReplicateVideoModel};
use adreel_pipeline::{PipelineConfig, PipelineOrchestrator, RunReport, Services};
use adreel_storage::FileSystemArtifactStore;
use std::path::Path;
use std::sync::Arc;

/// Load the layered configuration and apply command-line overrides.
pub fn resolve_config(path: Option<&Path>, run_id: Option<String>) -> AdreelResult<PipelineConfig> {
    let config = PipelineConfig::load(path)?;
    Ok(with_run_id(config, run_id))
}

/// Replace the configured run id when one is given.
pub fn with_run_id(config: PipelineConfig, run_id: Option<String>) -> PipelineConfig {
    match run_id {
        Some(id) => {
            let run = config.run().clone().with_run_id(Some(id));
            config.with_run(run)
        }
        None => config,
    }
}

/// Entry mode from the command line, else from the configuration.
pub fn resolve_entry(config: &PipelineConfig, entry: Option<EntryMode>) -> EntryMode {
    entry.unwrap_or(*config.entry().mode())
}

/// Production collaborators for the configured models.
///
/// # Errors
///
/// Returns a missing-credentials error when `OPENROUTER_API_KEY` or
/// `REPLICATE_API_TOKEN` is unset.
pub fn build_services(config: &PipelineConfig) -> AdreelResult<Services> {
    let models = config.models();
    let llm = OpenRouterClient::new(models.llm_model())?.with_enforced_schema(*models.enforced_schema());
    let replicate = ReplicateClient::new()?;

    Ok(Services {
        llm: Arc::new(llm),
        image: Arc::new(ReplicateImageModel::new(replicate.clone(), models.image_model())),
        video: Arc::new(ReplicateVideoModel::new(replicate, models.video_model())),
        merger: Arc::new(FfmpegMerger::default()),
    })
}

/// Execute a run and return its report.
#[tracing::instrument(skip_all)]
pub async fn run_pipeline(
    config_path: Option<&Path>,
    run_id: Option<String>,
    entry: Option<EntryMode>,
) -> AdreelResult<RunReport> {
    let config = resolve_config(config_path, run_id)?;
    let mode = resolve_entry(&config, entry);
    // Fail on bad configuration before asking for credentials
    config.validate_for(mode)?;

    let services = build_services(&config)?;
    let store = FileSystemArtifactStore::new(config.run().output_dir().clone())?;
    tracing::info!(output_dir = %store.base_path().display(), mode = %mode, "Prepared run");

    let orchestrator = PipelineOrchestrator::new(Arc::new(store), services);
    orchestrator.run(mode, &config).await
}
