//! Pipeline configuration with layered loading.
//!
//! Configuration is resolved with the following precedence (highest first):
//! 1. An explicit path passed on the command line
//! 2. `./adreel.toml` in the working directory
//! 3. `~/.config/adreel/adreel.toml`
//! 4. Bundled defaults (`adreel.toml` in this crate, via `include_str!`)
//!
//! The resolved [`PipelineConfig`] is built once per run and passed by
//! reference into every stage. Nothing reads settings from global state.

use crate::{DurationRequest, allowed_durations_for};
use adreel_core::{EntryMode, StageId};
use adreel_error::{AdreelError, AdreelResult, ConfigError};
use config::{Config, File, FileFormat};
use derive_getters::Getters;
use derive_setters::Setters;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_CONFIG: &str = include_str!("../adreel.toml");

/// Run identity and output location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Getters, Setters)]
#[setters(prefix = "with_", into)]
pub struct RunSection {
    /// Root directory for run artifacts
    #[serde(default = "default_output_dir")]
    output_dir: PathBuf,
    /// Fixed run id; a fresh one is generated when absent
    #[serde(default)]
    run_id: Option<String>,
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("runs")
}

impl Default for RunSection {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            run_id: None,
        }
    }
}

/// Where the run starts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Getters, Setters)]
#[setters(prefix = "with_", into)]
pub struct EntrySection {
    /// Entry mode
    #[serde(default = "default_entry_mode")]
    mode: EntryMode,
    /// Raw concept text for direct-concept runs
    #[serde(default)]
    concept: Option<String>,
    /// File holding the raw concept, used when `concept` is absent
    #[serde(default)]
    concept_file: Option<PathBuf>,
    /// External evaluation file for pre-evaluated runs
    #[serde(default)]
    evaluation_path: Option<PathBuf>,
}

fn default_entry_mode() -> EntryMode {
    EntryMode::BrandBrief
}

impl Default for EntrySection {
    fn default() -> Self {
        Self {
            mode: default_entry_mode(),
            concept: None,
            concept_file: None,
            evaluation_path: None,
        }
    }
}

/// The brand brief.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, Getters, Setters)]
#[setters(prefix = "with_", into)]
pub struct BriefSection {
    /// Brand name
    #[serde(default)]
    brand_name: String,
    /// What is being advertised
    #[serde(default)]
    product_description: String,
    /// Optional tagline
    #[serde(default)]
    tagline: Option<String>,
    /// Free-form creative direction
    #[serde(default)]
    creative_direction: String,
    /// Optional target audience
    #[serde(default)]
    target_audience: Option<String>,
}

/// Multi-concept generation for brand-brief runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Getters, Setters)]
#[setters(prefix = "with_", into)]
pub struct ConceptGenerationSection {
    /// Ad styles, one concept per style and model
    #[serde(default = "default_ad_styles")]
    ad_styles: Vec<String>,
    /// Models, one concept per style and model
    #[serde(default = "default_concept_models")]
    models: Vec<String>,
    /// Parallel generation calls
    #[serde(default = "default_concept_workers")]
    workers: usize,
}

fn default_ad_styles() -> Vec<String> {
    vec![
        "emotional storytelling".to_string(),
        "humor".to_string(),
        "cinematic epic".to_string(),
    ]
}

fn default_concept_models() -> Vec<String> {
    vec![default_llm_model()]
}

fn default_concept_workers() -> usize {
    8
}

impl Default for ConceptGenerationSection {
    fn default() -> Self {
        Self {
            ad_styles: default_ad_styles(),
            models: default_concept_models(),
            workers: default_concept_workers(),
        }
    }
}

/// Concept judging.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Getters, Setters)]
#[setters(prefix = "with_", into)]
pub struct EvaluationSection {
    /// Model used as judge
    #[serde(default = "default_llm_model")]
    judge_model: String,
    /// Parallel judge calls
    #[serde(default = "default_evaluation_workers")]
    workers: usize,
}

fn default_evaluation_workers() -> usize {
    4
}

impl Default for EvaluationSection {
    fn default() -> Self {
        Self {
            judge_model: default_llm_model(),
            workers: default_evaluation_workers(),
        }
    }
}

/// Collaborator model selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Getters, Setters)]
#[setters(prefix = "with_", into)]
pub struct ModelsSection {
    /// Default text model
    #[serde(default = "default_llm_model")]
    llm_model: String,
    /// Image model
    #[serde(default = "default_image_model")]
    image_model: String,
    /// Video model; also selects the allowed clip durations
    #[serde(default = "default_video_model")]
    video_model: String,
    /// Whether the text provider enforces JSON schemas
    #[serde(default)]
    enforced_schema: bool,
}

fn default_llm_model() -> String {
    "anthropic/claude-sonnet-4.5".to_string()
}

fn default_image_model() -> String {
    "google/nano-banana-pro".to_string()
}

fn default_video_model() -> String {
    "google/veo-3-fast".to_string()
}

impl Default for ModelsSection {
    fn default() -> Self {
        Self {
            llm_model: default_llm_model(),
            image_model: default_image_model(),
            video_model: default_video_model(),
            enforced_schema: false,
        }
    }
}

/// Output video shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Getters, Setters)]
#[setters(prefix = "with_", into)]
pub struct VideoSection {
    /// Total ad length in seconds
    #[serde(default)]
    total_seconds: Option<f64>,
    /// Requested clip length in seconds
    #[serde(default)]
    unit_seconds: Option<f64>,
    /// Number of scenes
    #[serde(default)]
    unit_count: Option<u32>,
    /// Clip resolution
    #[serde(default = "default_resolution")]
    resolution: String,
    /// Aspect ratio
    #[serde(default = "default_aspect_ratio")]
    aspect_ratio: String,
    /// Generate audio with each clip
    #[serde(default = "default_true")]
    generate_audio: bool,
    /// Overrides the video model's allowed clip durations
    #[serde(default)]
    allowed_durations: Option<Vec<u32>>,
}

fn default_resolution() -> String {
    "720p".to_string()
}

fn default_aspect_ratio() -> String {
    "16:9".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for VideoSection {
    fn default() -> Self {
        Self {
            total_seconds: Some(30.0),
            unit_seconds: None,
            unit_count: None,
            resolution: default_resolution(),
            aspect_ratio: default_aspect_ratio(),
            generate_audio: true,
            allowed_durations: None,
        }
    }
}

/// Unit execution limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Getters, Setters)]
#[setters(prefix = "with_", into)]
pub struct ExecutionSection {
    /// Parallel units per media stage
    #[serde(default = "default_workers")]
    workers: usize,
    /// Per-attempt deadline in seconds
    #[serde(default = "default_unit_timeout")]
    unit_timeout_secs: u64,
    /// Retries for transient unit failures
    #[serde(default = "default_max_unit_retries")]
    max_unit_retries: usize,
    /// Initial retry backoff in milliseconds
    #[serde(default = "default_retry_backoff")]
    retry_backoff_ms: u64,
    /// Ceiling on a single retry delay in seconds
    #[serde(default = "default_max_retry_delay")]
    max_retry_delay_secs: u64,
    /// Fraction of units that must succeed for a stage not to be fatal
    #[serde(default)]
    min_success_ratio: f64,
    /// Scenes whose failure is fatal for per-scene stages
    #[serde(default)]
    required_scenes: Vec<u32>,
}

fn default_workers() -> usize {
    5
}

fn default_unit_timeout() -> u64 {
    900
}

fn default_max_unit_retries() -> usize {
    2
}

fn default_retry_backoff() -> u64 {
    2000
}

fn default_max_retry_delay() -> u64 {
    60
}

impl Default for ExecutionSection {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            unit_timeout_secs: default_unit_timeout(),
            max_unit_retries: default_max_unit_retries(),
            retry_backoff_ms: default_retry_backoff(),
            max_retry_delay_secs: default_max_retry_delay(),
            min_success_ratio: 0.0,
            required_scenes: Vec::new(),
        }
    }
}

impl ExecutionSection {
    /// Per-attempt deadline.
    pub fn unit_timeout(&self) -> Duration {
        Duration::from_secs(self.unit_timeout_secs)
    }
}

/// Skip-if-exists flags.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, Getters, Setters)]
#[setters(prefix = "with_", into)]
pub struct SkipSection {
    /// Skip every stage whose manifest exists
    #[serde(default)]
    all: bool,
    /// Skip these stages when their manifest exists
    #[serde(default)]
    stages: BTreeSet<StageId>,
}

impl SkipSection {
    /// Whether the skip flag is set for a stage.
    pub fn enabled(&self, stage: StageId) -> bool {
        self.all || self.stages.contains(&stage)
    }
}

/// Direct-concept options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Getters, Setters)]
#[setters(prefix = "with_", into)]
pub struct DirectSection {
    /// Judge and revise the expanded concept before universe generation
    #[serde(default = "default_true")]
    judge_and_revise: bool,
}

impl Default for DirectSection {
    fn default() -> Self {
        Self {
            judge_and_revise: true,
        }
    }
}

/// Complete pipeline configuration.
///
/// # Example
///
/// ```
/// use adreel_pipeline::PipelineConfig;
///
/// let config = PipelineConfig::from_toml_str(
///     r#"
///     [brief]
///     brand_name = "Acme"
///     product_description = "Solar watches"
///     "#,
/// )
/// .unwrap();
/// assert_eq!(config.brief().brand_name(), "Acme");
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, Getters, Setters)]
#[setters(prefix = "with_", into)]
pub struct PipelineConfig {
    /// Run identity and output root
    #[serde(default)]
    run: RunSection,
    /// Entry mode and inputs
    #[serde(default)]
    entry: EntrySection,
    /// Brand brief
    #[serde(default)]
    brief: BriefSection,
    /// Multi-concept generation
    #[serde(default)]
    concept_generation: ConceptGenerationSection,
    /// Judging
    #[serde(default)]
    evaluation: EvaluationSection,
    /// Model selection
    #[serde(default)]
    models: ModelsSection,
    /// Output video shape
    #[serde(default)]
    video: VideoSection,
    /// Unit execution limits
    #[serde(default)]
    execution: ExecutionSection,
    /// Skip-if-exists flags
    #[serde(default)]
    skip: SkipSection,
    /// Direct-concept options
    #[serde(default)]
    direct: DirectSection,
}

impl PipelineConfig {
    /// Load configuration with precedence: explicit path > `./adreel.toml` >
    /// `~/.config/adreel/adreel.toml` > bundled defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the explicit file is missing or any layer fails to
    /// parse.
    #[tracing::instrument]
    pub fn load(explicit: Option<&Path>) -> AdreelResult<Self> {
        tracing::debug!("Loading configuration with precedence: explicit > current dir > home dir > bundled defaults");

        let mut builder =
            Config::builder().add_source(File::from_str(DEFAULT_CONFIG, FileFormat::Toml));

        if let Some(home) = dirs::home_dir() {
            let home_config = home.join(".config/adreel/adreel.toml");
            builder = builder.add_source(File::from(home_config).required(false));
        }

        builder = builder.add_source(File::with_name("adreel").required(false));

        if let Some(path) = explicit {
            builder = builder.add_source(File::from(path).required(true));
        }

        Self::finish(builder)
    }

    /// Bundled defaults overlaid with a TOML string.
    pub fn from_toml_str(overrides: &str) -> AdreelResult<Self> {
        let builder = Config::builder()
            .add_source(File::from_str(DEFAULT_CONFIG, FileFormat::Toml))
            .add_source(File::from_str(overrides, FileFormat::Toml));
        Self::finish(builder)
    }

    fn finish(
        builder: config::builder::ConfigBuilder<config::builder::DefaultState>,
    ) -> AdreelResult<Self> {
        builder
            .build()
            .map_err(|e| {
                AdreelError::from(ConfigError::new(format!(
                    "Failed to build configuration: {}",
                    e
                )))
            })?
            .try_deserialize()
            .map_err(|e| {
                AdreelError::from(ConfigError::new(format!(
                    "Failed to parse configuration: {}",
                    e
                )))
            })
    }

    /// Allowed clip durations for the configured video model.
    pub fn allowed_durations(&self) -> Vec<u32> {
        match &self.video.allowed_durations {
            Some(durations) => durations.clone(),
            None => allowed_durations_for(&self.models.video_model),
        }
    }

    /// Duration inputs as configured.
    pub fn duration_request(&self) -> DurationRequest {
        DurationRequest {
            unit_seconds: self.video.unit_seconds,
            unit_count: self.video.unit_count,
            total_seconds: self.video.total_seconds,
        }
    }

    /// Pre-flight checks for the configured entry mode.
    pub fn validate(&self) -> AdreelResult<()> {
        self.validate_for(self.entry.mode)
    }

    /// Pre-flight checks for a given entry mode.
    ///
    /// Every problem is collected so a single run reports all of them.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] listing each problem found.
    pub fn validate_for(&self, mode: EntryMode) -> AdreelResult<()> {
        let mut problems = Vec::new();

        match mode {
            EntryMode::BrandBrief => {
                if self.brief.brand_name.trim().is_empty() {
                    problems.push("brief.brand_name is required for brand-brief runs".to_string());
                }
                if self.brief.product_description.trim().is_empty() {
                    problems.push(
                        "brief.product_description is required for brand-brief runs".to_string(),
                    );
                }
                if self.concept_generation.ad_styles.is_empty() {
                    problems.push("concept_generation.ad_styles is empty".to_string());
                }
                if self.concept_generation.models.is_empty() {
                    problems.push("concept_generation.models is empty".to_string());
                }
            }
            EntryMode::DirectConcept => {
                let has_text = self
                    .entry
                    .concept
                    .as_deref()
                    .is_some_and(|c| !c.trim().is_empty());
                if !has_text && self.entry.concept_file.is_none() {
                    problems.push(
                        "entry.concept or entry.concept_file is required for direct-concept runs"
                            .to_string(),
                    );
                }
            }
            EntryMode::PreEvaluated => match &self.entry.evaluation_path {
                None => problems.push(
                    "entry.evaluation_path is required for pre-evaluated runs".to_string(),
                ),
                Some(path) if !path.exists() => problems.push(format!(
                    "entry.evaluation_path {} does not exist",
                    path.display()
                )),
                Some(_) => {}
            },
        }

        for (name, workers) in [
            ("execution.workers", self.execution.workers),
            ("concept_generation.workers", self.concept_generation.workers),
            ("evaluation.workers", self.evaluation.workers),
        ] {
            if workers == 0 {
                problems.push(format!("{} must be at least 1", name));
            }
        }

        if !(0.0..=1.0).contains(&self.execution.min_success_ratio) {
            problems.push(format!(
                "execution.min_success_ratio {} is outside [0, 1]",
                self.execution.min_success_ratio
            ));
        }

        let allowed = self.allowed_durations();
        if allowed.is_empty() || allowed.contains(&0) {
            problems.push("allowed clip durations must be non-empty and positive".to_string());
        } else if let Err(e) = crate::normalize(&self.duration_request(), &allowed) {
            problems.push(e.to_string());
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::new(problems.join("; ")).into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use adreel_error::ErrorClass;

    #[test]
    fn test_bundled_defaults_parse() {
        let config = PipelineConfig::from_toml_str("").unwrap();
        assert_eq!(config.entry().mode(), &EntryMode::BrandBrief);
        assert_eq!(config.models().video_model(), "google/veo-3-fast");
        assert_eq!(config.allowed_durations(), vec![4, 6, 8]);
        assert!(config.execution().required_scenes().is_empty());
        assert!(!config.skip().enabled(StageId::MergeClips));
    }

    #[test]
    fn test_overrides_and_skip_flags() {
        let config = PipelineConfig::from_toml_str(
            r#"
            [models]
            video_model = "openai/sora-2"

            [skip]
            stages = ["generate_universe"]
            "#,
        )
        .unwrap();
        assert_eq!(config.allowed_durations(), vec![4, 8, 12]);
        assert!(config.skip().enabled(StageId::GenerateUniverse));
        assert!(!config.skip().enabled(StageId::MergeClips));
    }

    #[test]
    fn test_brief_mode_requires_brand() {
        let err = PipelineConfig::default().validate().unwrap_err();
        assert_eq!(err.class(), ErrorClass::Configuration);
        assert!(err.to_string().contains("brand_name"));
        assert!(err.to_string().contains("product_description"));
    }

    #[test]
    fn test_direct_mode_requires_concept() {
        let config = PipelineConfig::default();
        assert!(config.validate_for(EntryMode::DirectConcept).is_err());

        let config = config.with_entry(
            EntrySection::default()
                .with_mode(EntryMode::DirectConcept)
                .with_concept(Some("A watch that stops time".to_string())),
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_pre_evaluated_requires_existing_file() {
        let config = PipelineConfig::default().with_entry(
            EntrySection::default()
                .with_mode(EntryMode::PreEvaluated)
                .with_evaluation_path(Some(PathBuf::from("/nonexistent/evaluations.json"))),
        );
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }

    #[test]
    fn test_rejects_bad_limits() {
        let config = PipelineConfig::default()
            .with_brief(
                BriefSection::default()
                    .with_brand_name("Acme")
                    .with_product_description("Watches"),
            )
            .with_execution(
                ExecutionSection::default()
                    .with_workers(0usize)
                    .with_min_success_ratio(1.5),
            )
            .with_video(VideoSection::default().with_allowed_durations(Some(Vec::new())));
        let message = config.validate().unwrap_err().to_string();
        assert!(message.contains("execution.workers"));
        assert!(message.contains("min_success_ratio"));
        assert!(message.contains("durations"));
    }

    #[test]
    fn test_rejects_oversized_scene_count() {
        let config = PipelineConfig::from_toml_str(
            r#"
            [brief]
            brand_name = "Acme"
            product_description = "Watches"

            [video]
            unit_seconds = 8.0
            unit_count = 4294967295
            "#,
        )
        .unwrap();
        let err = config.validate().unwrap_err();
        assert_eq!(err.class(), ErrorClass::Configuration);
        assert!(err.to_string().contains("video duration too long"));
    }
}
