//! Test utilities for adreel pipeline tests.
//!
//! This module provides scripted service fakes and config helpers.

use adreel_pipeline::{PipelineConfig, Services};
use std::sync::Arc;

pub mod fakes;

#[allow(unused_imports)]
pub use fakes::{FakeImage, FakeMerger, FakeVideo, ScriptedLlm};

/// Brief-mode overrides with a fixed run id and fast retries.
pub const BRIEF_CONFIG: &str = r#"
[run]
run_id = "acme_test"

[brief]
brand_name = "Acme"
product_description = "A wristwatch that never needs winding"
creative_direction = "Playful"

[concept_generation]
ad_styles = ["Bold", "Quiet"]
models = ["test/writer"]
workers = 2

[video]
total_seconds = 12
unit_count = 2

[execution]
workers = 2
unit_timeout_secs = 5
max_unit_retries = 1
retry_backoff_ms = 1
max_retry_delay_secs = 1
required_scenes = [1]
"#;

/// Parse the brief config with extra TOML appended.
pub fn brief_config(extra: &str) -> PipelineConfig {
    PipelineConfig::from_toml_str(&format!("{}\n{}", BRIEF_CONFIG, extra))
        .expect("test config parses")
}

/// Fakes plus the bundle handed to the orchestrator.
pub struct TestServices {
    pub llm: Arc<ScriptedLlm>,
    pub image: Arc<FakeImage>,
    pub video: Arc<FakeVideo>,
    pub services: Services,
}

/// Fresh fakes with no injected failures.
#[allow(dead_code)]
pub fn services() -> TestServices {
    services_with(FakeImage::default(), FakeVideo::default())
}

/// Fakes with the given media services.
#[allow(dead_code)]
pub fn services_with(image: FakeImage, video: FakeVideo) -> TestServices {
    services_full(ScriptedLlm::default(), image, video)
}

/// Fakes with every service given.
pub fn services_full(llm: ScriptedLlm, image: FakeImage, video: FakeVideo) -> TestServices {
    let llm = Arc::new(llm);
    let image = Arc::new(image);
    let video = Arc::new(video);
    let services = Services {
        llm: llm.clone(),
        image: image.clone(),
        video: video.clone(),
        merger: Arc::new(FakeMerger),
    };
    TestServices {
        llm,
        image,
        video,
        services,
    }
}
