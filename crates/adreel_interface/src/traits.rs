//! Trait definitions for external services.

use adreel_core::{GeneratedMedia, ImageRequest, LlmRequest, LlmResponse, VideoRequest};
use adreel_error::AdreelResult;
use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// A text-generation service.
#[async_trait]
pub trait LlmService: Send + Sync {
    /// Complete a role-tagged prompt.
    ///
    /// Failures surface as rate limits (transient), content-policy
    /// rejections, or invalid responses.
    async fn complete(&self, request: &LlmRequest) -> AdreelResult<LlmResponse>;

    /// Whether the provider enforces a requested JSON schema itself.
    ///
    /// When true, callers trust the output shape and skip textual repair.
    fn supports_enforced_schema(&self) -> bool {
        false
    }

    /// Provider name (e.g., "openrouter").
    fn provider_name(&self) -> &'static str;

    /// Default model identifier.
    fn model_name(&self) -> &str;
}

/// An image-generation service.
#[async_trait]
pub trait ImageService: Send + Sync {
    /// Render one image.
    async fn generate_image(&self, request: &ImageRequest) -> AdreelResult<GeneratedMedia>;

    /// Maximum number of reference images per request.
    fn max_reference_images(&self) -> usize {
        5
    }

    /// Model identifier.
    fn model_name(&self) -> &str;
}

/// A video-generation service.
#[async_trait]
pub trait VideoService: Send + Sync {
    /// Render one clip from a starting frame.
    async fn generate_video(&self, request: &VideoRequest) -> AdreelResult<GeneratedMedia>;

    /// Model identifier, used to pick the allowed duration set.
    fn model_name(&self) -> &str;
}

/// A tool that concatenates clips without re-encoding.
#[async_trait]
pub trait MediaMerger: Send + Sync {
    /// Concatenate `inputs` in order into `output`.
    ///
    /// Inputs must share codecs and encoding parameters.
    async fn merge(&self, inputs: &[PathBuf], output: &Path) -> AdreelResult<()>;
}
