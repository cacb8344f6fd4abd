//! Request and response types for image and video services.

use derive_getters::Getters;
use serde::{Deserialize, Serialize};

/// An input file sent to a media service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaInput {
    /// Label used in logs and debug context (usually the artifact key)
    pub label: String,
    /// MIME type
    pub mime_type: String,
    /// Raw bytes
    #[serde(skip)]
    pub data: Vec<u8>,
}

/// Image generation request.
#[derive(Debug, Clone, PartialEq, Serialize, Getters, derive_builder::Builder)]
#[builder(setter(into))]
pub struct ImageRequest {
    /// Prompt text
    prompt: String,
    /// Ordered reference images, at most five
    #[builder(default)]
    references: Vec<MediaInput>,
    /// Aspect ratio such as `16:9` or `match_input_image`
    #[builder(default = "\"16:9\".to_string()")]
    aspect_ratio: String,
    /// Output resolution hint such as `2K`
    #[builder(default)]
    resolution: Option<String>,
    /// Output format such as `png`
    #[builder(default = "\"png\".to_string()")]
    output_format: String,
}

/// Video generation request.
#[derive(Debug, Clone, PartialEq, Serialize, Getters, derive_builder::Builder)]
#[builder(setter(into))]
pub struct VideoRequest {
    /// Prompt text
    prompt: String,
    /// Starting frame
    first_frame: MediaInput,
    /// Clip length in seconds, from the model's allowed set
    duration_seconds: u32,
    /// Resolution such as `720p`
    #[builder(default = "\"720p\".to_string()")]
    resolution: String,
    /// Aspect ratio such as `16:9`
    #[builder(default = "\"16:9\".to_string()")]
    aspect_ratio: String,
    /// Whether to generate an audio track
    #[builder(default = "true")]
    generate_audio: bool,
}

/// Media returned by a service.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedMedia {
    /// Raw bytes
    pub data: Vec<u8>,
    /// MIME type
    pub mime_type: String,
    /// Where the provider hosted the output, if anywhere
    pub source_url: Option<String>,
}
