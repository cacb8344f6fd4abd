//! Service integrations for adreel.
//!
//! This crate provides concrete implementations of the collaborator traits
//! in `adreel_interface`, each behind its own feature flag.
//!
//! # Available Integrations
//!
//! - **OpenRouter** (OpenAI-compatible chat completions) - `openrouter` feature
//! - **Replicate** (image and video predictions) - `replicate` feature
//! - **ffmpeg** (stream-copy concatenation) - `ffmpeg` feature
//!
//! # Example
//!
//! ```no_run
//! # #[cfg(feature = "openrouter")]
//! # {
//! use adreel_core::{LlmRequestBuilder, Message};
//! use adreel_interface::LlmService;
//! use adreel_models::OpenRouterClient;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let client = OpenRouterClient::new("anthropic/claude-sonnet-4.5")?;
//! let request = LlmRequestBuilder::default()
//!     .messages(vec![Message::user("Hello")])
//!     .build()?;
//! let response = client.complete(&request).await?;
//! println!("{}", response.content());
//! # Ok(())
//! # }
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

#[cfg(feature = "openrouter")]
mod openrouter;

#[cfg(feature = "replicate")]
mod replicate;

#[cfg(feature = "ffmpeg")]
mod ffmpeg;

#[cfg(any(feature = "openrouter", feature = "replicate"))]
mod http;

#[cfg(feature = "openrouter")]
pub use openrouter::{
    ApiError, ChatChoice, ChatContent, ChatMessage, ChatRequest, ChatRequestBuilder,
    ChatResponse, ChoiceMessage, ContentPart, OpenRouterClient, ResponseFormat,
};

#[cfg(feature = "replicate")]
pub use replicate::{
    Prediction, PredictionUrls, ReplicateClient, ReplicateImageModel, ReplicateVideoModel, data_uri,
    image_input, video_input,
};

#[cfg(feature = "ffmpeg")]
pub use ffmpeg::{FfmpegMerger, concat_list};
