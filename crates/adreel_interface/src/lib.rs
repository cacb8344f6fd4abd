//! Collaborator traits for adreel.
//!
//! The pipeline never talks to a provider directly. Every external service is
//! reached through one of these traits, so stages can be exercised against
//! scripted fakes and providers can be swapped through configuration.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod traits;

pub use traits::{ImageService, LlmService, MediaMerger, VideoService};
