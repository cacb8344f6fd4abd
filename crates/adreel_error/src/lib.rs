//! Error types for the adreel pipeline.
//!
//! This crate provides the foundation error types used throughout the adreel workspace.
//!
//! # Error Hierarchy
//!
//! All errors follow the `ErrorKind` + wrapper struct pattern:
//! - `*ErrorKind` enum defines specific error conditions
//! - `*Error` struct wraps the kind with source location tracking
//! - All errors use `#[track_caller]` for automatic location capture
//!
//! Every error can be classified into an [`ErrorClass`], which is what the
//! stage executor and orchestrator use to decide between retrying a unit,
//! isolating its failure, or halting the run.
//!
//! # Examples
//!
//! ```
//! use adreel_error::{AdreelResult, ErrorClass, ServiceError, ServiceErrorKind};
//!
//! fn call_service() -> AdreelResult<String> {
//!     Err(ServiceError::new(ServiceErrorKind::RateLimited("429".to_string())))?
//! }
//!
//! let err = call_service().unwrap_err();
//! assert_eq!(err.class(), ErrorClass::Transient);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod class;
mod config;
mod error;
mod json;
mod output;
mod pipeline;
mod service;
mod storage;

pub use class::ErrorClass;
pub use config::ConfigError;
pub use error::{AdreelError, AdreelErrorKind, AdreelResult};
pub use json::JsonError;
pub use output::{OutputError, OutputErrorKind};
pub use pipeline::{PipelineError, PipelineErrorKind};
pub use service::{RetryableError, ServiceError, ServiceErrorKind};
pub use storage::{StorageError, StorageErrorKind};
