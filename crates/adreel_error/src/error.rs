//! Top-level error wrapper types.

use crate::{
    ConfigError, ErrorClass, JsonError, OutputError, OutputErrorKind, PipelineError,
    PipelineErrorKind, ServiceError, ServiceErrorKind, StorageError,
};

/// The foundation error enum. Every crate-level error converts into it.
///
/// # Examples
///
/// ```
/// use adreel_error::{AdreelError, ConfigError, ErrorClass};
///
/// let err: AdreelError = ConfigError::new("workers must be positive").into();
/// assert_eq!(err.class(), ErrorClass::Configuration);
/// assert!(format!("{}", err).contains("workers must be positive"));
/// ```
#[derive(Debug, derive_more::From, derive_more::Display, derive_more::Error)]
pub enum AdreelErrorKind {
    /// JSON serialization/deserialization error
    #[from(JsonError)]
    Json(JsonError),
    /// Configuration error
    #[from(ConfigError)]
    Config(ConfigError),
    /// Artifact store error
    #[from(StorageError)]
    Storage(StorageError),
    /// External service error
    #[from(ServiceError)]
    Service(ServiceError),
    /// Structured model-output error
    #[from(OutputError)]
    Output(OutputError),
    /// Stage or orchestration error
    #[from(PipelineError)]
    Pipeline(PipelineError),
}

/// adreel error with kind discrimination.
///
/// # Examples
///
/// ```
/// use adreel_error::{AdreelResult, ConfigError, ErrorClass};
///
/// fn might_fail() -> AdreelResult<()> {
///     Err(ConfigError::new("Missing field"))?
/// }
///
/// assert_eq!(might_fail().unwrap_err().class(), ErrorClass::Configuration);
/// ```
#[derive(Debug, derive_more::Display, derive_more::Error)]
#[display("adreel Error: {}", _0)]
pub struct AdreelError(Box<AdreelErrorKind>);

impl AdreelError {
    /// Create a new error from a kind.
    pub fn new(kind: AdreelErrorKind) -> Self {
        Self(Box::new(kind))
    }

    /// Get the error kind.
    pub fn kind(&self) -> &AdreelErrorKind {
        &self.0
    }

    /// Classify the error for retry, isolation and halting decisions.
    pub fn class(&self) -> ErrorClass {
        match self.kind() {
            AdreelErrorKind::Json(_) => ErrorClass::Other,
            AdreelErrorKind::Config(_) => ErrorClass::Configuration,
            AdreelErrorKind::Storage(_) => ErrorClass::Storage,
            AdreelErrorKind::Service(e) => match e.kind {
                ServiceErrorKind::RateLimited(_)
                | ServiceErrorKind::Network(_)
                | ServiceErrorKind::Timeout(_)
                | ServiceErrorKind::Unavailable(_) => ErrorClass::Transient,
                ServiceErrorKind::ContentPolicy(_) => ErrorClass::ContentPolicy,
                _ => ErrorClass::Other,
            },
            AdreelErrorKind::Output(e) => match e.kind {
                OutputErrorKind::Empty(_) | OutputErrorKind::Malformed { .. } => {
                    ErrorClass::MalformedOutput
                }
                OutputErrorKind::SchemaConformance(_) => ErrorClass::SchemaConformance,
            },
            AdreelErrorKind::Pipeline(e) => match e.kind {
                PipelineErrorKind::MissingDependency { .. } => ErrorClass::MissingDependency,
                PipelineErrorKind::UnitTimeout { .. } => ErrorClass::Transient,
                PipelineErrorKind::InvalidArtifact(_) => ErrorClass::SchemaConformance,
                PipelineErrorKind::StageFailed { .. } => ErrorClass::Other,
            },
        }
    }
}

// Generic From implementation for any type that converts to AdreelErrorKind
impl<T> From<T> for AdreelError
where
    T: Into<AdreelErrorKind>,
{
    fn from(err: T) -> Self {
        Self::new(err.into())
    }
}

/// Result type for adreel operations.
pub type AdreelResult<T> = std::result::Result<T, AdreelError>;
