//! Stage and orchestration error types.

/// Kinds of pipeline errors.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, derive_more::Display)]
pub enum PipelineErrorKind {
    /// A stage's declared upstream artifact is absent
    #[display("Stage {} requires missing upstream artifact from {}", stage, upstream)]
    MissingDependency {
        /// Stage that could not start
        stage: String,
        /// Upstream stage whose artifact is absent
        upstream: String,
    },
    /// A stage finished with a fatal outcome
    #[display("Stage {} failed: {}", stage, message)]
    StageFailed {
        /// Failing stage
        stage: String,
        /// Root cause
        message: String,
    },
    /// A unit exceeded its deadline
    #[display("Unit {} timed out after {}s", unit, seconds)]
    UnitTimeout {
        /// Unit key
        unit: String,
        /// Deadline that elapsed
        seconds: u64,
    },
    /// A stored artifact does not hold what its stage promised
    #[display("Invalid artifact: {}", _0)]
    InvalidArtifact(String),
}

/// Pipeline error with location tracking.
///
/// # Examples
///
/// ```
/// use adreel_error::{PipelineError, PipelineErrorKind};
///
/// let err = PipelineError::new(PipelineErrorKind::MissingDependency {
///     stage: "generate_video_clips".into(),
///     upstream: "generate_first_frames".into(),
/// });
/// assert!(format!("{}", err).contains("generate_first_frames"));
/// ```
#[derive(Debug, Clone, derive_more::Display, derive_more::Error)]
#[display("Pipeline Error: {} at line {} in {}", kind, line, file)]
pub struct PipelineError {
    /// The kind of error that occurred
    pub kind: PipelineErrorKind,
    /// Line number where error was created
    pub line: u32,
    /// File where error was created
    pub file: &'static str,
}

impl PipelineError {
    /// Create a new pipeline error with automatic location tracking.
    #[track_caller]
    pub fn new(kind: PipelineErrorKind) -> Self {
        let location = std::panic::Location::caller();
        Self {
            kind,
            line: location.line(),
            file: location.file(),
        }
    }
}
