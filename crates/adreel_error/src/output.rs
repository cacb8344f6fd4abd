//! Structured model-output error types.

/// Kinds of structured-output failures.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, derive_more::Display)]
pub enum OutputErrorKind {
    /// The response contained no content to parse
    #[display("No structured content in response: {}", _0)]
    Empty(String),
    /// Parsing failed even after the repair pass
    #[display("Malformed output at line {}, column {}: {}", line, column, message)]
    Malformed {
        /// Parser message
        message: String,
        /// 1-based line of the parse failure
        line: usize,
        /// 1-based column of the parse failure
        column: usize,
    },
    /// Parsed successfully but the record does not have the required shape
    #[display("Schema conformance failure: {}", _0)]
    SchemaConformance(String),
}

/// Structured-output error with location tracking.
///
/// # Examples
///
/// ```
/// use adreel_error::{OutputError, OutputErrorKind};
///
/// let err = OutputError::new(OutputErrorKind::SchemaConformance("missing `scenes`".into()));
/// assert!(format!("{}", err).contains("scenes"));
/// ```
#[derive(Debug, Clone, derive_more::Display, derive_more::Error)]
#[display("Output Error: {} at line {} in {}", kind, line, file)]
pub struct OutputError {
    /// The kind of error that occurred
    pub kind: OutputErrorKind,
    /// Line number where error was created
    pub line: u32,
    /// File where error was created
    pub file: &'static str,
}

impl OutputError {
    /// Create a new output error with automatic location tracking.
    #[track_caller]
    pub fn new(kind: OutputErrorKind) -> Self {
        let location = std::panic::Location::caller();
        Self {
            kind,
            line: location.line(),
            file: location.file(),
        }
    }
}
