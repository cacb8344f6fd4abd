//! External collaborator error types (LLM, image, video and merge services).

/// Kinds of collaborator failures.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, derive_more::Display)]
pub enum ServiceErrorKind {
    /// The service asked us to slow down (HTTP 429)
    #[display("Rate limited: {}", _0)]
    RateLimited(String),
    /// Connection or transport failure
    #[display("Network failure: {}", _0)]
    Network(String),
    /// The call did not complete within its deadline
    #[display("Timed out: {}", _0)]
    Timeout(String),
    /// The service is temporarily unavailable (HTTP 5xx)
    #[display("Service unavailable: {}", _0)]
    Unavailable(String),
    /// The service refused the request on content-policy grounds
    #[display("Content policy rejection: {}", _0)]
    ContentPolicy(String),
    /// The service rejected the request (non-retryable 4xx)
    #[display("Request rejected ({}): {}", status, message)]
    Rejected {
        /// HTTP status code
        status: u16,
        /// Response body or provider message
        message: String,
    },
    /// The service answered with a payload we could not interpret
    #[display("Invalid service response: {}", _0)]
    InvalidResponse(String),
    /// Credentials for the service are not configured
    #[display("Missing credentials: {}", _0)]
    MissingCredentials(String),
    /// A local tool (such as the media merger) exited unsuccessfully
    #[display("External tool failed: {}", _0)]
    Tool(String),
}

/// Trait for errors that can be retried.
pub trait RetryableError {
    /// Returns true if this error should trigger a retry.
    ///
    /// Rate limits, network failures, timeouts and 5xx responses are
    /// retryable. Policy rejections and malformed requests are not.
    fn is_retryable(&self) -> bool;

    /// Get retry strategy parameters for this error.
    ///
    /// Returns `(initial_backoff_ms, max_retries, max_delay_secs)`.
    fn retry_strategy_params(&self) -> (u64, usize, u64) {
        (2000, 5, 60)
    }
}

impl RetryableError for ServiceErrorKind {
    fn is_retryable(&self) -> bool {
        matches!(
            self,
            ServiceErrorKind::RateLimited(_)
                | ServiceErrorKind::Network(_)
                | ServiceErrorKind::Timeout(_)
                | ServiceErrorKind::Unavailable(_)
        )
    }

    fn retry_strategy_params(&self) -> (u64, usize, u64) {
        match self {
            // Rate limits recover slowly; wait longer and give up sooner
            ServiceErrorKind::RateLimited(_) => (5000, 3, 60),
            ServiceErrorKind::Unavailable(_) => (2000, 5, 60),
            _ => (1000, 3, 30),
        }
    }
}

/// Collaborator error with location tracking.
///
/// # Examples
///
/// ```
/// use adreel_error::{RetryableError, ServiceError, ServiceErrorKind};
///
/// let err = ServiceError::new(ServiceErrorKind::ContentPolicy("flagged".to_string()));
/// assert!(!err.is_retryable());
/// ```
#[derive(Debug, Clone, derive_more::Display, derive_more::Error)]
#[display("Service Error: {} at line {} in {}", kind, line, file)]
pub struct ServiceError {
    /// The kind of error that occurred
    pub kind: ServiceErrorKind,
    /// Line number where error was created
    pub line: u32,
    /// File where error was created
    pub file: &'static str,
}

impl ServiceError {
    /// Create a new service error with automatic location tracking.
    #[track_caller]
    pub fn new(kind: ServiceErrorKind) -> Self {
        let location = std::panic::Location::caller();
        Self {
            kind,
            line: location.line(),
            file: location.file(),
        }
    }

    /// Maps an HTTP status and body onto the matching error kind.
    #[track_caller]
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        let kind = match status {
            429 => ServiceErrorKind::RateLimited(message),
            408 => ServiceErrorKind::Timeout(message),
            500..=599 => ServiceErrorKind::Unavailable(format!("{}: {}", status, message)),
            _ => ServiceErrorKind::Rejected { status, message },
        };
        Self::new(kind)
    }
}

impl RetryableError for ServiceError {
    fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }

    fn retry_strategy_params(&self) -> (u64, usize, u64) {
        self.kind.retry_strategy_params()
    }
}
