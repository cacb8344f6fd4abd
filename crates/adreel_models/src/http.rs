//! Shared reqwest error mapping and request retries.

use adreel_error::{RetryableError, ServiceError, ServiceErrorKind};
use std::future::Future;
use std::time::Duration;
use tokio_retry2::strategy::{ExponentialBackoff, jitter};
use tokio_retry2::{Retry, RetryError};
use tracing::warn;

/// Map a transport error onto the collaborator taxonomy.
pub(crate) fn transport_error(provider: &str, e: reqwest::Error) -> ServiceError {
    if e.is_timeout() {
        ServiceError::new(ServiceErrorKind::Timeout(format!("{}: {}", provider, e)))
    } else if let Some(status) = e.status() {
        ServiceError::from_status(status.as_u16(), format!("{}: {}", provider, e))
    } else {
        ServiceError::new(ServiceErrorKind::Network(format!("{}: {}", provider, e)))
    }
}

/// Read an API credential from the environment.
pub(crate) fn env_credential(var: &str) -> Result<String, ServiceError> {
    std::env::var(var)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| {
            ServiceError::new(ServiceErrorKind::MissingCredentials(format!(
                "{} not set",
                var
            )))
        })
}

/// Retry an idempotent request while it fails with a retryable error.
///
/// The backoff is chosen from the first failure's strategy parameters, so a
/// rate limit waits longer than a dropped connection. Permanent errors are
/// returned immediately.
#[cfg_attr(not(feature = "replicate"), allow(dead_code))]
pub(crate) async fn retry_transient<T, F, Fut>(operation: &str, mut call: F) -> Result<T, ServiceError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ServiceError>>,
{
    let first = match call().await {
        Ok(value) => return Ok(value),
        Err(e) if !e.is_retryable() => return Err(e),
        Err(e) => e,
    };

    let (initial_ms, max_retries, max_delay_secs) = first.retry_strategy_params();
    warn!(
        operation,
        error = %first,
        initial_backoff_ms = initial_ms,
        max_retries,
        "Request failed, will retry"
    );

    let strategy = ExponentialBackoff::from_millis(initial_ms)
        .factor(2)
        .max_delay(Duration::from_secs(max_delay_secs))
        .map(jitter)
        .take(max_retries);

    Retry::spawn(strategy, || {
        let attempt = call();
        async move {
            match attempt.await {
                Ok(value) => Ok(value),
                Err(e) if e.is_retryable() => {
                    warn!(operation, error = %e, "Request failed again, will retry");
                    Err(RetryError::Transient {
                        err: e,
                        retry_after: None,
                    })
                }
                Err(e) => Err(RetryError::Permanent(e)),
            }
        }
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_permanent_error_not_retried() {
        let calls = AtomicUsize::new(0);
        let calls = &calls;
        let result: Result<(), _> = retry_transient("test", || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(ServiceError::new(ServiceErrorKind::ContentPolicy("flagged".into())))
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_network_error_retried() {
        let calls = AtomicUsize::new(0);
        let calls = &calls;
        let result = retry_transient("test", || async move {
            if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(ServiceError::new(ServiceErrorKind::Network("reset".into())))
            } else {
                Ok(7)
            }
        })
        .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
