//! Bounded-parallel unit execution with failure isolation.
//!
//! A stage hands the executor a list of keyed inputs and a work function.
//! Units run concurrently up to the worker limit; a failing unit never
//! cancels its siblings. Transient failures are retried with exponential
//! backoff, every attempt runs under a deadline, and any debug context a
//! unit returns is persisted under the stage's debug space.

use adreel_core::{ArtifactKey, RunId, StageId};
use adreel_error::{AdreelError, AdreelResult, ErrorClass, PipelineError, PipelineErrorKind};
use adreel_storage::{ArtifactStore, put_json};
use derive_getters::Getters;
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tokio_retry2::strategy::{ExponentialBackoff, jitter};
use tokio_retry2::{Retry, RetryError};

/// Tri-state stage outcome.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum StageOutcome {
    /// Every unit succeeded
    Success,
    /// Some units failed within tolerance
    Partial,
    /// The stage cannot feed downstream stages
    Fatal,
}

/// Per-unit status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitStatus {
    /// The unit produced its artifact
    Succeeded,
    /// The unit failed
    Failed,
}

/// Reported result of one unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Getters)]
pub struct UnitReport {
    /// Unit key
    key: String,
    /// Final status
    status: UnitStatus,
    /// Failure class
    #[serde(default, skip_serializing_if = "Option::is_none")]
    class: Option<ErrorClass>,
    /// Failure message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    /// Attempts made
    attempts: u32,
}

/// Result of one unit with its attempt count.
#[derive(Debug)]
pub struct UnitResult<T> {
    /// Unit key
    pub key: String,
    /// Final result
    pub result: AdreelResult<T>,
    /// Attempts made
    pub attempts: u32,
}

/// One attempt of a unit: its result and the context needed to replay it.
#[derive(Debug)]
pub struct UnitAttempt<T> {
    /// Request payload, chosen references, resolved durations, raw output
    pub debug: Option<serde_json::Value>,
    /// Attempt result
    pub result: AdreelResult<T>,
}

impl<T> UnitAttempt<T> {
    /// Attempt with debug context.
    pub fn new(debug: serde_json::Value, result: AdreelResult<T>) -> Self {
        Self {
            debug: Some(debug),
            result,
        }
    }

    /// Attempt without debug context.
    pub fn bare(result: AdreelResult<T>) -> Self {
        Self {
            debug: None,
            result,
        }
    }
}

/// Limits governing one stage invocation.
#[derive(Debug, Clone, PartialEq, Getters, derive_builder::Builder)]
#[builder(setter(into))]
pub struct ExecutionPolicy {
    /// Concurrent units
    #[builder(default = "5")]
    workers: usize,
    /// Per-attempt deadline
    #[builder(default = "Duration::from_secs(900)")]
    unit_timeout: Duration,
    /// Retries for transient failures
    #[builder(default = "2")]
    max_unit_retries: usize,
    /// Initial backoff in milliseconds
    #[builder(default = "2000")]
    retry_backoff_ms: u64,
    /// Ceiling on a single backoff delay
    #[builder(default = "Duration::from_secs(60)")]
    max_retry_delay: Duration,
    /// Fraction of units that must succeed to avoid a fatal outcome
    #[builder(default = "0.0")]
    min_success_ratio: f64,
    /// Units whose failure is fatal
    #[builder(default)]
    required_units: Vec<String>,
}

impl Default for ExecutionPolicy {
    fn default() -> Self {
        Self {
            workers: 5,
            unit_timeout: Duration::from_secs(900),
            max_unit_retries: 2,
            retry_backoff_ms: 2000,
            max_retry_delay: Duration::from_secs(60),
            min_success_ratio: 0.0,
            required_units: Vec::new(),
        }
    }
}

impl ExecutionPolicy {
    /// Same policy with a different worker count.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Same policy with a different required-unit list.
    pub fn with_required_units(mut self, required_units: Vec<String>) -> Self {
        self.required_units = required_units;
        self
    }
}

/// Aggregated results of a stage invocation.
#[derive(Debug)]
pub struct StageRun<T> {
    /// Tri-state outcome
    pub outcome: StageOutcome,
    /// Results in input order
    pub results: Vec<UnitResult<T>>,
    /// Number of successful units
    pub succeeded: usize,
}

impl<T> StageRun<T> {
    /// Per-unit reports in input order.
    pub fn reports(&self) -> Vec<UnitReport> {
        self.results
            .iter()
            .map(|r| match &r.result {
                Ok(_) => UnitReport {
                    key: r.key.clone(),
                    status: UnitStatus::Succeeded,
                    class: None,
                    message: None,
                    attempts: r.attempts,
                },
                Err(e) => UnitReport {
                    key: r.key.clone(),
                    status: UnitStatus::Failed,
                    class: Some(e.class()),
                    message: Some(e.to_string()),
                    attempts: r.attempts,
                },
            })
            .collect()
    }

    /// The error that decided a fatal outcome: the first failed required
    /// unit, else the first failure.
    pub fn cause(&self, policy: &ExecutionPolicy) -> Option<&AdreelError> {
        let failed = || {
            self.results
                .iter()
                .filter_map(|r| r.result.as_ref().err().map(|e| (r.key.as_str(), e)))
        };
        failed()
            .find(|(key, _)| policy.required_units.iter().any(|u| u == key))
            .or_else(|| failed().next())
            .map(|(_, e)| e)
    }

    /// Successful outputs keyed by unit, in input order.
    pub fn successes(self) -> Vec<(String, T)> {
        self.results
            .into_iter()
            .filter_map(|r| r.result.ok().map(|value| (r.key, value)))
            .collect()
    }
}

/// Decide the stage outcome from unit results.
///
/// Fatal when nothing succeeded, a required unit failed, or the success
/// ratio falls below the policy minimum. A stage with no units succeeds.
pub fn classify_outcome<T>(results: &[UnitResult<T>], policy: &ExecutionPolicy) -> StageOutcome {
    if results.is_empty() {
        return StageOutcome::Success;
    }

    let succeeded = results.iter().filter(|r| r.result.is_ok()).count();
    let required_failed = results
        .iter()
        .any(|r| r.result.is_err() && policy.required_units.contains(&r.key));
    let ratio = succeeded as f64 / results.len() as f64;

    if succeeded == results.len() {
        StageOutcome::Success
    } else if succeeded == 0 || required_failed || ratio < policy.min_success_ratio {
        StageOutcome::Fatal
    } else {
        StageOutcome::Partial
    }
}

/// Runs a stage's units.
pub struct StageExecutor<'a> {
    store: &'a dyn ArtifactStore,
    run: &'a RunId,
    stage: StageId,
    policy: ExecutionPolicy,
}

impl<'a> StageExecutor<'a> {
    /// Create an executor for one stage of one run.
    pub fn new(
        store: &'a dyn ArtifactStore,
        run: &'a RunId,
        stage: StageId,
        policy: ExecutionPolicy,
    ) -> Self {
        Self {
            store,
            run,
            stage,
            policy,
        }
    }

    /// Policy in force.
    pub fn policy(&self) -> &ExecutionPolicy {
        &self.policy
    }

    /// Execute every unit and aggregate the results.
    ///
    /// Results come back in input order regardless of completion order.
    #[tracing::instrument(skip_all, fields(stage = %self.stage, units = units.len(), workers = self.policy.workers))]
    pub async fn execute<I, T, F, Fut>(&self, units: Vec<(String, I)>, work: F) -> StageRun<T>
    where
        I: Clone,
        F: Fn(I) -> Fut,
        Fut: Future<Output = UnitAttempt<T>>,
    {
        let work = &work;
        let mut results: Vec<(usize, UnitResult<T>)> = stream::iter(units.into_iter().enumerate())
            .map(|(index, (key, input))| async move {
                let result = self.run_unit(&key, input, work).await;
                (index, result)
            })
            .buffer_unordered(self.policy.workers.max(1))
            .collect()
            .await;

        results.sort_by_key(|(index, _)| *index);
        let results: Vec<UnitResult<T>> = results.into_iter().map(|(_, r)| r).collect();
        let outcome = classify_outcome(&results, &self.policy);
        let succeeded = results.iter().filter(|r| r.result.is_ok()).count();

        tracing::info!(
            outcome = %outcome,
            succeeded,
            total = results.len(),
            "Stage units finished"
        );

        StageRun {
            outcome,
            results,
            succeeded,
        }
    }

    async fn run_unit<I, T, F, Fut>(&self, key: &str, input: I, work: &F) -> UnitResult<T>
    where
        I: Clone,
        F: Fn(I) -> Fut,
        Fut: Future<Output = UnitAttempt<T>>,
    {
        let strategy = ExponentialBackoff::from_millis(self.policy.retry_backoff_ms.max(1))
            .factor(2)
            .max_delay(self.policy.max_retry_delay)
            .map(jitter)
            .take(self.policy.max_unit_retries);

        let mut attempts = 0u32;
        let result = Retry::spawn(strategy, || {
            attempts += 1;
            let attempt = attempts;
            let input = input.clone();
            async move {
                match self.attempt(key, input, work).await {
                    Ok(value) => Ok(value),
                    Err(e) if e.class().is_transient() => {
                        tracing::warn!(unit = key, attempt, error = %e, "Transient unit failure, will retry");
                        Err(RetryError::Transient {
                            err: e,
                            retry_after: None,
                        })
                    }
                    Err(e) => {
                        tracing::warn!(unit = key, attempt, class = %e.class(), error = %e, "Unit failed");
                        Err(RetryError::Permanent(e))
                    }
                }
            }
        })
        .await;

        UnitResult {
            key: key.to_string(),
            result,
            attempts,
        }
    }

    async fn attempt<I, T, F, Fut>(&self, key: &str, input: I, work: &F) -> AdreelResult<T>
    where
        F: Fn(I) -> Fut,
        Fut: Future<Output = UnitAttempt<T>>,
    {
        let attempt = match tokio::time::timeout(self.policy.unit_timeout, work(input)).await {
            Ok(attempt) => attempt,
            Err(_) => {
                return Err(PipelineError::new(PipelineErrorKind::UnitTimeout {
                    unit: key.to_string(),
                    seconds: self.policy.unit_timeout.as_secs(),
                })
                .into());
            }
        };

        if let Some(debug) = &attempt.debug {
            let debug_key = ArtifactKey::debug(self.run, self.stage, format!("{}.json", key));
            if let Err(e) = put_json(self.store, &debug_key, debug).await {
                tracing::warn!(unit = key, error = %e, "Failed to persist unit debug context");
            }
        }

        attempt.result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use adreel_error::{OutputError, OutputErrorKind, ServiceError, ServiceErrorKind};
    use adreel_storage::InMemoryArtifactStore;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy() -> ExecutionPolicy {
        ExecutionPolicyBuilder::default()
            .workers(3usize)
            .retry_backoff_ms(1u64)
            .max_retry_delay(Duration::from_millis(5))
            .build()
            .unwrap()
    }

    fn units(n: u32) -> Vec<(String, u32)> {
        (1..=n).map(|i| (format!("scene_{}", i), i)).collect()
    }

    #[tokio::test]
    async fn test_all_succeed_in_input_order() {
        let store = InMemoryArtifactStore::new();
        let run = RunId::new("r1");
        let executor = StageExecutor::new(&store, &run, StageId::GenerateFirstFrames, fast_policy());

        let stage_run = executor
            .execute(units(5), |i| async move {
                // Later units finish first
                tokio::time::sleep(Duration::from_millis(u64::from(10 - i))).await;
                UnitAttempt::bare(Ok(i * 10))
            })
            .await;

        assert_eq!(stage_run.outcome, StageOutcome::Success);
        assert_eq!(stage_run.succeeded, 5);
        let values: Vec<u32> = stage_run.successes().into_iter().map(|(_, v)| v).collect();
        assert_eq!(values, vec![10, 20, 30, 40, 50]);
    }

    #[tokio::test]
    async fn test_content_policy_isolated_to_unit() {
        let store = InMemoryArtifactStore::new();
        let run = RunId::new("r1");
        let executor = StageExecutor::new(&store, &run, StageId::GenerateVideoClips, fast_policy());

        let stage_run = executor
            .execute(units(5), |i| async move {
                if i == 3 {
                    UnitAttempt::bare(Err(ServiceError::new(ServiceErrorKind::ContentPolicy(
                        "flagged".into(),
                    ))
                    .into()))
                } else {
                    UnitAttempt::bare(Ok(i))
                }
            })
            .await;

        assert_eq!(stage_run.outcome, StageOutcome::Partial);
        let reports = stage_run.reports();
        assert_eq!(reports.len(), 5);
        assert_eq!(reports[2].status(), &UnitStatus::Failed);
        assert_eq!(reports[2].class(), &Some(ErrorClass::ContentPolicy));
        assert_eq!(reports[2].attempts(), &1);
        assert_eq!(stage_run.succeeded, 4);
    }

    #[tokio::test]
    async fn test_required_unit_failure_is_fatal() {
        let store = InMemoryArtifactStore::new();
        let run = RunId::new("r1");
        let policy = fast_policy().with_required_units(vec!["scene_1".to_string()]);
        let executor = StageExecutor::new(&store, &run, StageId::GenerateFirstFrames, policy);

        let stage_run = executor
            .execute(units(3), |i| async move {
                if i == 1 {
                    UnitAttempt::bare(Err(OutputError::new(OutputErrorKind::Empty("x".into())).into()))
                } else {
                    UnitAttempt::bare(Ok(i))
                }
            })
            .await;

        assert_eq!(stage_run.outcome, StageOutcome::Fatal);
        let cause = stage_run.cause(executor.policy()).unwrap();
        assert_eq!(cause.class(), ErrorClass::MalformedOutput);
    }

    #[tokio::test]
    async fn test_zero_successes_is_fatal() {
        let store = InMemoryArtifactStore::new();
        let run = RunId::new("r1");
        let executor = StageExecutor::new(&store, &run, StageId::JudgeConcepts, fast_policy());

        let stage_run: StageRun<u32> = executor
            .execute(units(2), |_| async move {
                UnitAttempt::bare(Err(OutputError::new(OutputErrorKind::Empty("x".into())).into()))
            })
            .await;
        assert_eq!(stage_run.outcome, StageOutcome::Fatal);
    }

    #[tokio::test]
    async fn test_transient_failures_retried() {
        let store = InMemoryArtifactStore::new();
        let run = RunId::new("r1");
        let executor = StageExecutor::new(&store, &run, StageId::GenerateVideoClips, fast_policy());
        let calls = Arc::new(AtomicU32::new(0));

        let stage_run = executor
            .execute(units(1), |i| {
                let calls = calls.clone();
                async move {
                    if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                        UnitAttempt::bare(Err(ServiceError::from_status(429, "slow down").into()))
                    } else {
                        UnitAttempt::bare(Ok(i))
                    }
                }
            })
            .await;

        assert_eq!(stage_run.outcome, StageOutcome::Success);
        assert_eq!(stage_run.reports()[0].attempts(), &3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_timeout_fails_unit_only() {
        let store = InMemoryArtifactStore::new();
        let run = RunId::new("r1");
        let policy = ExecutionPolicyBuilder::default()
            .unit_timeout(Duration::from_millis(20))
            .max_unit_retries(0usize)
            .build()
            .unwrap();
        let executor = StageExecutor::new(&store, &run, StageId::GenerateVideoClips, policy);

        let stage_run = executor
            .execute(units(2), |i| async move {
                if i == 2 {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                }
                UnitAttempt::bare(Ok(i))
            })
            .await;

        assert_eq!(stage_run.outcome, StageOutcome::Partial);
        assert_eq!(stage_run.reports()[1].class(), &Some(ErrorClass::Transient));
    }

    #[tokio::test]
    async fn test_debug_context_persisted() {
        let store = InMemoryArtifactStore::new();
        let run = RunId::new("r1");
        let executor = StageExecutor::new(&store, &run, StageId::GenerateFirstFrames, fast_policy());

        executor
            .execute(units(2), |i| async move {
                UnitAttempt::new(serde_json::json!({ "scene": i }), Ok(i))
            })
            .await;

        let key = ArtifactKey::debug(&run, StageId::GenerateFirstFrames, "scene_2.json");
        let debug: serde_json::Value =
            serde_json::from_slice(&store.get(&key).await.unwrap()).unwrap();
        assert_eq!(debug["scene"], 2);
    }

    #[test]
    fn test_min_success_ratio() {
        let policy = ExecutionPolicyBuilder::default()
            .min_success_ratio(0.8)
            .build()
            .unwrap();
        let results: Vec<UnitResult<()>> = (0..5)
            .map(|i| UnitResult {
                key: format!("scene_{}", i + 1),
                result: if i < 3 {
                    Ok(())
                } else {
                    Err(OutputError::new(OutputErrorKind::Empty("x".into())).into())
                },
                attempts: 1,
            })
            .collect();
        assert_eq!(classify_outcome(&results, &policy), StageOutcome::Fatal);
        assert_eq!(
            classify_outcome::<()>(&[], &policy),
            StageOutcome::Success
        );
    }
}
