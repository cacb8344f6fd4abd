//! Failure classification shared by the executor and the run report.

use serde::{Deserialize, Serialize};

/// Coarse failure class used to drive retry, isolation and halting decisions.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ErrorClass {
    /// Rate limit, network or timeout. The same unit may be retried.
    Transient,
    /// Model output could not be parsed even after repair.
    MalformedOutput,
    /// Model output parsed but is missing required structure.
    SchemaConformance,
    /// The external service refused the request on policy grounds.
    ContentPolicy,
    /// An upstream artifact required by a stage is absent.
    MissingDependency,
    /// Invalid configuration detected before any stage ran.
    Configuration,
    /// Artifact store failure.
    Storage,
    /// Anything else.
    Other,
}

impl ErrorClass {
    /// Returns true if a unit failing with this class may be retried.
    pub fn is_transient(&self) -> bool {
        matches!(self, ErrorClass::Transient)
    }
}
