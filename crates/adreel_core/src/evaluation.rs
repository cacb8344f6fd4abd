//! Judge output and comparative decisions.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Which candidate a comparative evaluation chose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Winner {
    /// The original candidate stays canonical.
    Original,
    /// The revised candidate replaces the original.
    Revised,
}

/// A judge's verdict on one concept.
///
/// `winner` and `improvement_delta` are only set on comparative records
/// produced by the arbiter.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EvaluationRecord {
    /// Score between 0 and 100
    pub score: f64,
    /// Short justification of the score
    #[serde(default)]
    pub explanation: String,
    /// What works
    #[serde(default)]
    pub strengths: Vec<String>,
    /// What to fix
    #[serde(default)]
    pub weaknesses: Vec<String>,
    /// Comparative winner
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub winner: Option<Winner>,
    /// Revised score minus baseline score
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub improvement_delta: Option<f64>,
}

impl EvaluationRecord {
    /// Create a non-comparative record.
    pub fn new(score: f64) -> Self {
        Self {
            score,
            ..Self::default()
        }
    }
}

/// A concept and its evaluation, as stored in evaluation files.
///
/// The evaluation fields are flattened so that external evaluation files
/// carrying `score`, `strengths` and `weaknesses` at the item level load
/// directly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredConcept {
    /// Candidate id, when produced by this pipeline
    #[serde(default)]
    pub concept_id: Option<String>,
    /// Ad style of the concept
    #[serde(default)]
    pub ad_style: Option<String>,
    /// Model that wrote the concept
    #[serde(default)]
    pub model: Option<String>,
    /// Location of the concept text on disk
    #[serde(default)]
    pub file: Option<PathBuf>,
    /// Inline concept text
    #[serde(default)]
    pub concept: Option<String>,
    /// The verdict
    #[serde(flatten)]
    pub evaluation: EvaluationRecord,
}

/// Evaluations for one ad style.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EvaluationGroup {
    /// Ad style shared by the group
    #[serde(default)]
    pub ad_style: Option<String>,
    /// Scored concepts, best first
    #[serde(default)]
    pub evaluations: Vec<ScoredConcept>,
}
