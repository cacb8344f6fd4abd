//! Concept text artifacts.

use crate::EvaluationRecord;
use serde::{Deserialize, Serialize};

/// One generated concept in a brand-brief batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConceptCandidate {
    /// Unit id of the candidate within the batch
    pub concept_id: String,
    /// Ad style the concept was generated for
    pub ad_style: String,
    /// Model that wrote the concept
    pub model: String,
    /// Concept text
    pub text: String,
}

/// The concept a run carries forward, with its evaluation when known.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConceptRecord {
    /// Identifier of the concept (candidate id, `expanded`, `revised`)
    pub concept_id: String,
    /// Concept text
    pub text: String,
    /// Ad style, when the concept came from a batch
    #[serde(default)]
    pub ad_style: Option<String>,
    /// Model that wrote the concept
    #[serde(default)]
    pub model: Option<String>,
    /// Evaluation of this exact text, if one was made
    #[serde(default)]
    pub evaluation: Option<EvaluationRecord>,
}

impl ConceptRecord {
    /// Create a record with no evaluation.
    pub fn new(concept_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            concept_id: concept_id.into(),
            text: text.into(),
            ad_style: None,
            model: None,
            evaluation: None,
        }
    }

    /// Attach an evaluation.
    pub fn with_evaluation(mut self, evaluation: EvaluationRecord) -> Self {
        self.evaluation = Some(evaluation);
        self
    }
}
