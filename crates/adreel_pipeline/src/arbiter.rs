//! Original-versus-revised arbitration.
//!
//! A revision replaces the original only when it scores strictly higher.
//! Ties and regressions keep the original, and the comparison is recorded
//! either way.

use crate::{ConceptJudge, UnitAttempt};
use adreel_core::{ConceptRecord, EvaluationRecord, Winner};
use serde::{Deserialize, Serialize};
use serde_json::json;

/// The arbiter's decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArbiterDecision {
    /// Concept downstream stages consume
    pub canonical: ConceptRecord,
    /// Which candidate won
    pub winner: Winner,
    /// Evaluation of the original
    pub original: EvaluationRecord,
    /// Evaluation of the revision
    pub revised: EvaluationRecord,
    /// Comparative record: the revision's evaluation with winner and delta
    pub comparison: EvaluationRecord,
}

/// Pick the winner of two evaluations.
///
/// # Examples
///
/// ```
/// use adreel_core::{EvaluationRecord, Winner};
/// use adreel_pipeline::decide;
///
/// let original = EvaluationRecord::new(82.0);
/// assert_eq!(decide(&original, &EvaluationRecord::new(82.0)), Winner::Original);
/// assert_eq!(decide(&original, &EvaluationRecord::new(83.0)), Winner::Revised);
/// ```
pub fn decide(original: &EvaluationRecord, revised: &EvaluationRecord) -> Winner {
    if revised.score > original.score {
        Winner::Revised
    } else {
        Winner::Original
    }
}

/// Build the decision from already-scored candidates.
pub fn arbitrate_scored(
    original: &ConceptRecord,
    original_eval: EvaluationRecord,
    revised: &ConceptRecord,
    revised_eval: EvaluationRecord,
) -> ArbiterDecision {
    let winner = decide(&original_eval, &revised_eval);
    let mut comparison = revised_eval.clone();
    comparison.winner = Some(winner);
    comparison.improvement_delta = Some(revised_eval.score - original_eval.score);

    let canonical = match winner {
        Winner::Revised => revised.clone().with_evaluation(revised_eval.clone()),
        Winner::Original => original.clone().with_evaluation(original_eval.clone()),
    };

    tracing::info!(
        winner = %winner,
        original_score = original_eval.score,
        revised_score = revised_eval.score,
        "Arbitrated revision"
    );

    ArbiterDecision {
        canonical,
        winner,
        original: original_eval,
        revised: revised_eval,
        comparison,
    }
}

/// Compares an original concept with its revision using a judge.
pub struct Arbiter<'a> {
    judge: &'a ConceptJudge<'a>,
}

impl<'a> Arbiter<'a> {
    /// Create an arbiter around a judge.
    pub fn new(judge: &'a ConceptJudge<'a>) -> Self {
        Self { judge }
    }

    /// Score the revision (and the original, if it has no evaluation) and decide.
    #[tracing::instrument(skip_all, fields(original = %original.concept_id, revised = %revised.concept_id))]
    pub async fn arbitrate(
        &self,
        original: &ConceptRecord,
        revised: &ConceptRecord,
    ) -> UnitAttempt<ArbiterDecision> {
        let mut debug = json!({});

        let original_eval = match &original.evaluation {
            Some(evaluation) => evaluation.clone(),
            None => {
                let attempt = self
                    .judge
                    .evaluate(original.ad_style.as_deref(), &original.text)
                    .await;
                debug["original"] = attempt.debug.unwrap_or_default();
                match attempt.result {
                    Ok(evaluation) => evaluation,
                    Err(e) => return UnitAttempt::new(debug, Err(e)),
                }
            }
        };

        let attempt = self
            .judge
            .evaluate(revised.ad_style.as_deref(), &revised.text)
            .await;
        debug["revised"] = attempt.debug.unwrap_or_default();
        let revised_eval = match attempt.result {
            Ok(evaluation) => evaluation,
            Err(e) => return UnitAttempt::new(debug, Err(e)),
        };

        let decision = arbitrate_scored(original, original_eval, revised, revised_eval);
        debug["winner"] = json!(decision.winner);
        UnitAttempt::new(debug, Ok(decision))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn concept(id: &str) -> ConceptRecord {
        ConceptRecord::new(id, format!("{} text", id))
    }

    #[test]
    fn test_tie_keeps_original() {
        let decision = arbitrate_scored(
            &concept("original"),
            EvaluationRecord::new(82.0),
            &concept("revised"),
            EvaluationRecord::new(82.0),
        );
        assert_eq!(decision.winner, Winner::Original);
        assert_eq!(decision.canonical.concept_id, "original");
        assert_eq!(decision.comparison.winner, Some(Winner::Original));
        assert_eq!(decision.comparison.improvement_delta, Some(0.0));
    }

    #[test]
    fn test_regression_keeps_original() {
        let decision = arbitrate_scored(
            &concept("original"),
            EvaluationRecord::new(80.0),
            &concept("revised"),
            EvaluationRecord::new(71.5),
        );
        assert_eq!(decision.winner, Winner::Original);
        assert_eq!(decision.comparison.improvement_delta, Some(-8.5));
    }

    #[test]
    fn test_strict_improvement_accepted() {
        let decision = arbitrate_scored(
            &concept("original"),
            EvaluationRecord::new(80.0),
            &concept("revised"),
            EvaluationRecord::new(88.0),
        );
        assert_eq!(decision.winner, Winner::Revised);
        assert_eq!(decision.canonical.concept_id, "revised");
        assert_eq!(decision.canonical.evaluation.unwrap().score, 88.0);
    }

    #[test]
    fn test_never_revised_when_not_better() {
        for original in 0..=20 {
            for revised in 0..=20 {
                let winner = decide(
                    &EvaluationRecord::new(f64::from(original) * 5.0),
                    &EvaluationRecord::new(f64::from(revised) * 5.0),
                );
                if revised <= original {
                    assert_eq!(winner, Winner::Original);
                } else {
                    assert_eq!(winner, Winner::Revised);
                }
            }
        }
    }
}
