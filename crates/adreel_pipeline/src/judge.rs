//! Concept scoring shared by the judge stage and the arbiter.

use crate::{BriefSection, SchemaShape, StructuredCaller, UnitAttempt, prompts};
use adreel_core::{EvaluationRecord, LlmRequestBuilder};
use adreel_error::{AdreelError, ConfigError, OutputError, OutputErrorKind};
use adreel_interface::LlmService;

/// Scores concepts out of 100 with a judge model.
pub struct ConceptJudge<'a> {
    caller: StructuredCaller<'a>,
    brief: &'a BriefSection,
    model: &'a str,
}

impl<'a> ConceptJudge<'a> {
    /// Judge using `model` on the given service.
    pub fn new(llm: &'a dyn LlmService, brief: &'a BriefSection, model: &'a str) -> Self {
        Self {
            caller: StructuredCaller::new(llm),
            brief,
            model,
        }
    }

    /// Required fields of a judge response.
    pub fn shape() -> SchemaShape {
        SchemaShape::new("evaluation", &["score", "strengths", "weaknesses"])
    }

    /// Score one concept.
    ///
    /// Scores outside `0..=100` are a schema conformance failure.
    #[tracing::instrument(skip(self, concept), fields(model = self.model))]
    pub async fn evaluate(&self, ad_style: Option<&str>, concept: &str) -> UnitAttempt<EvaluationRecord> {
        let request = match LlmRequestBuilder::default()
            .messages(prompts::judge_concept(self.brief, ad_style, concept))
            .model(Some(self.model.to_string()))
            .schema(Some(prompts::evaluation_schema()))
            .temperature(Some(0.2f32))
            .build()
        {
            Ok(request) => request,
            Err(e) => {
                return UnitAttempt::bare(Err(AdreelError::from(ConfigError::new(format!(
                    "Failed to build judge request: {}",
                    e
                )))));
            }
        };

        let mut attempt = self
            .caller
            .call::<EvaluationRecord>(request, &Self::shape())
            .await;

        let out_of_range = match &attempt.result {
            Ok(record) if !(0.0..=100.0).contains(&record.score) => Some(record.score),
            _ => None,
        };
        if let Some(score) = out_of_range {
            attempt.result = Err(OutputError::new(OutputErrorKind::SchemaConformance(format!(
                "score {} is outside 0..=100",
                score
            )))
            .into());
        }

        if let Ok(record) = &attempt.result {
            tracing::debug!(score = record.score, "Concept judged");
        }
        attempt
    }
}
