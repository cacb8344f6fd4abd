//! LLM calls that must return a validated record.

use crate::{SchemaShape, StructuredOutputValidator, UnitAttempt, decode};
use adreel_core::{LlmRequest, LlmResponse};
use adreel_error::{AdreelError, OutputError, OutputErrorKind};
use adreel_interface::LlmService;
use serde::de::DeserializeOwned;
use serde_json::json;

/// Calls an LLM and validates the response, keeping the replay context.
pub struct StructuredCaller<'a> {
    llm: &'a dyn LlmService,
    validator: StructuredOutputValidator,
}

impl<'a> StructuredCaller<'a> {
    /// Wrap a service; the validator follows its schema capability.
    pub fn new(llm: &'a dyn LlmService) -> Self {
        Self {
            llm,
            validator: StructuredOutputValidator::new(llm.supports_enforced_schema()),
        }
    }

    /// Issue the request and decode a `T` from the validated response.
    ///
    /// The returned attempt always carries the request, and the raw and
    /// repaired text when validation fails.
    pub async fn call<T: DeserializeOwned>(
        &self,
        request: LlmRequest,
        shape: &SchemaShape,
    ) -> UnitAttempt<T> {
        let mut debug = json!({
            "provider": self.llm.provider_name(),
            "model": request.model().clone().unwrap_or_else(|| self.llm.model_name().to_string()),
            "request": request,
        });

        let response = match self.llm.complete(&request).await {
            Ok(response) => response,
            Err(e) => return UnitAttempt::new(debug, Err(e)),
        };

        match self.validator.validate(&response, shape) {
            Ok(value) => UnitAttempt::new(debug, decode(value, shape)),
            Err(failure) => {
                debug["validation"] = failure.debug_context();
                UnitAttempt::new(debug, Err(failure.error.into()))
            }
        }
    }

    /// Issue the request and return its content text.
    ///
    /// Empty content is reported as an output error.
    pub async fn call_text(&self, request: LlmRequest) -> UnitAttempt<String> {
        let debug = json!({
            "provider": self.llm.provider_name(),
            "model": request.model().clone().unwrap_or_else(|| self.llm.model_name().to_string()),
            "request": request,
        });

        let result = self
            .llm
            .complete(&request)
            .await
            .and_then(|response: LlmResponse| {
                let text = response.content();
                if text.trim().is_empty() {
                    Err(AdreelError::from(OutputError::new(OutputErrorKind::Empty(
                        "text response has no content".to_string(),
                    ))))
                } else {
                    Ok(text.trim().to_string())
                }
            });
        UnitAttempt::new(debug, result)
    }
}
