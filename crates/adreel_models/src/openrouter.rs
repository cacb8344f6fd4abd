//! OpenRouter chat-completions client (OpenAI-compatible).

use crate::http::{env_credential, transport_error};
use adreel_core::{Channel, LlmRequest, LlmResponse, Message, Role, Segment};
use adreel_error::{AdreelResult, ServiceError, ServiceErrorKind};
use adreel_interface::LlmService;
use derive_getters::Getters;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, instrument};

const OPENROUTER_API_URL: &str = "https://openrouter.ai/api/v1/chat/completions";

/// Request body for chat completions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Getters, derive_builder::Builder)]
#[builder(setter(into))]
pub struct ChatRequest {
    /// Model identifier
    model: String,
    /// Conversation
    messages: Vec<ChatMessage>,
    /// Maximum tokens to generate
    #[builder(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    /// Sampling temperature
    #[builder(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    /// Structured-output constraint
    #[builder(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

/// One message in a chat request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// `system`, `user` or `assistant`
    pub role: String,
    /// Plain text, or parts when a cache breakpoint is attached
    pub content: ChatContent,
}

/// Message content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChatContent {
    /// Plain text
    Text(String),
    /// Typed parts
    Parts(Vec<ContentPart>),
}

/// A typed content part.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentPart {
    /// Always `text`
    #[serde(rename = "type")]
    pub kind: String,
    /// Part text
    pub text: String,
    /// Prompt-cache breakpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_control: Option<serde_json::Value>,
}

/// Structured-output request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseFormat {
    /// Always `json_schema`
    #[serde(rename = "type")]
    pub kind: String,
    /// Schema wrapper
    pub json_schema: serde_json::Value,
}

/// Response body for chat completions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Getters)]
pub struct ChatResponse {
    /// Completion choices
    #[serde(default)]
    choices: Vec<ChatChoice>,
    /// Error payload, sometimes returned with a 200 status
    #[serde(default)]
    error: Option<ApiError>,
}

/// One completion choice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatChoice {
    /// Assistant message
    pub message: ChoiceMessage,
    /// Why generation stopped
    #[serde(default)]
    pub finish_reason: Option<String>,
}

/// Assistant message in a choice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChoiceMessage {
    /// Final answer
    #[serde(default)]
    pub content: Option<String>,
    /// Reasoning channel, for models that expose one
    #[serde(default)]
    pub reasoning: Option<String>,
}

/// Error object embedded in a response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiError {
    /// Human-readable message
    #[serde(default)]
    pub message: String,
    /// HTTP-like status code
    #[serde(default)]
    pub code: Option<u16>,
}

/// OpenRouter client.
#[derive(Debug, Clone)]
pub struct OpenRouterClient {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
    enforced_schema: bool,
}

impl OpenRouterClient {
    /// Creates a new client.
    ///
    /// Reads the API key from the `OPENROUTER_API_KEY` environment variable.
    ///
    /// # Errors
    ///
    /// Returns error if the API key is not set.
    #[instrument(skip_all, fields(model = %model.as_ref()))]
    pub fn new(model: impl AsRef<str>) -> AdreelResult<Self> {
        let api_key = env_credential("OPENROUTER_API_KEY")?;
        Ok(Self::with_api_key(api_key, model.as_ref()))
    }

    /// Creates a new client with an explicit API key.
    pub fn with_api_key(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        debug!("Creating new OpenRouter client");
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(600))
                .build()
                .unwrap_or_default(),
            api_key: api_key.into(),
            model: model.into(),
            base_url: OPENROUTER_API_URL.to_string(),
            enforced_schema: false,
        }
    }

    /// Declare whether the configured models honour `response_format`.
    pub fn with_enforced_schema(mut self, enforced: bool) -> Self {
        self.enforced_schema = enforced;
        self
    }

    /// Point the client at a different OpenAI-compatible endpoint.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Converts a pipeline request into an API request.
    pub fn build_request(&self, request: &LlmRequest) -> AdreelResult<ChatRequest> {
        let model = request.model().clone().unwrap_or_else(|| self.model.clone());
        let messages = request.messages().iter().map(convert_message).collect::<Vec<_>>();

        let response_format = match request.schema() {
            Some(schema) if self.enforced_schema => Some(ResponseFormat {
                kind: "json_schema".to_string(),
                json_schema: serde_json::json!({
                    "name": schema.name,
                    "strict": true,
                    "schema": schema.schema,
                }),
            }),
            _ => None,
        };

        ChatRequestBuilder::default()
            .model(model)
            .messages(messages)
            .max_tokens(*request.max_tokens())
            .temperature(*request.temperature())
            .response_format(response_format)
            .build()
            .map_err(|e| {
                ServiceError::new(ServiceErrorKind::InvalidResponse(format!(
                    "Failed to build chat request: {}",
                    e
                )))
                .into()
            })
    }

    /// Converts an API response into a pipeline response.
    ///
    /// The reasoning channel is kept as a separate segment so it is never
    /// mistaken for content.
    pub fn convert_response(response: ChatResponse) -> AdreelResult<LlmResponse> {
        if let Some(api_error) = response.error {
            let status = api_error.code.unwrap_or(500);
            return Err(ServiceError::from_status(status, api_error.message).into());
        }

        let choice = response.choices.into_iter().next().ok_or_else(|| {
            ServiceError::new(ServiceErrorKind::InvalidResponse(
                "Response contained no choices".to_string(),
            ))
        })?;

        if choice.finish_reason.as_deref() == Some("content_filter") {
            return Err(ServiceError::new(ServiceErrorKind::ContentPolicy(
                "Completion stopped by content filter".to_string(),
            ))
            .into());
        }

        let mut segments = Vec::new();
        if let Some(reasoning) = choice.message.reasoning.filter(|r| !r.is_empty()) {
            segments.push(Segment {
                channel: Channel::Reasoning,
                text: reasoning,
            });
        }
        if let Some(content) = choice.message.content.filter(|c| !c.is_empty()) {
            segments.push(Segment {
                channel: Channel::Content,
                text: content,
            });
        }

        Ok(LlmResponse {
            segments,
            finish_reason: choice.finish_reason,
        })
    }
}

fn convert_message(message: &Message) -> ChatMessage {
    let role = match message.role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
    };
    let content = if message.cache_prefix {
        ChatContent::Parts(vec![ContentPart {
            kind: "text".to_string(),
            text: message.content.clone(),
            cache_control: Some(serde_json::json!({ "type": "ephemeral" })),
        }])
    } else {
        ChatContent::Text(message.content.clone())
    };
    ChatMessage {
        role: role.to_string(),
        content,
    }
}

#[async_trait::async_trait]
impl LlmService for OpenRouterClient {
    #[instrument(skip(self, request), fields(provider = "openrouter", model = %request.model().as_deref().unwrap_or(&self.model)))]
    async fn complete(&self, request: &LlmRequest) -> AdreelResult<LlmResponse> {
        let body = self.build_request(request)?;
        debug!(messages = body.messages().len(), "Sending chat completion");

        let response = self
            .client
            .post(&self.base_url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                error!(error = ?e, "Failed to send request to OpenRouter");
                transport_error("openrouter", e)
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!(status = %status, body = %body, "OpenRouter returned error");
            return Err(ServiceError::from_status(status.as_u16(), body).into());
        }

        let parsed: ChatResponse = response.json().await.map_err(|e| {
            error!(error = ?e, "Failed to parse OpenRouter response");
            ServiceError::new(ServiceErrorKind::InvalidResponse(format!(
                "Failed to parse response: {}",
                e
            )))
        })?;

        Self::convert_response(parsed)
    }

    fn supports_enforced_schema(&self) -> bool {
        self.enforced_schema
    }

    fn provider_name(&self) -> &'static str {
        "openrouter"
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use adreel_core::{LlmRequestBuilder, SchemaConstraint};

    fn request(schema: bool) -> LlmRequest {
        LlmRequestBuilder::default()
            .messages(vec![
                Message::system("You are a director.").cached(),
                Message::user("Plan five scenes."),
            ])
            .schema(schema.then(|| SchemaConstraint {
                name: "scenes".into(),
                schema: serde_json::json!({"type": "object"}),
            }))
            .build()
            .unwrap()
    }

    #[test]
    fn test_build_request_uses_default_model_and_cache_parts() {
        let client = OpenRouterClient::with_api_key("k", "openai/gpt-5.1");
        let body = client.build_request(&request(false)).unwrap();

        assert_eq!(body.model(), "openai/gpt-5.1");
        assert!(matches!(body.messages()[0].content, ChatContent::Parts(_)));
        assert!(matches!(body.messages()[1].content, ChatContent::Text(_)));
        assert!(body.response_format().is_none());
    }

    #[test]
    fn test_response_format_only_when_enforced() {
        let plain = OpenRouterClient::with_api_key("k", "m");
        assert!(plain.build_request(&request(true)).unwrap().response_format().is_none());

        let enforced = OpenRouterClient::with_api_key("k", "m").with_enforced_schema(true);
        let body = enforced.build_request(&request(true)).unwrap();
        let format = body.response_format().as_ref().unwrap();
        assert_eq!(format.kind, "json_schema");
        assert_eq!(format.json_schema["name"], "scenes");
    }

    #[test]
    fn test_reasoning_is_its_own_channel() {
        let raw = serde_json::json!({
            "choices": [{
                "message": {"content": "{\"score\": 90}", "reasoning": "{\"score\": 10}"},
                "finish_reason": "stop"
            }]
        });
        let response: ChatResponse = serde_json::from_value(raw).unwrap();
        let converted = OpenRouterClient::convert_response(response).unwrap();

        assert_eq!(converted.segments.len(), 2);
        assert_eq!(converted.content(), "{\"score\": 90}");
    }

    #[test]
    fn test_content_filter_is_policy_rejection() {
        let raw = serde_json::json!({
            "choices": [{"message": {"content": ""}, "finish_reason": "content_filter"}]
        });
        let response: ChatResponse = serde_json::from_value(raw).unwrap();
        let err = OpenRouterClient::convert_response(response).unwrap_err();
        assert_eq!(err.class(), adreel_error::ErrorClass::ContentPolicy);
    }

    #[test]
    fn test_embedded_error_maps_status() {
        let raw = serde_json::json!({"error": {"message": "slow down", "code": 429}});
        let response: ChatResponse = serde_json::from_value(raw).unwrap();
        let err = OpenRouterClient::convert_response(response).unwrap_err();
        assert!(err.class().is_transient());
    }
}
