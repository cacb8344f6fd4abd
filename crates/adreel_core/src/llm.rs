//! Request and response types for LLM calls.

use derive_getters::Getters;
use serde::{Deserialize, Serialize};

/// Roles in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Role {
    /// System instructions
    System,
    /// User turn
    User,
    /// Model turn
    Assistant,
}

/// One role-tagged prompt message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Speaker
    pub role: Role,
    /// Prompt text
    pub content: String,
    /// Marks the end of a prefix the provider may cache across calls
    #[serde(default)]
    pub cache_prefix: bool,
}

impl Message {
    /// A system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
            cache_prefix: false,
        }
    }

    /// A user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            cache_prefix: false,
        }
    }

    /// Mark this message as the end of a cacheable prefix.
    pub fn cached(mut self) -> Self {
        self.cache_prefix = true;
        self
    }
}

/// A JSON schema the provider is asked to enforce.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaConstraint {
    /// Schema name sent to the provider
    pub name: String,
    /// JSON schema document
    pub schema: serde_json::Value,
}

/// A completion request.
///
/// # Examples
///
/// ```
/// use adreel_core::{LlmRequestBuilder, Message};
///
/// let request = LlmRequestBuilder::default()
///     .messages(vec![Message::user("Write a tagline")])
///     .model(Some("anthropic/claude-sonnet-4.5".to_string()))
///     .build()
///     .unwrap();
/// assert_eq!(request.messages().len(), 1);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Getters, derive_builder::Builder)]
#[builder(setter(into))]
pub struct LlmRequest {
    /// Conversation messages
    messages: Vec<Message>,
    /// Model override; the service default is used when absent
    #[builder(default)]
    model: Option<String>,
    /// Schema constraint for providers that enforce one
    #[builder(default)]
    schema: Option<SchemaConstraint>,
    /// Maximum tokens to generate
    #[builder(default)]
    max_tokens: Option<u32>,
    /// Sampling temperature
    #[builder(default)]
    temperature: Option<f32>,
}

/// Which channel a response segment belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    /// Part of the final answer
    Content,
    /// Internal reasoning. Never parsed as content.
    Reasoning,
}

/// One piece of a model response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    /// Channel of the segment
    pub channel: Channel,
    /// Segment text
    pub text: String,
}

/// A completion response.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LlmResponse {
    /// Segments in arrival order
    pub segments: Vec<Segment>,
    /// Provider finish reason
    #[serde(default)]
    pub finish_reason: Option<String>,
}

impl LlmResponse {
    /// A response made of a single content segment.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            segments: vec![Segment {
                channel: Channel::Content,
                text: text.into(),
            }],
            finish_reason: None,
        }
    }

    /// Concatenated content segments, reasoning dropped.
    ///
    /// # Examples
    ///
    /// ```
    /// use adreel_core::{Channel, LlmResponse, Segment};
    ///
    /// let response = LlmResponse {
    ///     segments: vec![
    ///         Segment { channel: Channel::Reasoning, text: "{draft}".into() },
    ///         Segment { channel: Channel::Content, text: "{\"a\": 1}".into() },
    ///     ],
    ///     finish_reason: None,
    /// };
    /// assert_eq!(response.content(), "{\"a\": 1}");
    /// ```
    pub fn content(&self) -> String {
        self.segments
            .iter()
            .filter(|s| s.channel == Channel::Content)
            .map(|s| s.text.as_str())
            .collect::<Vec<_>>()
            .join("")
    }
}
