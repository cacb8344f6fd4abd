//! Structured-output extraction, repair and validation.
//!
//! Model responses arrive as free-form text. The validator keeps only the
//! content channel, strips markdown fences and surrounding prose, parses
//! strictly, and on failure applies one conservative repair pass before
//! giving up. Providers that enforce a schema skip the extraction and
//! repair steps entirely.

use adreel_core::LlmResponse;
use adreel_error::{AdreelResult, OutputError, OutputErrorKind};
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Required top-level fields of an expected record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaShape {
    name: &'static str,
    required: Vec<&'static str>,
}

impl SchemaShape {
    /// A shape with a name for error messages and required top-level fields.
    pub fn new(name: &'static str, required: &[&'static str]) -> Self {
        Self {
            name,
            required: required.to_vec(),
        }
    }

    /// Record name used in error messages.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Check that the value is an object carrying every required field.
    ///
    /// # Errors
    ///
    /// Returns a `SchemaConformance` error naming the missing fields.
    pub fn check(&self, value: &Value) -> Result<(), OutputError> {
        let Some(object) = value.as_object() else {
            return Err(OutputError::new(OutputErrorKind::SchemaConformance(format!(
                "{} must be a JSON object",
                self.name
            ))));
        };

        let missing: Vec<&str> = self
            .required
            .iter()
            .copied()
            .filter(|field| object.get(*field).is_none_or(Value::is_null))
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(OutputError::new(OutputErrorKind::SchemaConformance(format!(
                "{} is missing required fields: {}",
                self.name,
                missing.join(", ")
            ))))
        }
    }
}

/// A validation failure with the text needed to replay it.
#[derive(Debug, Clone)]
pub struct ValidationFailure {
    /// Classified error
    pub error: OutputError,
    /// Content text as received
    pub raw: String,
    /// Text after the repair pass, when repair ran
    pub repaired: Option<String>,
}

impl ValidationFailure {
    /// Debug context persisted next to the failing unit.
    pub fn debug_context(&self) -> Value {
        serde_json::json!({
            "error": self.error.kind.to_string(),
            "raw": self.raw,
            "repaired": self.repaired,
        })
    }
}

/// Converts model responses into validated JSON records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StructuredOutputValidator {
    enforced_schema: bool,
}

impl StructuredOutputValidator {
    /// Create a validator.
    ///
    /// Pass the collaborator's `supports_enforced_schema()` capability; when
    /// true the content is parsed directly without extraction or repair.
    pub fn new(enforced_schema: bool) -> Self {
        Self { enforced_schema }
    }

    /// Validate a response against a shape.
    ///
    /// # Errors
    ///
    /// Returns `Empty` when there is no content, `Malformed` when parsing
    /// fails after repair, and `SchemaConformance` when required fields are
    /// absent.
    #[tracing::instrument(skip(self, response, shape), fields(shape = shape.name(), enforced = self.enforced_schema))]
    pub fn validate(
        &self,
        response: &LlmResponse,
        shape: &SchemaShape,
    ) -> Result<Value, ValidationFailure> {
        let raw = response.content();
        let fail = |error: OutputError, repaired: Option<String>| ValidationFailure {
            error,
            raw: raw.clone(),
            repaired,
        };

        if raw.trim().is_empty() {
            return Err(fail(
                OutputError::new(OutputErrorKind::Empty(format!(
                    "{} response has no content",
                    shape.name()
                ))),
                None,
            ));
        }

        let value = if self.enforced_schema {
            serde_json::from_str::<Value>(raw.trim())
                .map_err(|e| fail(malformed(&e), None))?
        } else {
            let candidate = extract_candidate(&raw);
            match serde_json::from_str::<Value>(&candidate) {
                Ok(value) => value,
                Err(first) => {
                    let repaired = repair(&candidate);
                    tracing::debug!(error = %first, "Strict parse failed, retrying after repair");
                    serde_json::from_str::<Value>(&repaired).map_err(|e| {
                        let preview: String = raw.chars().take(200).collect();
                        tracing::error!(
                            error = %e,
                            json_preview = %preview,
                            "Failed to parse structured output after repair"
                        );
                        fail(malformed(&e), Some(repaired.clone()))
                    })?
                }
            }
        };

        shape.check(&value).map_err(|e| fail(e, None))?;
        Ok(value)
    }
}

fn malformed(e: &serde_json::Error) -> OutputError {
    OutputError::new(OutputErrorKind::Malformed {
        message: e.to_string(),
        line: e.line(),
        column: e.column(),
    })
}

/// Deserialize a validated record into its typed form.
///
/// # Errors
///
/// Type mismatches are reported as `SchemaConformance`, since the record
/// already parsed.
pub fn decode<T: DeserializeOwned>(value: Value, shape: &SchemaShape) -> AdreelResult<T> {
    serde_json::from_value(value).map_err(|e| {
        OutputError::new(OutputErrorKind::SchemaConformance(format!(
            "{}: {}",
            shape.name(),
            e
        )))
        .into()
    })
}

/// Strip code fences and surrounding prose, leaving the outermost object.
///
/// # Examples
///
/// ```
/// use adreel_pipeline::extract_candidate;
///
/// let text = "Sure! Here it is:\n```json\n{\"a\": {\"b\": 1}}\n```\nEnjoy.";
/// assert_eq!(extract_candidate(text), "{\"a\": {\"b\": 1}}");
/// ```
pub fn extract_candidate(text: &str) -> String {
    let body = extract_from_code_block(text, "json").unwrap_or_else(|| text.trim().to_string());
    extract_balanced(&body, '{', '}').unwrap_or(body)
}

/// Content of the first markdown code block, preferring one tagged with `language`.
fn extract_from_code_block(response: &str, language: &str) -> Option<String> {
    let pattern = format!("```{}", language);

    if let Some(start) = response.find(&pattern) {
        let content_start = start + pattern.len();
        if let Some(end) = response[content_start..].find("```") {
            return Some(response[content_start..content_start + end].trim().to_string());
        }
        // Unclosed fence, likely a truncated response
        return Some(response[content_start..].trim().to_string());
    }

    let start = response.find("```")?;
    let content_start = start + 3;
    // Skip an unknown language tag
    let skip_to = response[content_start..]
        .find('\n')
        .map(|n| content_start + n + 1)
        .unwrap_or(content_start);

    match response[skip_to..].find("```") {
        Some(end) => Some(response[skip_to..skip_to + end].trim().to_string()),
        None => Some(response[skip_to..].trim().to_string()),
    }
}

/// Content between the first `open` and its matching `close`, string aware.
fn extract_balanced(response: &str, open: char, close: char) -> Option<String> {
    let start = response.find(open)?;
    let mut depth = 0;
    let mut in_string = false;
    let mut escape_next = false;

    for (i, ch) in response[start..].char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }

        match ch {
            '\\' if in_string => escape_next = true,
            '"' => in_string = !in_string,
            c if c == open && !in_string => depth += 1,
            c if c == close && !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(response[start..start + i + c.len_utf8()].to_string());
                }
            }
            _ => {}
        }
    }

    // Unbalanced; let the parser report where it breaks
    Some(response[start..].to_string())
}

/// Conservative textual repair: drop `//` and `/* */` comments and trailing
/// commas before `}` or `]`. String contents are never touched.
///
/// Valid JSON comes back unchanged.
///
/// # Examples
///
/// ```
/// use adreel_pipeline::repair;
///
/// assert_eq!(repair("{\"a\": [1, 2,], // note\n}"), "{\"a\": [1, 2] \n}");
/// assert_eq!(repair("{\"url\": \"http://x\"}"), "{\"url\": \"http://x\"}");
/// ```
pub fn repair(text: &str) -> String {
    let without_comments = strip_comments(text);
    strip_trailing_commas(&without_comments)
}

fn strip_comments(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut in_string = false;
    let mut i = 0;

    while i < chars.len() {
        let ch = chars[i];
        if in_string {
            out.push(ch);
            if ch == '\\' {
                if let Some(next) = chars.get(i + 1) {
                    out.push(*next);
                    i += 1;
                }
            } else if ch == '"' {
                in_string = false;
            }
            i += 1;
            continue;
        }

        match (ch, chars.get(i + 1)) {
            ('"', _) => {
                in_string = true;
                out.push(ch);
                i += 1;
            }
            ('/', Some('/')) => {
                while i < chars.len() && chars[i] != '\n' {
                    i += 1;
                }
            }
            ('/', Some('*')) => {
                i += 2;
                while i < chars.len() && !(chars[i] == '*' && chars.get(i + 1) == Some(&'/')) {
                    i += 1;
                }
                i = (i + 2).min(chars.len());
            }
            _ => {
                out.push(ch);
                i += 1;
            }
        }
    }
    out
}

fn strip_trailing_commas(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut in_string = false;
    let mut escape_next = false;

    for (i, &ch) in chars.iter().enumerate() {
        if in_string {
            out.push(ch);
            if escape_next {
                escape_next = false;
            } else if ch == '\\' {
                escape_next = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }

        if ch == '"' {
            in_string = true;
        } else if ch == ',' {
            let next = chars[i + 1..].iter().find(|c| !c.is_whitespace());
            if matches!(next, Some('}') | Some(']')) {
                continue;
            }
        }
        out.push(ch);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use adreel_core::{Channel, Segment};

    fn shape() -> SchemaShape {
        SchemaShape::new("evaluation", &["score", "strengths"])
    }

    #[test]
    fn test_fenced_trailing_comma_repaired() {
        let response = LlmResponse::text(
            "Here is my evaluation:\n```json\n{\"score\": 82, \"strengths\": [\"hook\",],}\n```",
        );
        let value = StructuredOutputValidator::new(false)
            .validate(&response, &shape())
            .unwrap();
        assert_eq!(value["score"], 82);
        assert_eq!(value["strengths"][0], "hook");
    }

    #[test]
    fn test_reasoning_channel_ignored() {
        let response = LlmResponse {
            segments: vec![
                Segment {
                    channel: Channel::Reasoning,
                    text: "{\"score\": 1, \"strengths\": []} is a draft".into(),
                },
                Segment {
                    channel: Channel::Content,
                    text: "{\"score\": 90, \"strengths\": [\"pacing\"]}".into(),
                },
            ],
            finish_reason: None,
        };
        let value = StructuredOutputValidator::new(false)
            .validate(&response, &shape())
            .unwrap();
        assert_eq!(value["score"], 90);
    }

    #[test]
    fn test_malformed_reports_location_and_texts() {
        let response = LlmResponse::text("{\"score\": 82,\n \"strengths\": [\"a\" \"b\"]}");
        let failure = StructuredOutputValidator::new(false)
            .validate(&response, &shape())
            .unwrap_err();
        match failure.error.kind {
            OutputErrorKind::Malformed { line, column, .. } => {
                assert_eq!(line, 2);
                assert!(column > 0);
            }
            other => panic!("expected malformed, got {:?}", other),
        }
        assert!(failure.repaired.is_some());
        assert_eq!(failure.debug_context()["raw"], response.content());
    }

    #[test]
    fn test_conformance_distinct_from_parse() {
        let response = LlmResponse::text("{\"score\": 82}");
        let failure = StructuredOutputValidator::new(false)
            .validate(&response, &shape())
            .unwrap_err();
        assert!(matches!(
            failure.error.kind,
            OutputErrorKind::SchemaConformance(ref m) if m.contains("strengths")
        ));
    }

    #[test]
    fn test_empty_content() {
        let failure = StructuredOutputValidator::new(false)
            .validate(&LlmResponse::default(), &shape())
            .unwrap_err();
        assert!(matches!(failure.error.kind, OutputErrorKind::Empty(_)));
    }

    #[test]
    fn test_enforced_schema_skips_extraction() {
        let fenced = LlmResponse::text("```json\n{\"score\": 1, \"strengths\": []}\n```");
        assert!(
            StructuredOutputValidator::new(true)
                .validate(&fenced, &shape())
                .is_err()
        );

        let plain = LlmResponse::text("{\"score\": 1, \"strengths\": []}");
        assert!(
            StructuredOutputValidator::new(true)
                .validate(&plain, &shape())
                .is_ok()
        );
    }

    #[test]
    fn test_repair_is_idempotent_on_valid_json() {
        let samples = [
            r#"{"a": 1, "b": [1, 2, 3], "c": {"d": "x, }"}}"#,
            r#"{"url": "https://example.com/a//b", "note": "/* not a comment */"}"#,
            r#"{"quote": "she said \"hi,\" then left", "n": null}"#,
            "{\n  \"nested\": [{\"k\": [\"v\"]}]\n}",
        ];
        for sample in samples {
            let strict: Value = serde_json::from_str(sample).unwrap();
            let repaired: Value = serde_json::from_str(&repair(sample)).unwrap();
            assert_eq!(strict, repaired);
            assert_eq!(repair(&repair(sample)), repair(sample));
        }
    }

    #[test]
    fn test_block_comments_removed() {
        let text = "{/* lead */\"a\": 1 /* trail */}";
        let value: Value = serde_json::from_str(&repair(text)).unwrap();
        assert_eq!(value["a"], 1);
    }

    #[test]
    fn test_prose_around_object() {
        assert_eq!(
            extract_candidate("The record: {\"a\": \"}\"} as requested"),
            "{\"a\": \"}\"}"
        );
    }

    #[test]
    fn test_decode_type_mismatch_is_conformance() {
        #[derive(Debug, serde::Deserialize)]
        #[allow(dead_code)]
        struct Record {
            score: f64,
        }
        let err = decode::<Record>(serde_json::json!({"score": "high"}), &shape()).unwrap_err();
        assert_eq!(err.class(), adreel_error::ErrorClass::SchemaConformance);
    }
}
