//! Hosted vision-language model behind Groq's OpenAI-compatible API

use crate::backend::{BackendId, ExtractionInput, TextExtractor};
use crate::error::OcrError;
use crate::imaging;
use crate::secrets::SecretStore;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

pub const SYSTEM_PROMPT: &str = "Extract text from the following image.";

const TEMPERATURE: f64 = 1.0;
const TOP_P: f64 = 1.0;
const MAX_TOKENS: u32 = 1024;

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: [Message<'a>; 2],
    temperature: f64,
    max_tokens: u32,
    top_p: f64,
    stream: bool,
    stop: Option<Vec<String>>,
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

/// Adapter for `POST {base_url}/chat/completions`
pub struct GroqVision {
    agent: ureq::Agent,
    base_url: String,
    model: String,
    secrets: Arc<dyn SecretStore>,
    key_name: String,
}

impl GroqVision {
    pub fn new(
        base_url: &str,
        model: &str,
        timeout: Duration,
        secrets: Arc<dyn SecretStore>,
        key_name: &str,
    ) -> Self {
        Self {
            agent: super::http_agent(timeout),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            secrets,
            key_name: key_name.to_string(),
        }
    }
}

impl TextExtractor for GroqVision {
    fn backend(&self) -> BackendId {
        BackendId::CloudVision
    }

    fn extract(&self, input: &ExtractionInput<'_>) -> Result<String, OcrError> {
        let api_key = self
            .secrets
            .get(&self.key_name)
            .ok_or_else(|| OcrError::MissingCredential(self.key_name.clone()))?;

        let png = imaging::encode_png(input.image)?;
        let data_uri = format!("data:image/png;base64,{}", STANDARD.encode(&png));

        let request = CompletionRequest {
            model: &self.model,
            messages: [
                Message {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                Message {
                    role: "user",
                    content: &data_uri,
                },
            ],
            temperature: TEMPERATURE,
            max_tokens: MAX_TOKENS,
            top_p: TOP_P,
            stream: false,
            stop: None,
        };

        let url = format!("{}/chat/completions", self.base_url);
        tracing::debug!("Sending {} byte PNG to {} ({})", png.len(), url, self.model);

        let mut response = self
            .agent
            .post(&url)
            .header("Authorization", format!("Bearer {}", api_key))
            .send_json(&request)
            .map_err(|e| {
                OcrError::BackendUnavailable(format!("Failed to reach {}: {}", self.base_url, e))
            })?;

        let status = response.status();
        let body = response.body_mut().read_to_string().map_err(|e| {
            OcrError::MalformedResponse(format!("Failed to read completion response: {}", e))
        })?;

        if !status.is_success() {
            let message = serde_json::from_str::<Value>(&body)
                .ok()
                .and_then(|v| v.pointer("/error/message").and_then(Value::as_str).map(String::from))
                .unwrap_or(body);
            return Err(OcrError::BackendUnavailable(format!(
                "API returned {}: {}",
                status.as_u16(),
                message
            )));
        }

        let parsed: Value = serde_json::from_str(&body).map_err(|e| {
            OcrError::MalformedResponse(format!("Failed to parse completion response: {}", e))
        })?;

        let content = parsed.pointer("/choices/0/message/content").ok_or_else(|| {
            OcrError::MalformedResponse("response has no choices[0].message.content".to_string())
        })?;

        extract_content(content)
    }
}

// ============================================================================
// Message content shapes
// ============================================================================

/// One way an API may represent `message.content`
trait ContentShape {
    fn name(&self) -> &'static str;

    /// Structural check on the content value
    fn matches(&self, content: &Value) -> bool;

    fn extract_text(&self, content: &Value) -> Option<String>;
}

/// `"content": "text"`
struct PlainContent;

impl ContentShape for PlainContent {
    fn name(&self) -> &'static str {
        "string"
    }

    fn matches(&self, content: &Value) -> bool {
        content.is_string()
    }

    fn extract_text(&self, content: &Value) -> Option<String> {
        content.as_str().map(String::from)
    }
}

/// `"content": [{"type": "text", "text": "..."}, ...]`
struct ContentParts;

impl ContentShape for ContentParts {
    fn name(&self) -> &'static str {
        "content parts"
    }

    fn matches(&self, content: &Value) -> bool {
        content.is_array()
    }

    fn extract_text(&self, content: &Value) -> Option<String> {
        let texts: Vec<&str> = content
            .as_array()?
            .iter()
            .filter(|part| {
                part.get("type")
                    .and_then(Value::as_str)
                    .map_or(true, |kind| kind == "text")
            })
            .filter_map(|part| part.get("text").and_then(Value::as_str))
            .collect();

        if texts.is_empty() {
            None
        } else {
            Some(texts.concat())
        }
    }
}

/// `"content": {"text": "..."}`
struct TextObject;

impl ContentShape for TextObject {
    fn name(&self) -> &'static str {
        "text object"
    }

    fn matches(&self, content: &Value) -> bool {
        content.get("text").is_some_and(Value::is_string)
    }

    fn extract_text(&self, content: &Value) -> Option<String> {
        content.get("text").and_then(Value::as_str).map(String::from)
    }
}

const SHAPES: &[&dyn ContentShape] = &[&PlainContent, &ContentParts, &TextObject];

fn extract_content(content: &Value) -> Result<String, OcrError> {
    let shape = SHAPES
        .iter()
        .find(|shape| shape.matches(content))
        .ok_or_else(|| {
            OcrError::MalformedResponse(format!("unsupported message content: {}", content))
        })?;

    shape.extract_text(content).ok_or_else(|| {
        OcrError::MalformedResponse(format!("no text in {} message content", shape.name()))
    })
}
