//! Vision-language model served by a local Ollama instance

use crate::backend::{BackendId, ExtractionInput, TextExtractor};
use crate::error::OcrError;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Instruction sent with every image
pub const PROMPT: &str = "Analyze the text in the provided image. Extract all readable content \
and present it in a structured Markdown format that is clear, concise, and well-organized. \
Ensure proper formatting (e.g., headings, lists, or code blocks) as necessary to represent \
the content effectively.";

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    stream: bool,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
    images: Vec<String>,
}

#[derive(Deserialize)]
struct ChatResponse {
    message: Option<ResponseMessage>,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: String,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

/// Adapter for `POST /api/chat` on an Ollama server
pub struct OllamaVision {
    agent: ureq::Agent,
    base_url: String,
    model: String,
}

impl OllamaVision {
    pub fn new(base_url: &str, model: &str, timeout: Duration) -> Self {
        Self {
            agent: super::http_agent(timeout),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
        }
    }
}

impl TextExtractor for OllamaVision {
    fn backend(&self) -> BackendId {
        BackendId::LocalVision
    }

    fn extract(&self, input: &ExtractionInput<'_>) -> Result<String, OcrError> {
        // The service takes the upload as-is, not the decoded bitmap
        let raw = input.raw.ok_or_else(|| {
            OcrError::InvalidRequest("raw image bytes are required for this model".to_string())
        })?;

        let request = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: PROMPT,
                images: vec![STANDARD.encode(raw)],
            }],
            stream: false,
        };

        let url = format!("{}/api/chat", self.base_url);
        tracing::debug!("Sending {} byte image to {} ({})", raw.len(), url, self.model);

        let mut response = self.agent.post(&url).send_json(&request).map_err(|e| {
            OcrError::BackendUnavailable(format!("Failed to reach Ollama at {}: {}", self.base_url, e))
        })?;

        let status = response.status();
        let body = response.body_mut().read_to_string().map_err(|e| {
            OcrError::MalformedResponse(format!("Failed to read Ollama response: {}", e))
        })?;

        if !status.is_success() {
            let message = serde_json::from_str::<ErrorBody>(&body)
                .map(|b| b.error)
                .unwrap_or(body);
            return Err(OcrError::BackendUnavailable(format!(
                "Ollama returned {}: {}",
                status.as_u16(),
                message
            )));
        }

        let parsed: ChatResponse = serde_json::from_str(&body).map_err(|e| {
            OcrError::MalformedResponse(format!("Failed to parse Ollama response: {}", e))
        })?;

        parsed
            .message
            .map(|message| message.content)
            .ok_or_else(|| OcrError::MalformedResponse("response has no message".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, RgbImage};
    use serde_json::json;
    use wiremock::{
        matchers::{body_partial_json, method, path},
        Mock, MockServer, ResponseTemplate,
    };

    const UPLOAD: &[u8] = b"\x89PNG fake upload bytes";

    fn run(adapter: OllamaVision, raw: Option<&'static [u8]>) -> Result<String, OcrError> {
        let image = DynamicImage::ImageRgb8(RgbImage::new(4, 4));
        adapter.extract(&ExtractionInput::new(&image, raw))
    }

    async fn extract_blocking(
        server: &MockServer,
        raw: Option<&'static [u8]>,
    ) -> Result<String, OcrError> {
        let adapter = OllamaVision::new(&server.uri(), "llama3.2-vision:latest", Duration::from_secs(5));
        tokio::task::spawn_blocking(move || run(adapter, raw))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_returns_message_content_verbatim() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .and(body_partial_json(json!({
                "model": "llama3.2-vision:latest",
                "stream": false,
                "messages": [{
                    "role": "user",
                    "content": PROMPT,
                    "images": [STANDARD.encode(UPLOAD)]
                }]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "model": "llama3.2-vision:latest",
                "message": { "role": "assistant", "content": "# Receipt\n\n- Coffee 3.50" },
                "done": true
            })))
            .expect(1)
            .mount(&server)
            .await;

        let text = extract_blocking(&server, Some(UPLOAD)).await.unwrap();
        assert_eq!(text, "# Receipt\n\n- Coffee 3.50");
    }

    #[tokio::test]
    async fn test_model_not_found_surfaces_service_error() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "error": "model \"llama3.2-vision:latest\" not found, try pulling it first"
            })))
            .mount(&server)
            .await;

        let err = extract_blocking(&server, Some(UPLOAD)).await.unwrap_err();
        let message = err.to_string();
        assert!(message.contains("404"), "{}", message);
        assert!(message.contains("not found"), "{}", message);
    }

    #[tokio::test]
    async fn test_malformed_body_is_an_error() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let err = extract_blocking(&server, Some(UPLOAD)).await.unwrap_err();
        assert!(matches!(err, OcrError::MalformedResponse(_)));
    }

    #[test]
    fn test_missing_raw_bytes_is_rejected_without_request() {
        let adapter = OllamaVision::new("http://127.0.0.1:9", "llama3.2-vision:latest", Duration::from_secs(1));
        let err = run(adapter, None).unwrap_err();
        assert!(matches!(err, OcrError::InvalidRequest(_)));
    }

    #[test]
    fn test_connection_failure_is_an_error() {
        let adapter = OllamaVision::new("http://127.0.0.1:9", "llama3.2-vision:latest", Duration::from_secs(1));
        let err = run(adapter, Some(UPLOAD)).unwrap_err();
        assert!(matches!(err, OcrError::BackendUnavailable(_)));
    }
}
