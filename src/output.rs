//! Output renderings of an extraction result
//!
//! The format only changes how the single result string is presented or
//! downloaded. It never influences extraction.

use crate::error::OcrError;
use serde::{Deserialize, Serialize};

/// Supported output formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    PlainText,
    Markdown,
    Json,
}

/// Structured form of a result, used by the JSON format
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionRecord {
    pub extracted_text: String,
    pub model_used: String,
}

/// A file ready to be handed to the user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Download {
    pub data: String,
    pub file_name: &'static str,
    pub mime_type: &'static str,
}

impl OutputFormat {
    pub const ALL: [OutputFormat; 3] = [Self::PlainText, Self::Markdown, Self::Json];

    /// Parse from a form field or query value
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "plain text" | "plain" | "text" | "txt" => Some(Self::PlainText),
            "markdown" | "md" => Some(Self::Markdown),
            "json" => Some(Self::Json),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PlainText => "plain text",
            Self::Markdown => "markdown",
            Self::Json => "json",
        }
    }

    fn file_name(&self) -> &'static str {
        match self {
            Self::PlainText => "extracted_text.txt",
            Self::Markdown => "extracted_text.md",
            Self::Json => "extracted_text.json",
        }
    }

    fn mime_type(&self) -> &'static str {
        match self {
            Self::PlainText => "text/plain",
            Self::Markdown => "text/markdown",
            Self::Json => "application/json",
        }
    }

    /// Rendering shown next to the result
    pub fn render(&self, text: &str, model_used: &str) -> Result<String, OcrError> {
        match self {
            Self::PlainText => Ok(text.to_string()),
            Self::Markdown => Ok(markdown_block(text)),
            Self::Json => serde_json::to_string(&record(text, model_used))
                .map_err(|e| OcrError::Internal(format!("Failed to serialize result: {}", e))),
        }
    }

    /// Downloadable file; JSON is pretty-printed with a four-space indent
    pub fn download(&self, text: &str, model_used: &str) -> Result<Download, OcrError> {
        let data = match self {
            Self::Json => to_pretty_json(&record(text, model_used))?,
            _ => self.render(text, model_used)?,
        };

        Ok(Download {
            data,
            file_name: self.file_name(),
            mime_type: self.mime_type(),
        })
    }
}

fn markdown_block(text: &str) -> String {
    format!("```markdown\n{}\n```", text)
}

fn record(text: &str, model_used: &str) -> ExtractionRecord {
    ExtractionRecord {
        extracted_text: text.to_string(),
        model_used: model_used.to_string(),
    }
}

fn to_pretty_json(record: &ExtractionRecord) -> Result<String, OcrError> {
    let mut buffer = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut buffer, formatter);
    record
        .serialize(&mut serializer)
        .map_err(|e| OcrError::Internal(format!("Failed to serialize result: {}", e)))?;
    String::from_utf8(buffer)
        .map_err(|e| OcrError::Internal(format!("Serialized result is not UTF-8: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "Invoice #42\nTotal: \"$10\"\n\tpaid ✓";

    #[test]
    fn test_parse_formats() {
        assert_eq!(OutputFormat::parse("plain text"), Some(OutputFormat::PlainText));
        assert_eq!(OutputFormat::parse("Markdown"), Some(OutputFormat::Markdown));
        assert_eq!(OutputFormat::parse("json"), Some(OutputFormat::Json));
        assert_eq!(OutputFormat::parse("yaml"), None);
    }

    #[test]
    fn test_plain_text_is_verbatim() {
        let rendered = OutputFormat::PlainText.render(SAMPLE, "ocrs").unwrap();
        assert_eq!(rendered, SAMPLE);
    }

    #[test]
    fn test_markdown_wraps_in_fenced_block() {
        let rendered = OutputFormat::Markdown.render("Hello", "ocrs").unwrap();
        assert_eq!(rendered, "```markdown\nHello\n```");
    }

    #[test]
    fn test_json_round_trip_recovers_text() {
        let plain = OutputFormat::PlainText.render(SAMPLE, "ocrs").unwrap();
        let json = OutputFormat::Json.render(&plain, "ocrs").unwrap();
        let parsed: ExtractionRecord = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed.extracted_text, SAMPLE);
        assert_eq!(parsed.model_used, "ocrs");
    }

    #[test]
    fn test_json_download_is_indented() {
        let download = OutputFormat::Json.download("Hi", "custom-vision").unwrap();

        assert_eq!(download.file_name, "extracted_text.json");
        assert_eq!(download.mime_type, "application/json");
        assert_eq!(
            download.data,
            "{\n    \"extracted_text\": \"Hi\",\n    \"model_used\": \"custom-vision\"\n}"
        );
    }

    #[test]
    fn test_downloads_mirror_renderings() {
        let txt = OutputFormat::PlainText.download("Hi", "ocrs").unwrap();
        assert_eq!(txt.data, "Hi");
        assert_eq!(txt.file_name, "extracted_text.txt");
        assert_eq!(txt.mime_type, "text/plain");

        let md = OutputFormat::Markdown.download("Hi", "ocrs").unwrap();
        assert_eq!(md.data, "```markdown\nHi\n```");
        assert_eq!(md.file_name, "extracted_text.md");
        assert_eq!(md.mime_type, "text/markdown");
    }
}
