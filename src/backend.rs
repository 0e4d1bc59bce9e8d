use crate::error::OcrError;
use image::DynamicImage;
use serde::Serialize;
use std::fmt;

/// Display string used when a backend ran but produced nothing
pub const NO_TEXT_EXTRACTED: &str = "No text extracted.";

/// Sentinel returned by the on-device detector for an image without text
pub const NO_TEXT_DETECTED: &str = "No text detected with ocrs.";

pub const CUSTOM_VISION_NOTICE: &str = "Custom Vision model is not yet implemented.";
pub const UNKNOWN_MODEL_NOTICE: &str = "Unknown model selected.";

/// Selectable text-extraction backends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendId {
    /// ocrs detector running in-process
    OnDevice,
    /// Vision-language model served by a local Ollama instance
    LocalVision,
    /// Hosted vision-language model behind the Groq API
    CloudVision,
    /// Placeholder on the menu, never implemented
    CustomVision,
    /// Tesseract, reachable by identifier but not offered on the menu
    Tesseract,
}

impl BackendId {
    /// Backends offered to the user, in menu order
    pub const MENU: [BackendId; 4] = [
        Self::OnDevice,
        Self::LocalVision,
        Self::CloudVision,
        Self::CustomVision,
    ];

    /// Parse a user-supplied identifier
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "ocrs" => Some(Self::OnDevice),
            "llama3.2-vision" | "llama3.2-vision:latest" | "llama3.2.vision:latest" => Some(Self::LocalVision),
            "groq-llama-3.2-90b-vision-preview" => Some(Self::CloudVision),
            "custom-vision" => Some(Self::CustomVision),
            "tesseract" => Some(Self::Tesseract),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OnDevice => "ocrs",
            Self::LocalVision => "llama3.2-vision",
            Self::CloudVision => "groq-llama-3.2-90b-vision-preview",
            Self::CustomVision => "custom-vision",
            Self::Tesseract => "tesseract",
        }
    }

    /// Human-readable name, also the prefix of failure messages
    pub fn label(&self) -> &'static str {
        match self {
            Self::OnDevice => "ocrs",
            Self::LocalVision => "Llama 3.2 Vision",
            Self::CloudVision => "Groq Llama model",
            Self::CustomVision => "Custom Vision",
            Self::Tesseract => "Tesseract OCR",
        }
    }

    /// What to show when the backend succeeded with blank output
    pub fn empty_notice(&self) -> &'static str {
        match self {
            Self::OnDevice => NO_TEXT_DETECTED,
            _ => NO_TEXT_EXTRACTED,
        }
    }
}

impl fmt::Display for BackendId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One image as handed to the backends: the decoded (and downsampled)
/// bitmap plus, when available, the bytes exactly as uploaded.
#[derive(Debug, Clone, Copy)]
pub struct ExtractionInput<'a> {
    pub image: &'a DynamicImage,
    pub raw: Option<&'a [u8]>,
}

impl<'a> ExtractionInput<'a> {
    pub fn new(image: &'a DynamicImage, raw: Option<&'a [u8]>) -> Self {
        Self { image, raw }
    }
}

/// Outcome of a single dispatch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extraction {
    /// Backend returned text
    Text(String),
    /// Backend ran and found nothing
    Empty { notice: &'static str },
    /// Selector has no working backend (stub or unknown identifier)
    Notice(&'static str),
    /// Backend failed; `backend` is its label
    Failure { backend: &'static str, reason: String },
}

/// Machine-readable tag of an [`Extraction`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Text,
    Empty,
    Notice,
    Error,
}

impl Extraction {
    pub fn failure(backend: BackendId, reason: impl Into<String>) -> Self {
        Self::Failure {
            backend: backend.label(),
            reason: reason.into(),
        }
    }

    pub fn outcome(&self) -> Outcome {
        match self {
            Self::Text(_) => Outcome::Text,
            Self::Empty { .. } => Outcome::Empty,
            Self::Notice(_) => Outcome::Notice,
            Self::Failure { .. } => Outcome::Error,
        }
    }

    /// Collapse into the string shown to the user
    pub fn into_display(self) -> String {
        match self {
            Self::Text(text) if text.is_empty() => NO_TEXT_EXTRACTED.to_string(),
            Self::Text(text) => text,
            other => other.to_string(),
        }
    }
}

impl fmt::Display for Extraction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(text) => f.write_str(text),
            Self::Empty { notice } => f.write_str(notice),
            Self::Notice(notice) => f.write_str(notice),
            Self::Failure { backend, reason } => write!(f, "Error with {}: {}", backend, reason),
        }
    }
}

/// A backend that turns one image into text
pub trait TextExtractor: Send + Sync {
    /// Which identifier this adapter serves
    fn backend(&self) -> BackendId;

    /// Extract text from the image. Blocking.
    fn extract(&self, input: &ExtractionInput<'_>) -> Result<String, OcrError>;
}
