//! Text-extraction backends and the dispatcher that selects between them
//!
//! The on-device detector, the local vision model and the cloud vision model
//! are always available. Tesseract is compiled in with `engine-tesseract`.

pub mod groq;
#[cfg(any(feature = "engine-ocrs", feature = "engine-tesseract"))]
mod models;
#[cfg(feature = "engine-ocrs")]
pub mod ocrs;
pub mod ollama;
pub mod on_device;
#[cfg(feature = "engine-tesseract")]
pub mod tesseract;

use crate::backend::{
    BackendId, Extraction, ExtractionInput, TextExtractor, CUSTOM_VISION_NOTICE,
    UNKNOWN_MODEL_NOTICE,
};
use crate::config::Config;
use crate::error::OcrError;
use crate::secrets::EnvSecretStore;
use on_device::LazyDetector;
use serde::Serialize;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Information about a selectable backend
#[derive(Debug, Clone, Serialize)]
pub struct BackendInfo {
    pub id: &'static str,
    pub label: &'static str,
    pub implemented: bool,
}

/// Routes an image to exactly one backend and normalises the outcome.
///
/// Owns the lazily built on-device detector; the adapters for remote
/// backends are stateless between calls.
pub struct Dispatcher {
    detector: LazyDetector,
    adapters: Vec<Arc<dyn TextExtractor>>,
}

impl Dispatcher {
    /// Build the dispatcher with every backend available in this build.
    /// Nothing is loaded or contacted until the first extraction.
    pub fn new(config: &Config) -> Self {
        let secrets = Arc::new(EnvSecretStore);

        #[allow(unused_mut)]
        let mut adapters: Vec<Arc<dyn TextExtractor>> = vec![
            Arc::new(ollama::OllamaVision::new(
                &config.ollama_url,
                &config.ollama_model,
                config.request_timeout,
            )),
            Arc::new(groq::GroqVision::new(
                &config.groq_base_url,
                &config.groq_model,
                config.request_timeout,
                secrets,
                &config.groq_key_name,
            )),
        ];

        #[cfg(feature = "engine-tesseract")]
        {
            tracing::info!("Registering tesseract backend");
            adapters.push(Arc::new(tesseract::TesseractExtractor::new(
                config.tessdata_path.clone(),
                config.model_cache_dir.clone(),
            )));
        }

        let detector = LazyDetector::new(on_device::default_factory(config.model_cache_dir.clone()));

        Self::with_parts(detector, adapters)
    }

    pub fn with_parts(detector: LazyDetector, adapters: Vec<Arc<dyn TextExtractor>>) -> Self {
        Self { detector, adapters }
    }

    /// Dispatch by user-supplied identifier. Never fails: unknown
    /// identifiers and backend errors come back as displayable outcomes.
    pub fn dispatch(&self, input: &ExtractionInput<'_>, model: &str) -> Extraction {
        match BackendId::parse(model) {
            Some(backend) => self.dispatch_backend(input, backend),
            None => {
                tracing::warn!("Unknown model selected: {:?}", model);
                Extraction::Notice(UNKNOWN_MODEL_NOTICE)
            }
        }
    }

    pub fn dispatch_backend(&self, input: &ExtractionInput<'_>, backend: BackendId) -> Extraction {
        if backend == BackendId::CustomVision {
            return Extraction::Notice(CUSTOM_VISION_NOTICE);
        }

        let start = Instant::now();
        let result = catch_unwind(AssertUnwindSafe(|| self.run(input, backend)))
            .unwrap_or_else(|panic| Err(OcrError::Internal(panic_message(panic.as_ref()))));
        let elapsed_ms = start.elapsed().as_millis() as u64;

        match result {
            Ok(text) if text.is_empty() => {
                tracing::info!("{} finished in {}ms with no text", backend, elapsed_ms);
                Extraction::Empty {
                    notice: backend.empty_notice(),
                }
            }
            Ok(text) => {
                tracing::info!(
                    "{} finished in {}ms, text length: {}",
                    backend,
                    elapsed_ms,
                    text.len()
                );
                Extraction::Text(text)
            }
            Err(e) => {
                tracing::error!("{} failed after {}ms: {}", backend, elapsed_ms, e);
                Extraction::failure(backend, e.to_string())
            }
        }
    }

    fn run(&self, input: &ExtractionInput<'_>, backend: BackendId) -> Result<String, OcrError> {
        if backend == BackendId::OnDevice {
            let detector = self.detector.get()?;
            return on_device::read_text(detector.as_ref(), input.image);
        }

        let adapter = self.adapter(backend).ok_or_else(|| {
            OcrError::BackendUnavailable(format!(
                "{} is not compiled into this server",
                backend.label()
            ))
        })?;
        adapter.extract(input)
    }

    fn adapter(&self, backend: BackendId) -> Option<&Arc<dyn TextExtractor>> {
        self.adapters.iter().find(|a| a.backend() == backend)
    }

    /// Whether the on-device detector has been built yet
    pub fn detector_loaded(&self) -> bool {
        self.detector.is_initialized()
    }

    /// Menu backends and whether each can actually run
    pub fn info(&self) -> Vec<BackendInfo> {
        BackendId::MENU
            .iter()
            .map(|&backend| BackendInfo {
                id: backend.as_str(),
                label: backend.label(),
                implemented: backend == BackendId::OnDevice || self.adapter(backend).is_some(),
            })
            .collect()
    }
}

/// Blocking HTTP agent shared by the vision-model adapters.
///
/// Non-2xx responses are returned as responses so their error bodies can be
/// reported.
fn http_agent(timeout: Duration) -> ureq::Agent {
    let config = ureq::Agent::config_builder()
        .timeout_global(Some(timeout))
        .http_status_as_error(false)
        .build();
    ureq::Agent::new_with_config(config)
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        format!("backend panicked: {}", message)
    } else if let Some(message) = panic.downcast_ref::<String>() {
        format!("backend panicked: {}", message)
    } else {
        "backend panicked".to_string()
    }
}
