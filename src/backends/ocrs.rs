//! OCRS detector implementation
//!
//! Pure Rust OCR engine using the ocrs library. No system dependencies required.
//! Downloads neural network models automatically on first use.

use super::models;
use super::on_device::{DetectedText, Region, TextDetector};
use crate::error::OcrError;
use image::RgbImage;
use ocrs::{DecodeMethod, ImageSource, OcrEngine as OcrsOcrEngine, OcrEngineParams, TextItem};
use rten::Model;
use std::path::Path;

/// Default model URLs from the ocrs project
const DETECTION_MODEL_URL: &str =
    "https://ocrs-models.s3-accelerate.amazonaws.com/text-detection.rten";
const RECOGNITION_MODEL_URL: &str =
    "https://ocrs-models.s3-accelerate.amazonaws.com/text-recognition.rten";

/// Text detector wrapping the ocrs library
pub struct OcrsDetector {
    engine: OcrsOcrEngine,
}

impl OcrsDetector {
    /// Load the detection and recognition models, downloading them if needed
    pub fn new(cache_dir: &Path) -> Result<Self, OcrError> {
        let detection_model_path =
            models::ensure_downloaded(DETECTION_MODEL_URL, cache_dir, "text-detection.rten")?;
        let recognition_model_path =
            models::ensure_downloaded(RECOGNITION_MODEL_URL, cache_dir, "text-recognition.rten")?;

        let detection_model = Model::load_file(&detection_model_path).map_err(|e| {
            OcrError::InitializationError(format!("Failed to load detection model: {}", e))
        })?;
        let recognition_model = Model::load_file(&recognition_model_path).map_err(|e| {
            OcrError::InitializationError(format!("Failed to load recognition model: {}", e))
        })?;

        let engine = OcrsOcrEngine::new(OcrEngineParams {
            detection_model: Some(detection_model),
            recognition_model: Some(recognition_model),
            decode_method: DecodeMethod::Greedy,
            ..Default::default()
        })
        .map_err(|e| {
            OcrError::InitializationError(format!("Failed to create OCR engine: {}", e))
        })?;

        tracing::info!("ocrs detector initialized successfully");

        Ok(Self { engine })
    }
}

impl TextDetector for OcrsDetector {
    fn detect(&self, image: &RgbImage) -> Result<Vec<DetectedText>, OcrError> {
        // ImageSource::from_bytes expects packed RGB in HWC order
        let img_source = ImageSource::from_bytes(image.as_raw(), image.dimensions()).map_err(|e| {
            OcrError::ProcessingError(format!("Failed to create image source: {}", e))
        })?;

        let ocr_input = self
            .engine
            .prepare_input(img_source)
            .map_err(|e| OcrError::ProcessingError(format!("Failed to prepare input: {}", e)))?;

        let word_rects = self
            .engine
            .detect_words(&ocr_input)
            .map_err(|e| OcrError::ProcessingError(format!("Failed to detect words: {}", e)))?;

        // Lines come back sorted top-to-bottom, words left-to-right
        let line_rects = self.engine.find_text_lines(&ocr_input, &word_rects);

        let line_texts = self
            .engine
            .recognize_text(&ocr_input, &line_rects)
            .map_err(|e| OcrError::ProcessingError(format!("Failed to recognize text: {}", e)))?;

        // Lines the recognizer produced nothing for come back as None
        Ok(line_texts
            .iter()
            .filter_map(|line| line.as_ref())
            .map(|line| {
                let text = line
                    .words()
                    .map(|word| word.to_string())
                    .collect::<Vec<_>>()
                    .join(" ");

                let rect = line.bounding_rect();
                DetectedText {
                    region: Region {
                        left: rect.left(),
                        top: rect.top(),
                        width: rect.width(),
                        height: rect.height(),
                    },
                    text,
                    // ocrs reports no per-line score
                    confidence: None,
                }
            })
            .collect())
    }
}
