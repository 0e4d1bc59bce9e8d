//! Tesseract adapter
//!
//! Uses tesseract-static for static linking (no system dependencies).
//! Downloads tessdata (training data) automatically on first use when no
//! tessdata directory is configured.

use super::models;
use crate::backend::{BackendId, ExtractionInput, TextExtractor};
use crate::error::OcrError;
use std::path::PathBuf;
use tesseract_static::tesseract::Tesseract;

const LANGUAGE: &str = "eng";

pub struct TesseractExtractor {
    tessdata_path: Option<String>,
    cache_dir: PathBuf,
}

impl TesseractExtractor {
    pub fn new(tessdata_path: Option<String>, cache_dir: PathBuf) -> Self {
        Self {
            tessdata_path,
            cache_dir,
        }
    }

    /// Tessdata directory, downloading the language file if needed
    fn tessdata(&self) -> Result<String, OcrError> {
        if let Some(path) = &self.tessdata_path {
            return Ok(path.clone());
        }

        let dir = self.cache_dir.join("tessdata");
        let url = format!(
            "https://github.com/tesseract-ocr/tessdata_fast/raw/main/{}.traineddata",
            LANGUAGE
        );
        models::ensure_downloaded(&url, &dir, &format!("{}.traineddata", LANGUAGE))?;

        // Tesseract expects the directory, not the file
        dir.to_str()
            .map(|s| s.to_string())
            .ok_or_else(|| OcrError::InitializationError("Invalid tessdata path".to_string()))
    }
}

impl TextExtractor for TesseractExtractor {
    fn backend(&self) -> BackendId {
        BackendId::Tesseract
    }

    fn extract(&self, input: &ExtractionInput<'_>) -> Result<String, OcrError> {
        let tessdata = self.tessdata()?;
        let rgb_img = input.image.to_rgb8();
        let (width, height) = rgb_img.dimensions();

        // BMP is always supported by leptonica
        let mut bmp_data = Vec::new();
        rgb_img
            .write_to(&mut std::io::Cursor::new(&mut bmp_data), image::ImageFormat::Bmp)
            .map_err(|e| OcrError::ProcessingError(format!("Failed to convert to BMP: {}", e)))?;

        let tess = Tesseract::new(Some(&tessdata), Some(LANGUAGE))
            .map_err(|e| OcrError::InitializationError(format!("Failed to create Tesseract: {}", e)))?
            .set_image_from_mem(&bmp_data)
            .map_err(|e| {
                OcrError::ProcessingError(format!(
                    "Failed to set image ({}x{}, {} bytes): {}",
                    width,
                    height,
                    bmp_data.len(),
                    e
                ))
            })?;

        let mut tess = tess
            .recognize()
            .map_err(|e| OcrError::ProcessingError(format!("Failed to recognize text: {}", e)))?;

        let text = tess
            .get_text()
            .map_err(|e| OcrError::ProcessingError(format!("Failed to get text: {}", e)))?;

        Ok(text.trim().to_string())
    }
}
