//! On-device text detection
//!
//! The detector is expensive to build (model download and load), so it is
//! created on first use and then shared by every later request. It is never
//! torn down or invalidated.

use crate::error::OcrError;
use image::{DynamicImage, RgbImage};
use once_cell::sync::OnceCell;
use std::sync::Arc;

/// Axis-aligned bounding box of a detected line, in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub left: i32,
    pub top: i32,
    pub width: i32,
    pub height: i32,
}

/// One recognised line
#[derive(Debug, Clone, PartialEq)]
pub struct DetectedText {
    pub region: Region,
    pub text: String,
    /// `None` when the detector reports no score
    pub confidence: Option<f32>,
}

/// A detector that finds and recognises text lines in an RGB image.
///
/// Results come back in the detector's own reading order.
pub trait TextDetector: Send + Sync {
    fn detect(&self, image: &RgbImage) -> Result<Vec<DetectedText>, OcrError>;
}

type DetectorFactory = Box<dyn Fn() -> Result<Arc<dyn TextDetector>, OcrError> + Send + Sync>;

/// Detector handle constructed on first use.
///
/// Concurrent first calls build the detector once. A failed creation leaves
/// the handle empty and the next call tries again.
pub struct LazyDetector {
    factory: DetectorFactory,
    slot: OnceCell<Arc<dyn TextDetector>>,
}

impl LazyDetector {
    pub fn new<F>(factory: F) -> Self
    where
        F: Fn() -> Result<Arc<dyn TextDetector>, OcrError> + Send + Sync + 'static,
    {
        Self {
            factory: Box::new(factory),
            slot: OnceCell::new(),
        }
    }

    /// Return the detector, creating it if this is the first call
    pub fn get(&self) -> Result<Arc<dyn TextDetector>, OcrError> {
        self.slot
            .get_or_try_init(|| {
                tracing::info!("Initializing on-device text detector...");
                (self.factory)()
            })
            .map(Arc::clone)
    }

    /// Never blocks, even while another thread is building the detector
    pub fn is_initialized(&self) -> bool {
        self.slot.get().is_some()
    }
}

/// Run the detector and join the recognised lines, one per line of output.
///
/// An image without text yields an empty string.
pub fn read_text(detector: &dyn TextDetector, image: &DynamicImage) -> Result<String, OcrError> {
    // Detector input is packed 8-bit RGB, whatever the upload's color type
    let rgb = image.to_rgb8();
    let detections = detector.detect(&rgb)?;

    tracing::debug!(
        "Detected {} text lines in {}x{} image",
        detections.len(),
        rgb.width(),
        rgb.height()
    );
    for detection in &detections {
        let Region {
            left,
            top,
            width,
            height,
        } = detection.region;
        tracing::trace!(
            left,
            top,
            width,
            height,
            confidence = ?detection.confidence,
            "{}",
            detection.text
        );
    }

    Ok(detections
        .iter()
        .map(|detection| detection.text.as_str())
        .collect::<Vec<_>>()
        .join("\n"))
}

/// Factory for the detector compiled into this build
#[cfg(feature = "engine-ocrs")]
pub fn default_factory(
    cache_dir: std::path::PathBuf,
) -> impl Fn() -> Result<Arc<dyn TextDetector>, OcrError> + Send + Sync + 'static {
    move || {
        let detector = super::ocrs::OcrsDetector::new(&cache_dir)?;
        Ok(Arc::new(detector) as Arc<dyn TextDetector>)
    }
}

#[cfg(not(feature = "engine-ocrs"))]
pub fn default_factory(
    _cache_dir: std::path::PathBuf,
) -> impl Fn() -> Result<Arc<dyn TextDetector>, OcrError> + Send + Sync + 'static {
    || {
        Err(OcrError::InitializationError(
            "No on-device engine available. Build with --features engine-ocrs".to_string(),
        ))
    }
}
