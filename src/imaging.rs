//! Upload decoding and image re-encoding helpers

use crate::error::OcrError;
use image::{imageops::FilterType, DynamicImage, GenericImageView, ImageFormat};
use std::io::Cursor;

/// Decode uploaded bytes, guessing the format from the content
pub fn decode(data: &[u8]) -> Result<DynamicImage, OcrError> {
    image::load_from_memory(data)
        .map_err(|e| OcrError::ProcessingError(format!("Failed to load image: {}", e)))
}

/// Shrink the image so that neither side exceeds `max_dimension`.
/// Aspect ratio is kept and small images are never scaled up.
pub fn thumbnail(image: DynamicImage, max_dimension: u32) -> DynamicImage {
    let (width, height) = image.dimensions();
    if width <= max_dimension && height <= max_dimension {
        return image;
    }

    tracing::debug!(
        "Downsampling {}x{} image to fit {}px",
        width,
        height,
        max_dimension
    );
    image.resize(max_dimension, max_dimension, FilterType::Lanczos3)
}

/// Re-encode the image as PNG in memory
pub fn encode_png(image: &DynamicImage) -> Result<Vec<u8>, OcrError> {
    let mut buffer = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png)
        .map_err(|e| OcrError::ProcessingError(format!("Failed to encode PNG: {}", e)))?;
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Rgb, RgbImage};

    #[test]
    fn test_thumbnail_limits_large_image() {
        let img = RgbImage::new(3000, 1500);
        let result = thumbnail(DynamicImage::ImageRgb8(img), 1024);
        assert_eq!(result.width(), 1024);
        assert_eq!(result.height(), 512);
    }

    #[test]
    fn test_thumbnail_keeps_small_image() {
        let img = GrayImage::new(100, 40);
        let result = thumbnail(DynamicImage::ImageLuma8(img), 1024);
        assert_eq!(result.dimensions(), (100, 40));
    }

    #[test]
    fn test_png_encoding_decodes_back() {
        let mut img = RgbImage::new(8, 8);
        img.put_pixel(3, 3, Rgb([200, 10, 10]));
        let png = encode_png(&DynamicImage::ImageRgb8(img)).unwrap();

        assert_eq!(&png[..4], b"\x89PNG");
        let decoded = decode(&png).unwrap().to_rgb8();
        assert_eq!(decoded.get_pixel(3, 3), &Rgb([200, 10, 10]));
    }

    #[test]
    fn test_decode_rejects_garbage() {
        let err = decode(b"definitely not an image").unwrap_err();
        assert!(matches!(err, OcrError::ProcessingError(_)));
    }
}
