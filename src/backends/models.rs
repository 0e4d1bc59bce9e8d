//! Download-once cache for on-device model files

use crate::error::OcrError;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Upper bound on a single downloaded model file
const MAX_MODEL_SIZE: u64 = 256 * 1024 * 1024;

/// Ensure `filename` exists in `cache_dir`, downloading it from `url` if not,
/// and return its path.
pub fn ensure_downloaded(url: &str, cache_dir: &Path, filename: &str) -> Result<PathBuf, OcrError> {
    std::fs::create_dir_all(cache_dir).map_err(|e| {
        OcrError::InitializationError(format!("Failed to create cache directory: {}", e))
    })?;

    let path = cache_dir.join(filename);

    if !path.exists() {
        tracing::info!("Downloading {} (this may take a moment)...", filename);
        download_file(url, &path)?;
        tracing::info!("Downloaded {} to {:?}", filename, path);
    } else {
        tracing::info!("Using cached {} from {:?}", filename, path);
    }

    Ok(path)
}

/// Download a file from URL to path using ureq.
///
/// The body is written to a sibling `.part` file and renamed into place.
fn download_file(url: &str, path: &Path) -> Result<(), OcrError> {
    let response = ureq::get(url)
        .call()
        .map_err(|e| OcrError::InitializationError(format!("Failed to download {}: {}", url, e)))?;

    let mut body = response.into_body();
    let buffer = body.with_config().limit(MAX_MODEL_SIZE).read_to_vec().map_err(|e| {
        OcrError::InitializationError(format!("Failed to read response body: {}", e))
    })?;

    let partial = path.with_extension("part");
    let mut file = File::create(&partial).map_err(|e| {
        OcrError::InitializationError(format!("Failed to create model file: {}", e))
    })?;
    file.write_all(&buffer)
        .map_err(|e| OcrError::InitializationError(format!("Failed to write model file: {}", e)))?;

    std::fs::rename(&partial, path)
        .map_err(|e| OcrError::InitializationError(format!("Failed to store model file: {}", e)))
}
