use crate::Args;
use std::path::PathBuf;
use std::time::Duration;

/// Server configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub max_file_size: usize,
    pub max_image_dimension: u32,
    pub ollama_url: String,
    pub ollama_model: String,
    pub groq_base_url: String,
    pub groq_model: String,
    pub groq_key_name: String,
    pub request_timeout: Duration,
    pub model_cache_dir: PathBuf,
    #[cfg_attr(not(feature = "engine-tesseract"), allow(dead_code))]
    pub tessdata_path: Option<String>,
}

impl Config {
    /// Cache directory used when none is configured
    pub fn default_cache_dir() -> PathBuf {
        dirs::cache_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("vision-ocr-server")
    }
}

impl From<Args> for Config {
    fn from(args: Args) -> Self {
        Self {
            host: args.host,
            port: args.port,
            max_file_size: args.max_file_size,
            max_image_dimension: args.max_image_dimension.max(1),
            ollama_url: args.ollama_url.trim_end_matches('/').to_string(),
            ollama_model: args.ollama_model,
            groq_base_url: args.groq_base_url.trim_end_matches('/').to_string(),
            groq_model: args.groq_model,
            groq_key_name: args.groq_key_name,
            request_timeout: Duration::from_secs(args.request_timeout_secs),
            model_cache_dir: args
                .model_cache_dir
                .map(PathBuf::from)
                .unwrap_or_else(Self::default_cache_dir),
            tessdata_path: args.tessdata_path,
        }
    }
}
