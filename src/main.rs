use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod backend;
mod backends;
mod config;
mod error;
mod imaging;
mod output;
mod secrets;
mod server;

#[derive(Parser, Debug)]
#[command(name = "vision-ocr-server")]
#[command(about = "Extract text from images with on-device, local and cloud vision backends")]
#[command(version)]
pub struct Args {
    /// Host address to bind to
    #[arg(long, env = "OCR_HOST", default_value = "127.0.0.1")]
    pub host: String,

    /// Port to listen on
    #[arg(long, env = "OCR_PORT", default_value = "8501")]
    pub port: u16,

    /// Maximum upload size in bytes (default: 20MB)
    #[arg(long, env = "OCR_MAX_FILE_SIZE", default_value = "20971520")]
    pub max_file_size: usize,

    /// Uploaded images are downsampled so neither side exceeds this many pixels
    #[arg(long, env = "OCR_MAX_IMAGE_DIMENSION", default_value = "1024")]
    pub max_image_dimension: u32,

    /// Base URL of the local Ollama service
    #[arg(long, env = "OLLAMA_HOST", default_value = "http://localhost:11434")]
    pub ollama_url: String,

    /// Vision model served by Ollama
    #[arg(long, env = "OLLAMA_VISION_MODEL", default_value = "llama3.2-vision:latest")]
    pub ollama_model: String,

    /// Base URL of the Groq OpenAI-compatible API
    #[arg(long, env = "GROQ_BASE_URL", default_value = "https://api.groq.com/openai/v1")]
    pub groq_base_url: String,

    /// Groq vision model name
    #[arg(long, env = "GROQ_VISION_MODEL", default_value = "llama-3.2-90b-vision-preview")]
    pub groq_model: String,

    /// Name of the secret holding the Groq API key (read at call time)
    #[arg(long, default_value = "GROQ_API_KEY")]
    pub groq_key_name: String,

    /// Timeout for a single vision-model request in seconds
    #[arg(long, env = "OCR_REQUEST_TIMEOUT_SECS", default_value = "120")]
    pub request_timeout_secs: u64,

    /// Directory for downloaded detector models (defaults to the user cache dir)
    #[arg(long, env = "OCR_MODEL_CACHE_DIR")]
    pub model_cache_dir: Option<String>,

    /// Path to tessdata directory (uses TESSDATA_PREFIX env var if not set)
    #[arg(long, env = "TESSDATA_PREFIX")]
    pub tessdata_path: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "RUST_LOG", default_value = "info")]
    pub log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| args.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = config::Config::from(args);

    tracing::info!(
        "Starting vision-ocr-server v{}",
        env!("CARGO_PKG_VERSION")
    );
    tracing::info!("Binding to {}:{}", config.host, config.port);

    server::run(config).await
}
