use crate::backend::{BackendId, ExtractionInput, Outcome};
use crate::backends::{BackendInfo, Dispatcher};
use crate::config::Config;
use crate::error::OcrError;
use crate::imaging;
use crate::output::OutputFormat;
use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Multipart, State},
    http::header,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
    pub config: Arc<Config>,
}

/// Extraction response
#[derive(Serialize)]
pub struct ExtractResponse {
    /// Result as shown to the user
    pub result: String,
    pub outcome: Outcome,
    pub model_used: String,
    pub format: String,
    /// `result` rendered in the requested format
    pub rendered: String,
    pub processing_time_ms: u64,
}

/// Export request: a previously shown result to turn into a file
#[derive(Deserialize)]
pub struct ExportRequest {
    pub extracted_text: String,
    pub model_used: String,
    pub format: Option<String>,
}

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Server info response
#[derive(Serialize)]
pub struct InfoResponse {
    pub version: String,
    pub default_model: String,
    pub models: Vec<BackendInfo>,
    pub detector_loaded: bool,
    pub output_formats: Vec<String>,
    pub max_file_size_bytes: usize,
    pub max_image_dimension: u32,
}

/// Run the HTTP server
pub async fn run(config: Config) -> anyhow::Result<()> {
    let dispatcher = Dispatcher::new(&config);
    let addr = format!("{}:{}", config.host, config.port);

    let state = AppState {
        dispatcher: Arc::new(dispatcher),
        config: Arc::new(config),
    };

    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on http://{}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

pub fn router(state: AppState) -> Router {
    let max_file_size = state.config.max_file_size;

    Router::new()
        .route("/extract", post(handle_extract))
        .route("/export", post(handle_export))
        .route("/health", get(handle_health))
        .route("/info", get(handle_info))
        .layer(DefaultBodyLimit::max(max_file_size))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn parse_format(value: Option<&str>) -> Result<OutputFormat, OcrError> {
    match value {
        None => Ok(OutputFormat::default()),
        Some(s) => OutputFormat::parse(s)
            .ok_or_else(|| OcrError::InvalidRequest(format!("Unknown output format: {}", s))),
    }
}

/// Handle extraction requests
async fn handle_extract(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<ExtractResponse>, OcrError> {
    let start = Instant::now();

    let mut file_data: Option<Bytes> = None;
    let mut model: Option<String> = None;
    let mut format: Option<String> = None;

    // Parse multipart form
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| OcrError::InvalidRequest(format!("Failed to parse multipart: {}", e)))?
    {
        let name = field.name().unwrap_or_default().to_string();

        match name.as_str() {
            "file" => {
                file_data = Some(field.bytes().await.map_err(|e| {
                    OcrError::InvalidRequest(format!("Failed to read file data: {}", e))
                })?);
            }
            "model" => {
                model = Some(field.text().await.map_err(|e| {
                    OcrError::InvalidRequest(format!("Invalid model: {}", e))
                })?);
            }
            "format" => {
                format = Some(field.text().await.map_err(|e| {
                    OcrError::InvalidRequest(format!("Invalid format: {}", e))
                })?);
            }
            _ => {
                // Ignore unknown fields
            }
        }
    }

    let data = file_data.ok_or(OcrError::MissingFile)?;

    if data.len() > state.config.max_file_size {
        return Err(OcrError::ImageTooLarge {
            size: data.len(),
            max: state.config.max_file_size,
        });
    }

    let output_format = parse_format(format.as_deref())?;
    let model = model.unwrap_or_else(|| BackendId::OnDevice.as_str().to_string());

    // Adapters block, so the whole extraction runs off the async workers
    let dispatcher = Arc::clone(&state.dispatcher);
    let max_dimension = state.config.max_image_dimension;
    let selected = model.clone();
    let extraction = tokio::task::spawn_blocking(move || {
        let image = imaging::thumbnail(imaging::decode(&data)?, max_dimension);
        let input = ExtractionInput::new(&image, Some(&data[..]));
        Ok::<_, OcrError>(dispatcher.dispatch(&input, &selected))
    })
    .await
    .map_err(|e| OcrError::Internal(format!("Extraction task failed: {}", e)))??;

    let outcome = extraction.outcome();
    let result = extraction.into_display();
    let rendered = output_format.render(&result, &model)?;
    let processing_time_ms = start.elapsed().as_millis() as u64;

    tracing::info!(
        "Extraction with {} completed in {}ms, outcome: {:?}, text length: {}",
        model,
        processing_time_ms,
        outcome,
        result.len()
    );

    Ok(Json(ExtractResponse {
        result,
        outcome,
        model_used: model,
        format: output_format.as_str().to_string(),
        rendered,
        processing_time_ms,
    }))
}

/// Handle download requests
async fn handle_export(Json(request): Json<ExportRequest>) -> Result<Response, OcrError> {
    let output_format = parse_format(request.format.as_deref())?;
    let download = output_format.download(&request.extracted_text, &request.model_used)?;

    Ok((
        [
            (header::CONTENT_TYPE, download.mime_type.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", download.file_name),
            ),
        ],
        download.data,
    )
        .into_response())
}

/// Handle health check requests
async fn handle_health() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Handle info requests
async fn handle_info(State(state): State<AppState>) -> impl IntoResponse {
    Json(InfoResponse {
        version: env!("CARGO_PKG_VERSION").to_string(),
        default_model: BackendId::OnDevice.as_str().to_string(),
        models: state.dispatcher.info(),
        detector_loaded: state.dispatcher.detector_loaded(),
        output_formats: OutputFormat::ALL
            .iter()
            .map(|f| f.as_str().to_string())
            .collect(),
        max_file_size_bytes: state.config.max_file_size,
        max_image_dimension: state.config.max_image_dimension,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::on_device::tests::FixedDetector;
    use crate::backends::on_device::{LazyDetector, TextDetector};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use image::{DynamicImage, RgbImage};
    use serde_json::{json, Value};
    use std::path::PathBuf;
    use std::time::Duration;
    use tower::ServiceExt;

    const BOUNDARY: &str = "vision-ocr-test-boundary";

    fn test_config() -> Config {
        Config {
            host: "127.0.0.1".to_string(),
            port: 0,
            max_file_size: 1024 * 1024,
            max_image_dimension: 1024,
            ollama_url: "http://127.0.0.1:9".to_string(),
            ollama_model: "llama3.2-vision:latest".to_string(),
            groq_base_url: "http://127.0.0.1:9".to_string(),
            groq_model: "llama-3.2-90b-vision-preview".to_string(),
            groq_key_name: "GROQ_API_KEY".to_string(),
            request_timeout: Duration::from_secs(1),
            model_cache_dir: PathBuf::from("/nonexistent"),
            tessdata_path: None,
        }
    }

    fn app(lines: Vec<&'static str>) -> Router {
        let detector =
            LazyDetector::new(move || Ok(Arc::new(FixedDetector(lines.clone())) as Arc<dyn TextDetector>));
        router(AppState {
            dispatcher: Arc::new(Dispatcher::with_parts(detector, vec![])),
            config: Arc::new(test_config()),
        })
    }

    fn png() -> Vec<u8> {
        imaging::encode_png(&DynamicImage::ImageRgb8(RgbImage::new(20, 10))).unwrap()
    }

    fn multipart_body(file: Option<&[u8]>, fields: &[(&str, &str)]) -> Vec<u8> {
        let mut body = Vec::new();
        for (name, value) in fields {
            body.extend_from_slice(
                format!(
                    "--{}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
                    BOUNDARY, name, value
                )
                .as_bytes(),
            );
        }
        if let Some(file) = file {
            body.extend_from_slice(
                format!(
                    "--{}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"upload.png\"\r\nContent-Type: image/png\r\n\r\n",
                    BOUNDARY
                )
                .as_bytes(),
            );
            body.extend_from_slice(file);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
        body
    }

    async fn post_extract(app: Router, body: Vec<u8>) -> (StatusCode, Value) {
        let request = Request::builder()
            .method("POST")
            .uri("/extract")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", BOUNDARY),
            )
            .body(Body::from(body))
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_health() {
        let response = app(vec![])
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_extract_on_device_markdown() {
        let body = multipart_body(Some(&png()), &[("model", "ocrs"), ("format", "markdown")]);
        let (status, json) = post_extract(app(vec!["Hello", "World"]), body).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["result"], "Hello\nWorld");
        assert_eq!(json["outcome"], "text");
        assert_eq!(json["rendered"], "```markdown\nHello\nWorld\n```");
        assert_eq!(json["model_used"], "ocrs");
    }

    #[tokio::test]
    async fn test_extract_json_rendering_round_trips() {
        let body = multipart_body(Some(&png()), &[("model", "ocrs"), ("format", "json")]);
        let (_, json) = post_extract(app(vec!["Total: 42"]), body).await;

        let rendered: Value = serde_json::from_str(json["rendered"].as_str().unwrap()).unwrap();
        assert_eq!(rendered, json!({ "extracted_text": "Total: 42", "model_used": "ocrs" }));
    }

    #[tokio::test]
    async fn test_extract_custom_vision_notice() {
        let body = multipart_body(Some(&png()), &[("model", "custom-vision")]);
        let (status, json) = post_extract(app(vec![]), body).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["result"], "Custom Vision model is not yet implemented.");
        assert_eq!(json["outcome"], "notice");
    }

    #[tokio::test]
    async fn test_extract_no_text_sentinel() {
        let body = multipart_body(Some(&png()), &[]);
        let (_, json) = post_extract(app(vec![]), body).await;

        assert_eq!(json["result"], "No text detected with ocrs.");
        assert_eq!(json["outcome"], "empty");
    }

    #[tokio::test]
    async fn test_extract_missing_file() {
        let body = multipart_body(None, &[("model", "ocrs")]);
        let (status, json) = post_extract(app(vec![]), body).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["code"], "MISSING_FILE");
    }

    #[tokio::test]
    async fn test_extract_rejects_unknown_format() {
        let body = multipart_body(Some(&png()), &[("format", "yaml")]);
        let (status, json) = post_extract(app(vec![]), body).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["code"], "INVALID_REQUEST");
    }

    #[tokio::test]
    async fn test_extract_rejects_undecodable_image() {
        let body = multipart_body(Some(b"not an image"), &[]);
        let (status, json) = post_extract(app(vec![]), body).await;

        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(json["code"], "PROCESSING_ERROR");
    }

    #[tokio::test]
    async fn test_export_json_download() {
        let request = Request::builder()
            .method("POST")
            .uri("/export")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(
                json!({ "extracted_text": "Hi", "model_used": "ocrs", "format": "json" })
                    .to_string(),
            ))
            .unwrap();

        let response = app(vec![]).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "application/json");
        assert_eq!(
            response.headers()[header::CONTENT_DISPOSITION],
            "attachment; filename=\"extracted_text.json\""
        );

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(
            String::from_utf8(bytes.to_vec()).unwrap(),
            "{\n    \"extracted_text\": \"Hi\",\n    \"model_used\": \"ocrs\"\n}"
        );
    }
}
