use anyhow::Result;
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use deepguard_rust_node::config::Config;
use deepguard_rust_node::metrics;
use deepguard_rust_node::verdict::{Verdict, VerdictEngine};

/// Uploads above this size are rejected before reaching the engine
const MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    tracing::info!("Starting deepfake detection gateway...");

    metrics::init_metrics();

    let config = Config::load()?;

    let token_prefix: String = config.detector.api_token.chars().take(4).collect();
    if token_prefix.is_empty() {
        anyhow::bail!("HF_TOKEN is not set; refusing to start without a backend credential");
    }
    tracing::info!("Token loaded: {}********", token_prefix);
    tracing::info!(
        "Configured {} classifier endpoint(s)",
        config.detector.endpoints.len()
    );

    let engine = Arc::new(VerdictEngine::new(config.detector.clone())?);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/", get(home_handler))
        .route("/detect", post(detect_handler))
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(engine);

    let addr = format!("{}:{}", config.api_host, config.api_port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("HTTP server listening on {}", addr);

    axum::serve(listener, app)
        .await
        .map_err(|e| anyhow::anyhow!("Server error: {}", e))
}

/// Liveness endpoint
async fn home_handler() -> Json<serde_json::Value> {
    Json(json!({
        "status": "online",
        "message": "Deepfake detection gateway is running"
    }))
}

/// Health check endpoint
async fn health_handler() -> &'static str {
    "OK"
}

/// Prometheus metrics endpoint
async fn metrics_handler() -> String {
    metrics::export_metrics()
}

/// Classify one uploaded image. Always responds with a structured
/// Verdict, including on upload errors and total backend failure.
async fn detect_handler(
    State(engine): State<Arc<VerdictEngine>>,
    mut multipart: Multipart,
) -> (StatusCode, Json<Verdict>) {
    metrics::DETECT_REQUESTS.inc();
    let timer = metrics::Timer::new();

    let image = match read_upload(&mut multipart).await {
        Ok(bytes) => bytes,
        Err(reason) => {
            tracing::warn!("Rejected upload: {}", reason);
            return (
                StatusCode::BAD_REQUEST,
                Json(Verdict::failure("Invalid Upload", reason)),
            );
        }
    };

    tracing::info!("Classifying uploaded image ({} bytes)", image.len());

    let verdict = engine.classify(&image).await;

    metrics::DETECT_VERDICTS
        .with_label_values(&[verdict.label.as_str()])
        .inc();
    timer.observe_duration_seconds(&metrics::DETECT_LATENCY);

    (StatusCode::OK, Json(verdict))
}

/// Pull the first non-empty file field out of the multipart body
async fn read_upload(multipart: &mut Multipart) -> std::result::Result<Vec<u8>, String> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| format!("multipart decode failed: {}", e))?
    {
        let bytes = field
            .bytes()
            .await
            .map_err(|e| format!("upload read failed: {}", e))?;
        if !bytes.is_empty() {
            return Ok(bytes.to_vec());
        }
    }

    Err("no file field in upload".to_string())
}
