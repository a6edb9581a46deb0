use crate::pipeline::{Pipeline, RunOutcome};
use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Multipart},
    http::{Method, StatusCode},
    response::{Html, IntoResponse, Json, Response},
    routing::{get, post},
    Extension, Router,
};
use hyper::Server;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::Mutex;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

const MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

#[derive(Clone)]
pub struct AppState {
    pipeline: Arc<Pipeline>,
    // Runs replace the whole staging table, so they must not interleave
    run_lock: Arc<Mutex<()>>,
}

impl AppState {
    pub fn new(pipeline: Arc<Pipeline>) -> Self {
        Self {
            pipeline,
            run_lock: Arc::new(Mutex::new(())),
        }
    }

    async fn run(&self, bytes: &[u8]) -> RunOutcome {
        let _guard = self.run_lock.lock().await;
        self.pipeline.run(bytes).await
    }
}

fn outcome_response(outcome: RunOutcome) -> Response {
    let status = if outcome.ok {
        StatusCode::OK
    } else {
        StatusCode::UNPROCESSABLE_ENTITY
    };
    (
        status,
        Json(serde_json::json!({
            "success": outcome.ok,
            "message": outcome.message,
            "report": outcome.report,
        })),
    )
        .into_response()
}

fn bad_request(message: String) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(serde_json::json!({ "success": false, "message": message })),
    )
        .into_response()
}

/// Health check endpoint
async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "admissions-etl",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

async fn metrics_endpoint() -> impl IntoResponse {
    crate::metrics::render().unwrap_or_default()
}

async fn upload_form() -> impl IntoResponse {
    Html(
        r#"<!DOCTYPE html>
<html lang="en">
  <head>
    <meta charset="utf-8" />
    <title>Healthcare Admissions ETL Uploader</title>
  </head>
  <body>
    <h1>Healthcare Admissions ETL Uploader</h1>
    <p>Upload a new batch of admissions data (CSV) to load into the data warehouse.</p>
    <form action="/upload" method="post" enctype="multipart/form-data">
      <input type="file" name="file" accept=".csv" required />
      <button type="submit">Submit and Run ETL</button>
    </form>
  </body>
</html>"#,
    )
}

/// Multipart upload from the HTML form; the CSV is the `file` field.
async fn upload_multipart(
    Extension(state): Extension<AppState>,
    mut multipart: Multipart,
) -> Response {
    loop {
        match multipart.next_field().await {
            Ok(Some(field)) => {
                if field.name() != Some("file") {
                    continue;
                }
                let filename = field.file_name().unwrap_or("upload.csv").to_string();
                return match field.bytes().await {
                    Ok(bytes) => {
                        info!("Received upload '{}' ({} bytes)", filename, bytes.len());
                        outcome_response(state.run(&bytes).await)
                    }
                    Err(e) => bad_request(format!("Failed to read upload: {e}")),
                };
            }
            Ok(None) => return bad_request("No 'file' field in upload".to_string()),
            Err(e) => {
                warn!("Malformed multipart upload: {}", e);
                return bad_request(format!("Malformed upload: {e}"));
            }
        }
    }
}

/// Raw CSV in the request body.
async fn upload_raw(Extension(state): Extension<AppState>, body: Bytes) -> Response {
    if body.is_empty() {
        return bad_request("Empty request body".to_string());
    }
    outcome_response(state.run(&body).await)
}

pub fn create_server(pipeline: Arc<Pipeline>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);

    Router::new()
        .route("/", get(upload_form))
        .route("/health", get(health))
        .route("/metrics", get(metrics_endpoint))
        .route("/upload", post(upload_multipart))
        .route("/upload/raw", post(upload_raw))
        .layer(Extension(AppState::new(pipeline)))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(ServiceBuilder::new().layer(cors))
}

pub async fn start_server(
    pipeline: Arc<Pipeline>,
    addr: SocketAddr,
) -> Result<(), Box<dyn std::error::Error>> {
    let app = create_server(pipeline);

    info!("Upload server running on http://{}", addr);
    println!("🏥 Upload form:  http://{addr}/");
    println!("💚 Health check: http://{addr}/health");

    Server::bind(&addr).serve(app.into_make_service()).await?;

    Ok(())
}
