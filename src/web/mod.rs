// Web server: Axum-based analysis API plus the embedded browser client.
//
// The single-page client in web/ is embedded at compile time via include_dir!.
// /analyze/* routes take text, image, or audio and answer with a verdict;
// every failure path still answers with a JSON body.
//
// The three model handles are loaded once before serving and shared
// read-only by every request through AppState.

use std::sync::Arc;

use anyhow::Result;
use axum::body::Body;
use axum::extract::DefaultBodyLimit;
use axum::http::{header, HeaderValue, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use include_dir::{include_dir, Dir};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::extract::image::TextRecognizer;
use crate::extract::speech::SpeechRecognizer;
use crate::toxicity::traits::ToxicityClassifier;

pub mod error;
pub mod handlers;

// Embed the browser client at compile time.
static ASSETS: Dir<'static> = include_dir!("$CARGO_MANIFEST_DIR/web");

/// Default cap on request bodies: 16 MiB.
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 16 * 1024 * 1024;

/// Shared application state threaded through all Axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub classifier: Arc<dyn ToxicityClassifier>,
    pub ocr: Arc<dyn TextRecognizer>,
    pub speech: Arc<dyn SpeechRecognizer>,
    pub max_upload_bytes: usize,
}

/// Start the Axum web server and block until it exits.
pub async fn run_server(state: AppState, port: u16, bind: &str) -> Result<()> {
    let app = build_router(state);

    let addr = format!("{bind}:{port}");
    info!("Sentra listening on http://{addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

/// Build the full router. Public so tests can drive it with `oneshot`.
pub fn build_router(state: AppState) -> Router {
    let body_limit = state.max_upload_bytes;

    let analyze = Router::new()
        .route("/analyze/text", post(handlers::text::analyze_text))
        .route("/analyze/image", post(handlers::image::analyze_image))
        .route("/analyze/audio", post(handlers::audio::analyze_audio))
        .layer(DefaultBodyLimit::max(body_limit));

    Router::new()
        .merge(analyze)
        .route("/health", get(health))
        .route("/", get(serve_index))
        .fallback(serve_asset)
        .layer(
            CorsLayer::new()
                .allow_origin(tower_http::cors::Any)
                .allow_methods([
                    axum::http::Method::GET,
                    axum::http::Method::POST,
                    axum::http::Method::OPTIONS,
                ])
                .allow_headers([header::CONTENT_TYPE]),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Liveness check. Always returns 200 OK once models are loaded.
async fn health() -> impl IntoResponse {
    (
        StatusCode::OK,
        axum::Json(serde_json::json!({ "status": "ok" })),
    )
}

async fn serve_index() -> Response {
    match ASSETS.get_file("index.html") {
        Some(index) => asset_response(index.contents(), "index.html"),
        None => api_error(StatusCode::SERVICE_UNAVAILABLE, "Web client not bundled"),
    }
}

/// Serve any other embedded file, or a JSON 404.
async fn serve_asset(uri: Uri) -> Response {
    let path = uri.path().trim_start_matches('/');
    match ASSETS.get_file(path) {
        Some(file) => asset_response(file.contents(), path),
        None => api_error(StatusCode::NOT_FOUND, "Not found"),
    }
}

fn asset_response(contents: &'static [u8], path: &str) -> Response {
    let mime = mime_type(path);
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, HeaderValue::from_static(mime))
        .body(Body::from(contents))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

fn mime_type(path: &str) -> &'static str {
    let ext = path.rsplit('.').next().unwrap_or("");
    match ext {
        "html" => "text/html; charset=utf-8",
        "js" | "mjs" => "application/javascript",
        "css" => "text/css",
        "svg" => "image/svg+xml",
        "png" => "image/png",
        "ico" => "image/x-icon",
        "json" => "application/json",
        _ => "application/octet-stream",
    }
}

/// Typed JSON error response helper.
pub fn api_error(status: StatusCode, message: &str) -> Response {
    (status, axum::Json(serde_json::json!({ "error": message }))).into_response()
}
