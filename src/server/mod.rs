//! HTTP surface of the orchestrator.
//!
//! A single axum router behind the shared-secret gate. Streaming
//! endpoints answer with SSE (`data: <json>\n\n` frames and anti-
//! buffering headers); everything else is JSON.

pub mod apply;
pub mod files;
pub mod generate;
pub mod model;

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::{HeaderValue, StatusCode, header};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use futures::Stream;
use futures::StreamExt;
use serde_json::json;

use crate::config::Config;
use crate::gate::{INTERNAL_SECRET_HEADER, verify_secret};
use crate::model::light::LightModel;
use crate::proxy::ProxyCredentials;
use crate::sandbox::lifecycle::SandboxManager;
use crate::sandbox::runtime::SandboxRuntime;
use crate::stream::event::SseEvent;
use crate::vcs::GitStore;
use crate::volume::Volume;

/// Shared state behind every handler.
pub struct AppState {
    pub config: Arc<Config>,
    pub manager: Arc<SandboxManager>,
    pub git: GitStore,
    pub volume: Arc<dyn Volume>,
    pub light: LightModel,
    /// Client for the orchestrator's own model calls; egresses through
    /// the filtering proxy like everything else.
    pub http: reqwest::Client,
}

impl AppState {
    pub fn new(
        config: Arc<Config>,
        runtime: Arc<dyn SandboxRuntime>,
        volume: Arc<dyn Volume>,
    ) -> anyhow::Result<Arc<Self>> {
        let manager = Arc::new(SandboxManager::new(runtime, config.clone()));
        let proxy = ProxyCredentials::from_config(&config);
        let http = reqwest::Client::builder()
            .proxy(proxy.reqwest_proxy()?)
            .build()?;
        Ok(Arc::new(Self {
            light: LightModel::new(manager.clone(), config.clone()),
            manager,
            git: GitStore::new(),
            volume,
            http,
            config,
        }))
    }
}

/// Build the full router with the auth gate applied.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/generate_game", post(generate::generate_game))
        .route("/generate_gemini", post(generate::generate_gemini))
        .route("/apply_files", post(apply::apply_files))
        .route("/get_file", get(files::get_file))
        .route("/list_files", get(files::list_files))
        .route("/detect_intent", post(model::detect_intent))
        .route("/detect_skills", post(model::detect_skills))
        .route("/chat_haiku", post(model::chat_haiku))
        .route("/generate_publish_info", post(model::generate_publish_info))
        .route("/get_skill_content", post(model::get_skill_content))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            require_internal_secret,
        ))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}

/// Gate middleware: every route checks the shared secret first.
async fn require_internal_secret(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    let presented = request
        .headers()
        .get(INTERNAL_SECRET_HEADER)
        .and_then(|v| v.to_str().ok());
    match verify_secret(&state.config.internal_secret, presented) {
        Ok(()) => next.run(request).await,
        Err(_) => error_response(StatusCode::UNAUTHORIZED, "Unauthorized"),
    }
}

/// A JSON error body of the boundary shape `{"error": "..."}`.
pub fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

/// Wrap an event stream as an SSE response with anti-buffering headers.
pub fn sse_response<S>(events: S) -> Response
where
    S: Stream<Item = SseEvent> + Send + 'static,
{
    let body = Body::from_stream(
        events.map(|event| Ok::<_, std::convert::Infallible>(event.frame())),
    );
    let mut response = Response::new(body);
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/event-stream"),
    );
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
    // Tells nginx-style intermediaries not to buffer the stream.
    headers.insert("x-accel-buffering", HeaderValue::from_static("no"));
    response
}
