//! Generation endpoints: the agent CLI path and the structured path.

use std::sync::Arc;
use std::time::Instant;

use async_stream::stream;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{Json, Response};
use futures::Stream;
use serde::Deserialize;
use serde_json::json;

use crate::agent::driver::run_generation;
use crate::agent::exit::classify_exit;
use crate::agent::shell::{export_preamble, quote};
use crate::error::ModelError;
use crate::files::apply::{FileAction, FileEntry, apply_manifest, classify_apply_error};
use crate::files::paths::sanitize_rel_path;
use crate::gate::validate_uuid;
use crate::model::structured::{MAX_IMAGES, fetch_plan, image_command};
use crate::sandbox::credentials::{AGENT_USER, credential_env};
use crate::stream::event::{ApiErrorKind, SseEvent};
use crate::stream::shaper::EventShaper;

use super::{AppState, error_response, sse_response};

#[derive(Debug, Deserialize)]
pub struct GenerateRequest {
    pub user_id: String,
    pub project_id: String,
    pub prompt: String,
    /// Conformance-test hook: short-circuits into the named error path.
    #[serde(default, rename = "_test_error")]
    pub test_error: Option<String>,
}

/// POST /generate_game: drive the agent CLI and stream its events.
pub async fn generate_game(
    State(state): State<Arc<AppState>>,
    Json(request): Json<GenerateRequest>,
) -> Response {
    if let Err(response) = validate_request(&request) {
        return response;
    }
    sse_response(cli_generation_stream(state, request))
}

/// POST /generate_gemini: structured plan generation with CLI fallback
/// steering.
pub async fn generate_gemini(
    State(state): State<Arc<AppState>>,
    Json(request): Json<GenerateRequest>,
) -> Response {
    if let Err(response) = validate_request(&request) {
        return response;
    }
    sse_response(structured_generation_stream(state, request))
}

fn validate_request(request: &GenerateRequest) -> Result<(), Response> {
    for (field, value) in [
        ("user_id", &request.user_id),
        ("project_id", &request.project_id),
    ] {
        if let Err(e) = validate_uuid(field, value) {
            return Err(error_response(StatusCode::BAD_REQUEST, &e.to_string()));
        }
    }
    if request.prompt.trim().is_empty() {
        return Err(error_response(StatusCode::BAD_REQUEST, "Missing prompt"));
    }
    Ok(())
}

fn cli_generation_stream(
    state: Arc<AppState>,
    request: GenerateRequest,
) -> impl Stream<Item = SseEvent> + Send + 'static {
    stream! {
        if let Some(kind) = request.test_error.as_deref() {
            yield SseEvent::api_error(test_error_kind(kind));
            return;
        }

        let started = Instant::now();

        let outcome = match state
            .manager
            .acquire(&request.user_id, &request.project_id)
            .await
        {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!("sandbox acquire failed: {e}");
                yield SseEvent::api_error(ApiErrorKind::Sandbox);
                return;
            }
        };
        yield SseEvent::status(outcome.status);

        let workspace = state
            .config
            .workspace_dir(&request.user_id, &request.project_id);
        let mut run = match run_generation(
            state.manager.runtime().as_ref(),
            &state.config,
            state.manager.proxy(),
            &outcome.name,
            &workspace,
            &request.prompt,
        )
        .await
        {
            Ok(run) => run,
            Err(e) => {
                tracing::error!("agent start failed: {e}");
                yield SseEvent::api_error(ApiErrorKind::Sandbox);
                return;
            }
        };

        // Past the output cap the shaper discards lines; keep draining
        // so the reader task can finish and report the real exit code.
        let mut shaper = EventShaper::new();
        while let Some(line) = run.lines.recv().await {
            for event in shaper.push_line(&line) {
                yield event;
            }
        }
        for event in shaper.finish() {
            yield event;
        }

        let exit_code = run.exit.await.unwrap_or(-1);

        let commit = match state
            .git
            .commit_all(&workspace, &commit_message(&request.prompt))
            .await
        {
            Ok(commit) => commit,
            Err(e) => {
                tracing::warn!("post-generation commit failed: {e}");
                None
            }
        };
        state.volume.commit().await;

        let mut debug = json!({
            "exit_code": exit_code,
            "elapsed_seconds": started.elapsed().as_secs_f64(),
            "events_forwarded": shaper.forwarded(),
            "sandbox_reused": outcome.reused,
        });
        if let Some(hash) = &commit {
            debug["commit"] = json!(hash);
        }
        yield SseEvent::debug(debug);

        // The sandbox stays up for idle-timeout so the next request for
        // this project is warm.
        match classify_exit(exit_code) {
            None => yield SseEvent::done(0),
            Some(failure) => yield SseEvent::cli_error(&failure),
        }
    }
}

fn structured_generation_stream(
    state: Arc<AppState>,
    request: GenerateRequest,
) -> impl Stream<Item = SseEvent> + Send + 'static {
    stream! {
        let started = Instant::now();

        let outcome = match state
            .manager
            .acquire(&request.user_id, &request.project_id)
            .await
        {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!("sandbox acquire failed: {e}");
                yield fallback_error(ApiErrorKind::Sandbox);
                return;
            }
        };
        yield SseEvent::status(outcome.status);

        yield SseEvent::status("Requesting generation plan");
        let plan = match fetch_plan(
            &state.http,
            &state.config.gemini_base_url,
            &request.prompt,
        )
        .await
        {
            Ok(plan) => plan,
            Err(e) => {
                tracing::error!("structured plan fetch failed: {e}");
                yield fallback_error(model_error_kind(&e));
                return;
            }
        };

        let workspace = state
            .config
            .workspace_dir(&request.user_id, &request.project_id);
        let entries: Vec<FileEntry> = plan
            .files
            .iter()
            .map(|f| FileEntry {
                path: f.path.clone(),
                action: FileAction::Create,
                content: Some(f.content.clone()),
            })
            .collect();
        if let Err(e) = apply_manifest(&workspace, &entries).await {
            tracing::error!("structured file write failed: {e}");
            let kind = classify_apply_error(&e);
            yield SseEvent::Structured(json!({
                "type": "error",
                "code": kind.code(),
                "userMessage": kind.user_message(),
                "recoverable": false,
                "fallback": "cli",
            }));
            return;
        }
        for file in &plan.files {
            yield SseEvent::log(&format!("Wrote {}", file.path));
        }

        for image in plan.images.iter().take(MAX_IMAGES) {
            let target = format!("assets/{}", image.name);
            if sanitize_rel_path(&workspace, &target).is_err() {
                tracing::warn!(name = %image.name, "skipping image with unsafe name");
                continue;
            }
            yield SseEvent::status(&format!("Generating image {}", image.name));
            if let Err(e) = generate_image(&state, &outcome.name, &workspace, &image.prompt, &target).await {
                tracing::error!("image generation failed: {e}");
                yield fallback_error(ApiErrorKind::Unknown);
                return;
            }
        }

        let message = plan
            .summary
            .clone()
            .unwrap_or_else(|| commit_message(&request.prompt));
        let commit = match state.git.commit_all(&workspace, &message).await {
            Ok(commit) => commit,
            Err(e) => {
                tracing::warn!("structured commit failed: {e}");
                None
            }
        };
        state.volume.commit().await;

        yield SseEvent::result(json!({
            "files": plan.files.iter().map(|f| &f.path).collect::<Vec<_>>(),
            "images": plan.images.iter().take(MAX_IMAGES).map(|i| &i.name).collect::<Vec<_>>(),
            "mode": plan.mode,
            "summary": plan.summary,
        }));

        let mut debug = json!({
            "exit_code": 0,
            "elapsed_seconds": started.elapsed().as_secs_f64(),
            "events_forwarded": plan.files.len(),
            "sandbox_reused": outcome.reused,
        });
        if let Some(hash) = &commit {
            debug["commit"] = json!(hash);
        }
        yield SseEvent::debug(debug);
        yield SseEvent::done(0);
    }
}

/// Run the image-generation subprocess inside the project sandbox.
async fn generate_image(
    state: &AppState,
    sandbox: &str,
    workspace: &std::path::Path,
    prompt: &str,
    output: &str,
) -> Result<(), ModelError> {
    let ws_q = quote(&workspace.to_string_lossy());
    let exports = export_preamble(&credential_env(&state.config, state.manager.proxy()));
    let inner = format!(
        "{exports}cd {ws_q} && mkdir -p assets && {}",
        image_command(&state.config.global_root, prompt, output)
    );
    let command = format!("timeout 120 su {AGENT_USER} -c {}", quote(&inner));
    let out = state
        .manager
        .runtime()
        .exec_collect(
            sandbox,
            &["bash".to_string(), "-lc".to_string(), command],
        )
        .await?;
    if !out.success() {
        return Err(ModelError::ImageFailed {
            name: output.to_string(),
            reason: out.output,
        });
    }
    Ok(())
}

/// Commit message derived from the prompt head.
fn commit_message(prompt: &str) -> String {
    let head: String = prompt
        .lines()
        .next()
        .unwrap_or_default()
        .chars()
        .take(72)
        .collect();
    format!("Generate: {head}")
}

fn fallback_error(kind: ApiErrorKind) -> SseEvent {
    SseEvent::api_error(kind).with("fallback", "cli".into())
}

/// Map a `_test_error` request value to an error kind.
fn test_error_kind(kind: &str) -> ApiErrorKind {
    match kind {
        "NETWORK_ERROR" => ApiErrorKind::Network,
        "AUTH_ERROR" => ApiErrorKind::Auth,
        "RATE_LIMIT" => ApiErrorKind::RateLimit,
        "API_TIMEOUT" => ApiErrorKind::ApiTimeout,
        "SANDBOX_ERROR" => ApiErrorKind::Sandbox,
        _ => ApiErrorKind::Unknown,
    }
}

/// Map a model failure onto the transport taxonomy.
fn model_error_kind(error: &ModelError) -> ApiErrorKind {
    match error {
        ModelError::Http(e) => {
            if e.is_timeout() {
                ApiErrorKind::ApiTimeout
            } else if let Some(status) = e.status() {
                match status.as_u16() {
                    401 | 403 => ApiErrorKind::Auth,
                    429 => ApiErrorKind::RateLimit,
                    _ => ApiErrorKind::Network,
                }
            } else {
                ApiErrorKind::Network
            }
        }
        ModelError::Sandbox(_) => ApiErrorKind::Sandbox,
        _ => ApiErrorKind::Unknown,
    }
}
