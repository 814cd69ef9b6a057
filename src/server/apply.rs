//! `/apply_files`: direct manifest apply plus version-store operations,
//! multiplexed on `action`.

use std::sync::Arc;

use async_stream::stream;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::Deserialize;
use serde_json::json;

use crate::error::VcsError;
use crate::files::apply::{FileEntry, apply_manifest, classify_apply_error};
use crate::gate::validate_uuid;
use crate::stream::event::SseEvent;

use super::{AppState, error_response, sse_response};

#[derive(Debug, Deserialize)]
pub struct ApplyRequest {
    pub user_id: String,
    pub project_id: String,
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub files: Option<Vec<FileEntry>>,
    #[serde(default)]
    pub commit_message: Option<String>,
    #[serde(default)]
    pub commit: Option<String>,
}

/// POST /apply_files.
pub async fn apply_files(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ApplyRequest>,
) -> Response {
    for (field, value) in [
        ("user_id", &request.user_id),
        ("project_id", &request.project_id),
    ] {
        if let Err(e) = validate_uuid(field, value) {
            return error_response(StatusCode::BAD_REQUEST, &e.to_string());
        }
    }

    match request.action.as_deref() {
        None => manifest_apply(state, request),
        Some("git_log") => git_log(state, request).await,
        Some("git_diff") => git_diff(state, request).await,
        Some("git_restore") => git_restore(state, request).await,
        Some(other) => {
            error_response(StatusCode::BAD_REQUEST, &format!("Unknown action: {other}"))
        }
    }
}

/// The manifest path streams §4.5-framed progress.
fn manifest_apply(state: Arc<AppState>, request: ApplyRequest) -> Response {
    let Some(entries) = request.files.clone() else {
        return error_response(StatusCode::BAD_REQUEST, "Missing files");
    };

    let events = stream! {
        yield SseEvent::status("Applying files");

        let workspace = state
            .config
            .workspace_dir(&request.user_id, &request.project_id);
        let report = match apply_manifest(&workspace, &entries).await {
            Ok(report) => report,
            Err(e) => {
                tracing::error!("apply failed: {e}");
                let kind = classify_apply_error(&e);
                yield SseEvent::Structured(json!({
                    "type": "error",
                    "code": kind.code(),
                    "userMessage": kind.user_message(),
                    "recoverable": false,
                }));
                return;
            }
        };
        for path in &report.written {
            yield SseEvent::log(&format!("Wrote {path}"));
        }
        for path in &report.deleted {
            yield SseEvent::log(&format!("Deleted {path}"));
        }

        let message = request
            .commit_message
            .clone()
            .unwrap_or_else(|| "Apply files".to_string());
        let commit = match state.git.commit_all(&workspace, &message).await {
            Ok(commit) => commit,
            Err(e) => {
                tracing::warn!("apply commit failed: {e}");
                None
            }
        };
        state.volume.commit().await;

        yield SseEvent::result(json!({
            "written": report.written,
            "deleted": report.deleted,
            "commit": commit,
        }));
        yield SseEvent::done(0);
    };
    sse_response(events)
}

async fn git_log(state: Arc<AppState>, request: ApplyRequest) -> Response {
    let workspace = state
        .config
        .workspace_dir(&request.user_id, &request.project_id);
    match state.git.log(&workspace).await {
        Ok(log) => {
            if log.auto_initialized {
                // Auto-init wrote a snapshot; publish it.
                state.volume.commit().await;
            }
            Json(log).into_response()
        }
        Err(e) => vcs_error_response(e),
    }
}

async fn git_diff(state: Arc<AppState>, request: ApplyRequest) -> Response {
    let Some(commit) = request.commit.as_deref() else {
        return error_response(StatusCode::BAD_REQUEST, "Missing commit");
    };
    let workspace = state
        .config
        .workspace_dir(&request.user_id, &request.project_id);
    match state.git.diff(&workspace, commit).await {
        Ok(diff) => Json(json!({ "diff": diff })).into_response(),
        Err(e) => vcs_error_response(e),
    }
}

async fn git_restore(state: Arc<AppState>, request: ApplyRequest) -> Response {
    let Some(commit) = request.commit.as_deref() else {
        return error_response(StatusCode::BAD_REQUEST, "Missing commit");
    };
    let workspace = state
        .config
        .workspace_dir(&request.user_id, &request.project_id);
    match state.git.restore(&workspace, commit).await {
        Ok(files) => {
            state.volume.commit().await;
            Json(json!({ "files": files })).into_response()
        }
        Err(e) => vcs_error_response(e),
    }
}

fn vcs_error_response(error: VcsError) -> Response {
    match &error {
        VcsError::InvalidHash { .. } => {
            error_response(StatusCode::BAD_REQUEST, &error.to_string())
        }
        VcsError::UnknownCommit { .. } => {
            error_response(StatusCode::NOT_FOUND, &error.to_string())
        }
        VcsError::ProjectNotFound { .. } => {
            error_response(StatusCode::NOT_FOUND, "Project not found")
        }
        _ => {
            tracing::error!("version store failure: {error}");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal error")
        }
    }
}
