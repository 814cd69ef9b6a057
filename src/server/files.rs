//! Read-only workspace file endpoints.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Json, Response};
use serde::Deserialize;
use serde_json::json;

use crate::error::FilesError;
use crate::files::serve::{cache_control_for, list_files as walk_files, resolve_file};
use crate::gate::validate_uuid;

use super::{AppState, error_response};

#[derive(Debug, Deserialize)]
pub struct FileQuery {
    pub user_id: String,
    pub project_id: String,
    pub path: String,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub user_id: String,
    pub project_id: String,
}

/// GET /get_file: one workspace file with the cache policy of its type.
pub async fn get_file(
    State(state): State<Arc<AppState>>,
    Query(query): Query<FileQuery>,
) -> Response {
    for (field, value) in [("user_id", &query.user_id), ("project_id", &query.project_id)] {
        if let Err(e) = validate_uuid(field, value) {
            return error_response(StatusCode::BAD_REQUEST, &e.to_string());
        }
    }

    let workspace = state.config.workspace_dir(&query.user_id, &query.project_id);
    let resolved = match resolve_file(&workspace, &query.path).await {
        Ok(path) => path,
        Err(FilesError::UnsafePath { .. }) => {
            return error_response(StatusCode::BAD_REQUEST, "Invalid path");
        }
        Err(_) => return error_response(StatusCode::NOT_FOUND, "File not found"),
    };

    let body = match tokio::fs::read(&resolved).await {
        Ok(body) => body,
        Err(e) => {
            tracing::warn!("file read failed: {e}");
            return error_response(StatusCode::NOT_FOUND, "File not found");
        }
    };

    let mime = mime_guess::from_path(&resolved).first_or_octet_stream();
    let mut response = (StatusCode::OK, body).into_response();
    let headers = response.headers_mut();
    if let Ok(content_type) = HeaderValue::from_str(mime.as_ref()) {
        headers.insert(header::CONTENT_TYPE, content_type);
    }
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static(cache_control_for(&mime)),
    );
    response
}

/// GET /list_files: non-hidden workspace files with sizes.
pub async fn list_files(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> Response {
    for (field, value) in [("user_id", &query.user_id), ("project_id", &query.project_id)] {
        if let Err(e) = validate_uuid(field, value) {
            return error_response(StatusCode::BAD_REQUEST, &e.to_string());
        }
    }

    let workspace = state.config.workspace_dir(&query.user_id, &query.project_id);
    match walk_files(&workspace).await {
        Ok(files) => Json(json!({ "files": files })).into_response(),
        Err(e) => {
            tracing::error!("list failed: {e}");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal error")
        }
    }
}
