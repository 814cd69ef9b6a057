//! Lightweight-model and skill-content endpoints.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::Deserialize;
use serde_json::json;

use crate::gate::validate_uuid;
use crate::model::light::ChatRequest;
use crate::skills::{MAX_SKILL_REQUEST, read_skill_contents};

use super::{AppState, error_response};

#[derive(Debug, Deserialize)]
pub struct MessageRequest {
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct SkillsDetectRequest {
    #[serde(default)]
    pub message: String,
    #[serde(default = "default_dimension")]
    pub dimension: String,
    #[serde(default)]
    pub existing_code: Option<String>,
}

fn default_dimension() -> String {
    "2d".to_string()
}

#[derive(Debug, Deserialize)]
pub struct PublishInfoRequest {
    pub user_id: String,
    pub project_id: String,
    #[serde(default)]
    pub project_name: String,
    #[serde(default)]
    pub game_code: Option<String>,
    #[serde(default)]
    pub spec_content: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SkillContentRequest {
    #[serde(default)]
    pub skill_names: Vec<String>,
}

/// POST /detect_intent.
pub async fn detect_intent(
    State(state): State<Arc<AppState>>,
    Json(request): Json<MessageRequest>,
) -> Response {
    if request.message.trim().is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "Missing message");
    }
    Json(state.light.detect_intent(&request.message).await).into_response()
}

/// POST /detect_skills.
pub async fn detect_skills(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SkillsDetectRequest>,
) -> Response {
    if request.message.trim().is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "Missing message");
    }
    let response = state
        .light
        .detect_skills(
            &request.message,
            &request.dimension,
            request.existing_code.as_deref(),
        )
        .await;
    Json(response).into_response()
}

/// POST /chat_haiku.
pub async fn chat_haiku(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ChatRequest>,
) -> Response {
    if request.message.trim().is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "Missing message");
    }
    Json(state.light.chat(&request).await).into_response()
}

/// POST /generate_publish_info.
pub async fn generate_publish_info(
    State(state): State<Arc<AppState>>,
    Json(request): Json<PublishInfoRequest>,
) -> Response {
    for (field, value) in [
        ("user_id", &request.user_id),
        ("project_id", &request.project_id),
    ] {
        if let Err(e) = validate_uuid(field, value) {
            return error_response(StatusCode::BAD_REQUEST, &e.to_string());
        }
    }
    if request.project_name.trim().is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "Missing project_name");
    }

    // Callers may omit the code; fall back to the project's entry point
    // so the model still sees something concrete.
    let game_code = match request.game_code {
        Some(code) => Some(code),
        None => {
            let workspace = state
                .config
                .workspace_dir(&request.user_id, &request.project_id);
            tokio::fs::read_to_string(workspace.join("index.html")).await.ok()
        }
    };

    let info = state
        .light
        .generate_publish_info(
            &request.project_name,
            game_code.as_deref(),
            request.spec_content.as_deref(),
        )
        .await;
    Json(info).into_response()
}

/// POST /get_skill_content.
pub async fn get_skill_content(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SkillContentRequest>,
) -> Response {
    if request.skill_names.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "Missing skill_names");
    }
    if request.skill_names.len() > MAX_SKILL_REQUEST {
        return error_response(
            StatusCode::BAD_REQUEST,
            &format!("Too many skills requested (max {MAX_SKILL_REQUEST})"),
        );
    }

    match read_skill_contents(&state.config.skills_root(), &request.skill_names).await {
        Ok(skills) => Json(json!({ "skills": skills })).into_response(),
        Err(e) => {
            tracing::error!("skill read failed: {e}");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal error")
        }
    }
}
