//! Lightweight-model endpoints: intent, skill selection, chat replies,
//! publish metadata.
//!
//! Each invocation runs the small-model variant of the agent CLI in a
//! disposable sandbox and parses a tolerant JSON fragment from whatever
//! comes back. Every endpoint has a deterministic keyword fallback, so a
//! noisy or failed model response degrades the answer but never the
//! endpoint.

use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::agent::shell::{export_preamble, quote};
use crate::config::Config;
use crate::error::ModelError;
use crate::model::json_extract::extract_json_object;
use crate::sandbox::credentials::{AGENT_USER, credential_env};
use crate::sandbox::lifecycle::SandboxManager;

/// Wall-clock budget for classification calls.
const CLASSIFY_TIMEOUT: Duration = Duration::from_secs(15);

/// Wall-clock budget for generative calls (chat, publish metadata).
const GENERATE_TIMEOUT: Duration = Duration::from_secs(30);

const LIGHT_PROMPT_FILE: &str = "/tmp/light-prompt.txt";

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct IntentResponse {
    pub intent: String,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SkillsResponse {
    pub skills: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub game_spec: Option<String>,
    #[serde(default)]
    pub conversation_history: Option<Vec<String>>,
    #[serde(default)]
    pub system_prompt: Option<String>,
    #[serde(default)]
    pub raw_output: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ChatReply {
    Structured {
        message: String,
        suggestions: Vec<String>,
    },
    Raw {
        result: String,
    },
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct PublishInfo {
    pub title: String,
    pub description: String,
    #[serde(rename = "howToPlay")]
    pub how_to_play: String,
    pub tags: Vec<String>,
}

/// Small-model invocations in disposable sandboxes.
pub struct LightModel {
    manager: Arc<SandboxManager>,
    config: Arc<Config>,
}

impl LightModel {
    pub fn new(manager: Arc<SandboxManager>, config: Arc<Config>) -> Self {
        Self { manager, config }
    }

    /// Classify a chat message into `restore` / `chat` / `edit`.
    pub async fn detect_intent(&self, message: &str) -> IntentResponse {
        let prompt = format!(
            "あなたはゲーム作成プラットフォームの意図分類器です。\
             ユーザーのメッセージを restore / chat / edit のいずれかに分類してください。\n\
             - restore: 以前のバージョンに戻したい\n\
             - chat: 質問や雑談で、ゲームの変更を求めていない\n\
             - edit: ゲームの生成・変更を求めている\n\
             JSONのみで回答: {{\"intent\": \"...\"}}\n\nメッセージ: {message}"
        );

        if let Ok(output) = self.invoke(&prompt, CLASSIFY_TIMEOUT).await {
            if let Some(value) = extract_json_object(&output) {
                if let Some(intent) = value.get("intent").and_then(Value::as_str) {
                    if matches!(intent, "restore" | "chat" | "edit") {
                        return IntentResponse {
                            intent: intent.to_string(),
                        };
                    }
                }
            }
            tracing::warn!("intent output unparseable, using keyword fallback");
        }
        IntentResponse {
            intent: fallback_intent(message).to_string(),
        }
    }

    /// Pick generator skills for a message and rendering dimension.
    pub async fn detect_skills(
        &self,
        message: &str,
        dimension: &str,
        existing_code: Option<&str>,
    ) -> SkillsResponse {
        let code_hint = existing_code
            .map(|code| {
                let head: String = code.chars().take(2000).collect();
                format!("\n既存コードの冒頭:\n{head}")
            })
            .unwrap_or_default();
        let prompt = format!(
            "ゲーム生成に使うスキルを選んでください（{dimension}）。\
             候補: p5js-setup, p5js-input, p5js-collision, threejs-setup, \
             threejs-input, threejs-lighting, threejs-water, visual-polish-2d, \
             visual-polish-3d, tween-animation, game-ai, vehicle-physics, \
             kawaii-3d, kawaii-colors, kawaii-ui, frontend-design\n\
             JSONのみで回答: {{\"skills\": [\"...\"]}}\n\n\
             リクエスト: {message}{code_hint}"
        );

        if let Ok(output) = self.invoke(&prompt, CLASSIFY_TIMEOUT).await {
            if let Some(value) = extract_json_object(&output) {
                if let Some(skills) = value.get("skills").and_then(Value::as_array) {
                    let skills: Vec<String> = skills
                        .iter()
                        .filter_map(Value::as_str)
                        .map(str::to_string)
                        .collect();
                    if !skills.is_empty() {
                        return SkillsResponse { skills };
                    }
                }
            }
            tracing::warn!("skills output unparseable, using keyword fallback");
        }
        SkillsResponse {
            skills: fallback_skills(message, dimension),
        }
    }

    /// Conversational reply with follow-up suggestions.
    pub async fn chat(&self, request: &ChatRequest) -> ChatReply {
        let mut prompt = String::new();
        if let Some(system) = &request.system_prompt {
            prompt.push_str(system);
            prompt.push_str("\n\n");
        } else {
            prompt.push_str(
                "あなたはブラウザゲーム作成アシスタントです。短く親切に日本語で答えてください。\n\n",
            );
        }
        if let Some(spec) = &request.game_spec {
            prompt.push_str(&format!("現在のゲーム仕様:\n{spec}\n\n"));
        }
        if let Some(history) = &request.conversation_history {
            for line in history {
                prompt.push_str(line);
                prompt.push('\n');
            }
            prompt.push('\n');
        }
        if request.raw_output {
            prompt.push_str(&format!("ユーザー: {}\n", request.message));
        } else {
            prompt.push_str(&format!(
                "ユーザー: {}\n\nJSONのみで回答: \
                 {{\"message\": \"...\", \"suggestions\": [\"...\", \"...\"]}}\n",
                request.message
            ));
        }

        let output = self.invoke(&prompt, GENERATE_TIMEOUT).await;

        if request.raw_output {
            return ChatReply::Raw {
                result: output.unwrap_or_default().trim().to_string(),
            };
        }

        if let Ok(output) = output {
            if let Some(value) = extract_json_object(&output) {
                let message = value.get("message").and_then(Value::as_str);
                if let Some(message) = message {
                    let suggestions = value
                        .get("suggestions")
                        .and_then(Value::as_array)
                        .map(|a| {
                            a.iter()
                                .filter_map(Value::as_str)
                                .map(str::to_string)
                                .collect()
                        })
                        .unwrap_or_default();
                    return ChatReply::Structured {
                        message: message.to_string(),
                        suggestions,
                    };
                }
            }
            tracing::warn!("chat output unparseable, using fallback reply");
        }
        fallback_chat()
    }

    /// Synthesise publish metadata for a project.
    pub async fn generate_publish_info(
        &self,
        project_name: &str,
        game_code: Option<&str>,
        spec_content: Option<&str>,
    ) -> PublishInfo {
        let mut context = String::new();
        if let Some(spec) = spec_content {
            let head: String = spec.chars().take(3000).collect();
            context.push_str(&format!("仕様:\n{head}\n\n"));
        }
        if let Some(code) = game_code {
            let head: String = code.chars().take(3000).collect();
            context.push_str(&format!("コードの冒頭:\n{head}\n\n"));
        }
        let prompt = format!(
            "ブラウザゲーム「{project_name}」の公開情報を作ってください。\n{context}\
             JSONのみで回答: {{\"title\": \"...\", \"description\": \"...\", \
             \"howToPlay\": \"...\", \"tags\": [\"...\"]}}"
        );

        if let Ok(output) = self.invoke(&prompt, GENERATE_TIMEOUT).await {
            if let Some(value) = extract_json_object(&output) {
                let title = value.get("title").and_then(Value::as_str);
                let description = value.get("description").and_then(Value::as_str);
                if let (Some(title), Some(description)) = (title, description) {
                    return PublishInfo {
                        title: title.to_string(),
                        description: description.to_string(),
                        how_to_play: value
                            .get("howToPlay")
                            .and_then(Value::as_str)
                            .unwrap_or("画面の指示に従って遊んでください。")
                            .to_string(),
                        tags: value
                            .get("tags")
                            .and_then(Value::as_array)
                            .map(|a| {
                                a.iter()
                                    .filter_map(Value::as_str)
                                    .map(str::to_string)
                                    .collect()
                            })
                            .unwrap_or_else(default_tags),
                    };
                }
            }
            tracing::warn!("publish info output unparseable, using fallback");
        }
        PublishInfo {
            title: project_name.to_string(),
            description: format!("{project_name}はブラウザで遊べるミニゲームです。"),
            how_to_play: "画面の指示に従って遊んでください。".to_string(),
            tags: default_tags(),
        }
    }

    /// Run the small model once in a throwaway sandbox.
    async fn invoke(&self, prompt: &str, wall: Duration) -> Result<String, ModelError> {
        let name = self.manager.create_disposable().await?;
        let result = self.invoke_in(&name, prompt, wall).await;
        if let Err(e) = self.manager.remove(&name).await {
            tracing::warn!(sandbox = %name, "disposable cleanup failed: {e}");
        }
        result
    }

    async fn invoke_in(
        &self,
        name: &str,
        prompt: &str,
        wall: Duration,
    ) -> Result<String, ModelError> {
        let runtime = self.manager.runtime();

        let encoded = quote(&BASE64.encode(prompt.as_bytes()));
        let stage = format!("printf '%s' {encoded} | base64 -d > {LIGHT_PROMPT_FILE}");
        let out = runtime.exec_collect(name, &sh(&stage)).await?;
        if !out.success() {
            return Err(ModelError::Parse {
                reason: format!("prompt staging failed: {}", out.output),
            });
        }

        let exports = export_preamble(&credential_env(&self.config, self.manager.proxy()));
        let inner = format!(
            "{exports}claude --print --model {} < {LIGHT_PROMPT_FILE} 2>&1",
            quote(&self.config.model_small)
        );
        let command = format!(
            "timeout {} su {AGENT_USER} -c {}",
            wall.as_secs(),
            quote(&inner)
        );
        let out = runtime.exec_collect(name, &sh(&command)).await?;
        if !out.success() {
            return Err(ModelError::Parse {
                reason: format!("small model exited {}", out.exit_code),
            });
        }
        if out.output.trim().is_empty() {
            return Err(ModelError::EmptyResponse);
        }
        Ok(out.output)
    }
}

fn sh(script: &str) -> Vec<String> {
    vec!["bash".to_string(), "-lc".to_string(), script.to_string()]
}

fn default_tags() -> Vec<String> {
    vec!["game".to_string(), "browser".to_string()]
}

/// Keyword fallback when the model gives nothing usable.
fn fallback_intent(message: &str) -> &'static str {
    const RESTORE: &[&str] = &["戻して", "元に戻", "もとに戻", "restore", "rollback", "前のバージョン"];
    const CHAT: &[&str] = &["?", "？", "教えて", "とは", "どうやって", "what", "how", "why"];

    if RESTORE.iter().any(|k| message.contains(k)) {
        "restore"
    } else if CHAT.iter().any(|k| message.contains(k)) {
        "chat"
    } else {
        "edit"
    }
}

/// Deterministic skill selection by dimension and keywords.
fn fallback_skills(message: &str, dimension: &str) -> Vec<String> {
    let mut skills: Vec<String> = if dimension == "3d" {
        vec![
            "threejs-setup".to_string(),
            "threejs-input".to_string(),
            "threejs-lighting".to_string(),
        ]
    } else {
        vec!["p5js-setup".to_string(), "p5js-input".to_string()]
    };

    let pairs: &[(&[&str], &str)] = &[
        (&["水", "海", "water", "ocean"], "threejs-water"),
        (&["かわいい", "kawaii", "cute"], "kawaii-colors"),
        (&["衝突", "当たり判定", "collision"], "p5js-collision"),
        (&["車", "乗り物", "vehicle", "car"], "vehicle-physics"),
        (&["敵", "AI", "enemy"], "game-ai"),
    ];
    for (keywords, skill) in pairs {
        if keywords.iter().any(|k| message.contains(k)) && !skills.iter().any(|s| s == skill) {
            skills.push(skill.to_string());
        }
    }
    skills
}

fn fallback_chat() -> ChatReply {
    ChatReply::Structured {
        message: "ご質問ありがとうございます。もう少し詳しく教えてください。".to_string(),
        suggestions: vec![
            "ゲームを作って".to_string(),
            "今のゲームを変更して".to_string(),
            "前のバージョンに戻して".to_string(),
        ],
    }
}
