//! Structured model-generation path.
//!
//! Instead of driving the agent CLI, this path asks the large model for a
//! complete JSON plan over its streaming HTTP endpoint (through the
//! filtering proxy), normalises the plan, writes the files, and renders
//! up to three sprites with the image-generation subprocess. Any failure
//! here is reported with `fallback: "cli"` so the caller can retry on
//! the agent path.

use futures::StreamExt;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::error::ModelError;
use crate::model::json_extract::extract_json;

/// Gemini model used for plan generation.
pub const GEMINI_MODEL: &str = "gemini-2.5-pro";

/// Sprites rendered per generation, at most.
pub const MAX_IMAGES: usize = 3;

/// A file the model wants written.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct PlannedFile {
    #[serde(alias = "name")]
    pub path: String,
    pub content: String,
}

/// A sprite the model wants generated.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct PlannedImage {
    pub name: String,
    pub prompt: String,
}

/// The normalised generation plan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GenerationPlan {
    pub files: Vec<PlannedFile>,
    pub images: Vec<PlannedImage>,
    pub mode: Option<String>,
    pub summary: Option<String>,
}

/// The three raw shapes the model is known to produce.
#[derive(Debug)]
enum PlanShape {
    /// A bare array of file objects.
    FileArray(Vec<PlannedFile>),
    /// An object with `files` / `images` / `mode` / `summary`.
    PlanObject(Value),
    /// A single file object.
    SingleFile(PlannedFile),
}

impl PlanShape {
    fn classify(value: Value) -> Result<Self, ModelError> {
        match value {
            Value::Array(_) => {
                let files = serde_json::from_value(value).map_err(|e| ModelError::Parse {
                    reason: format!("file array: {e}"),
                })?;
                Ok(Self::FileArray(files))
            }
            Value::Object(ref map) => {
                if map.contains_key("files") || map.contains_key("images") {
                    Ok(Self::PlanObject(value))
                } else if map.contains_key("content") {
                    let file =
                        serde_json::from_value(value).map_err(|e| ModelError::Parse {
                            reason: format!("single file: {e}"),
                        })?;
                    Ok(Self::SingleFile(file))
                } else {
                    Err(ModelError::Parse {
                        reason: "object has neither files, images, nor content".to_string(),
                    })
                }
            }
            other => Err(ModelError::Parse {
                reason: format!("unexpected JSON shape: {other}"),
            }),
        }
    }

    fn normalise(self) -> Result<GenerationPlan, ModelError> {
        match self {
            Self::FileArray(files) => Ok(GenerationPlan {
                files,
                ..GenerationPlan::default()
            }),
            Self::SingleFile(file) => Ok(GenerationPlan {
                files: vec![file],
                ..GenerationPlan::default()
            }),
            Self::PlanObject(value) => {
                #[derive(Deserialize)]
                struct RawPlan {
                    #[serde(default)]
                    files: Vec<Value>,
                    #[serde(default)]
                    images: Vec<Value>,
                    #[serde(default)]
                    mode: Option<String>,
                    #[serde(default)]
                    summary: Option<String>,
                }
                let raw: RawPlan =
                    serde_json::from_value(value).map_err(|e| ModelError::Parse {
                        reason: format!("plan object: {e}"),
                    })?;

                // File specs carry `content`; image specs carry `prompt`
                // and `name`. The model sometimes mixes them up between
                // the two lists, so sort each entry by its fields.
                let mut plan = GenerationPlan {
                    mode: raw.mode,
                    summary: raw.summary,
                    ..GenerationPlan::default()
                };
                for entry in raw.files.into_iter().chain(raw.images) {
                    let Value::Object(ref map) = entry else {
                        continue;
                    };
                    if map.contains_key("content") {
                        if let Ok(file) = serde_json::from_value::<PlannedFile>(entry) {
                            plan.files.push(file);
                        }
                    } else if map.contains_key("prompt") && map.contains_key("name") {
                        if let Ok(image) = serde_json::from_value::<PlannedImage>(entry) {
                            plan.images.push(image);
                        }
                    }
                }
                Ok(plan)
            }
        }
    }
}

/// Parse accumulated model text into a normalised plan.
pub fn parse_plan(text: &str) -> Result<GenerationPlan, ModelError> {
    let value = extract_json(text).ok_or(ModelError::EmptyResponse)?;
    PlanShape::classify(value)?.normalise()
}

/// Ask the streaming endpoint for a plan and accumulate the fragments.
///
/// The request pins `responseMimeType: application/json`; the response is
/// an SSE feed of `GenerateContentResponse` chunks whose text parts are
/// concatenated into one document.
pub async fn fetch_plan(
    client: &reqwest::Client,
    base_url: &str,
    prompt: &str,
) -> Result<GenerationPlan, ModelError> {
    let url = format!(
        "{}/v1beta/models/{}:streamGenerateContent?alt=sse",
        base_url.trim_end_matches('/'),
        GEMINI_MODEL
    );
    let body = json!({
        "contents": [{ "role": "user", "parts": [{ "text": prompt }] }],
        "generationConfig": { "responseMimeType": "application/json" },
    });

    let response = client.post(&url).json(&body).send().await?;
    let response = response.error_for_status()?;

    let mut accumulated = String::new();
    let mut pending: Vec<u8> = Vec::new();
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        pending.extend_from_slice(&chunk);
        while let Some(pos) = pending.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = pending.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line[..line.len() - 1]);
            let line = line.trim();
            if let Some(data) = line.strip_prefix("data: ") {
                accumulate_fragment(data, &mut accumulated);
            }
        }
    }
    // A final chunk without a trailing newline still counts.
    if !pending.is_empty() {
        let line = String::from_utf8_lossy(&pending);
        if let Some(data) = line.trim().strip_prefix("data: ") {
            accumulate_fragment(data, &mut accumulated);
        }
    }

    if accumulated.is_empty() {
        return Err(ModelError::EmptyResponse);
    }
    parse_plan(&accumulated)
}

fn accumulate_fragment(data: &str, accumulated: &mut String) {
    let Ok(value) = serde_json::from_str::<Value>(data) else {
        return;
    };
    let Some(parts) = value
        .pointer("/candidates/0/content/parts")
        .and_then(Value::as_array)
    else {
        return;
    };
    for part in parts {
        if let Some(text) = part.get("text").and_then(Value::as_str) {
            accumulated.push_str(text);
        }
    }
}

/// Command line for the in-sandbox image-generation subprocess.
pub fn image_command(global_root: &std::path::Path, prompt: &str, output: &str) -> String {
    use crate::agent::shell::quote;
    format!(
        "python3 {} --prompt {} --output {}",
        quote(&global_root.join("scripts/generate_image.py").to_string_lossy()),
        quote(prompt),
        quote(output),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bare_file_array() {
        let plan = parse_plan(
            r#"[{"path": "index.html", "content": "<html/>"},
                {"path": "game.js", "content": "let x;"}]"#,
        )
        .unwrap();
        assert_eq!(plan.files.len(), 2);
        assert!(plan.images.is_empty());
        assert_eq!(plan.files[0].path, "index.html");
    }

    #[test]
    fn test_parse_plan_object() {
        let plan = parse_plan(
            r#"{
                "files": [{"path": "index.html", "content": "<html/>"}],
                "images": [{"name": "player.png", "prompt": "cute cat"}],
                "mode": "create",
                "summary": "A cat game"
            }"#,
        )
        .unwrap();
        assert_eq!(plan.files.len(), 1);
        assert_eq!(plan.images.len(), 1);
        assert_eq!(plan.mode.as_deref(), Some("create"));
        assert_eq!(plan.summary.as_deref(), Some("A cat game"));
    }

    #[test]
    fn test_parse_single_file_object() {
        let plan = parse_plan(r#"{"path": "index.html", "content": "<html/>"}"#).unwrap();
        assert_eq!(plan.files.len(), 1);
        assert!(plan.images.is_empty());
    }

    #[test]
    fn test_file_accepts_name_alias() {
        let plan = parse_plan(r#"[{"name": "game.js", "content": "x"}]"#).unwrap();
        assert_eq!(plan.files[0].path, "game.js");
    }

    #[test]
    fn test_misfiled_entries_are_sorted_by_fields() {
        // An image spec in `files` and a file spec in `images`.
        let plan = parse_plan(
            r#"{
                "files": [{"name": "boss.png", "prompt": "scary boss"}],
                "images": [{"path": "game.js", "content": "let x;"}]
            }"#,
        )
        .unwrap();
        assert_eq!(plan.files.len(), 1);
        assert_eq!(plan.files[0].path, "game.js");
        assert_eq!(plan.images.len(), 1);
        assert_eq!(plan.images[0].name, "boss.png");
    }

    #[test]
    fn test_plan_in_markdown_fences() {
        let plan = parse_plan("```json\n[{\"path\": \"a.js\", \"content\": \"1\"}]\n```").unwrap();
        assert_eq!(plan.files.len(), 1);
    }

    #[test]
    fn test_unusable_shapes_error() {
        assert!(parse_plan("").is_err());
        assert!(parse_plan("just words").is_err());
        assert!(parse_plan(r#"{"mode": "create"}"#).is_err());
    }

    #[test]
    fn test_image_command_quotes_prompt() {
        let cmd = image_command(
            std::path::Path::new("/global"),
            "cute cat; rm -rf /",
            "assets/player.png",
        );
        assert!(cmd.starts_with("python3 /global/scripts/generate_image.py"));
        assert!(cmd.contains("'cute cat; rm -rf /'"));
        assert!(cmd.ends_with("assets/player.png"));
    }

    #[test]
    fn test_accumulate_fragment_joins_text_parts() {
        let mut acc = String::new();
        accumulate_fragment(
            r#"{"candidates":[{"content":{"parts":[{"text":"[{\"path\""}]}}]}"#,
            &mut acc,
        );
        accumulate_fragment(
            r#"{"candidates":[{"content":{"parts":[{"text":": \"a.js\", \"content\": \"x\"}]"}]}}]}"#,
            &mut acc,
        );
        let plan = parse_plan(&acc).unwrap();
        assert_eq!(plan.files[0].path, "a.js");
    }

    #[test]
    fn test_accumulate_fragment_ignores_non_text() {
        let mut acc = String::new();
        accumulate_fragment(r#"{"usageMetadata": {"totalTokenCount": 5}}"#, &mut acc);
        accumulate_fragment("not even json", &mut acc);
        assert!(acc.is_empty());
    }
}
