//! Server-sent event model.
//!
//! Every generation produces a sequence of events with a `type` drawn
//! from {status, stream, log, result, debug, warning, error, done} and
//! ends with exactly one terminal `done` or `error`. Agent frames are
//! forwarded verbatim; everything else is built here.

use serde_json::{Value, json};

use crate::agent::exit::CliFailure;

/// One SSE event, either a verbatim agent line or a constructed object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseEvent {
    /// A line from the agent that already parsed as a JSON object;
    /// forwarded byte-for-byte.
    Raw(String),
    /// An event constructed by the orchestrator.
    Structured(Value),
}

impl SseEvent {
    pub fn status(message: &str) -> Self {
        Self::Structured(json!({ "type": "status", "message": message }))
    }

    pub fn log(content: &str) -> Self {
        Self::Structured(json!({ "type": "log", "content": content }))
    }

    pub fn result(value: Value) -> Self {
        Self::Structured(json!({ "type": "result", "result": value }))
    }

    pub fn warning(message: &str) -> Self {
        Self::Structured(json!({ "type": "warning", "message": message }))
    }

    pub fn debug(value: Value) -> Self {
        let mut obj = json!({ "type": "debug" });
        merge(&mut obj, value);
        Self::Structured(obj)
    }

    pub fn done(exit_code: i64) -> Self {
        Self::Structured(json!({ "type": "done", "exit_code": exit_code }))
    }

    /// Terminal error from a classified agent exit.
    pub fn cli_error(failure: &CliFailure) -> Self {
        Self::Structured(json!({
            "type": "error",
            "code": failure.code,
            "exit_code": failure.exit_code,
            "userMessage": failure.user_message,
            "recoverable": failure.recoverable,
        }))
    }

    /// Terminal error from an orchestrator-side failure.
    pub fn api_error(kind: ApiErrorKind) -> Self {
        Self::Structured(json!({
            "type": "error",
            "code": kind.code(),
            "userMessage": kind.user_message(),
            "recoverable": kind.recoverable(),
        }))
    }

    /// Add a field to a structured event (no-op on raw frames).
    pub fn with(mut self, key: &str, value: Value) -> Self {
        if let Self::Structured(Value::Object(ref mut map)) = self {
            map.insert(key.to_string(), value);
        }
        self
    }

    /// Whether this is a terminal `done` or `error` event.
    pub fn is_terminal(&self) -> bool {
        matches!(self.event_type(), Some("done") | Some("error"))
    }

    /// The `type` field of a structured event. Raw agent frames are
    /// opaque here; the pipeline never treats them as terminal.
    pub fn event_type(&self) -> Option<&str> {
        match self {
            Self::Raw(_) => None,
            Self::Structured(v) => v.get("type").and_then(Value::as_str),
        }
    }

    /// Render as an SSE frame: `data: <json>\n\n`.
    pub fn frame(&self) -> String {
        match self {
            Self::Raw(line) => format!("data: {line}\n\n"),
            Self::Structured(value) => format!("data: {value}\n\n"),
        }
    }
}

fn merge(target: &mut Value, extra: Value) {
    if let (Value::Object(target), Value::Object(extra)) = (target, extra) {
        for (k, v) in extra {
            target.insert(k, v);
        }
    }
}

/// What the orchestrator itself could not do, as opposed to what the
/// agent did (see [`crate::agent::exit`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiErrorKind {
    Network,
    Auth,
    RateLimit,
    ApiTimeout,
    Sandbox,
    Unknown,
}

impl ApiErrorKind {
    pub fn code(self) -> &'static str {
        match self {
            Self::Network => "NETWORK_ERROR",
            Self::Auth => "AUTH_ERROR",
            Self::RateLimit => "RATE_LIMIT",
            Self::ApiTimeout => "API_TIMEOUT",
            Self::Sandbox => "SANDBOX_ERROR",
            Self::Unknown => "UNKNOWN_ERROR",
        }
    }

    pub fn user_message(self) -> &'static str {
        match self {
            Self::Network => "ネットワークエラーが発生しました",
            Self::Auth => "認証エラーが発生しました",
            Self::RateLimit => "アクセスが集中しています。しばらくしてからお試しください",
            Self::ApiTimeout => "接続がタイムアウトしました",
            Self::Sandbox => "生成環境の準備に失敗しました",
            Self::Unknown => "予期しないエラーが発生しました",
        }
    }

    pub fn recoverable(self) -> bool {
        match self {
            Self::Network | Self::RateLimit | Self::ApiTimeout | Self::Sandbox => true,
            Self::Auth | Self::Unknown => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::exit::classify_exit;

    #[test]
    fn test_raw_frame_is_verbatim() {
        let event = SseEvent::Raw(r#"{"type":"stream","text":"hi"}"#.to_string());
        assert_eq!(event.frame(), "data: {\"type\":\"stream\",\"text\":\"hi\"}\n\n");
    }

    #[test]
    fn test_status_event_shape() {
        let event = SseEvent::status("Creating sandbox");
        let frame = event.frame();
        assert!(frame.starts_with("data: "));
        assert!(frame.ends_with("\n\n"));
        assert!(frame.contains(r#""type":"status""#));
        assert!(frame.contains("Creating sandbox"));
    }

    #[test]
    fn test_done_is_terminal() {
        assert!(SseEvent::done(0).is_terminal());
        assert!(!SseEvent::status("x").is_terminal());
        assert!(!SseEvent::log("x").is_terminal());
    }

    #[test]
    fn test_cli_error_event_carries_classification() {
        let failure = classify_exit(124).unwrap();
        let event = SseEvent::cli_error(&failure);
        assert!(event.is_terminal());
        let frame = event.frame();
        assert!(frame.contains("CLI_TIMEOUT"));
        assert!(frame.contains(r#""recoverable":true"#));
    }

    #[test]
    fn test_api_error_codes() {
        assert_eq!(ApiErrorKind::Network.code(), "NETWORK_ERROR");
        assert_eq!(ApiErrorKind::Sandbox.code(), "SANDBOX_ERROR");
        assert!(!ApiErrorKind::Auth.recoverable());
        assert!(ApiErrorKind::RateLimit.recoverable());
    }

    #[test]
    fn test_with_adds_fallback_field() {
        let event = SseEvent::api_error(ApiErrorKind::Network).with("fallback", "cli".into());
        assert!(event.frame().contains(r#""fallback":"cli""#));
    }

    #[test]
    fn test_debug_event_merges_fields() {
        let event = SseEvent::debug(serde_json::json!({
            "exit_code": 0,
            "sandbox_reused": true,
        }));
        let frame = event.frame();
        assert!(frame.contains(r#""type":"debug""#));
        assert!(frame.contains(r#""sandbox_reused":true"#));
    }
}
