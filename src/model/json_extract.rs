//! Tolerant JSON extraction from noisy model output.
//!
//! Small models wrap their JSON in prose, markdown fences, or stray
//! tokens. The extractors bound the candidate region first (fences, then
//! the outermost brace pair found by a string-aware scan) and only then
//! hand it to the parser, so a chatty response still yields its payload.

use serde_json::Value;

/// Extract the first JSON object from free-form text.
pub fn extract_json_object(text: &str) -> Option<Value> {
    extract(text, '{', '}')
        .filter(|v| v.is_object())
}

/// Extract the first JSON array from free-form text.
pub fn extract_json_array(text: &str) -> Option<Value> {
    extract(text, '[', ']')
        .filter(|v| v.is_array())
}

/// Extract a JSON document of either shape, preferring whichever opens
/// first.
pub fn extract_json(text: &str) -> Option<Value> {
    let text = strip_fences(text);
    let obj_at = text.find('{');
    let arr_at = text.find('[');
    match (obj_at, arr_at) {
        (Some(o), Some(a)) if a < o => {
            extract_json_array(text).or_else(|| extract_json_object(text))
        }
        (_, _) => extract_json_object(text).or_else(|| extract_json_array(text)),
    }
}

fn extract(text: &str, open: char, close: char) -> Option<Value> {
    let text = strip_fences(text);
    let start = text.find(open)?;
    let candidate = &text[start..];

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (i, c) in candidate.char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            c if c == open => depth += 1,
            c if c == close => {
                depth -= 1;
                if depth == 0 {
                    let slice = &candidate[..i + c.len_utf8()];
                    return serde_json::from_str(slice).ok();
                }
            }
            _ => {}
        }
    }
    None
}

/// Drop markdown code fences so ```json blocks parse like bare JSON.
fn strip_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return text;
    };
    let rest = rest
        .split_once('\n')
        .map(|(_, body)| body)
        .unwrap_or(rest);
    rest.rsplit_once("```").map(|(body, _)| body).unwrap_or(rest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_bare_object() {
        let v = extract_json_object(r#"{"intent":"edit"}"#).unwrap();
        assert_eq!(v, json!({"intent": "edit"}));
    }

    #[test]
    fn test_object_wrapped_in_prose() {
        let text = r#"Sure! Here is the classification: {"intent": "restore"} Hope that helps."#;
        let v = extract_json_object(text).unwrap();
        assert_eq!(v, json!({"intent": "restore"}));
    }

    #[test]
    fn test_markdown_fenced_object() {
        let text = "```json\n{\"skills\": [\"p5js-setup\"]}\n```";
        let v = extract_json_object(text).unwrap();
        assert_eq!(v, json!({"skills": ["p5js-setup"]}));
    }

    #[test]
    fn test_nested_braces_and_strings() {
        let text = r#"note {"a": {"b": "}"}, "c": 1} trailing"#;
        let v = extract_json_object(text).unwrap();
        assert_eq!(v, json!({"a": {"b": "}"}, "c": 1}));
    }

    #[test]
    fn test_escaped_quote_inside_string() {
        let text = r#"{"msg": "say \"hi\" {ok}"}"#;
        let v = extract_json_object(text).unwrap();
        assert_eq!(v["msg"], "say \"hi\" {ok}");
    }

    #[test]
    fn test_garbage_yields_none() {
        assert!(extract_json_object("no json here").is_none());
        assert!(extract_json_object("{broken").is_none());
        assert!(extract_json_object("").is_none());
    }

    #[test]
    fn test_array_extraction() {
        let text = "files below:\n[{\"path\":\"a.js\",\"content\":\"x\"}]";
        let v = extract_json_array(text).unwrap();
        assert_eq!(v[0]["path"], "a.js");
    }

    #[test]
    fn test_extract_json_prefers_first_opener() {
        let v = extract_json(r#"[1,2] then {"a":1}"#).unwrap();
        assert!(v.is_array());
        let v = extract_json(r#"{"a":1} then [1,2]"#).unwrap();
        assert!(v.is_object());
    }
}
