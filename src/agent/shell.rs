//! Shell argument quoting.
//!
//! Every credential, path, and payload that crosses into a sandbox shell
//! goes through [`quote`]; nothing is ever concatenated raw into a
//! command line.

use std::collections::BTreeMap;

/// Single-quote `s` for POSIX shells.
///
/// A single-quoted string has no metacharacters at all; embedded single
/// quotes are rendered as `'\''`.
pub fn quote(s: &str) -> String {
    if !s.is_empty()
        && s.chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | '/' | ':' | '='))
    {
        return s.to_string();
    }
    format!("'{}'", s.replace('\'', r"'\''"))
}

/// Build an `export K='v'; export K2='v2';` preamble from an environment
/// map. Keys that are not valid shell identifiers are skipped.
pub fn export_preamble(env: &BTreeMap<String, String>) -> String {
    let mut out = String::new();
    for (key, value) in env {
        if !is_identifier(key) {
            tracing::warn!(%key, "skipping non-identifier environment key");
            continue;
        }
        out.push_str("export ");
        out.push_str(key);
        out.push('=');
        out.push_str(&quote(value));
        out.push_str("; ");
    }
    out
}

fn is_identifier(key: &str) -> bool {
    let mut chars = key.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_strings_pass_through() {
        assert_eq!(quote("abc-123_x.y/z"), "abc-123_x.y/z");
    }

    #[test]
    fn test_spaces_are_quoted() {
        assert_eq!(quote("hello world"), "'hello world'");
    }

    #[test]
    fn test_single_quote_is_escaped() {
        assert_eq!(quote("it's"), r"'it'\''s'");
    }

    #[test]
    fn test_empty_string_is_quoted() {
        assert_eq!(quote(""), "''");
    }

    #[test]
    fn test_metacharacters_are_neutralised() {
        let quoted = quote("$(rm -rf /); `boom` && echo $HOME");
        assert!(quoted.starts_with('\''));
        assert!(quoted.ends_with('\''));
    }

    #[test]
    fn test_export_preamble_is_ordered_and_quoted() {
        let mut env = BTreeMap::new();
        env.insert("B_VAR".to_string(), "two words".to_string());
        env.insert("A_VAR".to_string(), "plain".to_string());
        let preamble = export_preamble(&env);
        assert_eq!(preamble, "export A_VAR=plain; export B_VAR='two words'; ");
    }

    #[test]
    fn test_export_preamble_skips_bad_keys() {
        let mut env = BTreeMap::new();
        env.insert("GOOD".to_string(), "x".to_string());
        env.insert("BAD-KEY".to_string(), "y".to_string());
        env.insert("1NUM".to_string(), "z".to_string());
        let preamble = export_preamble(&env);
        assert!(preamble.contains("GOOD"));
        assert!(!preamble.contains("BAD-KEY"));
        assert!(!preamble.contains("1NUM"));
    }
}
