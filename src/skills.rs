//! Skill bundle serving.
//!
//! Skills are read-only instructional documents on the global volume at
//! `<global>/.claude/skills/<name>/SKILL.md`. The orchestrator serves
//! slices of this tree by name; names are confined to a single path
//! segment so a request can never read outside the skills root.

use std::collections::BTreeMap;
use std::path::Path;

use crate::error::FilesError;

/// Upper bound on skill names per request.
pub const MAX_SKILL_REQUEST: usize = 20;

/// Whether `name` is a safe skill directory name: one path segment, no
/// separators, no dot segments.
pub fn is_valid_skill_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= 64
        && !name.starts_with('.')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

/// Read `SKILL.md` for each requested skill.
///
/// Unknown or invalid names are omitted from the result rather than
/// failing the request; the caller learns what exists from the keys.
pub async fn read_skill_contents(
    skills_root: &Path,
    names: &[String],
) -> Result<BTreeMap<String, String>, FilesError> {
    let mut out = BTreeMap::new();
    for name in names {
        if !is_valid_skill_name(name) {
            tracing::warn!(skill = %name, "rejected skill name");
            continue;
        }
        let path = skills_root.join(name).join("SKILL.md");
        match tokio::fs::read_to_string(&path).await {
            Ok(content) => {
                out.insert(name.clone(), content);
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(skill = %name, "skill not found");
            }
            Err(e) => return Err(e.into()),
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn seed_skill(root: &Path, name: &str, content: &str) {
        let dir = root.join(name);
        tokio::fs::create_dir_all(&dir).await.unwrap();
        tokio::fs::write(dir.join("SKILL.md"), content).await.unwrap();
    }

    #[test]
    fn test_valid_names() {
        assert!(is_valid_skill_name("p5js-setup"));
        assert!(is_valid_skill_name("threejs_water"));
        assert!(is_valid_skill_name("kawaii-3d"));
        assert!(is_valid_skill_name("v2.skill"));
    }

    #[test]
    fn test_invalid_names() {
        assert!(!is_valid_skill_name(""));
        assert!(!is_valid_skill_name("../escape"));
        assert!(!is_valid_skill_name("a/b"));
        assert!(!is_valid_skill_name("a\\b"));
        assert!(!is_valid_skill_name(".hidden"));
        assert!(!is_valid_skill_name(&"x".repeat(65)));
    }

    #[tokio::test]
    async fn test_reads_requested_skills() {
        let root = TempDir::new().unwrap();
        seed_skill(root.path(), "p5js-setup", "# p5.js setup").await;
        seed_skill(root.path(), "game-ai", "# Game AI").await;

        let contents = read_skill_contents(
            root.path(),
            &["p5js-setup".to_string(), "game-ai".to_string()],
        )
        .await
        .unwrap();
        assert_eq!(contents.len(), 2);
        assert_eq!(contents["p5js-setup"], "# p5.js setup");
    }

    #[tokio::test]
    async fn test_missing_skills_are_omitted() {
        let root = TempDir::new().unwrap();
        seed_skill(root.path(), "p5js-setup", "# p5.js setup").await;

        let contents = read_skill_contents(
            root.path(),
            &["p5js-setup".to_string(), "no-such-skill".to_string()],
        )
        .await
        .unwrap();
        assert_eq!(contents.len(), 1);
        assert!(!contents.contains_key("no-such-skill"));
    }

    #[tokio::test]
    async fn test_traversal_names_are_silently_dropped() {
        let root = TempDir::new().unwrap();
        // A file outside the skills root that a traversal would reach.
        tokio::fs::write(root.path().join("secret.md"), "secret").await.unwrap();

        let contents = read_skill_contents(
            root.path(),
            &["../secret.md".to_string(), "..".to_string()],
        )
        .await
        .unwrap();
        assert!(contents.is_empty());
    }
}
