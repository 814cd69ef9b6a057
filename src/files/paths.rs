//! Workspace-relative path sanitisation.
//!
//! Caller-supplied paths never reach the filesystem before passing
//! through [`sanitize_rel_path`]; everything else in this crate builds on
//! that guarantee.

use std::path::{Path, PathBuf};

use crate::error::FilesError;

/// Validate a caller-supplied workspace-relative path.
///
/// Rejects empty paths, absolute paths, backslashes, and any `..`
/// segment. Returns the path joined under `workspace`.
pub fn sanitize_rel_path(workspace: &Path, path: &str) -> Result<PathBuf, FilesError> {
    let reject = || FilesError::UnsafePath {
        path: path.to_string(),
    };

    if path.is_empty() || path.starts_with('/') || path.contains('\\') {
        return Err(reject());
    }
    if path.split('/').any(|seg| seg == ".." || seg == "." || seg.is_empty()) {
        return Err(reject());
    }
    Ok(workspace.join(path))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ws() -> PathBuf {
        PathBuf::from("/data/users/u/projects/p")
    }

    #[test]
    fn test_simple_paths_pass() {
        assert_eq!(
            sanitize_rel_path(&ws(), "index.html").unwrap(),
            ws().join("index.html")
        );
        assert_eq!(
            sanitize_rel_path(&ws(), "assets/sprite.png").unwrap(),
            ws().join("assets/sprite.png")
        );
    }

    #[test]
    fn test_traversal_is_rejected() {
        assert!(sanitize_rel_path(&ws(), "../other").is_err());
        assert!(sanitize_rel_path(&ws(), "a/../../b").is_err());
        assert!(sanitize_rel_path(&ws(), "..").is_err());
    }

    #[test]
    fn test_absolute_is_rejected() {
        assert!(sanitize_rel_path(&ws(), "/etc/passwd").is_err());
    }

    #[test]
    fn test_degenerate_paths_are_rejected() {
        assert!(sanitize_rel_path(&ws(), "").is_err());
        assert!(sanitize_rel_path(&ws(), "a//b").is_err());
        assert!(sanitize_rel_path(&ws(), "./a").is_err());
        assert!(sanitize_rel_path(&ws(), r"a\..\b").is_err());
    }
}
