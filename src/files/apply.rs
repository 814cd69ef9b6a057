//! Direct file-apply path: writes a caller-supplied manifest into the
//! workspace without involving the agent.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::FilesError;
use crate::files::paths::sanitize_rel_path;

/// Manifest entry action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileAction {
    Create,
    Update,
    Delete,
}

/// One manifest entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileEntry {
    pub path: String,
    pub action: FileAction,
    #[serde(default)]
    pub content: Option<String>,
}

/// What an apply run changed.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ApplyReport {
    pub written: Vec<String>,
    pub deleted: Vec<String>,
}

/// Apply a manifest to the workspace. Paths are sanitised before any
/// filesystem operation; the first failure aborts the run.
pub async fn apply_manifest(
    workspace: &Path,
    entries: &[FileEntry],
) -> Result<ApplyReport, FilesError> {
    // Validate everything up front so a bad entry can't leave a
    // half-applied manifest behind it.
    for entry in entries {
        sanitize_rel_path(workspace, &entry.path)?;
    }

    tokio::fs::create_dir_all(workspace).await?;

    let mut report = ApplyReport::default();
    for entry in entries {
        let target = sanitize_rel_path(workspace, &entry.path)?;
        match entry.action {
            FileAction::Create | FileAction::Update => {
                if let Some(parent) = target.parent() {
                    tokio::fs::create_dir_all(parent).await?;
                }
                let content = entry.content.as_deref().unwrap_or_default();
                tokio::fs::write(&target, content).await?;
                report.written.push(entry.path.clone());
            }
            FileAction::Delete => {
                match tokio::fs::remove_file(&target).await {
                    Ok(()) => report.deleted.push(entry.path.clone()),
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => return Err(e.into()),
                }
            }
        }
    }
    Ok(report)
}

/// Error kinds the apply stream reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyErrorKind {
    Permission,
    QuotaExceeded,
    Os,
    Internal,
}

impl ApplyErrorKind {
    pub fn code(self) -> &'static str {
        match self {
            Self::Permission => "PERMISSION_ERROR",
            Self::QuotaExceeded => "QUOTA_EXCEEDED",
            Self::Os => "OS_ERROR",
            Self::Internal => "INTERNAL",
        }
    }

    pub fn user_message(self) -> &'static str {
        match self {
            Self::Permission => "ファイルの書き込みに失敗しました（権限エラー）",
            Self::QuotaExceeded => "ストレージ容量が不足しています",
            Self::Os => "ファイル操作に失敗しました",
            Self::Internal => "内部エラーが発生しました",
        }
    }
}

/// Map an apply failure onto its reported kind.
pub fn classify_apply_error(err: &FilesError) -> ApplyErrorKind {
    match err {
        FilesError::Io(io) => {
            let text = io.to_string();
            if io.kind() == std::io::ErrorKind::PermissionDenied {
                ApplyErrorKind::Permission
            } else if text.contains("Disk quota") || text.contains("No space") {
                ApplyErrorKind::QuotaExceeded
            } else {
                ApplyErrorKind::Os
            }
        }
        FilesError::UnsafePath { .. } | FilesError::NotFound { .. } => ApplyErrorKind::Internal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn entry(path: &str, action: FileAction, content: Option<&str>) -> FileEntry {
        FileEntry {
            path: path.to_string(),
            action,
            content: content.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn test_create_update_delete_roundtrip() {
        let dir = TempDir::new().unwrap();

        let report = apply_manifest(
            dir.path(),
            &[
                entry("index.html", FileAction::Create, Some("<html/>")),
                entry("src/game.js", FileAction::Create, Some("let x;")),
            ],
        )
        .await
        .unwrap();
        assert_eq!(report.written, vec!["index.html", "src/game.js"]);

        let report = apply_manifest(
            dir.path(),
            &[
                entry("index.html", FileAction::Update, Some("<html>2</html>")),
                entry("src/game.js", FileAction::Delete, None),
            ],
        )
        .await
        .unwrap();
        assert_eq!(report.written, vec!["index.html"]);
        assert_eq!(report.deleted, vec!["src/game.js"]);

        let html = tokio::fs::read_to_string(dir.path().join("index.html"))
            .await
            .unwrap();
        assert_eq!(html, "<html>2</html>");
        assert!(!dir.path().join("src/game.js").exists());
    }

    #[tokio::test]
    async fn test_delete_missing_file_is_silent() {
        let dir = TempDir::new().unwrap();
        let report = apply_manifest(
            dir.path(),
            &[entry("ghost.js", FileAction::Delete, None)],
        )
        .await
        .unwrap();
        assert!(report.deleted.is_empty());
    }

    #[tokio::test]
    async fn test_unsafe_path_rejected_before_any_write() {
        let dir = TempDir::new().unwrap();
        let err = apply_manifest(
            dir.path(),
            &[
                entry("ok.js", FileAction::Create, Some("x")),
                entry("../escape.js", FileAction::Create, Some("x")),
            ],
        )
        .await
        .unwrap_err();
        assert!(matches!(err, FilesError::UnsafePath { .. }));
        // Up-front validation: the first entry was not written either.
        assert!(!dir.path().join("ok.js").exists());
    }

    #[tokio::test]
    async fn test_missing_content_writes_empty_file() {
        let dir = TempDir::new().unwrap();
        apply_manifest(dir.path(), &[entry("empty.css", FileAction::Create, None)])
            .await
            .unwrap();
        let content = tokio::fs::read_to_string(dir.path().join("empty.css"))
            .await
            .unwrap();
        assert!(content.is_empty());
    }

    #[test]
    fn test_classify_quota_errors() {
        let err = FilesError::Io(std::io::Error::other("Disk quota exceeded (os error 122)"));
        assert_eq!(classify_apply_error(&err), ApplyErrorKind::QuotaExceeded);

        let err = FilesError::Io(std::io::Error::other("No space left on device"));
        assert_eq!(classify_apply_error(&err), ApplyErrorKind::QuotaExceeded);
    }

    #[test]
    fn test_classify_permission_error() {
        let err = FilesError::Io(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            "denied",
        ));
        assert_eq!(classify_apply_error(&err), ApplyErrorKind::Permission);
    }

    #[test]
    fn test_classify_generic_os_error() {
        let err = FilesError::Io(std::io::Error::other("is a directory"));
        assert_eq!(classify_apply_error(&err), ApplyErrorKind::Os);
    }
}
