//! Read-only file serving from a workspace.

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::FilesError;
use crate::files::paths::sanitize_rel_path;

/// Resolve a requested file inside the workspace.
///
/// A missing `index.html` falls back to the first non-hidden `*.html` in
/// the workspace root, so older projects whose entry point predates the
/// fixed name keep serving.
pub async fn resolve_file(workspace: &Path, path: &str) -> Result<PathBuf, FilesError> {
    let target = sanitize_rel_path(workspace, path)?;
    if target.is_file() {
        return Ok(target);
    }

    if path == "index.html" {
        if let Some(fallback) = first_html(workspace).await {
            return Ok(fallback);
        }
    }

    Err(FilesError::NotFound {
        path: path.to_string(),
    })
}

async fn first_html(workspace: &Path) -> Option<PathBuf> {
    let mut entries = tokio::fs::read_dir(workspace).await.ok()?;
    let mut candidates = Vec::new();
    while let Ok(Some(entry)) = entries.next_entry().await {
        let name = entry.file_name().to_string_lossy().into_owned();
        if !name.starts_with('.')
            && name.ends_with(".html")
            && entry.file_type().await.map(|t| t.is_file()).unwrap_or(false)
        {
            candidates.push(entry.path());
        }
    }
    candidates.sort();
    candidates.into_iter().next()
}

/// Cache-Control policy by content type: HTML is never cached (it is the
/// mutable entry point), static assets cache for an hour, everything
/// else revalidates.
pub fn cache_control_for(mime: &mime_guess::Mime) -> &'static str {
    use mime_guess::mime;

    if mime.type_() == mime::TEXT && mime.subtype() == mime::HTML {
        return "no-store";
    }
    let cacheable = mime.type_() == mime::IMAGE
        || mime.type_() == mime::AUDIO
        || mime.type_() == mime::FONT
        || (mime.type_() == mime::TEXT && mime.subtype() == mime::CSS)
        || (mime.type_() == mime::APPLICATION && mime.subtype() == mime::JAVASCRIPT)
        || (mime.type_() == mime::TEXT && mime.subtype() == mime::JAVASCRIPT);
    if cacheable {
        "public, max-age=3600"
    } else {
        "no-cache"
    }
}

/// One entry in a workspace listing.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct FileMeta {
    pub path: String,
    pub size: u64,
}

/// Recursively list workspace files, skipping hidden entries (which
/// covers the version store and the prompt-staging file).
pub async fn list_files(workspace: &Path) -> Result<Vec<FileMeta>, FilesError> {
    let mut out = Vec::new();
    let mut stack = vec![workspace.to_path_buf()];

    while let Some(dir) = stack.pop() {
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with('.') {
                continue;
            }
            let path = entry.path();
            let meta = entry.metadata().await?;
            if meta.is_dir() {
                stack.push(path);
            } else if meta.is_file() {
                let rel = path
                    .strip_prefix(workspace)
                    .unwrap_or(&path)
                    .to_string_lossy()
                    .into_owned();
                out.push(FileMeta {
                    path: rel,
                    size: meta.len(),
                });
            }
        }
    }

    out.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn write(dir: &Path, name: &str, content: &str) {
        if let Some(parent) = dir.join(name).parent() {
            tokio::fs::create_dir_all(parent).await.unwrap();
        }
        tokio::fs::write(dir.join(name), content).await.unwrap();
    }

    #[tokio::test]
    async fn test_resolve_existing_file() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "index.html", "x").await;
        let path = resolve_file(dir.path(), "index.html").await.unwrap();
        assert_eq!(path, dir.path().join("index.html"));
    }

    #[tokio::test]
    async fn test_index_falls_back_to_first_html() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "game.html", "x").await;
        write(dir.path(), "about.html", "x").await;
        write(dir.path(), ".hidden.html", "x").await;

        let path = resolve_file(dir.path(), "index.html").await.unwrap();
        assert_eq!(path, dir.path().join("about.html"));
    }

    #[tokio::test]
    async fn test_missing_non_index_is_not_found() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "game.html", "x").await;
        assert!(matches!(
            resolve_file(dir.path(), "style.css").await.unwrap_err(),
            FilesError::NotFound { .. }
        ));
    }

    #[tokio::test]
    async fn test_resolve_rejects_traversal() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            resolve_file(dir.path(), "../secret").await.unwrap_err(),
            FilesError::UnsafePath { .. }
        ));
    }

    #[test]
    fn test_cache_control_table() {
        let mime = |name: &str| mime_guess::from_path(name).first_or_octet_stream();
        assert_eq!(cache_control_for(&mime("index.html")), "no-store");
        assert_eq!(cache_control_for(&mime("sprite.png")), "public, max-age=3600");
        assert_eq!(cache_control_for(&mime("theme.mp3")), "public, max-age=3600");
        assert_eq!(cache_control_for(&mime("style.css")), "public, max-age=3600");
        assert_eq!(cache_control_for(&mime("game.js")), "public, max-age=3600");
        assert_eq!(cache_control_for(&mime("data.bin")), "no-cache");
        assert_eq!(cache_control_for(&mime("SPEC.md")), "no-cache");
    }

    #[tokio::test]
    async fn test_list_files_skips_hidden() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "index.html", "abc").await;
        write(dir.path(), "assets/sprite.png", "pngdata").await;
        write(dir.path(), ".git/config", "x").await;
        write(dir.path(), ".prompt.txt", "x").await;

        let files = list_files(dir.path()).await.unwrap();
        let paths: Vec<_> = files.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["assets/sprite.png", "index.html"]);
        assert_eq!(files[1].size, 3);
    }

    #[tokio::test]
    async fn test_list_files_missing_workspace_is_empty() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("nope");
        assert!(list_files(&missing).await.unwrap().is_empty());
    }
}
