//! Per-project embedded version store.
//!
//! Each workspace carries its own git repository with a fixed author
//! identity. The repository lives on a shared volume whose ownership
//! rarely matches the calling process, so every git invocation carries a
//! `safe.directory` override. Restore is deliberately code-only: assets
//! regenerate, code does not.

use std::path::Path;
use std::process::Output;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use tokio::process::Command;

use crate::error::VcsError;

/// Author identity stamped on every orchestrator commit.
const AUTHOR_NAME: &str = "DreamCore";
const AUTHOR_EMAIL: &str = "ai@dreamcore.app";

/// Files restore is allowed to touch. Assets stay as they are.
pub const RESTORE_PATTERNS: &[&str] = &[
    "index.html",
    "*.js",
    "*.css",
    "SPEC.md",
    "STYLE.md",
    "PUBLISH.json",
];

static HASH_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9a-f]{7,40}$").expect("hash regex"));

/// One entry in a project's history.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct CommitInfo {
    pub hash: String,
    pub message: String,
    /// ISO-8601 committer date as git produced it.
    pub date: String,
}

/// Result of reading a project's history.
#[derive(Debug, Clone, Serialize)]
pub struct ProjectLog {
    pub commits: Vec<CommitInfo>,
    /// True when the repository was created by this very call.
    #[serde(rename = "autoInitialized")]
    pub auto_initialized: bool,
}

/// Git-backed version store for project workspaces.
#[derive(Debug, Clone, Default)]
pub struct GitStore;

impl GitStore {
    pub fn new() -> Self {
        Self
    }

    /// Stage everything and commit. Returns the new short hash, or
    /// `None` when the working tree had nothing to commit.
    pub async fn commit_all(
        &self,
        workspace: &Path,
        message: &str,
    ) -> Result<Option<String>, VcsError> {
        if !workspace.is_dir() {
            return Err(VcsError::ProjectNotFound {
                path: workspace.display().to_string(),
            });
        }

        if !workspace.join(".git").is_dir() {
            let out = git(workspace, &["init"]).await?;
            check(&out, "init")?;
        }

        let out = git(workspace, &["add", "-A"]).await?;
        check(&out, "add")?;

        let out = git(
            workspace,
            &[
                "-c",
                &format!("user.name={AUTHOR_NAME}"),
                "-c",
                &format!("user.email={AUTHOR_EMAIL}"),
                "commit",
                "-m",
                message,
            ],
        )
        .await?;
        if !out.status.success() {
            let text = merged(&out);
            if text.contains("nothing to commit") || text.contains("nothing added to commit") {
                return Ok(None);
            }
            return Err(VcsError::CommandFailed {
                op: "commit".to_string(),
                detail: text,
            });
        }

        let out = git(workspace, &["rev-parse", "--short", "HEAD"]).await?;
        check(&out, "rev-parse")?;
        Ok(Some(stdout(&out).trim().to_string()))
    }

    /// Full history, newest first. A project directory without a
    /// repository is snapshotted on the spot and reported as such.
    pub async fn log(&self, workspace: &Path) -> Result<ProjectLog, VcsError> {
        if !workspace.is_dir() {
            return Err(VcsError::ProjectNotFound {
                path: workspace.display().to_string(),
            });
        }

        let mut auto_initialized = false;
        if !workspace.join(".git").is_dir() {
            self.commit_all(workspace, "Initial commit").await?;
            auto_initialized = true;
        }

        // %x1f keeps the separator out of any commit message.
        let out = git(
            workspace,
            &["log", "--pretty=format:%h%x1f%s%x1f%cI"],
        )
        .await?;
        if !out.status.success() {
            // A repository with no commits yet has an empty history.
            if merged(&out).contains("does not have any commits") {
                return Ok(ProjectLog {
                    commits: Vec::new(),
                    auto_initialized,
                });
            }
            return Err(VcsError::CommandFailed {
                op: "log".to_string(),
                detail: merged(&out),
            });
        }

        let commits = stdout(&out)
            .lines()
            .filter_map(|line| {
                let mut parts = line.splitn(3, '\u{1f}');
                Some(CommitInfo {
                    hash: parts.next()?.to_string(),
                    message: parts.next()?.to_string(),
                    date: parts.next()?.to_string(),
                })
            })
            .collect();

        Ok(ProjectLog {
            commits,
            auto_initialized,
        })
    }

    /// Diff a commit against its parent; for a root commit, fall back to
    /// the full commit contents.
    pub async fn diff(&self, workspace: &Path, commit: &str) -> Result<String, VcsError> {
        self.verify_commit(workspace, commit).await?;

        let range = format!("{commit}^..{commit}");
        let out = git(workspace, &["diff", &range]).await?;
        if out.status.success() {
            return Ok(stdout(&out));
        }

        let out = git(workspace, &["show", commit]).await?;
        check(&out, "show")?;
        Ok(stdout(&out))
    }

    /// Check out the code-only allow-list at `commit`. Patterns with no
    /// match in that commit are skipped silently. Returns the files the
    /// commit itself changed.
    pub async fn restore(
        &self,
        workspace: &Path,
        commit: &str,
    ) -> Result<Vec<String>, VcsError> {
        self.verify_commit(workspace, commit).await?;

        for pattern in RESTORE_PATTERNS {
            let out = git(workspace, &["checkout", commit, "--", pattern]).await?;
            if !out.status.success() {
                tracing::debug!(pattern, commit, "restore pattern skipped: {}", merged(&out));
            }
        }

        let out = git(
            workspace,
            &["diff-tree", "--no-commit-id", "--name-only", "-r", commit],
        )
        .await?;
        check(&out, "diff-tree")?;
        Ok(stdout(&out)
            .lines()
            .map(str::to_string)
            .filter(|l| !l.is_empty())
            .collect())
    }

    async fn verify_commit(&self, workspace: &Path, commit: &str) -> Result<(), VcsError> {
        if !HASH_RE.is_match(commit) {
            return Err(VcsError::InvalidHash {
                hash: commit.to_string(),
            });
        }
        let probe = format!("{commit}^{{commit}}");
        let out = git(workspace, &["cat-file", "-e", &probe]).await?;
        if !out.status.success() {
            return Err(VcsError::UnknownCommit {
                hash: commit.to_string(),
            });
        }
        Ok(())
    }
}

async fn git(workspace: &Path, args: &[&str]) -> Result<Output, VcsError> {
    Command::new("git")
        .arg("-c")
        .arg("safe.directory=*")
        .current_dir(workspace)
        .args(args)
        .output()
        .await
        .map_err(VcsError::Io)
}

fn check(out: &Output, op: &str) -> Result<(), VcsError> {
    if out.status.success() {
        Ok(())
    } else {
        Err(VcsError::CommandFailed {
            op: op.to_string(),
            detail: merged(out),
        })
    }
}

fn stdout(out: &Output) -> String {
    String::from_utf8_lossy(&out.stdout).into_owned()
}

fn merged(out: &Output) -> String {
    format!(
        "{}{}",
        String::from_utf8_lossy(&out.stdout),
        String::from_utf8_lossy(&out.stderr)
    )
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
    async fn test_commit_all_initialises_and_commits() {
        let dir = TempDir::new().unwrap();
        let store = GitStore::new();
        write(dir.path(), "index.html", "<html></html>").await;

        let hash = store.commit_all(dir.path(), "First").await.unwrap();
        assert!(hash.is_some());
        assert!(dir.path().join(".git").is_dir());
    }

    #[tokio::test]
    async fn test_commit_all_nothing_to_commit_is_silent() {
        let dir = TempDir::new().unwrap();
        let store = GitStore::new();
        write(dir.path(), "a.js", "1").await;

        assert!(store.commit_all(dir.path(), "one").await.unwrap().is_some());
        // Identical tree: second commit is a no-op, not an error.
        assert!(store.commit_all(dir.path(), "two").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_commit_all_missing_workspace() {
        let store = GitStore::new();
        let err = store
            .commit_all(Path::new("/nonexistent/workspace"), "x")
            .await
            .unwrap_err();
        assert!(matches!(err, VcsError::ProjectNotFound { .. }));
    }

    #[tokio::test]
    async fn test_log_is_newest_first() {
        let dir = TempDir::new().unwrap();
        let store = GitStore::new();
        write(dir.path(), "a.js", "1").await;
        store.commit_all(dir.path(), "first").await.unwrap();
        write(dir.path(), "a.js", "2").await;
        store.commit_all(dir.path(), "second").await.unwrap();

        let log = store.log(dir.path()).await.unwrap();
        assert!(!log.auto_initialized);
        assert_eq!(log.commits.len(), 2);
        assert_eq!(log.commits[0].message, "second");
        assert_eq!(log.commits[1].message, "first");
        // Committer dates come out ISO-8601.
        assert!(log.commits[0].date.contains('T'));
    }

    #[tokio::test]
    async fn test_log_auto_initialises_unversioned_project() {
        let dir = TempDir::new().unwrap();
        let store = GitStore::new();
        write(dir.path(), "index.html", "x").await;

        let log = store.log(dir.path()).await.unwrap();
        assert!(log.auto_initialized);
        assert_eq!(log.commits.len(), 1);
        assert_eq!(log.commits[0].message, "Initial commit");
    }

    #[tokio::test]
    async fn test_diff_rejects_malformed_hash() {
        let dir = TempDir::new().unwrap();
        let store = GitStore::new();
        write(dir.path(), "a.js", "1").await;
        store.commit_all(dir.path(), "first").await.unwrap();

        for bad in ["abc", "HEAD", "main", "zzzzzzzz", "abc1234; rm -rf /"] {
            assert!(matches!(
                store.diff(dir.path(), bad).await.unwrap_err(),
                VcsError::InvalidHash { .. }
            ));
        }
    }

    #[tokio::test]
    async fn test_diff_unknown_commit() {
        let dir = TempDir::new().unwrap();
        let store = GitStore::new();
        write(dir.path(), "a.js", "1").await;
        store.commit_all(dir.path(), "first").await.unwrap();

        assert!(matches!(
            store.diff(dir.path(), "deadbeef0").await.unwrap_err(),
            VcsError::UnknownCommit { .. }
        ));
    }

    #[tokio::test]
    async fn test_diff_root_commit_falls_back_to_show() {
        let dir = TempDir::new().unwrap();
        let store = GitStore::new();
        write(dir.path(), "a.js", "let x = 1;").await;
        let hash = store.commit_all(dir.path(), "root").await.unwrap().unwrap();

        let diff = store.diff(dir.path(), &hash).await.unwrap();
        assert!(diff.contains("let x = 1;"));
    }

    #[tokio::test]
    async fn test_diff_against_parent() {
        let dir = TempDir::new().unwrap();
        let store = GitStore::new();
        write(dir.path(), "a.js", "old").await;
        store.commit_all(dir.path(), "first").await.unwrap();
        write(dir.path(), "a.js", "new").await;
        let hash = store.commit_all(dir.path(), "second").await.unwrap().unwrap();

        let diff = store.diff(dir.path(), &hash).await.unwrap();
        assert!(diff.contains("-old"));
        assert!(diff.contains("+new"));
    }

    #[tokio::test]
    async fn test_restore_is_code_only() {
        let dir = TempDir::new().unwrap();
        let store = GitStore::new();

        write(dir.path(), "index.html", "v1").await;
        write(dir.path(), "game.js", "v1").await;
        let c1 = store.commit_all(dir.path(), "c1").await.unwrap().unwrap();

        write(dir.path(), "index.html", "v2").await;
        write(dir.path(), "game.js", "v2").await;
        write(dir.path(), "assets/sprite.png", "binary-ish").await;
        store.commit_all(dir.path(), "c2").await.unwrap();

        let changed = store.restore(dir.path(), &c1).await.unwrap();

        // Code files return to their c1 contents.
        let html = tokio::fs::read_to_string(dir.path().join("index.html"))
            .await
            .unwrap();
        let js = tokio::fs::read_to_string(dir.path().join("game.js"))
            .await
            .unwrap();
        assert_eq!(html, "v1");
        assert_eq!(js, "v1");

        // The asset written later survives the restore.
        assert!(dir.path().join("assets/sprite.png").exists());

        // The reported files are those changed in c1 itself.
        assert!(changed.contains(&"index.html".to_string()));
        assert!(changed.contains(&"game.js".to_string()));
    }

    #[tokio::test]
    async fn test_restore_missing_patterns_are_not_errors() {
        let dir = TempDir::new().unwrap();
        let store = GitStore::new();
        // Only one of the allow-listed names exists.
        write(dir.path(), "index.html", "v1").await;
        let c1 = store.commit_all(dir.path(), "c1").await.unwrap().unwrap();

        assert!(store.restore(dir.path(), &c1).await.is_ok());
    }
}
