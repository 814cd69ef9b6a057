//! In-process sandbox runtime.
//!
//! Backs the test suite and `--runtime memory` local development, where
//! neither Docker nor the agent CLI is available. Execs are answered from
//! scripted responses registered by the caller; unscripted commands
//! succeed with no output, which is what most bootstrap commands
//! (mkdir, chown, base64 decode) would do anyway.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::{Mutex, mpsc, oneshot};

use crate::error::SandboxError;
use crate::sandbox::runtime::{
    CreateSpec, ExecOutput, ExecStream, SandboxRuntime, SandboxState,
};

/// A canned exec response, matched by substring against the joined command.
#[derive(Debug, Clone)]
pub struct ExecScript {
    pub when: String,
    pub lines: Vec<String>,
    pub exit_code: i64,
}

#[derive(Default)]
struct Inner {
    sandboxes: HashMap<String, (CreateSpec, SandboxState)>,
    scripts: Vec<ExecScript>,
    exec_log: Vec<String>,
    /// When set, the next create fails AlreadyExists after inserting the
    /// sandbox, as though a concurrent arrival created it first.
    race_on_next_create: bool,
}

/// Scriptable in-memory [`SandboxRuntime`].
#[derive(Default)]
pub struct MemoryRuntime {
    inner: Arc<Mutex<Inner>>,
    created: AtomicUsize,
}

impl MemoryRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a canned response for commands containing `when`.
    pub async fn script(&self, when: &str, lines: &[&str], exit_code: i64) {
        self.inner.lock().await.scripts.push(ExecScript {
            when: when.to_string(),
            lines: lines.iter().map(|s| s.to_string()).collect(),
            exit_code,
        });
    }

    /// Force the next create to lose the creation race.
    pub async fn race_next_create(&self) {
        self.inner.lock().await.race_on_next_create = true;
    }

    /// Flip an existing sandbox into a terminated state.
    pub async fn mark_terminated(&self, name: &str, status: &str) {
        if let Some(entry) = self.inner.lock().await.sandboxes.get_mut(name) {
            entry.1 = SandboxState::Terminated(status.to_string());
        }
    }

    /// Every command executed so far, joined with spaces.
    pub async fn exec_log(&self) -> Vec<String> {
        self.inner.lock().await.exec_log.clone()
    }

    /// Names of sandboxes currently known to the runtime.
    pub async fn sandbox_names(&self) -> Vec<String> {
        self.inner.lock().await.sandboxes.keys().cloned().collect()
    }

    /// How many creates have succeeded (race losses included).
    pub fn created_count(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SandboxRuntime for MemoryRuntime {
    async fn lookup(&self, name: &str) -> Result<SandboxState, SandboxError> {
        self.inner
            .lock()
            .await
            .sandboxes
            .get(name)
            .map(|(_, state)| state.clone())
            .ok_or_else(|| SandboxError::NotFound {
                name: name.to_string(),
            })
    }

    async fn create(&self, spec: &CreateSpec) -> Result<(), SandboxError> {
        let mut inner = self.inner.lock().await;
        if inner.sandboxes.contains_key(&spec.name) {
            return Err(SandboxError::AlreadyExists {
                name: spec.name.clone(),
            });
        }
        if inner.race_on_next_create {
            inner.race_on_next_create = false;
            inner
                .sandboxes
                .insert(spec.name.clone(), (spec.clone(), SandboxState::Running));
            self.created.fetch_add(1, Ordering::SeqCst);
            return Err(SandboxError::AlreadyExists {
                name: spec.name.clone(),
            });
        }
        inner
            .sandboxes
            .insert(spec.name.clone(), (spec.clone(), SandboxState::Running));
        self.created.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn remove(&self, name: &str) -> Result<(), SandboxError> {
        self.inner.lock().await.sandboxes.remove(name);
        Ok(())
    }

    async fn exec_collect(
        &self,
        name: &str,
        cmd: &[String],
    ) -> Result<ExecOutput, SandboxError> {
        let mut stream = self.exec_stream(name, cmd).await?;
        let mut output = String::new();
        while let Some(line) = stream.lines.recv().await {
            output.push_str(&line);
            output.push('\n');
        }
        let exit_code = stream.exit.await.unwrap_or(-1);
        Ok(ExecOutput { exit_code, output })
    }

    async fn exec_stream(
        &self,
        name: &str,
        cmd: &[String],
    ) -> Result<ExecStream, SandboxError> {
        let mut inner = self.inner.lock().await;
        if !inner.sandboxes.contains_key(name) {
            return Err(SandboxError::NotFound {
                name: name.to_string(),
            });
        }
        let joined = cmd.join(" ");
        inner.exec_log.push(joined.clone());
        let script = inner
            .scripts
            .iter()
            .find(|s| joined.contains(&s.when))
            .cloned();
        drop(inner);

        let (lines, exit_code) = match script {
            Some(s) => (s.lines, s.exit_code),
            None => (Vec::new(), 0),
        };

        let (line_tx, line_rx) = mpsc::channel(64);
        let (exit_tx, exit_rx) = oneshot::channel();
        tokio::spawn(async move {
            for line in lines {
                if line_tx.send(line).await.is_err() {
                    return;
                }
            }
            drop(line_tx);
            let _ = exit_tx.send(exit_code);
        });

        Ok(ExecStream {
            lines: line_rx,
            exit: exit_rx,
        })
    }
}
