//! Sandbox runtime abstraction and the Docker implementation.
//!
//! The lifecycle manager only ever talks to [`SandboxRuntime`], so the
//! warm/cold/race/recover logic is independent of the compute backend.
//! Production uses [`DockerRuntime`]; tests and local development use the
//! in-process runtime from [`super::memory`].

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use bollard::Docker;
use bollard::exec::{CreateExecOptions, StartExecResults};
use bollard::models::{ContainerCreateBody, HostConfig};
use bollard::query_parameters::{
    CreateContainerOptionsBuilder, InspectContainerOptions, RemoveContainerOptionsBuilder,
    StartContainerOptions,
};
use futures::StreamExt;
use tokio::sync::{mpsc, oneshot};

use crate::error::SandboxError;

/// Observed state of a named sandbox.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SandboxState {
    /// The sandbox is running and can accept execs.
    Running,
    /// The runtime still knows the name but the sandbox is unusable
    /// (exited, dead, or timed out). Carries the raw state string.
    Terminated(String),
}

/// Everything needed to create a sandbox.
#[derive(Debug, Clone)]
pub struct CreateSpec {
    pub name: String,
    pub image: String,
    pub env: HashMap<String, String>,
    /// `volume:/mountpoint` bind for the read-write project data volume.
    pub data_bind: String,
    /// `volume:/mountpoint:ro` bind for the global skills volume.
    pub global_bind: String,
    pub memory_bytes: i64,
    pub idle_timeout: Duration,
    pub max_lifetime: Duration,
    /// Network whose routing restricts egress to the filtering proxy.
    pub egress_network: String,
}

/// Output of a short, collected exec.
#[derive(Debug, Clone)]
pub struct ExecOutput {
    pub exit_code: i64,
    /// Merged stdout + stderr.
    pub output: String,
}

impl ExecOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// A streaming exec: merged output lines plus a deferred exit status.
#[derive(Debug)]
pub struct ExecStream {
    /// Merged stdout+stderr, one item per line.
    pub lines: mpsc::Receiver<String>,
    /// Resolves once the process exits. A closed channel means the
    /// runtime lost track of the process; callers treat that as unknown.
    pub exit: oneshot::Receiver<i64>,
}

/// Compute backend for sandboxes.
#[async_trait]
pub trait SandboxRuntime: Send + Sync {
    /// Attach to a sandbox by name. `SandboxError::NotFound` if absent.
    async fn lookup(&self, name: &str) -> Result<SandboxState, SandboxError>;

    /// Create and start a sandbox. `SandboxError::AlreadyExists` if the
    /// name is taken (concurrent arrival won the race).
    async fn create(&self, spec: &CreateSpec) -> Result<(), SandboxError>;

    /// Remove a sandbox, tolerating absence.
    async fn remove(&self, name: &str) -> Result<(), SandboxError>;

    /// Run a command and collect its merged output.
    async fn exec_collect(&self, name: &str, cmd: &[String])
    -> Result<ExecOutput, SandboxError>;

    /// Run a command and stream its merged output line by line.
    async fn exec_stream(&self, name: &str, cmd: &[String])
    -> Result<ExecStream, SandboxError>;
}

/// Label keys recorded on every sandbox container.
pub const LABEL_MANAGED: &str = "app.dreamcore.managed";
pub const LABEL_IDLE_TIMEOUT: &str = "app.dreamcore.idle-timeout-secs";
pub const LABEL_MAX_LIFETIME: &str = "app.dreamcore.max-lifetime-secs";

/// Docker-backed sandbox runtime.
pub struct DockerRuntime {
    docker: Docker,
}

impl DockerRuntime {
    /// Connect to the local Docker daemon.
    pub fn connect() -> Result<Self, SandboxError> {
        let docker = Docker::connect_with_local_defaults().map_err(|e| {
            SandboxError::RuntimeUnavailable {
                reason: e.to_string(),
            }
        })?;
        Ok(Self { docker })
    }

    fn is_status(err: &bollard::errors::Error, code: u16) -> bool {
        matches!(
            err,
            bollard::errors::Error::DockerResponseServerError { status_code, .. }
                if *status_code == code
        )
    }
}

#[async_trait]
impl SandboxRuntime for DockerRuntime {
    async fn lookup(&self, name: &str) -> Result<SandboxState, SandboxError> {
        let inspect = self
            .docker
            .inspect_container(name, None::<InspectContainerOptions>)
            .await
            .map_err(|e| {
                if Self::is_status(&e, 404) {
                    SandboxError::NotFound {
                        name: name.to_string(),
                    }
                } else {
                    SandboxError::Runtime(e)
                }
            })?;

        let state = inspect.state.as_ref();
        let running = state.and_then(|s| s.running).unwrap_or(false);
        if running {
            Ok(SandboxState::Running)
        } else {
            let status = state
                .and_then(|s| s.status.as_ref())
                .map(|s| s.to_string())
                .unwrap_or_else(|| "unknown".to_string());
            Ok(SandboxState::Terminated(status))
        }
    }

    async fn create(&self, spec: &CreateSpec) -> Result<(), SandboxError> {
        let env: Vec<String> = spec
            .env
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect();

        let labels = HashMap::from([
            (LABEL_MANAGED.to_string(), "true".to_string()),
            (
                LABEL_IDLE_TIMEOUT.to_string(),
                spec.idle_timeout.as_secs().to_string(),
            ),
            (
                LABEL_MAX_LIFETIME.to_string(),
                spec.max_lifetime.as_secs().to_string(),
            ),
        ]);

        let body = ContainerCreateBody {
            image: Some(spec.image.clone()),
            env: Some(env),
            labels: Some(labels),
            // The sandbox idles until execs arrive; the reaper removes it.
            cmd: Some(vec!["sleep".to_string(), "infinity".to_string()]),
            host_config: Some(HostConfig {
                binds: Some(vec![spec.data_bind.clone(), spec.global_bind.clone()]),
                memory: Some(spec.memory_bytes),
                network_mode: Some(spec.egress_network.clone()),
                ..Default::default()
            }),
            ..Default::default()
        };

        let options = CreateContainerOptionsBuilder::default()
            .name(&spec.name)
            .build();
        self.docker
            .create_container(Some(options), body)
            .await
            .map_err(|e| {
                if Self::is_status(&e, 409) {
                    SandboxError::AlreadyExists {
                        name: spec.name.clone(),
                    }
                } else {
                    SandboxError::CreationFailed {
                        reason: e.to_string(),
                    }
                }
            })?;

        self.docker
            .start_container(&spec.name, None::<StartContainerOptions>)
            .await
            .map_err(|e| SandboxError::CreationFailed {
                reason: format!("start failed: {e}"),
            })?;

        Ok(())
    }

    async fn remove(&self, name: &str) -> Result<(), SandboxError> {
        let options = RemoveContainerOptionsBuilder::default().force(true).build();
        match self.docker.remove_container(name, Some(options)).await {
            Ok(()) => Ok(()),
            Err(e) if Self::is_status(&e, 404) => Ok(()),
            Err(e) => Err(SandboxError::Runtime(e)),
        }
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
        let exec = self
            .docker
            .create_exec(
                name,
                CreateExecOptions {
                    cmd: Some(cmd.to_vec()),
                    attach_stdout: Some(true),
                    attach_stderr: Some(true),
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| SandboxError::ExecFailed {
                name: name.to_string(),
                reason: e.to_string(),
            })?;

        let started = self
            .docker
            .start_exec(&exec.id, None)
            .await
            .map_err(|e| SandboxError::ExecFailed {
                name: name.to_string(),
                reason: e.to_string(),
            })?;

        let StartExecResults::Attached { mut output, .. } = started else {
            return Err(SandboxError::ExecFailed {
                name: name.to_string(),
                reason: "exec started detached".to_string(),
            });
        };

        let (line_tx, line_rx) = mpsc::channel(64);
        let (exit_tx, exit_rx) = oneshot::channel();
        let docker = self.docker.clone();
        let exec_id = exec.id.clone();

        tokio::spawn(async move {
            // Lines can span chunk boundaries; carry the partial tail.
            let mut partial: Vec<u8> = Vec::new();
            while let Some(chunk) = output.next().await {
                let bytes = match chunk {
                    Ok(log) => log.into_bytes(),
                    Err(e) => {
                        tracing::warn!("exec output stream error: {e}");
                        break;
                    }
                };
                partial.extend_from_slice(&bytes);
                while let Some(pos) = partial.iter().position(|&b| b == b'\n') {
                    let line: Vec<u8> = partial.drain(..=pos).collect();
                    let text = String::from_utf8_lossy(&line[..line.len() - 1]).into_owned();
                    if line_tx.send(text).await.is_err() {
                        return;
                    }
                }
            }
            if !partial.is_empty() {
                let _ = line_tx
                    .send(String::from_utf8_lossy(&partial).into_owned())
                    .await;
            }
            drop(line_tx);

            let exit_code = match docker.inspect_exec(&exec_id).await {
                Ok(inspect) => inspect.exit_code.unwrap_or(-1),
                Err(e) => {
                    tracing::warn!("inspect_exec failed: {e}");
                    -1
                }
            };
            let _ = exit_tx.send(exit_code);
        });

        Ok(ExecStream {
            lines: line_rx,
            exit: exit_rx,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exec_output_success() {
        let ok = ExecOutput {
            exit_code: 0,
            output: String::new(),
        };
        let fail = ExecOutput {
            exit_code: 1,
            output: String::new(),
        };
        assert!(ok.success());
        assert!(!fail.success());
    }

    #[test]
    fn test_sandbox_state_equality() {
        assert_eq!(SandboxState::Running, SandboxState::Running);
        assert_ne!(
            SandboxState::Running,
            SandboxState::Terminated("exited".to_string())
        );
    }
}
