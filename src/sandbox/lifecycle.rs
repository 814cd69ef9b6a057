//! Sandbox lifecycle: lookup-or-create under race, bad-state recovery,
//! disposable sandboxes, and idle reaping.
//!
//! `acquire` is an explicit three-branch state check (warm / cold /
//! recreate) with a race fall-through, not nested error handling: when a
//! create loses to a concurrent arrival it re-attempts the lookup and
//! returns the rival's sandbox as reused.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::config::{
    Config, SANDBOX_IDLE_TIMEOUT, SANDBOX_MAX_LIFETIME, SANDBOX_MEMORY_BYTES,
};
use crate::error::SandboxError;
use crate::proxy::ProxyCredentials;
use crate::sandbox::credentials;
use crate::sandbox::name::sandbox_name;
use crate::sandbox::runtime::{CreateSpec, SandboxRuntime, SandboxState};

/// Status strings surfaced to the client as `status` events.
pub const STATUS_WARM: &str = "Sandbox connected (warm)";
pub const STATUS_CREATING: &str = "Creating sandbox";
pub const STATUS_RECREATING: &str = "Recreating sandbox";

/// Wall-clock cap for a disposable sandbox.
const DISPOSABLE_MAX_LIFETIME: std::time::Duration = std::time::Duration::from_secs(60);

/// Result of acquiring a project sandbox.
#[derive(Debug, Clone)]
pub struct AcquireOutcome {
    pub name: String,
    /// Whether an existing warm sandbox was attached.
    pub reused: bool,
    /// Client-facing status line for this branch.
    pub status: &'static str,
}

#[derive(Debug, Clone, Copy)]
struct Tracked {
    created_at: Instant,
    last_used: Instant,
}

/// Manages the warm pool of named project sandboxes.
pub struct SandboxManager {
    runtime: Arc<dyn SandboxRuntime>,
    config: Arc<Config>,
    proxy: ProxyCredentials,
    tracked: Mutex<HashMap<String, Tracked>>,
}

impl SandboxManager {
    pub fn new(runtime: Arc<dyn SandboxRuntime>, config: Arc<Config>) -> Self {
        let proxy = ProxyCredentials::from_config(&config);
        Self {
            runtime,
            config,
            proxy,
            tracked: Mutex::new(HashMap::new()),
        }
    }

    pub fn runtime(&self) -> &Arc<dyn SandboxRuntime> {
        &self.runtime
    }

    pub fn proxy(&self) -> &ProxyCredentials {
        &self.proxy
    }

    /// Acquire the named sandbox for a `(user, project)` pair, creating,
    /// reusing, or recreating it as needed.
    pub async fn acquire(
        &self,
        user_id: &str,
        project_id: &str,
    ) -> Result<AcquireOutcome, SandboxError> {
        let name = sandbox_name(user_id, project_id);

        match self.runtime.lookup(&name).await {
            Ok(SandboxState::Running) => {
                self.touch(&name).await;
                tracing::info!(sandbox = %name, "warm attach");
                return Ok(AcquireOutcome {
                    name,
                    reused: true,
                    status: STATUS_WARM,
                });
            }
            Ok(SandboxState::Terminated(state)) => {
                tracing::info!(sandbox = %name, %state, "recreating terminated sandbox");
                self.runtime.remove(&name).await?;
                self.create_project_sandbox(&name).await?;
                return Ok(AcquireOutcome {
                    name,
                    reused: false,
                    status: STATUS_RECREATING,
                });
            }
            Err(SandboxError::NotFound { .. }) => {}
            Err(e) => return Err(e),
        }

        match self.create_project_sandbox(&name).await {
            Ok(()) => Ok(AcquireOutcome {
                name,
                reused: false,
                status: STATUS_CREATING,
            }),
            Err(SandboxError::AlreadyExists { .. }) => {
                // Lost the creation race; the winner's sandbox serves us.
                match self.runtime.lookup(&name).await? {
                    SandboxState::Running => {
                        self.touch(&name).await;
                        tracing::info!(sandbox = %name, "attached after losing creation race");
                        Ok(AcquireOutcome {
                            name,
                            reused: true,
                            status: STATUS_WARM,
                        })
                    }
                    SandboxState::Terminated(state) => Err(SandboxError::BadState {
                        name,
                        state,
                    }),
                }
            }
            Err(e) => Err(e),
        }
    }

    /// Create a throwaway sandbox for a lightweight-model invocation.
    /// Half the memory of a project sandbox, 60 s lifetime, no reuse.
    pub async fn create_disposable(&self) -> Result<String, SandboxError> {
        let name = format!("dreamcore-tmp-{}", uuid::Uuid::new_v4().simple());
        let spec = CreateSpec {
            memory_bytes: SANDBOX_MEMORY_BYTES / 2,
            idle_timeout: DISPOSABLE_MAX_LIFETIME,
            max_lifetime: DISPOSABLE_MAX_LIFETIME,
            ..self.base_spec(&name)
        };
        self.runtime.create(&spec).await?;
        credentials::bootstrap(self.runtime.as_ref(), &name, &self.config).await?;
        self.track(&name).await;
        Ok(name)
    }

    /// Remove a sandbox and forget it.
    pub async fn remove(&self, name: &str) -> Result<(), SandboxError> {
        self.runtime.remove(name).await?;
        self.tracked.lock().await.remove(name);
        Ok(())
    }

    /// Reap sandboxes past their idle timeout or max lifetime.
    ///
    /// Covers sandboxes this orchestrator created or attached to; a
    /// runtime that expires sandboxes natively makes this a no-op.
    pub async fn reap_idle(&self) -> usize {
        let now = Instant::now();
        let expired: Vec<String> = {
            let tracked = self.tracked.lock().await;
            tracked
                .iter()
                .filter(|(_, t)| {
                    now.duration_since(t.last_used) >= SANDBOX_IDLE_TIMEOUT
                        || now.duration_since(t.created_at) >= SANDBOX_MAX_LIFETIME
                })
                .map(|(name, _)| name.clone())
                .collect()
        };

        let mut reaped = 0;
        for name in expired {
            match self.remove(&name).await {
                Ok(()) => {
                    tracing::info!(sandbox = %name, "reaped idle sandbox");
                    reaped += 1;
                }
                Err(e) => tracing::warn!(sandbox = %name, "reap failed: {e}"),
            }
        }
        reaped
    }

    async fn create_project_sandbox(&self, name: &str) -> Result<(), SandboxError> {
        let spec = self.base_spec(name);
        self.runtime.create(&spec).await?;
        credentials::bootstrap(self.runtime.as_ref(), name, &self.config).await?;
        self.track(name).await;
        Ok(())
    }

    fn base_spec(&self, name: &str) -> CreateSpec {
        CreateSpec {
            name: name.to_string(),
            image: self.config.sandbox_image.clone(),
            env: credentials::credential_env(&self.config, &self.proxy)
                .into_iter()
                .collect(),
            data_bind: format!(
                "{}:{}",
                self.config.data_volume,
                self.config.data_root.display()
            ),
            global_bind: format!(
                "{}:{}:ro",
                self.config.global_volume,
                self.config.global_root.display()
            ),
            memory_bytes: SANDBOX_MEMORY_BYTES,
            idle_timeout: SANDBOX_IDLE_TIMEOUT,
            max_lifetime: SANDBOX_MAX_LIFETIME,
            egress_network: self.config.egress_network.clone(),
        }
    }

    async fn track(&self, name: &str) {
        let now = Instant::now();
        self.tracked.lock().await.insert(
            name.to_string(),
            Tracked {
                created_at: now,
                last_used: now,
            },
        );
    }

    async fn touch(&self, name: &str) {
        let now = Instant::now();
        self.tracked
            .lock()
            .await
            .entry(name.to_string())
            .and_modify(|t| t.last_used = now)
            .or_insert(Tracked {
                created_at: now,
                last_used: now,
            });
    }
}
