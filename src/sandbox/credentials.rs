//! Per-sandbox credential bundle.
//!
//! Three pieces travel into every project sandbox: the filtering-proxy
//! environment, the GCP service-account file, and the model-routing
//! variables. The file is materialised by a bootstrap exec right after
//! creation; the variables are injected both at container level and as
//! exports in the agent invocation, since `su` starts a fresh
//! environment.

use std::collections::BTreeMap;

use secrecy::ExposeSecret;

use crate::config::Config;
use crate::error::SandboxError;
use crate::proxy::ProxyCredentials;
use crate::sandbox::runtime::SandboxRuntime;

/// Unprivileged user the agent CLI runs as.
pub const AGENT_USER: &str = "agent";

/// Where the decoded service-account JSON lands inside the sandbox.
pub const CREDS_PATH: &str = "/tmp/gcp-creds.json";

/// Agent CLI cache from a previous life of this sandbox name.
const AGENT_CLI_CACHE: &str = "/home/agent/.claude";

/// The full credential environment for a sandbox.
///
/// Ordered map so the generated export preamble is deterministic.
pub fn credential_env(config: &Config, proxy: &ProxyCredentials) -> BTreeMap<String, String> {
    let mut env: BTreeMap<String, String> = proxy.sandbox_env().into_iter().collect();
    env.insert(
        "GOOGLE_APPLICATION_CREDENTIALS".to_string(),
        CREDS_PATH.to_string(),
    );
    env.insert("CLAUDE_CODE_USE_VERTEX".to_string(), "1".to_string());
    env.insert(
        "ANTHROPIC_VERTEX_PROJECT_ID".to_string(),
        config.gcp_project_id.clone(),
    );
    env.insert("CLOUD_ML_REGION".to_string(), config.gcp_region.clone());
    env.insert("ANTHROPIC_MODEL".to_string(), config.model_large.clone());
    env.insert(
        "ANTHROPIC_MEDIUM_MODEL".to_string(),
        config.model_medium.clone(),
    );
    env.insert(
        "ANTHROPIC_SMALL_FAST_MODEL".to_string(),
        config.model_small.clone(),
    );
    env.insert("GEMINI_BASE_URL".to_string(), config.gemini_base_url.clone());
    env
}

/// Bring a freshly created (or recreated) sandbox to the running-ready
/// state: clear the agent CLI cache left by a previous life of this name
/// and materialise the service-account file.
///
/// The credentials file is deliberately world-readable so the
/// unprivileged agent user can read it; the sandbox is single-tenant.
pub async fn bootstrap(
    runtime: &dyn SandboxRuntime,
    name: &str,
    config: &Config,
) -> Result<(), SandboxError> {
    let clear_cache = format!("rm -rf {AGENT_CLI_CACHE}");
    let out = runtime
        .exec_collect(name, &sh(&clear_cache))
        .await?;
    if !out.success() {
        tracing::warn!(sandbox = name, "agent cache clear failed: {}", out.output);
    }

    let write_creds = format!(
        "printf '%s' '{}' | base64 -d > {CREDS_PATH} && chmod 644 {CREDS_PATH}",
        config.gcp_service_account_b64.expose_secret()
    );
    let out = runtime.exec_collect(name, &sh(&write_creds)).await?;
    if !out.success() {
        return Err(SandboxError::CreationFailed {
            reason: format!("credential bootstrap failed: {}", out.output),
        });
    }
    Ok(())
}

fn sh(script: &str) -> Vec<String> {
    vec!["bash".to_string(), "-lc".to_string(), script.to_string()]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_config;
    use crate::sandbox::memory::MemoryRuntime;
    use crate::sandbox::runtime::CreateSpec;
    use std::collections::HashMap;
    use std::time::Duration;

    #[test]
    fn test_credential_env_contents() {
        let config = test_config();
        let proxy = ProxyCredentials::from_config(&config);
        let env = credential_env(&config, &proxy);

        assert_eq!(env["GOOGLE_APPLICATION_CREDENTIALS"], CREDS_PATH);
        assert_eq!(env["ANTHROPIC_VERTEX_PROJECT_ID"], "dreamcore-project");
        assert_eq!(env["CLOUD_ML_REGION"], "us-east5");
        assert_eq!(env["ANTHROPIC_MODEL"], "claude-opus-4-5");
        assert_eq!(env["ANTHROPIC_SMALL_FAST_MODEL"], "claude-haiku-4-5");
        assert!(env["HTTP_PROXY"].starts_with("http://dreamcore:"));
        assert!(env["NO_PROXY"].contains("egress.internal"));
    }

    #[tokio::test]
    async fn test_bootstrap_clears_cache_and_writes_creds() {
        let config = test_config();
        let runtime = MemoryRuntime::new();
        runtime
            .create(&CreateSpec {
                name: "sb".to_string(),
                image: config.sandbox_image.clone(),
                env: HashMap::new(),
                data_bind: "d:/data".to_string(),
                global_bind: "g:/global:ro".to_string(),
                memory_bytes: 1,
                idle_timeout: Duration::from_secs(1),
                max_lifetime: Duration::from_secs(1),
                egress_network: "net".to_string(),
            })
            .await
            .unwrap();

        bootstrap(&runtime, "sb", &config).await.unwrap();

        let log = runtime.exec_log().await;
        assert_eq!(log.len(), 2);
        assert!(log[0].contains("rm -rf /home/agent/.claude"));
        assert!(log[1].contains("base64 -d > /tmp/gcp-creds.json"));
        assert!(log[1].contains("chmod 644"));
    }

    #[tokio::test]
    async fn test_bootstrap_surfaces_creds_write_failure() {
        let config = test_config();
        let runtime = MemoryRuntime::new();
        runtime
            .create(&CreateSpec {
                name: "sb".to_string(),
                image: config.sandbox_image.clone(),
                env: HashMap::new(),
                data_bind: "d:/data".to_string(),
                global_bind: "g:/global:ro".to_string(),
                memory_bytes: 1,
                idle_timeout: Duration::from_secs(1),
                max_lifetime: Duration::from_secs(1),
                egress_network: "net".to_string(),
            })
            .await
            .unwrap();
        runtime.script("base64 -d", &["read-only file system"], 1).await;

        assert!(bootstrap(&runtime, "sb", &config).await.is_err());
    }
}
