//! Environment-driven configuration.
//!
//! All settings come from the process environment (a `.env` file is loaded
//! first by the binary). Secret material is held in [`SecretString`] so it
//! never appears in `Debug` output or logs.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;

/// How long a warm sandbox may sit idle before the runtime reclaims it.
pub const SANDBOX_IDLE_TIMEOUT: Duration = Duration::from_secs(20 * 60);

/// Hard lifetime cap for any sandbox.
pub const SANDBOX_MAX_LIFETIME: Duration = Duration::from_secs(5 * 3600);

/// Wall-clock limit for one agent generation, enforced inside the sandbox.
pub const AGENT_TIMEOUT: Duration = Duration::from_secs(300);

/// Memory cap for a project sandbox, in bytes.
pub const SANDBOX_MEMORY_BYTES: i64 = 2 * 1024 * 1024 * 1024;

/// Orchestrator configuration assembled from the environment.
#[derive(Clone)]
pub struct Config {
    /// Shared secret expected in the `x-internal-secret` header.
    pub internal_secret: SecretString,

    /// Filtering-proxy endpoint and credentials.
    pub proxy_host: String,
    pub proxy_port: u16,
    pub proxy_user: String,
    pub proxy_pass: SecretString,

    /// Host exempted from proxying (the static-egress address).
    pub static_egress_host: String,

    /// Base64-encoded GCP service-account JSON, decoded inside sandboxes.
    pub gcp_service_account_b64: SecretString,

    /// Model routing.
    pub gcp_project_id: String,
    pub gcp_region: String,
    pub model_large: String,
    pub model_medium: String,
    pub model_small: String,

    /// Filtering-proxy base URL fronting the Gemini upstream.
    pub gemini_base_url: String,

    /// Sandbox image containing the agent CLI, JS runtime and image tools.
    pub sandbox_image: String,

    /// Named volumes mounted into sandboxes.
    pub data_volume: String,
    pub global_volume: String,

    /// Network that restricts sandbox egress to the filtering proxy.
    pub egress_network: String,

    /// Mount points as seen by both the orchestrator and the sandboxes.
    pub data_root: PathBuf,
    pub global_root: PathBuf,
}

impl Config {
    /// Load configuration from the environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            internal_secret: require("DREAMCORE_INTERNAL_SECRET")?.into(),
            proxy_host: require("PROXY_HOST")?,
            proxy_port: parse_port(require("PROXY_PORT")?)?,
            proxy_user: require("PROXY_USER")?,
            proxy_pass: require("PROXY_PASS")?.into(),
            static_egress_host: require("STATIC_EGRESS_HOST")?,
            gcp_service_account_b64: require("GCP_SERVICE_ACCOUNT_B64")?.into(),
            gcp_project_id: require("ANTHROPIC_VERTEX_PROJECT_ID")?,
            gcp_region: optional("CLOUD_ML_REGION", "us-east5"),
            model_large: optional("DREAMCORE_MODEL_LARGE", "claude-opus-4-5"),
            model_medium: optional("DREAMCORE_MODEL_MEDIUM", "claude-sonnet-4-5"),
            model_small: optional("DREAMCORE_MODEL_SMALL", "claude-haiku-4-5"),
            gemini_base_url: require("GEMINI_BASE_URL")?,
            sandbox_image: optional("SANDBOX_IMAGE", "dreamcore-sandbox:latest"),
            data_volume: optional("DATA_VOLUME", "dreamcore-data"),
            global_volume: optional("GLOBAL_VOLUME", "dreamcore-global"),
            egress_network: optional("EGRESS_NETWORK", "dreamcore-egress"),
            data_root: PathBuf::from(optional("DATA_ROOT", "/data")),
            global_root: PathBuf::from(optional("GLOBAL_ROOT", "/global")),
        })
    }

    /// Workspace directory for a `(user, project)` pair.
    ///
    /// Both identifiers must already be UUID-validated by the gate; this
    /// function only joins path segments.
    pub fn workspace_dir(&self, user_id: &str, project_id: &str) -> PathBuf {
        self.data_root
            .join("users")
            .join(user_id)
            .join("projects")
            .join(project_id)
    }

    /// Root of the read-only skills tree on the global volume.
    pub fn skills_root(&self) -> PathBuf {
        self.global_root.join(".claude").join("skills")
    }
}

fn require(name: &str) -> Result<String, ConfigError> {
    match env::var(name) {
        Ok(v) if !v.is_empty() => Ok(v),
        _ => Err(ConfigError::MissingEnvVar(name.to_string())),
    }
}

fn optional(name: &str, default: &str) -> String {
    env::var(name)
        .ok()
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn parse_port(raw: String) -> Result<u16, ConfigError> {
    raw.parse().map_err(|_| ConfigError::InvalidValue {
        key: "PROXY_PORT".to_string(),
        message: format!("'{raw}' is not a valid port"),
    })
}

/// A fully-populated config for tests that never reads the environment.
#[cfg(test)]
pub(crate) fn test_config() -> Config {
    Config {
        internal_secret: "test-secret".to_string().into(),
        proxy_host: "proxy.internal".to_string(),
        proxy_port: 3128,
        proxy_user: "dreamcore".to_string(),
        proxy_pass: "hunter2".to_string().into(),
        static_egress_host: "egress.internal".to_string(),
        gcp_service_account_b64: "e30=".to_string().into(),
        gcp_project_id: "dreamcore-project".to_string(),
        gcp_region: "us-east5".to_string(),
        model_large: "claude-opus-4-5".to_string(),
        model_medium: "claude-sonnet-4-5".to_string(),
        model_small: "claude-haiku-4-5".to_string(),
        gemini_base_url: "http://gemini-proxy.internal".to_string(),
        sandbox_image: "dreamcore-sandbox:latest".to_string(),
        data_volume: "dreamcore-data".to_string(),
        global_volume: "dreamcore-global".to_string(),
        egress_network: "dreamcore-egress".to_string(),
        data_root: PathBuf::from("/data"),
        global_root: PathBuf::from("/global"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_workspace_dir_layout() {
        let config = test_config();
        let dir = config.workspace_dir(
            "aaaaaaaa-aaaa-aaaa-aaaa-aaaaaaaaaaaa",
            "bbbbbbbb-bbbb-bbbb-bbbb-bbbbbbbbbbbb",
        );
        assert_eq!(
            dir,
            PathBuf::from(
                "/data/users/aaaaaaaa-aaaa-aaaa-aaaa-aaaaaaaaaaaa/projects/bbbbbbbb-bbbb-bbbb-bbbb-bbbbbbbbbbbb"
            )
        );
    }

    #[test]
    fn test_skills_root_layout() {
        let config = test_config();
        assert_eq!(config.skills_root(), PathBuf::from("/global/.claude/skills"));
    }

    #[test]
    fn test_parse_port_rejects_garbage() {
        assert!(parse_port("not-a-port".to_string()).is_err());
        assert_eq!(parse_port("3128".to_string()).unwrap(), 3128);
    }
}
