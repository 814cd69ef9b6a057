//! Error types for the DreamCore orchestrator.

use std::time::Duration;

/// Top-level error type for the orchestrator.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Gate error: {0}")]
    Gate(#[from] GateError),

    #[error("Sandbox error: {0}")]
    Sandbox(#[from] SandboxError),

    #[error("Agent error: {0}")]
    Agent(#[from] AgentError),

    #[error("Version store error: {0}")]
    Vcs(#[from] VcsError),

    #[error("File error: {0}")]
    Files(#[from] FilesError),

    #[error("Model error: {0}")]
    Model(#[from] ModelError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Request-boundary errors (auth and identifier validation).
#[derive(Debug, thiserror::Error)]
pub enum GateError {
    /// Missing or wrong shared-secret header, or no secret configured
    /// server-side (fail closed).
    #[error("Unauthorized")]
    Unauthorized,

    #[error("Invalid {field}: must be UUID format")]
    InvalidUuid { field: String },

    #[error("Missing required field: {field}")]
    MissingField { field: String },
}

/// Sandbox runtime and lifecycle errors.
#[derive(Debug, thiserror::Error)]
pub enum SandboxError {
    /// No sandbox exists under the given name.
    #[error("Sandbox {name} not found")]
    NotFound { name: String },

    /// Creation raced with another request that won.
    #[error("Sandbox {name} already exists")]
    AlreadyExists { name: String },

    /// The runtime reports the sandbox as terminated or timed out.
    #[error("Sandbox {name} is {state}")]
    BadState { name: String, state: String },

    #[error("Sandbox creation failed: {reason}")]
    CreationFailed { reason: String },

    #[error("Exec failed in sandbox {name}: {reason}")]
    ExecFailed { name: String, reason: String },

    #[error("Sandbox runtime not available: {reason}")]
    RuntimeUnavailable { reason: String },

    #[error("Runtime API error: {0}")]
    Runtime(#[from] bollard::errors::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Agent driver errors (prompt staging, invocation).
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("Failed to stage prompt in {workspace}: {reason}")]
    PromptStaging { workspace: String, reason: String },

    #[error("Failed to start agent in sandbox {name}: {reason}")]
    StartFailed { name: String, reason: String },

    #[error("Agent timed out after {0:?}")]
    Timeout(Duration),

    #[error("Sandbox error: {0}")]
    Sandbox(#[from] SandboxError),
}

/// Version-store errors.
#[derive(Debug, thiserror::Error)]
pub enum VcsError {
    #[error("git {op} failed: {detail}")]
    CommandFailed { op: String, detail: String },

    #[error("Invalid commit hash: {hash}")]
    InvalidHash { hash: String },

    #[error("Commit {hash} not found")]
    UnknownCommit { hash: String },

    #[error("Project directory not found: {path}")]
    ProjectNotFound { path: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Workspace file operation errors.
#[derive(Debug, thiserror::Error)]
pub enum FilesError {
    /// Path contains `..`, starts with `/`, or escapes the workspace.
    #[error("Unsafe path rejected: {path}")]
    UnsafePath { path: String },

    #[error("File not found: {path}")]
    NotFound { path: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Model invocation errors (lightweight endpoints and the structured path).
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("Model request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Model returned an empty response")]
    EmptyResponse,

    #[error("Failed to parse model output: {reason}")]
    Parse { reason: String },

    #[error("Image generation failed for {name}: {reason}")]
    ImageFailed { name: String, reason: String },

    #[error("Sandbox error: {0}")]
    Sandbox(#[from] SandboxError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for the orchestrator.
pub type Result<T> = std::result::Result<T, Error>;
