//! Drives the code-generation agent CLI inside a sandbox.
//!
//! The prompt crosses the shell boundary base64-encoded: encode here,
//! decode inside the sandbox, and no prompt byte ever meets the shell
//! unquoted. The agent runs as the unprivileged user under a hard
//! wall-clock timeout, reads the prompt from stdin, and emits
//! line-delimited JSON on merged stdout+stderr.

use std::path::Path;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;

use crate::config::{AGENT_TIMEOUT, Config};
use crate::error::AgentError;
use crate::proxy::ProxyCredentials;
use crate::sandbox::credentials::{AGENT_USER, credential_env};
use crate::sandbox::runtime::{ExecStream, SandboxRuntime};

use super::shell::{export_preamble, quote};

/// Prompt staging file inside the workspace, removed by the next run.
pub const PROMPT_FILE: &str = ".prompt.txt";

/// The agent CLI binary inside the sandbox image.
const AGENT_CLI: &str = "claude";

/// Flags: verbose output, streaming JSON frames, no interactive
/// permission prompts.
const AGENT_FLAGS: &str = "--verbose --output-format stream-json --dangerously-skip-permissions";

/// Stage the prompt and start a generation in the given sandbox.
///
/// Returns the merged output line stream and deferred exit status. The
/// sandbox is left running afterwards so the next request is warm.
pub async fn run_generation(
    runtime: &dyn SandboxRuntime,
    config: &Config,
    proxy: &ProxyCredentials,
    sandbox: &str,
    workspace: &Path,
    prompt: &str,
) -> Result<ExecStream, AgentError> {
    let ws = workspace.to_string_lossy();
    let ws_q = quote(&ws);

    // Workspace must exist and belong to the agent user before anything
    // is written into it.
    let ensure = format!("mkdir -p {ws_q} && chown -R {AGENT_USER}:{AGENT_USER} {ws_q}");
    let out = runtime
        .exec_collect(sandbox, &sh(&ensure))
        .await
        .map_err(AgentError::Sandbox)?;
    if !out.success() {
        return Err(AgentError::StartFailed {
            name: sandbox.to_string(),
            reason: format!("workspace setup failed: {}", out.output),
        });
    }

    stage_skills(runtime, config, sandbox, &ws_q).await;
    stage_prompt(runtime, sandbox, &ws, &ws_q, prompt).await?;

    let exports = export_preamble(&credential_env(config, proxy));
    let inner = format!(
        "{exports}cd {ws_q} && {AGENT_CLI} {AGENT_FLAGS} < {PROMPT_FILE} 2>&1"
    );
    let command = format!(
        "timeout {} su {AGENT_USER} -c {}",
        AGENT_TIMEOUT.as_secs(),
        quote(&inner)
    );

    runtime
        .exec_stream(sandbox, &sh(&command))
        .await
        .map_err(|e| AgentError::StartFailed {
            name: sandbox.to_string(),
            reason: e.to_string(),
        })
}

/// Copy the read-only skills tree under the workspace so the agent finds
/// it relative to its working directory. Best-effort: a failure costs
/// skill specialisation, not the generation.
async fn stage_skills(
    runtime: &dyn SandboxRuntime,
    config: &Config,
    sandbox: &str,
    ws_q: &str,
) {
    let skills_src = quote(&config.skills_root().to_string_lossy());
    let copy = format!(
        "mkdir -p {ws_q}/.claude && rm -rf {ws_q}/.claude/skills && \
         cp -r {skills_src} {ws_q}/.claude/skills && \
         chown -R {AGENT_USER}:{AGENT_USER} {ws_q}/.claude"
    );
    match runtime.exec_collect(sandbox, &sh(&copy)).await {
        Ok(out) if out.success() => {}
        Ok(out) => tracing::warn!(sandbox, "skills copy failed: {}", out.output),
        Err(e) => tracing::warn!(sandbox, "skills copy failed: {e}"),
    }
}

/// Write the prompt into the workspace via base64 transport.
async fn stage_prompt(
    runtime: &dyn SandboxRuntime,
    sandbox: &str,
    ws: &str,
    ws_q: &str,
    prompt: &str,
) -> Result<(), AgentError> {
    let encoded = quote(&BASE64.encode(prompt.as_bytes()));
    let write = format!(
        "printf '%s' {encoded} | base64 -d > {ws_q}/{PROMPT_FILE} && \
         chown {AGENT_USER}:{AGENT_USER} {ws_q}/{PROMPT_FILE}"
    );
    let out = runtime
        .exec_collect(sandbox, &sh(&write))
        .await
        .map_err(AgentError::Sandbox)?;
    if !out.success() {
        return Err(AgentError::PromptStaging {
            workspace: ws.to_string(),
            reason: out.output,
        });
    }
    Ok(())
}

fn sh(script: &str) -> Vec<String> {
    vec!["bash".to_string(), "-lc".to_string(), script.to_string()]
}
