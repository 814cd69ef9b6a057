//! Orchestrator binary: load config, pick a sandbox runtime, serve.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use tracing_subscriber::EnvFilter;

use dreamcore::config::Config;
use dreamcore::sandbox::memory::MemoryRuntime;
use dreamcore::sandbox::runtime::{DockerRuntime, SandboxRuntime};
use dreamcore::server::{AppState, router};
use dreamcore::volume::{AttachedVolume, Volume};

/// How often the idle reaper sweeps the warm pool.
const REAP_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Parser, Debug)]
#[command(name = "dreamcore")]
#[command(about = "AI browser-game generation orchestrator")]
#[command(version)]
struct Cli {
    /// Address to bind the HTTP server to.
    #[arg(long, env = "DREAMCORE_BIND", default_value = "0.0.0.0:8080")]
    bind: SocketAddr,

    /// Sandbox runtime backend.
    #[arg(long, env = "DREAMCORE_RUNTIME", value_enum, default_value_t = RuntimeKind::Docker)]
    runtime: RuntimeKind,

    /// Emit logs as JSON lines.
    #[arg(long, env = "DREAMCORE_LOG_JSON")]
    log_json: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum RuntimeKind {
    /// Docker containers (production).
    Docker,
    /// In-process runtime for local development without Docker.
    Memory,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if cli.log_json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    let config = Arc::new(Config::from_env().context("loading configuration")?);

    let runtime: Arc<dyn SandboxRuntime> = match cli.runtime {
        RuntimeKind::Docker => {
            Arc::new(DockerRuntime::connect().context("connecting to Docker")?)
        }
        RuntimeKind::Memory => {
            tracing::warn!("memory runtime selected; generations will be no-ops");
            Arc::new(MemoryRuntime::new())
        }
    };
    let volume: Arc<dyn Volume> = Arc::new(AttachedVolume);

    let state = AppState::new(config, runtime, volume)?;

    // Idle reaper: enforces the 20 min idle / 5 h max sandbox lifetimes.
    let reaper_state = state.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(REAP_INTERVAL);
        loop {
            ticker.tick().await;
            let reaped = reaper_state.manager.reap_idle().await;
            if reaped > 0 {
                tracing::info!(reaped, "sandbox reaper pass");
            }
        }
    });

    let listener = tokio::net::TcpListener::bind(cli.bind)
        .await
        .with_context(|| format!("binding {}", cli.bind))?;
    tracing::info!("orchestrator listening on {}", cli.bind);

    axum::serve(listener, router(state))
        .await
        .context("serving")?;
    Ok(())
}
