//! DreamCore generation orchestrator.
//!
//! Control plane of an AI-assisted browser-game authoring platform. It
//! accepts authoring requests from a trusted gateway, drives a
//! code-generation agent inside warm-reusable, network-isolated
//! sandboxes, repairs the agent's line-delimited JSON output into an SSE
//! feed, and versions every generated project tree in a per-project git
//! repository on a shared volume.
//!
//! # Architecture
//!
//! ```text
//! gateway ──▶ server (axum, shared-secret gate)
//!               │
//!               ├─ sandbox::SandboxManager ──▶ SandboxRuntime (Docker)
//!               │      warm pool, credential bootstrap, idle reaper
//!               ├─ agent::run_generation ──▶ agent CLI in the sandbox
//!               │      base64 prompt transport, 300 s hard timeout
//!               ├─ stream::EventShaper ──▶ SSE feed to the caller
//!               ├─ vcs::GitStore ──▶ per-project repository
//!               ├─ files ──▶ direct apply + read-only serving
//!               └─ model ──▶ small-model endpoints, structured path
//! ```
//!
//! All egress, the orchestrator's own model calls included, leaves
//! through one authenticated filtering proxy.

pub mod agent;
pub mod config;
pub mod error;
pub mod files;
pub mod gate;
pub mod model;
pub mod proxy;
pub mod sandbox;
pub mod server;
pub mod skills;
pub mod stream;
pub mod vcs;
pub mod volume;

pub use config::Config;
pub use error::{Error, Result};
