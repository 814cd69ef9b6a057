//! Warm-reusable compute sandboxes for agent generations.
//!
//! Each `(user, project)` pair maps deterministically to a named sandbox
//! that mounts the project data volume read-write and the global skills
//! volume read-only, with all egress forced through the filtering proxy.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                       SandboxManager                          │
//! │                                                               │
//! │   acquire(user, project)                                      │
//! │     │  name = sha256(user ":" project)[..12]                  │
//! │     ├─ warm lookup ──────────── running ──▶ reuse             │
//! │     ├─ not found ── create ───────────────▶ bootstrap creds   │
//! │     │     └─ already exists ── re-lookup ─▶ reuse (race)      │
//! │     └─ terminated ── remove + create ─────▶ bootstrap creds   │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! The manager only talks to the [`SandboxRuntime`] trait; production
//! wires in [`DockerRuntime`], tests and local development the
//! [`MemoryRuntime`].

pub mod credentials;
pub mod lifecycle;
pub mod memory;
pub mod name;
pub mod runtime;

pub use credentials::{AGENT_USER, CREDS_PATH};
pub use lifecycle::{
    AcquireOutcome, STATUS_CREATING, STATUS_RECREATING, STATUS_WARM, SandboxManager,
};
pub use memory::MemoryRuntime;
pub use name::{POOL_SUFFIX, sandbox_name};
pub use runtime::{
    CreateSpec, DockerRuntime, ExecOutput, ExecStream, SandboxRuntime, SandboxState,
};
