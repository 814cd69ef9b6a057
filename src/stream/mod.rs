//! SSE event model and agent-output reassembly.

pub mod event;
pub mod shaper;

pub use event::{ApiErrorKind, SseEvent};
pub use shaper::{EventShaper, MAX_EVENTS};
