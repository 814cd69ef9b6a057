//! Reassembles the agent's noisy line stream into well-formed events.
//!
//! The agent writes one JSON object per line, but long frames get split
//! by the pty and stray diagnostics land between them. The shaper parses
//! what it can, buffers at most one partial JSON line (frames are
//! sentence-sized, deeper pipelining is unnecessary), wraps noise as
//! `log` events, and enforces the per-generation output cap.

use crate::stream::event::SseEvent;

/// Maximum events forwarded per generation before the stream is cut.
pub const MAX_EVENTS: usize = 1000;

const LIMIT_MESSAGE: &str = "Output limit reached";

/// Streaming line-to-event shaper. One per generation.
#[derive(Debug, Default)]
pub struct EventShaper {
    buffer: Option<String>,
    forwarded: usize,
    capped: bool,
}

impl EventShaper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of events forwarded so far (cap warning excluded).
    pub fn forwarded(&self) -> usize {
        self.forwarded
    }

    /// Whether the output cap has been hit; the caller stops consuming.
    pub fn capped(&self) -> bool {
        self.capped
    }

    /// Feed one raw line; returns the events to emit for it.
    pub fn push_line(&mut self, line: &str) -> Vec<SseEvent> {
        if self.capped {
            return Vec::new();
        }

        let line = line.trim();
        if line.is_empty() {
            return Vec::new();
        }

        if parses_as_object(line) {
            return self.forward(SseEvent::Raw(line.to_string()));
        }

        if let Some(mut held) = self.buffer.take() {
            held.push_str(line);
            if parses_as_object(&held) {
                return self.forward(SseEvent::Raw(held));
            }
            // Still incomplete; keep holding.
            self.buffer = Some(held);
            return Vec::new();
        }

        if line.starts_with('{') {
            self.buffer = Some(line.to_string());
            return Vec::new();
        }

        self.forward(SseEvent::log(line))
    }

    /// End of stream: flush any held partial line as a `log` event.
    pub fn finish(&mut self) -> Vec<SseEvent> {
        match self.buffer.take() {
            Some(held) if !self.capped => self.forward(SseEvent::log(&held)),
            _ => Vec::new(),
        }
    }

    fn forward(&mut self, event: SseEvent) -> Vec<SseEvent> {
        self.forwarded += 1;
        if self.forwarded >= MAX_EVENTS {
            self.capped = true;
            return vec![event, SseEvent::warning(LIMIT_MESSAGE)];
        }
        vec![event]
    }
}

fn parses_as_object(line: &str) -> bool {
    matches!(
        serde_json::from_str::<serde_json::Value>(line),
        Ok(serde_json::Value::Object(_))
    )
}
