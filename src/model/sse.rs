//! Incremental parser for upstream Server-Sent Events.
//!
//! Works on raw bytes so a multi-byte character split across network
//! chunks is only decoded once its event is complete.

/// A parsed SSE event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    /// Event type (from `event:` line), if present.
    pub event: Option<String>,
    /// Event data; multiple `data:` lines are joined with newlines.
    pub data: String,
}

/// Buffers partial input and emits complete events.
#[derive(Debug, Default)]
pub struct SseParser {
    buffer: Vec<u8>,
}

impl SseParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk of bytes and return any events it completed.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend(chunk.iter().copied().filter(|b| *b != b'\r'));
        let mut events = Vec::new();

        while let Some(pos) = self.buffer.windows(2).position(|w| w == b"\n\n") {
            let raw: Vec<u8> = self.buffer.drain(..pos + 2).collect();
            let text = String::from_utf8_lossy(&raw[..pos]);
            if let Some(event) = Self::parse_event(&text) {
                events.push(event);
            }
        }

        events
    }

    fn parse_event(text: &str) -> Option<SseEvent> {
        let mut event_type = None;
        let mut data_parts = Vec::new();

        for line in text.lines() {
            if let Some(value) = line.strip_prefix("event:") {
                event_type = Some(value.trim().to_string());
            } else if let Some(value) = line.strip_prefix("data:") {
                data_parts.push(value.strip_prefix(' ').unwrap_or(value).to_string());
            }
            // Comment lines (":") and unknown fields are ignored.
        }

        if data_parts.is_empty() {
            return None;
        }

        Some(SseEvent {
            event: event_type,
            data: data_parts.join("\n"),
        })
    }

    /// Whether unterminated data is still buffered.
    pub fn has_pending(&self) -> bool {
        !self.buffer.is_empty()
    }
}
