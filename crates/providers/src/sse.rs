//! Incremental SSE (Server-Sent Events) parser for streaming responses.
//!
//! Both the OpenAI-compatible and the Gemini endpoints deliver their streams
//! as SSE: events separated by a blank line, each carrying `data:` lines.
//! Chunks arrive at arbitrary byte boundaries, so the parser buffers partial
//! events between `feed` calls.

/// A single parsed SSE event.
#[derive(Debug, Clone)]
pub struct SseEvent {
    /// The `event:` field, if the server sent one.
    pub event: Option<String>,
    /// Joined `data:` payload.
    pub data: String,
}

pub struct SseParser {
    buffer: String,
}

impl SseParser {
    pub fn new() -> Self {
        Self {
            buffer: String::new(),
        }
    }

    /// Feed raw bytes from the HTTP response; returns completed events.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.buffer.push_str(&String::from_utf8_lossy(chunk));
        // Normalize CRLF so the boundary scan below only deals with \n\n.
        if self.buffer.contains('\r') {
            self.buffer = self.buffer.replace("\r\n", "\n");
        }

        let mut events = Vec::new();
        while let Some(boundary) = self.buffer.find("\n\n") {
            let block = self.buffer[..boundary].to_string();
            self.buffer.drain(..boundary + 2);

            let mut event_type: Option<String> = None;
            let mut data_lines: Vec<String> = Vec::new();
            for line in block.lines() {
                if let Some(val) = line.strip_prefix("event:") {
                    event_type = Some(val.trim().to_string());
                } else if let Some(val) = line.strip_prefix("data:") {
                    data_lines.push(val.strip_prefix(' ').unwrap_or(val).to_string());
                }
                // id:, retry: and comment lines (leading ':') are skipped.
            }

            if !data_lines.is_empty() {
                events.push(SseEvent {
                    event: event_type,
                    data: data_lines.join("\n"),
                });
            }
        }
        events
    }
}

impl Default for SseParser {
    fn default() -> Self {
        Self::new()
    }
}
