//! Incremental decoder for `text/event-stream` bodies.
//!
//! Bytes are buffered until a full line is available, so multi-byte
//! characters split across network chunks decode correctly.

const BOM: &[u8] = b"\xEF\xBB\xBF";

/// A parsed server-sent event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    /// Event type (from "event:" field, defaults to "message").
    pub event: String,
    /// Event data (from "data:" field(s), joined with newlines).
    pub data: String,
    /// Last event ID (from "id:" field).
    pub id: Option<String>,
}

impl Default for SseEvent {
    fn default() -> Self {
        Self {
            event: "message".to_string(),
            data: String::new(),
            id: None,
        }
    }
}

#[derive(Debug, Default)]
pub struct SseParser {
    buffer: Vec<u8>,
    current: SseEvent,
    has_data: bool,
    bom_checked: bool,
}

impl SseParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk of the body and return every event it completed.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend_from_slice(chunk);
        let mut events = Vec::new();

        if !self.bom_checked && !self.buffer.is_empty() {
            if self.buffer.len() < BOM.len() && BOM.starts_with(&self.buffer) {
                return events;
            }
            self.bom_checked = true;
            if self.buffer.starts_with(BOM) {
                self.buffer.drain(..BOM.len());
            }
        }

        let mut start = 0usize;
        while let Some(rel_pos) = memchr::memchr2(b'\r', b'\n', &self.buffer[start..]) {
            let pos = start + rel_pos;
            let next_start = if self.buffer[pos] == b'\n' {
                pos + 1
            } else if pos + 1 < self.buffer.len() {
                if self.buffer[pos + 1] == b'\n' {
                    pos + 2
                } else {
                    pos + 1
                }
            } else {
                // CR at the end of the buffer: wait to see whether LF follows.
                break;
            };

            let line = String::from_utf8_lossy(&self.buffer[start..pos]).into_owned();
            start = next_start;

            if line.is_empty() {
                if let Some(event) = self.dispatch() {
                    events.push(event);
                }
            } else {
                self.process_line(&line);
            }
        }

        self.buffer.drain(..start);
        events
    }

    /// Flush a trailing event when the body ends without a blank line.
    pub fn flush(&mut self) -> Option<SseEvent> {
        if !self.buffer.is_empty() {
            let rest = std::mem::take(&mut self.buffer);
            let line = String::from_utf8_lossy(&rest);
            let line = line.trim_end_matches('\r');
            if !line.is_empty() {
                self.process_line(line);
            }
        }
        self.dispatch()
    }

    fn process_line(&mut self, line: &str) {
        if line.starts_with(':') {
            // Comment, used by servers as keep-alive.
            return;
        }
        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "event" => self.current.event = value.to_string(),
            "data" => {
                self.current.data.push_str(value);
                self.current.data.push('\n');
                self.has_data = true;
            }
            "id" => {
                if !value.contains('\0') {
                    self.current.id = Some(value.to_string());
                }
            }
            _ => {}
        }
    }

    fn dispatch(&mut self) -> Option<SseEvent> {
        let mut event = std::mem::take(&mut self.current);
        let had_data = std::mem::replace(&mut self.has_data, false);
        if !had_data {
            return None;
        }
        if event.data.ends_with('\n') {
            event.data.pop();
        }
        if event.event.is_empty() {
            event.event = "message".to_string();
        }
        Some(event)
    }
}
