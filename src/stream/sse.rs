/// SSE (Server-Sent Events) frame parser and encoder.
///
/// Handles the low-level parsing of SSE frames from a text or byte stream,
/// including buffering partial lines and handling field semantics per the
/// [SSE specification](https://html.spec.whatwg.org/multipage/server-sent-events.html).
use memchr::memchr_iter;

/// A parsed SSE frame.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SseEvent {
    pub event: Option<String>,
    pub data: String,
    pub id: Option<String>,
    pub retry: Option<u64>,
}

/// Incremental SSE line parser.
///
/// Feed it raw text chunks (potentially arriving in arbitrary byte
/// boundaries) and it yields fully-assembled [`SseEvent`] frames.
#[derive(Debug, Default)]
pub struct SseParser {
    buffer: String,
    read_offset: usize,
    /// Bytes of an incomplete UTF-8 sequence carried between byte chunks.
    utf8_tail: Vec<u8>,
    pending: PendingFrame,
}

#[derive(Debug, Default)]
struct PendingFrame {
    event_type: Option<String>,
    data: String,
    has_data: bool,
    last_event_id: Option<String>,
    retry: Option<u64>,
}

impl SseParser {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed raw text and return any complete events parsed.
    ///
    /// SSE spec rules:
    /// - Lines starting with `event:` set the event type for the next frame
    /// - Lines starting with `data:` append to the data buffer (strip one
    ///   leading space after the colon per spec)
    /// - Empty lines terminate a frame, which is emitted if it has data
    /// - Lines starting with `:` are comments, ignored
    /// - `id:` sets the last event ID, which sticks across frames
    /// - `retry:` is surfaced on the next frame when it is a valid integer
    /// - Multiple `data:` lines are joined with `\n`
    pub fn feed(&mut self, chunk: &str) -> Vec<SseEvent> {
        let mut out = Vec::new();
        self.feed_into(chunk, &mut out);
        out
    }

    /// Feed raw text and append complete events into a caller-provided buffer.
    pub fn feed_into(&mut self, chunk: &str, out: &mut Vec<SseEvent>) {
        self.buffer.push_str(chunk);
        let mut processed_up_to = self.read_offset;
        let bytes = self.buffer.as_bytes();
        let scan_start = processed_up_to;
        for rel_pos in memchr_iter(b'\n', &bytes[scan_start..]) {
            let line_end = scan_start + rel_pos;
            let mut line = &self.buffer[processed_up_to..line_end];
            if let Some(stripped) = line.strip_suffix('\r') {
                line = stripped;
            }
            self.pending.process_line(line, out);
            processed_up_to = line_end + 1;
        }

        self.read_offset = processed_up_to;
        if self.read_offset == self.buffer.len() {
            self.buffer.clear();
            self.read_offset = 0;
            return;
        }
        let should_compact = self.read_offset > 0
            && (self.read_offset >= self.buffer.len() / 2 || self.read_offset >= 8 * 1024);
        if should_compact {
            self.buffer.drain(..self.read_offset);
            self.read_offset = 0;
        }
    }

    /// Feed raw bytes. A UTF-8 sequence split across chunks is held back
    /// until the rest of it arrives; invalid bytes are replaced.
    pub fn feed_bytes_into(&mut self, chunk: &[u8], out: &mut Vec<SseEvent>) {
        let mut bytes = std::mem::take(&mut self.utf8_tail);
        bytes.extend_from_slice(chunk);
        let valid_up_to = match std::str::from_utf8(&bytes) {
            Ok(_) => bytes.len(),
            Err(err) if err.error_len().is_none() => err.valid_up_to(),
            Err(_) => {
                let text = String::from_utf8_lossy(&bytes).into_owned();
                self.feed_into(&text, out);
                return;
            }
        };
        self.utf8_tail = bytes.split_off(valid_up_to);
        let text = String::from_utf8_lossy(&bytes);
        self.feed_into(&text, out);
    }

    /// Flush at end of input: a final frame without its trailing blank line
    /// is still emitted.
    pub fn finish(&mut self) -> Option<SseEvent> {
        if !self.utf8_tail.is_empty() {
            let tail = String::from_utf8_lossy(&std::mem::take(&mut self.utf8_tail)).into_owned();
            self.buffer.push_str(&tail);
        }
        let mut out = Vec::new();
        if self.read_offset < self.buffer.len() {
            let rest = std::mem::take(&mut self.buffer);
            let line = rest[self.read_offset..].trim_end_matches('\r');
            self.pending.process_line(line, &mut out);
        }
        self.buffer.clear();
        self.read_offset = 0;
        self.pending.process_line("", &mut out);
        out.pop()
    }
}

impl PendingFrame {
    fn process_line(&mut self, line: &str, events: &mut Vec<SseEvent>) {
        if line.is_empty() {
            // Empty line = dispatch event
            if self.has_data {
                events.push(SseEvent {
                    event: self.event_type.take(),
                    data: std::mem::take(&mut self.data),
                    id: self.last_event_id.clone(),
                    retry: self.retry.take(),
                });
                self.has_data = false;
            }
            return;
        }

        // Comment line, ignored
        if line.starts_with(':') {
            return;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "data" => {
                if self.has_data {
                    self.data.push('\n');
                } else {
                    self.has_data = true;
                }
                self.data.push_str(value);
            }
            "event" => self.event_type = Some(value.to_string()),
            "id" => self.last_event_id = Some(value.to_string()),
            "retry" => {
                if let Ok(ms) = value.trim().parse::<u64>() {
                    self.retry = Some(ms);
                }
            }
            // Unknown field names are ignored per spec
            _ => {}
        }
    }
}

/// Encode an [`SseEvent`] into SSE wire text.
#[must_use]
pub fn encode_sse_event(event: &SseEvent) -> String {
    let mut out = String::with_capacity(16 + event.data.len());
    if let Some(ev) = event.event.as_deref() {
        out.push_str("event: ");
        out.push_str(ev);
        out.push('\n');
    }
    for line in event.data.split('\n') {
        out.push_str("data: ");
        out.push_str(line);
        out.push('\n');
    }
    if let Some(id) = event.id.as_deref() {
        out.push_str("id: ");
        out.push_str(id);
        out.push('\n');
    }
    out.push('\n');
    out
}

/// Format a data-only SSE frame.
#[must_use]
pub fn data_frame(json: &str) -> String {
    let mut out = String::with_capacity(10 + json.len());
    out.push_str("data: ");
    out.push_str(json);
    out.push_str("\n\n");
    out
}

/// Check if an [`SseEvent`] is a terminal `[DONE]` event.
#[must_use]
pub fn is_done_event(event: &SseEvent) -> bool {
    event.data.trim() == "[DONE]"
}

#[cfg(test)]
#[path = "sse_tests.rs"]
mod tests;
