//! Transcript replay: drive the decoder from an AG-UI event stream the way a
//! chat UI does, re-decoding each message's full text after every delta.

pub mod sse;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::error::DecodeError;
use crate::observability::log_decode_summary;
use crate::pipeline::{DecodedMessage, MessageDecoder};

pub use sse::{SseEvent, SseParser};

/// The subset of AG-UI events replay cares about.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AgUiEvent {
    TextMessageStart {
        #[serde(rename = "messageId")]
        message_id: String,
    },
    TextMessageContent {
        #[serde(rename = "messageId")]
        message_id: String,
        delta: String,
    },
    TextMessageEnd {
        #[serde(rename = "messageId")]
        message_id: String,
    },
    #[serde(other)]
    Other,
}

/// Decoded state of one message after a given number of deltas.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MessageSnapshot {
    pub message_id: String,
    /// Deltas applied so far; 0 for a message that has none yet.
    pub chunk_index: usize,
    pub is_final: bool,
    pub decoded: DecodedMessage,
}

#[derive(Debug, Default)]
struct MessageBuffer {
    text: String,
    chunks: usize,
    ended: bool,
}

/// Accumulates streamed message text and re-decodes it per delta.
#[derive(Debug, Default)]
pub struct ReplaySession {
    decoder: MessageDecoder,
    parser: SseParser,
    messages: FxHashMap<String, MessageBuffer>,
    order: Vec<String>,
}

impl ReplaySession {
    #[must_use]
    pub fn new(decoder: MessageDecoder) -> Self {
        Self {
            decoder,
            ..Self::default()
        }
    }

    /// Feed raw SSE text and return one snapshot per content delta in it.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::Event`] when a frame's data is not a valid
    /// AG-UI event.
    pub fn feed(&mut self, chunk: &str) -> Result<Vec<MessageSnapshot>, DecodeError> {
        let events = self.parser.feed(chunk);
        self.handle_events(&events)
    }

    /// Flush a trailing frame that had no terminating blank line.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::Event`] when that frame is not a valid AG-UI event.
    pub fn finish(&mut self) -> Result<Vec<MessageSnapshot>, DecodeError> {
        match self.parser.finish() {
            Some(event) => self.handle_events(std::slice::from_ref(&event)),
            None => Ok(Vec::new()),
        }
    }

    fn handle_events(&mut self, events: &[SseEvent]) -> Result<Vec<MessageSnapshot>, DecodeError> {
        let mut snapshots = Vec::new();
        for event in events {
            if let Some(snapshot) = self.handle_sse_event(event)? {
                snapshots.push(snapshot);
            }
        }
        Ok(snapshots)
    }

    /// Apply one SSE frame.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::Event`] when the frame's data is not a valid
    /// AG-UI event.
    pub fn handle_sse_event(
        &mut self,
        event: &SseEvent,
    ) -> Result<Option<MessageSnapshot>, DecodeError> {
        if event.data.trim().is_empty() || sse::is_done_event(event) {
            return Ok(None);
        }
        let parsed: AgUiEvent = serde_json::from_str(&event.data)
            .map_err(|err| DecodeError::Event(format!("invalid AG-UI event: {err}")))?;
        Ok(self.apply(parsed))
    }

    /// Apply one AG-UI event; content deltas yield a fresh snapshot.
    pub fn apply(&mut self, event: AgUiEvent) -> Option<MessageSnapshot> {
        match event {
            AgUiEvent::TextMessageStart { message_id } => {
                self.buffer_mut(&message_id);
                None
            }
            AgUiEvent::TextMessageContent { message_id, delta } => {
                let buffer = self.buffer_mut(&message_id);
                buffer.text.push_str(&delta);
                buffer.chunks += 1;
                let chunk_index = buffer.chunks;
                let text = self.message_text(&message_id).unwrap_or_default();
                let decoded = self.decoder.decode(text);
                log_decode_summary(&message_id, text.len(), &decoded);
                Some(MessageSnapshot {
                    message_id,
                    chunk_index,
                    is_final: false,
                    decoded,
                })
            }
            AgUiEvent::TextMessageEnd { message_id } => {
                let buffer = self.buffer_mut(&message_id);
                buffer.ended = true;
                tracing::debug!(message_id = %message_id, chunks = buffer.chunks, "Message ended");
                None
            }
            AgUiEvent::Other => None,
        }
    }

    fn buffer_mut(&mut self, message_id: &str) -> &mut MessageBuffer {
        if !self.messages.contains_key(message_id) {
            self.order.push(message_id.to_string());
        }
        self.messages.entry(message_id.to_string()).or_default()
    }

    /// Accumulated text of a message, if it has been seen.
    #[must_use]
    pub fn message_text(&self, message_id: &str) -> Option<&str> {
        self.messages.get(message_id).map(|buffer| buffer.text.as_str())
    }

    /// Message ids in the order they first appeared.
    #[must_use]
    pub fn message_ids(&self) -> &[String] {
        &self.order
    }

    /// Current snapshot of every message, in first-seen order.
    #[must_use]
    pub fn final_snapshots(&self) -> Vec<MessageSnapshot> {
        self.order
            .iter()
            .filter_map(|id| {
                let buffer = self.messages.get(id)?;
                Some(MessageSnapshot {
                    message_id: id.clone(),
                    chunk_index: buffer.chunks,
                    is_final: buffer.ended,
                    decoded: self.decoder.decode(&buffer.text),
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Segment;
    use crate::stream::sse::data_frame;

    fn content(id: &str, delta: &str) -> String {
        data_frame(
            &serde_json::json!({"type": "TEXT_MESSAGE_CONTENT", "messageId": id, "delta": delta})
                .to_string(),
        )
    }

    #[test]
    fn test_event_parsing() {
        let event: AgUiEvent =
            serde_json::from_str(r#"{"type":"TEXT_MESSAGE_CONTENT","messageId":"m","delta":"hi"}"#)
                .unwrap();
        assert_eq!(
            event,
            AgUiEvent::TextMessageContent {
                message_id: "m".into(),
                delta: "hi".into()
            }
        );
        let other: AgUiEvent = serde_json::from_str(r#"{"type":"RUN_STARTED","runId":"r"}"#).unwrap();
        assert_eq!(other, AgUiEvent::Other);
    }

    #[test]
    fn test_snapshot_per_delta() {
        let mut session = ReplaySession::default();
        let mut transcript = data_frame(r#"{"type":"TEXT_MESSAGE_START","messageId":"m1","role":"assistant"}"#);
        transcript.push_str(&content("m1", "<llm:adk:soch>thinking"));
        transcript.push_str(&content("m1", "</llm:adk:soch>Hello"));
        transcript.push_str(&data_frame(r#"{"type":"TEXT_MESSAGE_END","messageId":"m1"}"#));

        let snapshots = session.feed(&transcript).unwrap();
        assert_eq!(snapshots.len(), 2);
        assert_eq!(snapshots[0].chunk_index, 1);
        assert_eq!(
            snapshots[0].decoded.segments,
            vec![Segment::thought("thinking", false)]
        );
        assert_eq!(
            snapshots[1].decoded.segments,
            vec![Segment::thought("thinking", true), Segment::response("Hello")]
        );

        let finals = session.final_snapshots();
        assert_eq!(finals.len(), 1);
        assert!(finals[0].is_final);
        assert_eq!(finals[0].chunk_index, 2);
    }

    #[test]
    fn test_interleaved_messages_accumulate_separately() {
        let mut session = ReplaySession::default();
        let transcript = [
            content("a", "one "),
            content("b", "uno "),
            content("a", "two"),
        ]
        .concat();
        let snapshots = session.feed(&transcript).unwrap();
        assert_eq!(snapshots.len(), 3);
        assert_eq!(session.message_text("a"), Some("one two"));
        assert_eq!(session.message_text("b"), Some("uno "));
        assert_eq!(session.message_ids(), &["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_invalid_event_json_is_an_error() {
        let mut session = ReplaySession::default();
        let err = session.feed("data: {not json}\n\n").unwrap_err();
        assert!(matches!(err, DecodeError::Event(_)));
    }

    #[test]
    fn test_done_and_empty_frames_are_ignored() {
        let mut session = ReplaySession::default();
        let snapshots = session.feed("data: [DONE]\n\ndata:\n\n").unwrap();
        assert!(snapshots.is_empty());
        assert!(session.final_snapshots().is_empty());
    }

    #[test]
    fn test_finish_flushes_last_frame() {
        let mut session = ReplaySession::default();
        let frame = content("m", "tail");
        let unterminated = frame.trim_end();
        assert!(session.feed(unterminated).unwrap().is_empty());
        let snapshots = session.finish().unwrap();
        assert_eq!(snapshots.len(), 1);
        assert_eq!(snapshots[0].decoded.segments, vec![Segment::response("tail")]);
    }
}
