//! Outer decoding layer: one message's accumulated text to ordered segments.

pub mod decoder;
pub mod merge;
pub mod scanner;

use serde::Serialize;

pub use decoder::decode_segments;
pub use merge::merge_segments;
pub use scanner::{find_next_tag, TagKind, TagMatch};

/// One decoded unit of a message.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Segment {
    Thought {
        content: String,
        is_complete: bool,
    },
    Response {
        content: String,
    },
    ToolCall(ToolCall),
    /// Intermediate only; [`merge_segments`] folds it into its [`ToolCall`].
    ToolResult {
        id: String,
        result: serde_json::Value,
    },
}

/// A tool invocation, with its result once one has been seen.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolCall {
    pub name: String,
    pub id: String,
    pub args: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
}

/// Ordered segments for one decode call. Never mutated after creation.
pub type ParsedMessage = Vec<Segment>;

impl Segment {
    #[must_use]
    pub fn thought(content: impl Into<String>, is_complete: bool) -> Self {
        Segment::Thought {
            content: content.into(),
            is_complete,
        }
    }

    #[must_use]
    pub fn response(content: impl Into<String>) -> Self {
        Segment::Response {
            content: content.into(),
        }
    }

    #[must_use]
    pub fn as_tool_call(&self) -> Option<&ToolCall> {
        match self {
            Segment::ToolCall(call) => Some(call),
            _ => None,
        }
    }

    /// Short label for logs.
    #[must_use]
    pub fn kind_label(&self) -> &'static str {
        match self {
            Segment::Thought { .. } => "thought",
            Segment::Response { .. } => "response",
            Segment::ToolCall(_) => "tool_call",
            Segment::ToolResult { .. } => "tool_result",
        }
    }
}

/// Decode and merge: the full outer layer.
#[must_use]
pub fn decode_message_segments(text: &str) -> ParsedMessage {
    merge_segments(decode_segments(text))
}
