pub mod config;
pub mod error;
pub mod json_scan;
pub mod message;
pub mod metadata;
pub mod observability;
pub mod pipeline;
pub mod stream;
pub mod tags;

pub use error::DecodeError;
pub use message::{decode_message_segments, ParsedMessage, Segment, ToolCall};
pub use pipeline::{decode, DecodedMessage, MessageDecoder, ToolOutput};
