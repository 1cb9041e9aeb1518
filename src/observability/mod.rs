use tracing_subscriber::EnvFilter;

use crate::config::LogFormat;
use crate::message::Segment;
use crate::pipeline::DecodedMessage;

/// Initialize the tracing subscriber with the configured log level.
///
/// Maps config log levels to tracing levels:
/// - "DISABLED" -> no subscriber installed
/// - "WARNING" -> WARN
/// - "CRITICAL" -> ERROR
/// - Others map directly (DEBUG, INFO, ERROR)
///
/// Logs go to stderr so decoded JSON on stdout stays clean.
pub fn init_tracing(log_level: &str, format: LogFormat) {
    let level = log_level.to_uppercase();

    if level == "DISABLED" {
        return;
    }

    let tracing_level = match level.as_str() {
        "WARNING" => "WARN",
        "CRITICAL" => "ERROR",
        other => other,
    };

    let filter = EnvFilter::try_new(tracing_level).unwrap_or_else(|_| EnvFilter::new("INFO"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

/// Per-decode counts, as logged by [`log_decode_summary`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecodeSummary {
    pub thoughts: usize,
    pub responses: usize,
    pub tool_calls: usize,
    pub pending_tool_calls: usize,
    pub grounded: usize,
    pub query_attempts: usize,
    pub widgets: usize,
}

impl DecodeSummary {
    #[must_use]
    pub fn of(decoded: &DecodedMessage) -> Self {
        let mut summary = Self::default();
        for segment in &decoded.segments {
            match segment {
                Segment::Thought { .. } => summary.thoughts += 1,
                Segment::Response { .. } => summary.responses += 1,
                Segment::ToolCall(call) => {
                    summary.tool_calls += 1;
                    if call.result.is_none() {
                        summary.pending_tool_calls += 1;
                    }
                }
                Segment::ToolResult { .. } => {}
            }
        }
        for output in &decoded.tool_outputs {
            summary.grounded += usize::from(output.grounding.is_some());
            summary.query_attempts += output.query_attempts.as_ref().map_or(0, Vec::len);
            summary.widgets += output.widgets.as_ref().map_or(0, Vec::len);
        }
        summary
    }
}

/// Emit one structured debug event describing a decode result.
pub fn log_decode_summary(message_id: &str, text_len: usize, decoded: &DecodedMessage) {
    let summary = DecodeSummary::of(decoded);
    tracing::debug!(
        message_id,
        text_len,
        segments = decoded.segments.len(),
        thoughts = summary.thoughts,
        responses = summary.responses,
        tool_calls = summary.tool_calls,
        pending_tool_calls = summary.pending_tool_calls,
        grounded = summary.grounded,
        query_attempts = summary.query_attempts,
        widgets = summary.widgets,
        "Decoded message"
    );
}
