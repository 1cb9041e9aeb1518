/// Outer segment decoder.
///
/// Splits the full accumulated text of one message into raw segments. The
/// function is called again on the whole string every time more text
/// arrives, so it must depend on nothing but its input.
///
/// Key invariants:
/// - Segments appear in the order their markers appear in the text.
/// - A tool tag whose JSON payload is not balanced yet is skipped for this
///   pass; a later pass sees it complete.
/// - An unclosed thought ends decoding: nothing after it can be trusted yet.
/// - Malformed payloads degrade to an empty object, never to a panic. A
///   payload whose close marker has arrived counts as complete even when its
///   quotes do not balance.
use std::sync::LazyLock;

use memchr::memmem;

use super::scanner::{find_next_tag, TagKind, TagMatch};
use super::{Segment, ToolCall};
use crate::json_scan::{extract_json_span, extract_json_span_naive, skip_ws};
use crate::tags::{THOUGHT_CLOSE, TOOL_CLOSE, TOOL_RESULT_CLOSE};

static THOUGHT_CLOSE_FINDER: LazyLock<memmem::Finder<'static>> =
    LazyLock::new(|| memmem::Finder::new(THOUGHT_CLOSE.as_bytes()));

/// Decode `text` into raw, unmerged segments.
#[must_use]
pub fn decode_segments(text: &str) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut cursor = 0usize;

    while cursor < text.len() {
        let rest = &text[cursor..];
        let Some(tag) = find_next_tag(rest) else {
            push_response(&mut segments, rest);
            break;
        };
        push_response(&mut segments, &rest[..tag.start]);
        let body_start = cursor + tag.end;

        match tag.kind {
            TagKind::Thought => {
                let body = &text[body_start..];
                let Some(close_rel) = THOUGHT_CLOSE_FINDER.find(body.as_bytes()) else {
                    segments.push(Segment::thought(body.trim(), false));
                    break;
                };
                segments.push(Segment::thought(body[..close_rel].trim(), true));
                cursor = body_start + close_rel + THOUGHT_CLOSE.len();
            }
            TagKind::ToolCall | TagKind::ToolResult => {
                let close = if tag.kind == TagKind::ToolCall {
                    TOOL_CLOSE
                } else {
                    TOOL_RESULT_CLOSE
                };
                match read_payload(text, body_start, close) {
                    Some((payload, next)) => {
                        segments.push(tool_segment(&tag, payload));
                        cursor = next;
                    }
                    None => {
                        tracing::trace!(
                            offset = cursor + tag.start,
                            "tool tag payload incomplete, skipping for this pass"
                        );
                        cursor = body_start;
                    }
                }
            }
        }
    }

    segments
}

fn push_response(segments: &mut Vec<Segment>, text: &str) {
    let trimmed = text.trim();
    if !trimmed.is_empty() {
        segments.push(Segment::response(trimmed));
    }
}

/// Read the JSON payload of a tool tag starting at `body_start`.
///
/// Returns the parsed value and the offset to resume scanning from (after
/// the close marker when present). `None` means the payload is not complete.
fn read_payload(text: &str, body_start: usize, close: &str) -> Option<(serde_json::Value, usize)> {
    let bytes = text.as_bytes();
    let json_start = skip_ws(bytes, body_start);
    let close_start = find_own_close(text, body_start, close);

    if bytes.get(json_start) == Some(&b'{') {
        match extract_json_span(text, json_start) {
            Some((span, span_end)) if close_start.map_or(true, |at| span_end <= at) => {
                return Some((parse_or_empty(span), skip_close_marker(text, span_end, close)));
            }
            _ => {
                // An odd number of unescaped quotes hides the closing brace
                // (or runs the span past the close marker). Once the close
                // marker is here the payload is complete, just not valid.
                let close_start = close_start?;
                let bounded = &text[..close_start];
                let raw = extract_json_span_naive(bounded, json_start)
                    .map_or_else(|| bounded[json_start..].trim(), |(span, _)| span);
                return Some((parse_or_empty(raw), close_start + close.len()));
            }
        }
    }

    // Not an object: only trust it once the close marker has arrived.
    let close_start = close_start?;
    let raw = text[body_start..close_start].trim();
    Some((parse_or_empty(raw), close_start + close.len()))
}

/// Start of this tag's close marker, if it arrives before any other open tag.
fn find_own_close(text: &str, body_start: usize, close: &str) -> Option<usize> {
    let body = &text[body_start..];
    let close_rel = memmem::find(body.as_bytes(), close.as_bytes())?;
    match find_next_tag(&body[..close_rel]) {
        Some(_) => None,
        None => Some(body_start + close_rel),
    }
}

fn parse_or_empty(raw: &str) -> serde_json::Value {
    match serde_json::from_str(raw) {
        Ok(value) => value,
        Err(err) => {
            tracing::debug!(error = %err, "malformed tool payload, using empty object");
            serde_json::Value::Object(serde_json::Map::new())
        }
    }
}

/// Skip an optional close marker (after optional whitespace) at `from`.
#[inline]
fn skip_close_marker(text: &str, from: usize, close: &str) -> usize {
    let at = skip_ws(text.as_bytes(), from);
    if text[at..].starts_with(close) {
        at + close.len()
    } else {
        from
    }
}

fn tool_segment(tag: &TagMatch<'_>, payload: serde_json::Value) -> Segment {
    let id = tag.id.unwrap_or_default().to_string();
    match tag.kind {
        TagKind::ToolCall => Segment::ToolCall(ToolCall {
            name: tag.name.unwrap_or_default().to_string(),
            id,
            args: payload,
            result: None,
        }),
        _ => Segment::ToolResult {
            id,
            result: payload,
        },
    }
}

#[cfg(test)]
#[path = "decoder_tests.rs"]
mod tests;
