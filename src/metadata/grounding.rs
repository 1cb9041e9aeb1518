/// Search grounding metadata (`<llm:adk:sources>`).
///
/// The search model is known to emit free-text titles with unescaped quotes,
/// so this is the one nested decoder with a fallback: when strict JSON
/// parsing fails, fixed-field regular expressions pull out the `queries`
/// array and every `{title, uri, domain}` object that still has that shape.
use std::borrow::Cow;
use std::sync::LazyLock;

use regex_lite::Regex;
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};

use super::{strip_ranges, Extracted, OpenMarker, TagSpellings, DEFAULT_CLOSE_LOOKAHEAD};
use crate::error::DecodeError;
use crate::json_scan::{extract_json_span, extract_json_span_naive, skip_ws};
use crate::tags::{SOURCES_CLOSE, SOURCES_CLOSE_ALT, SOURCES_OPEN, SOURCES_OPEN_ALT};

pub(crate) const SPELLINGS: TagSpellings = TagSpellings {
    name: "llm:adk:sources",
    open: &[SOURCES_OPEN, SOURCES_OPEN_ALT],
    close: &[SOURCES_CLOSE, SOURCES_CLOSE_ALT],
};

/// Queries the search model issued and the web sources it cited.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GroundingMetadata {
    #[serde(default)]
    pub queries: Vec<String>,
    /// Raw, in first-seen order; see [`GroundingMetadata::unique_sources`].
    #[serde(default)]
    pub sources: Vec<GroundingSource>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub supports: Vec<GroundingSupport>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroundingSource {
    #[serde(default)]
    pub title: Option<String>,
    pub uri: String,
    #[serde(default)]
    pub domain: Option<String>,
}

/// A span of the answer text backed by one or more sources.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroundingSupport {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default, rename = "startIndex", alias = "start_index")]
    pub start_index: Option<u64>,
    #[serde(default, rename = "endIndex", alias = "end_index")]
    pub end_index: Option<u64>,
    #[serde(default, rename = "sourceIndices", alias = "source_indices")]
    pub source_indices: Vec<u64>,
}

impl GroundingMetadata {
    /// Sources with repeats removed, keyed by domain when present, else by uri.
    #[must_use]
    pub fn unique_sources(&self) -> Vec<&GroundingSource> {
        let mut seen: FxHashSet<&str> = FxHashSet::default();
        self.sources
            .iter()
            .filter(|source| seen.insert(source.domain.as_deref().unwrap_or(&source.uri)))
            .collect()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queries.is_empty() && self.sources.is_empty()
    }
}

/// Extract grounding metadata from a tool result's text.
#[must_use]
pub fn extract_grounding(text: &str) -> Extracted<'_, GroundingMetadata> {
    extract_grounding_with_lookahead(text, DEFAULT_CLOSE_LOOKAHEAD)
}

#[must_use]
pub fn extract_grounding_with_lookahead(
    text: &str,
    lookahead: usize,
) -> Extracted<'_, GroundingMetadata> {
    let Some(open) = SPELLINGS.find_open(text, 0) else {
        return (None, Cow::Borrowed(text));
    };
    match decode_at(text, open, lookahead) {
        Ok((metadata, tag_end)) => {
            let cleaned = strip_ranges(text, &[(open.start, tag_end)]);
            (Some(metadata), Cow::Owned(cleaned))
        }
        Err(err) => {
            tracing::debug!(error = %err, "grounding tag left in place");
            (None, Cow::Borrowed(text))
        }
    }
}

/// Decode the payload after `open`, returning the metadata and the end of the tag.
fn decode_at(
    text: &str,
    open: OpenMarker,
    lookahead: usize,
) -> Result<(GroundingMetadata, usize), DecodeError> {
    let json_start = skip_ws(text.as_bytes(), open.end);
    let close = SPELLINGS.find_close_anywhere(text, open.end);

    match extract_json_span(text, json_start) {
        Some((span, span_end)) if close.map_or(true, |(start, _)| span_end <= start) => {
            let tag_end = SPELLINGS
                .find_close_after(text, span_end, lookahead)
                .unwrap_or(span_end);
            match serde_json::from_str::<GroundingMetadata>(span) {
                Ok(metadata) => Ok((metadata, tag_end)),
                Err(source) => {
                    tracing::debug!(error = %source, "strict grounding parse failed, trying fallback");
                    fallback_parse(span).map(|metadata| (metadata, tag_end))
                }
            }
        }
        _ => {
            // A quote imbalance can hide the closing brace from the string-aware
            // scan, or carry the span past the close marker; a present close
            // marker still proves the payload is complete.
            let (close_start, close_end) =
                close.ok_or(DecodeError::Truncated { tag: SPELLINGS.name })?;
            let bounded = &text[..close_start];
            let payload = extract_json_span_naive(bounded, json_start)
                .map_or_else(|| bounded[json_start..].trim(), |(span, _)| span);
            let metadata = fallback_parse(payload)?;
            Ok((metadata, close_end))
        }
    }
}

static QUERIES_RE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r#"(?s)"queries"\s*:\s*\[(.*?)\]"#).ok());
static STRING_ITEM_RE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r#""((?:[^"\\]|\\.)*)""#).ok());
static SOURCE_RE: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(concat!(
        r#"(?s)\{\s*"title"\s*:\s*(?:null|"(.*?)")\s*,"#,
        r#"\s*"uri"\s*:\s*"((?:[^"\\]|\\.)*)""#,
        r#"(?:\s*,\s*"domain"\s*:\s*(?:null|"((?:[^"\\]|\\.)*)"))?\s*\}"#,
    ))
    .ok()
});

/// Regex recovery for payloads strict JSON parsing rejected.
fn fallback_parse(payload: &str) -> Result<GroundingMetadata, DecodeError> {
    let mut metadata = GroundingMetadata::default();

    if let (Some(queries_re), Some(item_re)) = (QUERIES_RE.as_ref(), STRING_ITEM_RE.as_ref()) {
        if let Some(list) = queries_re.captures(payload).and_then(|caps| caps.get(1)) {
            metadata.queries = item_re
                .captures_iter(list.as_str())
                .filter_map(|caps| caps.get(1))
                .map(|item| unescape_fragment(item.as_str()))
                .collect();
        }
    }

    if let Some(source_re) = SOURCE_RE.as_ref() {
        metadata.sources = source_re
            .captures_iter(payload)
            .filter_map(|caps| {
                let uri = caps.get(2)?;
                Some(GroundingSource {
                    title: caps.get(1).map(|m| unescape_fragment(m.as_str())),
                    uri: unescape_fragment(uri.as_str()),
                    domain: caps.get(3).map(|m| unescape_fragment(m.as_str())),
                })
            })
            .collect();
    }

    if metadata.is_empty() {
        return Err(DecodeError::FallbackEmpty { tag: SPELLINGS.name });
    }
    tracing::debug!(
        queries = metadata.queries.len(),
        sources = metadata.sources.len(),
        "grounding recovered by fallback"
    );
    Ok(metadata)
}

/// Decode JSON escapes in a captured string body, keeping it raw when that fails.
fn unescape_fragment(raw: &str) -> String {
    if !raw.contains('\\') {
        return raw.to_string();
    }
    serde_json::from_str::<String>(&format!("\"{raw}\"")).unwrap_or_else(|_| raw.to_string())
}
