//! Inner decoding layer: metadata tags embedded in a single tool's result text.
//!
//! Each decoder shares one contract: `extract(text) -> (Option<T>, cleaned)`.
//! When extraction succeeds the tag is stripped from the cleaned text; in
//! every other case the text is returned untouched, markers included, so the
//! reader sees raw markup rather than silently lost content.

pub mod escape;
pub mod grounding;
pub mod queries;
pub mod widgets;

use std::borrow::Cow;

use memchr::memmem;

use crate::json_scan::skip_ws;

pub use escape::normalize_escapes;
pub use grounding::{extract_grounding, GroundingMetadata, GroundingSource, GroundingSupport};
pub use queries::{extract_query_attempts, QueryAttempt, QueryAttemptsLog};
pub use widgets::{extract_widgets, ChartType, Widget};

/// How far past a payload's closing brace to look for its close marker.
pub const DEFAULT_CLOSE_LOOKAHEAD: usize = 64;

/// Result of one nested decoder: metadata if found, plus the display text.
pub type Extracted<'a, T> = (Option<T>, Cow<'a, str>);

/// Open/close spellings for one nested tag.
#[derive(Debug, Clone, Copy)]
pub(crate) struct TagSpellings {
    /// Name used in logs and errors.
    pub name: &'static str,
    /// Canonical spelling first.
    pub open: &'static [&'static str],
    pub close: &'static [&'static str],
}

/// An open marker located in the text.
#[derive(Debug, Clone, Copy)]
pub(crate) struct OpenMarker {
    pub start: usize,
    /// First byte after the marker.
    pub end: usize,
}

impl TagSpellings {
    /// Leftmost open marker at or after `from` whose payload starts with `{`
    /// (after optional whitespace) or has not arrived yet.
    ///
    /// On a tie the earlier spelling wins, so `<llm:…>` beats the bare
    /// spelling that is its own suffix.
    pub(crate) fn find_open(&self, text: &str, from: usize) -> Option<OpenMarker> {
        let bytes = text.as_bytes();
        let mut best: Option<OpenMarker> = None;
        for spelling in self.open {
            let mut search = from;
            while let Some(rel) = memmem::find(&bytes[search..], spelling.as_bytes()) {
                let start = search + rel;
                let end = start + spelling.len();
                search = start + 1;
                let payload = skip_ws(bytes, end);
                if payload < bytes.len() && bytes[payload] != b'{' {
                    continue;
                }
                if best.map_or(true, |current| start < current.start) {
                    best = Some(OpenMarker { start, end });
                }
                break;
            }
        }
        best
    }

    /// End offset of a close marker starting within `lookahead` bytes of
    /// whitespace after `from`, or `None` when there is none.
    pub(crate) fn find_close_after(&self, text: &str, from: usize, lookahead: usize) -> Option<usize> {
        let at = skip_ws(text.as_bytes(), from);
        if at - from > lookahead {
            return None;
        }
        let rest = &text[at..];
        self.close.iter().find_map(|spelling| {
            rest.strip_prefix(spelling).map(|after| {
                let end = at + spelling.len();
                if spelling.ends_with('>') || !after.starts_with('>') {
                    end
                } else {
                    end + 1
                }
            })
        })
    }

    /// Anywhere after `from`: the start and end of the first close marker.
    pub(crate) fn find_close_anywhere(&self, text: &str, from: usize) -> Option<(usize, usize)> {
        let bytes = text.as_bytes();
        self.close
            .iter()
            .filter_map(|spelling| {
                memmem::find(&bytes[from..], spelling.as_bytes())
                    .map(|rel| (from + rel, from + rel + spelling.len()))
            })
            .min_by_key(|(start, _)| *start)
    }
}

/// Remove the byte ranges in `cut` (sorted, non-overlapping) from `text`,
/// joining the pieces on a line break and trimming the result.
pub(crate) fn strip_ranges(text: &str, cut: &[(usize, usize)]) -> String {
    let mut out = String::with_capacity(text.len());
    let mut cursor = 0usize;
    for &(start, end) in cut {
        push_piece(&mut out, &text[cursor..start]);
        cursor = end;
    }
    push_piece(&mut out, &text[cursor..]);
    out
}

fn push_piece(out: &mut String, piece: &str) {
    let piece = piece.trim();
    if piece.is_empty() {
        return;
    }
    if !out.is_empty() {
        out.push('\n');
    }
    out.push_str(piece);
}
