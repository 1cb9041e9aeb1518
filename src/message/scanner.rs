use std::sync::LazyLock;

use memchr::{memchr2, memmem};

use crate::tags::{THOUGHT_OPEN, TOOL_OPEN_PREFIX, TOOL_RESULT_OPEN_PREFIX};

static THOUGHT_OPEN_FINDER: LazyLock<memmem::Finder<'static>> =
    LazyLock::new(|| memmem::Finder::new(THOUGHT_OPEN.as_bytes()));
static TOOL_OPEN_FINDER: LazyLock<memmem::Finder<'static>> =
    LazyLock::new(|| memmem::Finder::new(TOOL_OPEN_PREFIX.as_bytes()));
static TOOL_RESULT_OPEN_FINDER: LazyLock<memmem::Finder<'static>> =
    LazyLock::new(|| memmem::Finder::new(TOOL_RESULT_OPEN_PREFIX.as_bytes()));

/// Which open marker matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagKind {
    Thought,
    ToolCall,
    ToolResult,
}

/// An open marker found by [`find_next_tag`].
///
/// `start..end` covers the whole open tag; the payload begins at `end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TagMatch<'a> {
    pub kind: TagKind,
    pub start: usize,
    pub end: usize,
    pub name: Option<&'a str>,
    pub id: Option<&'a str>,
}

/// Find the leftmost open marker of any known kind in `text`.
///
/// Leftmost wins so that segments keep the order the model emitted them in.
#[must_use]
pub fn find_next_tag(text: &str) -> Option<TagMatch<'_>> {
    let candidates = [
        find_thought_open(text),
        find_tool_call_open(text),
        find_tool_result_open(text),
    ];
    candidates.into_iter().flatten().min_by_key(|tag| tag.start)
}

fn find_thought_open(text: &str) -> Option<TagMatch<'_>> {
    let start = THOUGHT_OPEN_FINDER.find(text.as_bytes())?;
    Some(TagMatch {
        kind: TagKind::Thought,
        start,
        end: start + THOUGHT_OPEN.len(),
        name: None,
        id: None,
    })
}

fn find_tool_call_open(text: &str) -> Option<TagMatch<'_>> {
    let bytes = text.as_bytes();
    let mut from = 0usize;
    while let Some(rel) = TOOL_OPEN_FINDER.find(&bytes[from..]) {
        let start = from + rel;
        from = start + 1;
        let attrs_start = start + TOOL_OPEN_PREFIX.len();
        if !bytes.get(attrs_start).is_some_and(u8::is_ascii_whitespace) {
            continue;
        }
        let Some(end) = open_tag_end(bytes, attrs_start) else {
            continue;
        };
        let attrs = &text[attrs_start..end - 1];
        let (Some(name), Some(id)) = (extract_attr(attrs, b"name"), extract_attr(attrs, b"id"))
        else {
            continue;
        };
        return Some(TagMatch {
            kind: TagKind::ToolCall,
            start,
            end,
            name: Some(name),
            id: Some(id),
        });
    }
    None
}

fn find_tool_result_open(text: &str) -> Option<TagMatch<'_>> {
    let bytes = text.as_bytes();
    let mut from = 0usize;
    while let Some(rel) = TOOL_RESULT_OPEN_FINDER.find(&bytes[from..]) {
        let start = from + rel;
        from = start + 1;
        let attrs_start = start + TOOL_RESULT_OPEN_PREFIX.len();
        if !bytes.get(attrs_start).is_some_and(u8::is_ascii_whitespace) {
            continue;
        }
        let Some(end) = open_tag_end(bytes, attrs_start) else {
            continue;
        };
        let Some(id) = extract_attr(&text[attrs_start..end - 1], b"id") else {
            continue;
        };
        return Some(TagMatch {
            kind: TagKind::ToolResult,
            start,
            end,
            name: None,
            id: Some(id),
        });
    }
    None
}

/// Offset one past the `>` closing an open tag whose attributes start at `from`.
///
/// A `<` before the `>` means the tag was cut off and something else started.
#[inline]
fn open_tag_end(bytes: &[u8], from: usize) -> Option<usize> {
    let rel = memchr2(b'>', b'<', &bytes[from..])?;
    let at = from + rel;
    (bytes[at] == b'>').then_some(at + 1)
}

/// Read `attr="value"` (or single-quoted) out of an open tag's attribute text.
#[inline]
fn extract_attr<'a>(attrs: &'a str, attr: &[u8]) -> Option<&'a str> {
    let bytes = attrs.as_bytes();
    let mut search_from = 0usize;
    while let Some(rel_name) = memmem::find(&bytes[search_from..], attr) {
        let name_start = search_from + rel_name;
        let name_end = name_start + attr.len();
        search_from = name_start + 1;
        if name_start > 0 && is_attr_char(bytes[name_start - 1]) {
            continue;
        }
        if bytes.get(name_end).copied().is_some_and(is_attr_char) {
            continue;
        }
        let mut idx = name_end;
        while bytes.get(idx).is_some_and(u8::is_ascii_whitespace) {
            idx += 1;
        }
        if bytes.get(idx) != Some(&b'=') {
            continue;
        }
        idx += 1;
        while bytes.get(idx).is_some_and(u8::is_ascii_whitespace) {
            idx += 1;
        }
        let quote = *bytes.get(idx)?;
        if quote != b'"' && quote != b'\'' {
            continue;
        }
        let value_start = idx + 1;
        let value_end = value_start + memchr::memchr(quote, &bytes[value_start..])?;
        return attrs.get(value_start..value_end).map(str::trim);
    }
    None
}

#[inline]
const fn is_attr_char(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || matches!(byte, b'_' | b'-' | b':')
}
