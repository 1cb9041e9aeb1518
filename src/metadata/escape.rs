use std::borrow::Cow;

use memchr::{memchr, memmem};

use crate::tags::{QUERIES_CLOSE_ALT, QUERIES_OPEN_ALT, SOURCES_CLOSE_ALT, SOURCES_OPEN_ALT};

/// Bare open/close names of the nested tags; they survive escaping mangling
/// the surrounding `<`/`>`.
const NESTED_TAGS: &[(&str, &str)] = &[
    (SOURCES_OPEN_ALT, SOURCES_CLOSE_ALT),
    (QUERIES_OPEN_ALT, QUERIES_CLOSE_ALT),
    ("llm:data:widget", "/llm:data:widget"),
];

/// Replace literal `\n`, `\"` and `\t` escapes that leaked into a tool
/// result through double encoding.
///
/// Prose outside nested tags is always unescaped, so a result that mixes real
/// line breaks with literal `\n` reads cleanly. A nested tag is rewritten only
/// when its payload is itself double-encoded (an escaped object key, `{\"`);
/// otherwise escapes inside its JSON strings are left alone. Text with nothing
/// to rewrite comes back borrowed.
#[must_use]
pub fn normalize_escapes(text: &str) -> Cow<'_, str> {
    let bytes = text.as_bytes();
    if memchr(b'\\', bytes).is_none() {
        return Cow::Borrowed(text);
    }

    let mut out = String::with_capacity(text.len());
    let mut changed = false;
    let mut cursor = 0usize;
    while let Some((start, end)) = next_tag_region(bytes, cursor) {
        changed |= unescape_into(&mut out, &text[cursor..start]);
        let region = &text[start..end];
        if memmem::find(region.as_bytes(), b"{\\\"").is_some() {
            changed |= unescape_into(&mut out, region);
        } else {
            out.push_str(region);
        }
        cursor = end;
    }
    changed |= unescape_into(&mut out, &text[cursor..]);

    if changed {
        Cow::Owned(out)
    } else {
        Cow::Borrowed(text)
    }
}

/// Leftmost nested tag at or after `from`, from its open name through its
/// close name (or the end of the text while it is still streaming).
fn next_tag_region(bytes: &[u8], from: usize) -> Option<(usize, usize)> {
    let (start, open, close) = NESTED_TAGS
        .iter()
        .filter_map(|&(open, close)| {
            memmem::find(&bytes[from..], open.as_bytes()).map(|rel| (from + rel, open, close))
        })
        .min_by_key(|(start, _, _)| *start)?;
    let body = start + open.len();
    let end = memmem::find(&bytes[body..], close.as_bytes())
        .map_or(bytes.len(), |rel| body + rel + close.len());
    Some((start, end))
}

/// Append `piece` with its literal escapes replaced; `true` if any was.
fn unescape_into(out: &mut String, piece: &str) -> bool {
    let bytes = piece.as_bytes();
    let mut changed = false;
    let mut cursor = 0usize;
    while let Some(rel) = memchr(b'\\', &bytes[cursor..]) {
        let at = cursor + rel;
        out.push_str(&piece[cursor..at]);
        let replacement = match bytes.get(at + 1) {
            Some(b'n') => Some('\n'),
            Some(b'"') => Some('"'),
            Some(b't') => Some('\t'),
            _ => None,
        };
        match replacement {
            Some(ch) => {
                out.push(ch);
                changed = true;
                cursor = at + 2;
            }
            None => {
                out.push('\\');
                cursor = at + 1;
            }
        }
    }
    out.push_str(&piece[cursor..]);
    changed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_text_is_borrowed() {
        let text = "line one\nline two with \"quotes\"";
        assert!(matches!(normalize_escapes(text), Cow::Borrowed(_)));
    }

    #[test]
    fn test_json_escapes_in_decoded_text_survive() {
        let text = "Answer:\n<llm:adk:sources>{\"queries\":[\"a\\nb\"]}</llm:adk:sources>";
        assert_eq!(normalize_escapes(text), text);
    }

    #[test]
    fn test_double_encoded_newlines_and_tabs() {
        assert_eq!(normalize_escapes(r"one\ntwo\tthree"), "one\ntwo\tthree");
    }

    #[test]
    fn test_double_encoded_json_payload() {
        let text = r#"See below <llm:data:queries>{\"attempts\":[]}</llm:data:queries>"#;
        assert_eq!(
            normalize_escapes(text),
            r#"See below <llm:data:queries>{"attempts":[]}</llm:data:queries>"#
        );
    }

    #[test]
    fn test_mixed_prose_is_unescaped_but_payload_is_not() {
        let text = "Line one\nthen a literal\\nline two\n<llm:adk:sources>{\"queries\":[\"a\\nb\"]}</llm:adk:sources>";
        assert_eq!(
            normalize_escapes(text),
            "Line one\nthen a literal\nline two\n<llm:adk:sources>{\"queries\":[\"a\\nb\"]}</llm:adk:sources>"
        );
    }

    #[test]
    fn test_streaming_payload_is_protected() {
        let text = "Done.\\n<llm:data:widget>{\"id\":\"w\",\"title\":\"a\\tb";
        assert_eq!(
            normalize_escapes(text),
            "Done.\n<llm:data:widget>{\"id\":\"w\",\"title\":\"a\\tb"
        );
    }

    #[test]
    fn test_backslash_without_escape_is_borrowed() {
        assert!(matches!(normalize_escapes(r"C:\path"), Cow::Borrowed(_)));
    }

    #[test]
    fn test_other_backslashes_kept() {
        assert_eq!(normalize_escapes(r"C:\path\n\x"), "C:\\path\n\\x");
        assert_eq!(normalize_escapes(r"trailing\n\"), "trailing\n\\");
    }
}
