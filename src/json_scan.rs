use memchr::memchr3;

#[inline]
pub(crate) fn skip_ws(bytes: &[u8], mut i: usize) -> usize {
    let len = bytes.len();
    while i < len {
        match bytes[i] {
            b' ' | b'\n' | b'\r' | b'\t' => i += 1,
            _ => break,
        }
    }
    i
}

/// Find the end of a JSON string literal starting at `start` (the opening quote).
///
/// Unlike a strict JSON scanner this accepts raw control characters, since
/// model output regularly contains literal newlines inside string values.
/// Returns `None` when input ends inside the literal.
#[inline]
pub(crate) fn string_literal_end(bytes: &[u8], start: usize) -> Option<usize> {
    let len = bytes.len();
    if start >= len || bytes[start] != b'"' {
        return None;
    }
    let mut i = start + 1;
    while i < len {
        match bytes[i] {
            b'"' => return Some(i + 1),
            b'\\' => {
                i += 1;
                if i >= len {
                    return None;
                }
                i += 1;
            }
            _ => i += 1,
        }
    }
    None
}

/// Extract the balanced JSON object starting at `json_start`.
///
/// `text[json_start]` must be `{`. Returns the object text and the offset one
/// past its closing brace. Braces inside string literals do not count.
/// `None` means the object is not closed yet: the payload is still streaming.
#[must_use]
pub fn extract_json_span(text: &str, json_start: usize) -> Option<(&str, usize)> {
    let bytes = text.as_bytes();
    if bytes.get(json_start) != Some(&b'{') {
        return None;
    }
    let mut depth = 0usize;
    let mut i = json_start;
    while i < bytes.len() {
        let rel = memchr3(b'{', b'}', b'"', &bytes[i..])?;
        let at = i + rel;
        match bytes[at] {
            b'{' => {
                depth += 1;
                i = at + 1;
            }
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    let end = at + 1;
                    return Some((&text[json_start..end], end));
                }
                i = at + 1;
            }
            _ => i = string_literal_end(bytes, at)?,
        }
    }
    None
}

/// Plain brace counter with no string-literal awareness.
///
/// Only safe when the caller already knows the payload is complete (its
/// closing marker is present); a quote imbalance from unescaped model output
/// cannot desynchronise it.
#[must_use]
pub fn extract_json_span_naive(text: &str, json_start: usize) -> Option<(&str, usize)> {
    let bytes = text.as_bytes();
    if bytes.get(json_start) != Some(&b'{') {
        return None;
    }
    let mut depth = 0usize;
    for (offset, &byte) in bytes[json_start..].iter().enumerate() {
        match byte {
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    let end = json_start + offset + 1;
                    return Some((&text[json_start..end], end));
                }
            }
            _ => {}
        }
    }
    None
}
