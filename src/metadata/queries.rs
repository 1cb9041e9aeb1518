//! SQL query-attempt log (`<llm:data:queries>`).

use std::borrow::Cow;

use serde::{Deserialize, Serialize};

use super::{strip_ranges, Extracted, OpenMarker, TagSpellings, DEFAULT_CLOSE_LOOKAHEAD};
use crate::error::DecodeError;
use crate::json_scan::{extract_json_span, skip_ws};
use crate::tags::{QUERIES_CLOSE, QUERIES_CLOSE_ALT, QUERIES_OPEN, QUERIES_OPEN_ALT};

pub(crate) const SPELLINGS: TagSpellings = TagSpellings {
    name: "llm:data:queries",
    open: &[QUERIES_OPEN, QUERIES_OPEN_ALT],
    close: &[QUERIES_CLOSE, QUERIES_CLOSE_ALT],
};

/// One execution attempt of a generated SQL query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryAttempt {
    pub query: String,
    pub success: bool,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default, alias = "bytesProcessed")]
    pub bytes_processed: u64,
    #[serde(default, alias = "rowCount")]
    pub row_count: u64,
}

/// Attempts in chronological order; the last one is the final attempt.
pub type QueryAttemptsLog = Vec<QueryAttempt>;

#[derive(Deserialize)]
struct Envelope {
    attempts: QueryAttemptsLog,
}

/// The attempt that settled the query, if any were made.
#[must_use]
pub fn final_attempt(log: &[QueryAttempt]) -> Option<&QueryAttempt> {
    log.last()
}

/// Extract the query-attempt log from a tool result's text.
#[must_use]
pub fn extract_query_attempts(text: &str) -> Extracted<'_, QueryAttemptsLog> {
    extract_query_attempts_with_lookahead(text, DEFAULT_CLOSE_LOOKAHEAD)
}

#[must_use]
pub fn extract_query_attempts_with_lookahead(
    text: &str,
    lookahead: usize,
) -> Extracted<'_, QueryAttemptsLog> {
    let Some(open) = SPELLINGS.find_open(text, 0) else {
        return (None, Cow::Borrowed(text));
    };
    match decode_at(text, open, lookahead) {
        Ok((attempts, tag_end)) => {
            let cleaned = strip_ranges(text, &[(open.start, tag_end)]);
            (Some(attempts), Cow::Owned(cleaned))
        }
        Err(err) => {
            tracing::debug!(error = %err, "query attempts tag left in place");
            (None, Cow::Borrowed(text))
        }
    }
}

fn decode_at(
    text: &str,
    open: OpenMarker,
    lookahead: usize,
) -> Result<(QueryAttemptsLog, usize), DecodeError> {
    let json_start = skip_ws(text.as_bytes(), open.end);
    let (span, span_end) = extract_json_span(text, json_start)
        .ok_or(DecodeError::Truncated { tag: SPELLINGS.name })?;
    let envelope: Envelope = serde_json::from_str(span).map_err(|source| DecodeError::Malformed {
        tag: SPELLINGS.name,
        source,
    })?;
    let tag_end = SPELLINGS
        .find_close_after(text, span_end, lookahead)
        .unwrap_or(span_end);
    Ok((envelope.attempts, tag_end))
}

#[cfg(test)]
mod tests {
    use super::*;

    const LOG: &str = r#"{"attempts":[{"query":"SELECT x FROM t","success":false,"error":"Unrecognized name: x","bytes_processed":0,"row_count":0},{"query":"SELECT y FROM t","success":true,"error":null,"bytes_processed":2048,"row_count":12}]}"#;

    #[test]
    fn test_attempts_parsed_in_order() {
        let text = format!("Here are the results.\n<llm:data:queries>{LOG}</llm:data:queries>");
        let (log, cleaned) = extract_query_attempts(&text);
        let log = log.unwrap();
        assert_eq!(log.len(), 2);
        assert!(!log[0].success);
        assert_eq!(log[0].error.as_deref(), Some("Unrecognized name: x"));
        let last = final_attempt(&log).unwrap();
        assert!(last.success);
        assert_eq!(last.row_count, 12);
        assert_eq!(cleaned, "Here are the results.");
    }

    #[test]
    fn test_camel_case_fields_accepted() {
        let text = r#"<llm:data:queries>{"attempts":[{"query":"q","success":true,"bytesProcessed":5,"rowCount":1}]}</llm:data:queries>"#;
        let log = extract_query_attempts(text).0.unwrap();
        assert_eq!(log[0].bytes_processed, 5);
        assert_eq!(log[0].row_count, 1);
        assert_eq!(log[0].error, None);
    }

    #[test]
    fn test_alt_spelling_accepted() {
        let text = format!("done llm:data:queries{LOG}/llm:data:queries");
        let (log, cleaned) = extract_query_attempts(&text);
        assert_eq!(log.map(|l| l.len()), Some(2));
        assert_eq!(cleaned, "done");
    }

    #[test]
    fn test_malformed_payload_left_in_text() {
        let text = r#"x <llm:data:queries>{"attempts":[{"query":"q"}]}</llm:data:queries>"#;
        let (log, cleaned) = extract_query_attempts(text);
        assert!(log.is_none());
        assert_eq!(cleaned, text);
    }

    #[test]
    fn test_truncated_payload_left_in_text() {
        let text = r#"x <llm:data:queries>{"attempts":[{"query":"SELECT"#;
        let (log, cleaned) = extract_query_attempts(text);
        assert!(log.is_none());
        assert_eq!(cleaned, text);
    }

    #[test]
    fn test_empty_log() {
        assert!(final_attempt(&[]).is_none());
        let (log, cleaned) = extract_query_attempts(r#"<llm:data:queries>{"attempts":[]}</llm:data:queries>"#);
        assert_eq!(log, Some(Vec::new()));
        assert_eq!(cleaned, "");
    }
}
