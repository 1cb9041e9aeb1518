//! Tag vocabulary and the emitting side of the mini-language.
//!
//! Every marker is a case-sensitive literal. The `llm:adk` namespace covers
//! agent-level structure (thoughts, tool traffic, search grounding); the
//! `llm:data` namespace covers the data-analysis tool's query log and charts.

use std::fmt::Write as _;

use crate::metadata::{GroundingMetadata, QueryAttempt, Widget};

pub const THOUGHT_OPEN: &str = "<llm:adk:soch>";
pub const THOUGHT_CLOSE: &str = "</llm:adk:soch>";

/// Prefix of `<llm:adk:tool name="…" id="…">`; must be followed by whitespace.
pub const TOOL_OPEN_PREFIX: &str = "<llm:adk:tool";
pub const TOOL_CLOSE: &str = "</llm:adk:tool>";

/// Prefix of `<llm:adk:tool-result id="…">`.
pub const TOOL_RESULT_OPEN_PREFIX: &str = "<llm:adk:tool-result";
pub const TOOL_RESULT_CLOSE: &str = "</llm:adk:tool-result>";

pub const SOURCES_OPEN: &str = "<llm:adk:sources>";
pub const SOURCES_CLOSE: &str = "</llm:adk:sources>";
/// What remains of the sources markers after an HTML-escaping pass.
pub const SOURCES_OPEN_ALT: &str = "llm:adk:sources";
pub const SOURCES_CLOSE_ALT: &str = "/llm:adk:sources";

pub const QUERIES_OPEN: &str = "<llm:data:queries>";
pub const QUERIES_CLOSE: &str = "</llm:data:queries>";
pub const QUERIES_OPEN_ALT: &str = "llm:data:queries";
pub const QUERIES_CLOSE_ALT: &str = "/llm:data:queries";

pub const WIDGET_OPEN: &str = "<llm:data:widget>";
pub const WIDGET_CLOSE: &str = "</llm:data:widget>";

/// Rows shown in tabular widget views; charts use the full data.
pub const TABLE_DISPLAY_LIMIT: u64 = 1000;

#[must_use]
pub fn thought_tag(text: &str) -> String {
    let mut out = String::with_capacity(THOUGHT_OPEN.len() + text.len() + THOUGHT_CLOSE.len());
    out.push_str(THOUGHT_OPEN);
    out.push_str(text);
    out.push_str(THOUGHT_CLOSE);
    out
}

#[must_use]
pub fn tool_call_tag(name: &str, id: &str, args: &serde_json::Value) -> String {
    let mut out = String::with_capacity(64 + name.len() + id.len());
    let _ = write!(out, "{TOOL_OPEN_PREFIX} name=\"{name}\" id=\"{id}\">{args}{TOOL_CLOSE}");
    out
}

#[must_use]
pub fn tool_result_tag(id: &str, result: &serde_json::Value) -> String {
    let mut out = String::with_capacity(64 + id.len());
    let _ = write!(out, "{TOOL_RESULT_OPEN_PREFIX} id=\"{id}\">{result}{TOOL_RESULT_CLOSE}");
    out
}

fn wrap_json<T: serde::Serialize>(open: &str, value: &T, close: &str) -> String {
    // Serializing these plain structs cannot fail; an empty object keeps the tag well-formed.
    let json = serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string());
    let mut out = String::with_capacity(open.len() + json.len() + close.len());
    out.push_str(open);
    out.push_str(&json);
    out.push_str(close);
    out
}

#[must_use]
pub fn sources_tag(metadata: &GroundingMetadata) -> String {
    wrap_json(SOURCES_OPEN, metadata, SOURCES_CLOSE)
}

#[must_use]
pub fn queries_tag(attempts: &[QueryAttempt]) -> String {
    #[derive(serde::Serialize)]
    struct Envelope<'a> {
        attempts: &'a [QueryAttempt],
    }
    wrap_json(QUERIES_OPEN, &Envelope { attempts }, QUERIES_CLOSE)
}

#[must_use]
pub fn widget_tag(widget: &Widget) -> String {
    wrap_json(WIDGET_OPEN, &widget.to_wire(), WIDGET_CLOSE)
}

/// One tag per widget, newline separated.
#[must_use]
pub fn widget_tags(widgets: &[Widget]) -> String {
    widgets
        .iter()
        .map(widget_tag)
        .collect::<Vec<_>>()
        .join("\n")
}

/// Append a tag to model text on its own line.
#[must_use]
pub fn append_tag(text: &str, tag: &str) -> String {
    if text.is_empty() {
        return tag.to_string();
    }
    let mut out = String::with_capacity(text.len() + 1 + tag.len());
    out.push_str(text);
    out.push('\n');
    out.push_str(tag);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{ChartType, GroundingSource};

    #[test]
    fn test_thought_tag() {
        assert_eq!(thought_tag("hmm"), "<llm:adk:soch>hmm</llm:adk:soch>");
    }

    #[test]
    fn test_tool_tags_are_compact() {
        let args = serde_json::json!({"query": "rust"});
        assert_eq!(
            tool_call_tag("web_search", "c1", &args),
            r#"<llm:adk:tool name="web_search" id="c1">{"query":"rust"}</llm:adk:tool>"#
        );
        let result = serde_json::json!({"result": "ok"});
        assert_eq!(
            tool_result_tag("c1", &result),
            r#"<llm:adk:tool-result id="c1">{"result":"ok"}</llm:adk:tool-result>"#
        );
    }

    #[test]
    fn test_sources_tag_shape() {
        let metadata = GroundingMetadata {
            queries: vec!["rust".into()],
            sources: vec![GroundingSource {
                title: Some("Rust".into()),
                uri: "https://rust-lang.org".into(),
                domain: None,
            }],
            supports: Vec::new(),
        };
        let tag = sources_tag(&metadata);
        assert!(tag.starts_with(SOURCES_OPEN));
        assert!(tag.ends_with(SOURCES_CLOSE));
        assert!(tag.contains(r#""domain":null"#));
    }

    #[test]
    fn test_widget_tag_nests_data() {
        let widget = Widget {
            id: "w1".into(),
            query_id: "job".into(),
            title: "T".into(),
            chart_type: ChartType::Bar,
            columns: vec!["a".into()],
            rows: vec![vec![serde_json::json!(1)]],
            query: "SELECT a FROM t".into(),
            total_rows: 1,
            table_display_limit: TABLE_DISPLAY_LIMIT,
            bytes_processed: 10,
        };
        let tag = widget_tag(&widget);
        assert!(tag.contains(r#""data":{"columns":["a"],"rows":[[1]]}"#));
        assert!(tag.contains(r#""chart_type":"bar""#));
    }

    #[test]
    fn test_append_tag() {
        assert_eq!(append_tag("", "<t/>"), "<t/>");
        assert_eq!(append_tag("answer", "<t/>"), "answer\n<t/>");
    }
}
