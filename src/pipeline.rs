//! Both decoding layers chained: message segments, then per-tool metadata.

use std::borrow::Cow;

use serde::Serialize;

use crate::config::MetadataConfig;
use crate::message::{decode_message_segments, ParsedMessage, Segment, ToolCall};
use crate::metadata::grounding::extract_grounding_with_lookahead;
use crate::metadata::queries::extract_query_attempts_with_lookahead;
use crate::metadata::widgets::extract_widgets_with_lookahead;
use crate::metadata::{normalize_escapes, GroundingMetadata, QueryAttemptsLog, Widget};

/// A fully decoded message snapshot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecodedMessage {
    pub segments: ParsedMessage,
    /// One entry per tool call whose result went through nested decoding,
    /// in segment order.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tool_outputs: Vec<ToolOutput>,
}

/// Display text and metadata recovered from one tool result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolOutput {
    pub call_id: String,
    pub tool: String,
    pub display_text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grounding: Option<GroundingMetadata>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query_attempts: Option<QueryAttemptsLog>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub widgets: Option<Vec<Widget>>,
}

/// Stateless decoder configured with the tool routing table.
#[derive(Debug, Clone, Default)]
pub struct MessageDecoder {
    config: MetadataConfig,
}

impl MessageDecoder {
    #[must_use]
    pub fn new(config: &MetadataConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    #[must_use]
    pub fn config(&self) -> &MetadataConfig {
        &self.config
    }

    /// Decode the full accumulated text of one message.
    #[must_use]
    pub fn decode(&self, text: &str) -> DecodedMessage {
        let segments = decode_message_segments(text);
        let tool_outputs = segments
            .iter()
            .filter_map(Segment::as_tool_call)
            .filter_map(|call| self.decode_tool_output(call))
            .collect();
        DecodedMessage {
            segments,
            tool_outputs,
        }
    }

    /// Run the nested decoders this call's tool is routed to.
    ///
    /// Returns `None` for unrouted tools and calls still waiting on a result.
    #[must_use]
    pub fn decode_tool_output(&self, call: &ToolCall) -> Option<ToolOutput> {
        if !self.config.routes_any(&call.name) {
            return None;
        }
        let result = call.result.as_ref()?;
        let raw = result_text(result);
        let lookahead = self.config.close_marker_lookahead;

        let mut text = normalize_escapes(&raw).into_owned();
        let mut output = ToolOutput {
            call_id: call.id.clone(),
            tool: call.name.clone(),
            display_text: String::new(),
            grounding: None,
            query_attempts: None,
            widgets: None,
        };

        if self.config.routes_grounding(&call.name) {
            let (grounding, cleaned) = extract_grounding_with_lookahead(&text, lookahead);
            output.grounding = grounding;
            if let Cow::Owned(cleaned) = cleaned {
                text = cleaned;
            }
        }
        if self.config.routes_query_attempts(&call.name) {
            let (attempts, cleaned) = extract_query_attempts_with_lookahead(&text, lookahead);
            output.query_attempts = attempts;
            if let Cow::Owned(cleaned) = cleaned {
                text = cleaned;
            }
        }
        if self.config.routes_widgets(&call.name) {
            let (widgets, cleaned) = extract_widgets_with_lookahead(&text, lookahead);
            output.widgets = widgets;
            if let Cow::Owned(cleaned) = cleaned {
                text = cleaned;
            }
        }

        output.display_text = text;
        Some(output)
    }
}

/// Text form of a tool result: a string as-is, an object's string `result`
/// field, or compact JSON for anything else.
#[must_use]
pub fn result_text(result: &serde_json::Value) -> Cow<'_, str> {
    match result {
        serde_json::Value::String(text) => Cow::Borrowed(text),
        serde_json::Value::Object(map) => match map.get("result") {
            Some(serde_json::Value::String(text)) => Cow::Borrowed(text),
            _ => Cow::Owned(result.to_string()),
        },
        other => Cow::Owned(other.to_string()),
    }
}

/// Decode with the default tool routing.
#[must_use]
pub fn decode(text: &str) -> DecodedMessage {
    MessageDecoder::default().decode(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn call_with_result(name: &str, result: serde_json::Value) -> ToolCall {
        ToolCall {
            name: name.into(),
            id: "c1".into(),
            args: json!({}),
            result: Some(result),
        }
    }

    #[test]
    fn test_result_text_variants() {
        assert_eq!(result_text(&json!("plain")), "plain");
        assert_eq!(result_text(&json!({"result": "inner"})), "inner");
        assert_eq!(result_text(&json!({"result": 3})), r#"{"result":3}"#);
        assert_eq!(result_text(&json!([1, 2])), "[1,2]");
    }

    #[test]
    fn test_unrouted_tool_is_skipped() {
        let decoder = MessageDecoder::default();
        assert!(decoder
            .decode_tool_output(&call_with_result("calculator", json!("4")))
            .is_none());
    }

    #[test]
    fn test_pending_call_is_skipped() {
        let decoder = MessageDecoder::default();
        let call = ToolCall {
            name: "web_search".into(),
            id: "c1".into(),
            args: json!({}),
            result: None,
        };
        assert!(decoder.decode_tool_output(&call).is_none());
    }

    #[test]
    fn test_grounding_routed_for_web_search() {
        let decoder = MessageDecoder::default();
        let result = json!({"result": "Rust is fast.\n<llm:adk:sources>{\"queries\":[\"rust\"],\"sources\":[]}</llm:adk:sources>"});
        let output = decoder
            .decode_tool_output(&call_with_result("web_search", result))
            .unwrap();
        assert_eq!(output.display_text, "Rust is fast.");
        assert_eq!(output.grounding.unwrap().queries, vec!["rust"]);
        assert!(output.widgets.is_none());
    }

    #[test]
    fn test_data_tool_gets_queries_and_widgets() {
        let decoder = MessageDecoder::default();
        let text = concat!(
            "Top regions.\n",
            r#"<llm:data:queries>{"attempts":[{"query":"SELECT r FROM t","success":true,"error":null,"bytes_processed":1,"row_count":1}]}</llm:data:queries>"#,
            "\n",
            r#"<llm:data:widget>{"id":"w1","chart_type":"pie","data":{"columns":["r","n"],"rows":[["EU",1]]}}</llm:data:widget>"#,
        );
        let output = decoder
            .decode_tool_output(&call_with_result("data_analyst_agent", json!(text)))
            .unwrap();
        assert_eq!(output.display_text, "Top regions.");
        assert_eq!(output.query_attempts.unwrap().len(), 1);
        assert_eq!(output.widgets.unwrap()[0].id, "w1");
        assert!(output.grounding.is_none());
    }

    #[test]
    fn test_double_encoded_result_is_normalized_first() {
        let decoder = MessageDecoder::default();
        let text = r#"Found it.\n<llm:adk:sources>{\"queries\":[\"q\"],\"sources\":[]}</llm:adk:sources>"#;
        let output = decoder
            .decode_tool_output(&call_with_result("web_search", json!(text)))
            .unwrap();
        assert_eq!(output.display_text, "Found it.");
        assert_eq!(output.grounding.unwrap().queries, vec!["q"]);
    }

    #[test]
    fn test_custom_routing() {
        let config = MetadataConfig {
            grounding_tools: vec!["search".into()],
            ..MetadataConfig::default()
        };
        let decoder = MessageDecoder::new(&config);
        let result = json!("<llm:adk:sources>{\"queries\":[],\"sources\":[]}</llm:adk:sources>");
        assert!(decoder
            .decode_tool_output(&call_with_result("web_search", result.clone()))
            .is_none());
        let output = decoder
            .decode_tool_output(&call_with_result("search", result))
            .unwrap();
        assert_eq!(output.display_text, "");
        assert_eq!(output.grounding, Some(GroundingMetadata::default()));
    }

    #[test]
    fn test_decode_collects_outputs_in_segment_order() {
        let text = concat!(
            r#"<llm:adk:tool name="web_search" id="a">{"q":"x"}</llm:adk:tool>"#,
            r#"<llm:adk:tool-result id="a">{"result":"plain answer"}</llm:adk:tool-result>"#,
            r#"<llm:adk:tool name="calculator" id="b">{}</llm:adk:tool>"#,
            r#"<llm:adk:tool-result id="b">{"result":"4"}</llm:adk:tool-result>"#,
            "Done.",
        );
        let decoded = decode(text);
        assert_eq!(decoded.segments.len(), 3);
        assert_eq!(decoded.tool_outputs.len(), 1);
        assert_eq!(decoded.tool_outputs[0].call_id, "a");
        assert_eq!(decoded.tool_outputs[0].display_text, "plain answer");
    }
}
