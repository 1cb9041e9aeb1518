use rustc_hash::FxHashMap;

use super::Segment;

/// Post-process raw segments: coalesce adjacent thoughts, then fold every
/// tool result into the call with the same id.
#[must_use]
pub fn merge_segments(segments: Vec<Segment>) -> Vec<Segment> {
    pair_tool_results(coalesce_thoughts(segments))
}

/// Append each thought that directly follows another thought to it.
///
/// The later chunk's completeness wins. Thoughts separated by any other
/// segment stay separate.
fn coalesce_thoughts(segments: Vec<Segment>) -> Vec<Segment> {
    let mut out: Vec<Segment> = Vec::with_capacity(segments.len());
    for segment in segments {
        if let Segment::Thought {
            content,
            is_complete,
        } = segment
        {
            if let Some(Segment::Thought {
                content: prev_content,
                is_complete: prev_complete,
            }) = out.last_mut()
            {
                prev_content.push_str("\n\n");
                prev_content.push_str(&content);
                *prev_complete = is_complete;
                continue;
            }
            out.push(Segment::Thought {
                content,
                is_complete,
            });
            continue;
        }
        out.push(segment);
    }
    out
}

/// Attach results to calls by id, wherever each appears in the text.
///
/// Standalone results are dropped; calls without a result pass through.
fn pair_tool_results(segments: Vec<Segment>) -> Vec<Segment> {
    let mut results: FxHashMap<String, serde_json::Value> = FxHashMap::default();
    let mut kept = Vec::with_capacity(segments.len());
    for segment in segments {
        match segment {
            Segment::ToolResult { id, result } => {
                results.insert(id, result);
            }
            other => kept.push(other),
        }
    }
    if results.is_empty() {
        return kept;
    }

    for segment in &mut kept {
        if let Segment::ToolCall(call) = segment {
            if let Some(result) = results.get(&call.id) {
                call.result = Some(result.clone());
            }
        }
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::ToolCall;
    use serde_json::json;

    fn call(id: &str) -> Segment {
        Segment::ToolCall(ToolCall {
            name: "t".into(),
            id: id.into(),
            args: json!({}),
            result: None,
        })
    }

    fn result(id: &str, value: serde_json::Value) -> Segment {
        Segment::ToolResult {
            id: id.into(),
            result: value,
        }
    }

    #[test]
    fn test_adjacent_thoughts_merge() {
        let merged = merge_segments(vec![
            Segment::thought("A", true),
            Segment::thought("B", true),
        ]);
        assert_eq!(merged, vec![Segment::thought("A\n\nB", true)]);
    }

    #[test]
    fn test_latest_completeness_wins() {
        let merged = merge_segments(vec![
            Segment::thought("A", true),
            Segment::thought("B", false),
        ]);
        assert_eq!(merged, vec![Segment::thought("A\n\nB", false)]);
    }

    #[test]
    fn test_separated_thoughts_stay_apart() {
        let merged = merge_segments(vec![
            Segment::thought("A", true),
            Segment::response("r"),
            Segment::thought("B", true),
        ]);
        assert_eq!(merged.len(), 3);
    }

    #[test]
    fn test_result_before_call_is_paired() {
        let merged = merge_segments(vec![result("1", json!({"r": 1})), call("1")]);
        assert_eq!(merged.len(), 1);
        let paired = merged[0].as_tool_call().unwrap();
        assert_eq!(paired.result, Some(json!({"r": 1})));
    }

    #[test]
    fn test_unmatched_call_passes_through() {
        let merged = merge_segments(vec![call("1"), result("2", json!(null))]);
        assert_eq!(merged, vec![call("1")]);
    }

    #[test]
    fn test_later_duplicate_result_wins() {
        let merged = merge_segments(vec![
            call("1"),
            result("1", json!("first")),
            result("1", json!("second")),
        ]);
        assert_eq!(
            merged[0].as_tool_call().unwrap().result,
            Some(json!("second"))
        );
    }

    #[test]
    fn test_result_between_thoughts_does_not_merge_them() {
        let merged = merge_segments(vec![
            Segment::thought("A", true),
            result("1", json!(1)),
            Segment::thought("B", true),
        ]);
        assert_eq!(
            merged,
            vec![Segment::thought("A", true), Segment::thought("B", true)]
        );
    }
}
