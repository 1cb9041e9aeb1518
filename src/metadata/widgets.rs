//! Chart widgets (`<llm:data:widget>`).
//!
//! Unlike the other nested tags a widget may appear any number of times, and
//! the data-analysis tool re-emits a widget under the same id when it revises
//! it. Extraction keeps one widget per id: the latest payload, shown where the
//! id first appeared.

use std::borrow::Cow;
use std::sync::LazyLock;

use memchr::memmem;
use regex_lite::Regex;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use super::{strip_ranges, Extracted, DEFAULT_CLOSE_LOOKAHEAD};
use crate::error::DecodeError;
use crate::json_scan::{extract_json_span, extract_json_span_naive, skip_ws};
use crate::tags::{TABLE_DISPLAY_LIMIT, WIDGET_CLOSE, WIDGET_OPEN};

const TAG_NAME: &str = "llm:data:widget";

static WIDGET_OPEN_FINDER: LazyLock<memmem::Finder<'static>> =
    LazyLock::new(|| memmem::Finder::new(WIDGET_OPEN.as_bytes()));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartType {
    Bar,
    Line,
    Pie,
    #[default]
    Table,
    Metric,
}

impl ChartType {
    /// Parse a wire name; anything unrecognised renders as a table.
    #[must_use]
    pub fn from_wire(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "bar" => ChartType::Bar,
            "line" => ChartType::Line,
            "pie" => ChartType::Pie,
            "metric" => ChartType::Metric,
            _ => ChartType::Table,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ChartType::Bar => "bar",
            ChartType::Line => "line",
            ChartType::Pie => "pie",
            ChartType::Table => "table",
            ChartType::Metric => "metric",
        }
    }
}

/// A chart or table produced from one query result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Widget {
    pub id: String,
    pub query_id: String,
    pub title: String,
    pub chart_type: ChartType,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<serde_json::Value>>,
    pub query: String,
    pub total_rows: u64,
    pub table_display_limit: u64,
    pub bytes_processed: u64,
}

/// Tabular payload as the data-analysis tool nests it.
#[derive(Debug, Deserialize)]
struct WidgetData {
    #[serde(default)]
    columns: Vec<String>,
    #[serde(default)]
    rows: Vec<Vec<serde_json::Value>>,
}

#[derive(Debug, Serialize)]
pub struct WidgetDataRef<'a> {
    columns: &'a [String],
    rows: &'a [Vec<serde_json::Value>],
}

/// Incoming payload. Everything except `id` is optional; columns and rows
/// may be nested under `data` or sit at the top level.
#[derive(Debug, Deserialize)]
struct WidgetWire {
    id: String,
    #[serde(default, alias = "queryId")]
    query_id: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default, alias = "chartType")]
    chart_type: Option<String>,
    #[serde(default)]
    data: Option<WidgetData>,
    #[serde(default)]
    columns: Option<Vec<String>>,
    #[serde(default)]
    rows: Option<Vec<Vec<serde_json::Value>>>,
    #[serde(default)]
    query: Option<String>,
    #[serde(default, alias = "totalRows")]
    total_rows: Option<u64>,
    #[serde(default, alias = "tableDisplayLimit")]
    table_display_limit: Option<u64>,
    #[serde(default, alias = "bytesProcessed")]
    bytes_processed: Option<u64>,
}

/// Borrowed outgoing payload in the tool's nested layout.
#[derive(Debug, Serialize)]
pub struct WidgetWireRef<'a> {
    id: &'a str,
    query_id: &'a str,
    title: &'a str,
    chart_type: ChartType,
    data: WidgetDataRef<'a>,
    query: &'a str,
    total_rows: u64,
    table_display_limit: u64,
    bytes_processed: u64,
}

impl From<WidgetWire> for Widget {
    fn from(wire: WidgetWire) -> Self {
        let (nested_columns, nested_rows) = match wire.data {
            Some(data) => (Some(data.columns), Some(data.rows)),
            None => (None, None),
        };
        let columns = nested_columns.or(wire.columns).unwrap_or_default();
        let rows = nested_rows.or(wire.rows).unwrap_or_default();
        let total_rows = wire.total_rows.unwrap_or(rows.len() as u64);
        let query = wire.query.unwrap_or_default();
        let title = match wire.title {
            Some(title) if !title.is_empty() => title,
            _ => title_from_query(&query),
        };
        Widget {
            id: wire.id,
            query_id: wire.query_id.unwrap_or_default(),
            title,
            chart_type: wire
                .chart_type
                .as_deref()
                .map_or(ChartType::Table, ChartType::from_wire),
            columns,
            rows,
            query,
            total_rows,
            table_display_limit: wire.table_display_limit.unwrap_or(TABLE_DISPLAY_LIMIT),
            bytes_processed: wire.bytes_processed.unwrap_or(0),
        }
    }
}

impl Widget {
    #[must_use]
    pub fn to_wire(&self) -> WidgetWireRef<'_> {
        WidgetWireRef {
            id: &self.id,
            query_id: &self.query_id,
            title: &self.title,
            chart_type: self.chart_type,
            data: WidgetDataRef {
                columns: &self.columns,
                rows: &self.rows,
            },
            query: &self.query,
            total_rows: self.total_rows,
            table_display_limit: self.table_display_limit,
            bytes_processed: self.bytes_processed,
        }
    }

    /// Rows the table view shows.
    #[must_use]
    pub fn display_rows(&self) -> &[Vec<serde_json::Value>] {
        let limit = usize::try_from(self.table_display_limit).unwrap_or(usize::MAX);
        &self.rows[..self.rows.len().min(limit)]
    }
}

/// Extract every widget from a tool result's text.
///
/// Returns `None` when no widget parsed. A truncated occurrence ends the scan
/// and stays in the text together with everything after it; a malformed one
/// is skipped and stays in the text. An occurrence whose close marker has
/// arrived is never truncated, even when its quotes do not balance.
#[must_use]
pub fn extract_widgets(text: &str) -> Extracted<'_, Vec<Widget>> {
    extract_widgets_with_lookahead(text, DEFAULT_CLOSE_LOOKAHEAD)
}

#[must_use]
pub fn extract_widgets_with_lookahead(text: &str, lookahead: usize) -> Extracted<'_, Vec<Widget>> {
    let bytes = text.as_bytes();
    let mut order: Vec<String> = Vec::new();
    let mut latest: FxHashMap<String, Widget> = FxHashMap::default();
    let mut cuts: Vec<(usize, usize)> = Vec::new();

    let mut cursor = 0usize;
    while let Some(rel) = WIDGET_OPEN_FINDER.find(&bytes[cursor..]) {
        let start = cursor + rel;
        let open_end = start + WIDGET_OPEN.len();
        let json_start = skip_ws(bytes, open_end);
        if json_start < bytes.len() && bytes[json_start] != b'{' {
            cursor = open_end;
            continue;
        }

        match decode_at(text, json_start, lookahead) {
            Ok((widget, tag_end)) => {
                cuts.push((start, tag_end));
                cursor = tag_end;
                if !latest.contains_key(&widget.id) {
                    order.push(widget.id.clone());
                }
                latest.insert(widget.id.clone(), widget);
            }
            Err(DecodeError::Malformed { tag, source }) => {
                tracing::debug!(tag, error = %source, "malformed widget left in place");
                cursor = open_end;
            }
            Err(err) => {
                tracing::debug!(error = %err, "widget scan stopped");
                break;
            }
        }
    }

    if order.is_empty() {
        return (None, Cow::Borrowed(text));
    }
    let widgets = order
        .into_iter()
        .filter_map(|id| latest.remove(&id))
        .collect();
    (Some(widgets), Cow::Owned(strip_ranges(text, &cuts)))
}

fn decode_at(text: &str, json_start: usize, lookahead: usize) -> Result<(Widget, usize), DecodeError> {
    let close_start = find_own_close(text, json_start);
    match extract_json_span(text, json_start) {
        Some((span, span_end)) if close_start.map_or(true, |at| span_end <= at) => {
            let wire: WidgetWire = serde_json::from_str(span)
                .map_err(|source| DecodeError::Malformed { tag: TAG_NAME, source })?;
            let tag_end = close_after(text, span_end, lookahead).unwrap_or(span_end);
            Ok((Widget::from(wire), tag_end))
        }
        _ => {
            // Unbalanced quotes hide the closing brace; a present close marker
            // still means this occurrence is finished, only malformed.
            let close_start = close_start.ok_or(DecodeError::Truncated { tag: TAG_NAME })?;
            let bounded = &text[..close_start];
            let raw = extract_json_span_naive(bounded, json_start)
                .map_or_else(|| bounded[json_start..].trim(), |(span, _)| span);
            let wire: WidgetWire = serde_json::from_str(raw)
                .map_err(|source| DecodeError::Malformed { tag: TAG_NAME, source })?;
            Ok((Widget::from(wire), close_start + WIDGET_CLOSE.len()))
        }
    }
}

/// Start of the close marker for the widget whose payload starts at
/// `json_start`, if it comes before the next widget's open marker.
fn find_own_close(text: &str, json_start: usize) -> Option<usize> {
    let rest = &text.as_bytes()[json_start..];
    let close_rel = memmem::find(rest, WIDGET_CLOSE.as_bytes())?;
    match WIDGET_OPEN_FINDER.find(&rest[..close_rel]) {
        Some(_) => None,
        None => Some(json_start + close_rel),
    }
}

fn close_after(text: &str, from: usize, lookahead: usize) -> Option<usize> {
    let at = skip_ws(text.as_bytes(), from);
    if at - from > lookahead || !text[at..].starts_with(WIDGET_CLOSE) {
        return None;
    }
    Some(at + WIDGET_CLOSE.len())
}

/// Pick a chart type from a result's shape, given the column type names in order.
#[must_use]
pub fn suggest_chart_type(column_types: &[&str], row_count: usize) -> ChartType {
    if row_count == 1 && column_types.len() == 1 {
        return ChartType::Metric;
    }
    if column_types.len() < 2 {
        return ChartType::Table;
    }
    let first = column_types[0].to_ascii_uppercase();
    if matches!(first.as_str(), "DATE" | "TIMESTAMP" | "DATETIME") {
        return ChartType::Line;
    }
    if row_count <= 7 && column_types.len() == 2 {
        return ChartType::Pie;
    }
    ChartType::Bar
}

static SELECT_COLUMNS_RE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?is)SELECT\s+(.+?)\s+FROM").ok());
static WHITESPACE_RE: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"\s+").ok());

/// Human-readable title from the selected columns of a SQL query.
#[must_use]
pub fn title_from_query(sql: &str) -> String {
    let (Some(select_re), Some(ws_re)) = (SELECT_COLUMNS_RE.as_ref(), WHITESPACE_RE.as_ref()) else {
        return "Query Result".to_string();
    };
    let Some(columns) = select_re.captures(sql).and_then(|caps| caps.get(1)) else {
        return "Query Result".to_string();
    };
    let collapsed = ws_re.replace_all(columns.as_str().trim(), " ");
    let clipped: String = collapsed.chars().take(50).collect();
    if clipped == "*" {
        return "Query Result".to_string();
    }
    format!("Query: {clipped}...")
}
