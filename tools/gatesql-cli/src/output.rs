//! Rendering of query results for the terminal.
//!
//! Tables are space-aligned without borders. When a result has more than
//! one column, tabs and newlines inside values are escaped and long values
//! are cut so a row stays on one line.

use comfy_table::{Cell, Table, presets};
use indexmap::IndexMap;
use rusqlite::types::Value;

use gatesql::{Error, Json, QueryResult};

const MAX_CELL_CHARS: usize = 99;

pub fn render_table(result: &QueryResult) -> String {
    if result.columns.is_empty() {
        return String::new();
    }
    let compact = result.columns.len() > 1;

    let mut table = Table::new();
    table.load_preset(presets::NOTHING);
    table.set_header(result.columns.iter().map(Cell::new));
    for row in &result.rows {
        table.add_row(row.iter().map(|value| {
            let text = render_value(value);
            Cell::new(if compact { compact_cell(&text) } else { text })
        }));
    }
    table.to_string()
}

/// One pretty-printed JSON object per row, nested JSON text expanded.
pub fn render_json(result: &QueryResult) -> Result<String, Error> {
    let rows: Vec<IndexMap<String, Json>> = result.materialize()?;
    let mut out = String::new();
    for row in &rows {
        let text = serde_json::to_string_pretty(row)
            .map_err(|e| gatesql::ConversionError::new(e.to_string()))?;
        out.push_str(&text);
        out.push('\n');
    }
    Ok(out)
}

pub fn render_value(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Integer(i) => i.to_string(),
        Value::Real(f) => f.to_string(),
        Value::Text(s) => s.clone(),
        Value::Blob(bytes) => format!("<blob {} bytes>", bytes.len()),
    }
}

fn compact_cell(text: &str) -> String {
    let escaped = text.replace('\t', "\\t").replace('\n', "\\n");
    if escaped.chars().count() > MAX_CELL_CHARS {
        let mut cut: String = escaped.chars().take(MAX_CELL_CHARS).collect();
        cut.push('…');
        cut
    } else {
        escaped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(columns: &[&str], rows: Vec<Vec<Value>>) -> QueryResult {
        QueryResult {
            columns: columns.iter().map(|c| c.to_string()).collect(),
            rows,
        }
    }

    #[test]
    fn test_render_value() {
        assert_eq!(render_value(&Value::Null), "NULL");
        assert_eq!(render_value(&Value::Integer(-3)), "-3");
        assert_eq!(render_value(&Value::Real(2.5)), "2.5");
        assert_eq!(render_value(&Value::Text("hi".into())), "hi");
        assert_eq!(render_value(&Value::Blob(vec![0; 4])), "<blob 4 bytes>");
    }

    #[test]
    fn test_compact_cell() {
        assert_eq!(compact_cell("a\tb\nc"), "a\\tb\\nc");
        let long = "x".repeat(150);
        let cut = compact_cell(&long);
        assert_eq!(cut.chars().count(), MAX_CELL_CHARS + 1);
        assert!(cut.ends_with('…'));
        assert_eq!(compact_cell(&"y".repeat(99)), "y".repeat(99));
    }

    #[test]
    fn test_table_layout() {
        let text = render_table(&result(
            &["id", "name"],
            vec![
                vec![Value::Integer(1), Value::Text("ada".into())],
                vec![Value::Integer(2), Value::Null],
            ],
        ));
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].contains("id") && lines[0].contains("name"));
        assert!(lines[1].contains("ada"));
        assert!(lines[2].contains("NULL"));
        assert!(!text.contains('|'));
    }

    #[test]
    fn test_single_column_keeps_raw_text() {
        let text = render_table(&result(&["doc"], vec![vec![Value::Text("a\tb".into())]]));
        assert!(text.contains("a\tb"));
    }

    #[test]
    fn test_no_columns_renders_nothing() {
        assert_eq!(render_table(&QueryResult::default()), "");
    }

    #[test]
    fn test_render_json_rows() {
        let text = render_json(&result(
            &["id", "meta"],
            vec![vec![Value::Integer(1), Value::Text(r#"{"k":[1]}"#.into())]],
        ))
        .unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed, serde_json::json!({"id": 1, "meta": {"k": [1]}}));
    }
}
