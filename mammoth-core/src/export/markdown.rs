//! Markdown pipe-table serialization.

use crate::error::Result;
use crate::export::QueryResultData;
use crate::value::Value;

/// NULL cells render as an italicized placeholder.
const NULL_PLACEHOLDER: &str = "*null*";

fn cell(value: &Value) -> String {
    if value.is_null() {
        NULL_PLACEHOLDER.to_string()
    } else {
        value.canonical_text().replace('|', "\\|")
    }
}

fn line(cells: impl IntoIterator<Item = String>) -> String {
    let mut out = String::from("|");
    for cell in cells {
        out.push(' ');
        out.push_str(&cell);
        out.push_str(" |");
    }
    out.push('\n');
    out
}

/// Serialize as a Markdown table: header row, separator row with numeric
/// columns right-aligned, then one row per record.
pub fn export_markdown(data: &QueryResultData) -> Result<String> {
    let mut out = line(data.columns.iter().map(|c| c.name.clone()));
    out.push_str(&line(data.columns.iter().map(|c| {
        if c.is_numeric() {
            "---:".to_string()
        } else {
            "---".to_string()
        }
    })));
    for row in &data.rows {
        out.push_str(&line(row.iter().map(cell)));
    }
    Ok(out)
}

/// Header and separator, for the streaming exporter.
pub(crate) fn encode_header(data: &QueryResultData) -> String {
    let mut out = line(data.columns.iter().map(|c| c.name.clone()));
    out.push_str(&line(data.columns.iter().map(|c| {
        if c.is_numeric() {
            "---:".to_string()
        } else {
            "---".to_string()
        }
    })));
    out
}

/// One table row, for the streaming exporter.
pub(crate) fn encode_row(row: &[Value]) -> String {
    line(row.iter().map(cell))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::{ExportColumn, QueryResultData};

    #[test]
    fn test_numeric_alignment_exact_output() {
        let data = QueryResultData {
            columns: vec![
                ExportColumn::new("id", "int4"),
                ExportColumn::new("name", "text"),
            ],
            rows: vec![vec![Value::Int32(1), Value::Text("a".to_string())]],
        };
        let out = export_markdown(&data).unwrap();
        assert_eq!(out, "| id | name |\n| ---: | --- |\n| 1 | a |\n");
    }

    #[test]
    fn test_pipe_escaping_and_null_placeholder() {
        let data = QueryResultData {
            columns: vec![
                ExportColumn::new("v", "text"),
                ExportColumn::new("w", "text"),
            ],
            rows: vec![vec![Value::Text("a|b".to_string()), Value::Null]],
        };
        let out = export_markdown(&data).unwrap();
        assert!(out.contains("| a\\|b | *null* |"));
    }
}
