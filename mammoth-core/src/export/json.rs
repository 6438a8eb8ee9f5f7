//! JSON array and JSON Lines serialization.

use serde_json::json;

use crate::error::Result;
use crate::export::{JsonArrayFormat, JsonOptions, QueryResultData};

fn row_object(data: &QueryResultData, row: &[crate::value::Value]) -> serde_json::Value {
    let mut object = serde_json::Map::with_capacity(data.columns.len());
    for (column, value) in data.columns.iter().zip(row) {
        object.insert(column.name.clone(), value.to_json());
    }
    serde_json::Value::Object(object)
}

/// Serialize as one JSON document, either an array of row objects or the
/// `{columns, rows}` shape.
pub fn export_json(data: &QueryResultData, options: &JsonOptions) -> Result<String> {
    let document = match options.array_format {
        JsonArrayFormat::Objects => serde_json::Value::Array(
            data.rows.iter().map(|row| row_object(data, row)).collect(),
        ),
        JsonArrayFormat::ColumnsAndRows => {
            let columns: Vec<&str> = data.columns.iter().map(|c| c.name.as_str()).collect();
            let rows: Vec<serde_json::Value> = data
                .rows
                .iter()
                .map(|row| {
                    serde_json::Value::Array(row.iter().map(|v| v.to_json()).collect())
                })
                .collect();
            json!({ "columns": columns, "rows": rows })
        }
    };
    let text = if options.pretty_print {
        serde_json::to_string_pretty(&document)?
    } else {
        serde_json::to_string(&document)?
    };
    Ok(text)
}

/// Serialize as JSON Lines: one compact row object per line.
pub fn export_json_lines(data: &QueryResultData) -> Result<String> {
    let mut out = String::new();
    for row in &data.rows {
        out.push_str(&serde_json::to_string(&row_object(data, row))?);
        out.push('\n');
    }
    Ok(out)
}

/// One JSON Lines row, for the streaming exporter.
pub(crate) fn encode_row(data: &QueryResultData, row: &[crate::value::Value]) -> Result<String> {
    let mut line = serde_json::to_string(&row_object(data, row))?;
    line.push('\n');
    Ok(line)
}
