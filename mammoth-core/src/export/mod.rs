//! Export engine: serialize query results into any of eight formats, as a
//! string (clipboard), a byte buffer (file), or an incremental stream.
//!
//! - [`csv`] — CSV and TSV
//! - [`json`] — JSON array and JSON Lines
//! - [`sql`] — INSERT/COPY scripts and UPDATE synthesis
//! - [`markdown`] — pipe tables
//! - [`xlsx`] — single-worksheet workbooks
//! - [`stream`] — the incremental exporter for large result sets
//! - [`clipboard`] — text clipboard sink
//!
//! No format drops data: every [`Value`] variant has a defined encoding in
//! every format.

pub mod clipboard;
pub mod csv;
pub mod json;
pub mod markdown;
pub mod sql;
pub mod stream;
pub mod xlsx;

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{MammothError, Result};
use crate::value::Value;

/// Output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Csv,
    Tsv,
    Json,
    JsonLines,
    Sql,
    SqlCopy,
    Markdown,
    Excel,
}

impl ExportFormat {
    /// Binary formats never go to the clipboard.
    pub fn is_binary(&self) -> bool {
        matches!(self, ExportFormat::Excel)
    }

    /// Formats the incremental exporter supports; the rest buffer to
    /// completion.
    pub fn is_streamable(&self) -> bool {
        matches!(
            self,
            ExportFormat::Csv | ExportFormat::Tsv | ExportFormat::JsonLines | ExportFormat::Markdown
        )
    }

    /// Conventional file extension.
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Tsv => "tsv",
            ExportFormat::Json => "json",
            ExportFormat::JsonLines => "jsonl",
            ExportFormat::Sql | ExportFormat::SqlCopy => "sql",
            ExportFormat::Markdown => "md",
            ExportFormat::Excel => "xlsx",
        }
    }
}

/// One result column: name plus the PostgreSQL type name (`int4`, `text`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportColumn {
    pub name: String,
    pub type_name: String,
}

impl ExportColumn {
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
        }
    }

    /// Numeric-typed columns get right alignment in Markdown.
    pub fn is_numeric(&self) -> bool {
        matches!(
            self.type_name.as_str(),
            "int2" | "int4" | "int8" | "float4" | "float8" | "numeric" | "money"
        )
    }
}

/// A rectangular result set handed to the exporters.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct QueryResultData {
    pub columns: Vec<ExportColumn>,
    pub rows: Vec<Vec<Value>>,
}

impl QueryResultData {
    /// Build from driver rows, converting every cell through the value model.
    pub fn from_rows(rows: &[tokio_postgres::Row]) -> Self {
        let columns = match rows.first() {
            Some(first) => first
                .columns()
                .iter()
                .map(|c| ExportColumn::new(c.name(), c.type_().name()))
                .collect(),
            None => Vec::new(),
        };
        let rows = rows.iter().map(crate::value::from_row).collect();
        Self { columns, rows }
    }
}

/// CSV/TSV dialect options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CsvOptions {
    pub delimiter: char,
    pub quote: char,
    pub line_terminator: String,
    pub include_headers: bool,
    /// Rendering of NULL cells.
    pub null_string: String,
}

impl Default for CsvOptions {
    fn default() -> Self {
        Self {
            delimiter: ',',
            quote: '"',
            line_terminator: "\n".to_string(),
            include_headers: true,
            null_string: String::new(),
        }
    }
}

/// Shape of the JSON array output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JsonArrayFormat {
    /// An array of row objects keyed by column name.
    #[default]
    Objects,
    /// `{"columns": [...], "rows": [[...], ...]}`.
    ColumnsAndRows,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct JsonOptions {
    pub array_format: JsonArrayFormat,
    pub pretty_print: bool,
}

/// Conflict clause appended to generated INSERT statements.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SqlConflict {
    DoNothing,
    DoUpdate {
        conflict_columns: Vec<String>,
        update_columns: Vec<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SqlOptions {
    pub table_name: String,
    /// Qualifies the table when set.
    pub schema_name: Option<String>,
    /// Rows per generated INSERT statement.
    pub batch_size: usize,
    pub on_conflict: Option<SqlConflict>,
}

impl Default for SqlOptions {
    fn default() -> Self {
        Self {
            table_name: "export".to_string(),
            schema_name: None,
            batch_size: 1000,
            on_conflict: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct XlsxOptions {
    pub sheet_name: String,
    pub column_width: f64,
}

impl Default for XlsxOptions {
    fn default() -> Self {
        Self {
            sheet_name: "Sheet1".to_string(),
            column_width: 15.0,
        }
    }
}

/// All per-format options, bundled.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ExportOptions {
    pub format: ExportFormat,
    pub csv: CsvOptions,
    pub json: JsonOptions,
    pub sql: SqlOptions,
    pub xlsx: XlsxOptions,
}

impl Default for ExportFormat {
    fn default() -> Self {
        ExportFormat::Csv
    }
}

/// Outcome of a completed export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportResult {
    pub rows: u64,
    pub bytes: u64,
}

/// Serialize to text. Fails for binary formats.
pub fn export_to_string(data: &QueryResultData, options: &ExportOptions) -> Result<String> {
    match options.format {
        ExportFormat::Csv => csv::export_csv(data, &options.csv, b','),
        ExportFormat::Tsv => csv::export_csv(data, &options.csv, b'\t'),
        ExportFormat::Json => json::export_json(data, &options.json),
        ExportFormat::JsonLines => json::export_json_lines(data),
        ExportFormat::Sql => sql::export_insert(data, &options.sql),
        ExportFormat::SqlCopy => sql::export_copy(data, &options.sql, &options.csv.null_string),
        ExportFormat::Markdown => markdown::export_markdown(data),
        ExportFormat::Excel => Err(MammothError::Export(
            "XLSX has no text form; export it to a file".to_string(),
        )),
    }
}

/// Serialize to bytes, covering the binary formats too.
pub fn export_to_bytes(data: &QueryResultData, options: &ExportOptions) -> Result<Vec<u8>> {
    match options.format {
        ExportFormat::Excel => xlsx::export_xlsx(data, &options.xlsx),
        _ => Ok(export_to_string(data, options)?.into_bytes()),
    }
}

/// Serialize and write to a file on the blocking pool.
pub async fn export_to_file(
    data: QueryResultData,
    options: ExportOptions,
    path: impl AsRef<Path>,
) -> Result<ExportResult> {
    let path = path.as_ref().to_path_buf();
    let rows = data.rows.len() as u64;
    let bytes = tokio::task::spawn_blocking(move || -> Result<u64> {
        let bytes = export_to_bytes(&data, &options)?;
        std::fs::write(&path, &bytes)?;
        Ok(bytes.len() as u64)
    })
    .await
    .map_err(|e| MammothError::Export(format!("Export task failed: {}", e)))??;
    Ok(ExportResult { rows, bytes })
}

#[cfg(test)]
pub(crate) mod test_fixtures {
    use super::*;

    /// Two-column fixture shared across the format tests.
    pub fn users() -> QueryResultData {
        QueryResultData {
            columns: vec![
                ExportColumn::new("id", "int4"),
                ExportColumn::new("name", "text"),
            ],
            rows: vec![
                vec![Value::Int32(1), Value::Text("Alice".to_string())],
                vec![Value::Int32(2), Value::Null],
            ],
        }
    }
}
