//! CSV and TSV serialization.

use crate::error::{MammothError, Result};
use crate::export::{CsvOptions, ExportColumn, QueryResultData};
use crate::value::Value;

fn terminator(options: &CsvOptions) -> ::csv::Terminator {
    if options.line_terminator == "\r\n" {
        ::csv::Terminator::CRLF
    } else {
        ::csv::Terminator::Any(options.line_terminator.as_bytes().first().copied().unwrap_or(b'\n'))
    }
}

fn builder(options: &CsvOptions, delimiter: u8) -> ::csv::WriterBuilder {
    let mut builder = ::csv::WriterBuilder::new();
    builder
        .delimiter(delimiter)
        .quote(if options.quote.is_ascii() {
            options.quote as u8
        } else {
            b'"'
        })
        .terminator(terminator(options));
    builder
}

/// Render one cell. NULL renders as the configured null string; everything
/// else uses its canonical text form.
fn field(value: &Value, options: &CsvOptions) -> String {
    if value.is_null() {
        options.null_string.clone()
    } else {
        value.canonical_text()
    }
}

fn finish(writer: ::csv::Writer<Vec<u8>>) -> Result<String> {
    let bytes = writer
        .into_inner()
        .map_err(|e| MammothError::Export(format!("CSV writer error: {}", e)))?;
    String::from_utf8(bytes).map_err(|e| MammothError::Export(format!("CSV output: {}", e)))
}

/// Serialize the whole result set. The delimiter parameter is the format's
/// own (`,` or `\t`) and overrides the configured one.
pub fn export_csv(data: &QueryResultData, options: &CsvOptions, delimiter: u8) -> Result<String> {
    let mut writer = builder(options, delimiter).from_writer(Vec::new());
    if options.include_headers {
        writer.write_record(data.columns.iter().map(|c| c.name.as_str()))?;
    }
    for row in &data.rows {
        writer.write_record(row.iter().map(|v| field(v, options)))?;
    }
    writer.flush()?;
    finish(writer)
}

/// One header line, for the streaming exporter.
pub(crate) fn encode_header(
    columns: &[ExportColumn],
    options: &CsvOptions,
    delimiter: u8,
) -> Result<String> {
    let mut writer = builder(options, delimiter).from_writer(Vec::new());
    writer.write_record(columns.iter().map(|c| c.name.as_str()))?;
    writer.flush()?;
    finish(writer)
}

/// One data line, for the streaming exporter.
pub(crate) fn encode_row(row: &[Value], options: &CsvOptions, delimiter: u8) -> Result<String> {
    let mut writer = builder(options, delimiter).from_writer(Vec::new());
    writer.write_record(row.iter().map(|v| field(v, options)))?;
    writer.flush()?;
    finish(writer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::test_fixtures::users;

    #[test]
    fn test_basic_csv_with_headers() {
        let out = export_csv(&users(), &CsvOptions::default(), b',').unwrap();
        assert_eq!(out, "id,name\n1,Alice\n2,\n");
    }

    #[test]
    fn test_headers_omitted() {
        let options = CsvOptions {
            include_headers: false,
            ..Default::default()
        };
        let out = export_csv(&users(), &options, b',').unwrap();
        assert_eq!(out, "1,Alice\n2,\n");
    }

    #[test]
    fn test_null_string() {
        let options = CsvOptions {
            null_string: "NULL".to_string(),
            ..Default::default()
        };
        let out = export_csv(&users(), &options, b',').unwrap();
        assert!(out.ends_with("2,NULL\n"));
    }

    #[test]
    fn test_quoting_on_delimiter_and_quotes() {
        let data = QueryResultData {
            columns: vec![ExportColumn::new("v", "text")],
            rows: vec![
                vec![Value::Text("a,b".to_string())],
                vec![Value::Text("say \"hi\"".to_string())],
                vec![Value::Text("plain".to_string())],
            ],
        };
        let options = CsvOptions {
            include_headers: false,
            ..Default::default()
        };
        let out = export_csv(&data, &options, b',').unwrap();
        assert_eq!(out, "\"a,b\"\n\"say \"\"hi\"\"\"\nplain\n");
    }

    #[test]
    fn test_tsv_delimiter_overrides() {
        let out = export_csv(&users(), &CsvOptions::default(), b'\t').unwrap();
        assert_eq!(out, "id\tname\n1\tAlice\n2\t\n");
    }

    #[test]
    fn test_rectangular_tsv_clipboard_shape() {
        // rows.len() lines, columns.len() - 1 tabs per line
        let options = CsvOptions {
            include_headers: false,
            ..Default::default()
        };
        let data = users();
        let out = export_csv(&data, &options, b'\t').unwrap();
        let lines: Vec<&str> = out.trim_end_matches('\n').split('\n').collect();
        assert_eq!(lines.len(), data.rows.len());
        for line in lines {
            assert_eq!(
                line.matches('\t').count(),
                data.columns.len() - 1
            );
        }
    }

    #[test]
    fn test_compound_values_use_canonical_forms() {
        let data = QueryResultData {
            columns: vec![
                ExportColumn::new("arr", "_int4"),
                ExportColumn::new("bin", "bytea"),
                ExportColumn::new("pt", "point"),
            ],
            rows: vec![vec![
                Value::Array(vec![Value::Int32(1), Value::Int32(2)]),
                Value::Bytea(vec![0xab]),
                Value::Point { x: 1.0, y: 2.0 },
            ]],
        };
        let options = CsvOptions {
            include_headers: false,
            ..Default::default()
        };
        let out = export_csv(&data, &options, b',').unwrap();
        assert_eq!(out, "\"{1,2}\",\\xab,\"(1,2)\"\n");
    }

    #[test]
    fn test_crlf_terminator() {
        let options = CsvOptions {
            line_terminator: "\r\n".to_string(),
            ..Default::default()
        };
        let out = export_csv(&users(), &options, b',').unwrap();
        assert!(out.contains("id,name\r\n"));
    }

    #[test]
    fn test_encode_row_single_line() {
        let row = vec![Value::Int32(5), Value::Text("x".to_string())];
        let line = encode_row(&row, &CsvOptions::default(), b',').unwrap();
        assert_eq!(line, "5,x\n");
    }
}
