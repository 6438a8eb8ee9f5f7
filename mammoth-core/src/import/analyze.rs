//! Import source analysis: format sniffing, delimiter and encoding
//! detection, streaming preview, and column type inference.
//!
//! Analysis is single-pass and streaming. Only the five preview rows, the
//! per-column sample buffers, and the running row count stay in memory, so
//! a multi-gigabyte CSV analyzes in constant space.

use std::fs::File;
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex_lite::Regex;

use crate::error::{MammothError, Result};
use crate::import::{
    ColumnTypeHint, CsvSourceOptions, ImportFormat, ImportSource, PreviewData, SourceEncoding,
};

/// Rows kept for the preview.
const PREVIEW_ROWS: usize = 5;
/// Rows sampled for type inference and null counting.
const SAMPLE_ROWS: usize = 100;
/// Non-null sample values kept per column.
const SAMPLES_PER_COLUMN: usize = 5;

/// Delimiter candidates, in tie-breaking order.
const DELIMITER_CANDIDATES: [u8; 4] = [b',', b'\t', b';', b'|'];

/// Analyze a source file on the blocking pool.
pub async fn analyze(path: impl Into<PathBuf>) -> Result<ImportSource> {
    let path = path.into();
    tokio::task::spawn_blocking(move || analyze_sync(&path))
        .await
        .map_err(|e| MammothError::import(format!("Analyzer task failed: {}", e)))?
}

/// Synchronous analysis entry point.
pub fn analyze_sync(path: &Path) -> Result<ImportSource> {
    let size_bytes = std::fs::metadata(path)?.len();
    if size_bytes == 0 {
        return Err(MammothError::empty_file());
    }

    let (encoding, bom_len) = detect_encoding(path)?;
    if encoding != SourceEncoding::Utf8 {
        return Err(MammothError::import(format!(
            "{:?} encoded files are not supported; convert the file to UTF-8",
            encoding
        )));
    }

    let format = classify(path, bom_len)?;
    match format {
        ImportFormat::Csv => analyze_csv(path, bom_len, size_bytes, encoding),
        ImportFormat::Json => analyze_json(path, bom_len, size_bytes, encoding),
        ImportFormat::JsonLines => analyze_json_lines(path, bom_len, size_bytes, encoding),
    }
}

/// Detect the encoding from a byte order mark. The BOM is stripped from all
/// subsequent reads; files without one default to UTF-8.
fn detect_encoding(path: &Path) -> Result<(SourceEncoding, u64)> {
    let mut file = File::open(path)?;
    let mut head = [0u8; 3];
    let n = file.read(&mut head)?;
    if n >= 3 && head == [0xEF, 0xBB, 0xBF] {
        Ok((SourceEncoding::Utf8, 3))
    } else if n >= 2 && head[..2] == [0xFE, 0xFF] {
        Ok((SourceEncoding::Utf16Be, 2))
    } else if n >= 2 && head[..2] == [0xFF, 0xFE] {
        Ok((SourceEncoding::Utf16Le, 2))
    } else {
        Ok((SourceEncoding::Utf8, 0))
    }
}

/// Classify the source format from the file extension. `.json` files are
/// disambiguated by their first non-whitespace byte: `[` is a JSON array,
/// `{` is a stream of objects.
fn classify(path: &Path, bom_len: u64) -> Result<ImportFormat> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_default();

    match extension.as_str() {
        "csv" | "tsv" => Ok(ImportFormat::Csv),
        "jsonl" | "ndjson" => Ok(ImportFormat::JsonLines),
        "json" => {
            let mut reader = open_after_bom(path, bom_len)?;
            let mut byte = [0u8; 1];
            loop {
                if reader.read(&mut byte)? == 0 {
                    return Err(MammothError::empty_file());
                }
                if !byte[0].is_ascii_whitespace() {
                    break;
                }
            }
            match byte[0] {
                b'[' => Ok(ImportFormat::Json),
                b'{' => Ok(ImportFormat::JsonLines),
                other => Err(MammothError::invalid_json(format!(
                    "expected '[' or '{{' at the start of the document, found '{}'",
                    other as char
                ))),
            }
        }
        other => Err(MammothError::unsupported_format(other)),
    }
}

fn open_after_bom(path: &Path, bom_len: u64) -> Result<BufReader<File>> {
    let mut file = File::open(path)?;
    file.seek(SeekFrom::Start(bom_len))?;
    Ok(BufReader::new(file))
}

/// Pick the delimiter with the highest count in the header line. Ties go to
/// the earlier candidate, comma first.
pub fn detect_delimiter(line: &str) -> u8 {
    let mut best = DELIMITER_CANDIDATES[0];
    let mut best_count = 0usize;
    for candidate in DELIMITER_CANDIDATES {
        let count = line.bytes().filter(|b| *b == candidate).count();
        if count > best_count {
            best = candidate;
            best_count = count;
        }
    }
    best
}

/// Per-column sampling state carried through a single analysis pass.
struct ColumnSampler {
    samples: Vec<Vec<String>>,
    null_counts: Vec<usize>,
}

impl ColumnSampler {
    fn new(columns: usize) -> Self {
        Self {
            samples: vec![Vec::new(); columns],
            null_counts: vec![0; columns],
        }
    }

    fn observe(&mut self, column: usize, value: &str) {
        if column >= self.samples.len() {
            return;
        }
        if value.is_empty() {
            self.null_counts[column] += 1;
        } else if self.samples[column].len() < SAMPLES_PER_COLUMN {
            self.samples[column].push(value.to_string());
        }
    }

    fn into_hints(self, columns: &[String], infer: bool) -> Vec<ColumnTypeHint> {
        columns
            .iter()
            .zip(self.samples)
            .zip(self.null_counts)
            .map(|((name, samples), null_count)| ColumnTypeHint {
                column: name.clone(),
                suggested_type: if infer {
                    infer_type(&samples).to_string()
                } else {
                    "text".to_string()
                },
                sample_values: samples,
                null_count,
            })
            .collect()
    }
}

fn analyze_csv(
    path: &Path,
    bom_len: u64,
    size_bytes: u64,
    encoding: SourceEncoding,
) -> Result<ImportSource> {
    // First pass over the header line only, to pick the delimiter
    let mut header_reader = open_after_bom(path, bom_len)?;
    let mut first_line = String::new();
    header_reader.read_line(&mut first_line)?;
    if first_line.trim().is_empty() {
        return Err(MammothError::empty_file());
    }
    let delimiter = detect_delimiter(&first_line);

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .from_reader(open_after_bom(path, bom_len)?);

    let columns: Vec<String> = reader
        .headers()?
        .iter()
        .map(|h| h.to_string())
        .collect();
    if columns.is_empty() {
        return Err(MammothError::empty_file());
    }

    let mut sampler = ColumnSampler::new(columns.len());
    let mut preview_rows = Vec::new();
    let mut total_rows = 0u64;

    for record in reader.records() {
        let record = record?;
        if (total_rows as usize) < PREVIEW_ROWS {
            preview_rows.push(record.iter().map(|c| c.to_string()).collect());
        }
        if (total_rows as usize) < SAMPLE_ROWS {
            for (i, cell) in record.iter().enumerate() {
                sampler.observe(i, cell);
            }
        }
        total_rows += 1;
    }

    let column_types = sampler.into_hints(&columns, true);
    Ok(ImportSource {
        path: path.to_path_buf(),
        format: ImportFormat::Csv,
        size_bytes,
        encoding,
        csv_options: Some(CsvSourceOptions {
            delimiter,
            has_header: true,
        }),
        preview: PreviewData {
            columns,
            rows: preview_rows,
            total_rows: Some(total_rows),
            column_types,
        },
    })
}

/// Render one JSON field the way it will travel to the server: strings
/// verbatim, null as empty, everything else in compact JSON text.
pub(crate) fn json_cell_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Null => String::new(),
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn analyze_json(
    path: &Path,
    bom_len: u64,
    size_bytes: u64,
    encoding: SourceEncoding,
) -> Result<ImportSource> {
    // JSON arrays are parsed eagerly; only JSON Lines streams
    let document: serde_json::Value = serde_json::from_reader(open_after_bom(path, bom_len)?)
        .map_err(|e| MammothError::invalid_json(e.to_string()))?;
    let items = match document {
        serde_json::Value::Array(items) => items,
        _ => {
            return Err(MammothError::invalid_json(
                "expected a top-level array of objects".to_string(),
            ))
        }
    };
    if items.is_empty() {
        return Err(MammothError::empty_file());
    }

    let first = items[0].as_object().ok_or_else(|| {
        MammothError::invalid_json("array elements must be objects")
    })?;
    let columns: Vec<String> = first.keys().cloned().collect();

    let mut sampler = ColumnSampler::new(columns.len());
    let mut preview_rows = Vec::new();

    for (row_idx, item) in items.iter().enumerate() {
        let object = item.as_object().ok_or_else(|| {
            MammothError::invalid_json(format!("element {} is not an object", row_idx))
        })?;
        let cells: Vec<String> = columns
            .iter()
            .map(|c| object.get(c).map(json_cell_text).unwrap_or_default())
            .collect();
        if row_idx < SAMPLE_ROWS {
            for (i, cell) in cells.iter().enumerate() {
                sampler.observe(i, cell);
            }
        }
        if row_idx < PREVIEW_ROWS {
            preview_rows.push(cells);
        }
    }

    let total_rows = items.len() as u64;
    let column_types = sampler.into_hints(&columns, true);
    Ok(ImportSource {
        path: path.to_path_buf(),
        format: ImportFormat::Json,
        size_bytes,
        encoding,
        csv_options: None,
        preview: PreviewData {
            columns,
            rows: preview_rows,
            total_rows: Some(total_rows),
            column_types,
        },
    })
}

fn analyze_json_lines(
    path: &Path,
    bom_len: u64,
    size_bytes: u64,
    encoding: SourceEncoding,
) -> Result<ImportSource> {
    let reader = open_after_bom(path, bom_len)?;

    let mut columns: Vec<String> = Vec::new();
    let mut sampler = ColumnSampler::new(0);
    let mut preview_rows = Vec::new();
    let mut total_rows = 0u64;

    for (line_idx, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        // Beyond the sampled prefix, lines are only counted; their
        // validity is checked when the import actually runs.
        if (total_rows as usize) < SAMPLE_ROWS {
            let value: serde_json::Value = serde_json::from_str(&line).map_err(|e| {
                MammothError::invalid_json(format!("line {}: {}", line_idx + 1, e))
            })?;
            let object = value.as_object().ok_or_else(|| {
                MammothError::invalid_json(format!("line {} is not an object", line_idx + 1))
            })?;
            if columns.is_empty() {
                columns = object.keys().cloned().collect();
                sampler = ColumnSampler::new(columns.len());
            }
            let cells: Vec<String> = columns
                .iter()
                .map(|c| object.get(c).map(json_cell_text).unwrap_or_default())
                .collect();
            for (i, cell) in cells.iter().enumerate() {
                sampler.observe(i, cell);
            }
            if (total_rows as usize) < PREVIEW_ROWS {
                preview_rows.push(cells);
            }
        }
        total_rows += 1;
    }

    if total_rows == 0 {
        return Err(MammothError::empty_file());
    }

    // JSON Lines keeps text hints; sampling still feeds the null counts
    let column_types = sampler.into_hints(&columns, false);
    Ok(ImportSource {
        path: path.to_path_buf(),
        format: ImportFormat::JsonLines,
        size_bytes,
        encoding,
        csv_options: None,
        preview: PreviewData {
            columns,
            rows: preview_rows,
            total_rows: Some(total_rows),
            column_types,
        },
    })
}

fn date_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d{4}-\d{2}-\d{2}").unwrap())
}

fn uuid_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"^[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}$",
        )
        .unwrap()
    })
}

/// Suggest a PostgreSQL type for a column from its non-null samples.
///
/// Candidates are tried in a fixed priority; each requires every sample to
/// match. No samples means no evidence, which lands on `text`.
pub fn infer_type(samples: &[String]) -> &'static str {
    if samples.is_empty() {
        return "text";
    }
    if samples.iter().all(|s| s.parse::<i64>().is_ok()) {
        return "bigint";
    }
    if samples.iter().all(|s| s.parse::<f64>().is_ok()) {
        return "numeric";
    }
    let is_bool = |s: &str| {
        matches!(
            s.to_lowercase().as_str(),
            "true" | "false" | "t" | "f" | "yes" | "no" | "1" | "0"
        )
    };
    if samples.iter().all(|s| is_bool(s)) {
        return "boolean";
    }
    if samples.iter().all(|s| date_regex().is_match(s)) {
        if samples.iter().any(|s| s.contains('T') || s.contains(' ')) {
            return "timestamp";
        }
        return "date";
    }
    if samples.iter().all(|s| uuid_regex().is_match(s)) {
        return "uuid";
    }
    "text"
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ImportFailure;
    use std::io::Write;

    fn write_temp(name: &str, contents: &[u8]) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let mut f = File::create(dir.path().join(name)).unwrap();
        f.write_all(contents).unwrap();
        dir
    }

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    // ── type inference ──

    #[test]
    fn test_infer_type_priorities() {
        assert_eq!(infer_type(&strings(&["1", "2", "3"])), "bigint");
        assert_eq!(infer_type(&strings(&["1.5", "2"])), "numeric");
        assert_eq!(infer_type(&strings(&["true", "0"])), "boolean");
        assert_eq!(infer_type(&strings(&["2024-01-15T00:00:00"])), "timestamp");
        assert_eq!(infer_type(&strings(&["2024-01-15"])), "date");
        assert_eq!(
            infer_type(&strings(&["c17ccc08-42f8-4b1a-93d4-1a7d2b7f06f5"])),
            "uuid"
        );
        assert_eq!(infer_type(&strings(&["hello"])), "text");
        assert_eq!(infer_type(&[]), "text");
    }

    #[test]
    fn test_infer_type_requires_all_samples_to_match() {
        assert_eq!(infer_type(&strings(&["1", "x"])), "text");
        assert_eq!(infer_type(&strings(&["2024-01-15", "soon"])), "text");
    }

    #[test]
    fn test_infer_type_date_with_space_is_timestamp() {
        assert_eq!(
            infer_type(&strings(&["2024-01-15 08:30:00", "2024-01-16 09:00:00"])),
            "timestamp"
        );
    }

    // ── delimiter detection ──

    #[test]
    fn test_detect_delimiter_majority() {
        assert_eq!(detect_delimiter("a,b,c"), b',');
        assert_eq!(detect_delimiter("a\tb\tc"), b'\t');
        assert_eq!(detect_delimiter("a;b;c;d"), b';');
        assert_eq!(detect_delimiter("a|b"), b'|');
    }

    #[test]
    fn test_detect_delimiter_tie_prefers_comma() {
        assert_eq!(detect_delimiter("a,b,c;d"), b',');
    }

    #[test]
    fn test_detect_delimiter_no_candidates_defaults_to_comma() {
        assert_eq!(detect_delimiter("single_column"), b',');
    }

    // ── CSV analysis ──

    #[test]
    fn test_analyze_csv_basic() {
        let dir = write_temp("users.csv", b"id,name\n1,Alice\n2,Bob\n");
        let source = analyze_sync(&dir.path().join("users.csv")).unwrap();

        assert_eq!(source.format, ImportFormat::Csv);
        assert_eq!(source.preview.columns, vec!["id", "name"]);
        assert_eq!(source.preview.total_rows, Some(2));
        assert_eq!(source.preview.rows.len(), 2);
        assert_eq!(source.preview.rows[0], vec!["1", "Alice"]);
        assert_eq!(source.csv_options.unwrap().delimiter, b',');

        let hints = &source.preview.column_types;
        assert_eq!(hints[0].suggested_type, "bigint");
        assert_eq!(hints[1].suggested_type, "text");
    }

    #[test]
    fn test_analyze_csv_preview_capped_at_five() {
        let mut data = String::from("n\n");
        for i in 0..20 {
            data.push_str(&format!("{}\n", i));
        }
        let dir = write_temp("many.csv", data.as_bytes());
        let source = analyze_sync(&dir.path().join("many.csv")).unwrap();
        assert_eq!(source.preview.rows.len(), 5);
        assert_eq!(source.preview.total_rows, Some(20));
    }

    #[test]
    fn test_analyze_csv_semicolon_delimiter() {
        let dir = write_temp("semi.csv", b"a;b\n1;2\n");
        let source = analyze_sync(&dir.path().join("semi.csv")).unwrap();
        assert_eq!(source.csv_options.unwrap().delimiter, b';');
        assert_eq!(source.preview.columns, vec!["a", "b"]);
    }

    #[test]
    fn test_analyze_csv_null_counting() {
        let dir = write_temp("nulls.csv", b"a,b\n1,\n2,x\n,\n");
        let source = analyze_sync(&dir.path().join("nulls.csv")).unwrap();
        let hints = &source.preview.column_types;
        assert_eq!(hints[0].null_count, 1);
        assert_eq!(hints[1].null_count, 2);
        assert_eq!(hints[1].sample_values, vec!["x"]);
    }

    #[test]
    fn test_analyze_csv_with_utf8_bom() {
        let dir = write_temp("bom.csv", b"\xEF\xBB\xBFid,name\n1,x\n");
        let source = analyze_sync(&dir.path().join("bom.csv")).unwrap();
        assert_eq!(source.preview.columns, vec!["id", "name"]);
        assert_eq!(source.encoding, SourceEncoding::Utf8);
    }

    #[test]
    fn test_analyze_empty_file() {
        let dir = write_temp("empty.csv", b"");
        let err = analyze_sync(&dir.path().join("empty.csv")).unwrap_err();
        assert!(matches!(err, MammothError::Import(ImportFailure::EmptyFile)));
    }

    #[test]
    fn test_analyze_unsupported_extension() {
        let dir = write_temp("data.parquet", b"xxxx");
        let err = analyze_sync(&dir.path().join("data.parquet")).unwrap_err();
        assert!(matches!(
            err,
            MammothError::Import(ImportFailure::UnsupportedFormat(ext)) if ext == "parquet"
        ));
    }

    #[test]
    fn test_analyze_utf16_rejected() {
        let dir = write_temp("wide.csv", b"\xFF\xFEi\x00d\x00");
        let err = analyze_sync(&dir.path().join("wide.csv")).unwrap_err();
        assert!(matches!(err, MammothError::Import(_)));
    }

    // ── JSON analysis ──

    #[test]
    fn test_analyze_json_array() {
        let dir = write_temp(
            "rows.json",
            br#"[{"id": 1, "name": "Alice"}, {"id": 2, "name": null}]"#,
        );
        let source = analyze_sync(&dir.path().join("rows.json")).unwrap();
        assert_eq!(source.format, ImportFormat::Json);
        assert_eq!(source.preview.columns, vec!["id", "name"]);
        assert_eq!(source.preview.total_rows, Some(2));
        assert_eq!(source.preview.rows[1], vec!["2", ""]);
        assert_eq!(source.preview.column_types[0].suggested_type, "bigint");
        assert_eq!(source.preview.column_types[1].null_count, 1);
    }

    #[test]
    fn test_analyze_json_object_stream_classified_as_lines() {
        let dir = write_temp(
            "stream.json",
            b"{\"id\": 1}\n{\"id\": 2}\n",
        );
        let source = analyze_sync(&dir.path().join("stream.json")).unwrap();
        assert_eq!(source.format, ImportFormat::JsonLines);
        assert_eq!(source.preview.total_rows, Some(2));
    }

    #[test]
    fn test_analyze_json_bad_root() {
        let dir = write_temp("bad.json", b"42");
        let err = analyze_sync(&dir.path().join("bad.json")).unwrap_err();
        assert!(matches!(
            err,
            MammothError::Import(ImportFailure::InvalidJson(_))
        ));
    }

    #[test]
    fn test_analyze_jsonl_skips_blank_lines_and_keeps_text_hints() {
        let dir = write_temp(
            "rows.jsonl",
            b"{\"id\": 1, \"name\": \"a\"}\n\n{\"id\": 2, \"name\": \"b\"}\n",
        );
        let source = analyze_sync(&dir.path().join("rows.jsonl")).unwrap();
        assert_eq!(source.format, ImportFormat::JsonLines);
        assert_eq!(source.preview.total_rows, Some(2));
        // JSON Lines does not infer types
        assert_eq!(source.preview.column_types[0].suggested_type, "text");
    }

    #[test]
    fn test_analyze_tsv_extension() {
        let dir = write_temp("cols.tsv", b"a\tb\n1\t2\n");
        let source = analyze_sync(&dir.path().join("cols.tsv")).unwrap();
        assert_eq!(source.format, ImportFormat::Csv);
        assert_eq!(source.csv_options.unwrap().delimiter, b'\t');
    }
}
