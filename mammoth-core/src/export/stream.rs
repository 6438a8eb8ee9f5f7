//! Incremental export for large result sets.
//!
//! Rows arrive over a bounded channel and are written to the sink as they
//! come; nothing but the in-flight row is buffered. A shared progress
//! record is refreshed every 1000 rows, and cancellation is observed
//! between rows.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use futures_util::{pin_mut, TryStreamExt};
use tokio::io::AsyncWriteExt;
use tokio_postgres::types::ToSql;

use crate::error::{MammothError, Result};
use crate::export::{
    csv, json, markdown, ExportColumn, ExportFormat, ExportOptions, ExportResult, QueryResultData,
};
use crate::value::Value;

/// Rows between progress refreshes.
const PROGRESS_INTERVAL: u64 = 1000;
/// Bound on the query-to-writer channel.
const ROW_CHANNEL_CAPACITY: usize = 256;

/// Shared progress of one streaming export.
#[derive(Debug, Clone, Default)]
pub struct ExportProgress {
    pub total_rows: Option<u64>,
    pub exported_rows: u64,
    pub bytes_written: u64,
    pub is_complete: bool,
    pub error: Option<String>,
}

/// Streaming exporter for the line-oriented formats
/// (CSV, TSV, JSON Lines, Markdown).
pub struct StreamingExporter {
    options: ExportOptions,
    progress: Arc<RwLock<ExportProgress>>,
    cancelled: Arc<AtomicBool>,
}

impl StreamingExporter {
    /// Create an exporter. Non-streamable formats are rejected; they buffer
    /// through [`crate::export::export_to_file`] instead.
    pub fn new(options: ExportOptions, total_rows: Option<u64>) -> Result<Self> {
        if !options.format.is_streamable() {
            return Err(MammothError::Export(format!(
                "{:?} cannot be streamed; use the buffered exporter",
                options.format
            )));
        }
        Ok(Self {
            options,
            progress: Arc::new(RwLock::new(ExportProgress {
                total_rows,
                ..Default::default()
            })),
            cancelled: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Snapshot of the current progress.
    pub fn progress(&self) -> ExportProgress {
        self.progress.read().unwrap().clone()
    }

    /// Shared handle for observers.
    pub fn progress_handle(&self) -> Arc<RwLock<ExportProgress>> {
        Arc::clone(&self.progress)
    }

    /// Request cooperative cancellation.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Drain the channel into the file, writing incrementally.
    pub async fn run(
        &self,
        columns: Vec<ExportColumn>,
        mut rows: tokio::sync::mpsc::Receiver<Vec<Value>>,
        path: impl AsRef<Path>,
    ) -> Result<ExportResult> {
        let outcome = self.write_all(&columns, &mut rows, path.as_ref()).await;
        match outcome {
            Ok(result) => {
                let mut progress = self.progress.write().unwrap();
                progress.exported_rows = result.rows;
                progress.bytes_written = result.bytes;
                progress.is_complete = true;
                Ok(result)
            }
            Err(e) => {
                self.progress.write().unwrap().error = Some(e.to_string());
                Err(e)
            }
        }
    }

    async fn write_all(
        &self,
        columns: &[ExportColumn],
        rows: &mut tokio::sync::mpsc::Receiver<Vec<Value>>,
        path: &Path,
    ) -> Result<ExportResult> {
        // Column-name context for the row encoders
        let shape = QueryResultData {
            columns: columns.to_vec(),
            rows: Vec::new(),
        };

        let file = tokio::fs::File::create(path).await?;
        let mut writer = tokio::io::BufWriter::new(file);
        let mut bytes_written = 0u64;
        let mut exported_rows = 0u64;

        let header = match self.options.format {
            ExportFormat::Csv if self.options.csv.include_headers => {
                Some(csv::encode_header(columns, &self.options.csv, b',')?)
            }
            ExportFormat::Tsv if self.options.csv.include_headers => {
                Some(csv::encode_header(columns, &self.options.csv, b'\t')?)
            }
            ExportFormat::Markdown => Some(markdown::encode_header(&shape)),
            _ => None,
        };
        if let Some(header) = header {
            writer.write_all(header.as_bytes()).await?;
            bytes_written += header.len() as u64;
        }

        while let Some(row) = rows.recv().await {
            if self.cancelled.load(Ordering::SeqCst) {
                return Err(MammothError::Cancelled);
            }
            let line = match self.options.format {
                ExportFormat::Csv => csv::encode_row(&row, &self.options.csv, b',')?,
                ExportFormat::Tsv => csv::encode_row(&row, &self.options.csv, b'\t')?,
                ExportFormat::JsonLines => json::encode_row(&shape, &row)?,
                ExportFormat::Markdown => markdown::encode_row(&row),
                // new() rejects everything else
                other => {
                    return Err(MammothError::Export(format!(
                        "{:?} cannot be streamed",
                        other
                    )))
                }
            };
            writer.write_all(line.as_bytes()).await?;
            bytes_written += line.len() as u64;
            exported_rows += 1;

            if exported_rows % PROGRESS_INTERVAL == 0 {
                let mut progress = self.progress.write().unwrap();
                progress.exported_rows = exported_rows;
                progress.bytes_written = bytes_written;
            }
        }

        writer.flush().await?;
        Ok(ExportResult {
            rows: exported_rows,
            bytes: bytes_written,
        })
    }

    /// Run a query and stream its rows straight into the file, without ever
    /// materializing the result set. Rows flow from the server through the
    /// value model into the writer over a bounded channel.
    pub async fn export_query(
        &self,
        client: &tokio_postgres::Client,
        sql: &str,
        path: impl AsRef<Path>,
    ) -> Result<ExportResult> {
        let statement = client.prepare(sql).await?;
        let columns: Vec<ExportColumn> = statement
            .columns()
            .iter()
            .map(|c| ExportColumn::new(c.name(), c.type_().name()))
            .collect();

        let row_stream = client
            .query_raw(&statement, Vec::<&(dyn ToSql + Sync)>::new())
            .await?;

        let (tx, rx) = tokio::sync::mpsc::channel(ROW_CHANNEL_CAPACITY);
        let feed = async move {
            pin_mut!(row_stream);
            while let Some(row) = row_stream.try_next().await? {
                if tx.send(crate::value::from_row(&row)).await.is_err() {
                    break; // writer side stopped (error or cancellation)
                }
            }
            Ok::<_, MammothError>(())
        };

        let (result, feed_outcome) = tokio::join!(self.run(columns, rx, path), feed);
        feed_outcome?;
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::CsvOptions;

    fn columns() -> Vec<ExportColumn> {
        vec![
            ExportColumn::new("id", "int4"),
            ExportColumn::new("name", "text"),
        ]
    }

    #[tokio::test]
    async fn test_streaming_csv_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");

        let exporter = StreamingExporter::new(
            ExportOptions {
                format: ExportFormat::Csv,
                ..Default::default()
            },
            Some(2),
        )
        .unwrap();

        let (tx, rx) = tokio::sync::mpsc::channel(8);
        tx.send(vec![Value::Int32(1), Value::Text("a".to_string())])
            .await
            .unwrap();
        tx.send(vec![Value::Int32(2), Value::Null]).await.unwrap();
        drop(tx);

        let result = exporter.run(columns(), rx, &path).await.unwrap();
        assert_eq!(result.rows, 2);

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents, "id,name\n1,a\n2,\n");

        let progress = exporter.progress();
        assert!(progress.is_complete);
        assert_eq!(progress.exported_rows, 2);
        assert_eq!(progress.bytes_written, result.bytes);
    }

    #[tokio::test]
    async fn test_streaming_markdown_includes_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.md");
        let exporter = StreamingExporter::new(
            ExportOptions {
                format: ExportFormat::Markdown,
                ..Default::default()
            },
            None,
        )
        .unwrap();

        let (tx, rx) = tokio::sync::mpsc::channel(8);
        tx.send(vec![Value::Int32(1), Value::Text("a".to_string())])
            .await
            .unwrap();
        drop(tx);

        exporter.run(columns(), rx, &path).await.unwrap();
        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents, "| id | name |\n| ---: | --- |\n| 1 | a |\n");
    }

    #[tokio::test]
    async fn test_streaming_rejects_buffered_formats() {
        for format in [ExportFormat::Json, ExportFormat::Sql, ExportFormat::Excel] {
            let result = StreamingExporter::new(
                ExportOptions {
                    format,
                    ..Default::default()
                },
                None,
            );
            assert!(result.is_err(), "{format:?}");
        }
    }

    #[tokio::test]
    async fn test_streaming_headers_can_be_disabled() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bare.tsv");
        let exporter = StreamingExporter::new(
            ExportOptions {
                format: ExportFormat::Tsv,
                csv: CsvOptions {
                    include_headers: false,
                    ..Default::default()
                },
                ..Default::default()
            },
            None,
        )
        .unwrap();

        let (tx, rx) = tokio::sync::mpsc::channel(8);
        tx.send(vec![Value::Int32(7), Value::Text("x".to_string())])
            .await
            .unwrap();
        drop(tx);

        exporter.run(columns(), rx, &path).await.unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "7\tx\n");
    }

    #[tokio::test]
    async fn test_cancellation_between_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cancelled.csv");
        let exporter = StreamingExporter::new(
            ExportOptions {
                format: ExportFormat::Csv,
                ..Default::default()
            },
            None,
        )
        .unwrap();
        exporter.cancel();

        let (tx, rx) = tokio::sync::mpsc::channel(8);
        tx.send(vec![Value::Int32(1), Value::Null]).await.unwrap();
        drop(tx);

        let err = exporter.run(columns(), rx, &path).await.unwrap_err();
        assert!(matches!(err, MammothError::Cancelled));
        assert!(exporter.progress().error.is_some());
    }
}
