//! Import execution: the COPY path and the INSERT path.
//!
//! Rows are read, transformed, and sent in strict source order within one
//! executor task. Source file reading runs on the blocking pool and feeds
//! the executor over a bounded channel; all server I/O is async. The
//! executor observes the job's cancellation flag between rows (COPY) or
//! between batches (INSERT).

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use futures_util::{pin_mut, SinkExt};
use tokio_postgres::types::{ToSql, Type};

use crate::error::{MammothError, Result};
use crate::import::transform::ColumnTransform;
use crate::import::{
    ConflictHandling, ImportError, ImportFormat, ImportJob, ImportPhase, ImportProgress,
    ImportResult, ImportSource, ImportStatus, ImportTarget, JobHandle, TargetKind,
    MAX_REPORTED_ERRORS,
};
use crate::pool::ConnectionPool;
use crate::sql::{qualified_table, quote_ident, quoted_columns};

/// Rows between progress ticks on the COPY path.
const COPY_PROGRESS_INTERVAL: u64 = 1000;
/// Bound on the reader-to-executor channel.
const READER_CHANNEL_CAPACITY: usize = 256;

/// One mapped output column, precomputed before the row loop.
struct MappedColumn {
    target: String,
    /// Index into the source column order; absent source columns yield NULL.
    source_idx: Option<usize>,
    transform: ColumnTransform,
    /// Cast applied to the text parameter on the INSERT path.
    cast: String,
}

/// Run a configured import job against a pool. Progress, status, and the
/// final result are written through the job handle as the run proceeds.
pub async fn execute(pool: &ConnectionPool, handle: &Arc<JobHandle>) -> Result<ImportResult> {
    let job = handle.snapshot();
    handle.update(|j| j.status = ImportStatus::Validating);

    match run(pool, handle, job).await {
        Ok(result) => {
            handle.update(|j| {
                j.status = if result.success {
                    ImportStatus::Completed
                } else {
                    ImportStatus::Failed
                };
                j.result = Some(result.clone());
            });
            Ok(result)
        }
        Err(MammothError::Cancelled) => {
            handle.update(|j| j.status = ImportStatus::Cancelled);
            Err(MammothError::Cancelled)
        }
        Err(e) => {
            handle.update(|j| j.status = ImportStatus::Failed);
            Err(e)
        }
    }
}

async fn run(
    pool: &ConnectionPool,
    handle: &Arc<JobHandle>,
    job: ImportJob,
) -> Result<ImportResult> {
    let target = job.target.clone().ok_or_else(|| {
        MammothError::invalid_input("target", "Import target is not configured")
    })?;

    let mapped = build_mapped_columns(&job, &target)?;
    if mapped.is_empty() {
        return Err(MammothError::invalid_input(
            "mappings",
            "At least one column must be mapped",
        ));
    }

    let started = Instant::now();
    handle.update(|j| {
        j.status = ImportStatus::Importing;
        j.progress = Some(ImportProgress {
            phase: ImportPhase::Preparing,
            rows_read: 0,
            rows_processed: 0,
            rows_inserted: 0,
            rows_skipped: 0,
            rows_failed: 0,
            current_batch: 0,
            total_batches: None,
        });
    });

    let client = pool.get().await?;

    if target.kind == TargetKind::New {
        create_target_table(&client, &target).await?;
    }
    if job.options.truncate_first {
        client
            .batch_execute(&format!(
                "TRUNCATE TABLE {}",
                qualified_table(&target.schema, &target.table)
            ))
            .await?;
    }

    let mut result = if selects_copy_path(&job.options) {
        copy_path(&client, handle, &job, &target, &mapped).await?
    } else {
        insert_path(&client, handle, &job, &target, &mapped).await?
    };

    result.duration_ms = started.elapsed().as_millis() as u64;
    result.errors.truncate(MAX_REPORTED_ERRORS);
    log::info!(
        "Import finished; job={}, success={}, rows_read={}, rows_inserted={}, rows_skipped={}, rows_failed={}, duration_ms={}",
        job.id,
        result.success,
        result.rows_read,
        result.rows_inserted,
        result.rows_skipped,
        result.rows_failed,
        result.duration_ms
    );
    Ok(result)
}

/// COPY cannot express conflict resolution; anything but Error falls back
/// to the INSERT path.
pub fn selects_copy_path(options: &crate::import::ImportOptions) -> bool {
    options.use_copy && options.conflict_handling == ConflictHandling::Error
}

/// Resolve the job's mappings against the target columns.
fn build_mapped_columns(job: &ImportJob, target: &ImportTarget) -> Result<Vec<MappedColumn>> {
    let source_columns = &job.source.preview.columns;
    let mut mapped = Vec::new();
    for mapping in &job.mappings {
        let Some(ref target_name) = mapping.target else {
            continue; // skipped column
        };
        let cast = target
            .columns
            .iter()
            .find(|c| &c.name == target_name)
            .map(|c| c.data_type.clone())
            .unwrap_or_else(|| "text".to_string());
        mapped.push(MappedColumn {
            target: target_name.clone(),
            source_idx: source_columns.iter().position(|c| c == &mapping.source),
            transform: mapping.transform,
            cast,
        });
    }
    Ok(mapped)
}

/// `CREATE TABLE` for an auto-created target. Column shapes come from the
/// analyzer's hints via the wizard; failure aborts the job.
async fn create_target_table(
    client: &deadpool_postgres::Client,
    target: &ImportTarget,
) -> Result<()> {
    let columns: Vec<String> = target
        .columns
        .iter()
        .map(|c| {
            let mut def = format!("{} {}", quote_ident(&c.name), c.data_type);
            if !c.is_nullable {
                def.push_str(" NOT NULL");
            }
            def
        })
        .collect();
    let sql = format!(
        "CREATE TABLE {} ({})",
        qualified_table(&target.schema, &target.table),
        columns.join(", ")
    );
    log::info!(
        "Creating import target table; table={}.{}",
        target.schema,
        target.table
    );
    client.batch_execute(&sql).await?;
    Ok(())
}

/// Apply one mapping to a raw source row. Empty cells (and cells whose
/// source column is missing) become NULL.
fn map_cell(row: &[String], column: &MappedColumn) -> Option<String> {
    let raw = column
        .source_idx
        .and_then(|idx| row.get(idx))
        .map(String::as_str)
        .unwrap_or("");
    let transformed = column.transform.apply(raw);
    if transformed.is_empty() {
        None
    } else {
        Some(transformed)
    }
}

/// Encode one CSV field for the COPY sink: NULL as `\N`, quoting applied
/// when the value contains a delimiter, quote, or newline.
fn copy_field(value: &Option<String>) -> String {
    match value {
        None => "\\N".to_string(),
        Some(v) => {
            if v.contains(',') || v.contains('"') || v.contains('\n') {
                format!("\"{}\"", v.replace('"', "\"\""))
            } else {
                v.clone()
            }
        }
    }
}

async fn copy_path(
    client: &deadpool_postgres::Client,
    handle: &Arc<JobHandle>,
    job: &ImportJob,
    target: &ImportTarget,
    mapped: &[MappedColumn],
) -> Result<ImportResult> {
    let target_names: Vec<String> = mapped.iter().map(|m| m.target.clone()).collect();
    let statement = format!(
        "COPY {} ({}) FROM STDIN WITH (FORMAT csv, HEADER false, NULL '\\N')",
        qualified_table(&target.schema, &target.table),
        quoted_columns(&target_names),
    );

    let sink = client.copy_in::<_, Bytes>(statement.as_str()).await?;
    pin_mut!(sink);

    let mut rows = spawn_reader(&job.source);
    let mut rows_read = 0u64;
    let mut rows_sent = 0u64;
    let mut rows_failed = 0u64;
    let mut errors: Vec<ImportError> = Vec::new();
    let mut copy_failed = false;

    while let Some(row) = rows.recv().await {
        if handle.is_cancelled() {
            // Dropping the sink aborts the COPY without committing anything
            return Err(MammothError::Cancelled);
        }
        rows_read += 1;
        let row = match row {
            Ok(row) => row,
            Err(e) => {
                rows_failed += 1;
                push_error(&mut errors, rows_read, e.to_string(), None);
                continue;
            }
        };

        let mut line = String::new();
        for (i, column) in mapped.iter().enumerate() {
            if i > 0 {
                line.push(',');
            }
            line.push_str(&copy_field(&map_cell(&row, column)));
        }
        line.push('\n');

        match sink.send(Bytes::from(line)).await {
            Ok(()) => rows_sent += 1,
            Err(e) => {
                // A failed send leaves the stream in a failed state; the
                // whole COPY is considered failed from here on.
                rows_failed += 1;
                push_error(&mut errors, rows_read, crate::error::format_db_error(&e), None);
                copy_failed = true;
                break;
            }
        }

        if rows_read % COPY_PROGRESS_INTERVAL == 0 {
            tick_progress(
                handle,
                ImportPhase::Copying,
                rows_read,
                rows_sent,
                rows_sent,
                0,
                rows_failed,
                0,
                None,
            );
        }
    }

    let mut rows_inserted = 0u64;
    if !copy_failed {
        match sink.finish().await {
            Ok(count) => rows_inserted = count,
            Err(e) => {
                copy_failed = true;
                push_error(&mut errors, rows_read, crate::error::format_db_error(&e), None);
            }
        }
    }

    tick_progress(
        handle,
        ImportPhase::Finalizing,
        rows_read,
        rows_sent,
        rows_inserted,
        0,
        rows_failed,
        0,
        None,
    );

    Ok(ImportResult {
        // Same formula as the INSERT path; a failed write forces false
        success: !copy_failed && (errors.is_empty() || rows_inserted > 0),
        rows_read,
        rows_inserted,
        rows_skipped: 0,
        rows_failed,
        errors,
        duration_ms: 0,
    })
}

/// Build the INSERT statement: casted text placeholders plus the conflict
/// clause the options ask for.
fn build_insert_sql(target: &ImportTarget, mapped: &[MappedColumn], options: &crate::import::ImportOptions) -> String {
    let target_names: Vec<String> = mapped.iter().map(|m| m.target.clone()).collect();
    let placeholders: Vec<String> = mapped
        .iter()
        .enumerate()
        .map(|(i, m)| format!("${}::{}", i + 1, m.cast))
        .collect();
    let mut sql = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        qualified_table(&target.schema, &target.table),
        quoted_columns(&target_names),
        placeholders.join(", ")
    );
    match options.conflict_handling {
        ConflictHandling::Skip if !options.conflict_columns.is_empty() => {
            sql.push_str(&format!(
                " ON CONFLICT ({}) DO NOTHING",
                quoted_columns(&options.conflict_columns)
            ));
        }
        ConflictHandling::Update
            if !options.conflict_columns.is_empty() && !options.update_columns.is_empty() =>
        {
            let updates: Vec<String> = options
                .update_columns
                .iter()
                .map(|c| format!("{} = EXCLUDED.{}", quote_ident(c), quote_ident(c)))
                .collect();
            sql.push_str(&format!(
                " ON CONFLICT ({}) DO UPDATE SET {}",
                quoted_columns(&options.conflict_columns),
                updates.join(", ")
            ));
        }
        _ => {}
    }
    sql
}

async fn insert_path(
    client: &deadpool_postgres::Client,
    handle: &Arc<JobHandle>,
    job: &ImportJob,
    target: &ImportTarget,
    mapped: &[MappedColumn],
) -> Result<ImportResult> {
    let sql = build_insert_sql(target, mapped, &job.options);
    let param_types = vec![Type::TEXT; mapped.len()];
    let statement = client.prepare_typed(&sql, &param_types).await?;

    let batch_size = job.options.batch_size.max(1);
    let total_batches = job
        .source
        .preview
        .total_rows
        .map(|total| total.div_ceil(batch_size as u64));

    if job.options.use_transaction {
        client.batch_execute("BEGIN").await?;
    }

    let mut rows = spawn_reader(&job.source);
    let mut rows_read = 0u64;
    let mut rows_inserted = 0u64;
    let mut rows_skipped = 0u64;
    let mut rows_failed = 0u64;
    let mut errors: Vec<ImportError> = Vec::new();
    let mut current_batch = 0u64;
    let mut transaction_aborted = false;

    'batches: loop {
        if handle.is_cancelled() {
            if job.options.use_transaction {
                rollback(client).await;
            }
            return Err(MammothError::Cancelled);
        }

        let mut batch = Vec::with_capacity(batch_size);
        while batch.len() < batch_size {
            match rows.recv().await {
                Some(row) => batch.push(row),
                None => break,
            }
        }
        if batch.is_empty() {
            break;
        }
        current_batch += 1;

        for row in batch {
            rows_read += 1;
            let row = match row {
                Ok(row) => row,
                Err(e) => {
                    rows_failed += 1;
                    push_error(&mut errors, rows_read, e.to_string(), None);
                    if job.options.use_transaction {
                        rollback(client).await;
                        transaction_aborted = true;
                        break 'batches;
                    }
                    continue;
                }
            };

            let params: Vec<Option<String>> =
                mapped.iter().map(|column| map_cell(&row, column)).collect();
            let param_refs: Vec<&(dyn ToSql + Sync)> =
                params.iter().map(|p| p as &(dyn ToSql + Sync)).collect();

            match client.execute(&statement, &param_refs).await {
                Ok(affected) if affected > 0 => rows_inserted += 1,
                Ok(_) => rows_skipped += 1,
                Err(e) => {
                    rows_failed += 1;
                    let sql_state = e.as_db_error().map(|db| db.code().code().to_string());
                    push_error(
                        &mut errors,
                        rows_read,
                        crate::error::format_db_error(&e),
                        sql_state,
                    );
                    if job.options.use_transaction {
                        // The transaction is aborted server-side; nothing
                        // after the first error can succeed
                        rollback(client).await;
                        transaction_aborted = true;
                        break 'batches;
                    }
                }
            }
        }

        tick_progress(
            handle,
            ImportPhase::Inserting,
            rows_read,
            rows_read,
            rows_inserted,
            rows_skipped,
            rows_failed,
            current_batch,
            total_batches,
        );
    }

    if job.options.use_transaction && !transaction_aborted {
        if errors.is_empty() {
            client.batch_execute("COMMIT").await?;
        } else {
            rollback(client).await;
        }
    }
    let committed = !job.options.use_transaction || (!transaction_aborted && errors.is_empty());
    if !committed {
        // Rolled back: nothing actually landed
        rows_inserted = 0;
        rows_skipped = 0;
    }

    tick_progress(
        handle,
        ImportPhase::Finalizing,
        rows_read,
        rows_read,
        rows_inserted,
        rows_skipped,
        rows_failed,
        current_batch,
        total_batches,
    );

    Ok(ImportResult {
        success: errors.is_empty() || rows_inserted > 0,
        rows_read,
        rows_inserted,
        rows_skipped,
        rows_failed,
        errors,
        duration_ms: 0,
    })
}

async fn rollback(client: &deadpool_postgres::Client) {
    if let Err(e) = client.batch_execute("ROLLBACK").await {
        log::warn!("Failed to roll back import transaction: {}", e);
    }
}

fn push_error(errors: &mut Vec<ImportError>, row: u64, message: String, sql_state: Option<String>) {
    if errors.len() < MAX_REPORTED_ERRORS {
        errors.push(ImportError {
            row,
            message,
            sql_state,
        });
    }
}

#[allow(clippy::too_many_arguments)]
fn tick_progress(
    handle: &Arc<JobHandle>,
    phase: ImportPhase,
    rows_read: u64,
    rows_processed: u64,
    rows_inserted: u64,
    rows_skipped: u64,
    rows_failed: u64,
    current_batch: u64,
    total_batches: Option<u64>,
) {
    handle.update(|job| {
        job.progress = Some(ImportProgress {
            phase,
            rows_read,
            rows_processed,
            rows_inserted,
            rows_skipped,
            rows_failed,
            current_batch,
            total_batches,
        });
    });
}

// ── source row reader ──

/// Stream source rows (aligned to the analyzer's column order) over a
/// bounded channel, reading on the blocking pool.
fn spawn_reader(
    source: &ImportSource,
) -> tokio::sync::mpsc::Receiver<std::result::Result<Vec<String>, MammothError>> {
    let (tx, rx) = tokio::sync::mpsc::channel(READER_CHANNEL_CAPACITY);
    let source = source.clone();
    tokio::task::spawn_blocking(move || {
        let outcome = match source.format {
            ImportFormat::Csv => read_csv(&source, &tx),
            ImportFormat::Json => read_json(&source, &tx),
            ImportFormat::JsonLines => read_json_lines(&source, &tx),
        };
        if let Err(e) = outcome {
            let _ = tx.blocking_send(Err(e));
        }
    });
    rx
}

type RowSender = tokio::sync::mpsc::Sender<std::result::Result<Vec<String>, MammothError>>;

fn open_source(path: &Path) -> Result<std::io::BufReader<std::fs::File>> {
    use std::io::{Read, Seek, SeekFrom};
    let mut file = std::fs::File::open(path)?;
    // Skip a UTF-8 BOM when present
    let mut head = [0u8; 3];
    let n = file.read(&mut head)?;
    if !(n >= 3 && head == [0xEF, 0xBB, 0xBF]) {
        file.seek(SeekFrom::Start(0))?;
    }
    Ok(std::io::BufReader::new(file))
}

fn read_csv(source: &ImportSource, tx: &RowSender) -> Result<()> {
    let options = source.csv_options.unwrap_or_default();
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(options.delimiter)
        .has_headers(options.has_header)
        .flexible(true)
        .from_reader(open_source(&source.path)?);

    for record in reader.records() {
        let item = record
            .map(|r| r.iter().map(|c| c.to_string()).collect())
            .map_err(MammothError::from);
        if tx.blocking_send(item).is_err() {
            break; // executor hung up (cancellation)
        }
    }
    Ok(())
}

fn read_json(source: &ImportSource, tx: &RowSender) -> Result<()> {
    let document: serde_json::Value = serde_json::from_reader(open_source(&source.path)?)
        .map_err(|e| MammothError::invalid_json(e.to_string()))?;
    let items = match document {
        serde_json::Value::Array(items) => items,
        _ => {
            return Err(MammothError::invalid_json(
                "expected a top-level array of objects".to_string(),
            ))
        }
    };
    for item in items {
        let row = match item.as_object() {
            Some(object) => Ok(object_row(object, &source.preview.columns)),
            None => Err(MammothError::invalid_json(
                "array element is not an object".to_string(),
            )),
        };
        if tx.blocking_send(row).is_err() {
            break;
        }
    }
    Ok(())
}

fn read_json_lines(source: &ImportSource, tx: &RowSender) -> Result<()> {
    use std::io::BufRead;
    let reader = open_source(&source.path)?;
    for (line_idx, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let row = serde_json::from_str::<serde_json::Value>(&line)
            .map_err(|e| MammothError::invalid_json(format!("line {}: {}", line_idx + 1, e)))
            .and_then(|value| {
                value
                    .as_object()
                    .map(|object| object_row(object, &source.preview.columns))
                    .ok_or_else(|| {
                        MammothError::invalid_json(format!("line {} is not an object", line_idx + 1))
                    })
            });
        if tx.blocking_send(row).is_err() {
            break;
        }
    }
    Ok(())
}

fn object_row(
    object: &serde_json::Map<String, serde_json::Value>,
    columns: &[String],
) -> Vec<String> {
    columns
        .iter()
        .map(|c| {
            object
                .get(c)
                .map(crate::import::analyze::json_cell_text)
                .unwrap_or_default()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::import::{ColumnMapping, ImportOptions, TableColumn};

    fn target() -> ImportTarget {
        ImportTarget {
            kind: TargetKind::Existing,
            schema: "public".to_string(),
            table: "users".to_string(),
            columns: vec![
                TableColumn {
                    name: "id".to_string(),
                    data_type: "bigint".to_string(),
                    is_nullable: false,
                    has_default: false,
                },
                TableColumn {
                    name: "name".to_string(),
                    data_type: "text".to_string(),
                    is_nullable: true,
                    has_default: false,
                },
            ],
        }
    }

    fn mapped() -> Vec<MappedColumn> {
        vec![
            MappedColumn {
                target: "id".to_string(),
                source_idx: Some(0),
                transform: ColumnTransform::None,
                cast: "bigint".to_string(),
            },
            MappedColumn {
                target: "name".to_string(),
                source_idx: Some(1),
                transform: ColumnTransform::Trim,
                cast: "text".to_string(),
            },
        ]
    }

    #[test]
    fn test_copy_path_selection() {
        let mut options = ImportOptions {
            use_copy: true,
            ..Default::default()
        };
        assert!(selects_copy_path(&options));

        // Conflict resolution forces the INSERT path even with use_copy set
        options.conflict_handling = ConflictHandling::Skip;
        assert!(!selects_copy_path(&options));
        options.conflict_handling = ConflictHandling::Update;
        assert!(!selects_copy_path(&options));

        options.conflict_handling = ConflictHandling::Error;
        options.use_copy = false;
        assert!(!selects_copy_path(&options));
    }

    #[test]
    fn test_copy_field_quoting() {
        assert_eq!(copy_field(&None), "\\N");
        assert_eq!(copy_field(&Some("plain".to_string())), "plain");
        assert_eq!(copy_field(&Some("a,b".to_string())), "\"a,b\"");
        assert_eq!(copy_field(&Some("say \"hi\"".to_string())), "\"say \"\"hi\"\"\"");
        assert_eq!(copy_field(&Some("two\nlines".to_string())), "\"two\nlines\"");
    }

    #[test]
    fn test_map_cell_applies_transform_and_nulls() {
        let columns = mapped();
        let row = vec!["7".to_string(), "  Ada  ".to_string()];
        assert_eq!(map_cell(&row, &columns[0]), Some("7".to_string()));
        assert_eq!(map_cell(&row, &columns[1]), Some("Ada".to_string()));

        // Empty and missing cells are NULL
        let row = vec!["".to_string()];
        assert_eq!(map_cell(&row, &columns[0]), None);
        assert_eq!(map_cell(&row, &columns[1]), None);
    }

    #[test]
    fn test_build_insert_sql_plain() {
        let sql = build_insert_sql(&target(), &mapped(), &ImportOptions::default());
        assert_eq!(
            sql,
            "INSERT INTO public.users (id, name) VALUES ($1::bigint, $2::text)"
        );
    }

    #[test]
    fn test_build_insert_sql_on_conflict_skip() {
        let options = ImportOptions {
            conflict_handling: ConflictHandling::Skip,
            conflict_columns: vec!["id".to_string()],
            ..Default::default()
        };
        let sql = build_insert_sql(&target(), &mapped(), &options);
        assert!(sql.ends_with(" ON CONFLICT (id) DO NOTHING"));
    }

    #[test]
    fn test_build_insert_sql_on_conflict_update() {
        let options = ImportOptions {
            conflict_handling: ConflictHandling::Update,
            conflict_columns: vec!["id".to_string()],
            update_columns: vec!["name".to_string()],
            ..Default::default()
        };
        let sql = build_insert_sql(&target(), &mapped(), &options);
        assert!(sql.ends_with(" ON CONFLICT (id) DO UPDATE SET name = EXCLUDED.name"));
    }

    #[test]
    fn test_build_insert_sql_skip_without_columns_has_no_clause() {
        let options = ImportOptions {
            conflict_handling: ConflictHandling::Skip,
            ..Default::default()
        };
        let sql = build_insert_sql(&target(), &mapped(), &options);
        assert!(!sql.contains("ON CONFLICT"));
    }

    #[test]
    fn test_mapped_columns_skip_unmapped() {
        let source = crate::import::ImportSource {
            path: std::path::PathBuf::from("/tmp/x.csv"),
            format: ImportFormat::Csv,
            size_bytes: 1,
            encoding: crate::import::SourceEncoding::Utf8,
            csv_options: None,
            preview: crate::import::PreviewData {
                columns: vec!["id".to_string(), "junk".to_string()],
                ..Default::default()
            },
        };
        let mut job = ImportJob::new(source);
        job.mappings = vec![
            ColumnMapping {
                source: "id".to_string(),
                target: Some("id".to_string()),
                transform: ColumnTransform::None,
            },
            ColumnMapping {
                source: "junk".to_string(),
                target: None,
                transform: ColumnTransform::None,
            },
        ];
        let mapped = build_mapped_columns(&job, &target()).unwrap();
        assert_eq!(mapped.len(), 1);
        assert_eq!(mapped[0].target, "id");
        assert_eq!(mapped[0].cast, "bigint");
    }
}
