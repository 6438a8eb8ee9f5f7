//! Bulk import pipeline: file analysis, wizard state machine, and the
//! COPY/INSERT executors.
//!
//! - [`analyze`] — file sniffing and streaming preview
//! - [`wizard`] — the five-step configuration state machine
//! - [`transform`] — per-cell column transforms
//! - [`execute`] — the COPY-path and INSERT-path executors

pub mod analyze;
pub mod execute;
pub mod transform;
pub mod wizard;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::import::transform::ColumnTransform;

/// Detected format of an import source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImportFormat {
    Csv,
    Json,
    JsonLines,
}

/// Source text encoding, detected from the byte order mark.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceEncoding {
    #[default]
    Utf8,
    Utf16Be,
    Utf16Le,
}

/// CSV dialect facts discovered by the analyzer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CsvSourceOptions {
    pub delimiter: u8,
    pub has_header: bool,
}

impl Default for CsvSourceOptions {
    fn default() -> Self {
        Self {
            delimiter: b',',
            has_header: true,
        }
    }
}

/// Per-column type suggestion gathered from the first rows of the source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnTypeHint {
    pub column: String,
    /// Suggested PostgreSQL type name.
    pub suggested_type: String,
    /// Up to five non-null sample values.
    pub sample_values: Vec<String>,
    /// Nulls seen across the sampled rows.
    pub null_count: usize,
}

/// What the analyzer retained: column names, up to five rows, the total row
/// count when one pass could compute it, and one hint per column.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PreviewData {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
    pub total_rows: Option<u64>,
    pub column_types: Vec<ColumnTypeHint>,
}

/// An analyzed source file, ready for target resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportSource {
    pub path: PathBuf,
    pub format: ImportFormat,
    pub size_bytes: u64,
    pub encoding: SourceEncoding,
    /// Present for CSV sources only.
    pub csv_options: Option<CsvSourceOptions>,
    pub preview: PreviewData,
}

/// Whether the import lands in an existing table or creates a new one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetKind {
    Existing,
    New,
}

/// One column of a target table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableColumn {
    pub name: String,
    pub data_type: String,
    pub is_nullable: bool,
    pub has_default: bool,
}

/// Resolved import destination.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportTarget {
    pub kind: TargetKind,
    pub schema: String,
    pub table: String,
    pub columns: Vec<TableColumn>,
}

/// `ON CONFLICT` behavior for the INSERT path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictHandling {
    /// No conflict clause; conflicts fail the row.
    #[default]
    Error,
    /// `ON CONFLICT (...) DO NOTHING`.
    Skip,
    /// `ON CONFLICT (...) DO UPDATE SET ...`.
    Update,
}

/// Execution options for a configured import.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportOptions {
    /// Prefer the COPY protocol. Only honored when `conflict_handling` is
    /// [`ConflictHandling::Error`]; COPY cannot express conflict resolution.
    pub use_copy: bool,
    pub conflict_handling: ConflictHandling,
    /// Conflict target columns for `Skip` and `Update`.
    pub conflict_columns: Vec<String>,
    /// Columns rewritten by `Update`.
    pub update_columns: Vec<String>,
    /// Rows per INSERT-path batch.
    pub batch_size: usize,
    /// Wrap the whole run in BEGIN/COMMIT, rolling back on any error.
    pub use_transaction: bool,
    /// TRUNCATE the target before loading.
    pub truncate_first: bool,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            use_copy: true,
            conflict_handling: ConflictHandling::Error,
            conflict_columns: Vec::new(),
            update_columns: Vec::new(),
            batch_size: 1000,
            use_transaction: false,
            truncate_first: false,
        }
    }
}

/// Source column → optional target column, with an optional transform.
/// A mapping without a target is a skipped column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnMapping {
    pub source: String,
    pub target: Option<String>,
    pub transform: ColumnTransform,
}

/// Lifecycle state of an import job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImportStatus {
    Configuring,
    Validating,
    Importing,
    Completed,
    Failed,
    Cancelled,
}

/// Executor phase reported inside progress ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImportPhase {
    Preparing,
    Copying,
    Inserting,
    Finalizing,
}

/// One progress tick. The COPY path emits every 1000 rows; the INSERT path
/// after each batch.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ImportProgress {
    pub phase: ImportPhase,
    pub rows_read: u64,
    pub rows_processed: u64,
    pub rows_inserted: u64,
    pub rows_skipped: u64,
    pub rows_failed: u64,
    pub current_batch: u64,
    pub total_batches: Option<u64>,
}

/// One failed source row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportError {
    /// 1-based data row number in the source.
    pub row: u64,
    pub message: String,
    pub sql_state: Option<String>,
}

/// Outcome of a finished (or failed) import run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportResult {
    pub success: bool,
    pub rows_read: u64,
    pub rows_inserted: u64,
    pub rows_skipped: u64,
    pub rows_failed: u64,
    /// First 100 row errors, for display.
    pub errors: Vec<ImportError>,
    pub duration_ms: u64,
}

/// Maximum row errors kept on a result.
pub const MAX_REPORTED_ERRORS: usize = 100;

/// Full state of one import job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportJob {
    pub id: Uuid,
    pub status: ImportStatus,
    pub source: ImportSource,
    pub target: Option<ImportTarget>,
    pub mappings: Vec<ColumnMapping>,
    pub options: ImportOptions,
    pub progress: Option<ImportProgress>,
    pub result: Option<ImportResult>,
    pub created_at: DateTime<Utc>,
}

impl ImportJob {
    pub fn new(source: ImportSource) -> Self {
        Self {
            id: Uuid::new_v4(),
            status: ImportStatus::Configuring,
            source,
            target: None,
            mappings: Vec::new(),
            options: ImportOptions::default(),
            progress: None,
            result: None,
            created_at: Utc::now(),
        }
    }
}

/// Shared handle to a registered job: the mutable job state plus the
/// cooperative cancellation flag the executor polls at row boundaries.
pub struct JobHandle {
    job: RwLock<ImportJob>,
    cancelled: AtomicBool,
}

impl JobHandle {
    fn new(job: ImportJob) -> Self {
        Self {
            job: RwLock::new(job),
            cancelled: AtomicBool::new(false),
        }
    }

    /// Clone of the current job state.
    pub fn snapshot(&self) -> ImportJob {
        self.job.read().unwrap().clone()
    }

    /// Request cooperative cancellation.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub fn update<F: FnOnce(&mut ImportJob)>(&self, f: F) {
        f(&mut self.job.write().unwrap());
    }
}

/// Process-wide registry of import jobs, keyed by job id.
#[derive(Default)]
pub struct JobRegistry {
    jobs: RwLock<HashMap<Uuid, Arc<JobHandle>>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new job and return its handle.
    pub fn insert(&self, job: ImportJob) -> Arc<JobHandle> {
        let id = job.id;
        let handle = Arc::new(JobHandle::new(job));
        self.jobs.write().unwrap().insert(id, Arc::clone(&handle));
        handle
    }

    pub fn get(&self, id: Uuid) -> Option<Arc<JobHandle>> {
        self.jobs.read().unwrap().get(&id).cloned()
    }

    pub fn remove(&self, id: Uuid) -> Option<Arc<JobHandle>> {
        self.jobs.write().unwrap().remove(&id)
    }

    /// Snapshots of all registered jobs.
    pub fn list(&self) -> Vec<ImportJob> {
        self.jobs
            .read()
            .unwrap()
            .values()
            .map(|handle| handle.snapshot())
            .collect()
    }
}
