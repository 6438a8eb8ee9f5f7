//! The five-step import wizard state machine.
//!
//! Steps run `Source → Target → Mapping → Options → Execute`; each step
//! gates advancement on its own completion. The only I/O here is loading
//! the candidate target tables on entry to the Target step; execution
//! itself lives in [`crate::import::execute`].

use serde::{Deserialize, Serialize};
use tokio_postgres::GenericClient;

use crate::error::{MammothError, Result};
use crate::import::{
    ColumnMapping, ImportJob, ImportOptions, ImportSource, ImportTarget, TableColumn, TargetKind,
};

/// Wizard position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WizardStep {
    Source,
    Target,
    Mapping,
    Options,
    Execute,
}

impl WizardStep {
    fn next(self) -> Option<WizardStep> {
        match self {
            WizardStep::Source => Some(WizardStep::Target),
            WizardStep::Target => Some(WizardStep::Mapping),
            WizardStep::Mapping => Some(WizardStep::Options),
            WizardStep::Options => Some(WizardStep::Execute),
            WizardStep::Execute => None,
        }
    }

    fn prev(self) -> Option<WizardStep> {
        match self {
            WizardStep::Source => None,
            WizardStep::Target => Some(WizardStep::Source),
            WizardStep::Mapping => Some(WizardStep::Target),
            WizardStep::Options => Some(WizardStep::Mapping),
            WizardStep::Execute => Some(WizardStep::Options),
        }
    }
}

/// One candidate target table with its columns, as introspected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetTable {
    pub name: String,
    pub columns: Vec<TableColumn>,
}

/// Wizard state for configuring one import.
pub struct ImportWizard {
    step: WizardStep,
    source: Option<ImportSource>,
    schema: String,
    available_tables: Vec<TargetTable>,
    target: Option<ImportTarget>,
    mappings: Vec<ColumnMapping>,
    options: ImportOptions,
    executing: bool,
}

impl ImportWizard {
    pub fn new() -> Self {
        Self {
            step: WizardStep::Source,
            source: None,
            schema: "public".to_string(),
            available_tables: Vec::new(),
            target: None,
            mappings: Vec::new(),
            options: ImportOptions::default(),
            executing: false,
        }
    }

    pub fn step(&self) -> WizardStep {
        self.step
    }

    pub fn source(&self) -> Option<&ImportSource> {
        self.source.as_ref()
    }

    pub fn target(&self) -> Option<&ImportTarget> {
        self.target.as_ref()
    }

    pub fn mappings(&self) -> &[ColumnMapping] {
        &self.mappings
    }

    pub fn options(&self) -> &ImportOptions {
        &self.options
    }

    pub fn available_tables(&self) -> &[TargetTable] {
        &self.available_tables
    }

    pub fn is_executing(&self) -> bool {
        self.executing
    }

    /// Attach an analyzed source. Resets downstream choices, since the
    /// column set may have changed.
    pub fn set_source(&mut self, source: ImportSource) {
        self.source = Some(source);
        self.target = None;
        self.mappings.clear();
    }

    pub fn set_options(&mut self, options: ImportOptions) {
        self.options = options;
    }

    /// Whether the current step's gate is satisfied.
    pub fn can_advance(&self) -> bool {
        match self.step {
            WizardStep::Source => self.source.is_some(),
            WizardStep::Target => match &self.target {
                Some(target) => match target.kind {
                    TargetKind::Existing => true,
                    TargetKind::New => !target.table.trim().is_empty(),
                },
                None => false,
            },
            WizardStep::Mapping => self.mappings.iter().any(|m| m.target.is_some()),
            WizardStep::Options => true,
            WizardStep::Execute => false,
        }
    }

    /// Advance to the next step. Entering Mapping with no mappings yet
    /// builds the automatic name-based mapping.
    pub fn advance(&mut self) -> Result<WizardStep> {
        if !self.can_advance() {
            return Err(MammothError::invalid_input(
                "wizard",
                match self.step {
                    WizardStep::Source => "Analyze a source file first",
                    WizardStep::Target => "Choose an existing table or name a new one",
                    WizardStep::Mapping => "Map at least one column",
                    _ => "Cannot advance from this step",
                },
            ));
        }
        // can_advance is false on Execute, so next() always exists here
        self.step = self.step.next().expect("Execute step never advances");
        if self.step == WizardStep::Mapping && self.mappings.is_empty() {
            self.auto_map();
        }
        Ok(self.step)
    }

    /// Go back one step. A no-op on Source and while executing.
    pub fn back(&mut self) -> WizardStep {
        if !self.executing {
            if let Some(prev) = self.step.prev() {
                self.step = prev;
            }
        }
        self.step
    }

    /// Load candidate target tables for a schema from the catalog. Called on
    /// entry to the Target step.
    pub async fn load_tables<C: GenericClient>(&mut self, client: &C, schema: &str) -> Result<()> {
        self.available_tables = introspect_tables(client, schema).await?;
        self.schema = schema.to_string();
        Ok(())
    }

    /// Target an existing table from the loaded candidates.
    pub fn select_table(&mut self, name: &str) -> Result<()> {
        let table = self
            .available_tables
            .iter()
            .find(|t| t.name == name)
            .ok_or_else(|| {
                MammothError::invalid_input(
                    "table",
                    format!("Table '{}' is not in schema '{}'", name, self.schema),
                )
            })?;
        self.target = Some(ImportTarget {
            kind: TargetKind::Existing,
            schema: self.schema.clone(),
            table: table.name.clone(),
            columns: table.columns.clone(),
        });
        self.mappings.clear();
        Ok(())
    }

    /// Target a new table. Its columns derive from the source type hints:
    /// suggested type, nullable wherever a null was sampled, no defaults.
    pub fn set_new_table(&mut self, name: &str) -> Result<()> {
        let source = self.source.as_ref().ok_or_else(|| {
            MammothError::invalid_input("wizard", "Analyze a source file first")
        })?;
        let columns = source
            .preview
            .column_types
            .iter()
            .map(|hint| TableColumn {
                name: hint.column.clone(),
                data_type: hint.suggested_type.clone(),
                is_nullable: hint.null_count > 0,
                has_default: false,
            })
            .collect();
        self.target = Some(ImportTarget {
            kind: TargetKind::New,
            schema: self.schema.clone(),
            table: name.to_string(),
            columns,
        });
        self.mappings.clear();
        Ok(())
    }

    /// Build the automatic mapping: each source column maps to the first
    /// target column whose lowercased name matches; unmatched columns are
    /// skipped.
    pub fn auto_map(&mut self) {
        let (Some(source), Some(target)) = (&self.source, &self.target) else {
            return;
        };
        self.mappings = source
            .preview
            .columns
            .iter()
            .map(|source_col| {
                let lowered = source_col.to_lowercase();
                let matched = target
                    .columns
                    .iter()
                    .find(|tc| tc.name.to_lowercase() == lowered)
                    .map(|tc| tc.name.clone());
                ColumnMapping {
                    source: source_col.clone(),
                    target: matched,
                    transform: Default::default(),
                }
            })
            .collect();
    }

    /// Replace one source column's mapping.
    pub fn set_mapping(&mut self, source: &str, mapping: ColumnMapping) -> Result<()> {
        let slot = self
            .mappings
            .iter_mut()
            .find(|m| m.source == source)
            .ok_or_else(|| {
                MammothError::invalid_input(
                    "mapping",
                    format!("'{}' is not a source column", source),
                )
            })?;
        *slot = mapping;
        Ok(())
    }

    /// The Start action: only valid on the Execute step and only once.
    /// Returns the configured job for the executor to run.
    pub fn begin_execution(&mut self) -> Result<ImportJob> {
        if self.step != WizardStep::Execute {
            return Err(MammothError::invalid_input(
                "wizard",
                "Finish configuration before starting the import",
            ));
        }
        if self.executing {
            return Err(MammothError::invalid_input(
                "wizard",
                "Import is already running",
            ));
        }
        let source = self.source.clone().ok_or_else(|| {
            MammothError::invalid_input("wizard", "Analyze a source file first")
        })?;
        self.executing = true;
        let mut job = ImportJob::new(source);
        job.target = self.target.clone();
        job.mappings = self.mappings.clone();
        job.options = self.options.clone();
        Ok(job)
    }

    /// Clear the executing flag once the run finishes.
    pub fn finish_execution(&mut self) {
        self.executing = false;
    }
}

impl Default for ImportWizard {
    fn default() -> Self {
        Self::new()
    }
}

/// Introspect all base tables and their columns for one schema, ordered by
/// `(table_name, ordinal_position)`.
pub async fn introspect_tables<C: GenericClient>(
    client: &C,
    schema: &str,
) -> Result<Vec<TargetTable>> {
    // Arrays and user-defined types report a placeholder in data_type; the
    // udt_name is the spelling that works in a cast
    let rows = client
        .query(
            "SELECT c.table_name, c.column_name, \
                    CASE WHEN c.data_type IN ('ARRAY', 'USER-DEFINED') \
                         THEN c.udt_name ELSE c.data_type END, \
                    c.is_nullable = 'YES', c.column_default IS NOT NULL \
             FROM information_schema.columns c \
             JOIN information_schema.tables t \
               ON t.table_schema = c.table_schema AND t.table_name = c.table_name \
             WHERE c.table_schema = $1 AND t.table_type = 'BASE TABLE' \
             ORDER BY c.table_name, c.ordinal_position",
            &[&schema],
        )
        .await?;

    let mut tables: Vec<TargetTable> = Vec::new();
    for row in rows {
        let table_name: String = row.get(0);
        let column = TableColumn {
            name: row.get(1),
            data_type: row.get(2),
            is_nullable: row.get(3),
            has_default: row.get(4),
        };
        match tables.last_mut() {
            Some(last) if last.name == table_name => last.columns.push(column),
            _ => tables.push(TargetTable {
                name: table_name,
                columns: vec![column],
            }),
        }
    }
    Ok(tables)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::import::{
        ColumnTypeHint, CsvSourceOptions, ImportFormat, PreviewData, SourceEncoding,
    };
    use std::path::PathBuf;

    fn sample_source() -> ImportSource {
        ImportSource {
            path: PathBuf::from("/tmp/users.csv"),
            format: ImportFormat::Csv,
            size_bytes: 24,
            encoding: SourceEncoding::Utf8,
            csv_options: Some(CsvSourceOptions::default()),
            preview: PreviewData {
                columns: vec!["ID".to_string(), "Name".to_string(), "extra".to_string()],
                rows: vec![],
                total_rows: Some(2),
                column_types: vec![
                    ColumnTypeHint {
                        column: "ID".to_string(),
                        suggested_type: "bigint".to_string(),
                        sample_values: vec!["1".to_string()],
                        null_count: 0,
                    },
                    ColumnTypeHint {
                        column: "Name".to_string(),
                        suggested_type: "text".to_string(),
                        sample_values: vec!["Alice".to_string()],
                        null_count: 1,
                    },
                    ColumnTypeHint {
                        column: "extra".to_string(),
                        suggested_type: "text".to_string(),
                        sample_values: vec![],
                        null_count: 2,
                    },
                ],
            },
        }
    }

    fn users_table() -> TargetTable {
        TargetTable {
            name: "users".to_string(),
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

    fn wizard_at_target() -> ImportWizard {
        let mut wizard = ImportWizard::new();
        wizard.set_source(sample_source());
        wizard.advance().unwrap();
        wizard.available_tables = vec![users_table()];
        wizard
    }

    #[test]
    fn test_source_gate() {
        let mut wizard = ImportWizard::new();
        assert!(!wizard.can_advance());
        assert!(wizard.advance().is_err());

        wizard.set_source(sample_source());
        assert!(wizard.can_advance());
        assert_eq!(wizard.advance().unwrap(), WizardStep::Target);
    }

    #[test]
    fn test_target_gate_requires_choice() {
        let mut wizard = wizard_at_target();
        assert!(!wizard.can_advance());

        wizard.select_table("users").unwrap();
        assert!(wizard.can_advance());
    }

    #[test]
    fn test_target_gate_new_table_needs_name() {
        let mut wizard = wizard_at_target();
        wizard.set_new_table("  ").unwrap();
        assert!(!wizard.can_advance());
        wizard.set_new_table("imported").unwrap();
        assert!(wizard.can_advance());
    }

    #[test]
    fn test_select_unknown_table_fails() {
        let mut wizard = wizard_at_target();
        assert!(wizard.select_table("missing").is_err());
    }

    #[test]
    fn test_auto_mapping_is_case_insensitive() {
        let mut wizard = wizard_at_target();
        wizard.select_table("users").unwrap();
        wizard.advance().unwrap();

        assert_eq!(wizard.step(), WizardStep::Mapping);
        let mappings = wizard.mappings();
        assert_eq!(mappings.len(), 3);
        assert_eq!(mappings[0].target.as_deref(), Some("id"));
        assert_eq!(mappings[1].target.as_deref(), Some("name"));
        // No matching target column: skipped
        assert_eq!(mappings[2].target, None);
    }

    #[test]
    fn test_mapping_gate_requires_one_mapped_column() {
        let mut wizard = wizard_at_target();
        wizard.select_table("users").unwrap();
        wizard.advance().unwrap();

        for source in ["ID", "Name"] {
            wizard
                .set_mapping(
                    source,
                    ColumnMapping {
                        source: source.to_string(),
                        target: None,
                        transform: Default::default(),
                    },
                )
                .unwrap();
        }
        assert!(!wizard.can_advance());
        assert!(wizard.advance().is_err());
    }

    #[test]
    fn test_new_table_columns_derive_from_hints() {
        let mut wizard = wizard_at_target();
        wizard.set_new_table("imported").unwrap();
        let target = wizard.target().unwrap();
        assert_eq!(target.kind, TargetKind::New);
        assert_eq!(target.columns.len(), 3);
        assert_eq!(target.columns[0].data_type, "bigint");
        assert!(!target.columns[0].is_nullable);
        assert!(target.columns[1].is_nullable);
        assert!(!target.columns[0].has_default);
    }

    #[test]
    fn test_full_walk_to_execute_and_start_once() {
        let mut wizard = wizard_at_target();
        wizard.select_table("users").unwrap();
        wizard.advance().unwrap(); // -> Mapping
        wizard.advance().unwrap(); // -> Options
        wizard.advance().unwrap(); // -> Execute
        assert_eq!(wizard.step(), WizardStep::Execute);
        assert!(!wizard.can_advance());

        let job = wizard.begin_execution().unwrap();
        assert!(job.target.is_some());
        assert!(wizard.is_executing());
        // Start is disabled while a run is in flight
        assert!(wizard.begin_execution().is_err());

        wizard.finish_execution();
        assert!(!wizard.is_executing());
    }

    #[test]
    fn test_back_navigation() {
        let mut wizard = wizard_at_target();
        assert_eq!(wizard.step(), WizardStep::Target);
        assert_eq!(wizard.back(), WizardStep::Source);
        assert_eq!(wizard.back(), WizardStep::Source);
    }

    #[test]
    fn test_start_before_execute_step_fails() {
        let mut wizard = wizard_at_target();
        assert!(wizard.begin_execution().is_err());
    }
}
