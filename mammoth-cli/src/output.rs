//! Terminal output formatting for mammoth commands.
//! Uses comfy-table for tabular output and colored for status styling.

use colored::Colorize;
use comfy_table::modifiers::UTF8_ROUND_CORNERS;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Cell, ContentArrangement, Table};

use mammoth_core::import::{ImportResult, ImportSource};
use mammoth_core::service::ConnectionTestResult;
use mammoth_core::ExportResult;

fn new_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table
}

/// Print a connection test outcome.
pub fn print_test_result(result: &ConnectionTestResult) {
    println!("{}", "Connection OK".green().bold());
    println!("  Server:  {}", result.server_version);
    println!(
        "  Up since: {}",
        result.started_at.format("%Y-%m-%d %H:%M:%S%z")
    );
    println!("  Latency: {}ms", result.latency_ms);
}

/// Print the analyzer's findings: file facts, type hints, preview rows.
pub fn print_analysis(source: &ImportSource) {
    println!(
        "{} {:?}, {} bytes{}",
        "Detected:".bold(),
        source.format,
        source.size_bytes,
        source
            .csv_options
            .map(|o| format!(", delimiter '{}'", o.delimiter as char))
            .unwrap_or_default()
    );
    if let Some(total) = source.preview.total_rows {
        println!("{} {}", "Rows:".bold(), total);
    }

    let mut hints = new_table();
    hints.set_header(vec![
        Cell::new("Column"),
        Cell::new("Suggested Type"),
        Cell::new("Nulls"),
        Cell::new("Samples"),
    ]);
    for hint in &source.preview.column_types {
        hints.add_row(vec![
            Cell::new(&hint.column),
            Cell::new(&hint.suggested_type),
            Cell::new(hint.null_count),
            Cell::new(hint.sample_values.join(", ")),
        ]);
    }
    println!("{hints}");

    if !source.preview.rows.is_empty() {
        let mut preview = new_table();
        preview.set_header(
            source
                .preview
                .columns
                .iter()
                .map(Cell::new)
                .collect::<Vec<_>>(),
        );
        for row in &source.preview.rows {
            preview.add_row(row.iter().map(Cell::new).collect::<Vec<_>>());
        }
        println!("{preview}");
    }
}

/// Print the outcome of an import run.
pub fn print_import_result(result: &ImportResult) {
    if result.success {
        println!(
            "{}",
            format!(
                "Import finished: {} inserted, {} skipped, {} failed ({}ms)",
                result.rows_inserted, result.rows_skipped, result.rows_failed, result.duration_ms
            )
            .green()
            .bold()
        );
    } else {
        println!(
            "{}",
            format!(
                "Import failed: {} inserted, {} failed of {} read",
                result.rows_inserted, result.rows_failed, result.rows_read
            )
            .red()
            .bold()
        );
    }

    if !result.errors.is_empty() {
        println!("{}", format!("First {} error(s):", result.errors.len()).yellow());
        for error in &result.errors {
            let state = error
                .sql_state
                .as_deref()
                .map(|s| format!(" [{}]", s))
                .unwrap_or_default();
            println!("  {} row {}{}: {}", "✗".red(), error.row, state, error.message);
        }
    }
}

/// Print where an export went and how big it was.
pub fn print_export_result(result: &ExportResult, destination: &str) {
    println!(
        "{}",
        format!(
            "Exported {} row(s), {} bytes → {}",
            result.rows, result.bytes, destination
        )
        .green()
        .bold()
    );
}

/// Print the configured connections.
pub fn print_connections(entries: &[crate::config::TomlConnection]) {
    if entries.is_empty() {
        println!("{}", "No connections configured.".yellow());
        return;
    }
    let mut table = new_table();
    table.set_header(vec![
        Cell::new("Name"),
        Cell::new("Host"),
        Cell::new("Port"),
        Cell::new("Database"),
        Cell::new("User"),
        Cell::new("SSL"),
    ]);
    for entry in entries {
        table.add_row(vec![
            Cell::new(entry.name.as_deref().unwrap_or("(unnamed)")),
            Cell::new(entry.host.as_deref().unwrap_or("localhost")),
            Cell::new(entry.port.unwrap_or(5432)),
            Cell::new(entry.database.as_deref().unwrap_or("")),
            Cell::new(entry.username.as_deref().unwrap_or("")),
            Cell::new(entry.ssl_mode.as_deref().unwrap_or("prefer")),
        ]);
    }
    println!("{table}");
}
