//! SQL script generation: INSERT batches, COPY blocks, and single-row
//! UPDATE synthesis.
//!
//! Generated scripts quote every identifier, so they paste cleanly no
//! matter how the source tables were named.

use crate::error::{MammothError, Result};
use crate::export::{QueryResultData, SqlConflict, SqlOptions};
use crate::value::Value;

/// Script identifiers are always quoted.
fn ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn table_reference(options: &SqlOptions) -> String {
    match &options.schema_name {
        Some(schema) => format!("{}.{}", ident(schema), ident(&options.table_name)),
        None => ident(&options.table_name),
    }
}

fn column_list(data: &QueryResultData) -> String {
    data.columns
        .iter()
        .map(|c| ident(&c.name))
        .collect::<Vec<_>>()
        .join(", ")
}

fn conflict_clause(options: &SqlOptions) -> String {
    match &options.on_conflict {
        None => String::new(),
        Some(SqlConflict::DoNothing) => "\nON CONFLICT DO NOTHING".to_string(),
        Some(SqlConflict::DoUpdate {
            conflict_columns,
            update_columns,
        }) => {
            let targets = conflict_columns
                .iter()
                .map(|c| ident(c))
                .collect::<Vec<_>>()
                .join(", ");
            let updates = update_columns
                .iter()
                .map(|c| format!("{} = EXCLUDED.{}", ident(c), ident(c)))
                .collect::<Vec<_>>()
                .join(", ");
            format!("\nON CONFLICT ({}) DO UPDATE SET {}", targets, updates)
        }
    }
}

/// Generate batched INSERT statements.
pub fn export_insert(data: &QueryResultData, options: &SqlOptions) -> Result<String> {
    let table = table_reference(options);
    let columns = column_list(data);
    let clause = conflict_clause(options);
    let batch_size = options.batch_size.max(1);

    let mut out = String::new();
    for batch in data.rows.chunks(batch_size) {
        out.push_str(&format!("INSERT INTO {} ({})\nVALUES\n", table, columns));
        let rows: Vec<String> = batch
            .iter()
            .map(|row| {
                let literals: Vec<String> = row.iter().map(Value::sql_literal).collect();
                format!("  ({})", literals.join(", "))
            })
            .collect();
        out.push_str(&rows.join(",\n"));
        out.push_str(&clause);
        out.push_str(";\n");
    }
    Ok(out)
}

/// Escape one COPY text-format field.
fn copy_escape(text: &str) -> String {
    text.replace('\\', "\\\\")
        .replace('\t', "\\t")
        .replace('\n', "\\n")
        .replace('\r', "\\r")
}

/// Generate a `COPY ... FROM stdin;` block in text format.
pub fn export_copy(
    data: &QueryResultData,
    options: &SqlOptions,
    null_string: &str,
) -> Result<String> {
    let null_marker = if null_string.is_empty() {
        "\\N"
    } else {
        null_string
    };
    let mut out = format!(
        "COPY {} ({}) FROM stdin;\n",
        table_reference(options),
        column_list(data)
    );
    for row in &data.rows {
        let fields: Vec<String> = row
            .iter()
            .map(|value| {
                if value.is_null() {
                    null_marker.to_string()
                } else {
                    copy_escape(&value.canonical_text())
                }
            })
            .collect();
        out.push_str(&fields.join("\t"));
        out.push('\n');
    }
    out.push_str("\\.\n");
    Ok(out)
}

/// Synthesize an UPDATE for one selected row keyed by its primary-key
/// column. The key column is excluded from the SET list.
pub fn synthesize_update(
    data: &QueryResultData,
    row_index: usize,
    pk_column: &str,
    options: &SqlOptions,
) -> Result<String> {
    let row = data.rows.get(row_index).ok_or_else(|| {
        MammothError::Export(format!("Row {} is out of range", row_index))
    })?;
    let pk_index = data
        .columns
        .iter()
        .position(|c| c.name == pk_column)
        .ok_or_else(|| {
            MammothError::Export(format!("Unknown primary key column '{}'", pk_column))
        })?;

    let assignments: Vec<String> = data
        .columns
        .iter()
        .zip(row)
        .enumerate()
        .filter(|(i, _)| *i != pk_index)
        .map(|(_, (column, value))| format!("{} = {}", ident(&column.name), value.sql_literal()))
        .collect();
    if assignments.is_empty() {
        return Err(MammothError::Export(
            "No columns to update besides the key".to_string(),
        ));
    }

    Ok(format!(
        "UPDATE {} SET {} WHERE {} = {};",
        table_reference(options),
        assignments.join(", "),
        ident(pk_column),
        row[pk_index].sql_literal()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::ExportColumn;

    fn obrien() -> QueryResultData {
        QueryResultData {
            columns: vec![
                ExportColumn::new("id", "int4"),
                ExportColumn::new("name", "text"),
            ],
            rows: vec![vec![Value::Int32(1), Value::Text("O'Brien".to_string())]],
        }
    }

    #[test]
    fn test_insert_synthesis_exact_output() {
        let options = SqlOptions {
            table_name: "users".to_string(),
            schema_name: Some("public".to_string()),
            ..Default::default()
        };
        let out = export_insert(&obrien(), &options).unwrap();
        assert_eq!(
            out,
            "INSERT INTO \"public\".\"users\" (\"id\", \"name\")\nVALUES\n  (1, 'O''Brien');\n"
        );
    }

    #[test]
    fn test_insert_unqualified_without_schema() {
        let options = SqlOptions {
            table_name: "users".to_string(),
            ..Default::default()
        };
        let out = export_insert(&obrien(), &options).unwrap();
        assert!(out.starts_with("INSERT INTO \"users\" "));
    }

    #[test]
    fn test_insert_batching() {
        let data = QueryResultData {
            columns: vec![ExportColumn::new("n", "int4")],
            rows: (0..5).map(|i| vec![Value::Int32(i)]).collect(),
        };
        let options = SqlOptions {
            table_name: "nums".to_string(),
            batch_size: 2,
            ..Default::default()
        };
        let out = export_insert(&data, &options).unwrap();
        assert_eq!(out.matches("INSERT INTO").count(), 3);
        assert!(out.contains("  (0),\n  (1);\n"));
        assert!(out.contains("  (4);\n"));
    }

    #[test]
    fn test_insert_on_conflict_clauses() {
        let mut options = SqlOptions {
            table_name: "users".to_string(),
            on_conflict: Some(SqlConflict::DoNothing),
            ..Default::default()
        };
        let out = export_insert(&obrien(), &options).unwrap();
        assert!(out.contains("\nON CONFLICT DO NOTHING;\n"));

        options.on_conflict = Some(SqlConflict::DoUpdate {
            conflict_columns: vec!["id".to_string()],
            update_columns: vec!["name".to_string()],
        });
        let out = export_insert(&obrien(), &options).unwrap();
        assert!(out.contains(
            "\nON CONFLICT (\"id\") DO UPDATE SET \"name\" = EXCLUDED.\"name\";\n"
        ));
    }

    #[test]
    fn test_copy_block() {
        let data = QueryResultData {
            columns: vec![
                ExportColumn::new("id", "int4"),
                ExportColumn::new("note", "text"),
            ],
            rows: vec![
                vec![Value::Int32(1), Value::Text("tab\there".to_string())],
                vec![Value::Int32(2), Value::Null],
            ],
        };
        let options = SqlOptions {
            table_name: "notes".to_string(),
            ..Default::default()
        };
        let out = export_copy(&data, &options, "").unwrap();
        assert_eq!(
            out,
            "COPY \"notes\" (\"id\", \"note\") FROM stdin;\n1\ttab\\there\n2\t\\N\n\\.\n"
        );
    }

    #[test]
    fn test_copy_escapes_backslash_and_newline() {
        let data = QueryResultData {
            columns: vec![ExportColumn::new("v", "text")],
            rows: vec![vec![Value::Text("a\\b\nc".to_string())]],
        };
        let options = SqlOptions {
            table_name: "t".to_string(),
            ..Default::default()
        };
        let out = export_copy(&data, &options, "").unwrap();
        assert!(out.contains("a\\\\b\\nc\n"));
    }

    #[test]
    fn test_update_synthesis() {
        let options = SqlOptions {
            table_name: "users".to_string(),
            schema_name: Some("public".to_string()),
            ..Default::default()
        };
        let out = synthesize_update(&obrien(), 0, "id", &options).unwrap();
        assert_eq!(
            out,
            "UPDATE \"public\".\"users\" SET \"name\" = 'O''Brien' WHERE \"id\" = 1;"
        );
    }

    #[test]
    fn test_update_synthesis_unknown_pk() {
        let options = SqlOptions::default();
        assert!(synthesize_update(&obrien(), 0, "missing", &options).is_err());
    }

    #[test]
    fn test_update_synthesis_out_of_range_row() {
        let options = SqlOptions::default();
        assert!(synthesize_update(&obrien(), 3, "id", &options).is_err());
    }
}
