//! XLSX serialization: a single worksheet with a bold header row.

use rust_xlsxwriter::{Format, Workbook};

use crate::error::{MammothError, Result};
use crate::export::{QueryResultData, XlsxOptions};
use crate::value::Value;

fn xlsx_error(e: rust_xlsxwriter::XlsxError) -> MammothError {
    MammothError::Export(format!("XLSX error: {}", e))
}

/// Build the workbook bytes. Scalar numerics are written as numbers and
/// booleans as booleans; everything else uses its canonical text form.
pub fn export_xlsx(data: &QueryResultData, options: &XlsxOptions) -> Result<Vec<u8>> {
    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();
    worksheet
        .set_name(&options.sheet_name)
        .map_err(xlsx_error)?;

    let bold = Format::new().set_bold();
    for (col, column) in data.columns.iter().enumerate() {
        worksheet
            .write_string_with_format(0, col as u16, &column.name, &bold)
            .map_err(xlsx_error)?;
    }

    for (row_idx, row) in data.rows.iter().enumerate() {
        let excel_row = (row_idx + 1) as u32;
        for (col, value) in row.iter().enumerate() {
            let col = col as u16;
            match value {
                Value::Null => {}
                Value::Bool(b) => {
                    worksheet
                        .write_boolean(excel_row, col, *b)
                        .map_err(xlsx_error)?;
                }
                Value::Int16(n) => {
                    worksheet
                        .write_number(excel_row, col, *n as f64)
                        .map_err(xlsx_error)?;
                }
                Value::Int32(n) => {
                    worksheet
                        .write_number(excel_row, col, *n as f64)
                        .map_err(xlsx_error)?;
                }
                Value::Int64(n) => {
                    worksheet
                        .write_number(excel_row, col, *n as f64)
                        .map_err(xlsx_error)?;
                }
                Value::Float32(f) if f.is_finite() => {
                    worksheet
                        .write_number(excel_row, col, *f as f64)
                        .map_err(xlsx_error)?;
                }
                Value::Float64(f) if f.is_finite() => {
                    worksheet
                        .write_number(excel_row, col, *f)
                        .map_err(xlsx_error)?;
                }
                other => {
                    worksheet
                        .write_string(excel_row, col, other.canonical_text())
                        .map_err(xlsx_error)?;
                }
            }
        }
    }

    for col in 0..data.columns.len() {
        worksheet
            .set_column_width(col as u16, options.column_width)
            .map_err(xlsx_error)?;
    }

    workbook.save_to_buffer().map_err(xlsx_error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::test_fixtures::users;

    #[test]
    fn test_workbook_bytes_look_like_a_zip() {
        let bytes = export_xlsx(&users(), &XlsxOptions::default()).unwrap();
        // XLSX is a zip container; PK magic
        assert_eq!(&bytes[..2], b"PK");
    }

    #[test]
    fn test_all_value_shapes_serialize() {
        use crate::export::{ExportColumn, QueryResultData};
        let data = QueryResultData {
            columns: vec![
                ExportColumn::new("a", "int8"),
                ExportColumn::new("b", "bool"),
                ExportColumn::new("c", "float8"),
                ExportColumn::new("d", "uuid"),
                ExportColumn::new("e", "bytea"),
            ],
            rows: vec![vec![
                Value::Int64(9),
                Value::Bool(true),
                Value::Float64(f64::NAN),
                Value::Uuid(uuid::Uuid::nil()),
                Value::Bytea(vec![1, 2, 3]),
            ]],
        };
        assert!(export_xlsx(&data, &XlsxOptions::default()).is_ok());
    }
}
