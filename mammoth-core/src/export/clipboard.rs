//! Text clipboard sink for exports.

use crate::error::{MammothError, Result};
use crate::export::{export_to_string, ExportOptions, ExportResult, QueryResultData};

/// Place raw text on the system clipboard.
pub fn set_clipboard_text(text: &str) -> Result<()> {
    let mut clipboard =
        arboard::Clipboard::new().map_err(|e| MammothError::Clipboard(e.to_string()))?;
    clipboard
        .set_text(text.to_string())
        .map_err(|e| MammothError::Clipboard(e.to_string()))
}

/// Serialize and copy to the clipboard. Binary formats are refused before
/// any serialization happens.
pub fn copy_to_clipboard(data: &QueryResultData, options: &ExportOptions) -> Result<ExportResult> {
    if options.format.is_binary() {
        return Err(MammothError::Export(format!(
            "{:?} is a binary format and cannot go to the clipboard",
            options.format
        )));
    }
    let text = export_to_string(data, options)?;
    let result = ExportResult {
        rows: data.rows.len() as u64,
        bytes: text.len() as u64,
    };
    set_clipboard_text(&text)?;
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::test_fixtures::users;
    use crate::export::ExportFormat;

    #[test]
    fn test_binary_formats_refused_before_clipboard_access() {
        let options = ExportOptions {
            format: ExportFormat::Excel,
            ..Default::default()
        };
        let err = copy_to_clipboard(&users(), &options).unwrap_err();
        assert!(matches!(err, MammothError::Export(_)));
    }
}
