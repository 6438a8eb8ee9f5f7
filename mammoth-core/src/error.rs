//! Error types shared across the connection, import, and export pipelines.

use thiserror::Error;
use uuid::Uuid;

/// Extract the full error message from a tokio_postgres::Error,
/// including the underlying DbError details that Display hides.
pub fn format_db_error(e: &tokio_postgres::Error) -> String {
    if let Some(db_err) = e.as_db_error() {
        let mut msg = db_err.message().to_string();
        if let Some(detail) = db_err.detail() {
            msg.push_str(&format!("\n  Detail: {}", detail));
        }
        if let Some(hint) = db_err.hint() {
            msg.push_str(&format!("\n  Hint: {}", hint));
        }
        return msg;
    }
    // Fallback: walk the source chain
    let mut msg = e.to_string();
    let mut source = std::error::Error::source(e);
    while let Some(s) = source {
        msg.push_str(&format!(": {}", s));
        source = s.source();
    }
    if e.is_closed() {
        msg.push_str("\n  Note: The database connection was closed unexpectedly. This may indicate a network issue or server restart.");
    }
    msg
}

/// All error types the mammoth core can produce.
#[derive(Error, Debug)]
pub enum MammothError {
    /// A configuration field failed validation. Never retried.
    #[error("Invalid {field}: {message}")]
    InvalidInput { field: String, message: String },

    /// The config says the password lives in the keyring, but the lookup came back empty.
    #[error("No stored credential found for connection {id}")]
    CredentialNotFound { id: Uuid },

    /// Establishing or acquiring a connection failed. Transient; retryable.
    #[error("Connection failed: {message}")]
    ConnectionFailed {
        message: String,
        #[source]
        source: Option<tokio_postgres::Error>,
    },

    /// A connection or pool-acquisition attempt exceeded its timeout. Transient; retryable.
    #[error("Connection attempt timed out")]
    ConnectionTimeout,

    /// A statement failed server-side. Carries the server diagnostics when present.
    #[error("Query failed: {message}")]
    QueryFailed {
        message: String,
        code: Option<String>,
        detail: Option<String>,
        hint: Option<String>,
        position: Option<u32>,
    },

    /// A saved connection or group was not found in the config store.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: Uuid },

    /// A bulk import failed outside the per-row error collection.
    #[error("Import error: {0}")]
    Import(ImportFailure),

    /// An export serialization or sink failure.
    #[error("Export error: {0}")]
    Export(String),

    /// The clipboard could not be opened or written.
    #[error("Clipboard error: {0}")]
    Clipboard(String),

    /// A filesystem I/O operation failed (source files, export sinks, certificates).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A CSV read or write failed.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// A JSON (de)serialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The operation was cancelled cooperatively.
    #[error("Operation cancelled")]
    Cancelled,
}

/// Subcauses of a failed import, surfaced as `Import(...)`.
#[derive(Error, Debug)]
pub enum ImportFailure {
    /// The file extension does not map to a supported import format.
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    /// A JSON source could not be parsed into importable records.
    #[error("invalid JSON: {0}")]
    InvalidJson(String),

    /// The source file contains no data.
    #[error("file is empty")]
    EmptyFile,

    /// Any other pipeline failure.
    #[error("{0}")]
    Other(String),
}

impl MammothError {
    /// Shorthand for a validation failure on a named field.
    pub fn invalid_input(field: impl Into<String>, message: impl Into<String>) -> Self {
        MammothError::InvalidInput {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Wrap a driver error that occurred while establishing connectivity.
    pub fn connection_failed(message: impl Into<String>, source: tokio_postgres::Error) -> Self {
        MammothError::ConnectionFailed {
            message: message.into(),
            source: Some(source),
        }
    }

    /// Shorthand for `Import(UnsupportedFormat)`.
    pub fn unsupported_format(extension: impl Into<String>) -> Self {
        MammothError::Import(ImportFailure::UnsupportedFormat(extension.into()))
    }

    /// Shorthand for `Import(InvalidJson)`.
    pub fn invalid_json(message: impl Into<String>) -> Self {
        MammothError::Import(ImportFailure::InvalidJson(message.into()))
    }

    /// Shorthand for `Import(EmptyFile)`.
    pub fn empty_file() -> Self {
        MammothError::Import(ImportFailure::EmptyFile)
    }

    /// Shorthand for a generic import failure.
    pub fn import(message: impl Into<String>) -> Self {
        MammothError::Import(ImportFailure::Other(message.into()))
    }

    /// True for errors the retry wrapper is allowed to retry.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            MammothError::ConnectionFailed { .. } | MammothError::ConnectionTimeout
        )
    }
}

impl From<tokio_postgres::Error> for MammothError {
    fn from(e: tokio_postgres::Error) -> Self {
        if e.is_closed() {
            return MammothError::ConnectionFailed {
                message: format_db_error(&e),
                source: Some(e),
            };
        }
        match e.as_db_error() {
            Some(db_err) => MammothError::QueryFailed {
                message: db_err.message().to_string(),
                code: Some(db_err.code().code().to_string()),
                detail: db_err.detail().map(str::to_string),
                hint: db_err.hint().map(str::to_string),
                position: db_err.position().and_then(|p| match p {
                    tokio_postgres::error::ErrorPosition::Original(n) => Some(*n),
                    tokio_postgres::error::ErrorPosition::Internal { position, .. } => {
                        Some(*position)
                    }
                }),
            },
            None => MammothError::ConnectionFailed {
                message: format_db_error(&e),
                source: Some(e),
            },
        }
    }
}

impl From<deadpool_postgres::PoolError> for MammothError {
    fn from(e: deadpool_postgres::PoolError) -> Self {
        match e {
            deadpool_postgres::PoolError::Timeout(_) => MammothError::ConnectionTimeout,
            deadpool_postgres::PoolError::Backend(pg) => pg.into(),
            other => MammothError::ConnectionFailed {
                message: other.to_string(),
                source: None,
            },
        }
    }
}

/// Convenience type alias for `Result<T, MammothError>`.
pub type Result<T> = std::result::Result<T, MammothError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_input_is_not_retryable() {
        let err = MammothError::invalid_input("port", "must be between 1 and 65535");
        assert!(!err.is_retryable());
        assert_eq!(err.to_string(), "Invalid port: must be between 1 and 65535");
    }

    #[test]
    fn test_connection_errors_are_retryable() {
        let err = MammothError::ConnectionFailed {
            message: "refused".to_string(),
            source: None,
        };
        assert!(err.is_retryable());
        assert!(MammothError::ConnectionTimeout.is_retryable());
    }

    #[test]
    fn test_query_failed_is_not_retryable() {
        let err = MammothError::QueryFailed {
            message: "syntax error".to_string(),
            code: Some("42601".to_string()),
            detail: None,
            hint: None,
            position: Some(12),
        };
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_cancelled_is_not_retryable() {
        assert!(!MammothError::Cancelled.is_retryable());
    }

    #[test]
    fn test_import_subcause_shapes() {
        assert!(matches!(
            MammothError::empty_file(),
            MammothError::Import(ImportFailure::EmptyFile)
        ));
        assert!(matches!(
            MammothError::unsupported_format("parquet"),
            MammothError::Import(ImportFailure::UnsupportedFormat(ext)) if ext == "parquet"
        ));
        assert_eq!(
            MammothError::empty_file().to_string(),
            "Import error: file is empty"
        );
        assert_eq!(
            MammothError::invalid_json("line 3: trailing comma").to_string(),
            "Import error: invalid JSON: line 3: trailing comma"
        );
    }

    #[test]
    fn test_not_found_message() {
        let err = MammothError::NotFound {
            entity: "Connection",
            id: Uuid::nil(),
        };
        assert_eq!(
            err.to_string(),
            format!("Connection not found: {}", Uuid::nil())
        );
    }
}
