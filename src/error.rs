//! Error types for sql2parquet
//!
//! This module defines the error hierarchy that covers:
//! - Per-export failures (connection, query, schema, encoding, cancellation)
//! - Output promotion and retention pruning
//! - Configuration and CLI errors
//!
//! Per-export errors never escape the orchestrator: each one is attributed to
//! the query that produced it and reported as that query's outcome.

use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for the sql2parquet application
#[derive(Error, Debug)]
pub enum Sql2ParquetError {
    /// Export errors
    #[error("Export error: {0}")]
    Export(#[from] ExportError),

    /// Promotion / pruning errors
    #[error("Retention error: {0}")]
    Retention(#[from] RetentionError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// I/O errors (temp directory management, etc.)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that terminate a single export.
#[derive(Error, Debug)]
pub enum ExportError {
    /// The row source's backing store could not be opened
    #[error("Failed to connect using the {driver} driver: {reason}")]
    Connection { driver: String, reason: String },

    /// Query preparation or row fetch failed
    #[error("Query failed: {0}")]
    Query(String),

    /// A value does not fit the column it belongs to
    #[error("Schema violation in column '{column}': {reason}")]
    SchemaViolation { column: String, reason: String },

    /// The result set's column metadata cannot be turned into a schema
    #[error("Invalid result schema: {0}")]
    InvalidSchema(String),

    /// The columnar sink rejected a row group or failed to write
    #[error("Encode error: {0}")]
    Encode(String),

    /// File operation on the temporary output failed
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Cooperative cancellation was observed
    #[error("Export cancelled")]
    Cancelled,

    /// The export task panicked or was aborted
    #[error("Export task failed: {0}")]
    TaskFailed(String),
}

impl ExportError {
    /// Build a schema violation for `column`
    pub fn violation(column: impl Into<String>, reason: impl Into<String>) -> Self {
        ExportError::SchemaViolation {
            column: column.into(),
            reason: reason.into(),
        }
    }

    /// Wrap an I/O error with the path it happened on
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ExportError::Io {
            path: path.into(),
            source,
        }
    }

    /// Cancellation is an expected outcome, not a failure
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ExportError::Cancelled)
    }

    /// Check whether this error came from the data rather than the environment
    pub fn is_schema_violation(&self) -> bool {
        matches!(
            self,
            ExportError::SchemaViolation { .. } | ExportError::InvalidSchema(_)
        )
    }
}

impl From<rusqlite::Error> for ExportError {
    fn from(err: rusqlite::Error) -> Self {
        ExportError::Query(err.to_string())
    }
}

impl From<arrow::error::ArrowError> for ExportError {
    fn from(err: arrow::error::ArrowError) -> Self {
        ExportError::Encode(err.to_string())
    }
}

impl From<parquet::errors::ParquetError> for ExportError {
    fn from(err: parquet::errors::ParquetError) -> Self {
        ExportError::Encode(err.to_string())
    }
}

/// Promotion and pruning errors
#[derive(Error, Debug)]
pub enum RetentionError {
    /// Moving a file failed
    #[error("Failed to move '{from}' to '{to}': {source}")]
    Move {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The timestamped name for the superseded file is taken
    #[error("Generation '{path}' already exists")]
    GenerationExists { path: PathBuf },

    /// Reading file metadata or listing a directory failed
    #[error("Failed to inspect '{path}': {source}")]
    Inspect {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Deleting an old generation failed
    #[error("Failed to delete '{path}': {source}")]
    Delete {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Path has no file name to derive a generation pattern from
    #[error("Invalid output path '{path}'")]
    InvalidPath { path: PathBuf },
}

/// Configuration and CLI errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Empty connection string
    #[error("Connection string must not be empty")]
    EmptyConnection,

    /// Query path does not exist
    #[error("Query path '{path}' does not exist")]
    QueryPathNotFound { path: PathBuf },

    /// No queries found
    #[error("No .sql files found at '{path}'")]
    NoQueries { path: PathBuf },

    /// Could not read a query file
    #[error("Failed to read query file '{path}': {reason}")]
    ReadQuery { path: PathBuf, reason: String },

    /// Two query files map to the same output name
    #[error("Query files '{first}' and '{second}' both export as '{name}'")]
    DuplicateQueryName {
        name: String,
        first: PathBuf,
        second: PathBuf,
    },

    /// Invalid command timeout
    #[error("Invalid command timeout {secs}s: must be between 1 and {max}")]
    InvalidTimeout { secs: u64, max: u64 },

    /// Retention must keep at least one generation
    #[error("Invalid keep count {0}: must be at least 1")]
    InvalidKeep(usize),

    /// Output or temp directory error
    #[error("Invalid directory '{path}': {reason}")]
    InvalidDirectory { path: PathBuf, reason: String },
}

/// Result type alias for Sql2ParquetError
pub type Result<T> = std::result::Result<T, Sql2ParquetError>;

/// Result type alias for ExportError
pub type ExportResult<T> = std::result::Result<T, ExportError>;

/// Result type alias for RetentionError
pub type RetentionResult<T> = std::result::Result<T, RetentionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancelled_is_not_a_violation() {
        let err = ExportError::Cancelled;
        assert!(err.is_cancelled());
        assert!(!err.is_schema_violation());

        let err = ExportError::violation("y", "null value in non-nullable column");
        assert!(err.is_schema_violation());
        assert!(!err.is_cancelled());
    }

    #[test]
    fn test_error_conversion() {
        let export_err = ExportError::Query("no such table: t".into());
        let top: Sql2ParquetError = export_err.into();
        assert!(matches!(top, Sql2ParquetError::Export(_)));

        let parquet_err = parquet::errors::ParquetError::General("bad page".into());
        let export_err: ExportError = parquet_err.into();
        assert!(matches!(export_err, ExportError::Encode(_)));
    }

    #[test]
    fn test_violation_message_names_column() {
        let err = ExportError::violation("amount", "expected a decimal");
        assert_eq!(
            err.to_string(),
            "Schema violation in column 'amount': expected a decimal"
        );
    }
}
