//! Query export
//!
//! One export streams one query's result set into one Parquet file in the
//! run's temporary directory.
//!
//! # Module Structure
//!
//! - `context`: Drives a single export through its states
//! - `orchestrator`: Runs every export concurrently and collects outcomes

pub mod context;
pub mod orchestrator;

pub use context::{stream_rows, write_parquet, ExportContext};
pub use orchestrator::{ExportOrchestrator, ExportReport, ExportStatus, UnitOutcome};

use std::fmt;
use std::path::{Path, PathBuf};

/// File extension of every export
pub const PARQUET_EXTENSION: &str = "parquet";

/// One query to export
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportUnit {
    /// Output file stem, unique within a run
    pub name: String,
    pub sql: String,
}

impl ExportUnit {
    pub fn new(name: impl Into<String>, sql: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sql: sql.into(),
        }
    }

    /// `{name}.parquet`
    pub fn file_name(&self) -> String {
        format!("{}.{}", self.name, PARQUET_EXTENSION)
    }

    /// Where this export writes inside `temp_dir`
    pub fn temp_path(&self, temp_dir: &Path) -> PathBuf {
        temp_dir.join(self.file_name())
    }
}

/// Lifecycle of a single export
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportState {
    NotStarted,
    ConnectionAcquired,
    SchemaProbed,
    Streaming,
    Flushing,
    Completed,
    Failed,
    Cancelled,
}

impl ExportState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ExportState::Completed | ExportState::Failed | ExportState::Cancelled
        )
    }
}

impl fmt::Display for ExportState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ExportState::NotStarted => "not started",
            ExportState::ConnectionAcquired => "connected",
            ExportState::SchemaProbed => "schema probed",
            ExportState::Streaming => "streaming",
            ExportState::Flushing => "flushing",
            ExportState::Completed => "completed",
            ExportState::Failed => "failed",
            ExportState::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// A finished export's temporary file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportOutput {
    pub name: String,
    pub path: PathBuf,
    pub rows: u64,
    pub row_groups: usize,
}

/// Receives export progress. Called from export threads.
pub trait ExportObserver: Send + Sync {
    /// An export moved to `state`
    fn on_state(&self, _name: &str, _state: ExportState) {}

    /// Rows written so far, reported after each row group
    fn on_rows(&self, _name: &str, _rows: u64) {}

    /// The export's final outcome is known
    fn on_settled(&self, _name: &str, _status: &ExportStatus) {}
}

/// Observer that ignores everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl ExportObserver for NoopObserver {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unit_paths() {
        let unit = ExportUnit::new("daily_sales", "select 1");
        assert_eq!(unit.file_name(), "daily_sales.parquet");
        assert_eq!(
            unit.temp_path(Path::new("/tmp/run")),
            PathBuf::from("/tmp/run/daily_sales.parquet")
        );
    }

    #[test]
    fn test_terminal_states() {
        assert!(ExportState::Completed.is_terminal());
        assert!(ExportState::Cancelled.is_terminal());
        assert!(!ExportState::Flushing.is_terminal());
        assert_eq!(ExportState::SchemaProbed.to_string(), "schema probed");
    }
}
