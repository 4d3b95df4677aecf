//! Concurrent export orchestration
//!
//! Every unit runs as its own task; the export body itself is blocking I/O and
//! runs on tokio's blocking pool. Completions are handled in the order they
//! arrive. A failure, cancellation or panic is attributed to its own unit and
//! never stops the others.

use crate::error::ExportError;
use crate::export::context::ExportContext;
use crate::export::{ExportObserver, ExportOutput, ExportUnit, NoopObserver};
use crate::source::sqlite::ConnectionConfig;
use std::any::Any;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, info, warn};

/// Final status of one unit
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportStatus {
    Succeeded(ExportOutput),
    Failed(String),
    Cancelled,
}

impl ExportStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, ExportStatus::Succeeded(_))
    }
}

impl From<Result<ExportOutput, ExportError>> for ExportStatus {
    fn from(result: Result<ExportOutput, ExportError>) -> Self {
        match result {
            Ok(output) => ExportStatus::Succeeded(output),
            Err(ExportError::Cancelled) => ExportStatus::Cancelled,
            Err(e) => ExportStatus::Failed(e.to_string()),
        }
    }
}

/// One unit's outcome
#[derive(Debug, Clone)]
pub struct UnitOutcome {
    pub name: String,
    pub status: ExportStatus,
    pub elapsed: Duration,
}

/// Outcomes of a run, in completion order
#[derive(Debug, Clone, Default)]
pub struct ExportReport {
    pub outcomes: Vec<UnitOutcome>,
}

impl ExportReport {
    /// Outputs of every unit that succeeded
    pub fn succeeded(&self) -> impl Iterator<Item = &ExportOutput> {
        self.outcomes.iter().filter_map(|o| match &o.status {
            ExportStatus::Succeeded(output) => Some(output),
            _ => None,
        })
    }

    pub fn outcome(&self, name: &str) -> Option<&UnitOutcome> {
        self.outcomes.iter().find(|o| o.name == name)
    }

    pub fn succeeded_count(&self) -> usize {
        self.succeeded().count()
    }

    pub fn failed_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.status, ExportStatus::Failed(_)))
            .count()
    }

    pub fn cancelled_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| o.status == ExportStatus::Cancelled)
            .count()
    }

    /// Rows across all successful exports
    pub fn total_rows(&self) -> u64 {
        self.succeeded().map(|o| o.rows).sum()
    }
}

/// Runs a set of exports concurrently
pub struct ExportOrchestrator {
    connection: ConnectionConfig,
    temp_dir: PathBuf,
    shutdown: Arc<AtomicBool>,
    observer: Arc<dyn ExportObserver>,
}

impl ExportOrchestrator {
    /// Create an orchestrator writing into `temp_dir`
    pub fn new(connection: ConnectionConfig, temp_dir: PathBuf) -> Self {
        Self {
            connection,
            temp_dir,
            shutdown: Arc::new(AtomicBool::new(false)),
            observer: Arc::new(NoopObserver),
        }
    }

    /// Share an existing cancellation flag
    pub fn with_shutdown_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.shutdown = flag;
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn ExportObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Signal all running exports to stop
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    /// Run every unit to completion and report each outcome
    pub async fn run_all(&self, units: Vec<ExportUnit>) -> ExportReport {
        let context = Arc::new(ExportContext::new(
            self.temp_dir.clone(),
            self.connection.clone(),
            Arc::clone(&self.shutdown),
            Arc::clone(&self.observer),
        ));

        info!(queries = units.len(), temp_dir = %self.temp_dir.display(), "Starting exports");

        let mut pending: Vec<String> = units.iter().map(|u| u.name.clone()).collect();
        let mut tasks = JoinSet::new();
        for unit in units {
            let context = Arc::clone(&context);
            tasks.spawn(async move {
                let start = Instant::now();
                let name = unit.name.clone();
                let result = tokio::task::spawn_blocking(move || context.run(&unit))
                    .await
                    .unwrap_or_else(|e| Err(ExportError::TaskFailed(join_error_message(e))));
                (name, result, start.elapsed())
            });
        }

        let mut report = ExportReport::default();
        while let Some(joined) = tasks.join_next().await {
            let (name, result, elapsed) = match joined {
                Ok(done) => done,
                Err(e) => {
                    warn!(error = %e, "Export task did not complete");
                    continue;
                }
            };
            if let Some(pos) = pending.iter().position(|p| *p == name) {
                pending.swap_remove(pos);
            }

            let status = ExportStatus::from(result);
            debug!(query = %name, elapsed_ms = elapsed.as_millis() as u64, "Export settled");
            self.observer.on_settled(&name, &status);
            report.outcomes.push(UnitOutcome {
                name,
                status,
                elapsed,
            });
        }

        // Units whose task vanished without reporting
        for name in pending {
            let status =
                ExportStatus::Failed(ExportError::TaskFailed("task aborted".into()).to_string());
            self.observer.on_settled(&name, &status);
            report.outcomes.push(UnitOutcome {
                name,
                status,
                elapsed: Duration::ZERO,
            });
        }

        info!(
            succeeded = report.succeeded_count(),
            failed = report.failed_count(),
            cancelled = report.cancelled_count(),
            "Exports settled"
        );
        report
    }
}

fn join_error_message(err: JoinError) -> String {
    if err.is_panic() {
        panic_message(err.into_panic())
    } else {
        "task cancelled".to_string()
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panicked: {}", s)
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panicked: {}", s)
    } else {
        "panicked".to_string()
    }
}
