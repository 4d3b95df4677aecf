//! Single-query export
//!
//! [`ExportContext::run`] takes one query from connection to a closed Parquet
//! file:
//!
//! `NotStarted → ConnectionAcquired → SchemaProbed → Streaming ⇄ Flushing →
//! Completed | Failed | Cancelled`
//!
//! The shared shutdown flag is checked before connecting, before every row and
//! immediately before every flush. A cancelled or failed export leaves its
//! partial file in the temporary directory; it is never promoted.

use crate::error::{ExportError, ExportResult};
use crate::export::{ExportObserver, ExportOutput, ExportState, ExportUnit};
use crate::parquet::batch::RowBatch;
use crate::parquet::sink::{ColumnarSink, ParquetSink};
use crate::source::sqlite::{ConnectionConfig, SqliteRowSource};
use crate::source::RowSource;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Rows and row groups written by one export
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StreamSummary {
    pub rows: u64,
    pub row_groups: usize,
}

/// Everything an export needs besides the query itself
pub struct ExportContext {
    temp_dir: PathBuf,
    connection: ConnectionConfig,
    shutdown: Arc<AtomicBool>,
    observer: Arc<dyn ExportObserver>,
}

impl ExportContext {
    pub fn new(
        temp_dir: PathBuf,
        connection: ConnectionConfig,
        shutdown: Arc<AtomicBool>,
        observer: Arc<dyn ExportObserver>,
    ) -> Self {
        Self {
            temp_dir,
            connection,
            shutdown,
            observer,
        }
    }

    /// Export `unit` into `{temp_dir}/{name}.parquet`
    pub fn run(&self, unit: &ExportUnit) -> ExportResult<ExportOutput> {
        let start = Instant::now();
        self.transition(unit, ExportState::NotStarted);

        let result = self.execute(unit);
        let elapsed_ms = start.elapsed().as_millis() as u64;
        match &result {
            Ok(output) => {
                info!(
                    query = %unit.name,
                    rows = output.rows,
                    row_groups = output.row_groups,
                    elapsed_ms,
                    "Export completed"
                );
                self.transition(unit, ExportState::Completed);
            }
            Err(e) if e.is_cancelled() => {
                info!(query = %unit.name, elapsed_ms, "Export cancelled");
                self.transition(unit, ExportState::Cancelled);
            }
            Err(e) => {
                warn!(query = %unit.name, error = %e, elapsed_ms, "Export failed");
                self.transition(unit, ExportState::Failed);
            }
        }
        result
    }

    fn execute(&self, unit: &ExportUnit) -> ExportResult<ExportOutput> {
        let path = unit.temp_path(&self.temp_dir);

        check_cancelled(&self.shutdown)?;
        remove_stale(&path)?;

        let conn = self.connection.open()?;
        self.transition(unit, ExportState::ConnectionAcquired);

        let mut stmt = conn.prepare(&unit.sql)?;
        let mut source = SqliteRowSource::open(&mut stmt)?;
        self.transition(unit, ExportState::SchemaProbed);

        let summary = write_parquet(&mut source, &path, &self.shutdown, |state, rows| {
            self.transition(unit, state);
            if rows > 0 {
                self.observer.on_rows(&unit.name, rows);
            }
        })?;

        Ok(ExportOutput {
            name: unit.name.clone(),
            path,
            rows: summary.rows,
            row_groups: summary.row_groups,
        })
    }

    fn transition(&self, unit: &ExportUnit, state: ExportState) {
        debug!(query = %unit.name, state = %state, "Export state");
        self.observer.on_state(&unit.name, state);
    }
}

fn check_cancelled(cancel: &AtomicBool) -> ExportResult<()> {
    if cancel.load(Ordering::SeqCst) {
        return Err(ExportError::Cancelled);
    }
    Ok(())
}

/// Delete a leftover file from an earlier attempt
fn remove_stale(path: &Path) -> ExportResult<()> {
    match fs::remove_file(path) {
        Ok(()) => {
            debug!(path = %path.display(), "Removed stale temporary file");
            Ok(())
        }
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(ExportError::io(path, e)),
    }
}

/// Stream every row of `source` into a new Parquet file at `path`.
///
/// The writer is closed (footer written) only when the stream ends normally;
/// on error or cancellation the partial file stays behind.
pub fn write_parquet<S, F>(
    source: &mut S,
    path: &Path,
    cancel: &AtomicBool,
    on_progress: F,
) -> ExportResult<StreamSummary>
where
    S: RowSource + ?Sized,
    F: FnMut(ExportState, u64),
{
    let mut batch = RowBatch::from_schema(source.column_schema())?;
    let mut sink = ParquetSink::create(path, batch.schema())?;

    let rows = stream_rows(source, &mut batch, &mut sink, cancel, on_progress)?;
    let row_groups = sink.row_groups();
    sink.close()?;

    Ok(StreamSummary { rows, row_groups })
}

/// Read rows into `batch`, flushing a row group to `sink` whenever the batch
/// is full and once more at the end.
///
/// `on_progress` sees `Streaming` when reading (re)starts and `Flushing`
/// before each row group, with the number of rows handed to the sink so far.
pub fn stream_rows<S, K, F>(
    source: &mut S,
    batch: &mut RowBatch,
    sink: &mut K,
    cancel: &AtomicBool,
    mut on_progress: F,
) -> ExportResult<u64>
where
    S: RowSource + ?Sized,
    K: ColumnarSink + ?Sized,
    F: FnMut(ExportState, u64),
{
    let mut written: u64 = 0;
    on_progress(ExportState::Streaming, written);

    loop {
        check_cancelled(cancel)?;
        if !source.next_row()? {
            break;
        }
        batch.add_row(&*source)?;

        if batch.is_full() {
            check_cancelled(cancel)?;
            on_progress(ExportState::Flushing, written + batch.row_count() as u64);
            written += batch.flush(sink)? as u64;
            on_progress(ExportState::Streaming, written);
        }
    }

    if batch.row_count() > 0 {
        check_cancelled(cancel)?;
        on_progress(ExportState::Flushing, written + batch.row_count() as u64);
        written += batch.flush(sink)? as u64;
    }

    Ok(written)
}
