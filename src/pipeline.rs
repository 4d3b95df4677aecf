//! Run lifecycle
//!
//! 1. Create the output directory and a fresh `{temp_root}/{uuid}` run directory
//! 2. Export every query concurrently into the run directory
//! 3. Promote each successful export (in completion order), then prune its
//!    generations
//! 4. Remove the run directory if it is empty; unpromoted exports and the
//!    partial files of failed or cancelled exports keep it

use crate::config::ExportConfig;
use crate::error::Result;
use crate::export::{ExportObserver, ExportOrchestrator, ExportReport};
use crate::retention::{promote, prune};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};
use uuid::Uuid;

/// Exit code when the run was interrupted
pub const EXIT_INTERRUPTED: u8 = 130;

/// Everything that happened during one run
#[derive(Debug)]
pub struct RunOutcome {
    pub report: ExportReport,
    /// Final paths of promoted files
    pub promoted: Vec<PathBuf>,
    pub promotion_failures: usize,
    pub prune_failures: usize,
    /// Bytes of all promoted files
    pub bytes: u64,
    pub run_dir: PathBuf,
    pub run_dir_removed: bool,
    pub interrupted: bool,
    pub duration: Duration,
}

impl RunOutcome {
    /// 0 on full success, 130 when interrupted, 1 on any failure
    pub fn exit_code(&self) -> u8 {
        if self.interrupted {
            EXIT_INTERRUPTED
        } else if self.report.failed_count() > 0 || self.promotion_failures > 0 {
            1
        } else {
            0
        }
    }
}

/// Run every configured export and promote the results
pub async fn run(
    config: &ExportConfig,
    shutdown: Arc<AtomicBool>,
    observer: Arc<dyn ExportObserver>,
) -> Result<RunOutcome> {
    let start = Instant::now();

    fs::create_dir_all(&config.output_dir)?;
    let run_dir = config.temp_root.join(Uuid::new_v4().to_string());
    fs::create_dir_all(&run_dir)?;
    info!(run_dir = %run_dir.display(), "Created run directory");

    let orchestrator = ExportOrchestrator::new(config.connection.clone(), run_dir.clone())
        .with_shutdown_flag(Arc::clone(&shutdown))
        .with_observer(observer);
    let report = orchestrator.run_all(config.units.clone()).await;

    let mut promoted = Vec::new();
    let mut promotion_failures = 0;
    let mut prune_failures = 0;
    let mut bytes = 0;

    for output in report.succeeded() {
        let dest = match promote(&output.path, &config.output_dir) {
            Ok(dest) => dest,
            Err(e) => {
                warn!(query = %output.name, error = %e, "Promotion failed");
                promotion_failures += 1;
                continue;
            }
        };
        bytes += fs::metadata(&dest).map(|m| m.len()).unwrap_or(0);

        match prune(&dest, config.keep) {
            Ok(pruned) => prune_failures += pruned.failures.len(),
            Err(e) => {
                warn!(query = %output.name, error = %e, "Pruning failed");
                prune_failures += 1;
            }
        }
        promoted.push(dest);
    }

    let run_dir_removed = remove_run_dir(&run_dir);

    let interrupted = shutdown.load(Ordering::SeqCst);
    if interrupted {
        info!("Run was interrupted before completion");
    }

    Ok(RunOutcome {
        report,
        promoted,
        promotion_failures,
        prune_failures,
        bytes,
        run_dir,
        run_dir_removed,
        interrupted,
        duration: start.elapsed(),
    })
}

/// Remove the run directory once nothing is left in it.
///
/// Exports that could not be promoted, and the partial files of failed or
/// cancelled exports, keep the directory alive for inspection.
fn remove_run_dir(run_dir: &Path) -> bool {
    match fs::remove_dir(run_dir) {
        Ok(()) => true,
        Err(e) if e.kind() == ErrorKind::DirectoryNotEmpty => {
            warn!(
                run_dir = %run_dir.display(),
                "Keeping run directory; it holds files that were not promoted"
            );
            false
        }
        Err(e) => {
            warn!(run_dir = %run_dir.display(), error = %e, "Failed to remove run directory");
            false
        }
    }
}
