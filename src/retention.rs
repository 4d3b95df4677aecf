//! Output promotion and generation retention
//!
//! A finished export is moved from the run's temporary directory into the
//! output directory. When a file of the same name is already there, it is first
//! renamed to a generation carrying its own modification time:
//!
//! `orders.parquet` → `orders.20240131T235959.parquet`
//!
//! Pruning then keeps the newest `keep` generations and deletes the rest. The
//! current (un-suffixed) file is never a generation.

use crate::error::{RetentionError, RetentionResult};
use chrono::{DateTime, Utc};
use regex::Regex;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, info, warn};

/// Generations kept by default
pub const DEFAULT_KEEP: usize = 5;

/// UTC timestamp layout inserted into generation names
const GENERATION_FORMAT: &str = "%Y%m%dT%H%M%S";

/// Result of pruning one output's generations
#[derive(Debug, Default)]
pub struct PruneReport {
    /// Generations left in place, newest first
    pub kept: Vec<PathBuf>,
    pub deleted: Vec<PathBuf>,
    /// Generations that could not be deleted
    pub failures: Vec<RetentionError>,
}

/// Split `file` into its stem and extension (with the leading dot, or empty)
fn stem_and_ext(path: &Path) -> RetentionResult<(String, String)> {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| RetentionError::InvalidPath {
            path: path.to_path_buf(),
        })?;
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{}", e))
        .unwrap_or_default();
    Ok((stem.to_string(), ext))
}

/// Name the generation `path` becomes when superseded
pub fn generation_path(path: &Path, modified: SystemTime) -> RetentionResult<PathBuf> {
    let (stem, ext) = stem_and_ext(path)?;
    let stamp = DateTime::<Utc>::from(modified).format(GENERATION_FORMAT);
    Ok(path.with_file_name(format!("{}.{}{}", stem, stamp, ext)))
}

/// Move a file, copying when the destination is on another filesystem.
///
/// Other rename errors are returned as they are. A copy that fails part way
/// is removed, so `to` either holds the whole file or does not exist.
fn move_file(from: &Path, to: &Path) -> RetentionResult<()> {
    let move_error = |source| RetentionError::Move {
        from: from.to_path_buf(),
        to: to.to_path_buf(),
        source,
    };

    match fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::CrossesDevices => {
            debug!(
                from = %from.display(),
                to = %to.display(),
                "Destination is on another filesystem, copying"
            );
            if let Err(e) = fs::copy(from, to).and_then(|_| fs::remove_file(from)) {
                if let Err(cleanup) = fs::remove_file(to) {
                    if cleanup.kind() != ErrorKind::NotFound {
                        warn!(path = %to.display(), error = %cleanup, "Failed to remove partial copy");
                    }
                }
                return Err(move_error(e));
            }
            Ok(())
        }
        Err(e) => Err(move_error(e)),
    }
}

fn exists(path: &Path) -> RetentionResult<bool> {
    path.try_exists().map_err(|source| RetentionError::Inspect {
        path: path.to_path_buf(),
        source,
    })
}

fn modified(path: &Path) -> RetentionResult<SystemTime> {
    fs::metadata(path)
        .and_then(|m| m.modified())
        .map_err(|source| RetentionError::Inspect {
            path: path.to_path_buf(),
            source,
        })
}

/// Move `temp_file` into `dest_dir`, keeping any file it replaces as a
/// timestamped generation.
///
/// Fails without touching either file when the generation name is already
/// taken; the new file then stays where it was.
pub fn promote(temp_file: &Path, dest_dir: &Path) -> RetentionResult<PathBuf> {
    let file_name = temp_file
        .file_name()
        .ok_or_else(|| RetentionError::InvalidPath {
            path: temp_file.to_path_buf(),
        })?;
    let dest = dest_dir.join(file_name);

    if exists(&dest)? {
        let generation = generation_path(&dest, modified(&dest)?)?;
        if exists(&generation)? {
            return Err(RetentionError::GenerationExists { path: generation });
        }
        move_file(&dest, &generation)?;
        debug!(from = %dest.display(), to = %generation.display(), "Superseded output kept as generation");
    }

    move_file(temp_file, &dest)?;
    info!(path = %dest.display(), "Output promoted");
    Ok(dest)
}

/// Delete all but the `keep` newest generations of `current`.
///
/// Generations are the files next to `current` named `{stem}.*{ext}`; they are
/// ordered by modification time. Deletion failures are collected, not retried.
pub fn prune(current: &Path, keep: usize) -> RetentionResult<PruneReport> {
    let (stem, ext) = stem_and_ext(current)?;
    let dir = match current.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };

    let pattern = Regex::new(&format!(
        r"^{}\..*{}$",
        regex::escape(&stem),
        regex::escape(&ext)
    ))
    .map_err(|_| RetentionError::InvalidPath {
        path: current.to_path_buf(),
    })?;

    let entries = fs::read_dir(dir).map_err(|source| RetentionError::Inspect {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut generations: Vec<(PathBuf, SystemTime)> = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| RetentionError::Inspect {
            path: dir.to_path_buf(),
            source,
        })?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        if !pattern.is_match(name) {
            continue;
        }
        let path = entry.path();
        match entry.metadata() {
            Ok(meta) if meta.is_file() => {
                let mtime = meta.modified().map_err(|source| RetentionError::Inspect {
                    path: path.clone(),
                    source,
                })?;
                generations.push((path, mtime));
            }
            Ok(_) => {}
            // Deleted underneath us
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(source) => return Err(RetentionError::Inspect { path, source }),
        }
    }

    // Newest first
    generations.sort_by(|a, b| b.1.cmp(&a.1));

    let mut report = PruneReport::default();
    for (index, (path, _)) in generations.into_iter().enumerate() {
        if index < keep {
            report.kept.push(path);
            continue;
        }
        match fs::remove_file(&path) {
            Ok(()) => {
                debug!(path = %path.display(), "Old generation deleted");
                report.deleted.push(path);
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to delete old generation");
                report.failures.push(RetentionError::Delete { path, source: e });
            }
        }
    }

    if !report.deleted.is_empty() {
        info!(
            output = %current.display(),
            kept = report.kept.len(),
            deleted = report.deleted.len(),
            "Generations pruned"
        );
    }
    Ok(report)
}
