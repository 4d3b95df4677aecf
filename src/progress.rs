//! Progress reporting for query exports
//!
//! One spinner per query, driven by the export observer callbacks, plus the
//! run header and summary.

use crate::export::{ExportObserver, ExportState, ExportStatus};
use console::style;
use humansize::{format_size, BINARY};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

/// Spinner per export, keyed by query name
pub struct ExportProgress {
    bars: Mutex<HashMap<String, ProgressBar>>,
}

impl ExportProgress {
    /// Create a spinner for every query up front so they render in order
    pub fn new<'a>(names: impl IntoIterator<Item = &'a str>) -> Self {
        let multi = MultiProgress::new();
        let style = ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed_precise}] {prefix:.bold} {msg}")
            .expect("Invalid progress template")
            .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏");

        let bars = names
            .into_iter()
            .map(|name| {
                let bar = multi.add(ProgressBar::new_spinner());
                bar.set_style(style.clone());
                bar.set_prefix(name.to_string());
                bar.set_message("waiting");
                bar.enable_steady_tick(Duration::from_millis(100));
                (name.to_string(), bar)
            })
            .collect();

        Self {
            bars: Mutex::new(bars),
        }
    }

    fn with_bar(&self, name: &str, f: impl FnOnce(&ProgressBar)) {
        if let Some(bar) = self.bars.lock().get(name) {
            f(bar);
        }
    }

    /// Stop every spinner that has not settled (e.g. on interrupt)
    pub fn finish(&self) {
        for bar in self.bars.lock().values() {
            if !bar.is_finished() {
                bar.abandon();
            }
        }
    }
}

impl ExportObserver for ExportProgress {
    fn on_state(&self, name: &str, state: ExportState) {
        if state.is_terminal() {
            return;
        }
        self.with_bar(name, |bar| bar.set_message(state.to_string()));
    }

    fn on_rows(&self, name: &str, rows: u64) {
        self.with_bar(name, |bar| {
            bar.set_message(format!("{} rows", format_number(rows)));
        });
    }

    fn on_settled(&self, name: &str, status: &ExportStatus) {
        self.with_bar(name, |bar| {
            let message = match status {
                ExportStatus::Succeeded(output) => format!(
                    "{} ({} rows)",
                    style("OK").green(),
                    format_number(output.rows)
                ),
                ExportStatus::Failed(reason) => {
                    format!("{} {}", style("Failed:").red(), reason)
                }
                ExportStatus::Cancelled => style("Cancelled").yellow().to_string(),
            };
            bar.finish_with_message(message);
        });
    }
}

/// Format a number with thousands separators
pub fn format_number(n: u64) -> String {
    let s = n.to_string();
    let bytes: Vec<_> = s.bytes().rev().collect();

    let chunks: Vec<String> = bytes
        .chunks(3)
        .map(|chunk| {
            chunk
                .iter()
                .rev()
                .map(|&b| b as char)
                .collect::<String>()
        })
        .collect();

    chunks.into_iter().rev().collect::<Vec<_>>().join(",")
}

/// Totals shown at the end of a run
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub succeeded: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub promotion_failures: usize,
    pub rows: u64,
    /// Bytes of all promoted files
    pub bytes: u64,
    pub duration: Duration,
}

/// Print a summary of the run
pub fn print_summary(summary: &RunSummary, output_dir: &Path) {
    let duration_secs = summary.duration.as_secs_f64();
    let rate = if duration_secs > 0.0 {
        summary.rows as f64 / duration_secs
    } else {
        0.0
    };

    let title = if summary.failed == 0 && summary.promotion_failures == 0 {
        style("Export Complete").green().bold()
    } else {
        style("Export Finished With Errors").yellow().bold()
    };

    println!();
    println!("{}", title);
    println!("{}", style("─".repeat(50)).dim());
    println!(
        "  {} {}",
        style("Succeeded:").bold(),
        format_number(summary.succeeded as u64)
    );
    if summary.failed > 0 {
        println!(
            "  {} {}",
            style("Failed:").red().bold(),
            format_number(summary.failed as u64)
        );
    }
    if summary.cancelled > 0 {
        println!(
            "  {} {}",
            style("Cancelled:").yellow().bold(),
            format_number(summary.cancelled as u64)
        );
    }
    if summary.promotion_failures > 0 {
        println!(
            "  {} {}",
            style("Not promoted:").red().bold(),
            format_number(summary.promotion_failures as u64)
        );
    }
    println!("  {} {}", style("Rows:").bold(), format_number(summary.rows));
    println!(
        "  {} {}",
        style("Written:").bold(),
        format_size(summary.bytes, BINARY)
    );
    println!(
        "  {} {:.1}s ({:.0} rows/sec)",
        style("Duration:").bold(),
        duration_secs,
        rate
    );
    println!("  {} {}", style("Output:").bold(), output_dir.display());
    println!();
}

/// Print a header at the start of the run
pub fn print_header(connection: &str, queries: usize, output: &Path) {
    println!();
    println!(
        "{} {}",
        style("sql2parquet").cyan().bold(),
        env!("CARGO_PKG_VERSION")
    );
    println!("{}", style("─".repeat(50)).dim());
    println!("  {} {}", style("Source:").bold(), connection);
    println!("  {} {}", style("Queries:").bold(), queries);
    println!("  {} {}", style("Output:").bold(), output.display());
    println!();
}
