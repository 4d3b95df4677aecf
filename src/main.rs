//! sql2parquet - Streaming SQL to Parquet Export
//!
//! Entry point for the CLI application.

use anyhow::{Context, Result};
use clap::Parser;
use sql2parquet::config::{CliArgs, ExportConfig};
use sql2parquet::export::{ExportObserver, NoopObserver};
use sql2parquet::pipeline;
use sql2parquet::progress::{print_header, print_summary, ExportProgress, RunSummary};
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    match run() {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<u8> {
    let args = CliArgs::parse();

    setup_logging(args.verbose)?;

    let config = ExportConfig::from_args(args).context("Invalid configuration")?;
    info!(
        queries = config.units.len(),
        driver = %config.connection.driver,
        "Loaded configuration"
    );

    // Setup signal handler for graceful shutdown
    let shutdown = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&shutdown);
    ctrlc::set_handler(move || {
        eprintln!("\nInterrupt received, shutting down...");
        flag.store(true, Ordering::SeqCst);
    })
    .context("Failed to set signal handler")?;

    let progress = if config.show_progress {
        print_header(
            &config.connection.connection_string,
            config.units.len(),
            &config.output_dir,
        );
        Some(Arc::new(ExportProgress::new(
            config.units.iter().map(|u| u.name.as_str()),
        )))
    } else {
        None
    };
    let observer: Arc<dyn ExportObserver> = match &progress {
        Some(p) => Arc::clone(p) as Arc<dyn ExportObserver>,
        None => Arc::new(NoopObserver),
    };

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to create async runtime")?;

    let outcome = runtime
        .block_on(pipeline::run(&config, shutdown, observer))
        .context("Export run failed")?;

    if let Some(p) = &progress {
        p.finish();
    }

    if config.show_progress {
        print_summary(
            &RunSummary {
                succeeded: outcome.report.succeeded_count(),
                failed: outcome.report.failed_count(),
                cancelled: outcome.report.cancelled_count(),
                promotion_failures: outcome.promotion_failures,
                rows: outcome.report.total_rows(),
                bytes: outcome.bytes,
                duration: outcome.duration,
            },
            &config.output_dir,
        );
    }

    if outcome.interrupted {
        info!("Run was interrupted before completion");
    }
    if outcome.prune_failures > 0 {
        info!(failures = outcome.prune_failures, "Some old generations could not be deleted");
    }

    Ok(outcome.exit_code())
}

fn setup_logging(verbose: bool) -> Result<()> {
    let filter = if verbose {
        EnvFilter::new("sql2parquet=debug,warn")
    } else {
        EnvFilter::new("sql2parquet=info,warn")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    Ok(())
}
