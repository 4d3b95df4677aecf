//! sql2parquet - Streaming SQL to Parquet Export
//!
//! Runs a set of SQL queries against one database concurrently and streams
//! each result set into a Parquet file with bounded memory, then promotes the
//! finished files into an output directory while keeping a few older
//! generations around.
//!
//! # Features
//!
//! - **Streaming Export**: Rows are buffered per column and flushed as
//!   row groups of 50,000 rows, so memory does not grow with result size.
//!
//! - **Schema From Metadata**: Column types come from the result set's own
//!   metadata; no schema needs to be declared up front.
//!
//! - **Failure Isolation**: Every query runs as its own task. One query
//!   failing, panicking or being cancelled never affects the others.
//!
//! - **Safe Promotion**: Files only reach the output directory after their
//!   export finished. A replaced file is kept as a timestamped generation and
//!   old generations are pruned.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                     Export Orchestrator                          │
//! │  ┌─────────┐  ┌─────────┐  ┌─────────┐         ┌─────────┐     │
//! │  │ Query 1 │  │ Query 2 │  │ Query 3 │  ...    │ Query N │     │
//! │  │ context │  │ context │  │ context │         │ context │     │
//! │  └────┬────┘  └────┬────┘  └────┬────┘         └────┬────┘     │
//! │       │ Row Source (SQLite cursor)                  │          │
//! │       ▼                                             ▼          │
//! │  ┌──────────────────────────┐                                   │
//! │  │        Row Batch         │  one typed buffer per column      │
//! │  │  - 50K rows / row group  │                                   │
//! │  └────────────┬─────────────┘                                   │
//! │               ▼                                                 │
//! │  ┌──────────────────────────┐                                   │
//! │  │   Parquet Sink (GZIP)    │ → {temp}/{uuid}/{name}.parquet    │
//! │  └──────────────────────────┘                                   │
//! └─────────────────────────────┬───────────────────────────────────┘
//!                               │ promote + prune
//!                               ▼
//!                    ┌──────────────────────────┐
//!                    │  {output}/{name}.parquet │
//!                    │  {name}.{yyyyMMddTHHmmss}│
//!                    └──────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```bash
//! # Export every .sql file in ./queries
//! sql2parquet --connection sales.db --query ./queries
//!
//! # Keep ten generations of each output
//! sql2parquet --connection sales.db --query daily.sql --keep 10 -o /data/out
//! ```

pub mod config;
pub mod error;
pub mod export;
pub mod parquet;
pub mod pipeline;
pub mod progress;
pub mod retention;
pub mod source;

pub use config::{CliArgs, ExportConfig};
pub use error::{ExportError, Result, Sql2ParquetError};
pub use export::{ExportOrchestrator, ExportReport, ExportStatus, ExportUnit};
pub use pipeline::RunOutcome;
