//! Configuration types for sql2parquet
//!
//! This module defines:
//! - CLI argument parsing using clap derive macros
//! - Runtime configuration with validation
//! - Query discovery (a single `.sql` file or a directory of them)

use crate::error::ConfigError;
use crate::export::ExportUnit;
use crate::retention::DEFAULT_KEEP;
use crate::source::sqlite::{ConnectionConfig, Driver};
use clap::Parser;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Upper bound for the per-connection command timeout (one day)
const MAX_COMMAND_TIMEOUT_SECS: u64 = 86_400;

/// Extension of query files
const QUERY_EXTENSION: &str = "sql";

/// Stream SQL query results into Parquet files
#[derive(Parser, Debug, Clone)]
#[command(
    name = "sql2parquet",
    version,
    about = "Stream SQL query results into Parquet files",
    long_about = "Runs every query concurrently against one database and streams each result set \
                  into a GZIP-compressed Parquet file.\n\n\
                  Files are written to a per-run temporary directory first and moved into the \
                  output directory only when their export succeeds. A file being replaced is kept \
                  as a timestamped generation; older generations beyond --keep are deleted.",
    after_help = "EXAMPLES:\n    \
        sql2parquet --connection sales.db --query ./queries\n    \
        sql2parquet --connection 'file:sales.db?mode=ro' --query daily.query.sql -o /data/out\n    \
        sql2parquet --connection sales.db --keep 10 --command-timeout 300 -q"
)]
pub struct CliArgs {
    /// Database connection string (SQLite path or file: URI)
    #[arg(long, value_name = "CONN")]
    pub connection: String,

    /// A .sql file, or a directory whose .sql files are all exported
    #[arg(long, default_value = ".", value_name = "PATH")]
    pub query: PathBuf,

    /// Destination directory for finished Parquet files
    #[arg(short, long, default_value = "./.output", value_name = "DIR")]
    pub output: PathBuf,

    /// Root for per-run temporary directories
    #[arg(long, default_value = "./.temp", value_name = "DIR")]
    pub temp: PathBuf,

    /// Database driver
    #[arg(long, value_enum, default_value_t = Driver::Sqlite)]
    pub driver: Driver,

    /// Timestamped generations to keep per output file
    #[arg(long, default_value_t = DEFAULT_KEEP, value_name = "NUM")]
    pub keep: usize,

    /// Busy timeout applied to each connection, in seconds
    #[arg(long, default_value = "120", value_name = "SECS")]
    pub command_timeout: u64,

    /// Quiet mode - suppress progress output
    #[arg(short = 'q', long)]
    pub quiet: bool,

    /// Verbose output (debug logging)
    #[arg(short = 'v', long)]
    pub verbose: bool,
}

/// Validated runtime configuration
#[derive(Debug, Clone)]
pub struct ExportConfig {
    /// How each export connects
    pub connection: ConnectionConfig,

    /// Queries to export, sorted by file name
    pub units: Vec<ExportUnit>,

    /// Destination directory
    pub output_dir: PathBuf,

    /// Root under which the per-run temporary directory is created
    pub temp_root: PathBuf,

    /// Generations to keep per output
    pub keep: usize,

    /// Show progress indicator
    pub show_progress: bool,

    /// Verbose logging
    pub verbose: bool,
}

impl ExportConfig {
    /// Create and validate configuration from CLI arguments
    pub fn from_args(args: CliArgs) -> Result<Self, ConfigError> {
        let connection_string = args.connection.trim();
        if connection_string.is_empty() {
            return Err(ConfigError::EmptyConnection);
        }

        if args.command_timeout == 0 || args.command_timeout > MAX_COMMAND_TIMEOUT_SECS {
            return Err(ConfigError::InvalidTimeout {
                secs: args.command_timeout,
                max: MAX_COMMAND_TIMEOUT_SECS,
            });
        }

        if args.keep == 0 {
            return Err(ConfigError::InvalidKeep(args.keep));
        }

        if args.output.is_file() {
            return Err(ConfigError::InvalidDirectory {
                path: args.output,
                reason: "is a file".into(),
            });
        }
        if args.temp.is_file() {
            return Err(ConfigError::InvalidDirectory {
                path: args.temp,
                reason: "is a file".into(),
            });
        }

        let units = discover_queries(&args.query)?;

        Ok(Self {
            connection: ConnectionConfig {
                driver: args.driver,
                connection_string: connection_string.to_string(),
                command_timeout: Duration::from_secs(args.command_timeout),
            },
            units,
            output_dir: args.output,
            temp_root: args.temp,
            keep: args.keep,
            show_progress: !args.quiet,
            verbose: args.verbose,
        })
    }
}

/// Output name for a query file.
///
/// The file stem with a trailing `.query` removed and remaining dots replaced
/// by underscores: `daily.sales.query.sql` → `daily_sales`.
pub fn query_name(path: &Path) -> Option<String> {
    let stem = path.file_stem()?.to_str()?;
    let stem = stem.strip_suffix(".query").unwrap_or(stem);
    if stem.is_empty() {
        return None;
    }
    Some(stem.replace('.', "_"))
}

fn is_query_file(path: &Path) -> bool {
    path.is_file()
        && path
            .extension()
            .is_some_and(|e| e.eq_ignore_ascii_case(QUERY_EXTENSION))
}

/// Resolve `path` to export units.
///
/// A file is exported on its own; a directory contributes every `.sql` file
/// directly inside it, sorted by file name.
pub fn discover_queries(path: &Path) -> Result<Vec<ExportUnit>, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::QueryPathNotFound {
            path: path.to_path_buf(),
        });
    }

    let mut files: Vec<PathBuf> = if path.is_dir() {
        fs::read_dir(path)
            .map_err(|e| ConfigError::ReadQuery {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| is_query_file(p))
            .collect()
    } else {
        vec![path.to_path_buf()]
    };
    files.sort();

    if files.is_empty() {
        return Err(ConfigError::NoQueries {
            path: path.to_path_buf(),
        });
    }

    let mut seen: HashMap<String, PathBuf> = HashMap::new();
    let mut units = Vec::with_capacity(files.len());
    for file in files {
        let name = query_name(&file).ok_or_else(|| ConfigError::ReadQuery {
            path: file.clone(),
            reason: "cannot derive an output name from the file name".into(),
        })?;
        if let Some(first) = seen.get(&name) {
            return Err(ConfigError::DuplicateQueryName {
                name,
                first: first.clone(),
                second: file,
            });
        }

        let sql = fs::read_to_string(&file).map_err(|e| ConfigError::ReadQuery {
            path: file.clone(),
            reason: e.to_string(),
        })?;
        if sql.trim().is_empty() {
            return Err(ConfigError::ReadQuery {
                path: file,
                reason: "file is empty".into(),
            });
        }

        seen.insert(name.clone(), file);
        units.push(ExportUnit::new(name, sql));
    }

    Ok(units)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn args(connection: &str, query: &Path) -> CliArgs {
        CliArgs::parse_from([
            "sql2parquet",
            "--connection",
            connection,
            "--query",
            query.to_str().unwrap(),
        ])
    }

    #[test]
    fn test_query_name() {
        assert_eq!(query_name(Path::new("a.sql")).as_deref(), Some("a"));
        assert_eq!(
            query_name(Path::new("/q/daily.sales.query.sql")).as_deref(),
            Some("daily_sales")
        );
        assert_eq!(
            query_name(Path::new("orders.query.sql")).as_deref(),
            Some("orders")
        );
        assert_eq!(query_name(Path::new(".query.sql")), None);
    }

    #[test]
    fn test_defaults() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("one.sql");
        fs::write(&file, "select 1").unwrap();

        let config = ExportConfig::from_args(args("db.sqlite", &file)).unwrap();
        assert_eq!(config.connection.driver, Driver::Sqlite);
        assert_eq!(config.connection.command_timeout, Duration::from_secs(120));
        assert_eq!(config.output_dir, PathBuf::from("./.output"));
        assert_eq!(config.temp_root, PathBuf::from("./.temp"));
        assert_eq!(config.keep, DEFAULT_KEEP);
        assert!(config.show_progress);
        assert_eq!(config.units, vec![ExportUnit::new("one", "select 1")]);
    }

    #[test]
    fn test_directory_is_sorted_and_filtered() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("b.sql"), "select 2").unwrap();
        fs::write(dir.path().join("a.query.sql"), "select 1").unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();
        fs::create_dir(dir.path().join("nested.sql")).unwrap();

        let units = discover_queries(dir.path()).unwrap();
        let names: Vec<&str> = units.iter().map(|u| u.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("x.sql"), "select 1").unwrap();
        fs::write(dir.path().join("x.query.sql"), "select 2").unwrap();

        let err = discover_queries(dir.path()).unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateQueryName { ref name, .. } if name == "x"));
    }

    #[test]
    fn test_empty_directory_rejected() {
        let dir = tempdir().unwrap();
        let err = discover_queries(dir.path()).unwrap_err();
        assert!(matches!(err, ConfigError::NoQueries { .. }));
    }

    #[test]
    fn test_missing_path_rejected() {
        let dir = tempdir().unwrap();
        let err = discover_queries(&dir.path().join("missing")).unwrap_err();
        assert!(matches!(err, ConfigError::QueryPathNotFound { .. }));
    }

    #[test]
    fn test_empty_query_file_rejected() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("blank.sql"), "  \n").unwrap();
        let err = discover_queries(dir.path()).unwrap_err();
        assert!(matches!(err, ConfigError::ReadQuery { .. }));
    }

    #[test]
    fn test_invalid_values() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("one.sql");
        fs::write(&file, "select 1").unwrap();

        let err = ExportConfig::from_args(args("   ", &file)).unwrap_err();
        assert!(matches!(err, ConfigError::EmptyConnection));

        let mut bad_timeout = args("db.sqlite", &file);
        bad_timeout.command_timeout = 0;
        let err = ExportConfig::from_args(bad_timeout).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidTimeout { .. }));

        let mut keep_none = args("db.sqlite", &file);
        keep_none.keep = 0;
        let err = ExportConfig::from_args(keep_none).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidKeep(0)));

        let mut file_as_output = args("db.sqlite", &file);
        file_as_output.output = file.clone();
        let err = ExportConfig::from_args(file_as_output).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidDirectory { .. }));
    }

    #[test]
    fn test_cli_flags() {
        let cli = CliArgs::parse_from([
            "sql2parquet",
            "--connection",
            "x.db",
            "--driver",
            "sqlite",
            "--keep",
            "2",
            "--command-timeout",
            "30",
            "-q",
            "-v",
            "-o",
            "out",
        ]);
        assert_eq!(cli.keep, 2);
        assert_eq!(cli.command_timeout, 30);
        assert!(cli.quiet && cli.verbose);
        assert_eq!(cli.output, PathBuf::from("out"));
        assert_eq!(cli.query, PathBuf::from("."));
    }
}
