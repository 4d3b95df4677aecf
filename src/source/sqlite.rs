//! SQLite row source
//!
//! Opens databases read-only and maps each result column to a [`ColumnType`]
//! using SQLite's type-affinity rules on the declared column type. Expression
//! columns have no declared type; they are typed from the storage class of the
//! first row, falling back to a nullable integer. Such columns are marked
//! inferred so the row batch may widen them when later rows disagree.
//!
//! SQLite does not report nullability for result columns, so every column this
//! source describes is nullable.

use crate::error::{ExportError, ExportResult};
use crate::source::types::{ColumnDescriptor, ColumnType, SqlValue, MAX_DECIMAL_PRECISION};
use crate::source::RowSource;
use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags, Row, Rows, Statement};
use std::fmt;
use std::time::Duration;
use tracing::debug;

/// Default busy timeout applied to each connection
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(120);

/// Database driver used to open connections
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum Driver {
    #[default]
    Sqlite,
}

impl fmt::Display for Driver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Driver::Sqlite => write!(f, "sqlite"),
        }
    }
}

/// Everything needed to open one connection per export
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    pub driver: Driver,
    /// Database path or `file:` URI
    pub connection_string: String,
    pub command_timeout: Duration,
}

impl ConnectionConfig {
    pub fn sqlite(connection_string: impl Into<String>) -> Self {
        Self {
            driver: Driver::Sqlite,
            connection_string: connection_string.into(),
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
        }
    }

    /// Open a read-only connection with the busy timeout applied
    pub fn open(&self) -> ExportResult<Connection> {
        let connection_error = |e: rusqlite::Error| ExportError::Connection {
            driver: self.driver.to_string(),
            reason: e.to_string(),
        };

        let conn = match self.driver {
            Driver::Sqlite => Connection::open_with_flags(
                &self.connection_string,
                OpenFlags::SQLITE_OPEN_READ_ONLY
                    | OpenFlags::SQLITE_OPEN_URI
                    | OpenFlags::SQLITE_OPEN_NO_MUTEX,
            )
            .map_err(connection_error)?,
        };
        conn.busy_timeout(self.command_timeout)
            .map_err(connection_error)?;

        debug!(driver = %self.driver, "Connection opened");
        Ok(conn)
    }
}

/// Map a declared SQLite column type to a column type.
///
/// Returns `None` for declared types with no supported mapping.
pub fn column_type_from_decl(decl: &str) -> Option<ColumnType> {
    let upper = decl.trim().to_ascii_uppercase();

    if upper.contains("DATETIME") || upper.contains("TIMESTAMP") {
        return Some(ColumnType::Timestamp);
    }
    if upper.contains("DATE") {
        return Some(ColumnType::Date);
    }
    if upper.contains("BOOL") {
        return Some(ColumnType::Boolean);
    }
    if upper.starts_with("DECIMAL") || upper.starts_with("NUMERIC") {
        return match decimal_args(&upper) {
            Some(Ok((precision, scale))) => Some(ColumnType::Decimal { precision, scale }),
            Some(Err(())) => None,
            None => Some(ColumnType::Float64),
        };
    }
    if upper.contains("INT") {
        return Some(ColumnType::Int64);
    }
    if upper.contains("CHAR") || upper.contains("CLOB") || upper.contains("TEXT") {
        return Some(ColumnType::Text);
    }
    if upper.contains("BLOB") {
        return Some(ColumnType::Binary);
    }
    if upper.contains("REAL") || upper.contains("FLOA") || upper.contains("DOUB") {
        return Some(ColumnType::Float64);
    }
    None
}

/// Parse `(p)` or `(p, s)` following DECIMAL/NUMERIC.
///
/// `None` when there are no arguments, `Some(Err(()))` when they are invalid.
fn decimal_args(upper: &str) -> Option<Result<(u8, i8), ()>> {
    let open = upper.find('(')?;
    let close = match upper[open..].find(')') {
        Some(pos) => open + pos,
        None => return Some(Err(())),
    };

    let mut parts = upper[open + 1..close].split(',').map(str::trim);
    let precision: u8 = match parts.next().and_then(|p| p.parse().ok()) {
        Some(p) if (1..=MAX_DECIMAL_PRECISION).contains(&p) => p,
        _ => return Some(Err(())),
    };
    let scale: i8 = match parts.next() {
        Some(s) => match s.parse::<i8>() {
            Ok(s) if s >= 0 && s as u8 <= precision => s,
            _ => return Some(Err(())),
        },
        None => 0,
    };
    if parts.next().is_some() {
        return Some(Err(()));
    }
    Some(Ok((precision, scale)))
}

/// Type an expression column from the first value it produced.
///
/// NULL, or no row at all, gives a nullable integer column.
fn column_type_from_value(value: Option<&SqlValue>) -> ColumnType {
    value
        .and_then(ColumnType::for_value)
        .unwrap_or(ColumnType::Int64)
}

fn to_sql_value(value: ValueRef<'_>) -> ExportResult<SqlValue> {
    Ok(match value {
        ValueRef::Null => SqlValue::Null,
        ValueRef::Integer(i) => SqlValue::Integer(i),
        ValueRef::Real(f) => SqlValue::Real(f),
        ValueRef::Text(bytes) => SqlValue::Text(
            std::str::from_utf8(bytes)
                .map_err(|e| ExportError::Query(format!("invalid UTF-8 in text value: {}", e)))?
                .to_owned(),
        ),
        ValueRef::Blob(bytes) => SqlValue::Blob(bytes.to_vec()),
    })
}

fn read_row(row: Option<&Row<'_>>, width: usize) -> ExportResult<Option<Vec<SqlValue>>> {
    let Some(row) = row else {
        return Ok(None);
    };
    let mut values = Vec::with_capacity(width);
    for ordinal in 0..width {
        values.push(to_sql_value(row.get_ref(ordinal)?)?);
    }
    Ok(Some(values))
}

/// Row source over an executing rusqlite statement
pub struct SqliteRowSource<'stmt> {
    rows: Rows<'stmt>,
    schema: Vec<ColumnDescriptor>,
    current: Option<Vec<SqlValue>>,
    /// First row, read ahead to type expression columns
    prefetched: Option<Vec<SqlValue>>,
    exhausted: bool,
}

impl<'stmt> SqliteRowSource<'stmt> {
    /// Execute `stmt` and probe the result schema.
    ///
    /// The first row is read ahead; it is still returned by the first
    /// `next_row` call.
    pub fn open(stmt: &'stmt mut Statement<'_>) -> ExportResult<Self> {
        let declared: Vec<(String, Option<String>)> = stmt
            .columns()
            .iter()
            .map(|c| (c.name().to_string(), c.decl_type().map(str::to_string)))
            .collect();
        let width = declared.len();

        let mut rows = stmt.query([])?;
        let prefetched = read_row(rows.next()?, width)?;

        let schema = declared
            .into_iter()
            .enumerate()
            .map(|(ordinal, (name, decl))| {
                match decl.as_deref().map(str::trim) {
                    Some(decl) if !decl.is_empty() => {
                        let column_type = column_type_from_decl(decl).ok_or_else(|| {
                            ExportError::violation(
                                &name,
                                format!("unsupported declared type '{}'", decl),
                            )
                        })?;
                        Ok(ColumnDescriptor::new(ordinal, name, column_type, true))
                    }
                    _ => {
                        let column_type = column_type_from_value(
                            prefetched.as_ref().and_then(|row| row.get(ordinal)),
                        );
                        Ok(ColumnDescriptor::new(ordinal, name, column_type, true)
                            .with_inferred_type())
                    }
                }
            })
            .collect::<ExportResult<Vec<_>>>()?;

        debug!(columns = schema.len(), "Schema probed");

        Ok(Self {
            exhausted: prefetched.is_none(),
            rows,
            schema,
            current: None,
            prefetched,
        })
    }
}

impl RowSource for SqliteRowSource<'_> {
    fn column_schema(&self) -> &[ColumnDescriptor] {
        &self.schema
    }

    fn next_row(&mut self) -> ExportResult<bool> {
        if let Some(row) = self.prefetched.take() {
            self.current = Some(row);
            return Ok(true);
        }
        if self.exhausted {
            self.current = None;
            return Ok(false);
        }

        let width = self.schema.len();
        self.current = read_row(self.rows.next()?, width)?;
        if self.current.is_none() {
            self.exhausted = true;
        }
        Ok(self.current.is_some())
    }

    fn value_at(&self, ordinal: usize) -> ExportResult<&SqlValue> {
        let row = self
            .current
            .as_ref()
            .ok_or_else(|| ExportError::Query("no current row".into()))?;
        row.get(ordinal).ok_or_else(|| {
            ExportError::Query(format!(
                "column {} out of range for {} columns",
                ordinal,
                row.len()
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_decl_affinity() {
        assert_eq!(column_type_from_decl("INTEGER"), Some(ColumnType::Int64));
        assert_eq!(column_type_from_decl("bigint"), Some(ColumnType::Int64));
        assert_eq!(column_type_from_decl("BOOLEAN"), Some(ColumnType::Boolean));
        assert_eq!(column_type_from_decl("VARCHAR(40)"), Some(ColumnType::Text));
        assert_eq!(column_type_from_decl("CLOB"), Some(ColumnType::Text));
        assert_eq!(column_type_from_decl("BLOB"), Some(ColumnType::Binary));
        assert_eq!(column_type_from_decl("DOUBLE PRECISION"), Some(ColumnType::Float64));
        assert_eq!(column_type_from_decl("FLOAT"), Some(ColumnType::Float64));
        assert_eq!(column_type_from_decl("DATE"), Some(ColumnType::Date));
        assert_eq!(column_type_from_decl("DATETIME"), Some(ColumnType::Timestamp));
        assert_eq!(column_type_from_decl("TIMESTAMP"), Some(ColumnType::Timestamp));
        assert_eq!(column_type_from_decl("GEOMETRY"), None);
    }

    #[test]
    fn test_decl_decimal() {
        assert_eq!(
            column_type_from_decl("DECIMAL(10, 2)"),
            Some(ColumnType::Decimal {
                precision: 10,
                scale: 2
            })
        );
        assert_eq!(
            column_type_from_decl("numeric(5)"),
            Some(ColumnType::Decimal {
                precision: 5,
                scale: 0
            })
        );
        assert_eq!(column_type_from_decl("NUMERIC"), Some(ColumnType::Float64));
        assert_eq!(column_type_from_decl("DECIMAL(40,2)"), None);
        assert_eq!(column_type_from_decl("DECIMAL(4,6)"), None);
        assert_eq!(column_type_from_decl("DECIMAL(4"), None);
    }

    #[test]
    fn test_expression_columns_typed_from_first_row() {
        let conn = Connection::open_in_memory().unwrap();
        let mut stmt = conn
            .prepare("SELECT 1 AS i, 2.5 AS r, 'a' AS t, x'00' AS b, NULL AS n")
            .unwrap();
        let mut source = SqliteRowSource::open(&mut stmt).unwrap();

        let types: Vec<ColumnType> = source
            .column_schema()
            .iter()
            .map(|c| c.column_type)
            .collect();
        assert_eq!(
            types,
            vec![
                ColumnType::Int64,
                ColumnType::Float64,
                ColumnType::Text,
                ColumnType::Binary,
                ColumnType::Int64,
            ]
        );
        assert!(source.column_schema().iter().all(|c| c.nullable));
        assert!(source.column_schema().iter().all(|c| c.inferred));

        // The prefetched row is still delivered
        assert!(source.next_row().unwrap());
        assert_eq!(source.value_at(0).unwrap(), &SqlValue::Integer(1));
        assert!(source.value_at(4).unwrap().is_null());
        assert!(!source.next_row().unwrap());
        assert!(!source.next_row().unwrap());
    }

    #[test]
    fn test_declared_columns_and_empty_result() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE t (id INTEGER, price DECIMAL(8,2), seen DATETIME);")
            .unwrap();
        let mut stmt = conn.prepare("SELECT id, price, seen FROM t").unwrap();
        let mut source = SqliteRowSource::open(&mut stmt).unwrap();

        let schema = source.column_schema();
        assert_eq!(schema.len(), 3);
        assert_eq!(schema[0].name, "id");
        assert_eq!(
            schema[1].column_type,
            ColumnType::Decimal {
                precision: 8,
                scale: 2
            }
        );
        assert_eq!(schema[2].column_type, ColumnType::Timestamp);
        assert!(schema.iter().all(|c| !c.inferred));
        assert!(!source.next_row().unwrap());
    }

    #[test]
    fn test_unsupported_declared_type_is_violation() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE shapes (g GEOMETRY);").unwrap();
        let mut stmt = conn.prepare("SELECT g FROM shapes").unwrap();
        let err = SqliteRowSource::open(&mut stmt).err().unwrap();
        assert!(err.is_schema_violation());
    }

    #[test]
    fn test_open_read_only() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("source.db");
        {
            let conn = Connection::open(&db_path).unwrap();
            conn.execute_batch("CREATE TABLE t (x INTEGER); INSERT INTO t VALUES (1);")
                .unwrap();
        }

        let config = ConnectionConfig::sqlite(db_path.to_string_lossy());
        let conn = config.open().unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM t", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
        assert!(conn.execute("INSERT INTO t VALUES (2)", []).is_err());
    }

    #[test]
    fn test_open_missing_database() {
        let dir = tempdir().unwrap();
        let config = ConnectionConfig::sqlite(dir.path().join("missing.db").to_string_lossy());
        let err = config.open().unwrap_err();
        assert!(matches!(err, ExportError::Connection { .. }));
    }
}
