//! Column metadata and raw cursor values
//!
//! `ColumnType` is the closed set of element types a result column can map to.
//! `SqlValue` is one cell as the row source produced it, before conversion into
//! the column's Arrow representation.

use arrow::datatypes::{DataType, TimeUnit};
use chrono::{NaiveDate, NaiveDateTime};
use std::fmt;

/// Largest precision a Decimal128 column can hold
pub const MAX_DECIMAL_PRECISION: u8 = 38;

/// Declared element type of a result column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Boolean,
    Int16,
    Int32,
    Int64,
    Float32,
    Float64,
    /// Fixed-point number with `precision` total digits, `scale` after the point
    Decimal { precision: u8, scale: i8 },
    Text,
    Binary,
    /// Calendar date without time zone
    Date,
    /// Date and time without time zone, microsecond resolution
    Timestamp,
}

impl ColumnType {
    /// Arrow data type backing this column
    pub fn arrow_type(&self) -> DataType {
        match self {
            ColumnType::Boolean => DataType::Boolean,
            ColumnType::Int16 => DataType::Int16,
            ColumnType::Int32 => DataType::Int32,
            ColumnType::Int64 => DataType::Int64,
            ColumnType::Float32 => DataType::Float32,
            ColumnType::Float64 => DataType::Float64,
            ColumnType::Decimal { precision, scale } => DataType::Decimal128(*precision, *scale),
            ColumnType::Text => DataType::Utf8,
            ColumnType::Binary => DataType::Binary,
            ColumnType::Date => DataType::Date32,
            ColumnType::Timestamp => DataType::Timestamp(TimeUnit::Microsecond, None),
        }
    }
}

impl ColumnType {
    /// Column type suggested by a value's storage class; `None` for null
    pub fn for_value(value: &SqlValue) -> Option<ColumnType> {
        Some(match value {
            SqlValue::Null => return None,
            SqlValue::Boolean(_) => ColumnType::Boolean,
            SqlValue::Integer(_) => ColumnType::Int64,
            SqlValue::Real(_) => ColumnType::Float64,
            SqlValue::Text(_) => ColumnType::Text,
            SqlValue::Blob(_) => ColumnType::Binary,
            SqlValue::Date(_) => ColumnType::Date,
            SqlValue::Timestamp(_) => ColumnType::Timestamp,
        })
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnType::Decimal { precision, scale } => {
                write!(f, "decimal({}, {})", precision, scale)
            }
            other => write!(f, "{}", format!("{:?}", other).to_lowercase()),
        }
    }
}

/// Metadata for one result column.
///
/// Captured once after the query executes. Only an inferred column's type may
/// change afterwards, and only before its first row group is written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDescriptor {
    /// 0-based position in the result set
    pub ordinal: usize,
    pub name: String,
    pub column_type: ColumnType,
    pub nullable: bool,
    /// Type was guessed from the data rather than declared
    pub inferred: bool,
}

impl ColumnDescriptor {
    pub fn new(
        ordinal: usize,
        name: impl Into<String>,
        column_type: ColumnType,
        nullable: bool,
    ) -> Self {
        Self {
            ordinal,
            name: name.into(),
            column_type,
            nullable,
            inferred: false,
        }
    }

    /// Mark the type as guessed from the data
    pub fn with_inferred_type(mut self) -> Self {
        self.inferred = true;
        self
    }
}

/// One cell as read from the cursor
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Boolean(bool),
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
    Date(NaiveDate),
    Timestamp(NaiveDateTime),
}

impl SqlValue {
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    /// Short storage-class name used in error messages
    pub fn kind(&self) -> &'static str {
        match self {
            SqlValue::Null => "null",
            SqlValue::Boolean(_) => "boolean",
            SqlValue::Integer(_) => "integer",
            SqlValue::Real(_) => "real",
            SqlValue::Text(_) => "text",
            SqlValue::Blob(_) => "blob",
            SqlValue::Date(_) => "date",
            SqlValue::Timestamp(_) => "timestamp",
        }
    }
}
