//! Typed column buffers
//!
//! A [`ColumnBuffer`] accumulates one column's values in the Arrow builder that
//! matches its [`ColumnType`]. Appending is split in two steps so a row batch
//! can validate every cell of a row before any buffer changes:
//!
//! 1. `convert` turns a raw [`SqlValue`] into a [`Cell`] of the column's type,
//!    rejecting nulls in non-nullable columns and values that do not fit.
//! 2. `push` appends the converted cell. It cannot fail for a cell produced by
//!    `convert` on the same buffer.

use crate::error::{ExportError, ExportResult};
use crate::parquet::schema::{
    date_to_days, julian_day_to_micros, seconds_to_microseconds, timestamp_to_micros,
};
use crate::source::types::{ColumnDescriptor, ColumnType, SqlValue};
use arrow::array::{
    ArrayBuilder, ArrayRef, BinaryBuilder, BooleanBuilder, Date32Builder, Decimal128Builder,
    Float32Builder, Float64Builder, Int16Builder, Int32Builder, Int64Builder, StringBuilder,
    TimestampMicrosecondBuilder,
};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use std::borrow::Cow;
use std::sync::Arc;

/// Text layouts accepted for timestamp columns
const TIMESTAMP_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
];

/// Arrow builder for one column, selected by column type
enum TypedBuilder {
    Boolean(BooleanBuilder),
    Int16(Int16Builder),
    Int32(Int32Builder),
    Int64(Int64Builder),
    Float32(Float32Builder),
    Float64(Float64Builder),
    Decimal(Decimal128Builder),
    Text(StringBuilder),
    Binary(BinaryBuilder),
    Date(Date32Builder),
    Timestamp(TimestampMicrosecondBuilder),
}

impl TypedBuilder {
    fn for_type(column_type: ColumnType) -> ExportResult<Self> {
        Ok(match column_type {
            ColumnType::Boolean => TypedBuilder::Boolean(BooleanBuilder::new()),
            ColumnType::Int16 => TypedBuilder::Int16(Int16Builder::new()),
            ColumnType::Int32 => TypedBuilder::Int32(Int32Builder::new()),
            ColumnType::Int64 => TypedBuilder::Int64(Int64Builder::new()),
            ColumnType::Float32 => TypedBuilder::Float32(Float32Builder::new()),
            ColumnType::Float64 => TypedBuilder::Float64(Float64Builder::new()),
            ColumnType::Decimal { precision, scale } => TypedBuilder::Decimal(
                Decimal128Builder::new().with_precision_and_scale(precision, scale)?,
            ),
            ColumnType::Text => TypedBuilder::Text(StringBuilder::new()),
            ColumnType::Binary => TypedBuilder::Binary(BinaryBuilder::new()),
            ColumnType::Date => TypedBuilder::Date(Date32Builder::new()),
            ColumnType::Timestamp => {
                TypedBuilder::Timestamp(TimestampMicrosecondBuilder::new())
            }
        })
    }

    fn builder(&self) -> &dyn ArrayBuilder {
        match self {
            TypedBuilder::Boolean(b) => b,
            TypedBuilder::Int16(b) => b,
            TypedBuilder::Int32(b) => b,
            TypedBuilder::Int64(b) => b,
            TypedBuilder::Float32(b) => b,
            TypedBuilder::Float64(b) => b,
            TypedBuilder::Decimal(b) => b,
            TypedBuilder::Text(b) => b,
            TypedBuilder::Binary(b) => b,
            TypedBuilder::Date(b) => b,
            TypedBuilder::Timestamp(b) => b,
        }
    }

    fn append_null(&mut self) {
        match self {
            TypedBuilder::Boolean(b) => b.append_null(),
            TypedBuilder::Int16(b) => b.append_null(),
            TypedBuilder::Int32(b) => b.append_null(),
            TypedBuilder::Int64(b) => b.append_null(),
            TypedBuilder::Float32(b) => b.append_null(),
            TypedBuilder::Float64(b) => b.append_null(),
            TypedBuilder::Decimal(b) => b.append_null(),
            TypedBuilder::Text(b) => b.append_null(),
            TypedBuilder::Binary(b) => b.append_null(),
            TypedBuilder::Date(b) => b.append_null(),
            TypedBuilder::Timestamp(b) => b.append_null(),
        }
    }

    /// Finish the builder into an array; the builder is left empty
    fn finish(&mut self) -> ArrayRef {
        match self {
            TypedBuilder::Boolean(b) => Arc::new(b.finish()),
            TypedBuilder::Int16(b) => Arc::new(b.finish()),
            TypedBuilder::Int32(b) => Arc::new(b.finish()),
            TypedBuilder::Int64(b) => Arc::new(b.finish()),
            TypedBuilder::Float32(b) => Arc::new(b.finish()),
            TypedBuilder::Float64(b) => Arc::new(b.finish()),
            TypedBuilder::Decimal(b) => Arc::new(b.finish()),
            TypedBuilder::Text(b) => Arc::new(b.finish()),
            TypedBuilder::Binary(b) => Arc::new(b.finish()),
            TypedBuilder::Date(b) => Arc::new(b.finish()),
            TypedBuilder::Timestamp(b) => Arc::new(b.finish()),
        }
    }
}

/// A value converted to its column's physical representation
#[derive(Debug, Clone, PartialEq)]
pub enum Cell<'a> {
    Null,
    Boolean(bool),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    Float32(f32),
    Float64(f64),
    /// Unscaled decimal value
    Decimal(i128),
    Text(Cow<'a, str>),
    Binary(Cow<'a, [u8]>),
    /// Days since the Unix epoch
    Date(i32),
    /// Microseconds since the Unix epoch
    Timestamp(i64),
}

/// Immutable view of a drained column, handed to the sink
pub struct ColumnSnapshot<'a> {
    pub descriptor: &'a ColumnDescriptor,
    pub array: ArrayRef,
}

/// One column's values accumulated since the last flush
pub struct ColumnBuffer {
    descriptor: ColumnDescriptor,
    builder: TypedBuilder,
    /// Non-null values accepted since the buffer was created
    non_null: usize,
}

impl ColumnBuffer {
    /// Create an empty buffer for the descriptor's column type
    pub fn for_descriptor(descriptor: ColumnDescriptor) -> ExportResult<Self> {
        let builder = TypedBuilder::for_type(descriptor.column_type).map_err(|e| {
            ExportError::violation(&descriptor.name, format!("cannot build column: {}", e))
        })?;
        Ok(Self {
            descriptor,
            builder,
            non_null: 0,
        })
    }

    pub fn descriptor(&self) -> &ColumnDescriptor {
        &self.descriptor
    }

    /// Number of values buffered since the last drain
    pub fn len(&self) -> usize {
        self.builder.builder().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Convert and append one value
    pub fn append(&mut self, value: &SqlValue) -> ExportResult<()> {
        let cell = self.convert(value)?;
        self.push(cell)
    }

    /// Convert a raw value to this column's representation without appending it
    pub fn convert<'a>(&self, value: &'a SqlValue) -> ExportResult<Cell<'a>> {
        if value.is_null() {
            if !self.descriptor.nullable {
                return Err(self.violation("null value in non-nullable column"));
            }
            return Ok(Cell::Null);
        }

        match self.descriptor.column_type {
            ColumnType::Boolean => self.to_boolean(value).map(Cell::Boolean),
            ColumnType::Int16 => {
                let v = self.to_i64(value)?;
                i16::try_from(v)
                    .map(Cell::Int16)
                    .map_err(|_| self.violation(format!("{} out of range for int16", v)))
            }
            ColumnType::Int32 => {
                let v = self.to_i64(value)?;
                i32::try_from(v)
                    .map(Cell::Int32)
                    .map_err(|_| self.violation(format!("{} out of range for int32", v)))
            }
            ColumnType::Int64 => self.to_i64(value).map(Cell::Int64),
            ColumnType::Float32 => self.to_f64(value).map(|v| Cell::Float32(v as f32)),
            ColumnType::Float64 => self.to_f64(value).map(Cell::Float64),
            ColumnType::Decimal { precision, scale } => {
                self.to_decimal(value, precision, scale).map(Cell::Decimal)
            }
            ColumnType::Text => self.to_text(value).map(Cell::Text),
            ColumnType::Binary => match value {
                SqlValue::Blob(bytes) => Ok(Cell::Binary(Cow::Borrowed(bytes.as_slice()))),
                SqlValue::Text(s) => Ok(Cell::Binary(Cow::Borrowed(s.as_bytes()))),
                other => Err(self.mismatch(other)),
            },
            ColumnType::Date => self.to_date(value).map(|d| Cell::Date(date_to_days(d))),
            ColumnType::Timestamp => self.to_timestamp_micros(value).map(Cell::Timestamp),
        }
    }

    /// Append a cell produced by `convert` on this buffer
    pub fn push(&mut self, cell: Cell<'_>) -> ExportResult<()> {
        if !matches!(cell, Cell::Null) {
            self.non_null += 1;
        }
        match (&mut self.builder, cell) {
            (builder, Cell::Null) => builder.append_null(),
            (TypedBuilder::Boolean(b), Cell::Boolean(v)) => b.append_value(v),
            (TypedBuilder::Int16(b), Cell::Int16(v)) => b.append_value(v),
            (TypedBuilder::Int32(b), Cell::Int32(v)) => b.append_value(v),
            (TypedBuilder::Int64(b), Cell::Int64(v)) => b.append_value(v),
            (TypedBuilder::Float32(b), Cell::Float32(v)) => b.append_value(v),
            (TypedBuilder::Float64(b), Cell::Float64(v)) => b.append_value(v),
            (TypedBuilder::Decimal(b), Cell::Decimal(v)) => b.append_value(v),
            (TypedBuilder::Text(b), Cell::Text(v)) => b.append_value(v),
            (TypedBuilder::Binary(b), Cell::Binary(v)) => b.append_value(v),
            (TypedBuilder::Date(b), Cell::Date(v)) => b.append_value(v),
            (TypedBuilder::Timestamp(b), Cell::Timestamp(v)) => b.append_value(v),
            (_, cell) => {
                return Err(ExportError::Encode(format!(
                    "column '{}' of type {} cannot hold {:?}",
                    self.descriptor.name, self.descriptor.column_type, cell
                )))
            }
        }
        Ok(())
    }

    /// Hand out the buffered values as an immutable array and empty the buffer
    pub fn drain(&mut self) -> ColumnSnapshot<'_> {
        let array = self.builder.finish();
        ColumnSnapshot {
            descriptor: &self.descriptor,
            array,
        }
    }

    /// Discard buffered values, keeping the descriptor
    pub fn clear(&mut self) {
        drop(self.builder.finish());
    }

    /// The type an inferred column has to switch to before it can hold `value`.
    ///
    /// A column that has buffered only nulls takes the value's own type; an
    /// integer column widens to float64 for a real value. Declared columns
    /// never change type.
    pub fn retype_for(&self, value: &SqlValue) -> Option<ColumnType> {
        if !self.descriptor.inferred {
            return None;
        }
        let current = self.descriptor.column_type;
        if self.non_null == 0 {
            return ColumnType::for_value(value).filter(|target| *target != current);
        }
        match (current, value) {
            (ColumnType::Int64, SqlValue::Real(_)) => Some(ColumnType::Float64),
            _ => None,
        }
    }

    /// Switch to `target`, carrying the buffered values over.
    ///
    /// Only all-null buffers and int64 → float64 can be carried; anything else
    /// is rejected before the buffer changes.
    pub fn retype(&mut self, target: ColumnType) -> ExportResult<()> {
        let current = self.descriptor.column_type;
        let widening = current == ColumnType::Int64 && target == ColumnType::Float64;
        if self.non_null > 0 && !widening {
            return Err(self.violation(format!(
                "cannot change type from {} to {}",
                current, target
            )));
        }

        let mut builder = TypedBuilder::for_type(target)?;
        match (&mut self.builder, &mut builder) {
            (TypedBuilder::Int64(ints), TypedBuilder::Float64(floats)) => {
                let ints = ints.finish();
                for value in ints.iter() {
                    floats.append_option(value.map(|i| i as f64));
                }
            }
            (old, new) => {
                for _ in 0..old.builder().len() {
                    new.append_null();
                }
            }
        }

        self.builder = builder;
        self.descriptor.column_type = target;
        Ok(())
    }

    fn violation(&self, reason: impl Into<String>) -> ExportError {
        ExportError::violation(&self.descriptor.name, reason)
    }

    fn mismatch(&self, value: &SqlValue) -> ExportError {
        self.violation(format!(
            "{} value {:?} cannot be stored as {}",
            value.kind(),
            value,
            self.descriptor.column_type
        ))
    }

    fn to_boolean(&self, value: &SqlValue) -> ExportResult<bool> {
        match value {
            SqlValue::Boolean(b) => Ok(*b),
            SqlValue::Integer(i) => Ok(*i != 0),
            SqlValue::Text(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "t" | "yes" | "y" | "1" => Ok(true),
                "false" | "f" | "no" | "n" | "0" => Ok(false),
                _ => Err(self.mismatch(value)),
            },
            other => Err(self.mismatch(other)),
        }
    }

    fn to_i64(&self, value: &SqlValue) -> ExportResult<i64> {
        match value {
            SqlValue::Integer(i) => Ok(*i),
            SqlValue::Boolean(b) => Ok(i64::from(*b)),
            SqlValue::Real(f) if f.fract() == 0.0 && f.abs() < 9.2e18 => Ok(*f as i64),
            SqlValue::Text(s) => s.trim().parse().map_err(|_| self.mismatch(value)),
            other => Err(self.mismatch(other)),
        }
    }

    fn to_f64(&self, value: &SqlValue) -> ExportResult<f64> {
        match value {
            SqlValue::Real(f) => Ok(*f),
            SqlValue::Integer(i) => Ok(*i as f64),
            SqlValue::Text(s) => s.trim().parse().map_err(|_| self.mismatch(value)),
            other => Err(self.mismatch(other)),
        }
    }

    fn to_decimal(&self, value: &SqlValue, precision: u8, scale: i8) -> ExportResult<i128> {
        let unscaled = match value {
            SqlValue::Integer(i) => parse_decimal_to_i128(&i.to_string(), scale),
            SqlValue::Real(f) if f.is_finite() => parse_decimal_to_i128(&f.to_string(), scale),
            SqlValue::Text(s) => parse_decimal_to_i128(s.trim(), scale),
            other => return Err(self.mismatch(other)),
        }
        .map_err(|reason| self.violation(reason))?;

        let limit = 10_i128.pow(u32::from(precision));
        if unscaled.abs() >= limit {
            return Err(self.violation(format!(
                "{:?} exceeds decimal({}, {})",
                value, precision, scale
            )));
        }
        Ok(unscaled)
    }

    fn to_text<'a>(&self, value: &'a SqlValue) -> ExportResult<Cow<'a, str>> {
        Ok(match value {
            SqlValue::Text(s) => Cow::Borrowed(s.as_str()),
            SqlValue::Integer(i) => Cow::Owned(i.to_string()),
            SqlValue::Real(f) => Cow::Owned(f.to_string()),
            SqlValue::Boolean(b) => Cow::Owned(b.to_string()),
            SqlValue::Date(d) => Cow::Owned(d.format("%Y-%m-%d").to_string()),
            SqlValue::Timestamp(t) => Cow::Owned(t.format("%Y-%m-%d %H:%M:%S%.f").to_string()),
            SqlValue::Blob(bytes) => match std::str::from_utf8(bytes) {
                Ok(s) => Cow::Borrowed(s),
                Err(_) => return Err(self.mismatch(value)),
            },
            SqlValue::Null => return Err(self.mismatch(value)),
        })
    }

    fn to_date(&self, value: &SqlValue) -> ExportResult<NaiveDate> {
        match value {
            SqlValue::Date(d) => Ok(*d),
            SqlValue::Timestamp(t) => Ok(t.date()),
            // Unix epoch seconds
            SqlValue::Integer(secs) => DateTime::from_timestamp(*secs, 0)
                .map(|dt| dt.date_naive())
                .ok_or_else(|| self.mismatch(value)),
            // Julian day number
            SqlValue::Real(days) => julian_day_to_micros(*days)
                .and_then(DateTime::from_timestamp_micros)
                .map(|dt| dt.date_naive())
                .ok_or_else(|| self.mismatch(value)),
            SqlValue::Text(s) => {
                let s = s.trim();
                NaiveDate::parse_from_str(s, "%Y-%m-%d")
                    .ok()
                    .or_else(|| parse_timestamp(s).map(|t| t.date()))
                    .ok_or_else(|| self.mismatch(value))
            }
            other => Err(self.mismatch(other)),
        }
    }

    fn to_timestamp_micros(&self, value: &SqlValue) -> ExportResult<i64> {
        match value {
            SqlValue::Timestamp(t) => Ok(timestamp_to_micros(*t)),
            SqlValue::Date(d) => Ok(timestamp_to_micros(d.and_time(NaiveTime::MIN))),
            // Integer timestamps are Unix epoch seconds
            SqlValue::Integer(secs) => Ok(seconds_to_microseconds(*secs)),
            // Julian day number
            SqlValue::Real(days) => {
                julian_day_to_micros(*days).ok_or_else(|| self.mismatch(value))
            }
            SqlValue::Text(s) => parse_timestamp(s.trim())
                .map(timestamp_to_micros)
                .ok_or_else(|| self.mismatch(value)),
            other => Err(self.mismatch(other)),
        }
    }
}

/// Parse a timestamp in one of the accepted text layouts.
///
/// Values carrying an offset are normalized to UTC; a bare date is midnight.
fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.naive_utc());
    }
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .map(|d| d.and_time(NaiveTime::MIN))
        })
}

/// Parse a decimal string ("123", "-1.50") into an unscaled i128 at `scale`.
///
/// Fractional digits beyond `scale` are truncated.
fn parse_decimal_to_i128(value_str: &str, scale: i8) -> Result<i128, String> {
    let (integer_part, decimal_part) = match value_str.split_once('.') {
        Some((int, frac)) => (int, frac),
        None => (value_str, ""),
    };
    let negative = integer_part.starts_with('-');
    let digits = integer_part.trim_start_matches(['-', '+']);

    if (digits.is_empty() && decimal_part.is_empty())
        || !digits.bytes().all(|b| b.is_ascii_digit())
        || !decimal_part.bytes().all(|b| b.is_ascii_digit())
    {
        return Err(format!("invalid decimal '{}'", value_str));
    }

    let scale = u32::try_from(scale).map_err(|_| format!("negative scale {}", scale))?;
    let overflow = || format!("numeric overflow for value '{}'", value_str);

    let mut result: i128 = if digits.is_empty() {
        0
    } else {
        digits.parse().map_err(|_| overflow())?
    };
    result = result.checked_mul(10_i128.pow(scale)).ok_or_else(overflow)?;

    let taken = decimal_part.len().min(scale as usize);
    if taken > 0 {
        let fraction: i128 = decimal_part[..taken].parse().map_err(|_| overflow())?;
        let scaled = fraction * 10_i128.pow(scale - taken as u32);
        result = result.checked_add(scaled).ok_or_else(overflow)?;
    }

    Ok(if negative { -result } else { result })
}
