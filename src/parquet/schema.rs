//! Arrow schema derived from result-set metadata
//!
//! One field per column descriptor, in ordinal order, plus the time helpers
//! shared by the column buffers.

use crate::source::types::ColumnDescriptor;
use arrow::datatypes::{Field, Schema, SchemaRef};
use chrono::{Datelike, NaiveDate, NaiveDateTime};
use std::sync::Arc;

/// Days from 0001-01-01 (CE) to 1970-01-01
const UNIX_EPOCH_DAYS_FROM_CE: i32 = 719_163;

/// Build the Arrow field for one column
pub fn arrow_field(descriptor: &ColumnDescriptor) -> Field {
    Field::new(
        &descriptor.name,
        descriptor.column_type.arrow_type(),
        descriptor.nullable,
    )
}

/// Build the Arrow schema for a result set.
///
/// `descriptors` must already be in ordinal order.
pub fn arrow_schema(descriptors: &[ColumnDescriptor]) -> Schema {
    Schema::new(descriptors.iter().map(arrow_field).collect::<Vec<_>>())
}

/// Get the schema wrapped in an Arc (for Arrow writer APIs).
pub fn arrow_schema_ref(descriptors: &[ColumnDescriptor]) -> SchemaRef {
    Arc::new(arrow_schema(descriptors))
}

/// Convert seconds (epoch) to microseconds.
pub fn seconds_to_microseconds(secs: i64) -> i64 {
    secs.saturating_mul(1_000_000)
}

/// Julian day number of 1970-01-01T00:00:00 UTC
const UNIX_EPOCH_JULIAN_DAY: f64 = 2_440_587.5;

const MICROS_PER_DAY: f64 = 86_400_000_000.0;

/// Microseconds since the Unix epoch for a Julian day number, as SQLite's
/// `julianday()` produces. `None` when out of range.
pub fn julian_day_to_micros(days: f64) -> Option<i64> {
    let micros = ((days - UNIX_EPOCH_JULIAN_DAY) * MICROS_PER_DAY).round();
    (micros.is_finite() && micros.abs() < 9.2e18).then_some(micros as i64)
}

/// Days since the Unix epoch, as stored in Date32 columns
pub fn date_to_days(date: NaiveDate) -> i32 {
    date.num_days_from_ce() - UNIX_EPOCH_DAYS_FROM_CE
}

/// Microseconds since the Unix epoch, treating `ts` as UTC
pub fn timestamp_to_micros(ts: NaiveDateTime) -> i64 {
    ts.and_utc().timestamp_micros()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::types::ColumnType;
    use arrow::datatypes::DataType;

    fn descriptors() -> Vec<ColumnDescriptor> {
        vec![
            ColumnDescriptor::new(0, "id", ColumnType::Int64, false),
            ColumnDescriptor::new(1, "name", ColumnType::Text, true),
            ColumnDescriptor::new(
                2,
                "amount",
                ColumnType::Decimal {
                    precision: 12,
                    scale: 2,
                },
                true,
            ),
        ]
    }

    #[test]
    fn test_schema_field_names() {
        let schema = arrow_schema(&descriptors());
        let names: Vec<&str> = schema.fields().iter().map(|f| f.name().as_str()).collect();
        assert_eq!(names, vec!["id", "name", "amount"]);
    }

    #[test]
    fn test_schema_nullable_fields() {
        let schema = arrow_schema_ref(&descriptors());
        assert!(!schema.field(0).is_nullable());
        assert!(schema.field(1).is_nullable());
        assert_eq!(schema.field(2).data_type(), &DataType::Decimal128(12, 2));
    }

    #[test]
    fn test_seconds_to_microseconds() {
        assert_eq!(seconds_to_microseconds(0), 0);
        assert_eq!(seconds_to_microseconds(1), 1_000_000);
        assert_eq!(seconds_to_microseconds(1234567890), 1234567890_000_000);
        // Saturating: no overflow
        assert_eq!(seconds_to_microseconds(i64::MAX), i64::MAX);
    }

    #[test]
    fn test_julian_day_to_micros() {
        assert_eq!(julian_day_to_micros(2_440_587.5), Some(0));
        // 2023-11-15T00:00:00Z
        assert_eq!(
            julian_day_to_micros(2_460_263.5),
            Some(1_700_006_400_000_000)
        );
        assert_eq!(julian_day_to_micros(f64::NAN), None);
        assert_eq!(julian_day_to_micros(1e300), None);
    }

    #[test]
    fn test_date_to_days() {
        let epoch = NaiveDate::from_ymd_opt(1970, 1, 1).unwrap();
        assert_eq!(date_to_days(epoch), 0);
        let later = NaiveDate::from_ymd_opt(2024, 2, 29).unwrap();
        assert_eq!(date_to_days(later), 19782);
        let before = NaiveDate::from_ymd_opt(1969, 12, 31).unwrap();
        assert_eq!(date_to_days(before), -1);
    }

    #[test]
    fn test_timestamp_to_micros() {
        let ts = NaiveDate::from_ymd_opt(1970, 1, 1)
            .unwrap()
            .and_hms_micro_opt(0, 0, 1, 500)
            .unwrap();
        assert_eq!(timestamp_to_micros(ts), 1_000_500);
    }
}
