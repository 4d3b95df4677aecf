//! In-memory row source

use crate::error::{ExportError, ExportResult};
use crate::source::types::{ColumnDescriptor, SqlValue};
use crate::source::RowSource;
use std::collections::VecDeque;

/// Row source over rows held in memory.
///
/// Useful wherever rows are produced without a database, and for driving the
/// export pipeline with exact schemas (including non-nullable columns).
#[derive(Debug)]
pub struct MemoryRowSource {
    schema: Vec<ColumnDescriptor>,
    pending: VecDeque<Vec<SqlValue>>,
    current: Option<Vec<SqlValue>>,
}

impl MemoryRowSource {
    pub fn new(schema: Vec<ColumnDescriptor>, rows: Vec<Vec<SqlValue>>) -> Self {
        Self {
            schema,
            pending: rows.into(),
            current: None,
        }
    }

    /// Rows not yet returned by `next_row`
    pub fn remaining(&self) -> usize {
        self.pending.len()
    }
}

impl RowSource for MemoryRowSource {
    fn column_schema(&self) -> &[ColumnDescriptor] {
        &self.schema
    }

    fn next_row(&mut self) -> ExportResult<bool> {
        self.current = self.pending.pop_front();
        Ok(self.current.is_some())
    }

    fn value_at(&self, ordinal: usize) -> ExportResult<&SqlValue> {
        let row = self
            .current
            .as_ref()
            .ok_or_else(|| ExportError::Query("no current row".into()))?;
        row.get(ordinal).ok_or_else(|| {
            ExportError::Query(format!(
                "column {} out of range for row of {} values",
                ordinal,
                row.len()
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::types::ColumnType;

    #[test]
    fn test_memory_source_iterates_once() {
        let schema = vec![ColumnDescriptor::new(0, "x", ColumnType::Int64, true)];
        let mut source = MemoryRowSource::new(
            schema,
            vec![vec![SqlValue::Integer(1)], vec![SqlValue::Null]],
        );

        assert!(source.value_at(0).is_err());
        assert!(source.next_row().unwrap());
        assert_eq!(source.value_at(0).unwrap(), &SqlValue::Integer(1));
        assert!(source.next_row().unwrap());
        assert!(source.value_at(0).unwrap().is_null());
        assert!(!source.next_row().unwrap());
        assert!(!source.next_row().unwrap());
        assert_eq!(source.remaining(), 0);
    }

    #[test]
    fn test_memory_source_ordinal_out_of_range() {
        let schema = vec![ColumnDescriptor::new(0, "x", ColumnType::Int64, true)];
        let mut source = MemoryRowSource::new(schema, vec![vec![SqlValue::Integer(1)]]);
        source.next_row().unwrap();
        assert!(matches!(source.value_at(3), Err(ExportError::Query(_))));
    }
}
