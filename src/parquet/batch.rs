//! Row batches
//!
//! A [`RowBatch`] holds one [`ColumnBuffer`] per result column, indexed by
//! ordinal. Rows go in one at a time; a flush drains every buffer into a single
//! record batch, hands it to the sink as one row group, and leaves the buffers
//! empty for the next group.
//!
//! Columns whose type was inferred from data may still change type until the
//! first row group is written: an all-null column takes the type of its first
//! value, and an integer column widens to float64 when a real value arrives.
//! After that the file schema is fixed and values must convert to it.

use crate::error::{ExportError, ExportResult};
use crate::parquet::column::{Cell, ColumnBuffer};
use crate::parquet::schema::arrow_schema_ref;
use crate::parquet::sink::ColumnarSink;
use crate::source::types::ColumnDescriptor;
use crate::source::RowSource;
use arrow::array::ArrayRef;
use arrow::datatypes::SchemaRef;
use arrow::record_batch::RecordBatch;
use tracing::debug;

/// Rows buffered before a row group is flushed
pub const ROW_GROUP_SIZE: usize = 50_000;

/// Ordinal-indexed column buffers for one query
pub struct RowBatch {
    schema: SchemaRef,
    buffers: Vec<ColumnBuffer>,
    rows: usize,
    flushed: bool,
}

impl RowBatch {
    /// Build one buffer per column.
    ///
    /// Ordinals must be unique and cover `0..descriptors.len()`; they may
    /// arrive in any order.
    pub fn from_schema(descriptors: &[ColumnDescriptor]) -> ExportResult<Self> {
        if descriptors.is_empty() {
            return Err(ExportError::InvalidSchema(
                "result set has no columns".into(),
            ));
        }

        let mut ordered: Vec<&ColumnDescriptor> = descriptors.iter().collect();
        ordered.sort_by_key(|d| d.ordinal);
        for (expected, descriptor) in ordered.iter().enumerate() {
            if descriptor.ordinal != expected {
                return Err(ExportError::violation(
                    &descriptor.name,
                    format!(
                        "ordinal {} is duplicated or out of sequence (expected {})",
                        descriptor.ordinal, expected
                    ),
                ));
            }
        }

        let ordered: Vec<ColumnDescriptor> = ordered.into_iter().cloned().collect();
        let buffers = ordered
            .iter()
            .cloned()
            .map(ColumnBuffer::for_descriptor)
            .collect::<ExportResult<Vec<_>>>()?;

        Ok(Self {
            schema: arrow_schema_ref(&ordered),
            buffers,
            rows: 0,
            flushed: false,
        })
    }

    pub fn schema(&self) -> SchemaRef {
        self.schema.clone()
    }

    /// Rows buffered since the last flush
    pub fn row_count(&self) -> usize {
        self.rows
    }

    pub fn is_full(&self) -> bool {
        self.rows >= ROW_GROUP_SIZE
    }

    /// Append the source's current row.
    ///
    /// Every value is converted before any buffer is touched, so a rejected
    /// value leaves the buffered rows exactly as they were.
    pub fn add_row<S: RowSource + ?Sized>(&mut self, source: &S) -> ExportResult<()> {
        if !self.flushed {
            self.retype_columns(source)?;
        }

        let mut cells: Vec<Cell<'_>> = Vec::with_capacity(self.buffers.len());
        for (ordinal, buffer) in self.buffers.iter().enumerate() {
            cells.push(buffer.convert(source.value_at(ordinal)?)?);
        }
        for (buffer, cell) in self.buffers.iter_mut().zip(cells) {
            buffer.push(cell)?;
        }
        self.rows += 1;
        Ok(())
    }

    /// Widen inferred columns that cannot hold the current row's values.
    fn retype_columns<S: RowSource + ?Sized>(&mut self, source: &S) -> ExportResult<()> {
        let mut changed = false;
        for (ordinal, buffer) in self.buffers.iter_mut().enumerate() {
            let value = source.value_at(ordinal)?;
            if let Some(target) = buffer.retype_for(value) {
                debug!(
                    column = %buffer.descriptor().name,
                    from = %buffer.descriptor().column_type,
                    to = %target,
                    "Changing inferred column type"
                );
                buffer.retype(target)?;
                changed = true;
            }
        }

        if changed {
            let descriptors: Vec<ColumnDescriptor> = self
                .buffers
                .iter()
                .map(|buffer| buffer.descriptor().clone())
                .collect();
            self.schema = arrow_schema_ref(&descriptors);
        }
        Ok(())
    }

    /// Write buffered rows as one row group.
    ///
    /// Returns the number of rows written; zero (and no row group) when the
    /// batch is empty.
    pub fn flush<K: ColumnarSink + ?Sized>(&mut self, sink: &mut K) -> ExportResult<usize> {
        if self.rows == 0 {
            return Ok(0);
        }

        let columns: Vec<ArrayRef> = self
            .buffers
            .iter_mut()
            .map(|buffer| buffer.drain().array)
            .collect();
        let rows = std::mem::take(&mut self.rows);

        let batch = RecordBatch::try_new(self.schema.clone(), columns)?;
        self.flushed = true;
        sink.write_row_group(batch)?;
        Ok(rows)
    }

    /// Discard buffered rows
    pub fn clear(&mut self) {
        for buffer in &mut self.buffers {
            buffer.clear();
        }
        self.rows = 0;
    }
}
