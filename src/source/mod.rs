//! Row sources
//!
//! A row source is a forward-only, single-pass cursor over a query's result
//! set. The export core only talks to the [`RowSource`] trait.
//!
//! # Module Structure
//!
//! - `types`: Column descriptors, column types and raw cell values
//! - `sqlite`: Row source over a rusqlite statement
//! - `memory`: Row source over rows held in memory

pub mod memory;
pub mod sqlite;
pub mod types;

pub use memory::MemoryRowSource;
pub use sqlite::{ConnectionConfig, Driver, SqliteRowSource};
pub use types::{ColumnDescriptor, ColumnType, SqlValue};

use crate::error::ExportResult;

/// Forward-only cursor over a result set
pub trait RowSource {
    /// Descriptors for every column, in ordinal order
    fn column_schema(&self) -> &[ColumnDescriptor];

    /// Advance to the next row. Returns `false` once the result set is exhausted.
    fn next_row(&mut self) -> ExportResult<bool>;

    /// Value of column `ordinal` in the current row
    fn value_at(&self, ordinal: usize) -> ExportResult<&SqlValue>;
}
