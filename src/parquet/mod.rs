//! Columnar output
//!
//! Turns rows from a row source into Parquet row groups.
//!
//! # Module Structure
//!
//! - `schema`: Arrow schema derived from column descriptors
//! - `column`: Typed column buffers and value conversion
//! - `batch`: Ordinal-indexed row batch with row-group flushing
//! - `sink`: Columnar sink trait and the Parquet file sink

pub mod batch;
pub mod column;
pub mod schema;
pub mod sink;

pub use batch::{RowBatch, ROW_GROUP_SIZE};
pub use column::{ColumnBuffer, ColumnSnapshot};
pub use schema::{arrow_schema, arrow_schema_ref};
pub use sink::{ColumnarSink, ParquetSink};
