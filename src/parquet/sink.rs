//! Columnar sinks
//!
//! A sink receives whole row groups as Arrow record batches. [`ParquetSink`]
//! writes them to a Parquet file with GZIP compression, one row group per
//! `write_row_group` call.

use crate::error::{ExportError, ExportResult};
use crate::parquet::batch::ROW_GROUP_SIZE;
use arrow::datatypes::SchemaRef;
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;
use parquet::basic::{Compression, GzipLevel};
use parquet::file::properties::{EnabledStatistics, WriterProperties};
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Destination for row groups
pub trait ColumnarSink {
    /// Write `batch` as exactly one row group
    fn write_row_group(&mut self, batch: RecordBatch) -> ExportResult<()>;

    /// Row groups written so far
    fn row_groups(&self) -> usize;

    /// Finish the output. Nothing may be written afterwards.
    fn close(self) -> ExportResult<()>
    where
        Self: Sized;
}

/// Build Parquet writer properties with GZIP compression and column statistics.
pub fn writer_properties() -> WriterProperties {
    WriterProperties::builder()
        .set_compression(Compression::GZIP(GzipLevel::default()))
        .set_statistics_enabled(EnabledStatistics::Chunk)
        .set_max_row_group_size(ROW_GROUP_SIZE)
        .build()
}

/// Parquet file sink.
///
/// The file is created up front; the Arrow writer opens on the first row group
/// so it takes that batch's schema. A sink closed without row groups writes the
/// schema it was created with.
pub struct ParquetSink {
    file: Option<File>,
    writer: Option<ArrowWriter<File>>,
    schema: SchemaRef,
    path: PathBuf,
    row_groups: usize,
}

impl ParquetSink {
    /// Create (or truncate) `path` for output with `schema`
    pub fn create(path: &Path, schema: SchemaRef) -> ExportResult<Self> {
        let file = File::create(path).map_err(|e| ExportError::io(path, e))?;
        Ok(Self {
            file: Some(file),
            writer: None,
            schema,
            path: path.to_path_buf(),
            row_groups: 0,
        })
    }

    fn writer(&mut self, schema: SchemaRef) -> ExportResult<&mut ArrowWriter<File>> {
        if self.writer.is_none() {
            let file = self
                .file
                .take()
                .ok_or_else(|| ExportError::Encode("parquet sink has no open file".into()))?;
            if schema != self.schema {
                debug!(path = %self.path.display(), "Writing with widened schema");
            }
            self.writer = Some(ArrowWriter::try_new(file, schema, Some(writer_properties()))?);
        }
        self.writer
            .as_mut()
            .ok_or_else(|| ExportError::Encode("parquet sink has no open file".into()))
    }
}

impl ColumnarSink for ParquetSink {
    fn write_row_group(&mut self, batch: RecordBatch) -> ExportResult<()> {
        let rows = batch.num_rows();
        let writer = self.writer(batch.schema())?;
        writer.write(&batch)?;
        // Force the buffered rows out as their own row group
        writer.flush()?;
        self.row_groups += 1;
        debug!(path = %self.path.display(), rows, row_group = self.row_groups, "Row group written");
        Ok(())
    }

    fn row_groups(&self) -> usize {
        self.row_groups
    }

    fn close(mut self) -> ExportResult<()> {
        // An empty result still gets a footer with the declared schema
        let schema = self.schema.clone();
        self.writer(schema)?;
        let writer = self
            .writer
            .take()
            .ok_or_else(|| ExportError::Encode("parquet sink has no open file".into()))?;
        let metadata = writer.close()?;
        debug!(
            path = %self.path.display(),
            rows = metadata.num_rows,
            row_groups = metadata.row_groups.len(),
            "Parquet footer written"
        );
        Ok(())
    }
}

/// Collects row groups in memory
impl ColumnarSink for Vec<RecordBatch> {
    fn write_row_group(&mut self, batch: RecordBatch) -> ExportResult<()> {
        self.push(batch);
        Ok(())
    }

    fn row_groups(&self) -> usize {
        self.len()
    }

    fn close(self) -> ExportResult<()> {
        Ok(())
    }
}
