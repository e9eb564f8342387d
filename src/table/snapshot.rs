//! Parquet snapshots of a tabular view
//!
//! Lets a training set be frozen to disk and reloaded later without going
//! back to the document store.

use super::Table;
use crate::{Error, Result};
use arrow::record_batch::RecordBatch;
use std::fs::File;
use std::path::Path;

impl Table {
    /// Write the table to a Parquet file, replacing any existing file
    ///
    /// # Errors
    ///
    /// Returns `Storage` if the table has no columns or encoding fails, and
    /// `Io` if the file cannot be created
    pub fn write_parquet<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        use parquet::arrow::ArrowWriter;

        if self.num_columns() == 0 {
            return Err(Error::Storage(
                "Cannot snapshot a table without columns".to_string(),
            ));
        }

        let file = File::create(path.as_ref())?;

        let mut writer = ArrowWriter::try_new(file, self.batch.schema(), None)
            .map_err(|e| Error::Storage(format!("Failed to create Parquet writer: {e}")))?;

        writer
            .write(&self.batch)
            .map_err(|e| Error::Storage(format!("Failed to write record batch: {e}")))?;

        writer
            .close()
            .map_err(|e| Error::Storage(format!("Failed to finalize Parquet file: {e}")))?;

        tracing::debug!(
            path = %path.as_ref().display(),
            rows = self.num_rows(),
            "wrote table snapshot"
        );
        Ok(())
    }

    /// Load a table from a Parquet file
    ///
    /// All row groups are concatenated into a single batch.
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or parsed
    pub fn read_parquet<P: AsRef<Path>>(path: P) -> Result<Self> {
        use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;

        let file = File::open(path.as_ref())
            .map_err(|e| Error::Storage(format!("Failed to open Parquet file: {e}")))?;

        let builder = ParquetRecordBatchReaderBuilder::try_new(file)
            .map_err(|e| Error::Storage(format!("Failed to parse Parquet file: {e}")))?;
        let schema = builder.schema().clone();

        let reader = builder
            .build()
            .map_err(|e| Error::Storage(format!("Failed to create Parquet reader: {e}")))?;

        let mut batches = Vec::new();
        for batch in reader {
            let batch = batch
                .map_err(|e| Error::Storage(format!("Failed to read record batch: {e}")))?;
            batches.push(batch);
        }

        let batch = if batches.is_empty() {
            RecordBatch::new_empty(schema)
        } else {
            arrow::compute::concat_batches(&schema, &batches)?
        };

        Ok(Self::from_batch(batch))
    }
}
