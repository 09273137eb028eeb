//! Readers for raw dataset files.
//!
//! Sources arrive as CSV (the public URL datasets) or Parquet. Both are read
//! into Arrow RecordBatches restricted to the requested columns. CSV columns
//! are always read as Utf8: a label column can be numeric in one file and a
//! category name in another, and normalization works on the text form.

use std::fs::File;
use std::io::Seek;
use std::path::Path;
use std::sync::Arc;

use arrow::csv::ReaderBuilder;
use arrow::csv::reader::Format;
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use parquet::arrow::ProjectionMask;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use tracing::debug;

use crate::StoreError;

const CSV_BATCH_SIZE: usize = 8192;

/// Read `columns` from a `.csv` or `.parquet` file, chosen by extension.
pub fn read_table(path: &Path, columns: &[&str]) -> Result<Vec<RecordBatch>, StoreError> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match ext.as_deref() {
        Some("csv") => read_csv(path, columns),
        Some("parquet") | Some("pq") => read_parquet(path, columns),
        _ => Err(StoreError::UnsupportedFormat(path.to_path_buf())),
    }
}

/// Read `columns` of a headered CSV file as Utf8 arrays.
pub fn read_csv(path: &Path, columns: &[&str]) -> Result<Vec<RecordBatch>, StoreError> {
    if !path.exists() {
        return Err(StoreError::NotFound(path.to_path_buf()));
    }
    let mut file = File::open(path)?;

    // Only the header matters; every column is forced to Utf8 below.
    let (inferred, _) = Format::default()
        .with_header(true)
        .infer_schema(&mut file, Some(1))?;
    file.rewind()?;

    let schema = Schema::new(
        inferred
            .fields()
            .iter()
            .map(|f| Field::new(f.name(), DataType::Utf8, true))
            .collect::<Vec<_>>(),
    );
    let projection = column_indices(&schema, columns)?;

    let reader = ReaderBuilder::new(Arc::new(schema))
        .with_header(true)
        .with_batch_size(CSV_BATCH_SIZE)
        .with_projection(projection)
        .build(file)?;
    let batches: Result<Vec<RecordBatch>, _> = reader.collect();
    let batches = batches?;
    debug!(path = %path.display(), batches = batches.len(), "read csv");
    Ok(batches)
}

/// Read `columns` of a Parquet file into Arrow RecordBatches.
pub fn read_parquet(path: &Path, columns: &[&str]) -> Result<Vec<RecordBatch>, StoreError> {
    if !path.exists() {
        return Err(StoreError::NotFound(path.to_path_buf()));
    }
    let file = File::open(path)?;
    let builder = ParquetRecordBatchReaderBuilder::try_new(file)?;
    let indices = column_indices(builder.schema(), columns)?;
    let mask = ProjectionMask::roots(builder.parquet_schema(), indices);
    let reader = builder.with_projection(mask).build()?;
    let batches: Result<Vec<RecordBatch>, _> = reader.collect();
    let batches = batches?;
    debug!(path = %path.display(), batches = batches.len(), "read parquet");
    Ok(batches)
}

fn column_indices(schema: &Schema, columns: &[&str]) -> Result<Vec<usize>, StoreError> {
    let mut indices = columns
        .iter()
        .map(|name| {
            schema
                .index_of(name)
                .map_err(|_| StoreError::MissingColumn(name.to_string()))
        })
        .collect::<Result<Vec<_>, _>>()?;
    // Projections are applied in file order.
    indices.sort_unstable();
    indices.dedup();
    Ok(indices)
}
