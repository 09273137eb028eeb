//! Storage layer: raw dataset tables in, artifact and report files out.

mod error;
pub use error::StoreError;

mod files;
pub use files::{read_bytes, write_atomic};

mod records;
pub use records::{load_records, records_from_batches};

mod tabular;
pub use tabular::{read_csv, read_parquet, read_table};
