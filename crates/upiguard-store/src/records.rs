//! Extraction of [`RawRecord`]s from dataset tables.

use arrow::array::{Array, StringArray};
use arrow::compute::cast;
use arrow::datatypes::DataType;
use arrow::record_batch::RecordBatch;
use tracing::info;
use upiguard_core::{RawRecord, SourceSpec};

use crate::{StoreError, read_table};

/// Read the source file described by `spec` and return its raw rows.
///
/// Only the text and label columns are read. Label normalization is left to
/// the caller.
pub fn load_records(spec: &SourceSpec) -> Result<Vec<RawRecord>, StoreError> {
    let columns = [spec.text_column.as_str(), spec.label_column.as_str()];
    let batches = read_table(&spec.path, &columns)?;
    let records = records_from_batches(&batches, &spec.text_column, &spec.label_column)?;
    info!(
        source = %spec.name,
        path = %spec.path.display(),
        rows = records.len(),
        "loaded raw records"
    );
    Ok(records)
}

/// Build raw records from Arrow batches.
///
/// Both columns are cast to Utf8 first, so numeric label columns (Parquet
/// `Int64`, for example) arrive as their decimal text.
pub fn records_from_batches(
    batches: &[RecordBatch],
    text_column: &str,
    label_column: &str,
) -> Result<Vec<RawRecord>, StoreError> {
    let total: usize = batches.iter().map(|b| b.num_rows()).sum();
    let mut records = Vec::with_capacity(total);

    for batch in batches {
        let texts = utf8_column(batch, text_column)?;
        let labels = utf8_column(batch, label_column)?;
        for row in 0..batch.num_rows() {
            records.push(RawRecord {
                text: get_string(&texts, row),
                source_label: get_string(&labels, row),
            });
        }
    }

    Ok(records)
}

fn utf8_column(batch: &RecordBatch, name: &str) -> Result<StringArray, StoreError> {
    let col = batch
        .column_by_name(name)
        .ok_or_else(|| StoreError::MissingColumn(name.to_string()))?;
    let as_text = cast(col.as_ref(), &DataType::Utf8)?;
    as_text
        .as_any()
        .downcast_ref::<StringArray>()
        .cloned()
        .ok_or_else(|| StoreError::MissingColumn(name.to_string()))
}

fn get_string(col: &StringArray, row: usize) -> Option<String> {
    if col.is_null(row) {
        return None;
    }
    Some(col.value(row).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{Float64Array, LargeStringArray};
    use arrow::datatypes::{Field, Schema};
    use std::sync::Arc;
    use tempfile::TempDir;
    use upiguard_core::{Label, LabelScheme};

    #[test]
    fn numeric_labels_arrive_as_text() {
        let schema = Schema::new(vec![
            Field::new("URL", DataType::LargeUtf8, true),
            Field::new("label", DataType::Float64, true),
        ]);
        let batch = RecordBatch::try_new(
            Arc::new(schema),
            vec![
                Arc::new(LargeStringArray::from(vec![
                    Some("https://a.test"),
                    None,
                    Some("https://c.test"),
                ])),
                Arc::new(Float64Array::from(vec![Some(1.0), Some(0.0), None])),
            ],
        )
        .unwrap();

        let records = records_from_batches(&[batch], "URL", "label").unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].text.as_deref(), Some("https://a.test"));
        assert_eq!(
            LabelScheme::Binary.label_for(records[0].source_label.as_deref().unwrap()),
            Some(Label::Fraud)
        );
        assert_eq!(records[1].text, None);
        assert_eq!(records[2].source_label, None);
    }

    #[test]
    fn missing_column_in_batch_errors() {
        let schema = Schema::new(vec![Field::new("url", DataType::Utf8, true)]);
        let batch = RecordBatch::try_new(
            Arc::new(schema),
            vec![Arc::new(StringArray::from(vec!["https://a.test"]))],
        )
        .unwrap();
        let result = records_from_batches(&[batch], "url", "label");
        assert!(matches!(result, Err(StoreError::MissingColumn(_))));
    }

    #[test]
    fn load_records_from_csv_source() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(
            tmp.path().join("malicious_phish.csv"),
            "url,type\nbr-icloud.com.br,phishing\n\
             mp3raid.com/music/krizz_kaliko.html,benign\n,malware\n",
        )
        .unwrap();

        let spec = SourceSpec::malicious_phish(tmp.path());
        let records = load_records(&spec).unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].source_label.as_deref(), Some("phishing"));

        let samples: Vec<_> = records
            .iter()
            .filter_map(|r| spec.scheme.normalize(r))
            .collect();
        assert_eq!(samples.len(), 2, "blank url row is dropped");
        assert_eq!(samples[0].label(), Label::Fraud);
        assert_eq!(samples[1].label(), Label::Genuine);
    }

    #[test]
    fn load_records_missing_file() {
        let spec = SourceSpec::phiusiil(std::path::Path::new("/nonexistent"));
        assert!(matches!(load_records(&spec), Err(StoreError::NotFound(_))));
    }
}
