//! The trained model bundle and its Arrow IPC encoding.
//!
//! An artifact is one IPC file holding a single record batch. Row `i`
//! describes feature index `i`:
//!
//! | column   | type    |
//! |----------|---------|
//! | `ngram`  | Utf8    |
//! | `idf`    | Float64 |
//! | `weight` | Float64 |
//!
//! Everything else lives in schema metadata under the `upiguard.` prefix.
//! Scalars that must survive bit-exactly (bias, thresholds) are stored as
//! hex IEEE-754 bit patterns.

use std::collections::HashMap;
use std::io::Cursor;
use std::str::FromStr;
use std::sync::Arc;

use arrow::array::{Array, ArrayRef, Float64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::ipc::reader::FileReader;
use arrow::ipc::writer::FileWriter;
use arrow::record_batch::RecordBatch;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use upiguard_core::{ClassificationResult, Label};

use crate::calibrate::ThresholdPolicy;
use crate::error::ArtifactError;
use crate::features::FeatureSpace;
use crate::trainer::ScoringModel;

pub const FORMAT_VERSION: u32 = 1;

const NGRAM: &str = "ngram";
const IDF: &str = "idf";
const WEIGHT: &str = "weight";

const KEY_VERSION: &str = "upiguard.format_version";
const KEY_CLASS_ORDER: &str = "upiguard.class_order";
const KEY_BIAS: &str = "upiguard.bias";
const KEY_HARD: &str = "upiguard.hard_threshold";
const KEY_SOFT: &str = "upiguard.soft_threshold";
const KEY_MIN_N: &str = "upiguard.ngram_min";
const KEY_MAX_N: &str = "upiguard.ngram_max";
const KEY_TRAINED_AT: &str = "upiguard.trained_at";
const KEY_TRAIN_ROWS: &str = "upiguard.train_rows";
const KEY_EVAL_ROWS: &str = "upiguard.eval_rows";
const KEY_SEED: &str = "upiguard.seed";
const KEY_TARGET_PRECISION: &str = "upiguard.target_precision";
const KEY_DEGRADED: &str = "upiguard.calibration_degraded";

type Metadata = HashMap<String, String>;

/// Audit information recorded alongside the model.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArtifactInfo {
    pub format_version: u32,
    pub trained_at: DateTime<Utc>,
    pub train_rows: usize,
    pub eval_rows: usize,
    pub seed: u64,
    pub target_precision: f64,
    pub calibration_degraded: bool,
}

/// Immutable bundle consumed by inference.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelArtifact {
    features: FeatureSpace,
    model: ScoringModel,
    thresholds: ThresholdPolicy,
    info: ArtifactInfo,
}

impl ModelArtifact {
    pub fn new(
        features: FeatureSpace,
        model: ScoringModel,
        thresholds: ThresholdPolicy,
        info: ArtifactInfo,
    ) -> Result<Self, ArtifactError> {
        if features.len() != model.n_features() {
            return Err(ArtifactError::Parameters(format!(
                "{} features but {} weights",
                features.len(),
                model.n_features()
            )));
        }
        Ok(Self {
            features,
            model,
            thresholds,
            info,
        })
    }

    pub fn features(&self) -> &FeatureSpace {
        &self.features
    }

    pub fn model(&self) -> &ScoringModel {
        &self.model
    }

    pub fn thresholds(&self) -> &ThresholdPolicy {
        &self.thresholds
    }

    pub fn info(&self) -> &ArtifactInfo {
        &self.info
    }

    pub fn class_order(&self) -> [Label; 2] {
        self.model.class_order()
    }

    pub fn classify(&self, text: Option<&str>) -> ClassificationResult {
        crate::engine::classify(text, self)
    }

    /// The `limit` n-grams pushing hardest towards fraud and towards
    /// genuine, strongest first.
    pub fn top_ngrams(&self, limit: usize) -> (Vec<(&str, f64)>, Vec<(&str, f64)>) {
        let mut ranked: Vec<(&str, f64)> = self
            .features
            .terms()
            .iter()
            .map(String::as_str)
            .zip(self.model.weights().iter().copied())
            .collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(b.0)));
        let fraud = ranked
            .iter()
            .take(limit)
            .filter(|(_, w)| *w > 0.0)
            .copied()
            .collect();
        let genuine = ranked
            .iter()
            .rev()
            .take(limit)
            .filter(|(_, w)| *w < 0.0)
            .copied()
            .collect();
        (fraud, genuine)
    }
}

/// Encode an artifact as Arrow IPC file bytes.
pub fn save(artifact: &ModelArtifact) -> Result<Vec<u8>, ArtifactError> {
    let features = &artifact.features;
    let (min_n, max_n) = features.ngram_range();
    let info = &artifact.info;
    let class_order = artifact.class_order().map(|l| l.as_str()).join(",");
    let trained_at = info.trained_at.to_rfc3339_opts(SecondsFormat::Nanos, true);

    let metadata: Metadata = [
        (KEY_VERSION, FORMAT_VERSION.to_string()),
        (KEY_CLASS_ORDER, class_order),
        (KEY_BIAS, encode_f64(artifact.model.bias())),
        (KEY_HARD, encode_f64(artifact.thresholds.hard())),
        (KEY_SOFT, encode_f64(artifact.thresholds.soft())),
        (KEY_MIN_N, min_n.to_string()),
        (KEY_MAX_N, max_n.to_string()),
        (KEY_TRAINED_AT, trained_at),
        (KEY_TRAIN_ROWS, info.train_rows.to_string()),
        (KEY_EVAL_ROWS, info.eval_rows.to_string()),
        (KEY_SEED, info.seed.to_string()),
        (KEY_TARGET_PRECISION, encode_f64(info.target_precision)),
        (KEY_DEGRADED, info.calibration_degraded.to_string()),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect();

    let schema = Arc::new(Schema::new_with_metadata(
        vec![
            Field::new(NGRAM, DataType::Utf8, false),
            Field::new(IDF, DataType::Float64, false),
            Field::new(WEIGHT, DataType::Float64, false),
        ],
        metadata,
    ));
    let columns: Vec<ArrayRef> = vec![
        Arc::new(StringArray::from_iter_values(features.terms())),
        Arc::new(Float64Array::from(features.idf().to_vec())),
        Arc::new(Float64Array::from(artifact.model.weights().to_vec())),
    ];
    let batch = RecordBatch::try_new(schema.clone(), columns)?;

    let mut bytes = Vec::new();
    {
        let mut writer = FileWriter::try_new(&mut bytes, &schema)?;
        writer.write(&batch)?;
        writer.finish()?;
    }
    Ok(bytes)
}

/// Decode and validate an artifact. Any failure rejects the whole artifact.
pub fn load(bytes: &[u8]) -> Result<ModelArtifact, ArtifactError> {
    let reader = FileReader::try_new(Cursor::new(bytes), None)?;
    let schema = reader.schema();
    let meta = schema.metadata();

    let version: u32 = parse(meta, KEY_VERSION)?;
    if version != FORMAT_VERSION {
        return Err(ArtifactError::UnsupportedVersion(version));
    }

    let mut terms = Vec::new();
    let mut idf = Vec::new();
    let mut weights = Vec::new();
    for batch in reader {
        let batch = batch?;
        let ngrams = column::<StringArray>(&batch, NGRAM, DataType::Utf8)?;
        // Null-free, checked by `column`.
        terms.extend(ngrams.iter().flatten().map(str::to_string));
        let idf_col = column::<Float64Array>(&batch, IDF, DataType::Float64)?;
        idf.extend(idf_col.values().iter().copied());
        let weight_col = column::<Float64Array>(&batch, WEIGHT, DataType::Float64)?;
        weights.extend(weight_col.values().iter().copied());
    }
    if let Some(pos) = weights.iter().position(|w| !w.is_finite()) {
        return Err(ArtifactError::Parameters(format!(
            "weight at index {pos} is not finite"
        )));
    }

    let bias = decode_f64(meta, KEY_BIAS)?;
    if !bias.is_finite() {
        return Err(ArtifactError::Parameters(format!(
            "bias {bias} is not finite"
        )));
    }
    let class_order = parse_class_order(meta)?;
    let (hard, soft) = (decode_f64(meta, KEY_HARD)?, decode_f64(meta, KEY_SOFT)?);
    let thresholds = ThresholdPolicy::new(hard, soft)?;
    let (min_n, max_n) = (parse(meta, KEY_MIN_N)?, parse(meta, KEY_MAX_N)?);
    let features = FeatureSpace::from_parts(terms, idf, min_n, max_n)
        .map_err(ArtifactError::Vocabulary)?;
    let model = ScoringModel::from_parts(weights, bias, class_order);

    let trained_at = DateTime::parse_from_rfc3339(lookup(meta, KEY_TRAINED_AT)?)
        .map_err(|_| malformed(meta, KEY_TRAINED_AT))?
        .with_timezone(&Utc);
    let info = ArtifactInfo {
        format_version: version,
        trained_at,
        train_rows: parse(meta, KEY_TRAIN_ROWS)?,
        eval_rows: parse(meta, KEY_EVAL_ROWS)?,
        seed: parse(meta, KEY_SEED)?,
        target_precision: decode_f64(meta, KEY_TARGET_PRECISION)?,
        calibration_degraded: parse(meta, KEY_DEGRADED)?,
    };

    ModelArtifact::new(features, model, thresholds, info)
}

fn column<'a, T: Array + 'static>(
    batch: &'a RecordBatch,
    name: &str,
    expected: DataType,
) -> Result<&'a T, ArtifactError> {
    let col = batch
        .column_by_name(name)
        .ok_or_else(|| ArtifactError::Schema(format!("missing column {name:?}")))?;
    if col.data_type() != &expected {
        return Err(ArtifactError::Schema(format!(
            "column {name:?} is {}, expected {expected}",
            col.data_type()
        )));
    }
    if col.null_count() > 0 {
        return Err(ArtifactError::Schema(format!(
            "column {name:?} contains nulls"
        )));
    }
    let typed = col.as_any().downcast_ref::<T>();
    typed.ok_or_else(|| {
        ArtifactError::Schema(format!("column {name:?} has an unexpected type"))
    })
}

fn lookup<'a>(meta: &'a Metadata, key: &'static str) -> Result<&'a str, ArtifactError> {
    let value = meta.get(key).map(String::as_str);
    value.ok_or(ArtifactError::MissingMetadata(key))
}

fn malformed(meta: &Metadata, key: &'static str) -> ArtifactError {
    ArtifactError::BadMetadata {
        key,
        value: meta.get(key).cloned().unwrap_or_default(),
    }
}

fn parse<T: FromStr>(meta: &Metadata, key: &'static str) -> Result<T, ArtifactError> {
    let raw = lookup(meta, key)?;
    raw.parse().map_err(|_| malformed(meta, key))
}

fn encode_f64(value: f64) -> String {
    format!("{:016x}", value.to_bits())
}

fn decode_f64(meta: &Metadata, key: &'static str) -> Result<f64, ArtifactError> {
    let raw = lookup(meta, key)?;
    if raw.len() != 16 {
        return Err(malformed(meta, key));
    }
    u64::from_str_radix(raw, 16)
        .map(f64::from_bits)
        .map_err(|_| malformed(meta, key))
}

fn parse_class_order(meta: &Metadata) -> Result<[Label; 2], ArtifactError> {
    let raw = lookup(meta, KEY_CLASS_ORDER)?;
    let labels: Vec<Label> = raw
        .split(',')
        .map(str::parse)
        .collect::<Result<_, _>>()
        .map_err(|_| malformed(meta, KEY_CLASS_ORDER))?;
    match labels.as_slice() {
        &[a, b] if a != b => Ok([a, b]),
        _ => Err(malformed(meta, KEY_CLASS_ORDER)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::FeatureConfig;

    fn artifact() -> ModelArtifact {
        let texts = [
            "upi://pay?pa=kyc@okaxis",
            "https://paytm.com/recharge",
            "upi://pay?pa=kyc@ybl",
        ];
        let config = FeatureConfig {
            min_df: 1,
            ..FeatureConfig::default()
        };
        let features = FeatureSpace::fit(&texts, &config);
        let weights: Vec<f64> = (0..features.len())
            .map(|i| (i as f64 * 0.37).sin() / 3.0)
            .collect();
        let model = ScoringModel::from_parts(weights, -0.1234567890123, Label::CLASS_ORDER);
        let thresholds = ThresholdPolicy::new(0.7312345678901, 0.1 * 3.0).unwrap();
        let info = ArtifactInfo {
            format_version: FORMAT_VERSION,
            trained_at: Utc::now(),
            train_rows: 3,
            eval_rows: 1,
            seed: 42,
            target_precision: 0.98,
            calibration_degraded: false,
        };
        ModelArtifact::new(features, model, thresholds, info).unwrap()
    }

    /// Re-encode `artifact` with one metadata entry replaced.
    fn with_metadata(artifact: &ModelArtifact, key: &str, value: Option<&str>) -> Vec<u8> {
        let bytes = save(artifact).unwrap();
        let reader = FileReader::try_new(Cursor::new(bytes), None).unwrap();
        let mut meta = reader.schema().metadata().clone();
        match value {
            Some(v) => meta.insert(key.to_string(), v.to_string()),
            None => meta.remove(key),
        };
        let batches: Vec<RecordBatch> = reader.map(|b| b.unwrap()).collect();
        let schema = Arc::new(batches[0].schema().as_ref().clone().with_metadata(meta));
        let mut out = Vec::new();
        let mut writer = FileWriter::try_new(&mut out, &schema).unwrap();
        for batch in batches {
            let columns = batch.columns().to_vec();
            let batch = RecordBatch::try_new(schema.clone(), columns).unwrap();
            writer.write(&batch).unwrap();
        }
        writer.finish().unwrap();
        drop(writer);
        out
    }

    #[test]
    fn round_trip_is_exact() {
        let original = artifact();
        let loaded = load(&save(&original).unwrap()).unwrap();
        assert_eq!(loaded, original);
        let bits = |a: &ModelArtifact| {
            let t = a.thresholds();
            [a.model().bias(), t.hard(), t.soft()].map(f64::to_bits)
        };
        assert_eq!(bits(&loaded), bits(&original));
    }

    #[test]
    fn round_trip_classifies_identically() {
        let original = artifact();
        let loaded = load(&save(&original).unwrap()).unwrap();
        let texts = [
            "upi://pay?pa=kyc@okaxis&am=1",
            "https://paytm.com",
            "zz",
            "₹₹₹ refund",
        ];
        for text in texts {
            let expected = original.classify(Some(text));
            assert_eq!(loaded.classify(Some(text)), expected, "{text}");
        }
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(matches!(load(b"not an arrow file"), Err(ArtifactError::Arrow(_))));
    }

    #[test]
    fn missing_metadata_is_rejected() {
        let bytes = with_metadata(&artifact(), KEY_BIAS, None);
        assert!(matches!(load(&bytes), Err(ArtifactError::MissingMetadata(KEY_BIAS))));
    }

    #[test]
    fn future_version_is_rejected() {
        let bytes = with_metadata(&artifact(), KEY_VERSION, Some("2"));
        assert!(matches!(load(&bytes), Err(ArtifactError::UnsupportedVersion(2))));
    }

    #[test]
    fn inverted_thresholds_are_rejected() {
        let bytes = with_metadata(&artifact(), KEY_SOFT, Some(&encode_f64(0.9)));
        assert!(matches!(load(&bytes), Err(ArtifactError::Thresholds(_))));
    }

    #[test]
    fn malformed_class_order_is_rejected() {
        let bytes = with_metadata(&artifact(), KEY_CLASS_ORDER, Some("fraud,fraud"));
        let err = load(&bytes).unwrap_err();
        assert!(matches!(err, ArtifactError::BadMetadata { key, .. } if key == KEY_CLASS_ORDER));
    }

    #[test]
    fn mismatched_weights_are_rejected() {
        let a = artifact();
        let model = ScoringModel::from_parts(vec![0.0], 0.0, Label::CLASS_ORDER);
        let (features, info) = (a.features().clone(), a.info().clone());
        let err = ModelArtifact::new(features, model, *a.thresholds(), info).unwrap_err();
        assert!(matches!(err, ArtifactError::Parameters(_)));
    }

    #[test]
    fn top_ngrams_split_by_sign() {
        let a = artifact();
        let (fraud, genuine) = a.top_ngrams(5);
        assert!(fraud.len() <= 5 && genuine.len() <= 5);
        assert!(fraud.iter().all(|(_, w)| *w > 0.0));
        assert!(genuine.iter().all(|(_, w)| *w < 0.0));
        assert!(fraud.windows(2).all(|w| w[0].1 >= w[1].1));
        assert!(genuine.windows(2).all(|w| w[0].1 <= w[1].1));
    }
}
