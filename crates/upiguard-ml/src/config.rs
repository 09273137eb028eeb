//! Training configuration.

use serde::{Deserialize, Serialize};
use upiguard_core::SourceSpec;

use crate::calibrate::CalibrationConfig;
use crate::error::DataError;
use crate::features::FeatureConfig;
use crate::trainer::TrainerConfig;

pub const DEFAULT_SEED: u64 = 42;

/// Every knob of a training run. All fields have defaults, so an empty JSON
/// object is a valid config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainConfig {
    /// Sources to merge. Empty means the built-in datasets.
    pub sources: Vec<SourceSpec>,
    pub seed: u64,
    /// Cap on corpus size, applied by seeded sampling before the split.
    pub max_rows: Option<usize>,
    pub eval_fraction: f64,
    pub features: FeatureConfig,
    pub trainer: TrainerConfig,
    pub calibration: CalibrationConfig,
    /// Extra thresholds reported alongside the calibrated one.
    pub reference_thresholds: Vec<f64>,
    /// Fixed inputs classified with the fresh model as a smoke check.
    pub sanity_samples: Vec<String>,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            sources: Vec::new(),
            seed: DEFAULT_SEED,
            max_rows: None,
            eval_fraction: 0.1,
            features: FeatureConfig::default(),
            trainer: TrainerConfig::default(),
            calibration: CalibrationConfig::default(),
            reference_thresholds: vec![0.5, 0.6, 0.8],
            sanity_samples: [
                "https://paytm.com/recharge?amount=500",
                "https://bonus-offer-paytm-support.co/claim?user=abc",
                "upi://pay?pa=abcd@oksbi&am=500&tn=Food+Order",
                "upi://pay?pa=kycbonus@okaxis&am=9999&tn=KYC+Verification+Reward",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
        }
    }
}

impl TrainConfig {
    pub fn validate(&self) -> Result<(), DataError> {
        if !(self.eval_fraction > 0.0 && self.eval_fraction < 1.0) {
            return Err(DataError::InvalidConfig(format!(
                "eval_fraction must be in (0, 1), got {}",
                self.eval_fraction
            )));
        }
        if self.max_rows == Some(0) {
            return Err(DataError::InvalidConfig(
                "max_rows must be at least 1".into(),
            ));
        }
        let out_of_range = |t: &&f64| !(0.0..=1.0).contains(*t);
        if let Some(t) = self.reference_thresholds.iter().find(out_of_range) {
            return Err(DataError::InvalidConfig(format!(
                "reference threshold {t} is outside [0, 1]"
            )));
        }
        self.features.validate()?;
        self.trainer.validate()?;
        self.calibration.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibrate::SoftThreshold;
    use crate::trainer::ClassWeights;

    #[test]
    fn empty_json_is_default() {
        let config: TrainConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, TrainConfig::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_json_overrides_nested_fields() {
        let config: TrainConfig = serde_json::from_str(
            r#"{
                "seed": 7,
                "features": {"min_df": 1},
                "trainer": {"class_weights": {"mode": "balanced"}},
                "calibration": {"soft": {"strategy": "recall_target", "recall": 0.9}}
            }"#,
        )
        .unwrap();
        assert_eq!(config.seed, 7);
        assert_eq!(config.features.min_df, 1);
        assert_eq!(config.features.max_n, 5);
        assert_eq!(config.trainer.class_weights, ClassWeights::Balanced);
        assert_eq!(
            config.calibration.soft,
            SoftThreshold::RecallTarget { recall: 0.9 }
        );
        assert_eq!(config.calibration.target_precision, 0.98);
    }

    #[test]
    fn sources_deserialize_with_schemes() {
        let config: TrainConfig = serde_json::from_str(
            r#"{"sources": [{
                "name": "extra",
                "path": "/data/extra.parquet",
                "text_column": "url",
                "label_column": "is_phish",
                "scheme": {"kind": "binary"}
            }]}"#,
        )
        .unwrap();
        assert_eq!(config.sources.len(), 1);
        assert_eq!(config.sources[0].name, "extra");
    }

    #[test]
    fn out_of_range_values_are_rejected() {
        let bad_fraction = TrainConfig {
            eval_fraction: 1.0,
            ..TrainConfig::default()
        };
        assert!(matches!(bad_fraction.validate(), Err(DataError::InvalidConfig(_))));

        let bad_reference = TrainConfig {
            reference_thresholds: vec![0.5, 1.5],
            ..TrainConfig::default()
        };
        assert!(bad_reference.validate().is_err());

        let zero_rows = TrainConfig {
            max_rows: Some(0),
            ..TrainConfig::default()
        };
        assert!(zero_rows.validate().is_err());
    }
}
