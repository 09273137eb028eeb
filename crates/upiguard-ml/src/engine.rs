//! Three-tier inference over a loaded [`ModelArtifact`].

use std::sync::Arc;

use parking_lot::RwLock;
use tracing::trace;
use upiguard_core::ClassificationResult;

use crate::artifact::ModelArtifact;

/// Classify one input string.
///
/// Absent, empty and whitespace-only inputs are `unknown` and are never
/// scored.
pub fn classify(text: Option<&str>, artifact: &ModelArtifact) -> ClassificationResult {
    let Some(text) = text.filter(|t| !t.trim().is_empty()) else {
        return ClassificationResult::unknown();
    };
    let x = artifact.features().transform(text);
    let p = artifact.model().fraud_probability(&x);
    let prediction = artifact.thresholds().tier(p);
    trace!(fraud_probability = p, %prediction, active_features = x.nnz(), "classified");
    ClassificationResult::scored(prediction, p)
}

/// Classify an arbitrary JSON value; anything but a string is `unknown`.
pub fn classify_value(value: &serde_json::Value, artifact: &ModelArtifact) -> ClassificationResult {
    classify(value.as_str(), artifact)
}

/// Cheaply cloneable handle on one artifact.
#[derive(Debug, Clone)]
pub struct InferenceEngine {
    artifact: Arc<ModelArtifact>,
}

impl InferenceEngine {
    pub fn new(artifact: Arc<ModelArtifact>) -> Self {
        Self { artifact }
    }

    pub fn artifact(&self) -> &Arc<ModelArtifact> {
        &self.artifact
    }

    pub fn classify(&self, text: Option<&str>) -> ClassificationResult {
        classify(text, &self.artifact)
    }

    pub fn classify_value(&self, value: &serde_json::Value) -> ClassificationResult {
        classify_value(value, &self.artifact)
    }
}

impl From<ModelArtifact> for InferenceEngine {
    fn from(artifact: ModelArtifact) -> Self {
        Self::new(Arc::new(artifact))
    }
}

/// The serving process's current artifact.
///
/// Calls snapshot the `Arc` and score without holding the lock, so a
/// concurrent [`replace`](Self::replace) is seen entirely or not at all.
#[derive(Debug)]
pub struct ModelSlot {
    current: RwLock<Arc<ModelArtifact>>,
}

impl ModelSlot {
    pub fn new(artifact: ModelArtifact) -> Self {
        Self {
            current: RwLock::new(Arc::new(artifact)),
        }
    }

    pub fn current(&self) -> Arc<ModelArtifact> {
        self.current.read().clone()
    }

    pub fn engine(&self) -> InferenceEngine {
        InferenceEngine::new(self.current())
    }

    /// Swap in a new artifact, returning the previous one.
    pub fn replace(&self, artifact: ModelArtifact) -> Arc<ModelArtifact> {
        let next = Arc::new(artifact);
        std::mem::replace(&mut *self.current.write(), next)
    }

    pub fn classify(&self, text: Option<&str>) -> ClassificationResult {
        classify(text, &self.current())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::{ArtifactInfo, FORMAT_VERSION};
    use crate::calibrate::ThresholdPolicy;
    use crate::features::{FeatureConfig, FeatureSpace};
    use crate::trainer::{ScoringModel, sigmoid};
    use chrono::Utc;
    use serde_json::json;
    use upiguard_core::{Label, Prediction};

    /// Artifact whose score depends only on whether the text contains "kyc".
    fn artifact(kyc_weight: f64, bias: f64, hard: f64, soft: f64) -> ModelArtifact {
        let config = FeatureConfig {
            min_df: 1,
            ..FeatureConfig::default()
        };
        let features = FeatureSpace::fit(&["kyc", "abc"], &config);
        let weights = features
            .terms()
            .iter()
            .map(|t| if t == "kyc" { kyc_weight } else { 0.0 })
            .collect();
        let info = ArtifactInfo {
            format_version: FORMAT_VERSION,
            trained_at: Utc::now(),
            train_rows: 2,
            eval_rows: 0,
            seed: 42,
            target_precision: 0.98,
            calibration_degraded: false,
        };
        ModelArtifact::new(
            features,
            ScoringModel::from_parts(weights, bias, Label::CLASS_ORDER),
            ThresholdPolicy::new(hard, soft).unwrap(),
            info,
        )
        .unwrap()
    }

    #[test]
    fn absent_and_blank_inputs_are_unknown() {
        let a = artifact(4.0, -2.0, 0.8, 0.48);
        for input in [None, Some(""), Some("   \t\n")] {
            let result = classify(input, &a);
            assert_eq!(result, ClassificationResult::unknown());
            assert_eq!(result.fraud_probability, None);
            assert_eq!(result.genuine_probability, None);
        }
    }

    #[test]
    fn non_string_json_is_unknown() {
        let a = artifact(4.0, -2.0, 0.8, 0.48);
        for value in [json!(null), json!(42), json!({"url": "kyc"}), json!(["kyc"])] {
            let result = classify_value(&value, &a);
            assert_eq!(result.prediction, Prediction::Unknown, "{value}");
        }
        let kyc = classify_value(&json!("kyc"), &a);
        assert_eq!(kyc.prediction, Prediction::Fraud);
    }

    #[test]
    fn tiers_follow_thresholds() {
        // "kyc" alone scores sigmoid(2); anything else sigmoid(-2).
        let a = artifact(4.0, -2.0, 0.8, 0.1);
        let fraud = classify(Some("KYC"), &a);
        assert_eq!(fraud.prediction, Prediction::Fraud);
        assert!((fraud.fraud_probability.unwrap() - sigmoid(2.0)).abs() < 1e-12);

        let suspicious = classify(Some("hello"), &a);
        assert_eq!(suspicious.prediction, Prediction::Suspicious);

        let strict = artifact(4.0, -2.0, 0.95, 0.5);
        let kyc = classify(Some("kyc"), &strict);
        assert_eq!(kyc.prediction, Prediction::Suspicious);
        let hello = classify(Some("hello"), &strict);
        assert_eq!(hello.prediction, Prediction::Genuine);
    }

    #[test]
    fn probabilities_are_complementary() {
        let a = artifact(4.0, -2.0, 0.8, 0.48);
        for text in ["kyc", "abc", "upi://pay?pa=x@y", "🙂🙂🙂", "a"] {
            let result = classify(Some(text), &a);
            let f = result.fraud_probability.unwrap();
            let g = result.genuine_probability.unwrap();
            assert!((f + g - 1.0).abs() < 1e-9, "{text}");
            assert_ne!(result.prediction, Prediction::Unknown);
        }
    }

    #[test]
    fn result_serializes_with_nulls() {
        let value = serde_json::to_value(ClassificationResult::unknown()).unwrap();
        assert_eq!(
            value,
            json!({"prediction": "unknown", "fraud_probability": null, "genuine_probability": null})
        );
    }

    #[test]
    fn slot_replace_is_atomic_for_readers() {
        let old_p = sigmoid(-2.0);
        let new_p = sigmoid(2.0);
        let slot = ModelSlot::new(artifact(0.0, -2.0, 0.9, 0.5));

        std::thread::scope(|s| {
            for _ in 0..4 {
                s.spawn(|| {
                    for _ in 0..500 {
                        let p = slot.classify(Some("hello")).fraud_probability.unwrap();
                        assert!(p == old_p || p == new_p, "saw a torn model: {p}");
                    }
                });
            }
            s.spawn(|| {
                let previous = slot.replace(artifact(0.0, 2.0, 0.9, 0.5));
                assert_eq!(previous.model().bias(), -2.0);
            });
        });

        assert_eq!(slot.classify(Some("hello")).fraud_probability, Some(new_p));
    }

    #[test]
    fn engine_snapshot_outlives_replace() {
        let slot = ModelSlot::new(artifact(0.0, -2.0, 0.9, 0.5));
        let engine = slot.engine();
        slot.replace(artifact(0.0, 2.0, 0.9, 0.5));
        let result = engine.classify(Some("x"));
        assert_eq!(result.fraud_probability, Some(sigmoid(-2.0)));
        assert_eq!(slot.current().model().bias(), 2.0);
    }
}
