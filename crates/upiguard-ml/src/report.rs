//! Evaluation summaries produced by training and model comparison.

use chrono::{DateTime, Utc};
use serde::Serialize;
use upiguard_core::{ClassificationResult, Prediction};

use crate::calibrate::Calibration;
use crate::corpus::{LabelCounts, SourceReport};
use crate::metrics::{ClassMetrics, OperatingPoint};
use crate::trainer::ClassWeights;

/// Everything a training run learned about its own model.
#[derive(Debug, Clone, Serialize)]
pub struct EvaluationReport {
    pub trained_at: DateTime<Utc>,
    pub train_rows: usize,
    pub eval_rows: usize,
    pub vocabulary_size: usize,
    pub sources: Vec<SourceReport>,
    pub corpus_labels: LabelCounts,
    pub train_labels: LabelCounts,
    pub eval_labels: LabelCounts,
    pub calibration: Calibration,
    /// Fraud and genuine metrics at the hard threshold.
    pub classes: [ClassMetrics; 2],
    pub reference_points: Vec<OperatingPoint>,
    /// Tier assignment of the evaluation split.
    pub tiers: TierCounts,
    pub sanity: Vec<SanityCheck>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TierCounts {
    pub fraud: usize,
    pub suspicious: usize,
    pub genuine: usize,
}

impl TierCounts {
    pub fn add(&mut self, prediction: Prediction) {
        match prediction {
            Prediction::Fraud => self.fraud += 1,
            Prediction::Suspicious => self.suspicious += 1,
            Prediction::Genuine => self.genuine += 1,
            Prediction::Unknown => {}
        }
    }

    pub fn total(&self) -> usize {
        self.fraud + self.suspicious + self.genuine
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SanityCheck {
    pub text: String,
    #[serde(flatten)]
    pub result: ClassificationResult,
}

/// One trainer variant scored at the default 0.5 threshold.
#[derive(Debug, Clone, Serialize)]
pub struct VariantScore {
    pub name: String,
    pub class_weights: ClassWeights,
    pub fraud: ClassMetrics,
    pub genuine: ClassMetrics,
    pub accuracy: f64,
}
