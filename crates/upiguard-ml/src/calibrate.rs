//! Precision-targeted threshold calibration.
//!
//! The hard threshold is the candidate with the highest fraud recall whose
//! precision meets the target on the evaluation split. The soft threshold
//! opens a review band below it.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use upiguard_core::{Label, Prediction};

use crate::error::{DataError, InvalidThresholds};
use crate::features::SparseVector;
use crate::metrics::{self, OperatingPoint};
use crate::trainer::ScoringModel;

const FALLBACK_SOFT_RATIO: f64 = 0.6;

/// How the soft threshold is derived from the hard one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum SoftThreshold {
    /// `soft = ratio · hard`.
    Ratio { ratio: f64 },
    /// Highest candidate below `hard` whose fraud recall reaches `recall`.
    RecallTarget { recall: f64 },
}

impl Default for SoftThreshold {
    fn default() -> Self {
        Self::Ratio {
            ratio: FALLBACK_SOFT_RATIO,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    pub target_precision: f64,
    pub soft: SoftThreshold,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            target_precision: 0.98,
            soft: SoftThreshold::default(),
        }
    }
}

impl CalibrationConfig {
    pub fn validate(&self) -> Result<(), DataError> {
        if !(self.target_precision > 0.0 && self.target_precision <= 1.0) {
            return Err(DataError::InvalidConfig(format!(
                "target_precision must be in (0, 1], got {}",
                self.target_precision
            )));
        }
        match self.soft {
            SoftThreshold::Ratio { ratio } if !(ratio > 0.0 && ratio < 1.0) => {
                Err(DataError::InvalidConfig(format!(
                    "soft threshold ratio must be in (0, 1), got {ratio}"
                )))
            }
            SoftThreshold::RecallTarget { recall } if !(recall > 0.0 && recall <= 1.0) => {
                Err(DataError::InvalidConfig(format!(
                    "soft threshold recall must be in (0, 1], got {recall}"
                )))
            }
            _ => Ok(()),
        }
    }
}

/// Frozen decision thresholds with `0 <= soft < hard <= 1`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ThresholdPolicy {
    hard: f64,
    soft: f64,
}

impl ThresholdPolicy {
    pub fn new(hard: f64, soft: f64) -> Result<Self, InvalidThresholds> {
        if (0.0..=1.0).contains(&hard) && (0.0..=1.0).contains(&soft) && soft < hard {
            Ok(Self { hard, soft })
        } else {
            Err(InvalidThresholds { hard, soft })
        }
    }

    pub fn hard(&self) -> f64 {
        self.hard
    }

    pub fn soft(&self) -> f64 {
        self.soft
    }

    /// Tier for a fraud probability.
    pub fn tier(&self, fraud_probability: f64) -> Prediction {
        if fraud_probability >= self.hard {
            Prediction::Fraud
        } else if fraud_probability >= self.soft {
            Prediction::Suspicious
        } else {
            Prediction::Genuine
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CalibrationStatus {
    Met,
    /// No threshold reached the target; the most precise one was used.
    Degraded { best_precision: f64 },
}

impl CalibrationStatus {
    pub fn is_degraded(&self) -> bool {
        matches!(self, Self::Degraded { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Calibration {
    pub policy: ThresholdPolicy,
    pub target_precision: f64,
    pub status: CalibrationStatus,
    pub hard_point: OperatingPoint,
    pub soft_point: OperatingPoint,
}

/// Score the evaluation split with `model` and calibrate on the result.
pub fn calibrate(
    vectors: &[SparseVector],
    labels: &[Label],
    model: &ScoringModel,
    config: &CalibrationConfig,
) -> Result<Calibration, DataError> {
    let scores: Vec<f64> = vectors.iter().map(|x| model.fraud_probability(x)).collect();
    calibrate_scores(&scores, labels, config)
}

/// Calibrate on precomputed fraud probabilities.
pub fn calibrate_scores(
    scores: &[f64],
    labels: &[Label],
    config: &CalibrationConfig,
) -> Result<Calibration, DataError> {
    if scores.len() != labels.len() {
        return Err(DataError::LengthMismatch {
            vectors: scores.len(),
            labels: labels.len(),
        });
    }
    if scores.is_empty() {
        return Err(DataError::EmptyEvaluation);
    }
    config.validate()?;

    let points = metrics::sweep(scores, labels);
    let target = config.target_precision;
    // A zero hard threshold would leave no room for a soft one below it.
    let candidates = points.iter().filter(|p| p.threshold > 0.0);
    let smallest = f64::MIN_POSITIVE;

    let meeting = candidates
        .clone()
        .filter(|p| p.precision >= target)
        .max_by(|a, b| {
            a.recall
                .total_cmp(&b.recall)
                .then(a.precision.total_cmp(&b.precision))
                .then(b.threshold.total_cmp(&a.threshold))
        });
    let (hard_point, status) = match meeting {
        Some(point) => (*point, CalibrationStatus::Met),
        None => {
            let best = candidates
                .max_by(|a, b| {
                    a.precision
                        .total_cmp(&b.precision)
                        .then(a.recall.total_cmp(&b.recall))
                        .then(b.threshold.total_cmp(&a.threshold))
                })
                .copied()
                .unwrap_or_else(|| metrics::operating_point(scores, labels, smallest));
            warn!(
                target,
                best_precision = best.precision,
                threshold = best.threshold,
                "no threshold reaches the target precision; using the most precise one"
            );
            (
                best,
                CalibrationStatus::Degraded {
                    best_precision: best.precision,
                },
            )
        }
    };

    let hard = hard_point.threshold;
    let soft = match config.soft {
        SoftThreshold::Ratio { ratio } => ratio * hard,
        SoftThreshold::RecallTarget { recall } => points
            .iter()
            .filter(|p| p.threshold < hard && p.recall >= recall)
            .map(|p| p.threshold)
            .max_by(f64::total_cmp)
            .unwrap_or(FALLBACK_SOFT_RATIO * hard),
    };
    // `ratio * hard` rounds back up to `hard` for the smallest subnormals.
    let soft = if soft < hard { soft } else { 0.0 };
    let policy = ThresholdPolicy::new(hard, soft)?;
    let soft_point = metrics::operating_point(scores, labels, soft);

    info!(
        hard,
        soft,
        precision = hard_point.precision,
        recall = hard_point.recall,
        degraded = status.is_degraded(),
        "calibrated thresholds"
    );
    Ok(Calibration {
        policy,
        target_precision: target,
        status,
        hard_point,
        soft_point,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use Label::{Fraud, Genuine};

    fn config(target_precision: f64) -> CalibrationConfig {
        CalibrationConfig {
            target_precision,
            ..CalibrationConfig::default()
        }
    }

    #[test]
    fn picks_max_recall_meeting_target() {
        let scores = [0.95, 0.9, 0.8, 0.7, 0.6, 0.3, 0.2];
        let labels = [Fraud, Fraud, Fraud, Genuine, Fraud, Genuine, Genuine];
        let cal = calibrate_scores(&scores, &labels, &config(0.98)).unwrap();
        assert_eq!(cal.status, CalibrationStatus::Met);
        assert_eq!(cal.policy.hard(), 0.8);
        assert_eq!(cal.hard_point.recall, 0.75);
        assert!(cal.hard_point.precision >= 0.98);
        assert!((cal.policy.soft() - 0.48).abs() < 1e-12);
    }

    #[test]
    fn lower_target_trades_precision_for_recall() {
        let scores = [0.95, 0.9, 0.8, 0.7, 0.6, 0.3, 0.2];
        let labels = [Fraud, Fraud, Fraud, Genuine, Fraud, Genuine, Genuine];
        let cal = calibrate_scores(&scores, &labels, &config(0.75)).unwrap();
        assert_eq!(cal.policy.hard(), 0.6);
        assert_eq!(cal.hard_point.recall, 1.0);
        assert_eq!(cal.hard_point.precision, 0.8);
    }

    #[test]
    fn unreachable_target_degrades() {
        let scores = [0.9, 0.8, 0.7, 0.6];
        let labels = [Genuine, Fraud, Genuine, Fraud];
        let cal = calibrate_scores(&scores, &labels, &config(0.98)).unwrap();
        // 0.6 gives precision 0.5 with recall 1.0, beating 0.8 at 0.5/0.5.
        assert_eq!(cal.policy.hard(), 0.6);
        let CalibrationStatus::Degraded { best_precision } = cal.status else {
            panic!("expected a degraded calibration");
        };
        assert_eq!(best_precision, 0.5);
    }

    #[test]
    fn equal_recall_prefers_higher_precision() {
        // Both candidates reach full recall; only 0.9 is fully precise.
        let scores = [0.9, 0.8];
        let labels = [Fraud, Genuine];
        let cal = calibrate_scores(&scores, &labels, &config(0.5)).unwrap();
        assert_eq!(cal.status, CalibrationStatus::Met);
        assert_eq!(cal.policy.hard(), 0.9);
        assert_eq!(cal.hard_point.recall, 1.0);
        assert_eq!(cal.hard_point.precision, 1.0);
    }

    #[test]
    fn all_zero_scores_still_yield_a_valid_policy() {
        let labels = [Fraud, Genuine];
        let cal = calibrate_scores(&[0.0, 0.0], &labels, &config(0.98)).unwrap();
        assert!(cal.status.is_degraded());
        assert!(cal.policy.hard() > 0.0);
        assert!(cal.policy.soft() < cal.policy.hard());
        assert_eq!(cal.policy.tier(0.0), Prediction::Genuine);
    }

    #[test]
    fn subnormal_hard_threshold_keeps_soft_below_it() {
        let tiny = f64::from_bits(1);
        let labels = [Fraud, Genuine];
        let cal = calibrate_scores(&[tiny, 0.0], &labels, &config(0.98)).unwrap();
        assert_eq!(cal.status, CalibrationStatus::Met);
        assert_eq!(cal.policy.hard(), tiny);
        assert_eq!(cal.policy.soft(), 0.0);
        assert_eq!(cal.policy.tier(tiny), Prediction::Fraud);
    }

    #[test]
    fn recall_target_soft_threshold() {
        let scores = [0.95, 0.9, 0.7, 0.5, 0.4, 0.1];
        let labels = [Fraud, Fraud, Genuine, Fraud, Fraud, Genuine];
        let cfg = CalibrationConfig {
            target_precision: 0.98,
            soft: SoftThreshold::RecallTarget { recall: 0.75 },
        };
        let cal = calibrate_scores(&scores, &labels, &cfg).unwrap();
        assert_eq!(cal.policy.hard(), 0.9);
        assert_eq!(cal.policy.soft(), 0.5);
        assert_eq!(cal.soft_point.recall, 0.75);
    }

    #[test]
    fn recall_target_falls_back_to_ratio() {
        // The hard threshold is already the lowest candidate.
        let scores = [0.9, 0.8];
        let labels = [Fraud, Fraud];
        let cfg = CalibrationConfig {
            target_precision: 0.98,
            soft: SoftThreshold::RecallTarget { recall: 0.5 },
        };
        let cal = calibrate_scores(&scores, &labels, &cfg).unwrap();
        assert_eq!(cal.policy.hard(), 0.8);
        assert!((cal.policy.soft() - 0.48).abs() < 1e-12);
    }

    #[test]
    fn empty_evaluation_is_an_error() {
        let result = calibrate_scores(&[], &[], &config(0.98));
        assert!(matches!(result, Err(DataError::EmptyEvaluation)));
    }

    #[test]
    fn thresholds_are_validated() {
        assert!(ThresholdPolicy::new(0.8, 0.5).is_ok());
        assert!(ThresholdPolicy::new(0.5, 0.5).is_err());
        assert!(ThresholdPolicy::new(1.2, 0.5).is_err());
        assert!(ThresholdPolicy::new(0.8, -0.1).is_err());
        assert!(ThresholdPolicy::new(f64::NAN, 0.1).is_err());
    }

    #[test]
    fn tiering_is_monotone() {
        let policy = ThresholdPolicy::new(0.8, 0.48).unwrap();
        assert_eq!(policy.tier(0.8), Prediction::Fraud);
        assert_eq!(policy.tier(0.5), Prediction::Suspicious);
        assert_eq!(policy.tier(0.48), Prediction::Suspicious);
        assert_eq!(policy.tier(0.1), Prediction::Genuine);

        let mut last = 0;
        for i in 0..=1000 {
            let rank = policy.tier(i as f64 / 1000.0).severity().unwrap();
            assert!(rank >= last);
            last = rank;
        }
    }

    #[test]
    fn invalid_soft_ratio_is_rejected() {
        let cfg = CalibrationConfig {
            soft: SoftThreshold::Ratio { ratio: 1.0 },
            ..CalibrationConfig::default()
        };
        assert!(matches!(cfg.validate(), Err(DataError::InvalidConfig(_))));
    }
}
