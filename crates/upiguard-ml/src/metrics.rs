//! Confusion counts and precision/recall at fraud-probability thresholds.

use serde::Serialize;
use upiguard_core::Label;

/// Fraud-class confusion counts at one threshold (fraud iff `p >= threshold`).
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct OperatingPoint {
    pub threshold: f64,
    pub precision: f64,
    pub recall: f64,
    pub true_positives: usize,
    pub false_positives: usize,
    pub false_negatives: usize,
    pub true_negatives: usize,
}

impl OperatingPoint {
    fn from_counts(threshold: f64, tp: usize, fp: usize, fn_: usize, tn: usize) -> Self {
        Self {
            threshold,
            precision: ratio(tp, tp + fp),
            recall: ratio(tp, tp + fn_),
            true_positives: tp,
            false_positives: fp,
            false_negatives: fn_,
            true_negatives: tn,
        }
    }

    pub fn f1(&self) -> f64 {
        harmonic_mean(self.precision, self.recall)
    }

    pub fn accuracy(&self) -> f64 {
        let total = self.true_positives
            + self.false_positives
            + self.false_negatives
            + self.true_negatives;
        ratio(self.true_positives + self.true_negatives, total)
    }

    /// Per-class precision, recall, F1 and support, fraud first.
    pub fn class_metrics(&self) -> [ClassMetrics; 2] {
        let fraud = ClassMetrics {
            label: Label::Fraud,
            precision: self.precision,
            recall: self.recall,
            f1: self.f1(),
            support: self.true_positives + self.false_negatives,
        };
        let (tn, fp, fn_) = (self.true_negatives, self.false_positives, self.false_negatives);
        let precision = ratio(tn, tn + fn_);
        let recall = ratio(tn, tn + fp);
        let genuine = ClassMetrics {
            label: Label::Genuine,
            precision,
            recall,
            f1: harmonic_mean(precision, recall),
            support: tn + fp,
        };
        [fraud, genuine]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ClassMetrics {
    pub label: Label,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub support: usize,
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

fn harmonic_mean(a: f64, b: f64) -> f64 {
    if a + b == 0.0 {
        0.0
    } else {
        2.0 * a * b / (a + b)
    }
}

/// Confusion counts at a single threshold.
pub fn operating_point(scores: &[f64], labels: &[Label], threshold: f64) -> OperatingPoint {
    let (mut tp, mut fp, mut fn_, mut tn) = (0, 0, 0, 0);
    for (&p, label) in scores.iter().zip(labels) {
        match (p >= threshold, label.is_fraud()) {
            (true, true) => tp += 1,
            (true, false) => fp += 1,
            (false, true) => fn_ += 1,
            (false, false) => tn += 1,
        }
    }
    OperatingPoint::from_counts(threshold, tp, fp, fn_, tn)
}

/// One operating point per distinct score, in descending threshold order.
pub fn sweep(scores: &[f64], labels: &[Label]) -> Vec<OperatingPoint> {
    let mut pairs: Vec<(f64, bool)> = scores
        .iter()
        .copied()
        .zip(labels.iter().map(|l| l.is_fraud()))
        .collect();
    pairs.sort_by(|a, b| b.0.total_cmp(&a.0));
    let positives = pairs.iter().filter(|(_, fraud)| *fraud).count();
    let negatives = pairs.len() - positives;

    let mut points = Vec::new();
    let (mut tp, mut fp) = (0, 0);
    for (i, &(score, fraud)) in pairs.iter().enumerate() {
        if fraud {
            tp += 1;
        } else {
            fp += 1;
        }
        let group_ends = pairs.get(i + 1).is_none_or(|next| next.0 != score);
        if group_ends {
            let point = OperatingPoint::from_counts(score, tp, fp, positives - tp, negatives - fp);
            points.push(point);
        }
    }
    points
}
