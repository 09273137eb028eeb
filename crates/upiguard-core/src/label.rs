//! Class labels and the three-tier decision surfaced to callers.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Binary ground-truth label of a training sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Label {
    Fraud,
    Genuine,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown label: {0:?}")]
pub struct UnknownLabel(pub String);

impl Label {
    /// Class order recorded in every model artifact. Probability vectors
    /// are laid out in this order.
    pub const CLASS_ORDER: [Label; 2] = [Label::Fraud, Label::Genuine];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fraud => "fraud",
            Self::Genuine => "genuine",
        }
    }

    pub fn is_fraud(self) -> bool {
        self == Self::Fraud
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for Label {
    type Err = UnknownLabel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "fraud" => Ok(Self::Fraud),
            "genuine" => Ok(Self::Genuine),
            other => Err(UnknownLabel(other.to_string())),
        }
    }
}

/// Decision for a single input string.
///
/// `Unknown` is reserved for inputs that were never scored (absent, empty,
/// or not a string). The scored tiers are ordered by severity:
/// genuine < suspicious < fraud.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Prediction {
    Fraud,
    Suspicious,
    Genuine,
    Unknown,
}

impl Prediction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fraud => "fraud",
            Self::Suspicious => "suspicious",
            Self::Genuine => "genuine",
            Self::Unknown => "unknown",
        }
    }

    /// Severity rank of a scored tier; `None` for `Unknown`.
    pub fn severity(&self) -> Option<u8> {
        match self {
            Self::Genuine => Some(0),
            Self::Suspicious => Some(1),
            Self::Fraud => Some(2),
            Self::Unknown => None,
        }
    }
}

impl fmt::Display for Prediction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Outcome of one inference call.
///
/// Serializes as `{"prediction": "...", "fraud_probability": f64|null,
/// "genuine_probability": f64|null}`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub prediction: Prediction,
    pub fraud_probability: Option<f64>,
    pub genuine_probability: Option<f64>,
}

impl ClassificationResult {
    /// Result for an input that could not be scored.
    pub fn unknown() -> Self {
        Self {
            prediction: Prediction::Unknown,
            fraud_probability: None,
            genuine_probability: None,
        }
    }

    /// Result for a scored input. The genuine probability is the complement
    /// of `fraud_probability`.
    pub fn scored(prediction: Prediction, fraud_probability: f64) -> Self {
        Self {
            prediction,
            fraud_probability: Some(fraud_probability),
            genuine_probability: Some(1.0 - fraud_probability),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_round_trips_through_str() {
        for label in Label::CLASS_ORDER {
            assert_eq!(label.as_str().parse::<Label>().unwrap(), label);
        }
        assert_eq!(
            "spam".parse::<Label>(),
            Err(UnknownLabel("spam".to_string()))
        );
    }

    #[test]
    fn severity_orders_scored_tiers() {
        assert!(Prediction::Genuine.severity() < Prediction::Suspicious.severity());
        assert!(Prediction::Suspicious.severity() < Prediction::Fraud.severity());
        assert_eq!(Prediction::Unknown.severity(), None);
    }

    #[test]
    fn scored_probabilities_are_complementary() {
        let r = ClassificationResult::scored(Prediction::Suspicious, 0.55);
        let sum = r.fraud_probability.unwrap() + r.genuine_probability.unwrap();
        assert!((sum - 1.0).abs() < 1e-12);
    }

    #[test]
    fn unknown_serializes_with_nulls() {
        let json = serde_json::to_value(ClassificationResult::unknown()).unwrap();
        assert_eq!(json["prediction"], "unknown");
        assert!(json["fraud_probability"].is_null());
        assert!(json["genuine_probability"].is_null());
    }

    #[test]
    fn scored_serializes_lowercase_prediction() {
        let result = ClassificationResult::scored(Prediction::Fraud, 0.9);
        let json = serde_json::to_value(result).unwrap();
        assert_eq!(json["prediction"], "fraud");
        assert_eq!(json["fraud_probability"], 0.9);
    }
}
