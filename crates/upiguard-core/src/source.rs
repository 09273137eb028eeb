//! Raw dataset descriptions and their label-normalization rules.
//!
//! Every source has its own column layout and label vocabulary. A
//! [`SourceSpec`] names the columns to read and the [`LabelScheme`] that
//! collapses the source's labels onto [`Label`].

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{Label, NormalizedSample, RawRecord};

/// Per-source rule mapping a raw label onto the binary vocabulary.
///
/// Missing or blank labels never map to anything; the row is dropped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LabelScheme {
    /// `token` means fraud; any other non-empty label is genuine.
    FraudToken { token: String },
    /// `token` means genuine; any other non-empty label is fraud.
    BenignToken { token: String },
    /// Numeric `1` is fraud, `0` is genuine; anything else is dropped.
    Binary,
}

impl LabelScheme {
    /// Map one raw label value. Token comparison is case-insensitive.
    pub fn label_for(&self, raw: &str) -> Option<Label> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }
        match self {
            Self::FraudToken { token } => Some(if raw.eq_ignore_ascii_case(token) {
                Label::Fraud
            } else {
                Label::Genuine
            }),
            Self::BenignToken { token } => Some(if raw.eq_ignore_ascii_case(token) {
                Label::Genuine
            } else {
                Label::Fraud
            }),
            Self::Binary => {
                let value: f64 = raw.parse().ok()?;
                if value == 1.0 {
                    Some(Label::Fraud)
                } else if value == 0.0 {
                    Some(Label::Genuine)
                } else {
                    None
                }
            }
        }
    }

    /// Normalize a raw record, or `None` if its text or label is unusable.
    pub fn normalize(&self, record: &RawRecord) -> Option<NormalizedSample> {
        let label = self.label_for(record.source_label.as_deref()?)?;
        NormalizedSample::new(record.text.as_deref()?, label)
    }
}

/// Where a raw dataset lives and how to read it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceSpec {
    pub name: String,
    pub path: PathBuf,
    pub text_column: String,
    pub label_column: String,
    pub scheme: LabelScheme,
}

impl SourceSpec {
    /// `balanced_urls.csv`: `url`, `label` in {benign, malicious}.
    pub fn balanced_urls(data_dir: &Path) -> Self {
        Self {
            name: "balanced_urls".to_string(),
            path: data_dir.join("balanced_urls.csv"),
            text_column: "url".to_string(),
            label_column: "label".to_string(),
            scheme: LabelScheme::FraudToken {
                token: "malicious".to_string(),
            },
        }
    }

    /// `malicious_phish.csv`: `url`, `type` in {benign, phishing, defacement, malware}.
    pub fn malicious_phish(data_dir: &Path) -> Self {
        Self {
            name: "malicious_phish".to_string(),
            path: data_dir.join("malicious_phish.csv"),
            text_column: "url".to_string(),
            label_column: "type".to_string(),
            scheme: LabelScheme::BenignToken {
                token: "benign".to_string(),
            },
        }
    }

    /// `PhiUSIIL_Phishing_URL_Dataset.csv`: `URL`, `label` with 1 = phishing.
    pub fn phiusiil(data_dir: &Path) -> Self {
        Self {
            name: "phiusiil".to_string(),
            path: data_dir.join("PhiUSIIL_Phishing_URL_Dataset.csv"),
            text_column: "URL".to_string(),
            label_column: "label".to_string(),
            scheme: LabelScheme::Binary,
        }
    }

    /// The three public URL datasets, in merge order.
    pub fn builtin(data_dir: &Path) -> Vec<Self> {
        vec![
            Self::balanced_urls(data_dir),
            Self::malicious_phish(data_dir),
            Self::phiusiil(data_dir),
        ]
    }
}
