//! Training rows before and after label normalization.

use serde::Serialize;

use crate::Label;

/// One row of one raw dataset, as read from disk.
///
/// Either cell may be missing (null in the source table).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawRecord {
    pub text: Option<String>,
    pub source_label: Option<String>,
}

impl RawRecord {
    pub fn new(text: impl Into<String>, source_label: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            source_label: Some(source_label.into()),
        }
    }
}

/// A training row with a label from the shared binary vocabulary.
///
/// The text is stored trimmed and is never empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NormalizedSample {
    text: String,
    label: Label,
}

impl NormalizedSample {
    /// Build a sample, returning `None` when `text` is empty after trimming.
    pub fn new(text: &str, label: Label) -> Option<Self> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }
        Some(Self {
            text: text.to_string(),
            label,
        })
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn label(&self) -> Label {
        self.label
    }
}
