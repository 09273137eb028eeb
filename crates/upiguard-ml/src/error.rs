use thiserror::Error;
use upiguard_core::Label;

/// Structural problems with training data or configuration. Fatal to a
/// training run.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("no source yielded any usable rows")]
    NoSources,

    #[error("training data is empty")]
    EmptyCorpus,

    #[error("training data only contains {0} samples; both fraud and genuine are required")]
    SingleClass(Label),

    #[error("feature space has zero dimensions")]
    EmptyFeatureSpace,

    #[error("evaluation split is empty")]
    EmptyEvaluation,

    #[error("{vectors} feature vectors but {labels} labels")]
    LengthMismatch { vectors: usize, labels: usize },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Thresholds(#[from] InvalidThresholds),
}

#[derive(Debug, Clone, Copy, Error, PartialEq)]
#[error("invalid thresholds: require 0 <= soft < hard <= 1, got soft={soft}, hard={hard}")]
pub struct InvalidThresholds {
    pub hard: f64,
    pub soft: f64,
}

/// A model artifact could not be encoded or decoded.
///
/// Any decode failure means the artifact is corrupt; callers must not serve
/// with a partially loaded model.
#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("arrow ipc error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("metadata key {0:?} is missing")]
    MissingMetadata(&'static str),

    #[error("metadata key {key:?} has malformed value {value:?}")]
    BadMetadata { key: &'static str, value: String },

    #[error("unsupported artifact format version {0}")]
    UnsupportedVersion(u32),

    #[error("schema mismatch: {0}")]
    Schema(String),

    #[error("invalid vocabulary: {0}")]
    Vocabulary(String),

    #[error("invalid model parameters: {0}")]
    Parameters(String),

    #[error(transparent)]
    Thresholds(#[from] InvalidThresholds),
}

#[derive(Debug, Error)]
pub enum MlError {
    #[error("data error: {0}")]
    Data(#[from] DataError),

    #[error("artifact error: {0}")]
    Artifact(#[from] ArtifactError),
}
