//! Training and inference for the UPI Guard fraud classifier.
//!
//! Raw sources are merged by [`build_corpus`], split with
//! [`stratified_split`], featurized by a [`FeatureSpace`], fitted by
//! [`trainer::fit`] and calibrated by [`calibrate()`]. The result is a
//! [`ModelArtifact`] that [`InferenceEngine`] and [`ModelSlot`] serve.

pub mod artifact;
pub mod calibrate;
pub mod config;
pub mod corpus;
pub mod engine;
pub mod error;
pub mod features;
pub mod metrics;
pub mod pipeline;
pub mod report;
pub mod split;
pub mod trainer;

pub use artifact::{ArtifactInfo, ModelArtifact};
pub use calibrate::{
    Calibration, CalibrationConfig, CalibrationStatus, SoftThreshold, ThresholdPolicy, calibrate,
};
pub use config::TrainConfig;
pub use corpus::{Corpus, CorpusOptions, LabelCounts, SourceReport, SourceStatus, build_corpus};
pub use engine::{InferenceEngine, ModelSlot, classify, classify_value};
pub use error::{ArtifactError, DataError, InvalidThresholds, MlError};
pub use features::{FeatureConfig, FeatureSpace, SparseVector};
pub use metrics::{ClassMetrics, OperatingPoint};
pub use pipeline::{TrainerVariant, TrainingRun, compare, train};
pub use report::{EvaluationReport, SanityCheck, TierCounts, VariantScore};
pub use split::{Split, stratified_split};
pub use trainer::{ClassWeights, ScoringModel, TrainerConfig};
