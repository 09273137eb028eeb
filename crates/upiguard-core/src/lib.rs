//! Shared types for the UPI Guard text-classification pipeline.
//!
//! Everything here is plain data: labels and decisions, raw and normalized
//! training rows, and the per-source label schemes used to merge datasets.

pub mod label;
pub mod sample;
pub mod source;

pub use label::{ClassificationResult, Label, Prediction, UnknownLabel};
pub use sample::{NormalizedSample, RawRecord};
pub use source::{LabelScheme, SourceSpec};
