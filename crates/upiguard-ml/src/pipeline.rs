//! End-to-end training: split, featurize, fit, calibrate, package.

use std::time::Instant;

use chrono::Utc;
use tracing::info;
use upiguard_core::{Label, NormalizedSample};

use crate::artifact::{ArtifactInfo, FORMAT_VERSION, ModelArtifact};
use crate::calibrate::{Calibration, calibrate};
use crate::config::TrainConfig;
use crate::corpus::{Corpus, LabelCounts, SourceReport};
use crate::engine::classify;
use crate::error::{DataError, MlError};
use crate::features::{FeatureSpace, SparseVector};
use crate::metrics::operating_point;
use crate::report::{EvaluationReport, SanityCheck, TierCounts, VariantScore};
use crate::split::stratified_split;
use crate::trainer::{self, ClassWeights, TrainerConfig};

/// Output of a successful training run.
#[derive(Debug, Clone)]
pub struct TrainingRun {
    pub artifact: ModelArtifact,
    pub report: EvaluationReport,
}

/// Named trainer settings for [`compare`].
#[derive(Debug, Clone, PartialEq)]
pub struct TrainerVariant {
    pub name: String,
    pub trainer: TrainerConfig,
}

impl TrainerVariant {
    /// The configured weighting, balanced weighting, and no weighting.
    pub fn standard_set(base: &TrainerConfig) -> Vec<Self> {
        let with_weights = |class_weights| TrainerConfig {
            class_weights,
            ..base.clone()
        };
        vec![
            Self {
                name: "weighted".into(),
                trainer: base.clone(),
            },
            Self {
                name: "balanced".into(),
                trainer: with_weights(ClassWeights::Balanced),
            },
            Self {
                name: "unweighted".into(),
                trainer: with_weights(ClassWeights::uniform()),
            },
        ]
    }
}

/// Split and featurized data shared by training and comparison.
struct Prepared {
    features: FeatureSpace,
    train_vectors: Vec<SparseVector>,
    train_labels: Vec<Label>,
    eval_vectors: Vec<SparseVector>,
    eval_labels: Vec<Label>,
    corpus_labels: LabelCounts,
}

fn prepare(corpus: Corpus, config: &TrainConfig) -> Result<Prepared, MlError> {
    config.validate()?;
    if corpus.is_empty() {
        return Err(DataError::EmptyCorpus.into());
    }
    let corpus_labels = corpus.label_counts();
    if let Some(only) = corpus_labels.sole_class() {
        return Err(DataError::SingleClass(only).into());
    }

    let samples = corpus.into_samples();
    let split = stratified_split(samples, config.eval_fraction, config.seed);
    if split.eval.is_empty() {
        return Err(DataError::EmptyEvaluation.into());
    }
    info!(train = split.train.len(), eval = split.eval.len(), "split corpus");

    let train_texts: Vec<&str> = split.train.iter().map(NormalizedSample::text).collect();
    let features = FeatureSpace::fit(&train_texts, &config.features);
    if features.is_empty() {
        return Err(DataError::EmptyFeatureSpace.into());
    }
    let train_vectors = features.transform_batch(&train_texts);
    let eval_texts: Vec<&str> = split.eval.iter().map(NormalizedSample::text).collect();
    let eval_vectors = features.transform_batch(&eval_texts);

    Ok(Prepared {
        train_labels: split.train.iter().map(NormalizedSample::label).collect(),
        eval_labels: split.eval.iter().map(NormalizedSample::label).collect(),
        features,
        train_vectors,
        eval_vectors,
        corpus_labels,
    })
}

/// Train, calibrate and evaluate a model on `corpus`.
///
/// `sources` is carried into the report as-is.
pub fn train(
    corpus: Corpus,
    sources: Vec<SourceReport>,
    config: &TrainConfig,
) -> Result<TrainingRun, MlError> {
    let started = Instant::now();
    let prepared = prepare(corpus, config)?;

    let model = trainer::fit(
        &prepared.train_vectors,
        &prepared.train_labels,
        prepared.features.len(),
        &config.trainer,
    )?;
    let calibration = calibrate(
        &prepared.eval_vectors,
        &prepared.eval_labels,
        &model,
        &config.calibration,
    )?;

    let info = ArtifactInfo {
        format_version: FORMAT_VERSION,
        trained_at: Utc::now(),
        train_rows: prepared.train_labels.len(),
        eval_rows: prepared.eval_labels.len(),
        seed: config.seed,
        target_precision: calibration.target_precision,
        calibration_degraded: calibration.status.is_degraded(),
    };
    let Prepared {
        features,
        train_labels,
        eval_vectors,
        eval_labels,
        corpus_labels,
        ..
    } = prepared;
    let artifact = ModelArtifact::new(features, model, calibration.policy, info)?;

    let scores: Vec<f64> = eval_vectors
        .iter()
        .map(|x| artifact.model().fraud_probability(x))
        .collect();
    let summary = Summary {
        sources,
        corpus_labels,
        train_labels: LabelCounts::of(&train_labels),
    };
    let report = evaluate(
        &artifact,
        calibration,
        &scores,
        &eval_labels,
        summary,
        config,
    );

    info!(
        elapsed_ms = started.elapsed().as_millis() as u64,
        vocabulary = artifact.features().len(),
        hard = artifact.thresholds().hard(),
        soft = artifact.thresholds().soft(),
        "training run complete"
    );
    Ok(TrainingRun { artifact, report })
}

struct Summary {
    sources: Vec<SourceReport>,
    corpus_labels: LabelCounts,
    train_labels: LabelCounts,
}

fn evaluate(
    artifact: &ModelArtifact,
    calibration: Calibration,
    scores: &[f64],
    labels: &[Label],
    summary: Summary,
    config: &TrainConfig,
) -> EvaluationReport {
    let hard = operating_point(scores, labels, artifact.thresholds().hard());
    let reference_points = config
        .reference_thresholds
        .iter()
        .map(|&t| operating_point(scores, labels, t))
        .collect();

    let mut tiers = TierCounts::default();
    for &p in scores {
        tiers.add(artifact.thresholds().tier(p));
    }

    let sanity = config
        .sanity_samples
        .iter()
        .map(|text| SanityCheck {
            text: text.clone(),
            result: classify(Some(text.as_str()), artifact),
        })
        .collect();

    EvaluationReport {
        trained_at: artifact.info().trained_at,
        train_rows: artifact.info().train_rows,
        eval_rows: artifact.info().eval_rows,
        vocabulary_size: artifact.features().len(),
        sources: summary.sources,
        corpus_labels: summary.corpus_labels,
        train_labels: summary.train_labels,
        eval_labels: LabelCounts::of(labels),
        calibration,
        classes: hard.class_metrics(),
        reference_points,
        tiers,
        sanity,
    }
}

/// Fit each variant on one shared split and feature space and score it at
/// 0.5 on the evaluation split.
pub fn compare(
    corpus: Corpus,
    config: &TrainConfig,
    variants: &[TrainerVariant],
) -> Result<Vec<VariantScore>, MlError> {
    let prepared = prepare(corpus, config)?;
    let mut results = Vec::with_capacity(variants.len());
    for variant in variants {
        let model = trainer::fit(
            &prepared.train_vectors,
            &prepared.train_labels,
            prepared.features.len(),
            &variant.trainer,
        )?;
        let scores: Vec<f64> = prepared
            .eval_vectors
            .iter()
            .map(|x| model.fraud_probability(x))
            .collect();
        let point = operating_point(&scores, &prepared.eval_labels, 0.5);
        let [fraud, genuine] = point.class_metrics();
        info!(
            variant = %variant.name,
            precision = fraud.precision,
            recall = fraud.recall,
            f1 = fraud.f1,
            "scored trainer variant"
        );
        results.push(VariantScore {
            name: variant.name.clone(),
            class_weights: variant.trainer.class_weights.clone(),
            fraud,
            genuine,
            accuracy: point.accuracy(),
        });
    }
    Ok(results)
}
