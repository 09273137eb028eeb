//! Merging heterogeneous labeled sources into one corpus.

use std::fmt;

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::Serialize;
use tracing::{info, warn};
use upiguard_core::{Label, NormalizedSample, RawRecord, SourceSpec};

use crate::error::DataError;

/// Count of samples per label.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LabelCounts {
    pub fraud: usize,
    pub genuine: usize,
}

impl LabelCounts {
    pub fn of<'a>(labels: impl IntoIterator<Item = &'a Label>) -> Self {
        let mut counts = Self::default();
        for &label in labels {
            counts.add(label);
        }
        counts
    }

    pub fn add(&mut self, label: Label) {
        match label {
            Label::Fraud => self.fraud += 1,
            Label::Genuine => self.genuine += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.fraud + self.genuine
    }

    /// The only label present, if exactly one of them is.
    pub fn sole_class(&self) -> Option<Label> {
        match (self.fraud, self.genuine) {
            (0, 0) => None,
            (0, _) => Some(Label::Genuine),
            (_, 0) => Some(Label::Fraud),
            _ => None,
        }
    }
}

impl fmt::Display for LabelCounts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fraud={} genuine={}", self.fraud, self.genuine)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SourceStatus {
    Loaded,
    Skipped { reason: String },
}

/// What one source contributed to the corpus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceReport {
    pub name: String,
    #[serde(flatten)]
    pub status: SourceStatus,
    pub raw_rows: usize,
    pub kept: usize,
    pub dropped: usize,
    pub labels: LabelCounts,
}

impl SourceReport {
    fn skipped(name: &str, reason: String) -> Self {
        Self {
            name: name.to_string(),
            status: SourceStatus::Skipped { reason },
            raw_rows: 0,
            kept: 0,
            dropped: 0,
            labels: LabelCounts::default(),
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.status == SourceStatus::Loaded
    }
}

/// Ordered, uniformly labeled training rows.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Corpus {
    samples: Vec<NormalizedSample>,
}

impl Corpus {
    pub fn from_samples(samples: Vec<NormalizedSample>) -> Self {
        Self { samples }
    }

    pub fn samples(&self) -> &[NormalizedSample] {
        &self.samples
    }

    pub fn into_samples(self) -> Vec<NormalizedSample> {
        self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn label_counts(&self) -> LabelCounts {
        let mut counts = LabelCounts::default();
        for sample in &self.samples {
            counts.add(sample.label());
        }
        counts
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CorpusOptions {
    pub max_rows: Option<usize>,
    pub seed: u64,
}

/// Load every source through `load`, normalize its rows, and merge the
/// result into one shuffled corpus.
///
/// A source that fails to load, is empty, or has no usable rows is skipped
/// with a warning. Fails only when no source contributes a row.
pub fn build_corpus<F, E>(
    specs: &[SourceSpec],
    options: CorpusOptions,
    mut load: F,
) -> Result<(Corpus, Vec<SourceReport>), DataError>
where
    F: FnMut(&SourceSpec) -> Result<Vec<RawRecord>, E>,
    E: fmt::Display,
{
    let mut samples = Vec::new();
    let mut reports = Vec::with_capacity(specs.len());

    for spec in specs {
        let records = match load(spec) {
            Ok(records) => records,
            Err(e) => {
                warn!(
                    source = %spec.name,
                    path = %spec.path.display(),
                    error = %e,
                    "skipping unreadable source"
                );
                reports.push(SourceReport::skipped(&spec.name, e.to_string()));
                continue;
            }
        };
        if records.is_empty() {
            warn!(source = %spec.name, "skipping empty source");
            reports.push(SourceReport::skipped(&spec.name, "no rows".to_string()));
            continue;
        }

        let raw_rows = records.len();
        let mut labels = LabelCounts::default();
        let before = samples.len();
        let normalized = records.iter().filter_map(|r| spec.scheme.normalize(r));
        for sample in normalized {
            labels.add(sample.label());
            samples.push(sample);
        }
        let kept = samples.len() - before;
        let dropped = raw_rows - kept;

        let status = if kept == 0 {
            warn!(source = %spec.name, raw_rows, "skipping source with no usable rows");
            SourceStatus::Skipped {
                reason: "no usable rows".to_string(),
            }
        } else {
            info!(
                source = %spec.name,
                kept,
                dropped,
                fraud = labels.fraud,
                genuine = labels.genuine,
                "loaded source"
            );
            SourceStatus::Loaded
        };
        reports.push(SourceReport {
            name: spec.name.clone(),
            status,
            raw_rows,
            kept,
            dropped,
            labels,
        });
    }

    if samples.is_empty() {
        return Err(DataError::NoSources);
    }

    let samples = subsample_and_shuffle(samples, options.max_rows, options.seed);
    let corpus = Corpus::from_samples(samples);
    let counts = corpus.label_counts();
    info!(rows = corpus.len(), fraud = counts.fraud, genuine = counts.genuine, "merged corpus");
    Ok((corpus, reports))
}

/// Cap `samples` to `max_rows` by seeded sampling without replacement, then
/// shuffle with the same seed.
pub fn subsample_and_shuffle<T>(samples: Vec<T>, max_rows: Option<usize>, seed: u64) -> Vec<T> {
    let mut samples = samples;
    if let Some(cap) = max_rows
        && samples.len() > cap
    {
        let mut rng = StdRng::seed_from_u64(seed);
        let picked = rand::seq::index::sample(&mut rng, samples.len(), cap);
        let mut slots: Vec<Option<T>> = samples.into_iter().map(Some).collect();
        samples = picked.iter().filter_map(|i| slots[i].take()).collect();
        info!(cap, "subsampled corpus");
    }
    let mut rng = StdRng::seed_from_u64(seed);
    samples.shuffle(&mut rng);
    samples
}
