//! Character n-gram TF-IDF features.
//!
//! A [`FeatureSpace`] is fitted once on the training texts and then frozen.
//! Transforming a text yields an L2-normalized [`SparseVector`] whose
//! indices refer to the lexicographically ordered vocabulary.

use std::cmp::Reverse;
use std::collections::{BTreeMap, HashMap};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::DataError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureConfig {
    /// Shortest n-gram length, inclusive.
    pub min_n: usize,
    /// Longest n-gram length, inclusive.
    pub max_n: usize,
    pub max_features: usize,
    /// Minimum number of training documents an n-gram must occur in.
    pub min_df: usize,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            min_n: 3,
            max_n: 5,
            max_features: 200_000,
            min_df: 2,
        }
    }
}

impl FeatureConfig {
    pub fn validate(&self) -> Result<(), DataError> {
        if self.min_n == 0 || self.min_n > self.max_n {
            return Err(DataError::InvalidConfig(format!(
                "n-gram range {}..={} must satisfy 1 <= min_n <= max_n",
                self.min_n, self.max_n
            )));
        }
        if self.max_features == 0 {
            return Err(DataError::InvalidConfig(
                "max_features must be at least 1".into(),
            ));
        }
        if self.min_df == 0 {
            return Err(DataError::InvalidConfig(
                "min_df must be at least 1 document".into(),
            ));
        }
        Ok(())
    }
}

/// Sparse feature vector with strictly ascending indices.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SparseVector {
    indices: Vec<u32>,
    values: Vec<f64>,
}

impl SparseVector {
    /// Build from parallel index/value lists. Indices must be strictly
    /// ascending.
    pub fn new(indices: Vec<u32>, values: Vec<f64>) -> Self {
        debug_assert_eq!(indices.len(), values.len());
        debug_assert!(indices.windows(2).all(|w| w[0] < w[1]));
        Self { indices, values }
    }

    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn nnz(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, f64)> + '_ {
        self.indices
            .iter()
            .map(|&i| i as usize)
            .zip(self.values.iter().copied())
    }

    /// Dot product with a dense vector covering every index.
    pub fn dot(&self, dense: &[f64]) -> f64 {
        self.iter().map(|(i, v)| v * dense[i]).sum()
    }

    pub fn squared_norm(&self) -> f64 {
        self.values.iter().map(|v| v * v).sum()
    }
}

/// Frozen n-gram vocabulary with one IDF weight per index.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureSpace {
    terms: Vec<String>,
    idf: Vec<f64>,
    index: HashMap<String, u32>,
    min_n: usize,
    max_n: usize,
}

#[derive(Debug, Clone, Copy)]
struct TermStats {
    count: u64,
    df: u64,
    first_seen: u64,
}

impl FeatureSpace {
    /// Fit the vocabulary and IDF weights on `texts`.
    ///
    /// `min_df` is applied first; if more than `max_features` n-grams remain,
    /// the most frequent are kept, ties going to the n-gram seen first.
    pub fn fit<S: AsRef<str>>(texts: &[S], config: &FeatureConfig) -> Self {
        let mut stats: HashMap<String, TermStats> = HashMap::new();
        let mut next_seen = 0u64;

        for text in texts {
            let normalized = normalize_text(text.as_ref());
            let mut doc_counts: HashMap<&str, u64> = HashMap::new();
            let mut order: Vec<&str> = Vec::new();
            for_each_ngram(&normalized, config.min_n, config.max_n, |gram| {
                let count = doc_counts.entry(gram).or_insert(0);
                if *count == 0 {
                    order.push(gram);
                }
                *count += 1;
            });
            for gram in order {
                let count = doc_counts[gram];
                match stats.get_mut(gram) {
                    Some(s) => {
                        s.count += count;
                        s.df += 1;
                    }
                    None => {
                        stats.insert(
                            gram.to_string(),
                            TermStats {
                                count,
                                df: 1,
                                first_seen: next_seen,
                            },
                        );
                        next_seen += 1;
                    }
                }
            }
        }

        let candidates = stats.len();
        let min_df = config.min_df as u64;
        let mut kept: Vec<(String, TermStats)> = stats
            .into_iter()
            .filter(|(_, s)| s.df >= min_df)
            .collect();
        if kept.len() > config.max_features {
            kept.sort_by_key(|(_, s)| (Reverse(s.count), s.first_seen));
            kept.truncate(config.max_features);
        }
        kept.sort_by(|a, b| a.0.cmp(&b.0));

        let n_docs = texts.len() as f64;
        let idf = kept
            .iter()
            .map(|(_, s)| smoothed_idf(n_docs, s.df as f64))
            .collect();
        let terms: Vec<String> = kept.into_iter().map(|(term, _)| term).collect();

        info!(
            documents = texts.len(),
            candidates,
            vocabulary = terms.len(),
            "fitted feature space"
        );
        Self::assemble(terms, idf, config.min_n, config.max_n)
    }

    /// Rebuild a fitted space from its parts, e.g. when loading an artifact.
    pub fn from_parts(
        terms: Vec<String>,
        idf: Vec<f64>,
        min_n: usize,
        max_n: usize,
    ) -> Result<Self, String> {
        if min_n == 0 || min_n > max_n {
            return Err(format!("n-gram range {min_n}..={max_n} is invalid"));
        }
        let (n_terms, n_idf) = (terms.len(), idf.len());
        if n_terms != n_idf {
            return Err(format!("{n_terms} n-grams but {n_idf} idf weights"));
        }
        if terms.len() > u32::MAX as usize {
            return Err(format!("{} n-grams exceed the index range", terms.len()));
        }
        if let Some(pos) = terms.windows(2).position(|w| w[0] >= w[1]) {
            let (at, term) = (pos + 1, &terms[pos + 1]);
            return Err(format!(
                "n-gram {term:?} at index {at} is out of order or duplicated"
            ));
        }
        if let Some(pos) = idf.iter().position(|v| !v.is_finite() || *v <= 0.0) {
            let value = idf[pos];
            return Err(format!(
                "idf weight {value} at index {pos} is not a positive finite number"
            ));
        }
        Ok(Self::assemble(terms, idf, min_n, max_n))
    }

    fn assemble(terms: Vec<String>, idf: Vec<f64>, min_n: usize, max_n: usize) -> Self {
        let index = terms
            .iter()
            .enumerate()
            .map(|(i, t)| (t.clone(), i as u32))
            .collect();
        Self {
            terms,
            idf,
            index,
            min_n,
            max_n,
        }
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// N-grams by feature index.
    pub fn terms(&self) -> &[String] {
        &self.terms
    }

    pub fn idf(&self) -> &[f64] {
        &self.idf
    }

    pub fn ngram_range(&self) -> (usize, usize) {
        (self.min_n, self.max_n)
    }

    pub fn index_of(&self, gram: &str) -> Option<usize> {
        self.index.get(gram).map(|&i| i as usize)
    }

    /// Map one text to its normalized TF-IDF vector. Unknown n-grams are
    /// ignored.
    pub fn transform(&self, text: &str) -> SparseVector {
        let normalized = normalize_text(text);
        let mut counts: BTreeMap<u32, f64> = BTreeMap::new();
        for_each_ngram(&normalized, self.min_n, self.max_n, |gram| {
            if let Some(&i) = self.index.get(gram) {
                *counts.entry(i).or_insert(0.0) += 1.0;
            }
        });

        let mut indices = Vec::with_capacity(counts.len());
        let mut values = Vec::with_capacity(counts.len());
        for (i, count) in counts {
            indices.push(i);
            values.push(count * self.idf[i as usize]);
        }
        let norm = values.iter().map(|v| v * v).sum::<f64>().sqrt();
        if norm > 0.0 {
            for v in &mut values {
                *v /= norm;
            }
        }
        SparseVector::new(indices, values)
    }

    /// Transform many texts in parallel, preserving input order.
    pub fn transform_batch<S: AsRef<str> + Sync>(&self, texts: &[S]) -> Vec<SparseVector> {
        texts
            .par_iter()
            .map(|t| self.transform(t.as_ref()))
            .collect()
    }
}

fn smoothed_idf(n_docs: f64, df: f64) -> f64 {
    ((1.0 + n_docs) / (1.0 + df)).ln() + 1.0
}

/// Lowercase and collapse every whitespace run into a single space.
pub fn normalize_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_space = false;
    for c in text.chars() {
        if c.is_whitespace() {
            if !in_space {
                out.push(' ');
            }
            in_space = true;
        } else {
            out.extend(c.to_lowercase());
            in_space = false;
        }
    }
    out
}

/// Call `f` with every character n-gram of `text`, shortest lengths first.
fn for_each_ngram<'a>(text: &'a str, min_n: usize, max_n: usize, mut f: impl FnMut(&'a str)) {
    let bounds: Vec<usize> = text
        .char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(text.len()))
        .collect();
    let n_chars = bounds.len() - 1;
    for n in min_n..=max_n {
        if n > n_chars {
            break;
        }
        for start in 0..=(n_chars - n) {
            f(&text[bounds[start]..bounds[start + n]]);
        }
    }
}
