//! Class-weighted, L2-regularized logistic regression.
//!
//! Minimizes `(1/n) Σ c_y · logloss + (λ/2)·||w||²` with `λ = 1 / (C · n)`
//! using full-batch Nesterov acceleration with adaptive restart. The bias is
//! not regularized. All accumulation is sequential in sample order, so
//! identical inputs give bit-identical weights.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use upiguard_core::Label;

use crate::corpus::LabelCounts;
use crate::error::DataError;
use crate::features::SparseVector;

/// Per-class loss multipliers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ClassWeights {
    Explicit { fraud: f64, genuine: f64 },
    /// `n / (2 · n_class)` for each class.
    Balanced,
}

impl Default for ClassWeights {
    fn default() -> Self {
        Self::Explicit {
            fraud: 1.0,
            genuine: 1.5,
        }
    }
}

impl ClassWeights {
    pub fn uniform() -> Self {
        Self::Explicit {
            fraud: 1.0,
            genuine: 1.0,
        }
    }

    /// Resolve to `(fraud, genuine)` multipliers for the given class counts.
    pub fn resolve(&self, counts: LabelCounts) -> (f64, f64) {
        match *self {
            Self::Explicit { fraud, genuine } => (fraud, genuine),
            Self::Balanced => {
                let n = counts.total() as f64;
                let per_class = |k: usize| if k == 0 { 0.0 } else { n / (2.0 * k as f64) };
                (per_class(counts.fraud), per_class(counts.genuine))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainerConfig {
    pub class_weights: ClassWeights,
    /// Inverse regularization strength `C`.
    pub inverse_regularization: f64,
    pub max_iter: usize,
    /// Convergence bound on the max-norm of the gradient.
    pub tolerance: f64,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            class_weights: ClassWeights::default(),
            inverse_regularization: 1.5,
            max_iter: 500,
            tolerance: 1e-4,
        }
    }
}

impl TrainerConfig {
    pub fn validate(&self) -> Result<(), DataError> {
        if let ClassWeights::Explicit { fraud, genuine } = self.class_weights {
            if !(fraud.is_finite() && fraud > 0.0 && genuine.is_finite() && genuine > 0.0) {
                return Err(DataError::InvalidConfig(format!(
                    "class weights must be positive, got fraud={fraud} genuine={genuine}"
                )));
            }
            if fraud >= genuine {
                warn!(fraud, genuine, "fraud class weight is not below the genuine weight");
            }
        }
        if !(self.inverse_regularization.is_finite() && self.inverse_regularization > 0.0) {
            return Err(DataError::InvalidConfig(format!(
                "inverse_regularization must be positive, got {}",
                self.inverse_regularization
            )));
        }
        if self.max_iter == 0 {
            return Err(DataError::InvalidConfig(
                "max_iter must be at least 1".into(),
            ));
        }
        if !(self.tolerance.is_finite() && self.tolerance > 0.0) {
            let tolerance = self.tolerance;
            return Err(DataError::InvalidConfig(format!(
                "tolerance must be positive, got {tolerance}"
            )));
        }
        Ok(())
    }
}

/// Fitted linear model scoring `P(fraud) = sigmoid(w·x + b)`.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoringModel {
    weights: Vec<f64>,
    bias: f64,
    class_order: [Label; 2],
}

impl ScoringModel {
    pub fn from_parts(weights: Vec<f64>, bias: f64, class_order: [Label; 2]) -> Self {
        Self {
            weights,
            bias,
            class_order,
        }
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    pub fn bias(&self) -> f64 {
        self.bias
    }

    pub fn class_order(&self) -> [Label; 2] {
        self.class_order
    }

    pub fn n_features(&self) -> usize {
        self.weights.len()
    }

    pub fn decision(&self, x: &SparseVector) -> f64 {
        x.dot(&self.weights) + self.bias
    }

    pub fn fraud_probability(&self, x: &SparseVector) -> f64 {
        sigmoid(self.decision(x))
    }

    /// Class probabilities laid out in `class_order`.
    pub fn predict_proba(&self, x: &SparseVector) -> [f64; 2] {
        let fraud = self.fraud_probability(x);
        let order = self.class_order;
        order.map(|label| if label.is_fraud() { fraud } else { 1.0 - fraud })
    }
}

pub fn sigmoid(z: f64) -> f64 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let e = z.exp();
        e / (1.0 + e)
    }
}

/// `ln(1 + e^z)` without overflow.
fn softplus(z: f64) -> f64 {
    if z > 0.0 {
        z + (-z).exp().ln_1p()
    } else {
        z.exp().ln_1p()
    }
}

struct Problem<'a> {
    vectors: &'a [SparseVector],
    targets: Vec<f64>,
    sample_weights: Vec<f64>,
    lambda: f64,
}

impl Problem<'_> {
    /// Write the objective gradient at `params` into `grad` and return the
    /// objective value. The last parameter is the bias.
    fn evaluate(&self, params: &[f64], grad: &mut [f64]) -> f64 {
        let n_features = params.len() - 1;
        let (weights, bias) = (&params[..n_features], params[n_features]);
        let inv_n = 1.0 / self.vectors.len() as f64;
        grad.fill(0.0);

        let mut loss = 0.0;
        let rows = self.vectors.iter().zip(&self.targets);
        for ((x, &y), &c) in rows.zip(&self.sample_weights) {
            let z = x.dot(weights) + bias;
            let residual = c * (sigmoid(z) - y) * inv_n;
            for (j, v) in x.iter() {
                grad[j] += residual * v;
            }
            grad[n_features] += residual;
            loss += c * (softplus(z) - y * z) * inv_n;
        }

        let mut penalty = 0.0;
        for (g, &w) in grad[..n_features].iter_mut().zip(weights) {
            *g += self.lambda * w;
            penalty += w * w;
        }
        loss + 0.5 * self.lambda * penalty
    }
}

/// Fit a [`ScoringModel`] on TF-IDF vectors.
pub fn fit(
    vectors: &[SparseVector],
    labels: &[Label],
    n_features: usize,
    config: &TrainerConfig,
) -> Result<ScoringModel, DataError> {
    if vectors.len() != labels.len() {
        return Err(DataError::LengthMismatch {
            vectors: vectors.len(),
            labels: labels.len(),
        });
    }
    if vectors.is_empty() {
        return Err(DataError::EmptyCorpus);
    }
    let counts = LabelCounts::of(labels);
    if let Some(only) = counts.sole_class() {
        return Err(DataError::SingleClass(only));
    }
    if n_features == 0 {
        return Err(DataError::EmptyFeatureSpace);
    }
    config.validate()?;

    let (fraud_weight, genuine_weight) = config.class_weights.resolve(counts);
    let n = vectors.len() as f64;
    let problem = Problem {
        vectors,
        targets: labels
            .iter()
            .map(|l| if l.is_fraud() { 1.0 } else { 0.0 })
            .collect(),
        sample_weights: labels
            .iter()
            .map(|l| if l.is_fraud() { fraud_weight } else { genuine_weight })
            .collect(),
        lambda: 1.0 / (config.inverse_regularization * n),
    };

    let max_sq_norm = vectors
        .iter()
        .map(SparseVector::squared_norm)
        .fold(0.0, f64::max);
    let lipschitz = 0.25 * fraud_weight.max(genuine_weight) * (max_sq_norm + 1.0) + problem.lambda;
    let step = 1.0 / lipschitz;

    let dim = n_features + 1;
    let mut current = vec![0.0; dim];
    let mut next = vec![0.0; dim];
    let mut lookahead = vec![0.0; dim];
    let mut grad = vec![0.0; dim];
    let mut momentum_t = 1.0_f64;
    let mut loss = f64::NAN;
    let mut iterations = 0;
    let mut converged = false;

    for iteration in 1..=config.max_iter {
        iterations = iteration;
        loss = problem.evaluate(&lookahead, &mut grad);
        let grad_max = grad.iter().fold(0.0_f64, |m, g| m.max(g.abs()));
        if grad_max < config.tolerance {
            current.copy_from_slice(&lookahead);
            converged = true;
            break;
        }

        let mut alignment = 0.0;
        for j in 0..dim {
            next[j] = lookahead[j] - step * grad[j];
            alignment += grad[j] * (next[j] - current[j]);
        }
        let restart = alignment > 0.0;
        let t_next = (1.0 + (1.0 + 4.0 * momentum_t * momentum_t).sqrt()) / 2.0;
        let beta = if restart { 0.0 } else { (momentum_t - 1.0) / t_next };
        for j in 0..dim {
            lookahead[j] = next[j] + beta * (next[j] - current[j]);
        }
        momentum_t = if restart { 1.0 } else { t_next };
        std::mem::swap(&mut current, &mut next);

        if iteration % 50 == 0 {
            debug!(iteration, loss, grad_max, "optimizer progress");
        }
    }

    if converged {
        info!(
            iterations,
            loss,
            samples = vectors.len(),
            features = n_features,
            "logistic regression converged"
        );
    } else {
        warn!(iterations, loss, "logistic regression did not converge; using last iterate");
    }

    let bias = current.pop().unwrap_or(0.0);
    Ok(ScoringModel::from_parts(current, bias, Label::CLASS_ORDER))
}
