//! Stratified train/evaluation split.

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use upiguard_core::{Label, NormalizedSample};

/// Training and held-out evaluation rows. Each side keeps corpus order.
#[derive(Debug, Clone, Default)]
pub struct Split {
    pub train: Vec<NormalizedSample>,
    pub eval: Vec<NormalizedSample>,
}

/// Split each label separately so both sides keep the class ratio.
///
/// A class with at least two samples contributes at least one evaluation
/// sample and keeps at least one training sample. A singleton class stays
/// in training.
pub fn stratified_split(samples: Vec<NormalizedSample>, eval_fraction: f64, seed: u64) -> Split {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut in_eval = vec![false; samples.len()];

    for label in Label::CLASS_ORDER {
        let mut members: Vec<usize> = samples
            .iter()
            .enumerate()
            .filter(|(_, s)| s.label() == label)
            .map(|(i, _)| i)
            .collect();
        let n_eval = eval_count(members.len(), eval_fraction);
        members.shuffle(&mut rng);
        for &i in &members[..n_eval] {
            in_eval[i] = true;
        }
    }

    let mut split = Split::default();
    for (sample, eval) in samples.into_iter().zip(in_eval) {
        if eval {
            split.eval.push(sample);
        } else {
            split.train.push(sample);
        }
    }
    split
}

fn eval_count(n: usize, eval_fraction: f64) -> usize {
    if n < 2 {
        return 0;
    }
    let wanted = (n as f64 * eval_fraction).round() as usize;
    wanted.clamp(1, n - 1)
}
