//! Bootstrap sampling and out-of-bag (OOB) accumulation.
//!
//! Each tree trains on a bootstrap sample; the samples it never saw form a
//! held-out set for that tree. Workers fold per-tree OOB predictions into a
//! shared counter during fitting, and the final metrics are computed once
//! after the last tree arrives.

use rand::Rng;

use crate::confusion::ConfusionMatrix;
use crate::error::RfError;
use crate::tree::{Tree, argmax_counts};

/// Draw `n` sample indices with replacement and record which samples were
/// drawn at least once.
pub(crate) fn bootstrap_sample(n: usize, rng: &mut impl Rng) -> (Vec<usize>, Vec<bool>) {
    let mut in_bag = vec![false; n];
    let mut indices = Vec::with_capacity(n);
    for _ in 0..n {
        let id = rng.gen_range(0..n);
        indices.push(id);
        in_bag[id] = true;
    }
    (indices, in_bag)
}

/// Out-of-bag diagnostics for a classification forest.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct OobClassification {
    /// Confusion matrix over samples with at least one OOB vote:
    /// `[true class][argmax vote]`.
    pub confusion: ConfusionMatrix,
    /// Fraction of OOB-covered samples whose majority vote was correct.
    pub accuracy: f64,
    /// Number of samples that had at least one OOB vote.
    pub n_oob_samples: usize,
}

/// Per-sample class vote matrix (`n_samples x n_classes`), filled in by
/// workers as trees finish.
pub(crate) struct VoteCounter {
    votes: Vec<Vec<usize>>,
}

impl VoteCounter {
    pub(crate) fn new(n_samples: usize, n_classes: usize) -> Self {
        Self {
            votes: vec![vec![0; n_classes]; n_samples],
        }
    }

    /// Predict every not-in-bag sample with `tree` and add one vote per
    /// prediction.
    pub(crate) fn record_tree(&mut self, tree: &Tree<Vec<usize>>, x: &[Vec<f64>], in_bag: &[bool]) {
        for (i, row) in x.iter().enumerate() {
            if in_bag[i] {
                continue;
            }
            let predicted = tree.predict_row(row);
            self.votes[i][predicted] += 1;
        }
    }

    /// Build the confusion matrix and accuracy over covered samples.
    ///
    /// # Errors
    ///
    /// Returns [`RfError::OobEvaluationFailed`] when no sample received any
    /// vote.
    pub(crate) fn finalize(
        &self,
        y: &[usize],
        n_classes: usize,
    ) -> Result<OobClassification, RfError> {
        let mut matrix = vec![vec![0usize; n_classes]; n_classes];
        let mut covered = 0usize;
        let mut correct = 0usize;

        for (i, votes) in self.votes.iter().enumerate() {
            if votes.iter().all(|&v| v == 0) {
                continue;
            }
            covered += 1;
            let predicted = argmax_counts(votes);
            matrix[y[i]][predicted] += 1;
            if predicted == y[i] {
                correct += 1;
            }
        }

        if covered == 0 {
            return Err(RfError::OobEvaluationFailed {
                reason: "no sample was out of bag for any tree".to_string(),
            });
        }

        Ok(OobClassification {
            confusion: ConfusionMatrix::from_matrix(matrix),
            accuracy: correct as f64 / covered as f64,
            n_oob_samples: covered,
        })
    }
}

/// Out-of-bag diagnostics for a regression forest.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct OobRegression {
    /// Mean squared error over samples with at least one OOB prediction.
    pub mse: f64,
    /// `1 - RSS/TSS`, with TSS taken over the same covered samples.
    pub r_squared: f64,
    /// Number of samples that had at least one OOB prediction.
    pub n_oob_samples: usize,
}

/// Per-sample prediction sums and coverage counts, filled in by workers as
/// trees finish.
pub(crate) struct MeanCounter {
    sum: Vec<f64>,
    count: Vec<usize>,
}

impl MeanCounter {
    pub(crate) fn new(n_samples: usize) -> Self {
        Self {
            sum: vec![0.0; n_samples],
            count: vec![0; n_samples],
        }
    }

    /// Accumulate `tree`'s prediction for every not-in-bag sample.
    pub(crate) fn record_tree(&mut self, tree: &Tree<f64>, x: &[Vec<f64>], in_bag: &[bool]) {
        for (i, row) in x.iter().enumerate() {
            if in_bag[i] {
                continue;
            }
            self.sum[i] += tree.predict_row(row);
            self.count[i] += 1;
        }
    }

    /// Current MSE and R² over covered samples, or `None` when nothing is
    /// covered yet. TSS uses Welford's update over the covered targets.
    pub(crate) fn metrics(&self, y: &[f64]) -> Option<OobRegression> {
        let mut rss = 0.0;
        let mut n = 0usize;
        let mut mean = 0.0;
        let mut tss = 0.0;

        for (i, &target) in y.iter().enumerate() {
            if self.count[i] < 1 {
                continue;
            }
            let predicted = self.sum[i] / self.count[i] as f64;
            let residual = target - predicted;
            rss += residual * residual;

            n += 1;
            let d = target - mean;
            mean += d / n as f64;
            tss += d * (target - mean);
        }

        if n == 0 {
            return None;
        }

        Some(OobRegression {
            mse: rss / n as f64,
            r_squared: 1.0 - rss / tss,
            n_oob_samples: n,
        })
    }
}
