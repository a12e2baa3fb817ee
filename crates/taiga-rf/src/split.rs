//! Best-split search for a single node.

use rand::Rng;
use rand_chacha::ChaCha8Rng;

use crate::impurity::EPSILON;
use crate::objective::Objective;
use crate::sort::dual_sort;

/// The winning split for a node.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct BestSplit {
    /// Feature column used for the split.
    pub(crate) feature: usize,
    /// Candidate threshold: the midpoint of the two adjacent sorted values.
    pub(crate) threshold: f64,
    /// Impurity reduction of this split.
    pub(crate) delta: f64,
    /// Position of the split in the node's sorted index slice:
    /// `idx[..pivot]` goes left, `idx[pivot..]` goes right.
    pub(crate) pivot: usize,
}

/// Per-tree split search state: the feature permutation array and the scratch
/// buffer feature values are gathered into before sorting.
///
/// Both are allocated once per tree (the scratch at bootstrap size) and
/// sliced to the node's sample count, so split finding allocates nothing.
pub(crate) struct Splitter {
    x_buf: Vec<f64>,
    features: Vec<usize>,
    max_features: usize,
    min_leaf: usize,
}

impl Splitter {
    pub(crate) fn new(
        n_samples: usize,
        n_features: usize,
        max_features: usize,
        min_leaf: usize,
    ) -> Self {
        Self {
            x_buf: vec![0.0; n_samples],
            features: (0..n_features).collect(),
            max_features,
            min_leaf,
        }
    }

    /// Find the best split of `idx` over a random subset of features.
    ///
    /// Features are drawn in uniformly random order without replacement via a
    /// partial Fisher-Yates shuffle of the feature array. Features already
    /// known constant along the path count toward the visit total but not
    /// toward `max_features`, so drawing continues until `max_features`
    /// non-constant features have been examined or the array is exhausted.
    ///
    /// Each examined feature's values are gathered into the scratch buffer
    /// and dual-sorted together with `idx`, so `idx` leaves this function
    /// ordered by the last examined feature. A feature whose sorted range is
    /// within [`EPSILON`] is recorded in `constant` for the whole subtree.
    ///
    /// Returns `None` when no admissible split exists. A candidate is kept
    /// only when its reduction strictly exceeds the running best, so the
    /// first best found wins ties.
    pub(crate) fn best_split<O: Objective>(
        &mut self,
        x: &[Vec<f64>],
        idx: &mut [usize],
        constant: &mut [bool],
        objective: &mut O,
        rng: &mut ChaCha8Rng,
    ) -> Option<BestSplit> {
        let n = idx.len();
        let mut best: Option<BestSplit> = None;
        let mut best_delta = 0.0;

        let mut remaining = self.features.len();
        let mut visited = 0;
        let mut n_constant = 0;

        while remaining > 0 && (visited < self.max_features || visited <= n_constant) {
            let k = rng.gen_range(0..remaining);
            self.features.swap(k, remaining - 1);
            let feature = self.features[remaining - 1];
            remaining -= 1;
            visited += 1;

            if constant[feature] {
                n_constant += 1;
                continue;
            }

            // Gather this feature's column for the node's samples.
            for (slot, &i) in self.x_buf[..n].iter_mut().zip(idx.iter()) {
                *slot = x[i][feature];
            }
            let xt = &mut self.x_buf[..n];

            dual_sort(xt, idx);

            if xt[n - 1] <= xt[0] + EPSILON {
                n_constant += 1;
                constant[feature] = true;
                continue;
            }

            objective.reset(idx);
            for i in 1..n {
                if xt[i] <= xt[i - 1] + EPSILON {
                    continue; // duplicate values cannot split between them
                }

                objective.advance(idx, i);

                if i < self.min_leaf || n - i < self.min_leaf {
                    continue;
                }

                let delta = objective.delta();
                if delta > best_delta {
                    best_delta = delta;
                    best = Some(BestSplit {
                        feature,
                        threshold: (xt[i - 1] + xt[i]) / 2.0,
                        delta,
                        pivot: i,
                    });
                }
            }
        }

        best
    }
}
