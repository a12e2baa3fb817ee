//! Configuration builder for forest training.

use crate::error::RfError;
use crate::forest::{ClassifierForest, RegressorForest};
use crate::impurity::Criterion;

/// Hyperparameters and runtime options for fitting a forest.
///
/// Construct via [`ForestConfig::new`], then chain `with_*` methods.
/// Validation happens at fit time.
///
/// # Defaults
///
/// | Parameter      | Default                                      |
/// |----------------|----------------------------------------------|
/// | `trees`        | 10                                           |
/// | `min_split`    | 2                                            |
/// | `min_leaf`     | 1                                            |
/// | `max_depth`    | `None` (unlimited)                           |
/// | `max_features` | `None` (√F classification, F/3 regression)   |
/// | `criterion`    | `Gini`                                       |
/// | `workers`      | 1                                            |
/// | `compute_oob`  | false                                        |
/// | `early_stop`   | false                                        |
/// | `seed`         | 42                                           |
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ForestConfig {
    pub(crate) trees: usize,
    pub(crate) min_split: usize,
    pub(crate) min_leaf: usize,
    pub(crate) max_depth: Option<usize>,
    pub(crate) max_features: Option<usize>,
    pub(crate) criterion: Criterion,
    pub(crate) workers: usize,
    pub(crate) compute_oob: bool,
    pub(crate) early_stop: bool,
    pub(crate) seed: u64,
}

impl ForestConfig {
    /// Create a config with the defaults shown in the struct-level table.
    #[must_use]
    pub fn new() -> Self {
        Self {
            trees: 10,
            min_split: 2,
            min_leaf: 1,
            max_depth: None,
            max_features: None,
            criterion: Criterion::Gini,
            workers: 1,
            compute_oob: false,
            early_stop: false,
            seed: 42,
        }
    }

    // --- Setters ---

    /// Set the number of trees to fit.
    #[must_use]
    pub fn with_trees(mut self, trees: usize) -> Self {
        self.trees = trees;
        self
    }

    /// Set the minimum number of samples required to attempt a split.
    #[must_use]
    pub fn with_min_split(mut self, min_split: usize) -> Self {
        self.min_split = min_split;
        self
    }

    /// Set the minimum number of samples allowed in either child of a split.
    #[must_use]
    pub fn with_min_leaf(mut self, min_leaf: usize) -> Self {
        self.min_leaf = min_leaf;
        self
    }

    /// Set the maximum tree depth. `None` grows full trees subject to the
    /// other stopping conditions.
    #[must_use]
    pub fn with_max_depth(mut self, max_depth: Option<usize>) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Set the number of non-constant features examined per split decision.
    ///
    /// `None` selects the task default: `⌊√F⌋` for classification, `⌊F/3⌋`
    /// (at least 1) for regression.
    #[must_use]
    pub fn with_max_features(mut self, max_features: Option<usize>) -> Self {
        self.max_features = max_features;
        self
    }

    /// Set the classification split criterion. Ignored by regression, which
    /// always uses variance.
    #[must_use]
    pub fn with_criterion(mut self, criterion: Criterion) -> Self {
        self.criterion = criterion;
        self
    }

    /// Set the worker count for parallel tree fitting. Values below 1 are
    /// treated as 1.
    #[must_use]
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Enable or disable out-of-bag evaluation during fitting.
    #[must_use]
    pub fn with_compute_oob(mut self, compute_oob: bool) -> Self {
        self.compute_oob = compute_oob;
        self
    }

    /// Enable or disable OOB-convergence early stopping (regression only;
    /// implies `compute_oob`).
    #[must_use]
    pub fn with_early_stop(mut self, early_stop: bool) -> Self {
        self.early_stop = early_stop;
        self
    }

    /// Set the forest-level RNG seed. Per-tree seeds derive from it, so a
    /// single-worker fit is byte-reproducible.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    // --- Getters ---

    /// Return the number of trees to fit.
    #[must_use]
    pub fn trees(&self) -> usize {
        self.trees
    }

    /// Return the minimum samples required to split a node.
    #[must_use]
    pub fn min_split(&self) -> usize {
        self.min_split
    }

    /// Return the minimum samples allowed in either child of a split.
    #[must_use]
    pub fn min_leaf(&self) -> usize {
        self.min_leaf
    }

    /// Return the maximum depth limit, if any.
    #[must_use]
    pub fn max_depth(&self) -> Option<usize> {
        self.max_depth
    }

    /// Return the per-split feature budget, if set.
    #[must_use]
    pub fn max_features(&self) -> Option<usize> {
        self.max_features
    }

    /// Return the classification split criterion.
    #[must_use]
    pub fn criterion(&self) -> Criterion {
        self.criterion
    }

    /// Return the worker count.
    #[must_use]
    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Return whether OOB evaluation is enabled.
    #[must_use]
    pub fn compute_oob(&self) -> bool {
        self.compute_oob
    }

    /// Return whether early stopping is enabled.
    #[must_use]
    pub fn early_stop(&self) -> bool {
        self.early_stop
    }

    /// Return the forest-level RNG seed.
    #[must_use]
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Fit a classification forest on string labels.
    ///
    /// Labels are recoded to dense ids in first-appearance order; the
    /// resulting class table is shared by every tree.
    ///
    /// # Errors
    ///
    /// | Variant | When |
    /// |---|---|
    /// | [`RfError::InvalidTreeCount`] | `trees` is zero |
    /// | [`RfError::InvalidMinSplit`] | `min_split` < 2 |
    /// | [`RfError::InvalidMinLeaf`] | `min_leaf` < 1 |
    /// | [`RfError::InvalidMaxFeatures`] | resolved value outside `[1, F]` |
    /// | [`RfError::EmptyDataset`] | `x` has zero rows |
    /// | [`RfError::ZeroFeatures`] | rows have zero columns |
    /// | [`RfError::FeatureCountMismatch`] | rows have inconsistent lengths |
    /// | [`RfError::TargetCountMismatch`] | `y.len() != x.len()` |
    /// | [`RfError::NonFiniteValue`] | any value is NaN or infinite |
    /// | [`RfError::OobEvaluationFailed`] | OOB enabled but no sample covered |
    pub fn fit_classifier(
        &self,
        x: &[Vec<f64>],
        y: &[String],
    ) -> Result<ClassifierForest, RfError> {
        crate::forest::train_classifier(self, x, y)
    }

    /// Fit a regression forest on float targets.
    ///
    /// Uses variance impurity; `early_stop` halts tree collection once the
    /// running OOB MSE converges.
    ///
    /// # Errors
    ///
    /// Same table as [`ForestConfig::fit_classifier`].
    pub fn fit_regressor(&self, x: &[Vec<f64>], y: &[f64]) -> Result<RegressorForest, RfError> {
        crate::forest::train_regressor(self, x, y)
    }
}

impl Default for ForestConfig {
    fn default() -> Self {
        Self::new()
    }
}
