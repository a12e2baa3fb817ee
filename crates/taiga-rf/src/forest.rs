//! Forest training over a channel-fed worker pool, and ensemble prediction.
//!
//! A producer enqueues one bootstrap task per tree and closes the channel;
//! `W` scoped worker threads each grow trees and send them back on a result
//! channel. The main thread appends trees in receipt order, so fits with one
//! worker are fully reproducible while larger pools may reorder trees (but
//! never change per-tree content, since every task carries its own seed).

use std::collections::HashMap;
use std::sync::Mutex;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::iter::{IntoParallelIterator, ParallelIterator};
use tracing::{debug, info, instrument};

use crate::config::ForestConfig;
use crate::error::RfError;
use crate::importance::aggregate_trees;
use crate::objective::{ClassCounts, SquaredError};
use crate::oob::{
    MeanCounter, OobClassification, OobRegression, VoteCounter, bootstrap_sample,
};
use crate::tree::{Tree, TreeBuilder, TreeParams, argmax_f64};

/// OOB MSE convergence tolerance for regression early stopping.
const EARLY_STOP_TOL: f64 = 1e-6;

/// One unit of work for the pool: a bootstrap sample plus the seed for the
/// tree grown from it.
struct FitTask {
    seed: u64,
    indices: Vec<usize>,
    in_bag: Vec<bool>,
}

/// Draw every bootstrap sample and per-tree seed from the forest-level
/// master RNG, so the full task list is a pure function of the seed.
fn make_tasks(n_trees: usize, n_samples: usize, seed: u64) -> Vec<FitTask> {
    let mut master = ChaCha8Rng::seed_from_u64(seed);
    (0..n_trees)
        .map(|_| {
            let (indices, in_bag) = bootstrap_sample(n_samples, &mut master);
            FitTask {
                seed: master.r#gen(),
                indices,
                in_bag,
            }
        })
        .collect()
}

/// Validate the training matrix and config; returns `(n_samples, n_features)`.
fn validate(
    config: &ForestConfig,
    x: &[Vec<f64>],
    n_targets: usize,
) -> Result<(usize, usize), RfError> {
    if config.trees == 0 {
        return Err(RfError::InvalidTreeCount { n_trees: 0 });
    }
    if config.min_split < 2 {
        return Err(RfError::InvalidMinSplit {
            min_split: config.min_split,
        });
    }
    if config.min_leaf < 1 {
        return Err(RfError::InvalidMinLeaf {
            min_leaf: config.min_leaf,
        });
    }

    if x.is_empty() {
        return Err(RfError::EmptyDataset);
    }
    let n_samples = x.len();
    let n_features = x[0].len();
    if n_features == 0 {
        return Err(RfError::ZeroFeatures);
    }
    if n_targets != n_samples {
        return Err(RfError::TargetCountMismatch {
            expected: n_samples,
            got: n_targets,
        });
    }
    for (sample_index, row) in x.iter().enumerate() {
        if row.len() != n_features {
            return Err(RfError::FeatureCountMismatch {
                expected: n_features,
                got: row.len(),
                sample_index,
            });
        }
        for (feature_index, &val) in row.iter().enumerate() {
            if !val.is_finite() {
                return Err(RfError::NonFiniteValue {
                    sample_index,
                    feature_index,
                });
            }
        }
    }

    Ok((n_samples, n_features))
}

/// Resolve the per-split feature budget against the task default.
fn resolve_max_features(
    requested: Option<usize>,
    n_features: usize,
    default: usize,
) -> Result<usize, RfError> {
    let resolved = requested.unwrap_or(default);
    if resolved == 0 || resolved > n_features {
        return Err(RfError::InvalidMaxFeatures {
            max_features: resolved,
            n_features,
        });
    }
    Ok(resolved)
}

/// A fitted classification forest.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ClassifierForest {
    pub(crate) trees: Vec<Tree<Vec<usize>>>,
    pub(crate) n_features: usize,
    pub(crate) n_samples: usize,
    pub(crate) classes: Vec<String>,
    pub(crate) oob: Option<OobClassification>,
    pub(crate) config: ForestConfig,
}

/// A fitted regression forest.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct RegressorForest {
    pub(crate) trees: Vec<Tree<f64>>,
    pub(crate) n_features: usize,
    pub(crate) n_samples: usize,
    pub(crate) oob: Option<OobRegression>,
    pub(crate) config: ForestConfig,
}

#[instrument(skip_all, fields(n_trees = config.trees, n_samples = x.len()))]
pub(crate) fn train_classifier(
    config: &ForestConfig,
    x: &[Vec<f64>],
    y: &[String],
) -> Result<ClassifierForest, RfError> {
    let (n_samples, n_features) = validate(config, x, y.len())?;

    // Recode labels as dense ids in first-appearance order.
    let mut ids: HashMap<&str, usize> = HashMap::new();
    let mut classes: Vec<String> = Vec::new();
    let mut y_ids = Vec::with_capacity(y.len());
    for label in y {
        let id = *ids.entry(label.as_str()).or_insert_with(|| {
            classes.push(label.clone());
            classes.len() - 1
        });
        y_ids.push(id);
    }
    let n_classes = classes.len();

    let sqrt_default = (n_features as f64).sqrt() as usize;
    let max_features = resolve_max_features(config.max_features, n_features, sqrt_default)?;
    let params = TreeParams {
        min_split: config.min_split,
        min_leaf: config.min_leaf,
        max_depth: config.max_depth,
        max_features,
    };
    let criterion = config.criterion;
    let workers = config.workers.max(1);

    info!(
        n_samples,
        n_features,
        n_classes,
        max_features,
        workers,
        "fitting classification forest"
    );

    let (task_tx, task_rx) = crossbeam_channel::unbounded();
    let (done_tx, done_rx) = crossbeam_channel::unbounded();
    for task in make_tasks(config.trees, n_samples, config.seed) {
        task_tx.send(task).expect("task queue receiver alive");
    }
    drop(task_tx);

    let oob_counter = config
        .compute_oob
        .then(|| Mutex::new(VoteCounter::new(n_samples, n_classes)));

    let mut trees = Vec::with_capacity(config.trees);
    let mut first_error: Option<RfError> = None;

    std::thread::scope(|scope| {
        for _ in 0..workers {
            let task_rx = task_rx.clone();
            let done_tx = done_tx.clone();
            let y_ids = &y_ids;
            let oob_counter = &oob_counter;
            scope.spawn(move || {
                while let Ok(task) = task_rx.recv() {
                    let objective = ClassCounts::new(y_ids, n_classes, criterion);
                    let built = TreeBuilder::new(x, objective, params, task.seed).build(task.indices);
                    if let (Ok(tree), Some(counter)) = (&built, oob_counter.as_ref()) {
                        counter
                            .lock()
                            .expect("OOB counter lock poisoned")
                            .record_tree(tree, x, &task.in_bag);
                    }
                    if done_tx.send(built).is_err() {
                        break;
                    }
                }
            });
        }
        drop(done_tx);

        // Append trees in receipt order; on failure, drain the channel fully
        // before the first error is reported.
        for result in done_rx.iter() {
            match result {
                Ok(tree) => {
                    if first_error.is_none() {
                        trees.push(tree);
                    }
                }
                Err(e) => {
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
            }
        }
    });

    if let Some(e) = first_error {
        return Err(e);
    }

    let oob = match oob_counter {
        Some(counter) => Some(
            counter
                .into_inner()
                .expect("OOB counter lock poisoned")
                .finalize(&y_ids, n_classes)?,
        ),
        None => None,
    };

    debug!(n_trees = trees.len(), "classification forest complete");

    Ok(ClassifierForest {
        trees,
        n_features,
        n_samples,
        classes,
        oob,
        config: config.clone(),
    })
}

#[instrument(skip_all, fields(n_trees = config.trees, n_samples = x.len()))]
pub(crate) fn train_regressor(
    config: &ForestConfig,
    x: &[Vec<f64>],
    y: &[f64],
) -> Result<RegressorForest, RfError> {
    let (n_samples, n_features) = validate(config, x, y.len())?;

    let third_default = (n_features / 3).max(1);
    let max_features = resolve_max_features(config.max_features, n_features, third_default)?;
    let params = TreeParams {
        min_split: config.min_split,
        min_leaf: config.min_leaf,
        max_depth: config.max_depth,
        max_features,
    };
    let workers = config.workers.max(1);
    let compute_oob = config.compute_oob || config.early_stop;

    info!(
        n_samples,
        n_features,
        max_features,
        workers,
        early_stop = config.early_stop,
        "fitting regression forest"
    );

    let (task_tx, task_rx) = crossbeam_channel::unbounded();
    let (done_tx, done_rx) = crossbeam_channel::unbounded();
    for task in make_tasks(config.trees, n_samples, config.seed) {
        task_tx.send(task).expect("task queue receiver alive");
    }
    drop(task_tx);

    let oob_counter = compute_oob.then(|| Mutex::new(MeanCounter::new(n_samples)));

    let mut trees = Vec::with_capacity(config.trees);
    let mut first_error: Option<RfError> = None;

    std::thread::scope(|scope| {
        for _ in 0..workers {
            let task_rx = task_rx.clone();
            let done_tx = done_tx.clone();
            let oob_counter = &oob_counter;
            scope.spawn(move || {
                while let Ok(task) = task_rx.recv() {
                    let objective = SquaredError::new(y);
                    let built = TreeBuilder::new(x, objective, params, task.seed).build(task.indices);
                    if let (Ok(tree), Some(counter)) = (&built, oob_counter.as_ref()) {
                        counter
                            .lock()
                            .expect("OOB counter lock poisoned")
                            .record_tree(tree, x, &task.in_bag);
                    }
                    if done_tx.send(built).is_err() {
                        break;
                    }
                }
            });
        }
        drop(done_tx);

        let mut prev_mse = 0.0;
        for (i, result) in done_rx.iter().enumerate() {
            match result {
                Ok(tree) => {
                    if first_error.is_some() {
                        continue;
                    }
                    if config.early_stop
                        && let Some(counter) = &oob_counter
                        && let Some(m) = counter
                            .lock()
                            .expect("OOB counter lock poisoned")
                            .metrics(y)
                    {
                        if i > 4 && (m.mse - prev_mse).abs() < EARLY_STOP_TOL {
                            info!(n_trees = trees.len(), mse = m.mse, "OOB error converged");
                            break;
                        }
                        prev_mse = m.mse;
                    }
                    trees.push(tree);
                }
                Err(e) => {
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
            }
        }
    });

    if let Some(e) = first_error {
        return Err(e);
    }

    let oob = match oob_counter {
        Some(counter) => {
            let counter = counter.into_inner().expect("OOB counter lock poisoned");
            Some(counter.metrics(y).ok_or_else(|| RfError::OobEvaluationFailed {
                reason: "no sample was out of bag for any tree".to_string(),
            })?)
        }
        None => None,
    };

    debug!(n_trees = trees.len(), "regression forest complete");

    Ok(RegressorForest {
        trees,
        n_features,
        n_samples,
        oob,
        config: config.clone(),
    })
}

impl ClassifierForest {
    /// Predict the class id for each row: the argmax of the averaged
    /// per-tree leaf distributions, so [`ClassifierForest::predict_proba`]
    /// and this method agree on every row.
    ///
    /// # Errors
    ///
    /// Returns [`RfError::PredictionFeatureMismatch`] when any row length
    /// differs from the training feature count.
    pub fn predict(&self, rows: &[Vec<f64>]) -> Result<Vec<usize>, RfError> {
        Ok(self
            .predict_proba(rows)?
            .iter()
            .map(|probs| argmax_f64(probs))
            .collect())
    }

    /// Per-class probabilities for each row, averaged across trees. Rows are
    /// traversed in parallel.
    ///
    /// # Errors
    ///
    /// Returns [`RfError::PredictionFeatureMismatch`] when any row length
    /// differs from the training feature count.
    pub fn predict_proba(&self, rows: &[Vec<f64>]) -> Result<Vec<Vec<f64>>, RfError> {
        self.check_rows(rows)?;
        Ok(rows.into_par_iter().map(|row| self.proba_row(row)).collect())
    }

    fn proba_row(&self, row: &[f64]) -> Vec<f64> {
        let mut avg = vec![0.0f64; self.classes.len()];
        for tree in &self.trees {
            for (slot, p) in avg.iter_mut().zip(tree.class_distribution(row)) {
                *slot += p;
            }
        }
        let n = self.trees.len() as f64;
        for v in &mut avg {
            *v /= n;
        }
        avg
    }

    fn check_rows(&self, rows: &[Vec<f64>]) -> Result<(), RfError> {
        for row in rows {
            if row.len() != self.n_features {
                return Err(RfError::PredictionFeatureMismatch {
                    expected: self.n_features,
                    got: row.len(),
                });
            }
        }
        Ok(())
    }

    /// Forest-level variable importance: per-tree vectors summed and
    /// normalized to 1.0.
    #[must_use]
    pub fn var_importance(&self) -> Vec<f64> {
        aggregate_trees(
            self.trees.iter().map(Tree::feature_importance),
            self.n_features,
        )
    }

    /// Return the class table; `predict` ids index into it.
    #[must_use]
    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    /// Return the fitted trees.
    #[must_use]
    pub fn trees(&self) -> &[Tree<Vec<usize>>] {
        &self.trees
    }

    /// Return the number of trees kept in the forest.
    #[must_use]
    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    /// Return the number of feature columns the forest was trained on.
    #[must_use]
    pub fn n_features(&self) -> usize {
        self.n_features
    }

    /// Return the number of training samples.
    #[must_use]
    pub fn n_samples(&self) -> usize {
        self.n_samples
    }

    /// Return the OOB diagnostics, when OOB evaluation was enabled.
    #[must_use]
    pub fn oob(&self) -> Option<&OobClassification> {
        self.oob.as_ref()
    }

    /// Return the config the forest was fitted with.
    #[must_use]
    pub fn config(&self) -> &ForestConfig {
        &self.config
    }
}

impl RegressorForest {
    /// Predict the expected value for each row: the mean of per-tree leaf
    /// means. Rows are traversed in parallel.
    ///
    /// # Errors
    ///
    /// Returns [`RfError::PredictionFeatureMismatch`] when any row length
    /// differs from the training feature count.
    pub fn predict(&self, rows: &[Vec<f64>]) -> Result<Vec<f64>, RfError> {
        for row in rows {
            if row.len() != self.n_features {
                return Err(RfError::PredictionFeatureMismatch {
                    expected: self.n_features,
                    got: row.len(),
                });
            }
        }
        let n = self.trees.len() as f64;
        Ok(rows
            .into_par_iter()
            .map(|row| {
                let sum: f64 = self.trees.iter().map(|t| t.predict_row(row)).sum();
                sum / n
            })
            .collect())
    }

    /// Forest-level variable importance: per-tree vectors summed and
    /// normalized to 1.0.
    #[must_use]
    pub fn var_importance(&self) -> Vec<f64> {
        aggregate_trees(
            self.trees.iter().map(Tree::feature_importance),
            self.n_features,
        )
    }

    /// Return the fitted trees.
    #[must_use]
    pub fn trees(&self) -> &[Tree<f64>] {
        &self.trees
    }

    /// Return the number of trees kept in the forest (early stopping may
    /// leave fewer than requested).
    #[must_use]
    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    /// Return the number of feature columns the forest was trained on.
    #[must_use]
    pub fn n_features(&self) -> usize {
        self.n_features
    }

    /// Return the number of training samples.
    #[must_use]
    pub fn n_samples(&self) -> usize {
        self.n_samples
    }

    /// Return the OOB diagnostics, when OOB evaluation was enabled.
    #[must_use]
    pub fn oob(&self) -> Option<&OobRegression> {
        self.oob.as_ref()
    }

    /// Return the config the forest was fitted with.
    #[must_use]
    pub fn config(&self) -> &ForestConfig {
        &self.config
    }
}
