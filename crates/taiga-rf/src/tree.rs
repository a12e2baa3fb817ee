//! Iterative CART tree construction and prediction.

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::RfError;
use crate::impurity::EPSILON;
use crate::node::{Node, NodeIndex};
use crate::objective::Objective;
use crate::split::Splitter;

/// Hyperparameters for growing a single tree, already resolved to concrete
/// values by the forest layer.
#[derive(Debug, Clone, Copy)]
pub(crate) struct TreeParams {
    pub(crate) min_split: usize,
    pub(crate) min_leaf: usize,
    pub(crate) max_depth: Option<usize>,
    pub(crate) max_features: usize,
}

/// One unexpanded node: the arena slot to fill, the slice of the sample-index
/// buffer that reached it, the constant-feature mask inherited from the
/// parent, and the node's depth.
struct WorkItem {
    node: usize,
    lo: usize,
    hi: usize,
    depth: usize,
    constant: Vec<bool>,
}

/// Grows one tree over a sample-index subset of the training matrix.
///
/// Expansion is driven by an explicit LIFO stack, never recursion, so deep
/// trees on unregularized data cannot exhaust the call stack. The index
/// buffer is owned by the build and partitioned in place; node slices are
/// integer ranges into it.
pub(crate) struct TreeBuilder<'a, O: Objective> {
    x: &'a [Vec<f64>],
    objective: O,
    params: TreeParams,
    rng: ChaCha8Rng,
}

impl<'a, O: Objective> TreeBuilder<'a, O> {
    pub(crate) fn new(x: &'a [Vec<f64>], objective: O, params: TreeParams, seed: u64) -> Self {
        Self {
            x,
            objective,
            params,
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    /// Build a tree over the samples named by `idx` (a bootstrap sample, so
    /// indices may repeat).
    ///
    /// # Errors
    ///
    /// Returns [`RfError::InternalInvariant`] when `idx` is empty or an
    /// in-place partition disagrees with the splitter's pivot.
    pub(crate) fn build(mut self, mut idx: Vec<usize>) -> Result<Tree<O::Leaf>, RfError> {
        if idx.is_empty() {
            return Err(RfError::InternalInvariant {
                detail: "empty bootstrap sample".to_string(),
            });
        }

        let n_features = self.x[0].len();
        let mut splitter = Splitter::new(
            idx.len(),
            n_features,
            self.params.max_features,
            self.params.min_leaf,
        );

        let mut nodes: Vec<Node<O::Leaf>> = Vec::new();
        nodes.push(placeholder());

        let mut stack = vec![WorkItem {
            node: 0,
            lo: 0,
            hi: idx.len(),
            depth: 0,
            constant: vec![false; n_features],
        }];

        while let Some(mut w) = stack.pop() {
            let n = w.hi - w.lo;
            let (impurity, value) = self.objective.begin(&idx[w.lo..w.hi]);

            let depth_capped = self.params.max_depth.is_some_and(|d| w.depth == d);
            if n < self.params.min_split
                || n < 2 * self.params.min_leaf
                || depth_capped
                || impurity <= EPSILON
            {
                nodes[w.node] = Node::Leaf {
                    value,
                    impurity,
                    n_samples: n,
                };
                continue;
            }

            let found = splitter.best_split(
                self.x,
                &mut idx[w.lo..w.hi],
                &mut w.constant,
                &mut self.objective,
                &mut self.rng,
            );
            let Some(split) = found else {
                nodes[w.node] = Node::Leaf {
                    value,
                    impurity,
                    n_samples: n,
                };
                continue;
            };

            // Partition the node's index slice in place: values below the
            // threshold to the front, the rest to the back. Training sends
            // `< threshold` left so that prediction's `> threshold` goes
            // right and equality lands left.
            let slice = &mut idx[w.lo..w.hi];
            let (mut i, mut j) = (0, n);
            while i < j {
                if self.x[slice[i]][split.feature] < split.threshold {
                    i += 1;
                } else {
                    j -= 1;
                    slice.swap(i, j);
                }
            }
            if i != split.pivot {
                return Err(RfError::InternalInvariant {
                    detail: format!(
                        "partition produced {i} left samples, splitter expected {}",
                        split.pivot
                    ),
                });
            }

            let left = NodeIndex::new(nodes.len());
            nodes.push(placeholder());
            let right = NodeIndex::new(nodes.len());
            nodes.push(placeholder());
            nodes[w.node] = Node::Split {
                feature: split.feature,
                threshold: split.threshold,
                left,
                right,
                impurity,
                n_samples: n,
            };

            let mid = w.lo + split.pivot;
            stack.push(WorkItem {
                node: left.index(),
                lo: w.lo,
                hi: mid,
                depth: w.depth + 1,
                constant: w.constant.clone(),
            });
            stack.push(WorkItem {
                node: right.index(),
                lo: mid,
                hi: w.hi,
                depth: w.depth + 1,
                constant: w.constant,
            });
        }

        Ok(Tree { nodes, n_features })
    }
}

fn placeholder<L: Default>() -> Node<L> {
    Node::Leaf {
        value: L::default(),
        impurity: 0.0,
        n_samples: 0,
    }
}

/// A fitted CART tree, frozen after construction.
///
/// Rows are classified by walking from the root: right when
/// `row[feature] > threshold`, left otherwise.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Tree<L> {
    pub(crate) nodes: Vec<Node<L>>,
    pub(crate) n_features: usize,
}

impl<L> Tree<L> {
    /// Return the total number of nodes (splits and leaves).
    #[must_use]
    pub fn n_nodes(&self) -> usize {
        self.nodes.len()
    }

    /// Return the number of feature columns this tree was trained on.
    #[must_use]
    pub fn n_features(&self) -> usize {
        self.n_features
    }

    /// Return the maximum depth of the tree; a lone root leaf has depth 0.
    #[must_use]
    pub fn depth(&self) -> usize {
        let mut max_depth = 0;
        let mut queue = std::collections::VecDeque::new();
        queue.push_back((0usize, 0usize));
        while let Some((node, d)) = queue.pop_front() {
            match &self.nodes[node] {
                Node::Leaf { .. } => max_depth = max_depth.max(d),
                Node::Split { left, right, .. } => {
                    queue.push_back((left.index(), d + 1));
                    queue.push_back((right.index(), d + 1));
                }
            }
        }
        max_depth
    }

    /// Accumulated per-feature importance: for every split node,
    /// `n·I - nL·IL - nR·IR`, scaled by the root sample count and then
    /// normalized to sum to 1. All zeros for a single-leaf tree.
    #[must_use]
    pub fn feature_importance(&self) -> Vec<f64> {
        let mut imp = vec![0.0; self.n_features];
        for node in &self.nodes {
            if let Node::Split {
                feature,
                left,
                right,
                impurity,
                n_samples,
                ..
            } = node
            {
                let l = &self.nodes[left.index()];
                let r = &self.nodes[right.index()];
                imp[*feature] += *n_samples as f64 * impurity
                    - l.n_samples() as f64 * l.impurity()
                    - r.n_samples() as f64 * r.impurity();
            }
        }

        let root_samples = self.nodes[0].n_samples() as f64;
        for v in &mut imp {
            *v /= root_samples;
        }
        let total: f64 = imp.iter().sum();
        if total > 0.0 {
            for v in &mut imp {
                *v /= total;
            }
        }
        imp
    }

    /// Walk from the root to the leaf covering `row`.
    ///
    /// `row` must have `n_features` entries; the forest layer validates this
    /// before any traversal.
    fn leaf(&self, row: &[f64]) -> &Node<L> {
        let mut i = 0;
        loop {
            match &self.nodes[i] {
                Node::Leaf { .. } => return &self.nodes[i],
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                    ..
                } => {
                    i = if row[*feature] > *threshold {
                        right.index()
                    } else {
                        left.index()
                    };
                }
            }
        }
    }
}

impl Tree<Vec<usize>> {
    /// Predict the majority class id for one row.
    #[must_use]
    pub fn predict_row(&self, row: &[f64]) -> usize {
        match self.leaf(row) {
            Node::Leaf { value, .. } => argmax_counts(value),
            Node::Split { .. } => unreachable!("leaf() always returns a leaf"),
        }
    }

    /// Return the leaf's class distribution for one row: per-class counts
    /// divided by the leaf's sample count.
    #[must_use]
    pub fn class_distribution(&self, row: &[f64]) -> Vec<f64> {
        match self.leaf(row) {
            Node::Leaf {
                value, n_samples, ..
            } => {
                let n = *n_samples as f64;
                value.iter().map(|&c| c as f64 / n).collect()
            }
            Node::Split { .. } => unreachable!("leaf() always returns a leaf"),
        }
    }
}

impl Tree<f64> {
    /// Predict the leaf mean for one row.
    #[must_use]
    pub fn predict_row(&self, row: &[f64]) -> f64 {
        match self.leaf(row) {
            Node::Leaf { value, .. } => *value,
            Node::Split { .. } => unreachable!("leaf() always returns a leaf"),
        }
    }
}

/// First maximum wins: later ties never displace an earlier winner, matching
/// the splitter's strictly-greater-than rule.
pub(crate) fn argmax_counts(counts: &[usize]) -> usize {
    let mut best = 0;
    for (i, &c) in counts.iter().enumerate().skip(1) {
        if c > counts[best] {
            best = i;
        }
    }
    best
}

/// See [`argmax_counts`]; same rule over floats.
pub(crate) fn argmax_f64(values: &[f64]) -> usize {
    let mut best = 0;
    for (i, &v) in values.iter().enumerate().skip(1) {
        if v > values[best] {
            best = i;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::{Tree, TreeBuilder, TreeParams, argmax_counts, argmax_f64};
    use crate::impurity::Criterion;
    use crate::node::Node;
    use crate::objective::{ClassCounts, SquaredError};

    fn params(max_features: usize) -> TreeParams {
        TreeParams {
            min_split: 2,
            min_leaf: 1,
            max_depth: None,
            max_features,
        }
    }

    fn fit_classifier(
        x: &[Vec<f64>],
        y: &[usize],
        n_classes: usize,
        params: TreeParams,
        seed: u64,
    ) -> Tree<Vec<usize>> {
        let objective = ClassCounts::new(y, n_classes, Criterion::Gini);
        let idx: Vec<usize> = (0..x.len()).collect();
        TreeBuilder::new(x, objective, params, seed)
            .build(idx)
            .unwrap()
    }

    fn fit_regressor(x: &[Vec<f64>], y: &[f64], params: TreeParams, seed: u64) -> Tree<f64> {
        let objective = SquaredError::new(y);
        let idx: Vec<usize> = (0..x.len()).collect();
        TreeBuilder::new(x, objective, params, seed)
            .build(idx)
            .unwrap()
    }

    /// Every internal node's children partition its samples, respect
    /// min_leaf, and class counts sum to the sample count.
    fn check_invariants(tree: &Tree<Vec<usize>>, min_leaf: usize) {
        for node in &tree.nodes {
            match node {
                Node::Split {
                    left,
                    right,
                    n_samples,
                    ..
                } => {
                    let l = &tree.nodes[left.index()];
                    let r = &tree.nodes[right.index()];
                    assert_eq!(l.n_samples() + r.n_samples(), *n_samples);
                    assert!(l.n_samples() >= min_leaf);
                    assert!(r.n_samples() >= min_leaf);
                }
                Node::Leaf {
                    value, n_samples, ..
                } => {
                    assert_eq!(value.iter().sum::<usize>(), *n_samples);
                }
            }
        }
    }

    #[test]
    fn pure_labels_single_leaf() {
        let x = vec![vec![1.0, 2.0], vec![3.0, 4.0], vec![5.0, 6.0]];
        let y = vec![0, 0, 0];
        let tree = fit_classifier(&x, &y, 1, params(2), 42);
        assert_eq!(tree.n_nodes(), 1);
        assert_eq!(tree.predict_row(&[2.0, 3.0]), 0);
    }

    #[test]
    fn linearly_separable_correct_split() {
        let x: Vec<Vec<f64>> = [1.0, 2.0, 3.0, 10.0, 11.0, 12.0]
            .iter()
            .map(|&v| vec![v, 0.0])
            .collect();
        let y = vec![0, 0, 0, 1, 1, 1];
        let tree = fit_classifier(&x, &y, 2, params(2), 42);
        assert_eq!(tree.predict_row(&[2.0, 0.0]), 0);
        assert_eq!(tree.predict_row(&[11.0, 0.0]), 1);
        check_invariants(&tree, 1);
    }

    #[test]
    fn threshold_equality_goes_left() {
        let x = vec![vec![1.0], vec![2.0], vec![3.0], vec![4.0]];
        let y = vec![0, 0, 1, 1];
        let tree = fit_classifier(&x, &y, 2, params(1), 42);
        // The only admissible boundary is between 2.0 and 3.0 → threshold 2.5.
        assert_eq!(tree.predict_row(&[2.5]), 0);
        assert_eq!(tree.predict_row(&[2.500001]), 1);
    }

    #[test]
    fn zero_gain_split_not_taken() {
        // XOR: every single split leaves both children at the parent's
        // impurity, and a zero delta never beats the running best, so the
        // root stays a leaf.
        let x = vec![
            vec![0.0, 0.0],
            vec![0.0, 1.0],
            vec![1.0, 0.0],
            vec![1.0, 1.0],
        ];
        let y = vec![0, 1, 1, 0];
        let tree = fit_classifier(&x, &y, 2, params(2), 42);
        assert_eq!(tree.n_nodes(), 1);
    }

    #[test]
    fn max_depth_bounds_every_path() {
        let x: Vec<Vec<f64>> = (0..32).map(|i| vec![f64::from(i)]).collect();
        let y: Vec<usize> = (0..32).map(|i| (i % 2) as usize).collect();
        let capped = TreeParams {
            max_depth: Some(3),
            ..params(1)
        };
        let tree = fit_classifier(&x, &y, 2, capped, 7);
        assert!(tree.depth() <= 3);
    }

    #[test]
    fn min_leaf_respected() {
        let x: Vec<Vec<f64>> = (0..40).map(|i| vec![f64::from(i), f64::from(i % 7)]).collect();
        let y: Vec<usize> = (0..40).map(|i| usize::from(i >= 13)).collect();
        let p = TreeParams {
            min_leaf: 5,
            ..params(2)
        };
        let tree = fit_classifier(&x, &y, 2, p, 3);
        check_invariants(&tree, 5);
    }

    #[test]
    fn training_rows_land_in_their_partition() {
        // The split comparison used at prediction time must agree with the
        // partition made at training time for every training sample.
        let x: Vec<Vec<f64>> = (0..60)
            .map(|i| vec![f64::from(i % 10), f64::from(i % 4), f64::from(i % 3)])
            .collect();
        let y: Vec<usize> = (0..60).map(|i| (i % 3) as usize).collect();
        let tree = fit_classifier(&x, &y, 3, params(3), 11);
        check_invariants(&tree, 1);
        // A fully grown tree on distinct rows predicts training labels at
        // any leaf that became pure.
        let correct = x
            .iter()
            .zip(&y)
            .filter(|&(ref row, &label)| tree.predict_row(row) == label)
            .count();
        assert!(correct as f64 / 60.0 > 0.9, "correct = {correct}");
    }

    #[test]
    fn deterministic_with_same_seed() {
        let x: Vec<Vec<f64>> = (0..30)
            .map(|i| vec![f64::from(i), f64::from((i * 7) % 13)])
            .collect();
        let y: Vec<usize> = (0..30).map(|i| usize::from(i % 5 < 2)).collect();
        let t1 = fit_classifier(&x, &y, 2, params(1), 123);
        let t2 = fit_classifier(&x, &y, 2, params(1), 123);
        assert_eq!(t1, t2);
    }

    #[test]
    fn importance_sums_to_one() {
        let x: Vec<Vec<f64>> = (0..20)
            .map(|i| vec![f64::from(i), f64::from(i % 2) * 100.0])
            .collect();
        let y: Vec<usize> = (0..20).map(|i| usize::from(i >= 10)).collect();
        let tree = fit_classifier(&x, &y, 2, params(2), 42);
        let imp = tree.feature_importance();
        let sum: f64 = imp.iter().sum();
        assert!((sum - 1.0).abs() < 1e-7, "sum = {sum}");
    }

    #[test]
    fn single_leaf_importance_all_zero() {
        let x = vec![vec![1.0], vec![2.0]];
        let y = vec![0, 0];
        let tree = fit_classifier(&x, &y, 1, params(1), 42);
        assert_eq!(tree.feature_importance(), vec![0.0]);
    }

    #[test]
    fn regression_tree_predicts_leaf_means() {
        let x: Vec<Vec<f64>> = [0.0, 1.0, 2.0, 10.0, 11.0, 12.0]
            .iter()
            .map(|&v| vec![v])
            .collect();
        let y = vec![5.0, 5.0, 5.0, 20.0, 20.0, 20.0];
        let tree = fit_regressor(&x, &y, params(1), 42);
        assert!((tree.predict_row(&[1.0]) - 5.0).abs() < 1e-12);
        assert!((tree.predict_row(&[11.0]) - 20.0).abs() < 1e-12);
    }

    #[test]
    fn empty_index_rejected() {
        let x = vec![vec![1.0]];
        let y = vec![0];
        let objective = ClassCounts::new(&y, 1, Criterion::Gini);
        let err = TreeBuilder::new(&x, objective, params(1), 42)
            .build(vec![])
            .unwrap_err();
        assert!(matches!(err, crate::RfError::InternalInvariant { .. }));
    }

    #[test]
    fn argmax_first_max_wins() {
        assert_eq!(argmax_counts(&[3, 5, 5, 1]), 1);
        assert_eq!(argmax_counts(&[0, 0]), 0);
        assert_eq!(argmax_f64(&[0.2, 0.4, 0.4]), 1);
    }
}
