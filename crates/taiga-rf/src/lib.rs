//! Random forest classification and regression on dense numeric matrices.
//!
//! CART trees grown iteratively over bootstrap samples, with Gini/entropy or
//! variance impurity, a specialized dual-key sort in the split search, a
//! channel-fed worker pool for parallel fitting, out-of-bag diagnostics,
//! variable importance, and versioned model serialization.

mod config;
mod confusion;
mod error;
mod forest;
mod importance;
mod impurity;
mod node;
mod objective;
mod oob;
mod serialize;
mod sort;
mod split;
mod tree;

pub use config::ForestConfig;
pub use confusion::ConfusionMatrix;
pub use error::RfError;
pub use forest::{ClassifierForest, RegressorForest};
pub use importance::{RankedFeature, rank_features};
pub use impurity::{Criterion, EPSILON};
pub use node::{Node, NodeIndex};
pub use oob::{OobClassification, OobRegression};
pub use serialize::{Model, ModelKind};
pub use sort::dual_sort;
pub use tree::Tree;
