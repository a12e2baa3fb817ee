//! Input parsing and output writing for the taiga CLI.
//!
//! Reads dense CSV datasets (target column first, numeric features after),
//! inferring header presence and regression-vs-classification mode, and
//! writes prediction and variable-importance files.

mod error;
mod reader;
mod writer;

pub use error::IoError;
pub use reader::{Dataset, Targets, read_csv};
pub use writer::{write_importance, write_predictions};
