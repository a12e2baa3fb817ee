//! Model persistence: a self-describing, versioned bincode envelope.

use std::path::Path;

use tracing::{debug, info, instrument};

use crate::error::RfError;
use crate::forest::{ClassifierForest, RegressorForest};

/// Current binary format version.
const FORMAT_VERSION: u32 = 1;

/// The fitted forest behind a [`Model`].
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum ModelKind {
    /// Classification forest with its class table.
    Classifier(ClassifierForest),
    /// Regression forest.
    Regressor(RegressorForest),
}

/// A trained model bundled with the metadata the CLI needs: the forest
/// (including hyperparameters and OOB diagnostics) and the feature names.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Model {
    /// The fitted forest.
    pub kind: ModelKind,
    /// Feature column names, parallel to the training matrix columns.
    pub var_names: Vec<String>,
}

/// Versioned envelope written to disk; the version tag leads so incompatible
/// files fail fast.
#[derive(serde::Serialize, serde::Deserialize)]
struct ModelEnvelope {
    format_version: u32,
    model: Model,
}

impl Model {
    /// Wrap a fitted classification forest.
    #[must_use]
    pub fn classifier(forest: ClassifierForest, var_names: Vec<String>) -> Self {
        Self {
            kind: ModelKind::Classifier(forest),
            var_names,
        }
    }

    /// Wrap a fitted regression forest.
    #[must_use]
    pub fn regressor(forest: RegressorForest, var_names: Vec<String>) -> Self {
        Self {
            kind: ModelKind::Regressor(forest),
            var_names,
        }
    }

    /// Return `true` for regression models.
    #[must_use]
    pub fn is_regression(&self) -> bool {
        matches!(self.kind, ModelKind::Regressor(_))
    }

    /// Return the number of trees in the underlying forest.
    #[must_use]
    pub fn n_trees(&self) -> usize {
        match &self.kind {
            ModelKind::Classifier(f) => f.n_trees(),
            ModelKind::Regressor(f) => f.n_trees(),
        }
    }

    /// Return the number of training samples the forest was fitted on.
    #[must_use]
    pub fn n_samples(&self) -> usize {
        match &self.kind {
            ModelKind::Classifier(f) => f.n_samples(),
            ModelKind::Regressor(f) => f.n_samples(),
        }
    }

    /// Return the feature names.
    #[must_use]
    pub fn var_names(&self) -> &[String] {
        &self.var_names
    }

    /// Forest-level variable importance, normalized to sum to 1.0.
    #[must_use]
    pub fn var_importance(&self) -> Vec<f64> {
        match &self.kind {
            ModelKind::Classifier(f) => f.var_importance(),
            ModelKind::Regressor(f) => f.var_importance(),
        }
    }

    /// Predict each row as a string: the class name for classification, the
    /// shortest round-trip decimal for regression.
    ///
    /// # Errors
    ///
    /// Returns [`RfError::PredictionFeatureMismatch`] when a row length
    /// differs from the training feature count.
    pub fn predict_strings(&self, rows: &[Vec<f64>]) -> Result<Vec<String>, RfError> {
        match &self.kind {
            ModelKind::Classifier(f) => {
                let ids = f.predict(rows)?;
                Ok(ids.iter().map(|&id| f.classes()[id].clone()).collect())
            }
            ModelKind::Regressor(f) => {
                let values = f.predict(rows)?;
                Ok(values.iter().map(|v| format!("{v}")).collect())
            }
        }
    }

    /// Save the model to a binary file.
    ///
    /// The write is all-or-nothing: if it fails partway the file is removed,
    /// so a truncated model is never left behind.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`RfError::SerializeModel`] | bincode encoding failed |
    /// | [`RfError::WriteModel`] | file write failed |
    #[instrument(skip(self), fields(path = %path.as_ref().display()))]
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), RfError> {
        let path = path.as_ref();

        let envelope = ModelEnvelope {
            format_version: FORMAT_VERSION,
            model: self.clone(),
        };

        let bytes =
            bincode::serialize(&envelope).map_err(|e| RfError::SerializeModel { source: e })?;

        if let Err(e) = std::fs::write(path, &bytes) {
            let _ = std::fs::remove_file(path);
            return Err(RfError::WriteModel {
                path: path.to_path_buf(),
                source: e,
            });
        }

        info!(
            size_bytes = bytes.len(),
            n_trees = self.n_trees(),
            "model saved"
        );

        Ok(())
    }

    /// Load a model from a binary file, checking the format version.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`RfError::ReadModel`] | file read failed |
    /// | [`RfError::DeserializeModel`] | bincode decoding failed |
    /// | [`RfError::IncompatibleModelVersion`] | format version mismatch |
    #[instrument(fields(path = %path.as_ref().display()))]
    pub fn load(path: impl AsRef<Path>) -> Result<Self, RfError> {
        let path = path.as_ref();

        let bytes = std::fs::read(path).map_err(|e| RfError::ReadModel {
            path: path.to_path_buf(),
            source: e,
        })?;

        let envelope: ModelEnvelope =
            bincode::deserialize(&bytes).map_err(|e| RfError::DeserializeModel {
                path: path.to_path_buf(),
                source: e,
            })?;

        if envelope.format_version != FORMAT_VERSION {
            return Err(RfError::IncompatibleModelVersion {
                expected: FORMAT_VERSION,
                found: envelope.format_version,
                path: path.to_path_buf(),
            });
        }

        debug!(n_trees = envelope.model.n_trees(), "model loaded");

        Ok(envelope.model)
    }
}
