//! Prediction and variable-importance output writers.

use std::io::{BufWriter, Write};
use std::path::Path;

use tracing::{info, instrument};

use crate::IoError;

/// Write one prediction per line.
///
/// # Errors
///
/// Returns [`IoError::WriteFile`] when the file cannot be created or written.
#[instrument(skip(predictions), fields(path = %path.as_ref().display(), n = predictions.len()))]
pub fn write_predictions(path: impl AsRef<Path>, predictions: &[String]) -> Result<(), IoError> {
    let path = path.as_ref();
    let write_err = |e: std::io::Error| IoError::WriteFile {
        path: path.to_path_buf(),
        source: e,
    };

    let file = std::fs::File::create(path).map_err(write_err)?;
    let mut w = BufWriter::new(file);
    for prediction in predictions {
        writeln!(w, "{prediction}").map_err(write_err)?;
    }
    w.flush().map_err(write_err)?;

    info!("predictions written");
    Ok(())
}

/// Write `(name, score)` importance pairs as CSV rows, scores in full
/// precision, in the order given.
///
/// # Errors
///
/// Returns [`IoError::CsvWrite`] when the file cannot be created or written.
#[instrument(skip(scores), fields(path = %path.as_ref().display()))]
pub fn write_importance(path: impl AsRef<Path>, scores: &[(String, f64)]) -> Result<(), IoError> {
    let path = path.as_ref();
    let csv_err = |e: csv::Error| IoError::CsvWrite {
        path: path.to_path_buf(),
        source: e,
    };

    let mut wtr = csv::Writer::from_path(path).map_err(csv_err)?;
    for (name, score) in scores {
        let score = format!("{score}");
        wtr.write_record([name.as_str(), score.as_str()])
            .map_err(csv_err)?;
    }
    wtr.flush().map_err(|e| IoError::WriteFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    info!(n_features = scores.len(), "variable importance written");
    Ok(())
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::{write_importance, write_predictions};

    #[test]
    fn predictions_one_per_line() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("pred.txt");
        let preds = vec![
            "setosa".to_string(),
            "virginica".to_string(),
            "setosa".to_string(),
        ];
        write_predictions(&path, &preds).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, "setosa\nvirginica\nsetosa\n");
    }

    #[test]
    fn regression_predictions_keep_precision() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("pred.txt");
        write_predictions(&path, &["33.4".to_string(), "0.123456789012345".to_string()]).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, "33.4\n0.123456789012345\n");
    }

    #[test]
    fn importance_csv_rows() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("imp.csv");
        let scores = vec![("petal".to_string(), 0.75), ("sepal".to_string(), 0.25)];
        write_importance(&path, &scores).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, "petal,0.75\nsepal,0.25\n");
    }

    #[test]
    fn unwritable_path_errors() {
        let err = write_predictions("/nonexistent/dir/pred.txt", &[]).unwrap_err();
        assert!(matches!(err, crate::IoError::WriteFile { .. }));
    }
}
