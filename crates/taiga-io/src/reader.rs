//! CSV reader with header and task-mode detection.
//!
//! Layout: the first column is the target, the remaining columns are numeric
//! features. The first row is treated as a header when any value beyond the
//! first is non-numeric; otherwise it is data and features are named
//! `X1..Xn`. Regression is inferred when every target parses as a float;
//! anything else (or the force flag) selects classification.

use std::path::Path;

use tracing::{debug, info, instrument};

use crate::IoError;

/// Target column of a parsed dataset.
#[derive(Debug, Clone, PartialEq)]
pub enum Targets {
    /// String class labels, one per row.
    Classification(Vec<String>),
    /// Float targets, one per row.
    Regression(Vec<f64>),
}

/// A parsed dense dataset: row-major features, targets, and feature names.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    /// Feature matrix, `x[row][feature]`.
    pub x: Vec<Vec<f64>>,
    /// Target column.
    pub targets: Targets,
    /// Feature column names (header values or generated `X1..Xn`).
    pub var_names: Vec<String>,
}

impl Dataset {
    /// Return `true` when the targets parsed as floats (regression mode).
    #[must_use]
    pub fn is_regression(&self) -> bool {
        matches!(self.targets, Targets::Regression(_))
    }

    /// Return the number of data rows.
    #[must_use]
    pub fn n_rows(&self) -> usize {
        self.x.len()
    }

    /// Return the number of feature columns.
    #[must_use]
    pub fn n_features(&self) -> usize {
        self.x.first().map_or(0, Vec::len)
    }
}

/// Read and parse a CSV file.
///
/// `force_classification` keeps string targets even when every value would
/// parse as a float.
///
/// # Errors
///
/// | Variant | Condition |
/// |---|---|
/// | [`IoError::FileNotFound`] | file missing or unreadable |
/// | [`IoError::CsvParse`] | malformed CSV record |
/// | [`IoError::EmptyDataset`] | zero data rows |
/// | [`IoError::TooFewColumns`] | a row has fewer than two columns |
/// | [`IoError::InconsistentRowLength`] | ragged rows |
/// | [`IoError::NonNumericValue`] | feature cell fails to parse |
#[instrument(skip_all, fields(path = %path.as_ref().display()))]
pub fn read_csv(path: impl AsRef<Path>, force_classification: bool) -> Result<Dataset, IoError> {
    let path = path.as_ref();

    let file = std::fs::File::open(path).map_err(|e| IoError::FileNotFound {
        path: path.to_path_buf(),
        source: e,
    })?;

    // Header detection is ours, so the reader is told there are no headers;
    // flexible(true) lets our own row-length check fire instead of a
    // low-level CsvParse error.
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(file);

    let mut x: Vec<Vec<f64>> = Vec::new();
    let mut raw_targets: Vec<String> = Vec::new();
    let mut var_names: Vec<String> = Vec::new();
    let mut expected_cols = 0usize;
    let mut numeric_targets = true;

    for (record_index, result) in rdr.records().enumerate() {
        let record = result.map_err(|e| IoError::CsvParse {
            path: path.to_path_buf(),
            offset: e.position().map_or(0, |p| p.byte()),
            source: e,
        })?;

        if record.len() < 2 {
            return Err(IoError::TooFewColumns {
                path: path.to_path_buf(),
                row_index: record_index,
            });
        }

        if record_index == 0 {
            expected_cols = record.len();
            if is_header(&record) {
                var_names = record.iter().skip(1).map(str::to_string).collect();
                continue;
            }
            var_names = (1..record.len()).map(|i| format!("X{i}")).collect();
        } else if record.len() != expected_cols {
            return Err(IoError::InconsistentRowLength {
                path: path.to_path_buf(),
                row_index: x.len(),
                expected: expected_cols,
                got: record.len(),
            });
        }

        let mut row = Vec::with_capacity(record.len() - 1);
        for (col_index, raw) in record.iter().skip(1).enumerate() {
            let value: f64 = raw.parse().map_err(|_| IoError::NonNumericValue {
                path: path.to_path_buf(),
                row_index: x.len(),
                col_index,
                raw: raw.to_string(),
            })?;
            row.push(value);
        }

        let target = record.get(0).unwrap_or("").to_string();
        if numeric_targets && target.parse::<f64>().is_err() {
            numeric_targets = false;
            debug!(row_index = x.len(), "target is not numeric, classification assumed");
        }

        x.push(row);
        raw_targets.push(target);
    }

    if x.is_empty() {
        return Err(IoError::EmptyDataset {
            path: path.to_path_buf(),
        });
    }

    let targets = if numeric_targets && !force_classification {
        Targets::Regression(
            raw_targets
                .iter()
                .map(|t| t.parse().expect("all targets verified numeric"))
                .collect(),
        )
    } else {
        Targets::Classification(raw_targets)
    };

    let dataset = Dataset {
        x,
        targets,
        var_names,
    };

    info!(
        n_rows = dataset.n_rows(),
        n_features = dataset.n_features(),
        regression = dataset.is_regression(),
        "dataset loaded"
    );

    Ok(dataset)
}

/// The first row is a header when any value beyond the first is non-numeric.
fn is_header(record: &csv::StringRecord) -> bool {
    record
        .iter()
        .skip(1)
        .any(|val| val.parse::<f64>().is_err())
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tempfile::NamedTempFile;

    use super::{Targets, read_csv};

    const BOSTON_CSV: &str = "\
\"medv\",\"crim\",\"zn\",\"indus\",\"chas\",\"nox\",\"rm\",\"age\",\"dis\",\"rad\",\"tax\",\"ptratio\",\"black\",\"lstat\"
24,0.00632,18,2.31,0,0.538,6.575,65.2,4.09,1,296,15.3,396.9,4.98
21.6,0.02731,0,7.07,0,0.469,6.421,78.9,4.9671,2,242,17.8,396.9,9.14
34.7,0.02729,0,7.07,0,0.469,7.185,61.1,4.9671,2,242,17.8,392.83,4.03
33.4,0.03237,0,2.18,0,0.458,6.998,45.8,6.0622,3,222,18.7,394.63,2.94
36.2,0.06905,0,2.18,0,0.458,7.147,54.2,6.0622,3,222,18.7,396.9,5.33
28.7,0.02985,0,2.18,0,0.458,6.43,58.7,6.0622,3,222,18.7,394.12,5.21
22.9,0.08829,12.5,7.87,0,0.524,6.012,66.6,5.5605,5,311,15.2,395.6,12.43
27.1,0.14455,12.5,7.87,0,0.524,6.172,96.1,5.9505,5,311,15.2,396.9,19.15
16.5,0.21124,12.5,7.87,0,0.524,5.631,100,6.0821,5,311,15.2,386.63,29.93
";

    const IRIS_CSV: &str = "\
\"Species\",\"Sepal.Length\",\"Sepal.Width\",\"Petal.Length\",\"Petal.Width\"
\"setosa\",5.1,3.5,1.4,0.2
\"setosa\",4.9,3,1.4,0.2
\"setosa\",4.7,3.2,1.3,0.2
\"setosa\",4.6,3.1,1.5,0.2
\"virginica\",5,3.6,1.4,0.2
\"setosa\",5.4,3.9,1.7,0.4
\"setosa\",4.6,3.4,1.4,0.3
\"setosa\",5,3.4,1.5,0.2
\"setosa\",4.4,2.9,1.4,0.2
";

    fn write_csv(content: &str) -> NamedTempFile {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(content.as_bytes()).unwrap();
        f.flush().unwrap();
        f
    }

    #[test]
    fn detects_boston_regression() {
        let f = write_csv(BOSTON_CSV);
        let d = read_csv(f.path(), false).unwrap();

        assert!(d.is_regression());
        assert_eq!(d.n_rows(), 9);
        assert_eq!(d.n_features(), 13);
        assert_eq!(d.var_names[0], "crim");
        match &d.targets {
            Targets::Regression(y) => assert!((y[3] - 33.4).abs() < 1e-12),
            Targets::Classification(_) => panic!("expected regression targets"),
        }
    }

    #[test]
    fn detects_iris_classification() {
        let f = write_csv(IRIS_CSV);
        let d = read_csv(f.path(), false).unwrap();

        assert!(!d.is_regression());
        assert_eq!(d.n_rows(), 9);
        assert_eq!(d.n_features(), 4);
        assert_eq!(d.var_names[0], "Sepal.Length");
        match &d.targets {
            Targets::Classification(y) => assert_eq!(y[4], "virginica"),
            Targets::Regression(_) => panic!("expected classification targets"),
        }
    }

    #[test]
    fn headerless_rows_get_generated_names() {
        let f = write_csv("1.5,0.1,0.2\n2.5,0.3,0.4\n");
        let d = read_csv(f.path(), false).unwrap();
        assert!(d.is_regression());
        assert_eq!(d.n_rows(), 2);
        assert_eq!(d.var_names, vec!["X1", "X2"]);
    }

    #[test]
    fn force_classification_keeps_numeric_labels() {
        let f = write_csv("1,0.1\n2,0.2\n1,0.3\n");
        let d = read_csv(f.path(), true).unwrap();
        match &d.targets {
            Targets::Classification(y) => assert_eq!(y, &["1", "2", "1"]),
            Targets::Regression(_) => panic!("force flag must select classification"),
        }
    }

    #[test]
    fn mixed_header_detected_by_any_non_numeric() {
        // One numeric cell in the first row does not make it data.
        let f = write_csv("target,1.5,name\n\"a\",0.1,0.2\n\"b\",0.3,0.4\n");
        let d = read_csv(f.path(), false).unwrap();
        assert_eq!(d.var_names, vec!["1.5", "name"]);
        assert_eq!(d.n_rows(), 2);
    }

    #[test]
    fn error_file_not_found() {
        let result = read_csv("/nonexistent/data.csv", false);
        assert!(matches!(result, Err(crate::IoError::FileNotFound { .. })));
    }

    #[test]
    fn error_empty_dataset() {
        let f = write_csv("\"y\",\"x1\",\"x2\"\n");
        let result = read_csv(f.path(), false);
        assert!(matches!(result, Err(crate::IoError::EmptyDataset { .. })));
    }

    #[test]
    fn error_ragged_rows() {
        let f = write_csv("1,2,3\n4,5\n");
        let result = read_csv(f.path(), false);
        assert!(matches!(
            result,
            Err(crate::IoError::InconsistentRowLength {
                row_index: 1,
                expected: 3,
                got: 2,
                ..
            })
        ));
    }

    #[test]
    fn error_non_numeric_feature() {
        let f = write_csv("1,2.0\n2,oops\n");
        let result = read_csv(f.path(), false);
        assert!(matches!(
            result,
            Err(crate::IoError::NonNumericValue { row_index: 1, col_index: 0, .. })
        ));
    }

    #[test]
    fn error_single_column_row() {
        let f = write_csv("justatarget\n");
        let result = read_csv(f.path(), false);
        assert!(matches!(result, Err(crate::IoError::TooFewColumns { row_index: 0, .. })));
    }
}
