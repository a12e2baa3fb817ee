//! Confusion matrix for OOB classification diagnostics.

use std::fmt;

/// A multi-class confusion matrix.
///
/// Entry `[true_class][predicted_class]` counts how many samples with true
/// label `true_class` were predicted as `predicted_class`.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ConfusionMatrix {
    matrix: Vec<Vec<usize>>,
}

impl ConfusionMatrix {
    pub(crate) fn from_matrix(matrix: Vec<Vec<usize>>) -> Self {
        Self { matrix }
    }

    /// Overall accuracy: the diagonal over the total count.
    #[must_use]
    pub fn accuracy(&self) -> f64 {
        let correct: usize = (0..self.matrix.len()).map(|i| self.matrix[i][i]).sum();
        let total: usize = self.matrix.iter().flat_map(|row| row.iter()).sum();
        if total == 0 {
            0.0
        } else {
            correct as f64 / total as f64
        }
    }

    /// Return the matrix rows, indexed by true class.
    #[must_use]
    pub fn as_rows(&self) -> &[Vec<usize>] {
        &self.matrix
    }

    /// Return the number of classes.
    #[must_use]
    pub fn n_classes(&self) -> usize {
        self.matrix.len()
    }
}

impl fmt::Display for ConfusionMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:>8}", "")?;
        for j in 0..self.matrix.len() {
            write!(f, " pred_{j:>3}")?;
        }
        writeln!(f)?;

        for (i, row) in self.matrix.iter().enumerate() {
            write!(f, "true_{i:>3}")?;
            for val in row {
                write!(f, " {val:>7}")?;
            }
            writeln!(f)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::ConfusionMatrix;

    #[test]
    fn perfect_predictions() {
        let cm = ConfusionMatrix::from_matrix(vec![vec![2, 0], vec![0, 3]]);
        assert!((cm.accuracy() - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn known_accuracy() {
        // 6 correct out of 9
        let cm = ConfusionMatrix::from_matrix(vec![
            vec![2, 1, 0],
            vec![0, 2, 1],
            vec![1, 0, 2],
        ]);
        assert!((cm.accuracy() - 6.0 / 9.0).abs() < 1e-12);
        assert_eq!(cm.n_classes(), 3);
    }

    #[test]
    fn empty_matrix_accuracy_zero() {
        let cm = ConfusionMatrix::from_matrix(vec![vec![0, 0], vec![0, 0]]);
        assert_eq!(cm.accuracy(), 0.0);
    }

    #[test]
    fn display_formatting() {
        let cm = ConfusionMatrix::from_matrix(vec![vec![1, 0], vec![0, 1]]);
        let output = format!("{cm}");
        assert!(output.contains("pred_"));
        assert!(output.contains("true_"));
    }
}
