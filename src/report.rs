//! Fixed-format fit report printed to stderr after training.

use std::io::{self, Write};

use taiga_rf::{ClassifierForest, Model, ModelKind, RegressorForest, rank_features};

/// Number of features shown in the importance table.
const MAX_REPORTED_VARS: usize = 20;

/// Render the full report: fit summary, top variable importances, then the
/// OOB section for the model's task.
pub fn render(model: &Model, fit_seconds: f64, w: &mut impl Write) -> io::Result<()> {
    writeln!(
        w,
        "Fit {} trees using {} examples in {:.2} seconds",
        model.n_trees(),
        model.n_samples(),
        fit_seconds
    )?;
    writeln!(w)?;

    render_importance(model, w)?;

    match &model.kind {
        ModelKind::Classifier(forest) => render_classification(forest, w),
        ModelKind::Regressor(forest) => render_regression(forest, w),
    }
}

fn render_importance(model: &Model, w: &mut impl Write) -> io::Result<()> {
    writeln!(w, "Variable Importance")?;
    writeln!(w, "-------------------")?;

    let ranked = rank_features(&model.var_importance(), model.var_names());
    for feature in ranked.iter().take(MAX_REPORTED_VARS) {
        writeln!(w, "{:<15}: {:<10.2}", feature.name, feature.importance)?;
    }

    writeln!(w)
}

fn render_classification(forest: &ClassifierForest, w: &mut impl Write) -> io::Result<()> {
    let Some(oob) = forest.oob() else {
        return Ok(());
    };

    writeln!(w, "Confusion Matrix")?;
    writeln!(w, "----------------")?;

    write!(w, "{:<14} ", "")?;
    for class in forest.classes() {
        write!(w, "{class:<14} ")?;
    }
    writeln!(w)?;

    for (true_id, class) in forest.classes().iter().enumerate() {
        write!(w, "{class:<14} ")?;
        for count in &oob.confusion.as_rows()[true_id] {
            write!(w, "{count:<14} ")?;
        }
        writeln!(w)?;
    }

    writeln!(w)?;
    writeln!(w, "Overall Accuracy: {:.2}%", 100.0 * oob.accuracy)
}

fn render_regression(forest: &RegressorForest, w: &mut impl Write) -> io::Result<()> {
    let Some(oob) = forest.oob() else {
        return Ok(());
    };

    writeln!(w)?;
    writeln!(w, "Mean Squared Error: {:.3}", oob.mse)?;
    writeln!(w, "R-Squared: {:.3}%", 100.0 * oob.r_squared)
}

#[cfg(test)]
mod tests {
    use taiga_rf::{ForestConfig, Model};

    use super::render;

    #[test]
    fn classification_report_sections() {
        let x: Vec<Vec<f64>> = (0..30).map(|i| vec![f64::from(i), 0.5]).collect();
        let y: Vec<String> = (0..30)
            .map(|i| if i < 15 { "low" } else { "high" }.to_string())
            .collect();
        let forest = ForestConfig::new()
            .with_trees(10)
            .with_compute_oob(true)
            .with_seed(42)
            .fit_classifier(&x, &y)
            .unwrap();
        let model = Model::classifier(forest, vec!["a".to_string(), "b".to_string()]);

        let mut out = Vec::new();
        render(&model, 0.5, &mut out).unwrap();
        let report = String::from_utf8(out).unwrap();

        assert!(report.contains("Fit 10 trees using 30 examples"));
        assert!(report.contains("Variable Importance"));
        assert!(report.contains("Confusion Matrix"));
        assert!(report.contains("Overall Accuracy:"));
        assert!(report.contains("low"));
        assert!(report.contains("high"));
    }

    #[test]
    fn regression_report_sections() {
        let x: Vec<Vec<f64>> = (0..40).map(|i| vec![f64::from(i)]).collect();
        let y: Vec<f64> = (0..40).map(|i| if i < 20 { 1.0 } else { 9.0 }).collect();
        let forest = ForestConfig::new()
            .with_trees(10)
            .with_compute_oob(true)
            .with_seed(42)
            .fit_regressor(&x, &y)
            .unwrap();
        let model = Model::regressor(forest, vec!["x".to_string()]);

        let mut out = Vec::new();
        render(&model, 1.25, &mut out).unwrap();
        let report = String::from_utf8(out).unwrap();

        assert!(report.contains("Mean Squared Error:"));
        assert!(report.contains("R-Squared:"));
        assert!(!report.contains("Confusion Matrix"));
    }
}
