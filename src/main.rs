use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use taiga_io::{Targets, read_csv, write_importance, write_predictions};
use taiga_rf::{Criterion, ForestConfig, Model};

mod report;

#[derive(Parser)]
#[command(name = "taiga")]
#[command(about = "Random forest classification and regression over dense CSV data")]
#[command(version)]
struct Cli {
    /// Input data (CSV: target column first, numeric features after)
    #[arg(short = 'd', long = "data")]
    data: PathBuf,

    /// Write predictions for the input data to this file (predict mode);
    /// without it a model is fitted
    #[arg(short = 'p', long = "predictions")]
    predictions: Option<PathBuf>,

    /// Model file written after fitting, or read before predicting
    #[arg(short = 'f', long = "final_model", default_value = "rf.model")]
    final_model: PathBuf,

    /// Write variable importance estimates (name,score CSV) to this file
    #[arg(long = "var_importance")]
    var_importance: Option<PathBuf>,

    /// Number of trees
    #[arg(long, default_value_t = 10)]
    trees: usize,

    /// Minimum number of samples required to split an internal node
    #[arg(long = "min_split", default_value_t = 2)]
    min_split: usize,

    /// Minimum number of samples in newly created leaves
    #[arg(long = "min_leaf", default_value_t = 1)]
    min_leaf: usize,

    /// Features to consider per split; -1 selects the task default
    /// (√F for classification, F/3 for regression)
    #[arg(long = "max_features", default_value_t = -1, allow_negative_numbers = true)]
    max_features: i64,

    /// Split quality criterion (classification only)
    #[arg(long, value_enum, default_value = "gini")]
    impurity: ImpurityOpt,

    /// Stop fitting once the OOB error converges (regression only)
    #[arg(long = "stop_early")]
    stop_early: bool,

    /// Number of workers for fitting trees
    #[arg(long, default_value_t = 1)]
    workers: usize,

    /// Force the parser to treat numeric-looking targets as class labels
    #[arg(short = 'c', long = "classification")]
    classification: bool,

    /// Log per-phase wall times
    #[arg(long)]
    profile: bool,

    /// RNG seed for reproducible fits
    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Enable verbose (debug-level) logging
    #[arg(long)]
    verbose: bool,

    /// Suppress all output except errors
    #[arg(long)]
    quiet: bool,
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum ImpurityOpt {
    Gini,
    Entropy,
}

impl From<ImpurityOpt> for Criterion {
    fn from(value: ImpurityOpt) -> Self {
        match value {
            ImpurityOpt::Gini => Criterion::Gini,
            ImpurityOpt::Entropy => Criterion::Entropy,
        }
    }
}

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let help = matches!(
                e.kind(),
                clap::error::ErrorKind::DisplayHelp | clap::error::ErrorKind::DisplayVersion
            );
            let _ = e.print();
            std::process::exit(i32::from(!help));
        }
    };

    let filter = match (cli.verbose, cli.quiet) {
        (true, _) => "debug",
        (_, true) => "error",
        _ => "info",
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if let Err(err) = run(&cli) {
        eprintln!("{err:#}");
        std::process::exit(1);
    }
}

fn run(cli: &Cli) -> Result<()> {
    let parse_start = Instant::now();
    let data = read_csv(&cli.data, cli.classification).context("error parsing input data")?;
    if cli.profile {
        info!(seconds = parse_start.elapsed().as_secs_f64(), "parse phase");
    }

    // A predictions path selects predict mode; fit otherwise.
    if let Some(predictions_path) = &cli.predictions {
        let model = Model::load(&cli.final_model).context("error opening model file")?;
        let predictions = model
            .predict_strings(&data.x)
            .context("error predicting")?;
        write_predictions(predictions_path, &predictions)
            .context("error writing predictions")?;
        return Ok(());
    }

    let config = ForestConfig::new()
        .with_trees(cli.trees)
        .with_min_split(cli.min_split)
        .with_min_leaf(cli.min_leaf)
        .with_max_features(usize::try_from(cli.max_features).ok())
        .with_criterion(cli.impurity.into())
        .with_workers(cli.workers)
        .with_compute_oob(true)
        .with_early_stop(cli.stop_early)
        .with_seed(cli.seed);

    let fit_start = Instant::now();
    let model = match &data.targets {
        Targets::Classification(y) => {
            let forest = config
                .fit_classifier(&data.x, y)
                .context("error fitting model")?;
            Model::classifier(forest, data.var_names.clone())
        }
        Targets::Regression(y) => {
            let forest = config
                .fit_regressor(&data.x, y)
                .context("error fitting model")?;
            Model::regressor(forest, data.var_names.clone())
        }
    };
    let fit_seconds = fit_start.elapsed().as_secs_f64();
    if cli.profile {
        info!(seconds = fit_seconds, "fit phase");
    }

    let save_start = Instant::now();
    model.save(&cli.final_model).context("error saving model")?;
    if cli.profile {
        info!(seconds = save_start.elapsed().as_secs_f64(), "save phase");
    }

    if let Some(importance_path) = &cli.var_importance {
        let scores: Vec<(String, f64)> = model
            .var_names()
            .iter()
            .cloned()
            .zip(model.var_importance())
            .collect();
        write_importance(importance_path, &scores)
            .context("error saving variable importance")?;
    }

    report::render(&model, fit_seconds, &mut std::io::stderr().lock())
        .context("error writing report")?;

    Ok(())
}
