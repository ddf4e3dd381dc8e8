//! Command-line parsing for the coverage-bundle predictor.
//!
//! Argument parsing and command dispatch stay separate from training and
//! serving code; `app` turns these structs into library calls.

use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};

use crate::domain::TrainConfig;

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(name = "bundle", version, about = "Insurance coverage-bundle predictor")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Cross-validate, refit on all rows and save a model artifact.
    Train(TrainArgs),
    /// Score a CSV with a saved model and write `User_ID,Purchased_Coverage_Bundle`.
    Predict(PredictArgs),
    /// Score a single intake-form assessment (JSON).
    Assess(AssessArgs),
    /// Print row count, missing values and target distribution of a CSV.
    Profile(ProfileArgs),
    /// Write a synthetic training CSV.
    Sample(SampleArgs),
    /// Print the feature schema as JSON.
    Schema,
}

#[derive(Debug, Parser, Clone)]
pub struct TrainArgs {
    /// Training CSV (raw columns plus `Purchased_Coverage_Bundle`).
    #[arg(long, value_name = "CSV")]
    pub data: PathBuf,

    /// Where to write the model artifact.
    #[arg(long, value_name = "JSON", default_value = "model.json")]
    pub model: PathBuf,

    /// Number of stratified CV folds.
    #[arg(long, default_value_t = 5)]
    pub folds: usize,

    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Round cap for each CV fold.
    #[arg(long, default_value_t = 200)]
    pub max_rounds: usize,

    /// Early-stopping patience (rounds without held-out improvement).
    #[arg(long, default_value_t = 50)]
    pub patience: usize,

    /// Run CV folds one after another instead of on the thread pool.
    #[arg(long)]
    pub sequential: bool,
}

impl TrainArgs {
    pub fn to_config(&self) -> TrainConfig {
        TrainConfig {
            folds: self.folds,
            patience: self.patience,
            max_rounds: self.max_rounds,
            seed: self.seed,
            parallel_folds: !self.sequential,
            ..TrainConfig::default()
        }
    }
}

#[derive(Debug, Parser, Clone)]
pub struct PredictArgs {
    #[arg(long, value_name = "CSV")]
    pub data: PathBuf,

    /// Model artifact; defaults to `$BUNDLE_MODEL_PATH` or `model.json`.
    #[arg(long, value_name = "JSON")]
    pub model: Option<PathBuf>,

    #[arg(long, value_name = "CSV", default_value = "predictions.csv")]
    pub output: PathBuf,
}

#[derive(Debug, Parser, Clone)]
pub struct AssessArgs {
    /// Assessment JSON (camelCase intake-form fields).
    #[arg(long, value_name = "JSON")]
    pub input: PathBuf,

    /// Model artifact; defaults to `$BUNDLE_MODEL_PATH` or `model.json`.
    #[arg(long, value_name = "JSON")]
    pub model: Option<PathBuf>,

    /// Policy start date (YYYY-MM-DD); defaults to today.
    #[arg(long)]
    pub date: Option<NaiveDate>,
}

#[derive(Debug, Parser, Clone)]
pub struct ProfileArgs {
    #[arg(long, value_name = "CSV")]
    pub data: PathBuf,
}

#[derive(Debug, Parser, Clone)]
pub struct SampleArgs {
    #[arg(long, value_name = "CSV")]
    pub output: PathBuf,

    #[arg(short = 'n', long, default_value_t = 2000)]
    pub rows: usize,

    #[arg(long, default_value_t = 42)]
    pub seed: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn train_defaults_match_the_training_config() {
        let cli = Cli::parse_from(["bundle", "train", "--data", "train.csv"]);
        let Command::Train(args) = cli.command else {
            panic!("expected train");
        };
        assert_eq!(args.model, PathBuf::from("model.json"));
        assert_eq!(args.to_config(), TrainConfig::default());
    }

    #[test]
    fn sequential_flag_disables_parallel_folds() {
        let cli = Cli::parse_from(["bundle", "train", "--data", "t.csv", "--sequential", "--folds", "3"]);
        let Command::Train(args) = cli.command else {
            panic!("expected train");
        };
        let config = args.to_config();
        assert!(!config.parallel_folds);
        assert_eq!(config.folds, 3);
    }

    #[test]
    fn assess_parses_a_date() {
        let cli = Cli::parse_from(["bundle", "assess", "--input", "a.json", "--date", "2025-03-14"]);
        let Command::Assess(args) = cli.command else {
            panic!("expected assess");
        };
        assert_eq!(args.date, NaiveDate::from_ymd_opt(2025, 3, 14));
        assert!(args.model.is_none());
    }
}
