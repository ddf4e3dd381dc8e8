//! Top-level application orchestration.
//!
//! `src/main.rs` is intentionally tiny; this module is the "real main" that:
//! - parses CLI arguments
//! - reads CSV / JSON inputs
//! - runs training or scoring through `pipeline`
//! - prints reports and writes artifacts or prediction files

use std::path::{Path, PathBuf};

use clap::Parser;
use tracing::{info, warn};

use crate::cli::{AssessArgs, Cli, Command, PredictArgs, ProfileArgs, SampleArgs, TrainArgs};
use crate::data::{SampleConfig, generate_sample, write_sample_csv};
use crate::error::AppError;
use crate::inference;
use crate::intake::AssessmentInput;
use crate::io::artifact::{ModelArtifact, write_artifact};
use crate::io::export::write_predictions_csv;
use crate::io::ingest::{IngestedData, load_records};
use crate::report;
use crate::schema::SchemaSnapshot;

pub mod pipeline;

/// Entry point for the `bundle` binary.
pub fn run() -> Result<(), AppError> {
    let cli = Cli::parse();

    match cli.command {
        Command::Train(args) => handle_train(args),
        Command::Predict(args) => handle_predict(args),
        Command::Assess(args) => handle_assess(args),
        Command::Profile(args) => handle_profile(args),
        Command::Sample(args) => handle_sample(args),
        Command::Schema => handle_schema(),
    }
}

fn handle_train(args: TrainArgs) -> Result<(), AppError> {
    let config = args.to_config();
    let data = load_records(&args.data)?;
    warn_row_errors(&data);
    let (records, labels) = data.labeled()?;

    let run = pipeline::run_training(&records, &labels, &config)?;
    if run.unknown_categories > 0 {
        warn!(
            cells = run.unknown_categories,
            "unrecognized categories were encoded as Unknown"
        );
    }
    write_artifact(&args.model, &run.artifact)?;
    info!(path = %args.model.display(), "model artifact written");

    println!(
        "{}",
        report::format_training_summary(&run.balanced, &run.artifact.cv, &args.model)
    );
    Ok(())
}

fn handle_predict(args: PredictArgs) -> Result<(), AppError> {
    let artifact = load_artifact(args.model.as_deref())?;
    let data = load_records(&args.data)?;
    warn_row_errors(&data);

    let predictions = pipeline::run_prediction(&data.records, &artifact)?;
    write_predictions_csv(&args.output, &predictions)?;

    println!("{}", report::format_prediction_summary(&predictions, &args.output));
    Ok(())
}

fn handle_assess(args: AssessArgs) -> Result<(), AppError> {
    let text = std::fs::read_to_string(&args.input).map_err(|e| {
        AppError::new(2, format!("Failed to read assessment '{}': {e}", args.input.display()))
    })?;
    let input: AssessmentInput = serde_json::from_str(&text).map_err(|e| {
        AppError::new(2, format!("Invalid assessment JSON '{}': {e}", args.input.display()))
    })?;

    let artifact = load_artifact(args.model.as_deref())?;
    let start = args.date.unwrap_or_else(|| chrono::Local::now().date_naive());
    let result = pipeline::run_assessment(&input, start, &artifact)?;

    let json = serde_json::to_string_pretty(&result)
        .map_err(|e| AppError::new(4, format!("Failed to encode assessment result: {e}")))?;
    println!("{json}");
    Ok(())
}

fn handle_profile(args: ProfileArgs) -> Result<(), AppError> {
    let data = load_records(&args.data)?;
    warn_row_errors(&data);
    println!("{}", report::format_profile(&report::profile(&data)));
    Ok(())
}

fn handle_sample(args: SampleArgs) -> Result<(), AppError> {
    let config = SampleConfig {
        rows: args.rows,
        seed: args.seed,
        ..SampleConfig::default()
    };
    let sample = generate_sample(&config)?;
    write_sample_csv(&args.output, &sample)?;
    println!("Wrote {} sample rows to {}", sample.records.len(), args.output.display());
    Ok(())
}

fn handle_schema() -> Result<(), AppError> {
    let json = serde_json::to_string_pretty(&SchemaSnapshot::current())
        .map_err(|e| AppError::new(4, format!("Failed to encode schema: {e}")))?;
    println!("{json}");
    Ok(())
}

/// `--model` if given, else `$BUNDLE_MODEL_PATH` / `model.json`.
fn load_artifact(explicit: Option<&Path>) -> Result<ModelArtifact, AppError> {
    let path: PathBuf = explicit.map_or_else(inference::model_path, Path::to_path_buf);
    Ok(inference::load_model_from(&path)?)
}

fn warn_row_errors(data: &IngestedData) {
    if data.row_errors.is_empty() {
        return;
    }
    warn!(
        rejected = data.row_errors.len(),
        read = data.rows_read,
        "some CSV rows were skipped"
    );
    for err in data.row_errors.iter().take(5) {
        warn!(
            line = err.line,
            id = err.id.as_deref().unwrap_or("-"),
            "{}",
            err.message
        );
    }
}
