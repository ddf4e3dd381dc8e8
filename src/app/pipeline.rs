//! Shared training and scoring workflows used by the CLI handlers and tests.
//!
//! Keeping this in one place avoids duplicating the core workflow:
//! transform -> rebalance -> cross-validate/refit -> package artifact
//!
//! The CLI can then focus on presentation and file handling.

use chrono::{NaiveDate, Utc};
use tracing::info;

use crate::balance::{Rebalanced, rebalance};
use crate::domain::{ClassLabel, Prediction, RawRecord, TrainConfig};
use crate::error::AppError;
use crate::features::transform;
use crate::fit::fit_rebalanced;
use crate::inference;
use crate::intake::{AssessmentInput, AssessmentResult};
use crate::io::artifact::ModelArtifact;

/// All computed outputs of a single `bundle train` run.
#[derive(Debug, Clone)]
pub struct TrainingRun {
    pub artifact: ModelArtifact,
    pub balanced: Rebalanced,
    /// Categorical cells that fell outside their domain (encoded as `Unknown`).
    pub unknown_categories: usize,
}

/// Train on raw records and package the result as an artifact.
pub fn run_training(
    records: &[RawRecord],
    labels: &[ClassLabel],
    config: &TrainConfig,
) -> Result<TrainingRun, AppError> {
    let batch = transform(records)?;
    let balanced = rebalance(&batch, labels, &config.balance)?;
    let output = fit_rebalanced(&batch, &balanced, config)?;

    info!(
        rows = batch.len(),
        classes = ?output.classes,
        final_rounds = output.cv.final_rounds,
        cv_macro_f1 = output.cv.macro_f1_mean,
        "training finished"
    );

    let mut artifact = ModelArtifact::new(
        output.ensemble,
        output.classes,
        config.clone(),
        output.cv,
        batch.len(),
        Utc::now(),
    );
    artifact.merged_classes = balanced.merged.clone();

    Ok(TrainingRun {
        artifact,
        balanced,
        unknown_categories: batch.unknown_categories,
    })
}

/// Score raw records with a loaded artifact.
pub fn run_prediction(records: &[RawRecord], artifact: &ModelArtifact) -> Result<Vec<Prediction>, AppError> {
    let batch = inference::preprocess(records)?;
    Ok(inference::predictions(&batch, artifact)?)
}

/// Score one intake-form assessment for a policy starting on `start`.
pub fn run_assessment(
    input: &AssessmentInput,
    start: NaiveDate,
    artifact: &ModelArtifact,
) -> Result<AssessmentResult, AppError> {
    let batch = inference::preprocess(&[input.to_record(start)])?;
    let labels = inference::predict(&batch, artifact)?;
    let bundle_id = labels
        .first()
        .copied()
        .ok_or_else(|| AppError::new(4, "Model returned no prediction for the assessment."))?;
    Ok(AssessmentResult { bundle_id })
}
