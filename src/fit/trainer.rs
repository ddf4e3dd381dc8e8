//! Cross-validated training driver.
//!
//! Steps:
//! 1. map merged labels to dense class indices
//! 2. stratified k-fold split
//! 3. per fold (parallel): boost with early stopping on the held-out fold
//! 4. final rounds = `trunc(mean best iteration) + margin`
//! 5. refit on every row for exactly that many rounds
//!
//! Fold scores are macro-F1 against the labels the caller passes as `truth`
//! (the pre-merge labels in the normal pipeline).

use rayon::prelude::*;
use tracing::info;

use crate::balance::Rebalanced;
use crate::domain::{ClassLabel, CvSummary, FeatureBatch, FeatureVector, FoldResult, TrainConfig};
use crate::error::TrainError;
use crate::fit::folds::{Fold, stratified_folds};
use crate::fit::metrics::{macro_f1, mean_std};
use crate::models::{ClassifierTrainer, Ensemble, GbdtTrainer, TrainingSet, ValidationSet};
use crate::schema::{self, MAX_SERVING_LABEL};

/// A refit model plus how it was chosen.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainOutput {
    pub ensemble: Ensemble,
    /// Class index -> label.
    pub classes: Vec<ClassLabel>,
    pub cv: CvSummary,
}

/// Train with the built-in booster; folds are scored against `labels`.
pub fn fit(
    features: &FeatureBatch,
    labels: &[ClassLabel],
    weights: &[f64],
    config: &TrainConfig,
) -> Result<TrainOutput, TrainError> {
    let trainer = GbdtTrainer::new(config.params.clone(), config.seed);
    fit_with(&trainer, features, labels, weights, labels, config)
}

/// Train on rebalanced labels, scoring folds against the original labels.
pub fn fit_rebalanced(
    features: &FeatureBatch,
    balanced: &Rebalanced,
    config: &TrainConfig,
) -> Result<TrainOutput, TrainError> {
    let trainer = GbdtTrainer::new(config.params.clone(), config.seed);
    fit_with(
        &trainer,
        features,
        &balanced.labels,
        &balanced.weights,
        &balanced.original,
        config,
    )
}

/// Cross-validate and refit with any [`ClassifierTrainer`].
pub fn fit_with<T: ClassifierTrainer>(
    trainer: &T,
    features: &FeatureBatch,
    labels: &[ClassLabel],
    weights: &[f64],
    truth: &[ClassLabel],
    config: &TrainConfig,
) -> Result<TrainOutput, TrainError> {
    check_inputs(features, labels, weights, truth)?;

    let classes = class_map(labels);
    let dense: Vec<usize> = labels
        .iter()
        .map(|l| classes.binary_search(l).unwrap_or_default())
        .collect();
    let categorical = schema::categorical_mask();

    let folds = stratified_folds(labels, config.folds, config.seed)?;
    info!(
        rows = features.len(),
        classes = classes.len(),
        folds = folds.len(),
        "starting cross-validation"
    );

    let run = |fold: &Fold| -> Result<FoldRun, TrainError> {
        let train_rows = features.select(&fold.train);
        let train_classes: Vec<usize> = fold.train.iter().map(|&i| dense[i]).collect();
        let train_weights: Vec<f64> = fold.train.iter().map(|&i| weights[i]).collect();
        let holdout_rows = features.select(&fold.holdout);
        let holdout_classes: Vec<usize> = fold.holdout.iter().map(|&i| dense[i]).collect();

        let outcome = trainer.train(
            &TrainingSet {
                rows: &train_rows,
                classes: &train_classes,
                weights: &train_weights,
                n_classes: classes.len(),
                categorical: &categorical,
            },
            config.max_rounds,
            Some(&ValidationSet {
                rows: &holdout_rows,
                classes: &holdout_classes,
                patience: config.patience,
            }),
        )?;

        let predicted = predict_labels(&outcome.ensemble, &holdout_rows, &classes);
        let fold_truth: Vec<ClassLabel> = fold.holdout.iter().map(|&i| truth[i]).collect();
        let result = FoldResult {
            fold: fold.index,
            train_rows: fold.train.len(),
            holdout_rows: fold.holdout.len(),
            best_iteration: outcome.best_iteration,
            holdout_logloss: outcome.best_score,
            macro_f1: macro_f1(&fold_truth, &predicted),
        };
        info!(
            fold = result.fold,
            best_iteration = result.best_iteration,
            logloss = ?result.holdout_logloss,
            macro_f1 = result.macro_f1,
            "fold done"
        );

        Ok(FoldRun {
            result,
            holdout: fold.holdout.clone(),
            predicted,
        })
    };

    let runs: Vec<FoldRun> = if config.parallel_folds {
        folds.par_iter().map(run).collect::<Result<_, _>>()?
    } else {
        folds.iter().map(run).collect::<Result<_, _>>()?
    };

    let mut oof = vec![0 as ClassLabel; labels.len()];
    for run in &runs {
        for (&row, &label) in run.holdout.iter().zip(&run.predicted) {
            oof[row] = label;
        }
    }
    let results: Vec<FoldResult> = runs.into_iter().map(|r| r.result).collect();

    let best: Vec<usize> = results.iter().map(|r| r.best_iteration).collect();
    let mean_best_iteration = best.iter().sum::<usize>() as f64 / best.len() as f64;
    let final_rounds = final_round_count(&best, config.round_margin);
    let scores: Vec<f64> = results.iter().map(|r| r.macro_f1).collect();
    let (macro_f1_mean, macro_f1_std) = mean_std(&scores);
    let oof_macro_f1 = macro_f1(labels, &oof);

    info!(
        macro_f1_mean,
        macro_f1_std,
        oof_macro_f1,
        mean_best_iteration,
        final_rounds,
        "cross-validation done; refitting on all rows"
    );

    let outcome = trainer.train(
        &TrainingSet {
            rows: &features.rows,
            classes: &dense,
            weights,
            n_classes: classes.len(),
            categorical: &categorical,
        },
        final_rounds,
        None,
    )?;

    Ok(TrainOutput {
        ensemble: outcome.ensemble,
        classes,
        cv: CvSummary {
            folds: results,
            mean_best_iteration,
            final_rounds,
            macro_f1_mean,
            macro_f1_std,
            oof_macro_f1,
        },
    })
}

struct FoldRun {
    result: FoldResult,
    holdout: Vec<usize>,
    predicted: Vec<ClassLabel>,
}

/// `trunc(mean(best)) + margin`, never below one round.
pub fn final_round_count(best: &[usize], margin: usize) -> usize {
    if best.is_empty() {
        return margin.max(1);
    }
    let mean = best.iter().sum::<usize>() as f64 / best.len() as f64;
    (mean.trunc() as usize + margin).max(1)
}

fn class_map(labels: &[ClassLabel]) -> Vec<ClassLabel> {
    let mut classes = labels.to_vec();
    classes.sort_unstable();
    classes.dedup();
    classes
}

fn predict_labels(ensemble: &Ensemble, rows: &[FeatureVector], classes: &[ClassLabel]) -> Vec<ClassLabel> {
    rows.iter().map(|row| classes[ensemble.predict_index(row)]).collect()
}

fn check_inputs(
    features: &FeatureBatch,
    labels: &[ClassLabel],
    weights: &[f64],
    truth: &[ClassLabel],
) -> Result<(), TrainError> {
    let n = features.len();
    if labels.len() != n || weights.len() != n || truth.len() != n {
        return Err(TrainError::Validation(format!(
            "{n} rows, {} labels, {} weights, {} evaluation labels",
            labels.len(),
            weights.len(),
            truth.len()
        )));
    }
    if let Some(bad) = labels.iter().find(|&&l| l > MAX_SERVING_LABEL) {
        return Err(TrainError::Validation(format!(
            "training label {bad} is outside the serving range 0..={MAX_SERVING_LABEL}; rebalance first"
        )));
    }
    if let Some(row) = features.rows.iter().position(|r| r.iter().any(|v| !v.is_finite())) {
        return Err(TrainError::Validation(format!("row {row} has a non-finite feature value")));
    }
    if let Some(row) = weights.iter().position(|w| !w.is_finite() || *w <= 0.0) {
        return Err(TrainError::Validation(format!("row {row} has a non-positive sample weight")));
    }
    Ok(())
}
