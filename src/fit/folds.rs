//! Stratified k-fold assignment.
//!
//! Rows are grouped by label, shuffled within each label using a seeded RNG,
//! then dealt round-robin into folds. The deal counter carries on from one
//! label to the next, so fold sizes differ by at most one overall.

use std::collections::BTreeMap;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::domain::ClassLabel;
use crate::error::TrainError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fold {
    pub index: usize,
    /// Sorted row indices used for training.
    pub train: Vec<usize>,
    /// Sorted row indices held out.
    pub holdout: Vec<usize>,
}

/// Split `labels` into `k` stratified folds.
///
/// Every label must have at least `k` rows so each fold holds out at least
/// one row of every class.
pub fn stratified_folds(labels: &[ClassLabel], k: usize, seed: u64) -> Result<Vec<Fold>, TrainError> {
    if k < 2 {
        return Err(TrainError::Validation(format!("need at least 2 folds, got {k}")));
    }
    if labels.len() < k {
        return Err(TrainError::Stratification(format!(
            "{} rows cannot be split into {k} folds",
            labels.len()
        )));
    }

    let mut by_class: BTreeMap<ClassLabel, Vec<usize>> = BTreeMap::new();
    for (row, &label) in labels.iter().enumerate() {
        by_class.entry(label).or_default().push(row);
    }
    if by_class.len() < 2 {
        return Err(TrainError::Stratification(format!(
            "need at least 2 classes, found {}",
            by_class.len()
        )));
    }
    if let Some((label, rows)) = by_class.iter().find(|(_, rows)| rows.len() < k) {
        return Err(TrainError::Stratification(format!(
            "class {label} has {} rows, fewer than the {k} folds",
            rows.len()
        )));
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let mut assignment = vec![0usize; labels.len()];
    let mut counter = 0usize;
    for rows in by_class.values_mut() {
        rows.shuffle(&mut rng);
        for &row in rows.iter() {
            assignment[row] = counter % k;
            counter += 1;
        }
    }

    Ok((0..k)
        .map(|index| {
            let (holdout, train): (Vec<usize>, Vec<usize>) =
                (0..labels.len()).partition(|&row| assignment[row] == index);
            Fold {
                index,
                train,
                holdout,
            }
        })
        .collect())
}
