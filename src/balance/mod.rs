//! Training-only class rebalancing.
//!
//! Two steps, both applied to the training labels only:
//!
//! 1. Rare-class merge: labels above `max_serving_class`, and labels with fewer
//!    than `min_class_count` rows, are folded into `fallback_class`.
//! 2. Sample weights: `1 / sqrt(count)` of each row's (merged) class, scaled so
//!    the largest weight is exactly 1.
//!
//! The original labels are returned untouched for held-out evaluation.

use std::collections::BTreeMap;

use tracing::info;

use crate::domain::{BalanceConfig, ClassLabel, FeatureBatch};
use crate::error::TrainError;
use crate::schema::{LABEL_SPACE, MAX_SERVING_LABEL};

/// Output of `rebalance`.
#[derive(Debug, Clone, PartialEq)]
pub struct Rebalanced {
    /// Merged training labels.
    pub labels: Vec<ClassLabel>,
    /// The labels as they came in.
    pub original: Vec<ClassLabel>,
    /// One weight per row, `max == 1`.
    pub weights: Vec<f64>,
    /// Which classes were folded into the fallback, with their original counts.
    pub merged: Vec<(ClassLabel, usize)>,
    /// Class counts after merging.
    pub counts: BTreeMap<ClassLabel, usize>,
}

/// Count rows per class.
pub fn class_counts(labels: &[ClassLabel]) -> BTreeMap<ClassLabel, usize> {
    let mut counts = BTreeMap::new();
    for &label in labels {
        *counts.entry(label).or_insert(0) += 1;
    }
    counts
}

/// Merge rare classes and compute per-sample weights.
///
/// `features` is only used to check the row count; the weights depend on the
/// labels alone.
pub fn rebalance(
    features: &FeatureBatch,
    labels: &[ClassLabel],
    config: &BalanceConfig,
) -> Result<Rebalanced, TrainError> {
    if features.len() != labels.len() {
        return Err(TrainError::Validation(format!(
            "{} feature rows but {} labels",
            features.len(),
            labels.len()
        )));
    }
    if labels.is_empty() {
        return Err(TrainError::Validation("no training rows".to_string()));
    }
    if let Some(bad) = labels.iter().find(|&&l| usize::from(l) >= LABEL_SPACE) {
        return Err(TrainError::Validation(format!(
            "label {bad} is outside the label space 0..{LABEL_SPACE}"
        )));
    }

    let merged_labels = merge_rare_classes(labels, config)?;
    let counts = class_counts(&merged_labels.0);
    let weights = sample_weights(&merged_labels.0, &counts);

    if !merged_labels.1.is_empty() {
        info!(
            merged = ?merged_labels.1,
            fallback = config.fallback_class,
            "folded rare classes into the fallback class"
        );
    }

    Ok(Rebalanced {
        labels: merged_labels.0,
        original: labels.to_vec(),
        weights,
        merged: merged_labels.1,
        counts,
    })
}

/// Fold rare and out-of-serving-range classes into the fallback class.
pub fn merge_rare_classes(
    labels: &[ClassLabel],
    config: &BalanceConfig,
) -> Result<(Vec<ClassLabel>, Vec<(ClassLabel, usize)>), TrainError> {
    if config.max_serving_class > MAX_SERVING_LABEL {
        return Err(TrainError::Validation(format!(
            "max serving class {} is above the servable range 0..={MAX_SERVING_LABEL}",
            config.max_serving_class
        )));
    }
    if config.fallback_class > config.max_serving_class {
        return Err(TrainError::Validation(format!(
            "fallback class {} is above the serving range 0..={}",
            config.fallback_class, config.max_serving_class
        )));
    }

    let counts = class_counts(labels);
    let folded: Vec<(ClassLabel, usize)> = counts
        .iter()
        .filter(|&(&label, &count)| {
            label != config.fallback_class
                && (label > config.max_serving_class || count < config.min_class_count)
        })
        .map(|(&label, &count)| (label, count))
        .collect();

    let out: Vec<ClassLabel> = labels
        .iter()
        .map(|&l| {
            if folded.iter().any(|&(f, _)| f == l) {
                config.fallback_class
            } else {
                l
            }
        })
        .collect();

    // The fallback itself must be able to support a class after the merge.
    let fallback_count = out.iter().filter(|&&l| l == config.fallback_class).count();
    if fallback_count > 0 && fallback_count < config.min_class_count {
        return Err(TrainError::Stratification(format!(
            "fallback class {} has only {fallback_count} rows after merging (need {})",
            config.fallback_class, config.min_class_count
        )));
    }

    Ok((out, folded))
}

/// `1/sqrt(count)` per row, normalized so the maximum is 1.
pub fn sample_weights(labels: &[ClassLabel], counts: &BTreeMap<ClassLabel, usize>) -> Vec<f64> {
    let raw = |label: &ClassLabel| 1.0 / (counts[label] as f64).sqrt();
    let max = counts.keys().map(raw).fold(0.0, f64::max);
    labels.iter().map(|l| raw(l) / max).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn batch_of(n: usize) -> FeatureBatch {
        FeatureBatch {
            columns: crate::schema::feature_names().into_iter().map(str::to_string).collect(),
            rows: vec![[0.0; crate::schema::FEATURE_COUNT]; n],
            user_ids: vec![None; n],
            unknown_categories: 0,
        }
    }

    fn labels_with(counts: &[(ClassLabel, usize)]) -> Vec<ClassLabel> {
        counts
            .iter()
            .flat_map(|&(label, n)| std::iter::repeat(label).take(n))
            .collect()
    }

    #[test]
    fn folds_classes_8_and_9_into_7() {
        let labels = labels_with(&[(0, 400), (1, 120), (7, 30), (8, 6), (9, 5)]);
        let out = rebalance(&batch_of(labels.len()), &labels, &BalanceConfig::default()).unwrap();

        assert!(out.labels.iter().all(|&l| l <= 7));
        assert_eq!(out.counts[&7], 41);
        assert_eq!(out.merged, vec![(8, 6), (9, 5)]);
        // Original labels survive for reporting.
        assert_eq!(out.original, labels);
    }

    #[test]
    fn no_class_below_threshold_after_merge() {
        let labels = labels_with(&[(0, 50), (3, 4), (7, 12), (8, 2)]);
        let config = BalanceConfig::default();
        let out = rebalance(&batch_of(labels.len()), &labels, &config).unwrap();
        assert!(out.counts.values().all(|&c| c >= config.min_class_count));
        assert!(!out.counts.contains_key(&3));
    }

    #[test]
    fn weights_are_inverse_sqrt_and_max_one() {
        let labels = labels_with(&[(0, 100), (1, 25)]);
        let out = rebalance(&batch_of(labels.len()), &labels, &BalanceConfig::default()).unwrap();

        let max = out.weights.iter().cloned().fold(f64::MIN, f64::max);
        assert_eq!(max, 1.0);
        // 1/sqrt(100) / (1/sqrt(25)) = 0.5
        assert!((out.weights[0] - 0.5).abs() < 1e-12);
        assert_eq!(out.weights[labels.len() - 1], 1.0);
        assert!(out.weights.iter().all(|&w| w > 0.0));
    }

    #[test]
    fn tiny_fallback_class_is_a_stratification_error() {
        let labels = labels_with(&[(0, 100), (7, 2), (8, 1)]);
        let err = rebalance(&batch_of(labels.len()), &labels, &BalanceConfig::default()).unwrap_err();
        assert!(matches!(err, TrainError::Stratification(_)));
    }

    #[test]
    fn rejects_labels_outside_label_space_and_length_mismatch() {
        let err = rebalance(&batch_of(2), &[0, 12], &BalanceConfig::default()).unwrap_err();
        assert!(matches!(err, TrainError::Validation(_)));

        let err = rebalance(&batch_of(3), &[0, 1], &BalanceConfig::default()).unwrap_err();
        assert!(matches!(err, TrainError::Validation(_)));
    }

    #[test]
    fn thresholds_are_configurable() {
        let labels = labels_with(&[(0, 100), (2, 15), (5, 40)]);
        let config = BalanceConfig {
            min_class_count: 20,
            fallback_class: 5,
            max_serving_class: 7,
        };
        let out = rebalance(&batch_of(labels.len()), &labels, &config).unwrap();
        assert_eq!(out.counts[&5], 55);
        assert_eq!(out.merged, vec![(2, 15)]);
    }

    #[test]
    fn serving_range_cannot_be_widened() {
        let labels = labels_with(&[(0, 30), (9, 30)]);
        let config = BalanceConfig {
            max_serving_class: 9,
            ..BalanceConfig::default()
        };
        let err = rebalance(&batch_of(labels.len()), &labels, &config).unwrap_err();
        assert!(matches!(err, TrainError::Validation(_)));
    }
}
