//! Formatted terminal output for profiles, training runs and batch predictions.
//!
//! We keep formatting code in one place so:
//! - the training and serving code stays clean and testable
//! - output changes are localized

use std::path::Path;

use crate::balance::Rebalanced;
use crate::domain::{ClassLabel, CvSummary, Prediction};
use crate::report::{ClassShare, DatasetProfile, distribution};
use crate::schema::{self, FEATURES};

/// Dataset overview: shape, missing values, target distribution.
pub fn format_profile(profile: &DatasetProfile) -> String {
    let mut out = String::new();

    out.push_str("=== bundle - dataset profile ===\n");
    out.push_str(&format!("Rows: {} | columns: {}\n", profile.rows, profile.columns.len()));
    if profile.rejected_rows > 0 {
        out.push_str(&format!("Rejected rows: {}\n", profile.rejected_rows));
    }

    out.push_str("\nMissing values:\n");
    let with_missing: Vec<_> = profile.columns.iter().filter(|c| c.missing > 0).collect();
    if with_missing.is_empty() {
        out.push_str("  (none)\n");
    }
    for column in with_missing {
        let pct = 100.0 * column.missing as f64 / profile.rows.max(1) as f64;
        out.push_str(&format!(
            "  {:<32} {:>8} {:>7.2}%\n",
            truncate(&column.name, 32),
            column.missing,
            pct
        ));
    }

    let textual: Vec<&str> = profile
        .columns
        .iter()
        .filter(|c| c.textual)
        .map(|c| c.name.as_str())
        .collect();
    out.push_str(&format!("\nText columns: {}\n", join_or_none(&textual)));

    let ignored: Vec<&str> = profile
        .columns
        .iter()
        .filter(|c| c.is_ignored())
        .map(|c| c.name.as_str())
        .collect();
    out.push_str(&format!("Not used by the model: {}\n", join_or_none(&ignored)));

    out.push_str("\nTarget distribution:\n");
    if profile.target.is_empty() {
        out.push_str("  (no target column)\n");
    } else {
        out.push_str(&format_distribution(&profile.target));
    }
    if profile.unlabeled > 0 && !profile.target.is_empty() {
        out.push_str(&format!("  unlabeled rows: {}\n", profile.unlabeled));
    }

    out
}

/// Training run summary: label remap, CV folds, final model.
pub fn format_training_summary(balanced: &Rebalanced, cv: &CvSummary, model_path: &Path) -> String {
    let mut out = String::new();

    out.push_str("=== bundle - training summary ===\n");
    out.push_str(&format!("Rows: {}\n", balanced.labels.len()));

    out.push_str("\nOriginal distribution:\n");
    out.push_str(&format_distribution(&distribution(&balanced.original)));
    out.push_str("\nRemapped distribution:\n");
    out.push_str(&format_distribution(&distribution(&balanced.labels)));
    for (label, count) in &balanced.merged {
        out.push_str(&format!("  merged class {label} ({count} rows)\n"));
    }

    let categorical: Vec<&str> = FEATURES
        .iter()
        .filter(|f| f.is_categorical())
        .map(|f| f.name)
        .collect();
    out.push_str(&format!("\nCategorical features: {}\n", categorical.join(", ")));
    out.push_str(&format!("Total features: {}\n", schema::FEATURE_COUNT));

    out.push_str("\nCross-validation:\n");
    for fold in &cv.folds {
        let logloss = fold
            .holdout_logloss
            .map(|v| format!("{v:.4}"))
            .unwrap_or_else(|| "-".to_string());
        out.push_str(&format!(
            "  Fold {}: Macro-F1 = {:.4} (best_iter = {}, logloss = {logloss})\n",
            fold.fold + 1,
            fold.macro_f1,
            fold.best_iteration
        ));
    }
    out.push_str(&format!(
        "CV Macro-F1 : {:.4} \u{b1} {:.4}\n",
        cv.macro_f1_mean, cv.macro_f1_std
    ));
    out.push_str(&format!("OOF Macro-F1 (merged labels): {:.4}\n", cv.oof_macro_f1));
    out.push_str(&format!(
        "Final n_estimators: {} (mean best_iter {:.1})\n",
        cv.final_rounds, cv.mean_best_iteration
    ));
    out.push_str(&format!("\nModel saved to {}\n", model_path.display()));

    out
}

/// Batch prediction summary: where the file went and how bundles are spread.
pub fn format_prediction_summary(predictions: &[Prediction], output: &Path) -> String {
    let labels: Vec<ClassLabel> = predictions.iter().map(|p| p.bundle).collect();
    let mut out = String::new();
    out.push_str(&format!(
        "Wrote {} predictions to {}\n",
        predictions.len(),
        output.display()
    ));
    out.push_str("Predicted distribution:\n");
    out.push_str(&format_distribution(&distribution(&labels)));
    out
}

fn format_distribution(shares: &[ClassShare]) -> String {
    let mut out = String::new();
    out.push_str(format!("  {:<8} {:>8} {:>8}\n", "bundle", "count", "pct").trim_end());
    out.push('\n');
    for share in shares {
        out.push_str(&format!(
            "  {:<8} {:>8} {:>7.2}%\n",
            share.label, share.count, share.percent
        ));
    }
    out
}

fn join_or_none(names: &[&str]) -> String {
    if names.is_empty() {
        "(none)".to_string()
    } else {
        names.join(", ")
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max.saturating_sub(1)).collect();
    out.push('.');
    out
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::path::PathBuf;

    use super::*;
    use crate::domain::FoldResult;
    use crate::report::ColumnProfile;
    use crate::schema::ColumnRole;

    #[test]
    fn profile_lists_missing_columns_and_target() {
        let profile = DatasetProfile {
            rows: 4,
            columns: vec![
                ColumnProfile {
                    name: "Child_Dependents".to_string(),
                    missing: 1,
                    textual: false,
                    role: Some(ColumnRole::Numeric),
                },
                ColumnProfile {
                    name: "Deductible_Tier".to_string(),
                    missing: 0,
                    textual: true,
                    role: Some(ColumnRole::Categorical),
                },
                ColumnProfile {
                    name: "Employer_ID".to_string(),
                    missing: 3,
                    textual: true,
                    role: Some(ColumnRole::Drop),
                },
            ],
            target: distribution(&[1, 1, 1, 8]),
            unlabeled: 0,
            rejected_rows: 0,
        };
        let text = format_profile(&profile);

        assert!(text.contains("Rows: 4"));
        assert!(text.contains("Child_Dependents"));
        assert!(text.contains("25.00%"));
        assert!(text.contains("Text columns: Deductible_Tier, Employer_ID"));
        assert!(text.contains("Not used by the model: Employer_ID"));
        assert!(text.contains("75.00%"));
        assert!(!text.contains("Rejected"));
    }

    #[test]
    fn training_summary_has_fold_lines_and_final_rounds() {
        let balanced = Rebalanced {
            labels: vec![0, 7, 7],
            original: vec![0, 7, 9],
            weights: vec![1.0, 0.7, 0.7],
            merged: vec![(9, 1)],
            counts: BTreeMap::from([(0, 1), (7, 2)]),
        };
        let cv = CvSummary {
            folds: vec![FoldResult {
                fold: 0,
                train_rows: 2,
                holdout_rows: 1,
                best_iteration: 12,
                holdout_logloss: None,
                macro_f1: 0.5,
            }],
            mean_best_iteration: 12.0,
            final_rounds: 22,
            macro_f1_mean: 0.5,
            macro_f1_std: 0.0,
            oof_macro_f1: 0.5,
        };
        let text = format_training_summary(&balanced, &cv, &PathBuf::from("out/model.json"));

        assert!(text.contains("Fold 1: Macro-F1 = 0.5000 (best_iter = 12, logloss = -)"));
        assert!(text.contains("CV Macro-F1 : 0.5000"));
        assert!(text.contains("Final n_estimators: 22"));
        assert!(text.contains("merged class 9 (1 rows)"));
        assert!(text.contains("Employment_Status"));
        assert!(text.contains("out/model.json"));
    }

    #[test]
    fn truncate_marks_cut_names() {
        assert_eq!(truncate("abc", 5), "abc");
        assert_eq!(truncate("abcdefgh", 5), "abcd.");
    }
}
