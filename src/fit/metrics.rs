//! Evaluation metrics.

use std::collections::BTreeSet;

use crate::domain::ClassLabel;

/// Unweighted mean of per-class F1 scores.
///
/// Classes are the union of those seen in `truth` and `predicted`; a class
/// with no true positives scores 0.
pub fn macro_f1(truth: &[ClassLabel], predicted: &[ClassLabel]) -> f64 {
    let classes: BTreeSet<ClassLabel> = truth.iter().chain(predicted).copied().collect();
    if classes.is_empty() {
        return 0.0;
    }

    let total: f64 = classes
        .iter()
        .map(|&class| {
            let mut tp = 0usize;
            let mut fp = 0usize;
            let mut fn_ = 0usize;
            for (&t, &p) in truth.iter().zip(predicted) {
                match (t == class, p == class) {
                    (true, true) => tp += 1,
                    (false, true) => fp += 1,
                    (true, false) => fn_ += 1,
                    (false, false) => {}
                }
            }
            let denom = 2 * tp + fp + fn_;
            if denom == 0 { 0.0 } else { 2.0 * tp as f64 / denom as f64 }
        })
        .sum();

    total / classes.len() as f64
}

/// Mean and population standard deviation.
pub fn mean_std(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    (mean, var.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn perfect_predictions_score_one() {
        assert_eq!(macro_f1(&[0, 1, 2, 2], &[0, 1, 2, 2]), 1.0);
    }

    #[test]
    fn matches_hand_computed_example() {
        // class 0: tp=1 fp=1 fn=1 -> 0.5; class 1: tp=1 fp=1 fn=0 -> 2/3; class 2: tp=0 fn=1 -> 0
        let truth = [0, 0, 1, 2];
        let pred = [0, 1, 1, 0];
        let expected = (0.5 + 2.0 / 3.0 + 0.0) / 3.0;
        assert!((macro_f1(&truth, &pred) - expected).abs() < 1e-12);
    }

    #[test]
    fn labels_never_predicted_still_count() {
        // Original label 9 is never predicted after merging into 7.
        let truth = [7, 9];
        let pred = [7, 7];
        // class 7: tp=1 fp=1 -> 2/3; class 9: 0
        assert!((macro_f1(&truth, &pred) - 1.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn mean_std_is_population() {
        let (m, s) = mean_std(&[1.0, 3.0]);
        assert_eq!(m, 2.0);
        assert_eq!(s, 1.0);
        assert_eq!(mean_std(&[]), (0.0, 0.0));
    }
}
