//! Multiclass gradient boosting with a softmax objective.
//!
//! One tree per class per round. Each round:
//! 1. softmax the current raw scores
//! 2. per class: `grad = w (p - y)`, `hess = w p (1 - p)`
//! 3. draw a row bag (shared by every class in the round)
//! 4. grow the class trees in parallel, each on its own feature subsample
//! 5. add the new leaves to the training (and held-out) scores
//!
//! With a held-out set, the unweighted multi-logloss drives early stopping and
//! the returned ensemble is cut back to the best round.

use rand::rngs::StdRng;
use rand::seq::index::sample;
use rand::SeedableRng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::{BoosterParams, FeatureVector};
use crate::error::TrainError;
use crate::models::binning::BinnedMatrix;
use crate::models::early_stopping::EarlyStopping;
use crate::models::grower::TreeGrower;
use crate::models::tree::Tree;
use crate::schema::FEATURE_COUNT;

/// Probabilities are clamped here before taking the log.
const PROB_EPS: f64 = 1e-15;

/// Hessians never drop below this, so leaves stay well defined.
const MIN_HESS: f64 = 1e-6;

/// Rows, dense class indices, and per-row weights to boost on.
#[derive(Debug, Clone, Copy)]
pub struct TrainingSet<'a> {
    pub rows: &'a [FeatureVector],
    /// Dense class index per row, `< n_classes`.
    pub classes: &'a [usize],
    pub weights: &'a [f64],
    pub n_classes: usize,
    pub categorical: &'a [bool; FEATURE_COUNT],
}

/// Held-out rows watched for early stopping.
#[derive(Debug, Clone, Copy)]
pub struct ValidationSet<'a> {
    pub rows: &'a [FeatureVector],
    pub classes: &'a [usize],
    pub patience: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BoostOutcome {
    pub ensemble: Ensemble,
    /// Rounds kept in `ensemble` (1-based best round when early stopping ran).
    pub best_iteration: usize,
    /// Held-out multi-logloss at `best_iteration`, if a held-out set was given.
    pub best_score: Option<f64>,
    pub rounds_run: usize,
}

/// Anything that can fit a multiclass model on weighted rows.
///
/// The cross-validation driver only talks to this trait, so the booster can be
/// swapped without touching fold logic.
pub trait ClassifierTrainer: Sync {
    fn train(
        &self,
        data: &TrainingSet<'_>,
        rounds: usize,
        validation: Option<&ValidationSet<'_>>,
    ) -> Result<BoostOutcome, TrainError>;
}

/// A fitted boosted ensemble.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ensemble {
    pub n_classes: usize,
    /// Initial raw score per class.
    pub base_scores: Vec<f64>,
    /// Round-major: `trees[round * n_classes + class]`.
    pub trees: Vec<Tree>,
}

impl Ensemble {
    pub fn n_rounds(&self) -> usize {
        if self.n_classes == 0 { 0 } else { self.trees.len() / self.n_classes }
    }

    pub fn raw_scores(&self, row: &[f64]) -> Vec<f64> {
        let mut scores = self.base_scores.clone();
        for round in self.trees.chunks(self.n_classes.max(1)) {
            for (score, tree) in scores.iter_mut().zip(round) {
                *score += tree.predict(row);
            }
        }
        scores
    }

    pub fn predict_proba(&self, row: &[f64]) -> Vec<f64> {
        let mut scores = self.raw_scores(row);
        softmax(&mut scores);
        scores
    }

    /// Most probable class index; ties go to the lower index.
    pub fn predict_index(&self, row: &[f64]) -> usize {
        argmax(&self.raw_scores(row))
    }

    /// Keep only the first `rounds` rounds.
    pub fn truncate(&mut self, rounds: usize) {
        self.trees.truncate(rounds * self.n_classes);
    }

    pub fn validate(&self, n_features: usize) -> Result<(), String> {
        if self.n_classes < 2 {
            return Err(format!("ensemble has {} classes", self.n_classes));
        }
        if self.base_scores.len() != self.n_classes {
            return Err(format!(
                "{} base scores for {} classes",
                self.base_scores.len(),
                self.n_classes
            ));
        }
        if self.base_scores.iter().any(|s| !s.is_finite()) {
            return Err("non-finite base score".to_string());
        }
        if self.trees.len() % self.n_classes != 0 {
            return Err(format!(
                "{} trees is not a whole number of rounds for {} classes",
                self.trees.len(),
                self.n_classes
            ));
        }
        for (i, tree) in self.trees.iter().enumerate() {
            tree.validate(n_features).map_err(|e| format!("tree {i}: {e}"))?;
        }
        Ok(())
    }
}

/// Histogram GBDT trainer.
#[derive(Debug, Clone)]
pub struct GbdtTrainer {
    pub params: BoosterParams,
    pub seed: u64,
}

impl GbdtTrainer {
    pub fn new(params: BoosterParams, seed: u64) -> Self {
        Self { params, seed }
    }
}

impl ClassifierTrainer for GbdtTrainer {
    fn train(
        &self,
        data: &TrainingSet<'_>,
        rounds: usize,
        validation: Option<&ValidationSet<'_>>,
    ) -> Result<BoostOutcome, TrainError> {
        check_inputs(data, validation)?;

        let n = data.rows.len();
        let k = data.n_classes;
        let base_scores = log_priors(data.classes, data.weights, k);

        let matrix = BinnedMatrix::build(data.rows, data.categorical, self.params.max_bins);
        let grower = TreeGrower::new(&matrix, &self.params);
        let bag_size = fraction_of(n, self.params.subsample);
        let feature_count = fraction_of(FEATURE_COUNT, self.params.colsample_bytree);

        // Class-major: scores[c * n + i].
        let mut scores = class_major(&base_scores, n);
        let mut held_out = validation.map(|v| (v, class_major(&base_scores, v.rows.len())));
        let mut stopper = validation.map(|v| EarlyStopping::new(v.patience));

        let mut trees: Vec<Tree> = Vec::with_capacity(rounds * k);
        let mut rounds_run = 0;

        for round in 0..rounds {
            let (grad, hess) = gradients(&scores, data.classes, data.weights, k);

            let mut rng = StdRng::seed_from_u64(mix_seed(self.seed, round, 0));
            let bag: Vec<u32> = if bag_size < n {
                let mut picked: Vec<u32> = sample(&mut rng, n, bag_size).into_iter().map(|i| i as u32).collect();
                picked.sort_unstable();
                picked
            } else {
                (0..n as u32).collect()
            };

            let round_trees: Vec<Tree> = (0..k)
                .into_par_iter()
                .map(|class| {
                    let mut rng = StdRng::seed_from_u64(mix_seed(self.seed, round, class + 1));
                    let mut features = sample(&mut rng, FEATURE_COUNT, feature_count).into_vec();
                    features.sort_unstable();
                    let slice = class * n..(class + 1) * n;
                    grower.grow(bag.clone(), &grad[slice.clone()], &hess[slice], &features)
                })
                .collect();

            add_predictions(&mut scores, &round_trees, data.rows);
            if let Some((v, v_scores)) = held_out.as_mut() {
                add_predictions(v_scores, &round_trees, v.rows);
            }
            trees.extend(round_trees);
            rounds_run += 1;

            if let (Some((v, v_scores)), Some(es)) = (held_out.as_ref(), stopper.as_mut()) {
                let loss = multi_logloss(v_scores, v.classes, k);
                if es.should_stop(loss) {
                    debug!(round = round + 1, best = es.best_iteration(), "early stopping");
                    break;
                }
            }
        }

        let mut ensemble = Ensemble {
            n_classes: k,
            base_scores,
            trees,
        };

        let (best_iteration, best_score) = match &stopper {
            Some(es) => (es.best_iteration(), es.best_value()),
            None => (rounds_run, None),
        };
        ensemble.truncate(best_iteration);

        Ok(BoostOutcome {
            ensemble,
            best_iteration,
            best_score,
            rounds_run,
        })
    }
}

fn check_inputs(data: &TrainingSet<'_>, validation: Option<&ValidationSet<'_>>) -> Result<(), TrainError> {
    let n = data.rows.len();
    if n == 0 {
        return Err(TrainError::Validation("no training rows".to_string()));
    }
    if data.classes.len() != n || data.weights.len() != n {
        return Err(TrainError::Validation(format!(
            "{n} rows, {} labels, {} weights",
            data.classes.len(),
            data.weights.len()
        )));
    }
    if n > u32::MAX as usize {
        return Err(TrainError::Validation(format!("{n} rows is too many to index")));
    }
    if data.n_classes < 2 {
        return Err(TrainError::Validation(format!(
            "need at least 2 classes, got {}",
            data.n_classes
        )));
    }
    if let Some(bad) = data.classes.iter().find(|&&c| c >= data.n_classes) {
        return Err(TrainError::Validation(format!(
            "class index {bad} out of range for {} classes",
            data.n_classes
        )));
    }
    if data.weights.iter().any(|w| !w.is_finite() || *w <= 0.0) {
        return Err(TrainError::Validation("sample weights must be finite and positive".to_string()));
    }
    if data.rows.iter().flatten().any(|v| !v.is_finite()) {
        return Err(TrainError::Validation("non-finite feature value".to_string()));
    }
    if let Some(v) = validation {
        if v.rows.len() != v.classes.len() {
            return Err(TrainError::Validation(format!(
                "{} held-out rows but {} labels",
                v.rows.len(),
                v.classes.len()
            )));
        }
        if v.classes.iter().any(|&c| c >= data.n_classes) {
            return Err(TrainError::Validation("held-out class index out of range".to_string()));
        }
    }
    Ok(())
}

/// Weighted class log-priors.
fn log_priors(classes: &[usize], weights: &[f64], k: usize) -> Vec<f64> {
    let mut totals = vec![0.0; k];
    for (&c, &w) in classes.iter().zip(weights) {
        totals[c] += w;
    }
    let sum: f64 = totals.iter().sum();
    totals.iter().map(|t| (t / sum).max(PROB_EPS).ln()).collect()
}

fn class_major(base: &[f64], n: usize) -> Vec<f64> {
    base.iter().flat_map(|&b| std::iter::repeat_n(b, n)).collect()
}

fn gradients(scores: &[f64], classes: &[usize], weights: &[f64], k: usize) -> (Vec<f64>, Vec<f64>) {
    let n = classes.len();
    let mut grad = vec![0.0; k * n];
    let mut hess = vec![0.0; k * n];
    let mut probs = vec![0.0; k];

    for i in 0..n {
        for (c, p) in probs.iter_mut().enumerate() {
            *p = scores[c * n + i];
        }
        softmax(&mut probs);
        let w = weights[i];
        for (c, &p) in probs.iter().enumerate() {
            let y = if classes[i] == c { 1.0 } else { 0.0 };
            grad[c * n + i] = w * (p - y);
            hess[c * n + i] = (w * p * (1.0 - p)).max(MIN_HESS);
        }
    }

    (grad, hess)
}

fn add_predictions(scores: &mut [f64], round: &[Tree], rows: &[FeatureVector]) {
    let n = rows.len();
    for (class, tree) in round.iter().enumerate() {
        for (i, row) in rows.iter().enumerate() {
            scores[class * n + i] += tree.predict(row);
        }
    }
}

/// Mean negative log-likelihood of the true class (class-major scores).
pub fn multi_logloss(scores: &[f64], classes: &[usize], k: usize) -> f64 {
    let n = classes.len();
    if n == 0 {
        return 0.0;
    }
    let mut probs = vec![0.0; k];
    let mut total = 0.0;
    for (i, &class) in classes.iter().enumerate() {
        for (c, p) in probs.iter_mut().enumerate() {
            *p = scores[c * n + i];
        }
        softmax(&mut probs);
        total -= probs[class].max(PROB_EPS).ln();
    }
    total / n as f64
}

/// In-place, numerically stable softmax.
pub fn softmax(values: &mut [f64]) {
    let max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let mut sum = 0.0;
    for v in values.iter_mut() {
        *v = (*v - max).exp();
        sum += *v;
    }
    for v in values.iter_mut() {
        *v /= sum;
    }
}

fn argmax(values: &[f64]) -> usize {
    let mut best = 0;
    for (i, v) in values.iter().enumerate().skip(1) {
        if *v > values[best] {
            best = i;
        }
    }
    best
}

fn fraction_of(n: usize, fraction: f64) -> usize {
    if fraction >= 1.0 || !fraction.is_finite() {
        return n;
    }
    ((n as f64 * fraction).round() as usize).clamp(1, n)
}

fn mix_seed(seed: u64, round: usize, stream: usize) -> u64 {
    seed ^ (round as u64 + 1).wrapping_mul(0x9E37_79B9_7F4A_7C15)
        ^ (stream as u64).wrapping_mul(0xC2B2_AE3D_27D4_EB4F)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Three classes separated along feature 0, plus a noise feature.
    fn toy(n: usize) -> (Vec<FeatureVector>, Vec<usize>) {
        let mut rows = Vec::with_capacity(n);
        let mut classes = Vec::with_capacity(n);
        for i in 0..n {
            let class = i % 3;
            let mut row = [0.0; FEATURE_COUNT];
            for (f, v) in row.iter_mut().enumerate() {
                *v = ((i * 31 + f * 17) % 97) as f64;
            }
            row[0] = class as f64 * 10.0 + (i % 7) as f64;
            rows.push(row);
            classes.push(class);
        }
        (rows, classes)
    }

    fn params() -> BoosterParams {
        BoosterParams {
            min_child_samples: 5,
            learning_rate: 0.3,
            // Keep feature 0 in every tree.
            colsample_bytree: 1.0,
            ..BoosterParams::default()
        }
    }

    const NUMERIC: [bool; FEATURE_COUNT] = [false; FEATURE_COUNT];

    fn training_set<'a>(rows: &'a [FeatureVector], classes: &'a [usize], weights: &'a [f64]) -> TrainingSet<'a> {
        TrainingSet {
            rows,
            classes,
            weights,
            n_classes: 3,
            categorical: &NUMERIC,
        }
    }

    #[test]
    fn learns_a_separable_problem() {
        let (rows, classes) = toy(300);
        let weights = vec![1.0; rows.len()];
        let out = GbdtTrainer::new(params(), 7)
            .train(&training_set(&rows, &classes, &weights), 30, None)
            .unwrap();

        assert_eq!(out.best_iteration, 30);
        assert_eq!(out.ensemble.n_rounds(), 30);
        let correct = rows
            .iter()
            .zip(&classes)
            .filter(|(row, c)| out.ensemble.predict_index(&row[..]) == **c)
            .count();
        assert!(correct as f64 / rows.len() as f64 > 0.95, "accuracy {correct}/300");
    }

    #[test]
    fn same_seed_same_ensemble() {
        let (rows, classes) = toy(150);
        let weights = vec![1.0; rows.len()];
        let data = training_set(&rows, &classes, &weights);
        let a = GbdtTrainer::new(params(), 3).train(&data, 10, None).unwrap();
        let b = GbdtTrainer::new(params(), 3).train(&data, 10, None).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn early_stopping_truncates_to_best_round() {
        let (rows, classes) = toy(300);
        let weights = vec![1.0; rows.len()];
        // Held-out labels are shuffled, so the loss soon stops improving.
        let noisy: Vec<usize> = classes.iter().map(|c| (c + 1) % 3).collect();
        let validation = ValidationSet {
            rows: &rows[..90],
            classes: &noisy[..90],
            patience: 5,
        };
        let out = GbdtTrainer::new(params(), 1)
            .train(&training_set(&rows, &classes, &weights), 200, Some(&validation))
            .unwrap();

        assert!(out.rounds_run < 200);
        assert_eq!(out.rounds_run, out.best_iteration + 5);
        assert_eq!(out.ensemble.n_rounds(), out.best_iteration);
        assert!(out.best_score.is_some());
    }

    #[test]
    fn zero_rounds_predicts_weighted_priors() {
        let rows = vec![[0.0; FEATURE_COUNT]; 4];
        let classes = vec![0, 0, 1, 2];
        let weights = vec![1.0, 1.0, 1.0, 1.0];
        let out = GbdtTrainer::new(params(), 0)
            .train(&training_set(&rows, &classes, &weights), 0, None)
            .unwrap();
        let proba = out.ensemble.predict_proba(&rows[0]);
        assert!((proba[0] - 0.5).abs() < 1e-12);
        assert!((proba.iter().sum::<f64>() - 1.0).abs() < 1e-12);
        assert_eq!(out.ensemble.predict_index(&rows[0]), 0);
    }

    #[test]
    fn rejects_inconsistent_inputs() {
        let (rows, classes) = toy(30);
        let short = vec![1.0; 10];
        let err = GbdtTrainer::new(params(), 0)
            .train(&training_set(&rows, &classes, &short), 5, None)
            .unwrap_err();
        assert!(matches!(err, TrainError::Validation(_)));

        let mut bad = rows.clone();
        bad[3][2] = f64::NAN;
        let weights = vec![1.0; rows.len()];
        let err = GbdtTrainer::new(params(), 0)
            .train(&training_set(&bad, &classes, &weights), 5, None)
            .unwrap_err();
        assert!(matches!(err, TrainError::Validation(_)));
    }

    #[test]
    fn ensemble_validation_catches_broken_shapes() {
        let (rows, classes) = toy(60);
        let weights = vec![1.0; rows.len()];
        let mut ensemble = GbdtTrainer::new(params(), 0)
            .train(&training_set(&rows, &classes, &weights), 3, None)
            .unwrap()
            .ensemble;
        assert!(ensemble.validate(FEATURE_COUNT).is_ok());
        ensemble.trees.pop();
        assert!(ensemble.validate(FEATURE_COUNT).is_err());
    }

    #[test]
    fn logloss_of_uniform_scores_is_ln_k() {
        let scores = vec![0.0; 6];
        let loss = multi_logloss(&scores, &[0, 2], 3);
        assert!((loss - 3f64.ln()).abs() < 1e-12);
    }
}
