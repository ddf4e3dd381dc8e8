//! Shared domain types.
//!
//! These types are intentionally kept lightweight so they can be:
//!
//! - produced by CSV ingest or the intake mapping
//! - transformed into fixed-width feature vectors
//! - recorded inside a model artifact (configs are serializable)

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::schema::{FEATURE_COUNT, MAX_SERVING_LABEL};

/// A coverage bundle identifier.
///
/// Historical labels live in `0..=9`; serving output is restricted to `0..=7`.
pub type ClassLabel = u8;

/// One engineered row, in the registry's fixed feature order.
///
/// Categorical features hold their domain index as an exact integer.
pub type FeatureVector = [f64; FEATURE_COUNT];

/// Normalize a column name for lookups.
///
/// Excel and other tools sometimes emit UTF-8 CSVs with a BOM prefix on the
/// first header, and casing is not consistent across exports.
pub fn normalize_column_name(name: &str) -> String {
    name.trim().trim_start_matches('\u{feff}').to_ascii_lowercase()
}

/// A single raw cell value, typed once at ingestion.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum RawValue {
    #[default]
    Missing,
    Number(f64),
    Text(String),
}

/// Cell contents treated as missing (the usual CSV null spellings).
const NULL_TOKENS: [&str; 9] = ["", "NA", "N/A", "NaN", "nan", "null", "NULL", "None", "<NA>"];

impl RawValue {
    /// Parse a raw CSV cell.
    ///
    /// Null spellings become `Missing`, anything that parses as a number becomes
    /// `Number`, and everything else is kept verbatim (trimmed) as `Text`.
    pub fn parse(cell: &str) -> Self {
        let cell = cell.trim();
        if NULL_TOKENS.contains(&cell) {
            return RawValue::Missing;
        }
        match cell.parse::<f64>() {
            Ok(v) => RawValue::Number(v),
            Err(_) => RawValue::Text(cell.to_string()),
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, RawValue::Missing)
    }

    /// Render the value for error messages and categorical lookups.
    pub fn display(&self) -> String {
        match self {
            RawValue::Missing => String::new(),
            RawValue::Number(v) if v.fract() == 0.0 && v.abs() < 1e15 => format!("{}", *v as i64),
            RawValue::Number(v) => format!("{v}"),
            RawValue::Text(s) => s.clone(),
        }
    }
}

impl From<f64> for RawValue {
    fn from(value: f64) -> Self {
        RawValue::Number(value)
    }
}

impl From<i64> for RawValue {
    fn from(value: i64) -> Self {
        RawValue::Number(value as f64)
    }
}

impl From<bool> for RawValue {
    fn from(value: bool) -> Self {
        RawValue::Number(if value { 1.0 } else { 0.0 })
    }
}

impl From<&str> for RawValue {
    fn from(value: &str) -> Self {
        RawValue::Text(value.to_string())
    }
}

impl From<String> for RawValue {
    fn from(value: String) -> Self {
        RawValue::Text(value)
    }
}

impl<T: Into<RawValue>> From<Option<T>> for RawValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(RawValue::Missing)
    }
}

/// A raw input row: named attributes of mixed type.
///
/// Column names are matched case-insensitively. Columns that the registry does
/// not know about are carried along and ignored by the feature transform.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawRecord {
    fields: BTreeMap<String, RawValue>,
}

impl RawRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, name: &str, value: impl Into<RawValue>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: &str, value: impl Into<RawValue>) {
        self.fields.insert(normalize_column_name(name), value.into());
    }

    pub fn remove(&mut self, name: &str) -> Option<RawValue> {
        self.fields.remove(&normalize_column_name(name))
    }

    /// Look up a column; absent columns read as `Missing`.
    pub fn get(&self, name: &str) -> &RawValue {
        static MISSING: RawValue = RawValue::Missing;
        self.fields.get(&normalize_column_name(name)).unwrap_or(&MISSING)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(&normalize_column_name(name))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }
}

/// A batch of engineered feature vectors plus the columns they were built for.
///
/// `columns` is what `predict` checks against the artifact's recorded schema.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureBatch {
    pub columns: Vec<String>,
    pub rows: Vec<FeatureVector>,
    /// `User_ID` per row when the raw record carried one.
    pub user_ids: Vec<Option<String>>,
    /// Number of categorical cells that fell outside their domain.
    pub unknown_categories: usize,
}

impl FeatureBatch {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Copy out a subset of rows (used for CV folds).
    pub fn select(&self, indices: &[usize]) -> Vec<FeatureVector> {
        indices.iter().map(|&i| self.rows[i]).collect()
    }
}

/// One prediction in the serving output shape (`User_ID`, `Purchased_Coverage_Bundle`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prediction {
    pub user_id: Option<String>,
    pub bundle: ClassLabel,
}

/// Rare-class handling settings.
///
/// Defaults reproduce the historical behaviour (classes 8 and 9 folded into 7).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BalanceConfig {
    /// Classes with fewer training rows than this are folded into `fallback_class`.
    pub min_class_count: usize,
    /// Destination of folded classes.
    pub fallback_class: ClassLabel,
    /// Labels above this are always folded, whatever their count.
    pub max_serving_class: ClassLabel,
}

impl Default for BalanceConfig {
    fn default() -> Self {
        Self {
            min_class_count: 10,
            fallback_class: MAX_SERVING_LABEL,
            max_serving_class: MAX_SERVING_LABEL,
        }
    }
}

/// Fixed hyperparameters for the boosted-tree classifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoosterParams {
    pub num_leaves: usize,
    pub max_depth: usize,
    pub learning_rate: f64,
    /// Minimum number of rows per leaf.
    pub min_child_samples: usize,
    /// Minimum hessian sum per leaf.
    pub min_child_weight: f64,
    /// L1 regularization.
    pub reg_alpha: f64,
    /// L2 regularization.
    pub reg_lambda: f64,
    /// Row subsampling fraction, redrawn every round.
    pub subsample: f64,
    /// Feature subsampling fraction, redrawn for every tree.
    pub colsample_bytree: f64,
    /// Maximum histogram bins for numeric features.
    pub max_bins: usize,
}

impl Default for BoosterParams {
    fn default() -> Self {
        Self {
            num_leaves: 31,
            max_depth: 6,
            learning_rate: 0.05,
            min_child_samples: 50,
            min_child_weight: 1e-3,
            reg_alpha: 1.0,
            reg_lambda: 1.0,
            subsample: 0.8,
            colsample_bytree: 0.8,
            max_bins: 255,
        }
    }
}

/// A full training run's configuration as understood by the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainConfig {
    pub folds: usize,
    /// Rounds without held-out improvement before a fold stops.
    pub patience: usize,
    /// Round cap for each CV fold.
    pub max_rounds: usize,
    /// Added to the mean best iteration for the final refit.
    pub round_margin: usize,
    pub seed: u64,
    /// Run CV folds on the rayon pool.
    pub parallel_folds: bool,
    pub params: BoosterParams,
    pub balance: BalanceConfig,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            folds: 5,
            patience: 50,
            max_rounds: 200,
            round_margin: 10,
            seed: 42,
            parallel_folds: true,
            params: BoosterParams::default(),
            balance: BalanceConfig::default(),
        }
    }
}

/// Outcome of one CV fold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FoldResult {
    pub fold: usize,
    pub train_rows: usize,
    pub holdout_rows: usize,
    /// 1-based best round on the held-out fold.
    pub best_iteration: usize,
    /// Held-out multi-logloss at `best_iteration`.
    pub holdout_logloss: Option<f64>,
    /// Macro-F1 against the evaluation labels.
    pub macro_f1: f64,
}

/// Cross-validation summary recorded in the artifact and the training report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CvSummary {
    pub folds: Vec<FoldResult>,
    pub mean_best_iteration: f64,
    pub final_rounds: usize,
    pub macro_f1_mean: f64,
    pub macro_f1_std: f64,
    /// Out-of-fold macro-F1 in the merged label space.
    pub oof_macro_f1: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_value_parse_handles_nulls_numbers_and_text() {
        assert_eq!(RawValue::parse("  "), RawValue::Missing);
        assert_eq!(RawValue::parse("NaN"), RawValue::Missing);
        assert_eq!(RawValue::parse("12"), RawValue::Number(12.0));
        assert_eq!(RawValue::parse(" Online "), RawValue::Text("Online".to_string()));
    }

    #[test]
    fn record_lookup_is_case_insensitive() {
        let record = RawRecord::new().with("Child_Dependents", 2i64);
        assert_eq!(record.get("child_dependents"), &RawValue::Number(2.0));
        assert_eq!(record.get("\u{feff}CHILD_DEPENDENTS"), &RawValue::Number(2.0));
        assert!(record.get("Adult_Dependents").is_missing());
    }

    #[test]
    fn display_renders_integers_without_fraction() {
        assert_eq!(RawValue::Number(3.0).display(), "3");
        assert_eq!(RawValue::Number(2.5).display(), "2.5");
    }
}
