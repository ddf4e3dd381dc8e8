//! Serving contract: `preprocess`, `load_model`, `predict`.
//!
//! Serving shares exactly one transform with training (`features::transform`)
//! and reads the model only through a validated `ModelArtifact`. Nothing here
//! depends on the training side (folds, rebalancing), so the serving path stays
//! small and the artifact can be shared read-only across threads.

use std::borrow::Cow;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::domain::{ClassLabel, FeatureBatch, Prediction, RawRecord};
use crate::error::{ArtifactError, PredictError, SchemaError};
use crate::features;
use crate::io::artifact::{ModelArtifact, read_artifact};
use crate::schema::TARGET_COLUMN;

/// Environment variable naming the artifact location (also read from `.env`).
pub const MODEL_PATH_ENV: &str = "BUNDLE_MODEL_PATH";
pub const DEFAULT_MODEL_PATH: &str = "model.json";

/// Engineer features for scoring. A target column, if present, is dropped.
pub fn preprocess(records: &[RawRecord]) -> Result<FeatureBatch, SchemaError> {
    let records: Cow<'_, [RawRecord]> = if records.iter().any(|r| r.contains(TARGET_COLUMN)) {
        Cow::Owned(
            records
                .iter()
                .cloned()
                .map(|mut r| {
                    r.remove(TARGET_COLUMN);
                    r
                })
                .collect(),
        )
    } else {
        Cow::Borrowed(records)
    };
    features::transform(&records)
}

/// Where `load_model` looks: `$BUNDLE_MODEL_PATH`, else `model.json`.
pub fn model_path() -> PathBuf {
    dotenvy::dotenv().ok();
    resolve_model_path(std::env::var(MODEL_PATH_ENV).ok())
}

fn resolve_model_path(value: Option<String>) -> PathBuf {
    match value {
        Some(v) if !v.trim().is_empty() => PathBuf::from(v.trim()),
        _ => PathBuf::from(DEFAULT_MODEL_PATH),
    }
}

/// Load the artifact from the well-known location.
pub fn load_model() -> Result<ModelArtifact, ArtifactError> {
    load_model_from(&model_path())
}

/// Load and validate the artifact at `path`.
pub fn load_model_from(path: &Path) -> Result<ModelArtifact, ArtifactError> {
    let artifact = read_artifact(path)?;
    debug!(
        path = %path.display(),
        classes = ?artifact.classes,
        rounds = artifact.ensemble.n_rounds(),
        "model loaded"
    );
    Ok(artifact)
}

/// Most likely bundle per row. Labels are always within the serving range.
pub fn predict(batch: &FeatureBatch, artifact: &ModelArtifact) -> Result<Vec<ClassLabel>, PredictError> {
    check_columns(batch, artifact)?;
    batch
        .rows
        .iter()
        .map(|row| {
            let idx = artifact.ensemble.predict_index(row);
            artifact
                .label_of(idx)
                .ok_or_else(|| PredictError::Model(format!("class index {idx} has no label")))
        })
        .collect()
}

/// Class probabilities per row, in the order of `artifact.classes`.
pub fn predict_proba(batch: &FeatureBatch, artifact: &ModelArtifact) -> Result<Vec<Vec<f64>>, PredictError> {
    check_columns(batch, artifact)?;
    Ok(batch
        .rows
        .iter()
        .map(|row| artifact.ensemble.predict_proba(row))
        .collect())
}

/// Predictions paired with the row's `User_ID`.
pub fn predictions(batch: &FeatureBatch, artifact: &ModelArtifact) -> Result<Vec<Prediction>, PredictError> {
    let labels = predict(batch, artifact)?;
    Ok(labels
        .into_iter()
        .zip(&batch.user_ids)
        .map(|(bundle, user_id)| Prediction {
            user_id: user_id.clone(),
            bundle,
        })
        .collect())
}

fn check_columns(batch: &FeatureBatch, artifact: &ModelArtifact) -> Result<(), SchemaError> {
    if batch.columns == artifact.schema.features {
        Ok(())
    } else {
        Err(SchemaError::ColumnMismatch {
            expected: artifact.schema.features.join(", "),
            actual: batch.columns.join(", "),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::features::tests::full_record;
    use crate::io::artifact::tests::tiny_artifact;
    use crate::io::artifact::write_artifact;

    #[test]
    fn preprocess_ignores_a_target_column() {
        let with_target = full_record().with(TARGET_COLUMN, 9i64);
        let a = preprocess(&[with_target]).unwrap();
        let b = preprocess(&[full_record()]).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn predict_follows_the_artifact() {
        let artifact = tiny_artifact();
        let rich = full_record().with("Estimated_Annual_Income", 90_000.0);
        let poor = full_record().with("Estimated_Annual_Income", 20_000.0);
        let batch = preprocess(&[rich, poor]).unwrap();

        assert_eq!(predict(&batch, &artifact).unwrap(), vec![3, 0]);
        let proba = predict_proba(&batch, &artifact).unwrap();
        assert!(proba.iter().all(|p| (p.iter().sum::<f64>() - 1.0).abs() < 1e-12));

        let out = predictions(&batch, &artifact).unwrap();
        assert_eq!(out[0].user_id.as_deref(), Some("U0001"));
        assert_eq!(out[0].bundle, 3);
    }

    #[test]
    fn loaded_model_predicts_like_the_saved_one() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");
        let artifact = tiny_artifact();
        write_artifact(&path, &artifact).unwrap();

        let loaded = load_model_from(&path).unwrap();
        let batch = preprocess(&[full_record()]).unwrap();
        assert_eq!(predict(&batch, &loaded).unwrap(), predict(&batch, &artifact).unwrap());
    }

    #[test]
    fn unknown_category_still_predicts_a_serving_label() {
        let artifact = tiny_artifact();
        let record = full_record().with("Employment_Status", "Astronaut");
        let batch = preprocess(&[record]).unwrap();
        assert_eq!(batch.unknown_categories, 1);
        let labels = predict(&batch, &artifact).unwrap();
        assert!(labels.iter().all(|&l| l <= 7));
    }

    #[test]
    fn column_order_must_match() {
        let artifact = tiny_artifact();
        let mut batch = preprocess(&[full_record()]).unwrap();
        batch.columns.swap(0, 1);
        assert!(matches!(
            predict(&batch, &artifact),
            Err(PredictError::Schema(SchemaError::ColumnMismatch { .. }))
        ));
    }

    #[test]
    fn missing_artifact_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            load_model_from(&dir.path().join("absent.json")),
            Err(ArtifactError::Missing { .. })
        ));
    }

    #[test]
    fn model_path_defaults() {
        assert_eq!(resolve_model_path(None), PathBuf::from("model.json"));
        assert_eq!(resolve_model_path(Some("  ".into())), PathBuf::from("model.json"));
        assert_eq!(resolve_model_path(Some("/srv/m.json".into())), PathBuf::from("/srv/m.json"));
    }

    #[test]
    fn artifact_is_shareable_across_threads() {
        let artifact = Arc::new(tiny_artifact());
        let batch = Arc::new(preprocess(&[full_record()]).unwrap());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let artifact = Arc::clone(&artifact);
                let batch = Arc::clone(&batch);
                std::thread::spawn(move || predict(&batch, &artifact).unwrap())
            })
            .collect();
        let expected = predict(&batch, &artifact).unwrap();
        for handle in handles {
            assert_eq!(handle.join().unwrap(), expected);
        }
    }
}
