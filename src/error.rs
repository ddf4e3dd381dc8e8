//! Error types.
//!
//! Library code reports failures through small typed enums (one per concern) so
//! callers can match on what went wrong. The binary converts them into an
//! `AppError`, which carries the process exit code:
//!
//! - `2`: bad input (schema, missing files, unreadable artifacts)
//! - `3`: not enough data (stratification)
//! - `4`: numerical / validation failures

use std::path::PathBuf;

use thiserror::Error;

/// A raw record (or feature batch) does not satisfy the registry's schema.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SchemaError {
    #[error("record {row}: missing required field `{field}`")]
    MissingField { row: usize, field: &'static str },

    #[error("record {row}: invalid value '{value}' for `{field}`: {reason}")]
    InvalidValue {
        row: usize,
        field: &'static str,
        value: String,
        reason: &'static str,
    },

    #[error("feature columns do not match the model schema (expected [{expected}], got [{actual}])")]
    ColumnMismatch { expected: String, actual: String },
}

/// Fatal training failures. No partial model is produced.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TrainError {
    #[error("stratification failed: {0}")]
    Stratification(String),

    #[error("validation failed: {0}")]
    Validation(String),
}

/// Failures reading or writing a `ModelArtifact`.
#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("model artifact not found at '{}'", path.display())]
    Missing { path: PathBuf },

    #[error("failed to read model artifact '{}': {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("model artifact '{}' is corrupt: {reason}", path.display())]
    Corrupt { path: PathBuf, reason: String },

    #[error("model artifact schema is incompatible with this build: {0}")]
    IncompatibleSchema(String),

    #[error("failed to write model artifact '{}': {reason}", path.display())]
    Write { path: PathBuf, reason: String },
}

/// Scoring failures.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PredictError {
    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error("model cannot score this batch: {0}")]
    Model(String),
}

#[derive(Clone)]
pub struct AppError {
    exit_code: u8,
    message: String,
}

impl AppError {
    pub fn new(exit_code: u8, message: impl Into<String>) -> Self {
        Self {
            exit_code,
            message: message.into(),
        }
    }

    pub fn exit_code(&self) -> u8 {
        self.exit_code
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::fmt::Debug for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppError")
            .field("exit_code", &self.exit_code)
            .field("message", &self.message)
            .finish()
    }
}

impl std::error::Error for AppError {}

impl From<SchemaError> for AppError {
    fn from(err: SchemaError) -> Self {
        AppError::new(2, format!("Schema error: {err}"))
    }
}

impl From<TrainError> for AppError {
    fn from(err: TrainError) -> Self {
        let code = match err {
            TrainError::Stratification(_) => 3,
            TrainError::Validation(_) => 4,
        };
        AppError::new(code, format!("Training failed: {err}"))
    }
}

impl From<ArtifactError> for AppError {
    fn from(err: ArtifactError) -> Self {
        AppError::new(2, err.to_string())
    }
}

impl From<PredictError> for AppError {
    fn from(err: PredictError) -> Self {
        match err {
            PredictError::Schema(e) => e.into(),
            PredictError::Model(_) => AppError::new(4, format!("Prediction failed: {err}")),
        }
    }
}
