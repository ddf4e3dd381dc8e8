//! Read/write model artifact JSON files.
//!
//! The artifact is the portable representation of a trained model:
//! - the boosted ensemble (base scores + trees)
//! - class index -> bundle label map
//! - the schema snapshot it was trained against
//! - training configuration and CV summary, for provenance
//!
//! Loading validates everything that serving relies on, so a loaded artifact
//! can be shared read-only (e.g. behind an `Arc`) and used without further checks.

use std::fs::File;
use std::io::{BufReader, BufWriter, ErrorKind, Write};
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{ClassLabel, CvSummary, TrainConfig};
use crate::error::ArtifactError;
use crate::models::Ensemble;
use crate::schema::{FEATURE_COUNT, MAX_SERVING_LABEL, SchemaSnapshot};

pub const ARTIFACT_FORMAT_VERSION: u32 = 1;
pub const ARTIFACT_TOOL: &str = "bundle";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub format_version: u32,
    pub tool: String,
    pub trained_at: DateTime<Utc>,
    pub schema: SchemaSnapshot,
    /// `classes[i]` is the bundle label predicted for class index `i`.
    pub classes: Vec<ClassLabel>,
    pub ensemble: Ensemble,
    pub config: TrainConfig,
    pub training_rows: usize,
    /// Labels folded into the fallback class, with their original counts.
    #[serde(default)]
    pub merged_classes: Vec<(ClassLabel, usize)>,
    pub cv: CvSummary,
}

impl ModelArtifact {
    /// Package a trained ensemble against the current registry.
    pub fn new(
        ensemble: Ensemble,
        classes: Vec<ClassLabel>,
        config: TrainConfig,
        cv: CvSummary,
        training_rows: usize,
        trained_at: DateTime<Utc>,
    ) -> Self {
        Self {
            format_version: ARTIFACT_FORMAT_VERSION,
            tool: ARTIFACT_TOOL.to_string(),
            trained_at,
            schema: SchemaSnapshot::current(),
            classes,
            ensemble,
            config,
            training_rows,
            merged_classes: Vec::new(),
            cv,
        }
    }

    /// Label for a class index.
    pub fn label_of(&self, class_index: usize) -> Option<ClassLabel> {
        self.classes.get(class_index).copied()
    }

    /// Structural checks (format, schema, class map, trees).
    pub fn validate(&self) -> Result<(), ArtifactError> {
        if self.format_version != ARTIFACT_FORMAT_VERSION {
            return Err(ArtifactError::IncompatibleSchema(format!(
                "artifact format {} is not supported (expected {ARTIFACT_FORMAT_VERSION})",
                self.format_version
            )));
        }
        SchemaSnapshot::current()
            .check_compatible(&self.schema)
            .map_err(ArtifactError::IncompatibleSchema)?;
        self.check_structure().map_err(|reason| ArtifactError::Corrupt {
            path: Default::default(),
            reason,
        })
    }

    fn check_structure(&self) -> Result<(), String> {
        if self.classes.len() != self.ensemble.n_classes {
            return Err(format!(
                "{} class labels for an ensemble of {} classes",
                self.classes.len(),
                self.ensemble.n_classes
            ));
        }
        if let Some(bad) = self.classes.iter().find(|&&c| c > MAX_SERVING_LABEL) {
            return Err(format!(
                "class label {bad} is outside the serving range 0..={MAX_SERVING_LABEL}"
            ));
        }
        if self.classes.windows(2).any(|w| w[0] >= w[1]) {
            return Err("class labels are not strictly increasing".to_string());
        }
        self.ensemble.validate(FEATURE_COUNT)
    }
}

/// Write an artifact as pretty JSON.
pub fn write_artifact(path: &Path, artifact: &ModelArtifact) -> Result<(), ArtifactError> {
    let write_err = |reason: String| ArtifactError::Write {
        path: path.to_path_buf(),
        reason,
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| write_err(e.to_string()))?;
    }
    let file = File::create(path).map_err(|e| write_err(e.to_string()))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, artifact).map_err(|e| write_err(e.to_string()))?;
    writer.flush().map_err(|e| write_err(e.to_string()))?;
    Ok(())
}

/// Read and validate an artifact.
pub fn read_artifact(path: &Path) -> Result<ModelArtifact, ArtifactError> {
    let file = File::open(path).map_err(|e| match e.kind() {
        ErrorKind::NotFound => ArtifactError::Missing {
            path: path.to_path_buf(),
        },
        _ => ArtifactError::Read {
            path: path.to_path_buf(),
            source: e,
        },
    })?;

    let artifact: ModelArtifact =
        serde_json::from_reader(BufReader::new(file)).map_err(|e| ArtifactError::Corrupt {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

    artifact.validate().map_err(|e| match e {
        ArtifactError::Corrupt { reason, .. } => ArtifactError::Corrupt {
            path: path.to_path_buf(),
            reason,
        },
        other => other,
    })?;
    Ok(artifact)
}
