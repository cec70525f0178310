//! Immutable records passed between stages. Each stage consumes only what
//! the previous stage guarantees; nothing here is mutated after creation.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Binary classification scores for the positive class.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassificationMetric {
    pub f1_score: f64,
    pub precision_score: f64,
    pub recall_score: f64,
}

/// Produced once per run by ingestion; the split files live for the
/// lifetime of the run directory.
#[derive(Debug, Clone, Serialize)]
pub struct IngestionArtifact {
    pub trained_file_path: PathBuf,
    pub test_file_path: PathBuf,
}

/// Structural checks passed; `validation_status` carries the aggregate
/// drift outcome (true = no column drifted).
#[derive(Debug, Clone, Serialize)]
pub struct ValidationArtifact {
    pub validation_status: bool,
    pub valid_train_file_path: PathBuf,
    pub valid_test_file_path: PathBuf,
    pub invalid_train_file_path: Option<PathBuf>,
    pub invalid_test_file_path: Option<PathBuf>,
    pub drift_report_file_path: PathBuf,
}

/// Per-column drift test outcome.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DriftEntry {
    pub p_value: f64,
    pub drift_status: bool,
}

pub type DriftReport = BTreeMap<String, DriftEntry>;

#[derive(Debug, Clone, Serialize)]
pub struct TransformationArtifact {
    pub transformed_object_file_path: PathBuf,
    pub transformed_train_file_path: PathBuf,
    pub transformed_test_file_path: PathBuf,
}

/// Only ever produced after both training gates pass.
#[derive(Debug, Clone, Serialize)]
pub struct ModelTrainerArtifact {
    pub trained_model_file_path: PathBuf,
    pub train_metric: ClassificationMetric,
    pub test_metric: ClassificationMetric,
}

#[derive(Debug, Clone, Serialize)]
pub struct ModelEvaluationArtifact {
    pub is_model_accepted: bool,
    pub improved_accuracy: Option<f64>,
    pub best_model_path: Option<PathBuf>,
    pub trained_model_path: PathBuf,
    pub train_metric: ClassificationMetric,
    pub best_metric: Option<ClassificationMetric>,
}

/// Both copies of the accepted bundle after promotion.
#[derive(Debug, Clone, Serialize)]
pub struct ModelPusherArtifact {
    pub saved_model_path: PathBuf,
    pub model_file_path: PathBuf,
}
