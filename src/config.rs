use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use chrono::Utc;
use serde::Deserialize;

pub const PIPELINE_NAME: &str = "sensor-fault-retraining";

pub const FEATURE_STORE_FILE: &str = "sensor.csv";
pub const TRAIN_FILE: &str = "train.csv";
pub const TEST_FILE: &str = "test.csv";
pub const PREPROCESSOR_FILE: &str = "preprocessing.json";
pub const MODEL_FILE: &str = "model.json";
pub const DRIFT_REPORT_FILE: &str = "report.yaml";
pub const EVALUATION_REPORT_FILE: &str = "report.yaml";

const TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";

/// Process-level configuration for one pipeline deployment. Loaded from
/// YAML; every field has a default mirroring the shipped layout.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    pub collection: String,
    pub database: String,
    pub store_root: PathBuf,
    pub schema_path: PathBuf,
    pub artifact_root: PathBuf,
    pub saved_model_dir: PathBuf,
    pub bucket_name: String,
    pub mirror_root: PathBuf,
    pub train_test_split_ratio: f64,
    pub expected_accuracy: f64,
    pub overfit_underfit_threshold: f64,
    pub model_change_threshold: f64,
    pub drift_significance: f64,
    /// Fixed RNG seed for the split and the resampler. Unset means a fresh
    /// seed per run.
    pub seed: Option<u64>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            collection: "vehicles".to_string(),
            database: "sensordb".to_string(),
            store_root: PathBuf::from("data_store"),
            schema_path: PathBuf::from("config/schema.yaml"),
            artifact_root: PathBuf::from("artifact"),
            saved_model_dir: PathBuf::from("saved_models"),
            bucket_name: "sensor-telemetry-artifacts".to_string(),
            mirror_root: PathBuf::from("remote_mirror"),
            train_test_split_ratio: 0.2,
            expected_accuracy: 0.6,
            overfit_underfit_threshold: 0.05,
            model_change_threshold: 0.02,
            drift_significance: 0.05,
            seed: None,
        }
    }
}

impl PipelineConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read pipeline config: {}", path.display()))?;
        let config: PipelineConfig = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse pipeline config YAML: {}", path.display()))?;
        config.check()?;
        Ok(config)
    }

    pub fn check(&self) -> Result<()> {
        if !(self.train_test_split_ratio > 0.0 && self.train_test_split_ratio < 1.0) {
            bail!(
                "train_test_split_ratio must be inside (0, 1), got {}",
                self.train_test_split_ratio
            );
        }
        if self.collection.trim().is_empty() {
            bail!("collection name cannot be empty");
        }
        if !(self.drift_significance > 0.0 && self.drift_significance < 1.0) {
            bail!(
                "drift_significance must be inside (0, 1), got {}",
                self.drift_significance
            );
        }
        Ok(())
    }

    pub fn artifact_bucket_url(&self, timestamp: &str) -> String {
        format!("s3://{}/artifact/{timestamp}", self.bucket_name)
    }

    pub fn saved_model_bucket_url(&self) -> String {
        format!("s3://{}/saved_models", self.bucket_name)
    }
}

/// Run-level identity: the timestamp keys the artifact root and the
/// registry version slot for this run.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub timestamp: String,
    pub run_dir: PathBuf,
}

impl RunContext {
    pub fn new(config: &PipelineConfig) -> Self {
        Self::with_timestamp(config, Utc::now().format(TIMESTAMP_FORMAT).to_string())
    }

    pub fn with_timestamp(config: &PipelineConfig, timestamp: String) -> Self {
        let run_dir = config.artifact_root.join(&timestamp);
        Self { timestamp, run_dir }
    }
}

#[derive(Debug, Clone)]
pub struct IngestionConfig {
    pub collection: String,
    pub database: String,
    pub feature_store_file_path: PathBuf,
    pub training_file_path: PathBuf,
    pub testing_file_path: PathBuf,
    pub train_test_split_ratio: f64,
    pub seed: Option<u64>,
}

impl IngestionConfig {
    pub fn new(config: &PipelineConfig, run: &RunContext) -> Self {
        let stage_dir = run.run_dir.join("data_ingestion");
        Self {
            collection: config.collection.clone(),
            database: config.database.clone(),
            feature_store_file_path: stage_dir.join("feature_store").join(FEATURE_STORE_FILE),
            training_file_path: stage_dir.join("ingested").join(TRAIN_FILE),
            testing_file_path: stage_dir.join("ingested").join(TEST_FILE),
            train_test_split_ratio: config.train_test_split_ratio,
            seed: config.seed,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ValidationConfig {
    pub drift_report_file_path: PathBuf,
    pub drift_significance: f64,
}

impl ValidationConfig {
    pub fn new(config: &PipelineConfig, run: &RunContext) -> Self {
        let stage_dir = run.run_dir.join("data_validation");
        Self {
            drift_report_file_path: stage_dir.join("drift_report").join(DRIFT_REPORT_FILE),
            drift_significance: config.drift_significance,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TransformationConfig {
    pub transformed_object_file_path: PathBuf,
    pub transformed_train_file_path: PathBuf,
    pub transformed_test_file_path: PathBuf,
    pub seed: Option<u64>,
}

impl TransformationConfig {
    pub fn new(config: &PipelineConfig, run: &RunContext) -> Self {
        let stage_dir = run.run_dir.join("data_transformation");
        Self {
            transformed_object_file_path: stage_dir
                .join("transformed_object")
                .join(PREPROCESSOR_FILE),
            transformed_train_file_path: stage_dir.join("transformed").join(TRAIN_FILE),
            transformed_test_file_path: stage_dir.join("transformed").join(TEST_FILE),
            seed: config.seed,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TrainerConfig {
    pub trained_model_file_path: PathBuf,
    pub expected_accuracy: f64,
    pub overfit_underfit_threshold: f64,
}

impl TrainerConfig {
    pub fn new(config: &PipelineConfig, run: &RunContext) -> Self {
        let stage_dir = run.run_dir.join("model_trainer");
        Self {
            trained_model_file_path: stage_dir.join("trained_model").join(MODEL_FILE),
            expected_accuracy: config.expected_accuracy,
            overfit_underfit_threshold: config.overfit_underfit_threshold,
        }
    }
}

#[derive(Debug, Clone)]
pub struct EvaluationConfig {
    pub report_file_path: PathBuf,
    pub change_threshold: f64,
    pub saved_model_dir: PathBuf,
}

impl EvaluationConfig {
    pub fn new(config: &PipelineConfig, run: &RunContext) -> Self {
        let stage_dir = run.run_dir.join("model_evaluation");
        Self {
            report_file_path: stage_dir.join(EVALUATION_REPORT_FILE),
            change_threshold: config.model_change_threshold,
            saved_model_dir: config.saved_model_dir.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PusherConfig {
    pub model_file_path: PathBuf,
    pub saved_model_path: PathBuf,
}

impl PusherConfig {
    pub fn new(config: &PipelineConfig, run: &RunContext) -> Self {
        Self {
            model_file_path: run.run_dir.join("model_pusher").join(MODEL_FILE),
            saved_model_path: config
                .saved_model_dir
                .join(&run.timestamp)
                .join(MODEL_FILE),
        }
    }
}
