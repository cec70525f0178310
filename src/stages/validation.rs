use anyhow::{Context, Result};
use tracing::{info, instrument, warn};

use crate::artifact::{DriftEntry, DriftReport, IngestionArtifact, ValidationArtifact};
use crate::config::ValidationConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::frame::Frame;
use crate::schema::SchemaConfig;
use crate::stats::ks_2samp;

const STAGE: &str = "data_validation";

/// Structural checks against the schema plus a per-column drift test
/// between the train and test distributions.
pub struct DataValidation<'a> {
    config: ValidationConfig,
    schema: &'a SchemaConfig,
    ingestion: &'a IngestionArtifact,
}

impl<'a> DataValidation<'a> {
    pub fn new(
        config: ValidationConfig,
        schema: &'a SchemaConfig,
        ingestion: &'a IngestionArtifact,
    ) -> Self {
        Self {
            config,
            schema,
            ingestion,
        }
    }

    fn column_count_matches(&self, frame: &Frame) -> bool {
        frame.n_columns() == self.schema.expected_column_count()
    }

    fn numerical_columns_present(&self, frame: &Frame) -> bool {
        let missing: Vec<&String> = self
            .schema
            .numerical_columns
            .iter()
            .filter(|column| !frame.has_column(column))
            .collect();
        if !missing.is_empty() {
            warn!(?missing, "Schema numerical columns absent from split");
        }
        missing.is_empty()
    }

    /// Two-sample KS test per shared column. Always writes the report;
    /// returns the aggregate status (true = no column drifted). Drift is an
    /// advisory signal: a false status records the shift but does not halt
    /// the pipeline the way a structural failure does.
    fn detect_dataset_drift(&self, base: &Frame, current: &Frame) -> Result<bool> {
        let mut status = true;
        let mut report = DriftReport::new();
        for column in base.columns() {
            if !current.has_column(column) {
                continue;
            }
            let base_values = base.column_values(column)?;
            let current_values = current.column_values(column)?;
            let result = ks_2samp(&base_values, &current_values);
            let drifted = result.p_value < self.config.drift_significance;
            if drifted {
                status = false;
                warn!(
                    column = column.as_str(),
                    p_value = result.p_value,
                    "Column distribution drifted between splits"
                );
            }
            report.insert(
                column.clone(),
                DriftEntry {
                    p_value: result.p_value,
                    drift_status: drifted,
                },
            );
        }

        let path = &self.config.drift_report_file_path;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create drift report directory: {}", parent.display())
            })?;
        }
        let content =
            serde_yaml::to_string(&report).context("Failed to serialize drift report")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write drift report: {}", path.display()))?;
        Ok(status)
    }

    #[instrument(skip(self), name = "data_validation")]
    pub fn run(&self) -> PipelineResult<ValidationArtifact> {
        let read = |path: &std::path::Path| -> PipelineResult<Frame> {
            Frame::read_csv(path).map_err(|err| PipelineError::stage(STAGE, err))
        };
        let train = read(&self.ingestion.trained_file_path)?;
        let test = read(&self.ingestion.test_file_path)?;

        // Structural checks accumulate into one composite message instead
        // of failing fast.
        let mut failures: Vec<&str> = Vec::new();
        if !self.column_count_matches(&train) {
            failures.push("Columns are missing in the train split.");
        }
        if !self.column_count_matches(&test) {
            failures.push("Columns are missing in the test split.");
        }
        if !self.numerical_columns_present(&train) {
            failures.push("Numerical columns are missing in the train split.");
        }
        if !self.numerical_columns_present(&test) {
            failures.push("Numerical columns are missing in the test split.");
        }
        if !failures.is_empty() {
            return Err(PipelineError::validation(failures.join("\n")));
        }

        let status = self
            .detect_dataset_drift(&train, &test)
            .map_err(|err| PipelineError::stage(STAGE, err))?;

        let artifact = ValidationArtifact {
            validation_status: status,
            valid_train_file_path: self.ingestion.trained_file_path.clone(),
            valid_test_file_path: self.ingestion.test_file_path.clone(),
            invalid_train_file_path: None,
            invalid_test_file_path: None,
            drift_report_file_path: self.config.drift_report_file_path.clone(),
        };
        info!(?artifact, "Data validation completed");
        Ok(artifact)
    }
}
