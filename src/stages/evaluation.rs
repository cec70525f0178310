use anyhow::{Context, Result};
use tracing::{info, instrument};

use crate::artifact::{ModelEvaluationArtifact, ModelTrainerArtifact, ValidationArtifact};
use crate::config::EvaluationConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::frame::Frame;
use crate::ml::estimator::{ModelBundle, ModelRegistry, TargetMapping};
use crate::ml::metrics::classification_score;
use crate::schema::SchemaConfig;

const STAGE: &str = "model_evaluation";

/// Compares the newly trained bundle against the incumbent on the full
/// validated dataset. The first model ever trained is accepted outright:
/// there is nothing to compare it against yet.
pub struct ModelEvaluation<'a> {
    config: EvaluationConfig,
    schema: &'a SchemaConfig,
    validation: &'a ValidationArtifact,
    trainer: &'a ModelTrainerArtifact,
}

impl<'a> ModelEvaluation<'a> {
    pub fn new(
        config: EvaluationConfig,
        schema: &'a SchemaConfig,
        validation: &'a ValidationArtifact,
        trainer: &'a ModelTrainerArtifact,
    ) -> Self {
        Self {
            config,
            schema,
            validation,
            trainer,
        }
    }

    fn load_full_dataset(&self) -> Result<(Vec<f64>, Frame)> {
        let train = Frame::read_csv(&self.validation.valid_train_file_path)
            .context("Failed to load the validated train split")?;
        let test = Frame::read_csv(&self.validation.valid_test_file_path)
            .context("Failed to load the validated test split")?;
        let full = train.concat(&test)?;
        let (label_cells, features) = full.take_column(&self.schema.target_column)?;
        let y_true = TargetMapping::encode(&label_cells)?;
        Ok((y_true, features))
    }

    fn write_report(&self, artifact: &ModelEvaluationArtifact) -> Result<()> {
        let path = &self.config.report_file_path;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!(
                    "Failed to create evaluation report directory: {}",
                    parent.display()
                )
            })?;
        }
        let content =
            serde_yaml::to_string(artifact).context("Failed to serialize evaluation report")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write evaluation report: {}", path.display()))?;
        Ok(())
    }

    #[instrument(skip(self), name = "model_evaluation")]
    pub fn run(&self) -> PipelineResult<ModelEvaluationArtifact> {
        let registry = ModelRegistry::new(&self.config.saved_model_dir);
        let incumbent_path = registry
            .best_model_path()
            .map_err(|err| PipelineError::stage(STAGE, err))?;

        let Some(best_model_path) = incumbent_path else {
            // Bootstrap: no incumbent means auto-accept.
            let artifact = ModelEvaluationArtifact {
                is_model_accepted: true,
                improved_accuracy: None,
                best_model_path: None,
                trained_model_path: self.trainer.trained_model_file_path.clone(),
                train_metric: self.trainer.test_metric,
                best_metric: None,
            };
            info!(?artifact, "No incumbent model; new model accepted");
            return Ok(artifact);
        };

        let compare = || -> Result<ModelEvaluationArtifact> {
            let (y_true, features) = self.load_full_dataset()?;
            let trained = ModelBundle::load(&self.trainer.trained_model_file_path)?;
            let incumbent = ModelBundle::load(&best_model_path)?;

            let trained_predictions = trained.predict_frame(&features)?;
            let incumbent_predictions = incumbent.predict_frame(&features)?;
            let trained_metric = classification_score(&y_true, &trained_predictions)?;
            let incumbent_metric = classification_score(&y_true, &incumbent_predictions)?;

            let improved_accuracy = trained_metric.f1_score - incumbent_metric.f1_score;
            let is_model_accepted = improved_accuracy > self.config.change_threshold;
            info!(
                trained_f1 = trained_metric.f1_score,
                incumbent_f1 = incumbent_metric.f1_score,
                improved_accuracy,
                is_model_accepted,
                "Model comparison finished"
            );

            Ok(ModelEvaluationArtifact {
                is_model_accepted,
                improved_accuracy: Some(improved_accuracy),
                best_model_path: Some(best_model_path.clone()),
                trained_model_path: self.trainer.trained_model_file_path.clone(),
                train_metric: trained_metric,
                best_metric: Some(incumbent_metric),
            })
        };
        let artifact = compare().map_err(|err| PipelineError::stage(STAGE, err))?;

        self.write_report(&artifact)
            .map_err(|err| PipelineError::stage(STAGE, err))?;
        info!(?artifact, "Model evaluation completed");
        Ok(artifact)
    }
}
