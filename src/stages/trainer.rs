use anyhow::{Context, Result};
use ndarray::{Array2, s};
use tracing::{info, instrument};

use crate::artifact::{ClassificationMetric, ModelTrainerArtifact, TransformationArtifact};
use crate::config::TrainerConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::ml;
use crate::ml::boost::GradientBooster;
use crate::ml::estimator::ModelBundle;
use crate::ml::metrics::classification_score;
use crate::ml::preprocess::Preprocessor;
use crate::observability::MetricsCollector;

const STAGE: &str = "model_trainer";

/// Fits the classifier on the transformed train set and bundles it with
/// the preprocessor, but only after the accuracy and generalization gates
/// pass. Both gates are hard stops.
pub struct ModelTrainer<'a> {
    config: TrainerConfig,
    transformation: &'a TransformationArtifact,
}

impl<'a> ModelTrainer<'a> {
    pub fn new(config: TrainerConfig, transformation: &'a TransformationArtifact) -> Self {
        Self {
            config,
            transformation,
        }
    }

    /// Hyperparameter search hook. Deliberately empty: the classifier is
    /// fitted with library-default hyperparameters.
    fn tune_hyperparameters(&self) {}

    fn split_features_and_label(array: &Array2<f64>) -> Result<(Array2<f64>, Vec<f64>)> {
        if array.ncols() < 2 {
            anyhow::bail!(
                "Transformed array needs features plus a label column, got {} columns",
                array.ncols()
            );
        }
        let features = array.slice(s![.., ..-1]).to_owned();
        let labels = array.column(array.ncols() - 1).to_vec();
        Ok((features, labels))
    }

    #[instrument(skip(self), name = "model_trainer")]
    pub fn run(&self) -> PipelineResult<ModelTrainerArtifact> {
        let prepare = || -> Result<(Array2<f64>, Vec<f64>, Array2<f64>, Vec<f64>)> {
            let train_array = ml::load_array(&self.transformation.transformed_train_file_path)
                .context("Failed to load the transformed train array")?;
            let test_array = ml::load_array(&self.transformation.transformed_test_file_path)
                .context("Failed to load the transformed test array")?;
            let (x_train, y_train) = Self::split_features_and_label(&train_array)?;
            let (x_test, y_test) = Self::split_features_and_label(&test_array)?;
            Ok((x_train, y_train, x_test, y_test))
        };
        let (x_train, y_train, x_test, y_test) =
            prepare().map_err(|err| PipelineError::stage(STAGE, err))?;

        self.tune_hyperparameters();
        let fit_and_score = || -> Result<(GradientBooster, ClassificationMetric, ClassificationMetric)> {
            let model = GradientBooster::fit(x_train.view(), &y_train)?;
            let train_predictions = model.predict(x_train.view())?;
            let train_metric = classification_score(&y_train, &train_predictions)?;
            let test_predictions = model.predict(x_test.view())?;
            let test_metric = classification_score(&y_test, &test_predictions)?;
            Ok((model, train_metric, test_metric))
        };
        let (model, train_metric, test_metric) =
            fit_and_score().map_err(|err| PipelineError::stage(STAGE, err))?;

        info!(
            train_f1 = train_metric.f1_score,
            test_f1 = test_metric.f1_score,
            "Classifier fitted and scored"
        );

        if train_metric.f1_score <= self.config.expected_accuracy {
            MetricsCollector::global().record_gate_rejection();
            return Err(PipelineError::gate(
                STAGE,
                format!(
                    "train F1 {:.4} does not reach the expected accuracy {:.2}",
                    train_metric.f1_score, self.config.expected_accuracy
                ),
            ));
        }

        let spread = (train_metric.f1_score - test_metric.f1_score).abs();
        if spread > self.config.overfit_underfit_threshold {
            MetricsCollector::global().record_gate_rejection();
            return Err(PipelineError::gate(
                STAGE,
                format!(
                    "train/test F1 spread {:.4} exceeds the generalization threshold {:.2}",
                    spread, self.config.overfit_underfit_threshold
                ),
            ));
        }
        MetricsCollector::global().record_gate_pass();

        let persist = || -> Result<()> {
            let serialized =
                std::fs::read_to_string(&self.transformation.transformed_object_file_path)
                    .context("Failed to load the fitted preprocessor")?;
            let preprocessor: Preprocessor = serde_json::from_str(&serialized)
                .context("Failed to deserialize the fitted preprocessor")?;
            let bundle = ModelBundle::new(preprocessor, model);
            bundle.save(&self.config.trained_model_file_path)
        };
        persist().map_err(|err| PipelineError::stage(STAGE, err))?;

        let artifact = ModelTrainerArtifact {
            trained_model_file_path: self.config.trained_model_file_path.clone(),
            train_metric,
            test_metric,
        };
        info!(?artifact, "Model training completed");
        Ok(artifact)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Axis;
    use tempfile::{TempDir, tempdir};

    fn write_transformation(
        dir: &TempDir,
        train: &Array2<f64>,
        test: &Array2<f64>,
    ) -> TransformationArtifact {
        let object_path = dir.path().join("preprocessing.json");
        let preprocessor = Preprocessor::fit(
            train.slice(s![.., ..-1]).to_owned().view(),
        )
        .unwrap();
        std::fs::write(&object_path, serde_json::to_string(&preprocessor).unwrap()).unwrap();
        let train_path = dir.path().join("train.csv");
        let test_path = dir.path().join("test.csv");
        ml::save_array(&train_path, train).unwrap();
        ml::save_array(&test_path, test).unwrap();
        TransformationArtifact {
            transformed_object_file_path: object_path,
            transformed_train_file_path: train_path,
            transformed_test_file_path: test_path,
        }
    }

    fn separable_array(n_per_class: usize, offset: f64, flip_labels: bool) -> Array2<f64> {
        let mut rows = Vec::new();
        for i in 0..n_per_class {
            let negative_label = if flip_labels { 1.0 } else { 0.0 };
            let positive_label = 1.0 - negative_label;
            rows.push(vec![offset + i as f64 * 0.01, negative_label]);
            rows.push(vec![offset + 5.0 + i as f64 * 0.01, positive_label]);
        }
        let flat: Vec<f64> = rows.into_iter().flatten().collect();
        Array2::from_shape_vec((n_per_class * 2, 2), flat).unwrap()
    }

    fn config(dir: &TempDir) -> TrainerConfig {
        TrainerConfig {
            trained_model_file_path: dir.path().join("trained_model/model.json"),
            expected_accuracy: 0.6,
            overfit_underfit_threshold: 0.05,
        }
    }

    #[test]
    fn separable_data_trains_and_persists_a_bundle() {
        let dir = tempdir().unwrap();
        let train = separable_array(30, 0.0, false);
        let test = separable_array(10, 0.1, false);
        let transformation = write_transformation(&dir, &train, &test);
        let trainer = ModelTrainer::new(config(&dir), &transformation);
        let artifact = trainer.run().unwrap();
        assert_eq!(artifact.train_metric.f1_score, 1.0);
        assert_eq!(artifact.test_metric.f1_score, 1.0);
        assert!(artifact.trained_model_file_path.is_file());
    }

    #[test]
    fn low_train_accuracy_aborts_before_any_bundle_is_written() {
        let dir = tempdir().unwrap();
        // Constant features with a minority positive class: the classifier
        // can only predict the majority, so positive-class F1 is zero.
        let mut rows = Vec::new();
        for i in 0..20 {
            rows.push(vec![1.0, if i < 6 { 1.0 } else { 0.0 }]);
        }
        let flat: Vec<f64> = rows.into_iter().flatten().collect();
        let train = Array2::from_shape_vec((20, 2), flat).unwrap();
        let test = train.clone();
        let transformation = write_transformation(&dir, &train, &test);
        let trainer = ModelTrainer::new(config(&dir), &transformation);

        let err = trainer.run().unwrap_err();
        assert!(err.is_gate_rejection());
        assert!(err.to_string().contains("expected accuracy"));
        assert!(!dir.path().join("trained_model/model.json").exists());
    }

    #[test]
    fn generalization_spread_aborts_regardless_of_absolute_accuracy() {
        let dir = tempdir().unwrap();
        let train = separable_array(30, 0.0, false);
        // Same pattern, inverted labels: test F1 collapses while train F1
        // stays perfect.
        let test = separable_array(10, 0.0, true);
        let transformation = write_transformation(&dir, &train, &test);
        let trainer = ModelTrainer::new(config(&dir), &transformation);

        let err = trainer.run().unwrap_err();
        assert!(err.is_gate_rejection());
        assert!(err.to_string().contains("generalization"));
        assert!(!dir.path().join("trained_model/model.json").exists());
    }

    #[test]
    fn split_features_and_label_takes_the_last_column() {
        let array = ndarray::array![[1.0, 2.0, 0.0], [3.0, 4.0, 1.0]];
        let (features, labels) = ModelTrainer::split_features_and_label(&array).unwrap();
        assert_eq!(features.len_of(Axis(1)), 2);
        assert_eq!(labels, vec![0.0, 1.0]);
    }
}
