use anyhow::{Context, Result};
use ndarray::{Array2, Axis, concatenate};
use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::{info, instrument};

use crate::artifact::{TransformationArtifact, ValidationArtifact};
use crate::config::TransformationConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::frame::Frame;
use crate::ml::estimator::TargetMapping;
use crate::ml::preprocess::Preprocessor;
use crate::ml::resample::smote_tomek;
use crate::ml;
use crate::schema::SchemaConfig;

const STAGE: &str = "data_transformation";

/// Fits the preprocessing pipeline on the train split, applies it to both
/// splits, rebalances the class ratio and persists the numeric arrays with
/// the label appended as the last column.
pub struct DataTransformation<'a> {
    config: TransformationConfig,
    schema: &'a SchemaConfig,
    validation: &'a ValidationArtifact,
}

impl<'a> DataTransformation<'a> {
    pub fn new(
        config: TransformationConfig,
        schema: &'a SchemaConfig,
        validation: &'a ValidationArtifact,
    ) -> Self {
        Self {
            config,
            schema,
            validation,
        }
    }

    fn transform_split(
        &self,
        frame: &Frame,
        preprocessor: &Preprocessor,
        rng: &mut StdRng,
    ) -> Result<Array2<f64>> {
        let (label_cells, features) = frame.take_column(&self.schema.target_column)?;
        let labels = TargetMapping::encode(&label_cells)?;
        let matrix = features.numeric_matrix();
        let transformed = preprocessor.transform(matrix.view())?;

        // Resampling applies to this split in isolation; the fault class
        // is rare and both training and evaluation need corrected balance
        // for F1 to mean anything.
        let (balanced, balanced_labels) = smote_tomek(transformed.view(), &labels, rng)?;

        let label_column =
            Array2::from_shape_vec((balanced_labels.len(), 1), balanced_labels)?;
        concatenate(Axis(1), &[balanced.view(), label_column.view()])
            .context("Failed to append the label column")
    }

    #[instrument(skip(self), name = "data_transformation")]
    pub fn run(&self) -> PipelineResult<TransformationArtifact> {
        let work = || -> Result<()> {
            let train = Frame::read_csv(&self.validation.valid_train_file_path)
                .context("Failed to load the validated train split")?;
            let test = Frame::read_csv(&self.validation.valid_test_file_path)
                .context("Failed to load the validated test split")?;

            let (_, train_features) = train.take_column(&self.schema.target_column)?;
            let preprocessor = Preprocessor::fit(train_features.numeric_matrix().view())?;

            let mut rng = match self.config.seed {
                Some(seed) => StdRng::seed_from_u64(seed),
                None => StdRng::from_os_rng(),
            };
            let train_array = self.transform_split(&train, &preprocessor, &mut rng)?;
            let test_array = self.transform_split(&test, &preprocessor, &mut rng)?;

            let serialized = serde_json::to_string(&preprocessor)
                .context("Failed to serialize the preprocessor")?;
            let object_path = &self.config.transformed_object_file_path;
            if let Some(parent) = object_path.parent() {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!(
                        "Failed to create preprocessor directory: {}",
                        parent.display()
                    )
                })?;
            }
            std::fs::write(object_path, serialized).with_context(|| {
                format!("Failed to write the preprocessor: {}", object_path.display())
            })?;

            ml::save_array(&self.config.transformed_train_file_path, &train_array)?;
            ml::save_array(&self.config.transformed_test_file_path, &test_array)?;
            info!(
                train_rows = train_array.nrows(),
                test_rows = test_array.nrows(),
                "Splits transformed and rebalanced"
            );
            Ok(())
        };
        work().map_err(|err| PipelineError::stage(STAGE, err))?;

        let artifact = TransformationArtifact {
            transformed_object_file_path: self.config.transformed_object_file_path.clone(),
            transformed_train_file_path: self.config.transformed_train_file_path.clone(),
            transformed_test_file_path: self.config.transformed_test_file_path.clone(),
        };
        info!(?artifact, "Data transformation completed");
        Ok(artifact)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Cell;
    use tempfile::tempdir;

    fn schema() -> SchemaConfig {
        SchemaConfig {
            columns: vec!["s1".into(), "s2".into(), "class".into()],
            numerical_columns: vec!["s1".into(), "s2".into()],
            drop_columns: vec![],
            target_column: "class".into(),
        }
    }

    fn write_imbalanced_split(path: &std::path::Path, positives: usize, negatives: usize) {
        let mut frame = Frame::new(vec!["s1".into(), "s2".into(), "class".into()]);
        for i in 0..negatives {
            frame
                .push_row(vec![
                    Cell::Number(i as f64 * 0.1),
                    Cell::Number(1.0),
                    Cell::Text("neg".into()),
                ])
                .unwrap();
        }
        for i in 0..positives {
            frame
                .push_row(vec![
                    Cell::Number(50.0 + i as f64 * 0.1),
                    Cell::Missing,
                    Cell::Text("pos".into()),
                ])
                .unwrap();
        }
        frame.write_csv(path).unwrap();
    }

    #[test]
    fn transformation_balances_and_persists_arrays_with_label_last() {
        let dir = tempdir().unwrap();
        let train_path = dir.path().join("train.csv");
        let test_path = dir.path().join("test.csv");
        write_imbalanced_split(&train_path, 4, 16);
        write_imbalanced_split(&test_path, 3, 9);

        let validation = ValidationArtifact {
            validation_status: true,
            valid_train_file_path: train_path,
            valid_test_file_path: test_path,
            invalid_train_file_path: None,
            invalid_test_file_path: None,
            drift_report_file_path: dir.path().join("report.yaml"),
        };
        let config = TransformationConfig {
            transformed_object_file_path: dir.path().join("transformed_object/preprocessing.json"),
            transformed_train_file_path: dir.path().join("transformed/train.csv"),
            transformed_test_file_path: dir.path().join("transformed/test.csv"),
            seed: Some(11),
        };
        let schema = schema();
        let stage = DataTransformation::new(config, &schema, &validation);
        let artifact = stage.run().unwrap();

        let train_array = ml::load_array(&artifact.transformed_train_file_path).unwrap();
        // Two features plus the appended label.
        assert_eq!(train_array.ncols(), 3);
        let labels: Vec<f64> = train_array.column(2).to_vec();
        assert!(labels.iter().all(|&l| l == 0.0 || l == 1.0));
        // Oversampling lifted the positive count toward the negatives.
        let positives = labels.iter().filter(|&&l| l == 1.0).count();
        let negatives = labels.len() - positives;
        assert!(positives > 4);
        assert!((positives as i64 - negatives as i64).abs() <= 2);

        let preprocessor: Preprocessor = serde_json::from_str(
            &std::fs::read_to_string(&artifact.transformed_object_file_path).unwrap(),
        )
        .unwrap();
        assert_eq!(preprocessor.n_features(), 2);
    }

    #[test]
    fn unknown_target_value_fails_the_stage() {
        let dir = tempdir().unwrap();
        let mut frame = Frame::new(vec!["s1".into(), "s2".into(), "class".into()]);
        frame
            .push_row(vec![
                Cell::Number(1.0),
                Cell::Number(2.0),
                Cell::Text("unknown".into()),
            ])
            .unwrap();
        let train_path = dir.path().join("train.csv");
        let test_path = dir.path().join("test.csv");
        frame.write_csv(&train_path).unwrap();
        frame.write_csv(&test_path).unwrap();

        let validation = ValidationArtifact {
            validation_status: true,
            valid_train_file_path: train_path,
            valid_test_file_path: test_path,
            invalid_train_file_path: None,
            invalid_test_file_path: None,
            drift_report_file_path: dir.path().join("report.yaml"),
        };
        let config = TransformationConfig {
            transformed_object_file_path: dir.path().join("transformed_object/preprocessing.json"),
            transformed_train_file_path: dir.path().join("transformed/train.csv"),
            transformed_test_file_path: dir.path().join("transformed/test.csv"),
            seed: Some(11),
        };
        let schema = schema();
        let stage = DataTransformation::new(config, &schema, &validation);
        let err = stage.run().unwrap_err();
        assert!(matches!(err, PipelineError::Stage { .. }));
    }
}
