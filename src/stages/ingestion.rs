use anyhow::{Context, Result, bail};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use tracing::{info, instrument};

use crate::artifact::IngestionArtifact;
use crate::config::IngestionConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::frame::Frame;
use crate::schema::SchemaConfig;
use crate::store::TabularStore;

const STAGE: &str = "data_ingestion";

/// Materializes the record collection into a feature-store snapshot and
/// splits it into train/test files.
pub struct DataIngestion<'a> {
    config: IngestionConfig,
    schema: &'a SchemaConfig,
    store: &'a dyn TabularStore,
}

impl<'a> DataIngestion<'a> {
    pub fn new(
        config: IngestionConfig,
        schema: &'a SchemaConfig,
        store: &'a dyn TabularStore,
    ) -> Self {
        Self {
            config,
            schema,
            store,
        }
    }

    /// Fetches the collection and overwrites the feature-store snapshot
    /// for this run.
    fn export_to_feature_store(&self) -> PipelineResult<Frame> {
        info!(
            collection = self.config.collection.as_str(),
            "Exporting collection to the feature store"
        );
        let frame = self
            .store
            .fetch(&self.config.collection, Some(&self.config.database))?;
        frame
            .write_csv(&self.config.feature_store_file_path)
            .map_err(|err| PipelineError::stage(STAGE, err))?;
        Ok(frame)
    }

    /// Random row split with the configured test fraction. No
    /// stratification beyond shuffling.
    fn split_train_test(&self, frame: &Frame) -> Result<(Frame, Frame)> {
        let n = frame.n_rows();
        if n < 2 {
            bail!("Need at least two rows to split, collection has {n}");
        }
        let n_test = ((n as f64 * self.config.train_test_split_ratio).ceil() as usize)
            .clamp(1, n - 1);

        let mut indices: Vec<usize> = (0..n).collect();
        let mut rng = match self.config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        indices.shuffle(&mut rng);

        let mut train = Frame::new(frame.columns().to_vec());
        let mut test = Frame::new(frame.columns().to_vec());
        for (position, &row_index) in indices.iter().enumerate() {
            let row = frame.rows()[row_index].clone();
            if position < n_test {
                test.push_row(row)?;
            } else {
                train.push_row(row)?;
            }
        }
        info!(
            train_rows = train.n_rows(),
            test_rows = test.n_rows(),
            "Dataset split into train and test sets"
        );
        Ok((train, test))
    }

    #[instrument(skip(self), name = "data_ingestion")]
    pub fn run(&self) -> PipelineResult<IngestionArtifact> {
        let raw = self.export_to_feature_store()?;
        let frame = raw.drop_columns(&self.schema.drop_columns);

        let split_and_write = || -> Result<()> {
            let (train, test) = self.split_train_test(&frame)?;
            train
                .write_csv(&self.config.training_file_path)
                .context("Failed to write the train split")?;
            test.write_csv(&self.config.testing_file_path)
                .context("Failed to write the test split")?;
            Ok(())
        };
        split_and_write().map_err(|err| PipelineError::stage(STAGE, err))?;

        let artifact = IngestionArtifact {
            trained_file_path: self.config.training_file_path.clone(),
            test_file_path: self.config.testing_file_path.clone(),
        };
        info!(?artifact, "Data ingestion completed");
        Ok(artifact)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PipelineConfig, RunContext};
    use crate::frame::Cell;
    use crate::store::DocumentStore;
    use tempfile::tempdir;

    fn schema() -> SchemaConfig {
        SchemaConfig {
            columns: vec!["s1".into(), "class".into()],
            numerical_columns: vec!["s1".into()],
            drop_columns: vec!["batch_id".into()],
            target_column: "class".into(),
        }
    }

    #[test]
    fn ingestion_writes_snapshot_and_disjoint_splits() {
        let dir = tempdir().unwrap();
        let config = PipelineConfig {
            store_root: dir.path().join("data_store"),
            artifact_root: dir.path().join("artifact"),
            seed: Some(3),
            ..PipelineConfig::default()
        };
        let store = DocumentStore::new(&config.store_root, &config.database);

        let mut frame = Frame::new(vec!["batch_id".into(), "s1".into(), "class".into()]);
        for i in 0..10 {
            frame
                .push_row(vec![
                    Cell::Number(i as f64),
                    Cell::Number(i as f64 * 2.0),
                    Cell::Text(if i % 2 == 0 { "neg" } else { "pos" }.into()),
                ])
                .unwrap();
        }
        store.persist(&frame, &config.collection, None).unwrap();

        let run = RunContext::with_timestamp(&config, "t0".into());
        let schema = schema();
        let stage = DataIngestion::new(IngestionConfig::new(&config, &run), &schema, &store);
        let artifact = stage.run().unwrap();

        let train = Frame::read_csv(&artifact.trained_file_path).unwrap();
        let test = Frame::read_csv(&artifact.test_file_path).unwrap();
        // Drop list removed the raw-only column before the split.
        assert_eq!(train.columns(), ["s1", "class"]);
        assert_eq!(train.n_rows() + test.n_rows(), 10);
        assert_eq!(test.n_rows(), 2);

        let snapshot_path = run
            .run_dir
            .join("data_ingestion/feature_store")
            .join(crate::config::FEATURE_STORE_FILE);
        assert!(snapshot_path.is_file());
    }

    #[test]
    fn missing_collection_surfaces_an_adapter_error() {
        let dir = tempdir().unwrap();
        let config = PipelineConfig {
            store_root: dir.path().join("data_store"),
            artifact_root: dir.path().join("artifact"),
            ..PipelineConfig::default()
        };
        let store = DocumentStore::new(&config.store_root, &config.database);
        let run = RunContext::with_timestamp(&config, "t0".into());
        let schema = schema();
        let stage = DataIngestion::new(IngestionConfig::new(&config, &run), &schema, &store);
        let err = stage.run().unwrap_err();
        assert!(matches!(err, PipelineError::Adapter { .. }));
    }
}
