use std::time::Instant;

use anyhow::{Context, Result};
use tracing::{info, instrument, warn};

use crate::artifact::ModelPusherArtifact;
use crate::config::{
    EvaluationConfig, IngestionConfig, PipelineConfig, PusherConfig, RunContext,
    TrainerConfig, TransformationConfig, ValidationConfig,
};
use crate::error::{PipelineError, PipelineResult};
use crate::observability::MetricsCollector;
use crate::schema::SchemaConfig;
use crate::stages::evaluation::ModelEvaluation;
use crate::stages::ingestion::DataIngestion;
use crate::stages::pusher::ModelPusher;
use crate::stages::trainer::ModelTrainer;
use crate::stages::transformation::DataTransformation;
use crate::stages::validation::DataValidation;
use crate::store::TabularStore;
use crate::sync::RemoteSync;

/// Where a run currently stands. Owned by the orchestrator instance, so
/// two pipelines in one process cannot trample each other's state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Ingesting,
    Validating,
    Transforming,
    Training,
    Evaluating,
    Pushing,
    Synced,
    SyncedWithFailure,
}

impl RunState {
    pub fn is_running(&self) -> bool {
        matches!(
            self,
            Self::Ingesting
                | Self::Validating
                | Self::Transforming
                | Self::Training
                | Self::Evaluating
                | Self::Pushing
        )
    }
}

/// Outcome of a `start_run` call that did not error.
#[derive(Debug)]
pub enum RunOutcome {
    /// A run was already in flight on this orchestrator.
    AlreadyRunning,
    /// All six stages finished and the model was promoted.
    Promoted {
        timestamp: String,
        artifact: ModelPusherArtifact,
    },
}

/// Drives the six stages in order, keeps the run state, and replicates the
/// run directory to remote storage on both the success and failure paths.
pub struct TrainPipeline<'a> {
    config: PipelineConfig,
    schema: SchemaConfig,
    store: &'a dyn TabularStore,
    sync: &'a dyn RemoteSync,
    state: RunState,
}

impl<'a> TrainPipeline<'a> {
    pub fn new(
        config: PipelineConfig,
        schema: SchemaConfig,
        store: &'a dyn TabularStore,
        sync: &'a dyn RemoteSync,
    ) -> Self {
        Self {
            config,
            schema,
            store,
            sync,
            state: RunState::Idle,
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    fn run_stages(&mut self, run: &RunContext) -> PipelineResult<ModelPusherArtifact> {
        let metrics = MetricsCollector::global();

        self.state = RunState::Ingesting;
        let ingestion_artifact = {
            let _timer = metrics.start_stage("data_ingestion");
            DataIngestion::new(
                IngestionConfig::new(&self.config, run),
                &self.schema,
                self.store,
            )
            .run()?
        };

        self.state = RunState::Validating;
        let validation_artifact = {
            let _timer = metrics.start_stage("data_validation");
            DataValidation::new(
                ValidationConfig::new(&self.config, run),
                &self.schema,
                &ingestion_artifact,
            )
            .run()?
        };

        self.state = RunState::Transforming;
        let transformation_artifact = {
            let _timer = metrics.start_stage("data_transformation");
            DataTransformation::new(
                TransformationConfig::new(&self.config, run),
                &self.schema,
                &validation_artifact,
            )
            .run()?
        };

        self.state = RunState::Training;
        let trainer_artifact = {
            let _timer = metrics.start_stage("model_trainer");
            ModelTrainer::new(
                TrainerConfig::new(&self.config, run),
                &transformation_artifact,
            )
            .run()?
        };

        self.state = RunState::Evaluating;
        let evaluation_artifact = {
            let _timer = metrics.start_stage("model_evaluation");
            ModelEvaluation::new(
                EvaluationConfig::new(&self.config, run),
                &self.schema,
                &validation_artifact,
                &trainer_artifact,
            )
            .run()?
        };
        if !evaluation_artifact.is_model_accepted {
            metrics.record_gate_rejection();
            return Err(PipelineError::gate(
                "model_evaluation",
                format!(
                    "trained model does not beat the incumbent by more than {:.2} (improvement: {:?})",
                    self.config.model_change_threshold, evaluation_artifact.improved_accuracy
                ),
            ));
        }
        metrics.record_gate_pass();

        self.state = RunState::Pushing;
        let pusher_artifact = {
            let _timer = metrics.start_stage("model_pusher");
            ModelPusher::new(PusherConfig::new(&self.config, run), &evaluation_artifact).run()?
        };
        Ok(pusher_artifact)
    }

    fn sync_run_artifacts(&self, run: &RunContext) -> Result<()> {
        self.sync
            .sync_directory(&run.run_dir, &self.config.artifact_bucket_url(&run.timestamp))
            .context("Failed to replicate the run directory")
    }

    fn sync_saved_models(&self) -> Result<()> {
        self.sync
            .sync_directory(
                &self.config.saved_model_dir,
                &self.config.saved_model_bucket_url(),
            )
            .context("Failed to replicate the model registry")
    }

    /// Runs the full retraining pipeline once. A second call while a run is
    /// in flight returns `AlreadyRunning` without touching anything.
    #[instrument(skip(self), fields(pipeline = crate::config::PIPELINE_NAME))]
    pub fn start_run(&mut self) -> PipelineResult<RunOutcome> {
        if self.state.is_running() {
            warn!("A pipeline run is already in flight");
            return Ok(RunOutcome::AlreadyRunning);
        }

        let run = RunContext::new(&self.config);
        info!(timestamp = run.timestamp.as_str(), "Pipeline run started");
        let started_at = Instant::now();
        let metrics = MetricsCollector::global();

        match self.run_stages(&run) {
            Ok(artifact) => {
                let finish = || -> Result<()> {
                    self.sync_run_artifacts(&run)?;
                    self.sync_saved_models()?;
                    Ok(())
                };
                // The state must leave the running range on every exit,
                // including a replication failure after promotion.
                if let Err(err) = finish() {
                    self.state = RunState::SyncedWithFailure;
                    metrics.record_run_failed();
                    metrics.record_total_duration(started_at.elapsed());
                    return Err(PipelineError::stage("artifact_sync", err));
                }
                self.state = RunState::Synced;
                metrics.record_run_completed();
                metrics.record_total_duration(started_at.elapsed());
                info!(
                    timestamp = run.timestamp.as_str(),
                    saved_model = %artifact.saved_model_path.display(),
                    "Pipeline run completed and model promoted"
                );
                Ok(RunOutcome::Promoted {
                    timestamp: run.timestamp.clone(),
                    artifact,
                })
            }
            Err(err) => {
                // Partial artifacts are still replicated so a failed run can
                // be inspected remotely. The original failure wins over any
                // sync problem.
                if let Err(sync_err) = self.sync_run_artifacts(&run) {
                    warn!(error = %sync_err, "Failed to replicate a failed run's artifacts");
                }
                self.state = RunState::SyncedWithFailure;
                metrics.record_run_failed();
                metrics.record_total_duration(started_at.elapsed());
                Err(err)
            }
        }
    }
}
