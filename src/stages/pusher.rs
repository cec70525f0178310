use std::path::Path;

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use tracing::{info, instrument};

use crate::artifact::{ModelEvaluationArtifact, ModelPusherArtifact};
use crate::config::PusherConfig;
use crate::error::{PipelineError, PipelineResult};

const STAGE: &str = "model_pusher";

/// Promotes an accepted bundle into the registry version slot and the run
/// directory. Both copies are digest-checked against the source.
pub struct ModelPusher<'a> {
    config: PusherConfig,
    evaluation: &'a ModelEvaluationArtifact,
}

impl<'a> ModelPusher<'a> {
    pub fn new(config: PusherConfig, evaluation: &'a ModelEvaluationArtifact) -> Self {
        Self { config, evaluation }
    }

    fn file_digest(path: &Path) -> Result<[u8; 32]> {
        let bytes = std::fs::read(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let mut hasher = Sha256::new();
        hasher.update(&bytes);
        Ok(hasher.finalize().into())
    }

    fn copy_verified(source: &Path, destination: &Path) -> Result<()> {
        if let Some(parent) = destination.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create directory: {}", parent.display())
            })?;
        }
        std::fs::copy(source, destination).with_context(|| {
            format!(
                "Failed to copy {} to {}",
                source.display(),
                destination.display()
            )
        })?;
        if Self::file_digest(source)? != Self::file_digest(destination)? {
            anyhow::bail!(
                "Digest mismatch after copying to {}",
                destination.display()
            );
        }
        Ok(())
    }

    #[instrument(skip(self), name = "model_pusher")]
    pub fn run(&self) -> PipelineResult<ModelPusherArtifact> {
        let source = &self.evaluation.trained_model_path;
        let promote = || -> Result<()> {
            Self::copy_verified(source, &self.config.model_file_path)?;
            Self::copy_verified(source, &self.config.saved_model_path)?;
            Ok(())
        };
        promote().map_err(|err| PipelineError::stage(STAGE, err))?;

        let artifact = ModelPusherArtifact {
            saved_model_path: self.config.saved_model_path.clone(),
            model_file_path: self.config.model_file_path.clone(),
        };
        info!(?artifact, "Model promoted to the registry");
        Ok(artifact)
    }
}
