use thiserror::Error;

/// Failure taxonomy for a pipeline run.
///
/// Every stage returns this instead of raising through an opaque error
/// chain, so the orchestrator can match on the failure kind when deciding
/// what recovery work (artifact sync) still has to happen.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Store or registry I/O failure, always fatal, carries the cause.
    #[error("store adapter failure while {context}")]
    Adapter {
        context: String,
        #[source]
        source: anyhow::Error,
    },

    /// Structural validation failure. All failed checks are aggregated
    /// into one composite message before this is returned.
    #[error("data validation failed:\n{message}")]
    Validation { message: String },

    /// A hard gate rejected the model. Intentionally stops promotion.
    #[error("{stage} gate rejected the model: {reason}")]
    Gate {
        stage: &'static str,
        reason: String,
    },

    /// Anything else, re-wrapped with call-site context at the stage
    /// boundary.
    #[error("{stage} stage failed")]
    Stage {
        stage: &'static str,
        #[source]
        source: anyhow::Error,
    },
}

impl PipelineError {
    pub fn adapter(context: impl Into<String>, source: anyhow::Error) -> Self {
        Self::Adapter {
            context: context.into(),
            source,
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn gate(stage: &'static str, reason: impl Into<String>) -> Self {
        Self::Gate {
            stage,
            reason: reason.into(),
        }
    }

    pub fn stage(stage: &'static str, source: anyhow::Error) -> Self {
        Self::Stage { stage, source }
    }

    /// True for gate rejections (training accuracy/generalization or
    /// evaluation acceptance), which abort the run by design rather than
    /// by accident.
    pub fn is_gate_rejection(&self) -> bool {
        matches!(self, Self::Gate { .. })
    }
}

pub type PipelineResult<T> = Result<T, PipelineError>;
