pub mod artifact;
pub mod config;
pub mod error;
pub mod frame;
pub mod ml;
pub mod observability;
pub mod pipeline;
pub mod schema;
pub mod stages;
pub mod stats;
pub mod store;
pub mod sync;

pub use config::PipelineConfig;
pub use error::{PipelineError, PipelineResult};
pub use pipeline::{RunOutcome, RunState, TrainPipeline};
