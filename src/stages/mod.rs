//! The six pipeline stages. Data flows strictly forward: every stage
//! consumes upstream artifacts, writes its own files under the run
//! directory, and returns an immutable artifact record.

pub mod evaluation;
pub mod ingestion;
pub mod pusher;
pub mod trainer;
pub mod transformation;
pub mod validation;
