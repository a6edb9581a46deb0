pub mod app;
pub mod config;
pub mod constants;
pub mod error;
pub mod generator;
pub mod infra;
pub mod logging;
pub mod metrics;
pub mod pipeline;
pub mod schema;
pub mod server;
pub mod types;

pub use error::{EtlError, Result};
pub use pipeline::{Pipeline, PipelineReport, PreparedBatch, RunOutcome};
pub use types::AdmissionRecord;
