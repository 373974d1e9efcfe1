//! Stream composition: pipelines of pooled stages and fan-out

pub mod pipeline;
pub mod tee;

pub use pipeline::{stage, stage_on, Pipeline, StagePool};
pub use tee::tee;
