//! Convenient re-exports for common types and traits

pub use crate::core::{
    BoxedJob, CancellationReason, CancellationToken, ClosureJob, Job, PoolError, Result,
};
pub use crate::pool::{
    BulkPool, CancelPool, ErrorPool, PoolConfig, PoolState, PoolStats, WorkerPool,
};
pub use crate::queue::{handoff, Receiver, Sender};
pub use crate::stream::{stage, stage_on, tee, Pipeline, StagePool};
