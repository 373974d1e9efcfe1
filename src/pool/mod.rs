//! Worker pools and their error-aggregating and cancellation-aware wrappers

pub mod bulk;
pub mod cancel_pool;
pub mod config;
pub mod error_pool;
pub mod worker;
pub mod worker_pool;

pub use bulk::BulkPool;
pub use cancel_pool::CancelPool;
pub use config::PoolConfig;
pub use error_pool::{ErrorCollector, ErrorPool};
pub use worker::{Worker, WorkerStats};
pub use worker_pool::{PoolState, PoolStats, WorkerPool};
