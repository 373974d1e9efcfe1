//! Core types shared by every pool: jobs, errors and cancellation scopes

pub mod cancellation;
pub mod error;
pub mod job;

pub use cancellation::{CancellationCallbackGuard, CancellationReason, CancellationToken};
pub use error::{PoolError, Result};
pub use job::{BoxedJob, ClosureJob, Job};
