//! # conpats
//!
//! Composable, thread-based concurrency patterns: worker pools, error and
//! cancellation aware pools, streaming pipelines and fan-out.
//!
//! ## Features
//!
//! - **Worker Pool**: fixed number of named workers fed through a hand-off
//!   queue; submission blocks while every worker is busy
//! - **Error Pool**: jobs return `Result`, failures are collected under an
//!   all-errors or first-error policy
//! - **Cancel Pool**: every job gets a cancellation token; optionally the
//!   first failure cancels its siblings
//! - **Pipelines**: chains of pooled stages connected by bounded queues
//! - **Tee**: one stream copied to several consumers in lockstep
//!
//! ## Quick Start
//!
//! ```rust
//! use conpats::prelude::*;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use std::sync::Arc;
//!
//! # fn main() -> Result<()> {
//! let pool = WorkerPool::new(4)?;
//! let counter = Arc::new(AtomicUsize::new(0));
//!
//! for _ in 0..10 {
//!     let counter = Arc::clone(&counter);
//!     pool.go(move || {
//!         counter.fetch_add(1, Ordering::Relaxed);
//!     });
//! }
//!
//! // Wave finished, pool still open
//! pool.collect();
//! assert_eq!(counter.load(Ordering::Relaxed), 10);
//!
//! pool.wait();
//! # Ok(())
//! # }
//! ```
//!
//! ## Collecting Errors
//!
//! ```rust
//! use conpats::prelude::*;
//!
//! # fn main() -> Result<()> {
//! let pool = WorkerPool::new(2)?.with_errors(true);
//! for i in 0..4 {
//!     pool.go(move || Err(PoolError::other(format!("err{}", i))));
//! }
//!
//! // First-only: exactly one error survives
//! assert_eq!(pool.wait().len(), 1);
//! # Ok(())
//! # }
//! ```
//!
//! ## Cancellation
//!
//! ```rust
//! use conpats::prelude::*;
//!
//! # fn main() -> Result<()> {
//! let root = CancellationToken::new();
//! let pool = WorkerPool::new(2)?
//!     .with_errors(false)
//!     .with_cancellation(&root, false);
//!
//! pool.go(|token| {
//!     token.wait();
//!     token.check()
//! });
//!
//! root.cancel();
//! let errors = pool.wait();
//! assert!(errors[0].is_cancelled());
//! # Ok(())
//! # }
//! ```
//!
//! ## Pipelines
//!
//! ```rust
//! use conpats::prelude::*;
//!
//! # fn main() -> Result<()> {
//! let mut lengths = Pipeline::from_iter(vec!["a", "bb", "ccc"])?
//!     .stage(2, |s: &str| s.len())?
//!     .collect_vec();
//! lengths.sort();
//! assert_eq!(lengths, vec![1, 2, 3]);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod core;
pub mod pool;
pub mod prelude;
pub mod queue;
pub mod stream;
pub mod tracing;

pub use crate::core::{
    BoxedJob, CancellationReason, CancellationToken, ClosureJob, Job, PoolError, Result,
};
pub use crate::pool::{
    BulkPool, CancelPool, ErrorPool, PoolConfig, PoolState, PoolStats, WorkerPool,
};
pub use crate::stream::{stage, stage_on, tee, Pipeline, StagePool};
