//! Pool that collects job errors

use crate::core::job::run_catching;
use crate::core::{CancellationToken, ClosureJob, PoolError, Result};
use crate::pool::cancel_pool::CancelPool;
use crate::pool::worker_pool::{PoolState, PoolStats, WorkerPool};
use parking_lot::Mutex;
use std::sync::Arc;

/// Thread-safe error list with an optional first-error-only policy.
///
/// Reads through [`drain`](Self::drain) swap the list for an empty one, so
/// no error is reported twice.
#[derive(Debug, Default)]
pub struct ErrorCollector {
    errors: Mutex<Vec<PoolError>>,
    first_only: bool,
}

impl ErrorCollector {
    /// Create a collector; with `first_only` only the earliest error is kept
    pub fn new(first_only: bool) -> Self {
        Self {
            errors: Mutex::new(Vec::new()),
            first_only,
        }
    }

    /// Record an error, subject to the first-only policy
    pub fn record(&self, error: PoolError) {
        let mut errors = self.errors.lock();
        if self.first_only && !errors.is_empty() {
            return;
        }
        errors.push(error);
    }

    /// Record an error that must stay visible.
    ///
    /// It goes to the front of the list; under first-only it replaces
    /// whatever was kept so far.
    pub fn record_cause(&self, error: PoolError) {
        let mut errors = self.errors.lock();
        if self.first_only {
            errors.clear();
        }
        errors.insert(0, error);
    }

    /// Take every recorded error, leaving the list empty
    pub fn drain(&self) -> Vec<PoolError> {
        std::mem::take(&mut *self.errors.lock())
    }

    /// Number of errors currently held
    pub fn len(&self) -> usize {
        self.errors.lock().len()
    }

    /// Returns `true` if no error is held
    pub fn is_empty(&self) -> bool {
        self.errors.lock().is_empty()
    }

    /// Whether only the first error is kept
    pub fn first_only(&self) -> bool {
        self.first_only
    }
}

/// A [`WorkerPool`] whose jobs return `Result<()>`; failures are collected
/// and handed back from [`collect`](Self::collect) and [`wait`](Self::wait).
///
/// A job that panics is recorded as [`PoolError::Panicked`].
///
/// # Example
///
/// ```rust
/// use conpats::prelude::*;
///
/// # fn main() -> Result<()> {
/// let pool = WorkerPool::new(4)?.with_errors(false);
///
/// for i in 0..10 {
///     pool.go(move || {
///         if i % 5 == 0 {
///             return Err(PoolError::other(format!("err{}", i)));
///         }
///         Ok(())
///     });
/// }
///
/// let errors = pool.wait();
/// assert_eq!(errors.len(), 2);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct ErrorPool {
    pool: WorkerPool,
    errors: Arc<ErrorCollector>,
}

impl ErrorPool {
    pub(crate) fn new(pool: WorkerPool, first_only: bool) -> Self {
        Self {
            pool,
            errors: Arc::new(ErrorCollector::new(first_only)),
        }
    }

    fn job<F>(&self, f: F) -> ClosureJob<impl FnOnce() -> Result<()> + Send>
    where
        F: FnOnce() -> Result<()> + Send + 'static,
    {
        let errors = Arc::clone(&self.errors);
        ClosureJob::with_name(
            move || {
                if let Err(e) = run_catching(f) {
                    errors.record(e);
                }
                Ok(())
            },
            "ErrorPoolJob",
        )
    }

    /// Submit a fallible closure, blocking until a worker takes it.
    ///
    /// Dropped without running if the pool is closed.
    pub fn go<F>(&self, f: F)
    where
        F: FnOnce() -> Result<()> + Send + 'static,
    {
        self.pool.submit(self.job(f));
    }

    /// Submit a fallible closure without blocking; `false` if not accepted
    pub fn try_go<F>(&self, f: F) -> bool
    where
        F: FnOnce() -> Result<()> + Send + 'static,
    {
        self.pool.try_submit(self.job(f))
    }

    /// Wait for every accepted job, then take the errors collected so far.
    ///
    /// The pool stays open.
    pub fn collect(&self) -> Vec<PoolError> {
        self.pool.collect();
        self.errors.drain()
    }

    /// Close the pool, wait for the workers and take the collected errors
    pub fn wait(&self) -> Vec<PoolError> {
        self.pool.wait();
        self.errors.drain()
    }

    /// Alias of [`wait`](Self::wait)
    pub fn close_and_wait(&self) -> Vec<PoolError> {
        self.wait()
    }

    /// Current lifecycle state
    pub fn state(&self) -> PoolState {
        self.pool.state()
    }

    /// Returns `true` once the pool stopped accepting jobs
    pub fn is_closed(&self) -> bool {
        self.pool.is_closed()
    }

    /// Maximum number of workers
    pub fn size(&self) -> usize {
        self.pool.size()
    }

    /// Snapshot of the pool's counters
    pub fn stats(&self) -> PoolStats {
        self.pool.stats()
    }

    /// Whether only the first error is kept
    pub fn first_only(&self) -> bool {
        self.errors.first_only()
    }

    pub(crate) fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    pub(crate) fn collector(&self) -> &Arc<ErrorCollector> {
        &self.errors
    }

    /// Give every job a cancellation token derived from `parent`.
    ///
    /// With `cancel_on_error`, the first failing job cancels the token.
    pub fn with_cancellation(self, parent: &CancellationToken, cancel_on_error: bool) -> CancelPool {
        CancelPool::new(self, parent, cancel_on_error)
    }
}
