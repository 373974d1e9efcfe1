//! Pool whose jobs share a cancellation token

use crate::core::job::run_catching;
use crate::core::{CancellationReason, CancellationToken, ClosureJob, PoolError, Result};
use crate::pool::error_pool::ErrorPool;
use crate::pool::worker_pool::{PoolState, PoolStats};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// An [`ErrorPool`] that passes a [`CancellationToken`] to every job.
///
/// The token is a child of the parent given at creation, so cancelling the
/// parent cancels the pool's jobs too. [`wait`](Self::wait) cancels the
/// token before draining; jobs blocked on it are released and typically
/// report [`PoolError::Cancelled`].
///
/// With `cancel_on_error`, the first job failure cancels the token right away
/// and that failure is always part of the returned errors, even when the pool
/// keeps only the first error.
///
/// # Example
///
/// ```rust
/// use conpats::prelude::*;
///
/// # fn main() -> Result<()> {
/// let root = CancellationToken::new();
/// let pool = WorkerPool::new(4)?
///     .with_errors(false)
///     .with_cancellation(&root, true);
///
/// pool.go(|_token| Err(PoolError::job_failed("bad input")));
/// for _ in 0..3 {
///     pool.go(|token| {
///         token.wait();
///         token.check()
///     });
/// }
///
/// let errors = pool.wait();
/// assert_eq!(errors[0].to_string(), "job failed: bad input");
/// assert!(errors[1..].iter().all(PoolError::is_cancelled));
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct CancelPool {
    inner: ErrorPool,
    token: CancellationToken,
    cancel_on_error: bool,
    tripped: Arc<AtomicBool>,
}

impl CancelPool {
    pub(crate) fn new(inner: ErrorPool, parent: &CancellationToken, cancel_on_error: bool) -> Self {
        Self {
            inner,
            token: parent.child(),
            cancel_on_error,
            tripped: Arc::new(AtomicBool::new(false)),
        }
    }

    fn job<F>(&self, f: F) -> ClosureJob<impl FnOnce() -> Result<()> + Send>
    where
        F: FnOnce(CancellationToken) -> Result<()> + Send + 'static,
    {
        let token = self.token.clone();
        let errors = Arc::clone(self.inner.collector());
        let tripped = Arc::clone(&self.tripped);
        let cancel_on_error = self.cancel_on_error;

        ClosureJob::with_name(
            move || {
                let job_token = token.clone();
                let Err(e) = run_catching(move || f(job_token)) else {
                    return Ok(());
                };

                if cancel_on_error
                    && !token.is_cancelled()
                    && !tripped.swap(true, Ordering::AcqRel)
                {
                    log::debug!("cancelling pool after job error: {}", e);
                    let reason = CancellationReason::Error(e.to_string());
                    errors.record_cause(e);
                    token.cancel_with_reason(reason);
                } else {
                    errors.record(e);
                }
                Ok(())
            },
            "CancelPoolJob",
        )
    }

    /// Submit a job, blocking until a worker takes it.
    ///
    /// The job receives a clone of the pool's token. Dropped without running
    /// if the pool is closed.
    pub fn go<F>(&self, f: F)
    where
        F: FnOnce(CancellationToken) -> Result<()> + Send + 'static,
    {
        self.inner.pool().submit(self.job(f));
    }

    /// Submit a job without blocking; `false` if not accepted
    pub fn try_go<F>(&self, f: F) -> bool
    where
        F: FnOnce(CancellationToken) -> Result<()> + Send + 'static,
    {
        self.inner.pool().try_submit(self.job(f))
    }

    /// Wait for every accepted job and take the errors collected so far.
    ///
    /// Does not cancel the token and leaves the pool open.
    pub fn collect(&self) -> Vec<PoolError> {
        self.inner.collect()
    }

    /// Cancel the token, close the pool, wait for the workers and take the
    /// collected errors
    pub fn wait(&self) -> Vec<PoolError> {
        self.token.cancel_with_reason(CancellationReason::Shutdown);
        self.inner.wait()
    }

    /// Alias of [`wait`](Self::wait)
    pub fn close_and_wait(&self) -> Vec<PoolError> {
        self.wait()
    }

    /// The token handed to every job
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Returns `true` once the token was cancelled
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Cancel the pool's token without closing the pool
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Current lifecycle state
    pub fn state(&self) -> PoolState {
        self.inner.state()
    }

    /// Maximum number of workers
    pub fn size(&self) -> usize {
        self.inner.size()
    }

    /// Snapshot of the pool's counters
    pub fn stats(&self) -> PoolStats {
        self.inner.stats()
    }
}

impl Drop for CancelPool {
    fn drop(&mut self) {
        if self.inner.state() != PoolState::Closed {
            self.token.cancel_with_reason(CancellationReason::Shutdown);
        }
    }
}
