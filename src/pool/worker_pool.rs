//! Bounded worker pool with a close-once hand-off queue

use crate::core::{BoxedJob, ClosureJob, Job, Result};
use crate::pool::config::PoolConfig;
use crate::pool::error_pool::ErrorPool;
use crate::pool::worker::{InFlight, Worker, WorkerStats};
use crate::queue::{HandoffQueue, QueueError};
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// How long `try_go` waits for a worker it just spawned to start receiving
const WORKER_STARTUP_GRACE: Duration = Duration::from_millis(50);

/// Lifecycle of a pool
///
/// `Open → Draining → Closed`. Only [`WorkerPool::wait`] (or
/// [`close_and_wait`](WorkerPool::close_and_wait)) moves a pool forward;
/// [`collect`](WorkerPool::collect) never does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PoolState {
    /// Accepting submissions
    Open,
    /// Queue closed, workers finishing what was already accepted
    Draining,
    /// All workers exited; terminal
    Closed,
}

impl PoolState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => PoolState::Open,
            1 => PoolState::Draining,
            _ => PoolState::Closed,
        }
    }
}

impl fmt::Display for PoolState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PoolState::Open => write!(f, "open"),
            PoolState::Draining => write!(f, "draining"),
            PoolState::Closed => write!(f, "closed"),
        }
    }
}

/// Snapshot of pool counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Worker threads spawned so far
    pub workers: usize,
    /// Jobs accepted by a worker or the buffer
    pub submitted: u64,
    /// Jobs that returned `Ok`
    pub completed: u64,
    /// Jobs that returned `Err`
    pub failed: u64,
    /// Jobs that panicked
    pub panicked: u64,
    /// Jobs refused because the pool was closed or busy
    pub rejected: u64,
    /// Jobs accepted but not yet finished
    pub in_flight: usize,
}

#[derive(Default)]
struct Workers {
    handles: Vec<Worker>,
    stats: Vec<Arc<WorkerStats>>,
}

/// A fixed-size pool of worker threads
///
/// Submission hands each job to a worker through a bounded queue; with the
/// default capacity of `0` a submitter blocks until a worker is free, so the
/// pool itself provides backpressure.
///
/// # Example
///
/// ```rust
/// use conpats::pool::WorkerPool;
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use std::sync::Arc;
///
/// # fn main() -> conpats::Result<()> {
/// let pool = WorkerPool::new(4)?;
/// let counter = Arc::new(AtomicUsize::new(0));
///
/// for _ in 0..100 {
///     let counter = Arc::clone(&counter);
///     pool.go(move || {
///         counter.fetch_add(1, Ordering::Relaxed);
///     });
/// }
///
/// pool.wait();
/// assert_eq!(counter.load(Ordering::Relaxed), 100);
/// # Ok(())
/// # }
/// ```
pub struct WorkerPool {
    config: PoolConfig,
    queue: HandoffQueue<BoxedJob>,
    workers: Mutex<Workers>,
    in_flight: Arc<InFlight>,
    state: AtomicU8,
    submitted: AtomicU64,
    rejected: AtomicU64,
}

impl fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerPool")
            .field("config", &self.config)
            .field("state", &self.state())
            .field("in_flight", &self.in_flight.get())
            .finish()
    }
}

impl WorkerPool {
    /// Create a pool of `size` workers (`0` is treated as `1`)
    pub fn new(size: usize) -> Result<Self> {
        Self::with_config(PoolConfig::new(size))
    }

    /// Create a pool from a configuration
    pub fn with_config(config: PoolConfig) -> Result<Self> {
        config.validate()?;

        let pool = Self {
            queue: HandoffQueue::new(config.queue_capacity),
            workers: Mutex::new(Workers::default()),
            in_flight: Arc::new(InFlight::new()),
            state: AtomicU8::new(0),
            submitted: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
            config,
        };

        if !pool.config.lazy_spawn {
            let mut workers = pool.workers.lock();
            for _ in 0..pool.size() {
                pool.spawn_worker(&mut workers)?;
            }
        }

        log::debug!(
            "pool '{}' started: size {}, capacity {}, lazy {}",
            pool.config.thread_name_prefix,
            pool.size(),
            pool.config.queue_capacity,
            pool.config.lazy_spawn
        );
        #[cfg(feature = "tracing")]
        crate::tracing::metrics::record_pool_start(pool.size(), pool.config.lazy_spawn);

        Ok(pool)
    }

    fn spawn_worker(&self, workers: &mut Workers) -> Result<()> {
        let id = workers.stats.len();
        let worker = Worker::new(
            id,
            &self.config.thread_name_prefix,
            self.queue.receiver(),
            Arc::clone(&self.in_flight),
        )?;
        workers.stats.push(worker.stats());
        workers.handles.push(worker);
        Ok(())
    }

    /// Spawn one more worker if the pool is lazy, open, under its cap and
    /// every existing worker already has a job.
    ///
    /// Called after the in-flight count includes the job being submitted, so
    /// `in_flight > workers` means no worker is idle for it, whether the job
    /// would go to a waiting worker or into the buffer.
    ///
    /// Returns `true` if a worker was spawned.
    fn grow(&self) -> bool {
        if !self.config.lazy_spawn {
            return false;
        }
        let mut workers = self.workers.lock();
        let spawned = workers.stats.len();
        if self.queue.is_closed() || spawned >= self.size() || self.in_flight.get() <= spawned {
            return false;
        }
        match self.spawn_worker(&mut workers) {
            Ok(()) => true,
            Err(e) => {
                log::error!("pool '{}': {}", self.config.thread_name_prefix, e);
                false
            }
        }
    }

    fn reject(&self, job: BoxedJob) -> bool {
        self.rejected.fetch_add(1, Ordering::Relaxed);
        log::trace!("pool rejected {}", job.job_type());
        false
    }

    fn accept(&self) -> bool {
        self.submitted.fetch_add(1, Ordering::Relaxed);
        #[cfg(feature = "tracing")]
        crate::tracing::metrics::record_submission(self.in_flight.get());
        true
    }

    fn refuse(&self, error: QueueError<BoxedJob>) -> bool {
        self.in_flight.cancel();
        error.into_inner().map_or(false, |job| self.reject(job))
    }

    /// Blocking dispatch; `false` if the pool was closed
    fn dispatch(&self, job: BoxedJob) -> bool {
        self.in_flight.begin();
        self.grow();

        match self.queue.send(job) {
            Ok(()) => self.accept(),
            Err(e) => self.refuse(e),
        }
    }

    /// Non-blocking dispatch
    fn try_dispatch(&self, job: BoxedJob) -> bool {
        self.in_flight.begin();

        let sent = if self.grow() {
            // Bounded: a concurrent submitter may claim the new worker first
            self.queue.send_timeout(job, WORKER_STARTUP_GRACE)
        } else {
            self.queue.try_send(job)
        };
        match sent {
            Ok(()) => self.accept(),
            Err(e) => self.refuse(e),
        }
    }

    /// Submit a closure, blocking until a worker (or buffer slot) takes it.
    ///
    /// After the pool is closed the closure is dropped without running.
    pub fn go<F>(&self, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.submit(ClosureJob::new(move || {
            f();
            Ok(())
        }));
    }

    /// Submit a closure without blocking.
    ///
    /// Returns `false` if the pool is closed or no worker or buffer slot is
    /// free right now; the closure is then dropped.
    pub fn try_go<F>(&self, f: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        self.try_submit(ClosureJob::new(move || {
            f();
            Ok(())
        }))
    }

    /// Submit a job, blocking until a worker (or buffer slot) takes it.
    ///
    /// Returns `false` (and drops the job) if the pool is closed. A job that
    /// returns `Err` is logged and counted in [`stats`](Self::stats).
    pub fn submit<J: Job + 'static>(&self, job: J) -> bool {
        self.submit_boxed(Box::new(job))
    }

    /// Submit a job without blocking
    pub fn try_submit<J: Job + 'static>(&self, job: J) -> bool {
        self.try_submit_boxed(Box::new(job))
    }

    pub(crate) fn submit_boxed(&self, job: BoxedJob) -> bool {
        if self.state() != PoolState::Open {
            return self.reject(job);
        }
        self.dispatch(job)
    }

    pub(crate) fn try_submit_boxed(&self, job: BoxedJob) -> bool {
        if self.state() != PoolState::Open {
            return self.reject(job);
        }
        self.try_dispatch(job)
    }

    /// Block until every job accepted so far has finished.
    ///
    /// The pool stays open, so further waves may be submitted afterwards.
    pub fn collect(&self) {
        self.in_flight.wait_idle();
    }

    /// Close the pool and block until every worker has exited.
    ///
    /// Safe to call repeatedly and from several threads; only the first call
    /// closes the queue, and every caller returns after the workers exited.
    pub fn wait(&self) {
        if self
            .state
            .compare_exchange(0, 1, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            self.queue.close();
            log::debug!("pool '{}' draining", self.config.thread_name_prefix);
        }

        // Concurrent callers queue up here until the workers are joined
        let mut workers = self.workers.lock();
        for worker in std::mem::take(&mut workers.handles) {
            if let Err(e) = worker.join() {
                log::error!("pool '{}': {}", self.config.thread_name_prefix, e);
            }
        }

        if self.state.swap(2, Ordering::AcqRel) != 2 {
            let stats = self.stats_locked(&workers);
            log::debug!(
                "pool '{}' closed: {} completed, {} failed, {} panicked",
                self.config.thread_name_prefix,
                stats.completed,
                stats.failed,
                stats.panicked
            );
            #[cfg(feature = "tracing")]
            crate::tracing::metrics::record_pool_shutdown(stats.completed, stats.failed);
        }
    }

    /// Alias of [`wait`](Self::wait)
    pub fn close_and_wait(&self) {
        self.wait();
    }

    /// Current lifecycle state
    pub fn state(&self) -> PoolState {
        PoolState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Returns `true` once the pool stopped accepting jobs
    pub fn is_closed(&self) -> bool {
        self.state() != PoolState::Open
    }

    /// Maximum number of workers
    pub fn size(&self) -> usize {
        self.config.workers()
    }

    /// Pool configuration
    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Snapshot of the pool's counters
    pub fn stats(&self) -> PoolStats {
        let workers = self.workers.lock();
        self.stats_locked(&workers)
    }

    fn stats_locked(&self, workers: &Workers) -> PoolStats {
        let mut stats = PoolStats {
            workers: workers.stats.len(),
            submitted: self.submitted.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            in_flight: self.in_flight.get(),
            ..Default::default()
        };
        for worker in &workers.stats {
            stats.completed += worker.get_jobs_processed();
            stats.failed += worker.get_jobs_failed();
            stats.panicked += worker.get_jobs_panicked();
        }
        stats
    }

    /// Per-worker statistics, in spawn order
    pub fn worker_stats(&self) -> Vec<Arc<WorkerStats>> {
        self.workers.lock().stats.clone()
    }

    /// Wrap this pool so that job errors are collected.
    ///
    /// With `first_only`, only the earliest recorded error is kept.
    pub fn with_errors(self, first_only: bool) -> ErrorPool {
        ErrorPool::new(self, first_only)
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        if self.state() != PoolState::Closed {
            self.wait();
        }
    }
}
