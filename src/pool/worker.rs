//! Worker thread implementation

use crate::core::job::panic_message;
use crate::core::{BoxedJob, PoolError, Result};
use crate::queue::Receiver;
use parking_lot::{Condvar, Mutex};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

#[cfg(feature = "tracing")]
use tracing::{span, Level};

/// Statistics for a worker thread
#[derive(Debug, Default)]
pub struct WorkerStats {
    /// Total number of jobs that completed successfully
    pub jobs_processed: AtomicU64,
    /// Total number of jobs that returned an error
    pub jobs_failed: AtomicU64,
    /// Total number of jobs that panicked
    pub jobs_panicked: AtomicU64,
    /// Total time spent processing jobs (microseconds)
    pub total_processing_time_us: AtomicU64,
}

impl WorkerStats {
    /// Create new worker statistics
    pub fn new() -> Self {
        Self::default()
    }

    fn increment_processed(&self) {
        self.jobs_processed.fetch_add(1, Ordering::Relaxed);
    }

    fn increment_failed(&self) {
        self.jobs_failed.fetch_add(1, Ordering::Relaxed);
    }

    fn increment_panicked(&self) {
        self.jobs_panicked.fetch_add(1, Ordering::Relaxed);
    }

    fn add_processing_time(&self, microseconds: u64) {
        self.total_processing_time_us
            .fetch_add(microseconds, Ordering::Relaxed);
    }

    /// Get total jobs processed
    pub fn get_jobs_processed(&self) -> u64 {
        self.jobs_processed.load(Ordering::Relaxed)
    }

    /// Get total jobs failed
    pub fn get_jobs_failed(&self) -> u64 {
        self.jobs_failed.load(Ordering::Relaxed)
    }

    /// Get total jobs panicked
    pub fn get_jobs_panicked(&self) -> u64 {
        self.jobs_panicked.load(Ordering::Relaxed)
    }

    /// Get average processing time per finished job in microseconds
    pub fn get_average_processing_time_us(&self) -> f64 {
        let total = self.total_processing_time_us.load(Ordering::Relaxed);
        let count = self.get_jobs_processed() + self.get_jobs_failed() + self.get_jobs_panicked();
        if count > 0 {
            total as f64 / count as f64
        } else {
            0.0
        }
    }
}

/// Count of jobs accepted by a pool but not yet finished.
///
/// Submitters call [`begin`](Self::begin) before handing a job off and
/// [`cancel`](Self::cancel) if the hand-off fails; workers call
/// [`finish`](Self::finish) after running it.
#[derive(Debug, Default)]
pub(crate) struct InFlight {
    count: Mutex<usize>,
    idle: Condvar,
}

impl InFlight {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn begin(&self) {
        *self.count.lock() += 1;
    }

    pub(crate) fn cancel(&self) {
        self.finish();
    }

    pub(crate) fn finish(&self) {
        let mut count = self.count.lock();
        *count = count.saturating_sub(1);
        if *count == 0 {
            self.idle.notify_all();
        }
    }

    /// Block until every accepted job has finished
    pub(crate) fn wait_idle(&self) {
        let mut count = self.count.lock();
        while *count > 0 {
            self.idle.wait(&mut count);
        }
    }

    pub(crate) fn get(&self) -> usize {
        *self.count.lock()
    }
}

/// A worker thread that runs jobs handed off by its pool
#[derive(Debug)]
pub struct Worker {
    id: usize,
    thread: Option<thread::JoinHandle<()>>,
    stats: Arc<WorkerStats>,
}

impl Worker {
    /// Spawn a worker named `{prefix}-{id}`
    ///
    /// # Shutdown Behavior
    ///
    /// The worker exits once the queue is closed and drained, so every job
    /// handed off before the close still runs.
    pub(crate) fn new(
        id: usize,
        prefix: &str,
        receiver: Receiver<BoxedJob>,
        in_flight: Arc<InFlight>,
    ) -> Result<Self> {
        let stats = Arc::new(WorkerStats::new());
        let stats_clone = Arc::clone(&stats);

        let thread = thread::Builder::new()
            .name(format!("{}-{}", prefix, id))
            .spawn(move || {
                Self::run(id, receiver, stats_clone, in_flight);
            })
            .map_err(|e| PoolError::spawn_with_source(id, "cannot create worker thread", e))?;

        Ok(Self {
            id,
            thread: Some(thread),
            stats,
        })
    }

    /// Get worker ID
    pub fn id(&self) -> usize {
        self.id
    }

    /// Get worker statistics
    pub fn stats(&self) -> Arc<WorkerStats> {
        Arc::clone(&self.stats)
    }

    /// Join the worker thread
    pub fn join(mut self) -> Result<()> {
        if let Some(thread) = self.thread.take() {
            thread
                .join()
                .map_err(|_| PoolError::join_failed(self.id, "worker panicked"))?;
        }
        Ok(())
    }

    fn run(
        id: usize,
        receiver: Receiver<BoxedJob>,
        stats: Arc<WorkerStats>,
        in_flight: Arc<InFlight>,
    ) {
        #[cfg(feature = "tracing")]
        let worker_span = span!(Level::DEBUG, "worker", id = id);
        #[cfg(feature = "tracing")]
        let _guard = worker_span.enter();

        log::trace!("worker {} started", id);

        // recv fails only once the queue is closed and drained
        while let Ok(mut job) = receiver.recv() {
            #[cfg(feature = "tracing")]
            crate::tracing::metrics::record_worker_busy(id);

            Self::execute_job(id, &mut job, &stats);
            drop(job);
            in_flight.finish();

            #[cfg(feature = "tracing")]
            crate::tracing::metrics::record_worker_idle(id);
        }

        log::trace!(
            "worker {} exiting: {} processed, {} failed, {} panicked",
            id,
            stats.get_jobs_processed(),
            stats.get_jobs_failed(),
            stats.get_jobs_panicked()
        );
    }

    /// Execute a single job with panic protection
    fn execute_job(id: usize, job: &mut BoxedJob, stats: &WorkerStats) {
        #[cfg(feature = "tracing")]
        let job_span = span!(Level::DEBUG, "job_execution", job_type = job.job_type());
        #[cfg(feature = "tracing")]
        let _job_guard = job_span.enter();

        let start = Instant::now();
        let outcome = catch_unwind(AssertUnwindSafe(|| job.execute()));
        let elapsed = start.elapsed();

        match outcome {
            Ok(Ok(())) => {
                stats.increment_processed();
                #[cfg(feature = "tracing")]
                crate::tracing::metrics::record_completion(elapsed, true);
            }
            Ok(Err(e)) => {
                log::warn!("worker {}: {} failed: {}", id, job.job_type(), e);
                #[cfg(feature = "tracing")]
                crate::tracing::metrics::record_completion(elapsed, false);
                stats.increment_failed();
            }
            Err(payload) => {
                log::error!(
                    "worker {}: {} panicked: {}",
                    id,
                    job.job_type(),
                    panic_message(payload.as_ref())
                );
                #[cfg(feature = "tracing")]
                crate::tracing::metrics::record_panic(elapsed);
                stats.increment_panicked();
            }
        }

        stats.add_processing_time(elapsed.as_micros() as u64);
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        if let Some(thread) = self.thread.take() {
            // A worker still attached here was never joined by its pool
            const JOIN_TIMEOUT: Duration = Duration::from_secs(5);

            let start = Instant::now();
            while !thread.is_finished() {
                if start.elapsed() >= JOIN_TIMEOUT {
                    log::warn!(
                        "worker {} did not finish within {}s during drop; detaching",
                        self.id,
                        JOIN_TIMEOUT.as_secs()
                    );
                    return;
                }
                thread::sleep(Duration::from_millis(10));
            }

            if let Err(payload) = thread.join() {
                log::error!(
                    "worker {} panicked during shutdown: {}",
                    self.id,
                    panic_message(payload.as_ref())
                );
            }
        }
    }
}
