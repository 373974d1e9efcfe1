//! Tracing integration for observability.
//!
//! With the `tracing` feature enabled, workers run inside `worker` and
//! `job_execution` spans and the [`metrics`] functions emit events for
//! submissions, completions, panics and pool lifecycle. Without the feature
//! [`TracedJob`] is a transparent wrapper.
//!
//! # Example
//!
//! ```rust,ignore
//! use conpats::prelude::*;
//! use conpats::tracing::TracedJob;
//! use tracing_subscriber::{fmt, prelude::*, EnvFilter};
//!
//! tracing_subscriber::registry()
//!     .with(fmt::layer())
//!     .with(EnvFilter::from_default_env().add_directive("conpats=debug".parse().unwrap()))
//!     .init();
//!
//! let pool = WorkerPool::new(4)?;
//! let span = tracing::info_span!("request", id = 7);
//! let _entered = span.enter();
//!
//! // The job runs inside the "request" span on the worker thread
//! pool.submit(TracedJob::new(ClosureJob::new(|| Ok(()))));
//! ```

use crate::core::{Job, Result};

/// A job wrapper that carries the submitter's span into the worker.
///
/// The current span is captured when the wrapper is created and entered
/// when the job executes.
pub struct TracedJob<J: Job> {
    inner: J,
    #[cfg(feature = "tracing")]
    span: ::tracing::Span,
}

impl<J: Job> TracedJob<J> {
    /// Wrap `job`, capturing the current span
    pub fn new(job: J) -> Self {
        Self {
            inner: job,
            #[cfg(feature = "tracing")]
            span: ::tracing::Span::current(),
        }
    }

    /// Wrap `job` with an explicit span
    #[cfg(feature = "tracing")]
    pub fn with_span(job: J, span: ::tracing::Span) -> Self {
        Self { inner: job, span }
    }

    /// Unwrap the inner job
    pub fn into_inner(self) -> J {
        self.inner
    }
}

impl<J: Job> Job for TracedJob<J> {
    fn execute(&mut self) -> Result<()> {
        #[cfg(feature = "tracing")]
        let _guard = self.span.enter();
        self.inner.execute()
    }

    fn job_type(&self) -> &str {
        self.inner.job_type()
    }
}

/// Metrics events.
///
/// Emitted as tracing events so a subscriber (for example
/// tracing-opentelemetry) can turn them into counters and histograms.
#[cfg(feature = "tracing")]
pub mod metrics {
    use std::time::Duration;

    /// Records a job submission.
    #[inline]
    pub fn record_submission(in_flight: usize) {
        ::tracing::trace!(
            counter.jobs_submitted = 1,
            gauge.jobs_in_flight = in_flight as i64,
            "job submitted"
        );
    }

    /// Records job completion with timing.
    #[inline]
    pub fn record_completion(duration: Duration, success: bool) {
        let duration_ms = duration.as_millis() as u64;
        if success {
            ::tracing::trace!(
                counter.jobs_completed = 1,
                histogram.job_duration_ms = duration_ms,
                "job completed successfully"
            );
        } else {
            ::tracing::trace!(
                counter.jobs_failed = 1,
                histogram.job_duration_ms = duration_ms,
                "job failed"
            );
        }
    }

    /// Records a job panic.
    #[inline]
    pub fn record_panic(duration: Duration) {
        ::tracing::trace!(
            counter.jobs_panicked = 1,
            histogram.job_duration_ms = duration.as_millis() as u64,
            "job panicked"
        );
    }

    /// Records worker becoming busy.
    #[inline]
    pub fn record_worker_busy(worker_id: usize) {
        ::tracing::trace!(gauge.workers_busy = 1, worker_id = worker_id, "worker busy");
    }

    /// Records worker becoming idle.
    #[inline]
    pub fn record_worker_idle(worker_id: usize) {
        ::tracing::trace!(
            gauge.workers_busy = -1i64,
            worker_id = worker_id,
            "worker idle"
        );
    }

    /// Records pool startup.
    #[inline]
    pub fn record_pool_start(num_workers: usize, lazy_spawn: bool) {
        ::tracing::info!(
            workers = num_workers,
            lazy_spawn = lazy_spawn,
            "worker pool started"
        );
    }

    /// Records pool shutdown.
    #[inline]
    pub fn record_pool_shutdown(jobs_completed: u64, jobs_failed: u64) {
        ::tracing::info!(
            jobs_completed = jobs_completed,
            jobs_failed = jobs_failed,
            "worker pool closed"
        );
    }
}
