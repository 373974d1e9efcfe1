//! Multi-stage streaming pipelines built on worker pools
//!
//! Each stage owns a pool whose workers loop over the stage's input queue,
//! transform every item and write the result to the stage's output queue. A
//! stage's output closes once all of its workers have exited, which in turn
//! lets the next stage drain and exit.

use crate::core::job::run_catching;
use crate::core::{CancellationToken, PoolError, Result};
use crate::pool::{ErrorCollector, PoolConfig, WorkerPool};
use crate::queue::{handoff, Receiver, Sender};
use crossbeam::channel::{RecvTimeoutError, SendTimeoutError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// A pool that can host the worker loops of a stage.
///
/// A stage submits [`size`](StagePool::size) long-running loops through
/// [`go`](StagePool::go), so the pool must be able to run that many closures
/// at once. [`wait`](StagePool::wait) is called after the last loop has been
/// submitted and must return only when every loop has finished.
///
/// [`WorkerPool`] is the default implementation.
pub trait StagePool: Send + 'static {
    /// Number of worker loops the stage should start
    fn size(&self) -> usize;

    /// Run `f` on one of the pool's workers
    fn go(&self, f: Box<dyn FnOnce() + Send>);

    /// Close the pool and block until everything submitted has finished
    fn wait(&self);
}

impl StagePool for WorkerPool {
    fn size(&self) -> usize {
        WorkerPool::size(self)
    }

    fn go(&self, f: Box<dyn FnOnce() + Send>) {
        WorkerPool::go(self, f);
    }

    fn wait(&self) {
        WorkerPool::wait(self);
    }
}

/// Settings shared by the stages of one pipeline
#[derive(Clone, Debug)]
struct StageSettings {
    buffer: usize,
    poll_interval: Duration,
    token: Option<CancellationToken>,
    errors: Option<Arc<ErrorCollector>>,
    /// Set when a worker stopped on cancellation before its input ended
    interrupted: Arc<AtomicBool>,
}

impl Default for StageSettings {
    fn default() -> Self {
        Self {
            buffer: 0,
            poll_interval: DEFAULT_POLL_INTERVAL,
            token: None,
            errors: None,
            interrupted: Arc::new(AtomicBool::new(false)),
        }
    }
}

fn stage_pool(workers: usize) -> Result<WorkerPool> {
    WorkerPool::with_config(PoolConfig::new(workers).with_thread_name_prefix("stage"))
}

/// Start a stage of `workers` workers reading `input` and applying `f`.
///
/// Returns the stage's output, which closes after `input` is closed and
/// every worker has drained it. With one worker, output order matches input
/// order; wider stages only preserve the multiset of items.
///
/// # Errors
///
/// Returns [`PoolError::SpawnError`] if a stage thread cannot be created.
///
/// # Example
///
/// ```rust
/// use conpats::queue::handoff;
/// use conpats::stream::stage;
///
/// # fn main() -> conpats::Result<()> {
/// let (tx, rx) = handoff(0);
/// let doubled = stage(rx, 2, |x: u32| x * 2)?;
///
/// std::thread::spawn(move || {
///     for i in 0..5 {
///         tx.send(i).unwrap();
///     }
/// });
///
/// let mut out: Vec<u32> = doubled.iter().collect();
/// out.sort();
/// assert_eq!(out, vec![0, 2, 4, 6, 8]);
/// # Ok(())
/// # }
/// ```
pub fn stage<I, O, F>(input: Receiver<I>, workers: usize, f: F) -> Result<Receiver<O>>
where
    I: Send + 'static,
    O: Send + 'static,
    F: Fn(I) -> O + Send + Sync + 'static,
{
    stage_on(input, stage_pool(workers)?, f)
}

/// Like [`stage`], but the worker loops run on a caller-supplied pool.
///
/// The stage takes ownership of the pool and waits on it once every loop
/// has been submitted.
///
/// # Errors
///
/// Returns [`PoolError::SpawnError`] if the stage supervisor cannot be
/// created.
pub fn stage_on<I, O, F, P>(input: Receiver<I>, pool: P, f: F) -> Result<Receiver<O>>
where
    I: Send + 'static,
    O: Send + 'static,
    F: Fn(I) -> O + Send + Sync + 'static,
    P: StagePool,
{
    let (output, _supervisor) =
        spawn_stage(input, pool, &StageSettings::default(), move |item| Ok(f(item)))?;
    Ok(output)
}

fn spawn_stage<I, O, F, P>(
    input: Receiver<I>,
    pool: P,
    settings: &StageSettings,
    f: F,
) -> Result<(Receiver<O>, JoinHandle<()>)>
where
    I: Send + 'static,
    O: Send + 'static,
    F: Fn(I) -> Result<O> + Send + Sync + 'static,
    P: StagePool,
{
    if settings.poll_interval.is_zero() {
        return Err(PoolError::invalid_config(
            "poll_interval",
            "Poll interval must be greater than 0",
        ));
    }

    let (tx, rx) = handoff::<O>(settings.buffer);
    let worker = Arc::new(StageWorker {
        f,
        token: settings.token.clone(),
        errors: settings.errors.clone(),
        interrupted: Arc::clone(&settings.interrupted),
        poll_interval: settings.poll_interval,
    });

    let supervisor = thread::Builder::new()
        .name("stage-supervisor".to_string())
        .spawn(move || {
            let loops = pool.size().max(1);
            for _ in 0..loops {
                let worker = Arc::clone(&worker);
                let input = input.clone();
                let tx = tx.clone();
                pool.go(Box::new(move || worker.run(&input, &tx)));
            }
            // Output closes once the last worker drops its sender
            drop(tx);
            drop(input);
            pool.wait();
            log::debug!("stage of {} workers finished", loops);
        })
        .map_err(|e| PoolError::spawn_with_source(0, "cannot create stage supervisor", e))?;

    Ok((rx, supervisor))
}

struct StageWorker<F> {
    f: F,
    token: Option<CancellationToken>,
    errors: Option<Arc<ErrorCollector>>,
    interrupted: Arc<AtomicBool>,
    poll_interval: Duration,
}

impl<F> StageWorker<F> {
    fn run<I, O>(&self, input: &Receiver<I>, output: &Sender<O>)
    where
        F: Fn(I) -> Result<O>,
    {
        match &self.token {
            Some(token) => {
                if self.run_cancellable(input, output, token) {
                    self.interrupted.store(true, Ordering::Release);
                }
            }
            None => {
                for item in input.iter() {
                    if let Some(out) = self.apply(item) {
                        if output.send(out).is_err() {
                            // Downstream hung up
                            return;
                        }
                    }
                }
            }
        }
    }

    /// Returns `true` if the loop stopped because of the token
    fn run_cancellable<I, O>(
        &self,
        input: &Receiver<I>,
        output: &Sender<O>,
        token: &CancellationToken,
    ) -> bool
    where
        F: Fn(I) -> Result<O>,
    {
        while !token.is_cancelled() {
            let item = match input.recv_timeout(self.poll_interval) {
                Ok(item) => item,
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => return false,
            };

            let Some(mut out) = self.apply(item) else {
                continue;
            };
            loop {
                match output.send_timeout(out, self.poll_interval) {
                    Ok(()) => break,
                    Err(SendTimeoutError::Timeout(pending)) => {
                        if token.is_cancelled() {
                            return true;
                        }
                        out = pending;
                    }
                    Err(SendTimeoutError::Disconnected(_)) => return false,
                }
            }
        }
        true
    }

    /// Transform one item; a failed item is recorded and dropped
    fn apply<I, O>(&self, item: I) -> Option<O>
    where
        F: Fn(I) -> Result<O>,
    {
        match run_catching(|| (self.f)(item)) {
            Ok(out) => Some(out),
            Err(e) => {
                match &self.errors {
                    Some(errors) => errors.record(e),
                    None => log::warn!("stage dropped an item: {}", e),
                }
                None
            }
        }
    }
}

/// A chain of stages over a stream of items
///
/// # Example
///
/// ```rust
/// use conpats::stream::Pipeline;
///
/// # fn main() -> conpats::Result<()> {
/// let out: Vec<String> = Pipeline::from_iter(1..=5)?
///     .stage(1, |x: i32| x * x)?
///     .stage(1, |x: i32| format!("{}!", x))?
///     .collect_vec();
///
/// assert_eq!(out, vec!["1!", "4!", "9!", "16!", "25!"]);
/// # Ok(())
/// # }
/// ```
pub struct Pipeline<T> {
    output: Receiver<T>,
    supervisors: Vec<JoinHandle<()>>,
    errors: Arc<ErrorCollector>,
    settings: StageSettings,
}

impl<T> std::fmt::Debug for Pipeline<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("stages", &self.supervisors.len())
            .field("buffer", &self.settings.buffer)
            .field("poll_interval", &self.settings.poll_interval)
            .field("cancellable", &self.settings.token.is_some())
            .finish()
    }
}

impl<T: Send + 'static> Pipeline<T> {
    /// Start a pipeline from an existing receiver
    pub fn from_receiver(input: Receiver<T>) -> Self {
        let errors = Arc::new(ErrorCollector::new(false));
        Self {
            output: input,
            supervisors: Vec::new(),
            settings: StageSettings {
                errors: Some(Arc::clone(&errors)),
                ..Default::default()
            },
            errors,
        }
    }

    /// Start a pipeline fed from `items` by a dedicated thread.
    ///
    /// The feeder stops early if the first stage goes away.
    #[allow(clippy::should_implement_trait)]
    pub fn from_iter<It>(items: It) -> Result<Self>
    where
        It: IntoIterator<Item = T>,
        It::IntoIter: Send + 'static,
    {
        let (tx, rx) = handoff(0);
        let items = items.into_iter();
        let feeder = thread::Builder::new()
            .name("pipeline-feeder".to_string())
            .spawn(move || {
                for item in items {
                    if tx.send(item).is_err() {
                        break;
                    }
                }
            })
            .map_err(|e| PoolError::spawn_with_source(0, "cannot create pipeline feeder", e))?;

        let mut pipeline = Self::from_receiver(rx);
        pipeline.supervisors.push(feeder);
        Ok(pipeline)
    }

    /// Capacity of the queues between subsequent stages (default `0`)
    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn with_buffer(mut self, capacity: usize) -> Self {
        self.settings.buffer = capacity;
        self
    }

    /// How often blocked stage workers re-check the cancellation token.
    ///
    /// A zero interval makes the next [`stage`](Self::stage) call fail with
    /// [`PoolError::InvalidConfig`].
    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.settings.poll_interval = interval;
        self
    }

    /// Stop subsequent stages once `token` is cancelled.
    ///
    /// Workers notice the cancellation within one poll interval, stop
    /// reading and close their output, so the stream ends early.
    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn with_cancellation(mut self, token: &CancellationToken) -> Self {
        self.settings.token = Some(token.clone());
        self
    }

    /// Append a stage of `workers` workers applying `f` to every item
    pub fn stage<O, F>(self, workers: usize, f: F) -> Result<Pipeline<O>>
    where
        O: Send + 'static,
        F: Fn(T) -> O + Send + Sync + 'static,
    {
        self.try_stage(workers, move |item| Ok(f(item)))
    }

    /// Append a fallible stage.
    ///
    /// Items for which `f` fails (or panics) are dropped from the stream and
    /// their errors are returned by [`finish`](Self::finish).
    pub fn try_stage<O, F>(self, workers: usize, f: F) -> Result<Pipeline<O>>
    where
        O: Send + 'static,
        F: Fn(T) -> Result<O> + Send + Sync + 'static,
    {
        let pool = stage_pool(workers)?;
        self.try_stage_on(pool, f)
    }

    /// Append a stage whose worker loops run on `pool`
    pub fn stage_on<O, F, P>(self, pool: P, f: F) -> Result<Pipeline<O>>
    where
        O: Send + 'static,
        F: Fn(T) -> O + Send + Sync + 'static,
        P: StagePool,
    {
        self.try_stage_on(pool, move |item| Ok(f(item)))
    }

    /// Append a fallible stage whose worker loops run on `pool`
    pub fn try_stage_on<O, F, P>(self, pool: P, f: F) -> Result<Pipeline<O>>
    where
        O: Send + 'static,
        F: Fn(T) -> Result<O> + Send + Sync + 'static,
        P: StagePool,
    {
        let Pipeline {
            output,
            mut supervisors,
            errors,
            settings,
        } = self;

        let (output, supervisor) = spawn_stage(output, pool, &settings, f)?;
        supervisors.push(supervisor);

        Ok(Pipeline {
            output,
            supervisors,
            errors,
            settings,
        })
    }

    /// The final stage's output
    pub fn into_receiver(self) -> Receiver<T> {
        self.output
    }

    /// Drain the output into a vector
    pub fn collect_vec(self) -> Vec<T> {
        self.output.iter().collect()
    }

    /// Drain the output, wait for every stage to exit and return the items
    /// together with the errors recorded by fallible stages.
    ///
    /// A pipeline whose stages stopped early on cancellation additionally
    /// reports a [`PoolError::Cancelled`]; a token cancelled after the stream
    /// already ended reports nothing.
    pub fn finish(self) -> (Vec<T>, Vec<PoolError>) {
        let items: Vec<T> = self.output.iter().collect();

        for (idx, supervisor) in self.supervisors.into_iter().enumerate() {
            if supervisor.join().is_err() {
                self.errors
                    .record(PoolError::join_failed(idx, "stage supervisor panicked"));
            }
        }

        let mut errors = self.errors.drain();
        if self.settings.interrupted.load(Ordering::Acquire) {
            if let Some(Err(e)) = self.settings.token.as_ref().map(CancellationToken::check) {
                errors.push(e);
            }
        }
        (items, errors)
    }
}

impl<T> IntoIterator for Pipeline<T> {
    type Item = T;
    type IntoIter = crossbeam::channel::IntoIter<T>;

    fn into_iter(self) -> Self::IntoIter {
        self.output.into_iter()
    }
}
