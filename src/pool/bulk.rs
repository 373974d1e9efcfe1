//! Ordered parallel map over a fixed batch of inputs

use crate::core::{PoolError, Result};
use crate::pool::config::PoolConfig;
use crate::pool::worker_pool::WorkerPool;
use parking_lot::Mutex;
use std::sync::Arc;

/// Runs one function over a batch of inputs on a dedicated pool.
///
/// Results come back in input order regardless of which worker produced
/// them.
///
/// # Example
///
/// ```rust
/// use conpats::pool::BulkPool;
///
/// # fn main() -> conpats::Result<()> {
/// let squares = BulkPool::new(4, (1..=5).collect(), |x: u64| x * x).run()?;
/// assert_eq!(squares, vec![1, 4, 9, 16, 25]);
/// # Ok(())
/// # }
/// ```
pub struct BulkPool<I, R, F> {
    workers: usize,
    items: Vec<I>,
    process: Arc<F>,
    _result: std::marker::PhantomData<fn() -> R>,
}

impl<I, R, F> BulkPool<I, R, F>
where
    I: Send + 'static,
    R: Send + 'static,
    F: Fn(I) -> R + Send + Sync + 'static,
{
    /// Prepare a batch; `workers == 0` is treated as `1`
    pub fn new(workers: usize, items: Vec<I>, process: F) -> Self {
        Self {
            workers,
            items,
            process: Arc::new(process),
            _result: std::marker::PhantomData,
        }
    }

    /// Process every input and return the results in input order.
    ///
    /// # Errors
    ///
    /// Returns the worker spawn error, or the panic(s) raised by `process`
    /// folded with [`PoolError::join`].
    pub fn run(self) -> Result<Vec<R>> {
        let len = self.items.len();
        let config = PoolConfig::new(self.workers)
            .with_queue_capacity(len)
            .with_thread_name_prefix("bulk");
        let pool = WorkerPool::with_config(config)?.with_errors(false);

        let slots: Arc<Mutex<Vec<Option<R>>>> =
            Arc::new(Mutex::new((0..len).map(|_| None).collect()));

        for (idx, item) in self.items.into_iter().enumerate() {
            let process = Arc::clone(&self.process);
            let slots = Arc::clone(&slots);
            pool.go(move || {
                let result = process(item);
                slots.lock()[idx] = Some(result);
                Ok(())
            });
        }

        if let Some(error) = PoolError::join(pool.wait()) {
            return Err(error);
        }

        let results: Vec<R> = std::mem::take(&mut *slots.lock())
            .into_iter()
            .flatten()
            .collect();
        if results.len() != len {
            return Err(PoolError::other(format!(
                "bulk run produced {} of {} results",
                results.len(),
                len
            )));
        }
        Ok(results)
    }
}
