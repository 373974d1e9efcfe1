//! Fan-out of one stream to several consumers

use crate::core::{PoolError, Result};
use crate::queue::{handoff, Receiver, Sender};
use std::thread;

/// Split `input` into `n` streams that each receive every item.
///
/// A single distributor thread reads one item and sends a copy to every
/// output before reading the next, so each output sees the input order and
/// the slowest consumer paces the others. All outputs close together once
/// `input` is closed and drained.
///
/// `n == 0` is treated as `1`; `buffer == 0` makes every output a
/// synchronous hand-off. An output whose receiver was dropped is skipped for
/// the rest of the stream; the distributor stops reading early only when
/// every output is gone.
///
/// # Errors
///
/// Returns [`PoolError::SpawnError`] if the distributor thread cannot be
/// created.
///
/// # Example
///
/// ```rust
/// use conpats::queue::handoff;
/// use conpats::stream::tee;
/// use std::thread;
///
/// # fn main() -> conpats::Result<()> {
/// let (tx, rx) = handoff(0);
/// let outs = tee(rx, 2, 0)?;
///
/// thread::spawn(move || {
///     for i in 0..3 {
///         tx.send(i).unwrap();
///     }
/// });
///
/// let readers: Vec<_> = outs
///     .into_iter()
///     .map(|out| thread::spawn(move || out.iter().collect::<Vec<i32>>()))
///     .collect();
/// for reader in readers {
///     assert_eq!(reader.join().unwrap(), vec![0, 1, 2]);
/// }
/// # Ok(())
/// # }
/// ```
pub fn tee<T>(input: Receiver<T>, n: usize, buffer: usize) -> Result<Vec<Receiver<T>>>
where
    T: Clone + Send + 'static,
{
    let n = n.max(1);
    let (senders, receivers): (Vec<Sender<T>>, Vec<Receiver<T>>) =
        (0..n).map(|_| handoff(buffer)).unzip();

    thread::Builder::new()
        .name("tee".to_string())
        .spawn(move || distribute(input, senders))
        .map_err(|e| PoolError::spawn_with_source(0, "cannot create tee distributor", e))?;

    Ok(receivers)
}

fn distribute<T: Clone>(input: Receiver<T>, senders: Vec<Sender<T>>) {
    let mut outputs: Vec<Option<Sender<T>>> = senders.into_iter().map(Some).collect();
    let mut forwarded = 0u64;

    for item in input.iter() {
        for (idx, slot) in outputs.iter_mut().enumerate() {
            if let Some(output) = slot {
                if output.send(item.clone()).is_err() {
                    log::debug!("tee output {} disconnected", idx);
                    *slot = None;
                }
            }
        }
        forwarded += 1;

        if outputs.iter().all(Option::is_none) {
            log::debug!("tee stopping: every output disconnected");
            break;
        }
    }

    log::debug!("tee finished after {} items", forwarded);
    // Dropping the senders closes every output at once
}
