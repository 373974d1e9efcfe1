//! Hand-off queues used for job dispatch and stage-to-stage transport.
//!
//! Every queue in this crate is a crossbeam channel. A capacity of `0` creates a
//! rendezvous channel: a send completes only when a receiver takes the item,
//! which makes submission itself the backpressure point.
//!
//! - [`handoff`]: a plain bounded channel pair for pipeline stages and tees
//! - [`HandoffQueue`]: a close-once queue owned by a pool
//!
//! # Example
//!
//! ```rust
//! use conpats::queue::handoff;
//! use std::thread;
//!
//! let (tx, rx) = handoff::<u32>(0);
//! let producer = thread::spawn(move || {
//!     for i in 0..3 {
//!         tx.send(i).unwrap();
//!     }
//! });
//!
//! let received: Vec<u32> = rx.iter().collect();
//! producer.join().unwrap();
//! assert_eq!(received, vec![0, 1, 2]);
//! ```

mod handoff;

pub use handoff::HandoffQueue;

pub use crossbeam::channel::{Receiver, Sender};

/// Create a hand-off channel with the given capacity (`0` = synchronous)
pub fn handoff<T>(capacity: usize) -> (Sender<T>, Receiver<T>) {
    crossbeam::channel::bounded(capacity)
}

/// Errors that can occur during queue operations.
///
/// Variants that refuse an item hand it back so the caller can decide what
/// to do with it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueError<T> {
    /// No receiver or buffer slot was immediately available
    Full(T),
    /// Queue is closed and not accepting new items
    Closed(T),
    /// Queue is empty (for try_recv)
    Empty,
    /// Queue is closed and drained
    Disconnected,
    /// Operation timed out
    Timeout(T),
}

impl<T> QueueError<T> {
    /// Take back the refused item, if any
    pub fn into_inner(self) -> Option<T> {
        match self {
            QueueError::Full(item) | QueueError::Closed(item) | QueueError::Timeout(item) => {
                Some(item)
            }
            QueueError::Empty | QueueError::Disconnected => None,
        }
    }

    /// Whether the queue refused because it is closed
    pub fn is_closed(&self) -> bool {
        matches!(self, QueueError::Closed(_) | QueueError::Disconnected)
    }
}

impl<T> std::fmt::Display for QueueError<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QueueError::Full(_) => write!(f, "queue is full"),
            QueueError::Closed(_) => write!(f, "queue is closed"),
            QueueError::Empty => write!(f, "queue is empty"),
            QueueError::Disconnected => write!(f, "queue is disconnected"),
            QueueError::Timeout(_) => write!(f, "operation timed out"),
        }
    }
}

impl<T: std::fmt::Debug> std::error::Error for QueueError<T> {}

/// Result type for queue operations.
pub type QueueResult<T, I> = std::result::Result<T, QueueError<I>>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_error_into_inner() {
        assert_eq!(QueueError::Full(3).into_inner(), Some(3));
        assert_eq!(QueueError::Closed("job").into_inner(), Some("job"));
        assert_eq!(QueueError::<u8>::Disconnected.into_inner(), None);
    }

    #[test]
    fn test_queue_error_display() {
        assert_eq!(QueueError::Closed(()).to_string(), "queue is closed");
        assert_eq!(QueueError::Full(()).to_string(), "queue is full");
        assert!(QueueError::Closed(()).is_closed());
        assert!(!QueueError::Full(()).is_closed());
    }

    #[test]
    fn test_handoff_zero_capacity_is_rendezvous() {
        let (tx, rx) = handoff::<u8>(0);
        assert!(tx.try_send(1).is_err());
        drop(rx);
    }

    #[test]
    fn test_handoff_buffered() {
        let (tx, rx) = handoff::<u8>(2);
        tx.try_send(1).unwrap();
        tx.try_send(2).unwrap();
        assert!(tx.try_send(3).is_err());
        drop(tx);
        assert_eq!(rx.iter().collect::<Vec<_>>(), vec![1, 2]);
    }
}
