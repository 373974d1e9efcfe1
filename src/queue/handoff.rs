//! Close-once hand-off queue owned by a pool.

use super::{QueueError, QueueResult};
use crossbeam::channel::{self, Receiver, RecvTimeoutError, SendTimeoutError, Sender, TrySendError};
use parking_lot::Mutex;
use std::time::Duration;

/// A hand-off queue that can be closed exactly once.
///
/// The queue owns the only long-lived [`Sender`]. Closing takes it out of its
/// slot; senders already blocked in [`send`](Self::send) still complete, and
/// receivers observe disconnection once those in-flight sends are delivered
/// and the buffer is drained. Nothing accepted before the close is lost.
///
/// # Example
///
/// ```rust
/// use conpats::queue::{HandoffQueue, QueueError};
///
/// let queue = HandoffQueue::new(1);
/// queue.send(7).unwrap();
///
/// assert!(queue.close());
/// assert!(!queue.close());
/// assert!(matches!(queue.send(8), Err(QueueError::Closed(8))));
///
/// let rx = queue.receiver();
/// assert_eq!(rx.recv().ok(), Some(7));
/// assert!(rx.recv().is_err());
/// ```
pub struct HandoffQueue<T> {
    sender: Mutex<Option<Sender<T>>>,
    receiver: Receiver<T>,
    capacity: usize,
}

impl<T> HandoffQueue<T> {
    /// Creates a queue; `capacity == 0` makes every send a rendezvous.
    pub fn new(capacity: usize) -> Self {
        let (sender, receiver) = channel::bounded(capacity);
        Self {
            sender: Mutex::new(Some(sender)),
            receiver,
            capacity,
        }
    }

    /// Clone the live sender without holding the lock across a blocking send
    fn live_sender(&self) -> Option<Sender<T>> {
        self.sender.lock().clone()
    }

    /// Sends an item, blocking until a receiver or buffer slot takes it.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Closed`] with the item if the queue is closed.
    pub fn send(&self, item: T) -> QueueResult<(), T> {
        match self.live_sender() {
            Some(sender) => sender.send(item).map_err(|e| QueueError::Closed(e.0)),
            None => Err(QueueError::Closed(item)),
        }
    }

    /// Attempts to send without blocking.
    ///
    /// # Errors
    ///
    /// - [`QueueError::Full`] if no receiver is waiting and the buffer is full
    /// - [`QueueError::Closed`] if the queue has been closed
    pub fn try_send(&self, item: T) -> QueueResult<(), T> {
        match self.live_sender() {
            Some(sender) => sender.try_send(item).map_err(|e| match e {
                TrySendError::Full(item) => QueueError::Full(item),
                TrySendError::Disconnected(item) => QueueError::Closed(item),
            }),
            None => Err(QueueError::Closed(item)),
        }
    }

    /// Sends an item, waiting at most `timeout` for a receiver or buffer slot.
    ///
    /// # Errors
    ///
    /// - [`QueueError::Timeout`] with the item if nothing took it in time
    /// - [`QueueError::Closed`] if the queue has been closed
    pub fn send_timeout(&self, item: T, timeout: Duration) -> QueueResult<(), T> {
        match self.live_sender() {
            Some(sender) => sender.send_timeout(item, timeout).map_err(|e| match e {
                SendTimeoutError::Timeout(item) => QueueError::Timeout(item),
                SendTimeoutError::Disconnected(item) => QueueError::Closed(item),
            }),
            None => Err(QueueError::Closed(item)),
        }
    }

    /// Receives with a timeout.
    ///
    /// # Returns
    ///
    /// - `Err(QueueError::Empty)` if nothing arrived within the timeout
    /// - `Err(QueueError::Disconnected)` if the queue is closed and drained
    pub fn recv_timeout(&self, timeout: Duration) -> QueueResult<T, T> {
        self.receiver.recv_timeout(timeout).map_err(|e| match e {
            RecvTimeoutError::Timeout => QueueError::Empty,
            RecvTimeoutError::Disconnected => QueueError::Disconnected,
        })
    }

    /// A receiver handle for a worker
    pub fn receiver(&self) -> Receiver<T> {
        self.receiver.clone()
    }

    /// Closes the queue.
    ///
    /// Returns `true` only for the call that performed the close.
    pub fn close(&self) -> bool {
        self.sender.lock().take().is_some()
    }

    /// Returns `true` if the queue has been closed.
    pub fn is_closed(&self) -> bool {
        self.sender.lock().is_none()
    }

    /// Number of buffered items (always 0 for a rendezvous queue)
    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    /// Returns `true` if nothing is buffered.
    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }

    /// Buffer capacity (`0` for a rendezvous queue)
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl<T> std::fmt::Debug for HandoffQueue<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandoffQueue")
            .field("capacity", &self.capacity)
            .field("len", &self.len())
            .field("closed", &self.is_closed())
            .finish()
    }
}
