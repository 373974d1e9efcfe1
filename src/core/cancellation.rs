//! Cooperative cancellation scopes
//!
//! A [`CancellationToken`] is a one-shot, irreversible signal shared between
//! a pool and the jobs it runs. Jobs observe it by polling
//! [`is_cancelled`](CancellationToken::is_cancelled), returning early through
//! [`check`](CancellationToken::check), or blocking on
//! [`wait`](CancellationToken::wait). The pool never interrupts a running job.
//!
//! # Features
//!
//! - **Hierarchical cancellation**: child tokens are cancelled with their parent
//! - **Timeout cancellation**: tokens that auto-cancel after a duration
//! - **Cancellation callbacks**: run cleanup when a token is cancelled
//! - **Cancellation reasons**: track why a token was cancelled
//!
//! # Example
//!
//! ```rust
//! use conpats::CancellationToken;
//!
//! let parent = CancellationToken::new();
//! let child1 = parent.child();
//! let child2 = parent.child();
//!
//! parent.cancel();
//!
//! assert!(parent.is_cancelled());
//! assert!(child1.is_cancelled());
//! assert!(child2.is_cancelled());
//! ```

use crate::core::{PoolError, Result};
use parking_lot::{Condvar, Mutex, RwLock};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

static NEXT_CALLBACK_ID: AtomicUsize = AtomicUsize::new(1);

fn next_callback_id() -> usize {
    NEXT_CALLBACK_ID.fetch_add(1, Ordering::Relaxed)
}

/// Reason for cancellation
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CancellationReason {
    /// Explicitly cancelled via `cancel()`
    Manual,
    /// Cancelled due to timeout expiration
    Timeout(Duration),
    /// Cancelled because the parent token was cancelled
    ParentCancelled,
    /// Cancelled because a sibling job failed
    Error(String),
    /// Cancelled because the owning pool shut down
    Shutdown,
    /// Custom cancellation reason
    Custom(String),
}

impl std::fmt::Display for CancellationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CancellationReason::Manual => write!(f, "manually cancelled"),
            CancellationReason::Timeout(d) => write!(f, "timeout after {:?}", d),
            CancellationReason::ParentCancelled => write!(f, "parent was cancelled"),
            CancellationReason::Error(msg) => write!(f, "error: {}", msg),
            CancellationReason::Shutdown => write!(f, "pool shut down"),
            CancellationReason::Custom(msg) => write!(f, "{}", msg),
        }
    }
}

struct StoredCallback {
    id: usize,
    callback: Box<dyn FnOnce() + Send + Sync>,
}

struct CancellationTokenInner {
    cancelled: AtomicBool,
    /// Weak references so dropped children don't leak
    children: RwLock<Vec<Weak<CancellationTokenInner>>>,
    callbacks: RwLock<Vec<StoredCallback>>,
    reason: RwLock<Option<CancellationReason>>,
    /// Paired with `done` for blocking waiters
    signal: Mutex<()>,
    done: Condvar,
}

impl CancellationTokenInner {
    fn new() -> Self {
        Self {
            cancelled: AtomicBool::new(false),
            children: RwLock::new(Vec::new()),
            callbacks: RwLock::new(Vec::new()),
            reason: RwLock::new(None),
            signal: Mutex::new(()),
            done: Condvar::new(),
        }
    }
}

impl std::fmt::Debug for CancellationTokenInner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellationTokenInner")
            .field("cancelled", &self.cancelled.load(Ordering::Relaxed))
            .field("children_count", &self.children.read().len())
            .field("callbacks_count", &self.callbacks.read().len())
            .field("reason", &*self.reason.read())
            .finish()
    }
}

/// A thread-safe, one-shot cancellation signal
///
/// Clones share state: cancelling any clone cancels them all. Once cancelled
/// a token stays cancelled.
///
/// # Example
///
/// ```rust
/// use conpats::CancellationToken;
/// use std::thread;
/// use std::time::Duration;
///
/// let token = CancellationToken::new();
/// let token_clone = token.clone();
///
/// let handle = thread::spawn(move || {
///     for _ in 0..100 {
///         if token_clone.is_cancelled() {
///             return "Cancelled";
///         }
///         thread::sleep(Duration::from_millis(10));
///     }
///     "Completed"
/// });
///
/// thread::sleep(Duration::from_millis(50));
/// token.cancel();
///
/// assert_eq!(handle.join().unwrap(), "Cancelled");
/// ```
#[derive(Clone)]
pub struct CancellationToken {
    inner: Arc<CancellationTokenInner>,
}

impl std::fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellationToken")
            .field("cancelled", &self.is_cancelled())
            .field("reason", &self.reason())
            .finish()
    }
}

impl CancellationToken {
    /// Create a new cancellation token (not cancelled)
    pub fn new() -> Self {
        Self {
            inner: Arc::new(CancellationTokenInner::new()),
        }
    }

    /// Creates a child token linked to this parent
    ///
    /// The child is cancelled when the parent is cancelled. If the parent is
    /// already cancelled, the child is created in a cancelled state.
    /// Cancelling the child never affects the parent.
    pub fn child(&self) -> Self {
        let child = CancellationToken::new();

        {
            let mut children = self.inner.children.write();
            children.retain(|weak| weak.strong_count() > 0);
            children.push(Arc::downgrade(&child.inner));
        }

        if self.is_cancelled() {
            child.cancel_with_reason(CancellationReason::ParentCancelled);
        }

        child
    }

    /// Creates a token that auto-cancels after the specified timeout
    ///
    /// A background thread waits on the token and triggers the timeout
    /// unless the token was cancelled first.
    ///
    /// ```rust
    /// use conpats::{CancellationReason, CancellationToken};
    /// use std::time::Duration;
    ///
    /// let token = CancellationToken::with_timeout(Duration::from_millis(20));
    /// assert!(token.wait_timeout(Duration::from_secs(5)));
    /// assert_eq!(token.reason(), Some(CancellationReason::Timeout(Duration::from_millis(20))));
    /// ```
    pub fn with_timeout(timeout: Duration) -> Self {
        let token = Self::new();
        token.arm_timeout(timeout);
        token
    }

    /// Creates a child token that auto-cancels after the specified timeout
    ///
    /// The child is cancelled by whichever comes first: the parent being
    /// cancelled or the timeout expiring.
    pub fn child_with_timeout(&self, timeout: Duration) -> Self {
        let child = self.child();
        child.arm_timeout(timeout);
        child
    }

    /// The timer thread exits as soon as the token is cancelled by any path
    fn arm_timeout(&self, timeout: Duration) {
        let token = self.clone();
        let spawned = std::thread::Builder::new()
            .name("cancel-timeout".to_string())
            .spawn(move || {
                if !token.wait_timeout(timeout) {
                    token.cancel_with_reason(CancellationReason::Timeout(timeout));
                }
            });
        if let Err(e) = spawned {
            log::error!("cannot arm {:?} cancellation timeout: {}", timeout, e);
        }
    }

    /// Cancel this token with default reason (Manual)
    ///
    /// Idempotent: only the first call has any effect.
    pub fn cancel(&self) {
        self.cancel_with_reason(CancellationReason::Manual);
    }

    /// Cancel this token with a specific reason
    ///
    /// Cancels the token and all child tokens, wakes blocked waiters, then
    /// executes registered callbacks. The reason is only set by the first
    /// cancellation.
    ///
    /// ```rust
    /// use conpats::{CancellationReason, CancellationToken};
    ///
    /// let token = CancellationToken::new();
    /// token.cancel_with_reason(CancellationReason::Error("connection lost".to_string()));
    ///
    /// assert_eq!(
    ///     token.reason(),
    ///     Some(CancellationReason::Error("connection lost".to_string()))
    /// );
    /// ```
    pub fn cancel_with_reason(&self, reason: CancellationReason) {
        self.try_cancel(reason);
    }

    /// Cancel with a reason, reporting whether this call performed the transition
    ///
    /// Returns `false` if the token was already cancelled.
    pub fn try_cancel(&self, reason: CancellationReason) -> bool {
        // Reason is written under the lock before the flag flips so that
        // observers of `is_cancelled` always see a reason
        {
            let mut slot = self.inner.reason.write();
            if self.inner.cancelled.load(Ordering::Acquire) {
                return false;
            }
            *slot = Some(reason);
            self.inner.cancelled.store(true, Ordering::Release);
        }

        {
            let _signal = self.inner.signal.lock();
            self.inner.done.notify_all();
        }

        let callbacks: Vec<_> = self.inner.callbacks.write().drain(..).collect();
        for stored in callbacks {
            (stored.callback)();
        }

        let children: Vec<_> = self
            .inner
            .children
            .read()
            .iter()
            .filter_map(Weak::upgrade)
            .collect();
        for child_inner in children {
            CancellationToken { inner: child_inner }
                .cancel_with_reason(CancellationReason::ParentCancelled);
        }

        true
    }

    /// Check if this token has been cancelled
    ///
    /// Lock-free, suitable for hot loops.
    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::Acquire)
    }

    /// Returns the cancellation reason, `None` while not cancelled
    pub fn reason(&self) -> Option<CancellationReason> {
        self.inner.reason.read().clone()
    }

    /// Returns [`PoolError::Cancelled`] if cancelled, `Ok(())` otherwise
    ///
    /// ```rust
    /// use conpats::{CancellationToken, PoolError};
    ///
    /// fn process_items(token: &CancellationToken) -> Result<(), PoolError> {
    ///     for _ in 0..100 {
    ///         token.check()?;
    ///     }
    ///     Ok(())
    /// }
    /// ```
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            let reason = self
                .reason()
                .map(|r| r.to_string())
                .unwrap_or_else(|| "unknown".to_string());
            Err(PoolError::cancelled(reason))
        } else {
            Ok(())
        }
    }

    /// Block until the token is cancelled
    pub fn wait(&self) {
        let mut signal = self.inner.signal.lock();
        while !self.is_cancelled() {
            self.inner.done.wait(&mut signal);
        }
    }

    /// Block until the token is cancelled or the timeout expires
    ///
    /// Returns `true` if the token is cancelled.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut signal = self.inner.signal.lock();
        while !self.is_cancelled() {
            if self
                .inner
                .done
                .wait_until(&mut signal, deadline)
                .timed_out()
            {
                return self.is_cancelled();
            }
        }
        true
    }

    /// Registers a callback to run when cancelled
    ///
    /// Returns a guard that unregisters the callback when dropped. If the token
    /// is already cancelled the callback runs immediately.
    ///
    /// ```rust
    /// use conpats::CancellationToken;
    /// use std::sync::atomic::{AtomicBool, Ordering};
    /// use std::sync::Arc;
    ///
    /// let token = CancellationToken::new();
    /// let called = Arc::new(AtomicBool::new(false));
    /// let called_clone = Arc::clone(&called);
    ///
    /// let _guard = token.on_cancel(move || {
    ///     called_clone.store(true, Ordering::SeqCst);
    /// });
    ///
    /// token.cancel();
    /// assert!(called.load(Ordering::SeqCst));
    /// ```
    pub fn on_cancel<F>(&self, callback: F) -> CancellationCallbackGuard
    where
        F: FnOnce() + Send + Sync + 'static,
    {
        let id = next_callback_id();

        let pending = {
            let mut callbacks = self.inner.callbacks.write();
            if self.is_cancelled() {
                Some(callback)
            } else {
                callbacks.push(StoredCallback {
                    id,
                    callback: Box::new(callback),
                });
                None
            }
        };
        if let Some(callback) = pending {
            callback();
        }

        CancellationCallbackGuard {
            token: Some(self.clone()),
            callback_id: id,
        }
    }

    /// Registers a callback that always runs when cancelled
    pub fn on_cancel_always<F>(&self, callback: F)
    where
        F: FnOnce() + Send + Sync + 'static,
    {
        self.on_cancel(callback).detach();
    }

    fn remove_callback(&self, callback_id: usize) {
        self.inner.callbacks.write().retain(|c| c.id != callback_id);
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Guard that unregisters a callback when dropped
///
/// Returned by [`CancellationToken::on_cancel()`].
pub struct CancellationCallbackGuard {
    token: Option<CancellationToken>,
    callback_id: usize,
}

impl Drop for CancellationCallbackGuard {
    fn drop(&mut self) {
        if let Some(token) = self.token.take() {
            if !token.is_cancelled() {
                token.remove_callback(self.callback_id);
            }
        }
    }
}

impl CancellationCallbackGuard {
    /// Keep the callback registered after the guard is dropped
    pub fn detach(mut self) {
        self.token = None;
    }
}
