//! Cooperative cancellation for blocking channel operations.
//!
//! Threads cannot be interrupted from the outside, so a blocking call that
//! should be abortable takes a [`Cancellation`] token. While the call waits,
//! the channel it waits on is registered with the token; [`Cancellation::cancel`]
//! wakes every registered channel so the waiter observes the flag and returns
//! [`ChannelError::Interrupted`](crate::ChannelError::Interrupted).
//!
//! Registration happens before the waiter takes the channel lock and checks
//! the flag, and `cancel` sets the flag before it wakes anything, so a cancel
//! racing with a waiter that is just about to block is never lost.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::trace;

/// Something that can wake all threads blocked inside it.
pub(crate) trait Interruptible: Send + Sync {
    /// Wakes every waiter so it re-checks its cancellation token.
    fn interrupt(&self);
}

/// A shareable cancellation flag.
///
/// Clones and [`child`](Self::child) tokens share the same flag.
#[derive(Clone)]
pub struct Cancellation {
    inner: Arc<CancellationState>,
}

struct CancellationState {
    flag: AtomicBool,
    waiters: Mutex<Waiters>,
}

#[derive(Default)]
struct Waiters {
    next_id: u64,
    entries: HashMap<u64, Weak<dyn Interruptible>>,
}

impl Cancellation {
    /// Creates a token in the "not cancelled" state.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(CancellationState {
                flag: AtomicBool::new(false),
                waiters: Mutex::new(Waiters::default()),
            }),
        }
    }

    /// Returns `true` once the token has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.inner.flag.load(Ordering::Acquire)
    }

    /// Cancels the token and wakes all operations blocked under it.
    ///
    /// Returns `true` if this call performed the cancellation, `false` if the
    /// token was already cancelled.
    pub fn cancel(&self) -> bool {
        if self
            .inner
            .flag
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }

        // Snapshot first: interrupting takes channel locks, and a waiter may
        // deregister while holding one.
        let targets: Vec<_> = self
            .inner
            .waiters
            .lock()
            .entries
            .values()
            .filter_map(Weak::upgrade)
            .collect();

        trace!(waiters = targets.len(), "Cancellation requested");

        for target in targets {
            target.interrupt();
        }
        true
    }

    /// Returns a token sharing this token's flag.
    pub fn child(&self) -> Self {
        self.clone()
    }

    /// Number of operations currently blocked under this token.
    pub fn waiter_count(&self) -> usize {
        self.inner.waiters.lock().entries.len()
    }

    /// Registers a waiter for the duration of the returned guard.
    pub(crate) fn register(&self, target: Weak<dyn Interruptible>) -> Registration<'_> {
        let mut waiters = self.inner.waiters.lock();
        let id = waiters.next_id;
        waiters.next_id += 1;
        waiters.entries.insert(id, target);
        Registration { token: self, id }
    }
}

impl Default for Cancellation {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Cancellation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cancellation")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// Removes a waiter from its token when dropped.
pub(crate) struct Registration<'a> {
    token: &'a Cancellation,
    id: u64,
}

impl Drop for Registration<'_> {
    fn drop(&mut self) {
        self.token.inner.waiters.lock().entries.remove(&self.id);
    }
}
