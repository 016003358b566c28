//! Single-slot, blocking point-to-point channel.
//!
//! The channel holds at most one in-flight message. A send waits while the
//! slot is occupied, installs its message and wakes one receiver; a receive
//! waits while the slot is empty, takes the message and wakes one sender.
//! Every message a send installs is taken by exactly one receive.
//!
//! ```text
//!            send: install           receive: take
//!   EMPTY  ──────────────────▶  OCCUPIED  ──────────────────▶  EMPTY
//!            (waits on not_full)          (waits on not_empty)
//! ```
//!
//! In [`HandoffMode::Synchronous`] a send additionally waits until its own
//! message has been taken. If that wait expires or is cancelled, the message
//! is withdrawn from the slot and the send reports non-delivery.
//!
//! All waits re-check their predicate after waking. A waiter that gives up
//! while the condition it waited for holds passes the wakeup on, so
//! `notify_one` never strands another waiter.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex, MutexGuard};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::cancellation::{Cancellation, Interruptible, Registration};
use crate::channel::interceptor::{BoxedInterceptor, InterceptorList};
use crate::channel::{MessageChannel, MessageSource, MessageTarget};
use crate::error::{ChannelError, ChannelResult};
use crate::message::Message;

const DEFAULT_CHANNEL_NAME: &str = "anonymous";

/// When a send counts as complete.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HandoffMode {
    /// The send completes once the message occupies the slot.
    #[default]
    Buffered,
    /// The send completes once a receiver has taken the message.
    Synchronous,
}

// ============================================================================
// Shared state
// ============================================================================

struct Slot<T> {
    message: Option<Message<T>>,
    /// Ticket of the message currently (or last) installed.
    ticket: u64,
    /// Ticket of the last message taken by a receiver.
    last_taken: u64,
}

impl<T> Slot<T> {
    fn install(&mut self, message: Message<T>) -> u64 {
        self.ticket += 1;
        self.message = Some(message);
        self.ticket
    }

    fn take(&mut self) -> Option<Message<T>> {
        let message = self.message.take();
        if message.is_some() {
            self.last_taken = self.ticket;
        }
        message
    }
}

struct Shared<T> {
    slot: Mutex<Slot<T>>,
    not_empty: Condvar,
    not_full: Condvar,
    delivered: Condvar,
}

impl<T: Send> Interruptible for Shared<T> {
    fn interrupt(&self) {
        // Notifying under the lock orders the wakeup after any flag check a
        // waiter performs while holding it.
        let _slot = self.slot.lock();
        self.not_empty.notify_all();
        self.not_full.notify_all();
        self.delivered.notify_all();
    }
}

enum Wait {
    Ready,
    TimedOut,
    Interrupted,
}

fn wait_until<T>(
    condvar: &Condvar,
    slot: &mut MutexGuard<'_, Slot<T>>,
    deadline: Option<Instant>,
    cancel: Option<&Cancellation>,
    ready: impl Fn(&Slot<T>) -> bool,
) -> Wait {
    loop {
        if ready(&**slot) {
            return Wait::Ready;
        }
        if cancel.is_some_and(Cancellation::is_cancelled) {
            return Wait::Interrupted;
        }
        match deadline {
            None => condvar.wait(slot),
            Some(deadline) => {
                if Instant::now() >= deadline {
                    return Wait::TimedOut;
                }
                condvar.wait_until(slot, deadline);
            }
        }
    }
}

fn deadline_after(timeout: Option<Duration>) -> Option<Instant> {
    timeout.and_then(|t| Instant::now().checked_add(t))
}

// ============================================================================
// Statistics
// ============================================================================

#[derive(Default)]
struct Counters {
    sent: AtomicU64,
    received: AtomicU64,
    send_timeouts: AtomicU64,
    receive_timeouts: AtomicU64,
    interrupted: AtomicU64,
    vetoed: AtomicU64,
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

/// Counters describing a channel's traffic so far.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChannelStats {
    /// Messages accepted by a send.
    pub sent: u64,
    /// Messages taken by a receive.
    pub received: u64,
    /// Sends that gave up because their bound expired.
    pub send_timeouts: u64,
    /// Receives that gave up because their bound expired.
    pub receive_timeouts: u64,
    /// Operations aborted by cancellation.
    pub interrupted: u64,
    /// Sends and receives vetoed or rejected by interceptors.
    pub vetoed: u64,
}

impl fmt::Display for ChannelStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} sent, {} received, {} send timeouts, {} receive timeouts, {} interrupted, {} vetoed",
            self.sent,
            self.received,
            self.send_timeouts,
            self.receive_timeouts,
            self.interrupted,
            self.vetoed
        )
    }
}

// ============================================================================
// PointToPointChannel
// ============================================================================

/// A rendezvous channel with a single message slot.
///
/// # Thread Safety
///
/// The channel is `Send + Sync` for `T: Send` and is normally shared as
/// `Arc<PointToPointChannel<T>>` or as a [`BoxedChannel`](crate::BoxedChannel).
///
/// # Example
///
/// ```rust,ignore
/// use std::sync::Arc;
/// use std::thread;
/// use conduit_core::{Message, MessageSource, MessageTarget, PointToPointChannel};
///
/// let channel = Arc::new(PointToPointChannel::named("greetings"));
///
/// let consumer = {
///     let channel = Arc::clone(&channel);
///     thread::spawn(move || channel.receive())
/// };
///
/// channel.send(Message::new("testing"))?;
/// let received = consumer.join().unwrap()?;
/// ```
pub struct PointToPointChannel<T> {
    name: String,
    mode: HandoffMode,
    shared: Arc<Shared<T>>,
    interceptors: InterceptorList<T>,
    counters: Counters,
}

impl<T: Send + 'static> PointToPointChannel<T> {
    /// Creates an unnamed buffered channel.
    pub fn new() -> Self {
        Self::named(DEFAULT_CHANNEL_NAME)
    }

    /// Creates a named buffered channel.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            mode: HandoffMode::default(),
            shared: Arc::new(Shared {
                slot: Mutex::new(Slot {
                    message: None,
                    ticket: 0,
                    last_taken: 0,
                }),
                not_empty: Condvar::new(),
                not_full: Condvar::new(),
                delivered: Condvar::new(),
            }),
            interceptors: InterceptorList::new(),
            counters: Counters::default(),
        }
    }

    /// Sets the handoff mode (builder pattern).
    pub fn handoff(mut self, mode: HandoffMode) -> Self {
        self.mode = mode;
        self
    }

    /// Appends an interceptor (builder pattern).
    pub fn with_interceptor(self, interceptor: BoxedInterceptor<T>) -> Self {
        self.interceptors.add(interceptor);
        self
    }

    /// Appends an interceptor.
    pub fn add_interceptor(&self, interceptor: BoxedInterceptor<T>) {
        self.interceptors.add(interceptor);
    }

    /// Replaces all interceptors.
    pub fn set_interceptors(&self, interceptors: Vec<BoxedInterceptor<T>>) {
        self.interceptors.set(interceptors);
    }

    /// Number of registered interceptors.
    pub fn interceptor_count(&self) -> usize {
        self.interceptors.len()
    }

    /// The channel's handoff mode.
    pub fn handoff_mode(&self) -> HandoffMode {
        self.mode
    }

    /// Returns `true` if no message currently occupies the slot.
    pub fn is_empty(&self) -> bool {
        self.shared.slot.lock().message.is_none()
    }

    /// Returns a snapshot of the traffic counters.
    pub fn stats(&self) -> ChannelStats {
        let c = &self.counters;
        ChannelStats {
            sent: c.sent.load(Ordering::Relaxed),
            received: c.received.load(Ordering::Relaxed),
            send_timeouts: c.send_timeouts.load(Ordering::Relaxed),
            receive_timeouts: c.receive_timeouts.load(Ordering::Relaxed),
            interrupted: c.interrupted.load(Ordering::Relaxed),
            vetoed: c.vetoed.load(Ordering::Relaxed),
        }
    }

    fn register<'a>(&self, cancel: Option<&'a Cancellation>) -> Option<Registration<'a>> {
        cancel.map(|token| {
            let target = Arc::downgrade(&self.shared) as Weak<dyn Interruptible>;
            token.register(target)
        })
    }

    fn fail_if_cancelled(&self, cancel: Option<&Cancellation>) -> ChannelResult<()> {
        if cancel.is_some_and(Cancellation::is_cancelled) {
            bump(&self.counters.interrupted);
            return Err(ChannelError::interrupted(&self.name));
        }
        Ok(())
    }

    /// Accounts for a wait that ended without completing.
    fn abandon(&self, outcome: Wait, op: &'static str) -> ChannelResult<()> {
        match outcome {
            Wait::TimedOut => {
                let counter = if op == "send" {
                    &self.counters.send_timeouts
                } else {
                    &self.counters.receive_timeouts
                };
                bump(counter);
                debug!(channel = %self.name, op, "Timed out");
                Ok(())
            }
            Wait::Interrupted => {
                bump(&self.counters.interrupted);
                debug!(channel = %self.name, op, "Interrupted");
                Err(ChannelError::interrupted(&self.name))
            }
            Wait::Ready => Ok(()),
        }
    }

    fn deposit(
        &self,
        message: Message<T>,
        deadline: Option<Instant>,
        cancel: Option<&Cancellation>,
    ) -> ChannelResult<bool> {
        let _registration = self.register(cancel);
        let shared = &*self.shared;
        let mut slot = shared.slot.lock();

        match wait_until(&shared.not_full, &mut slot, deadline, cancel, |s| {
            s.message.is_none()
        }) {
            Wait::Ready => {}
            outcome => {
                if slot.message.is_none() {
                    shared.not_full.notify_one();
                }
                drop(slot);
                return self.abandon(outcome, "send").map(|()| false);
            }
        }

        let message_id = message.id();
        let ticket = slot.install(message);
        shared.not_empty.notify_one();
        trace!(channel = %self.name, %message_id, ticket, "Message installed");

        if self.mode == HandoffMode::Buffered {
            bump(&self.counters.sent);
            return Ok(true);
        }

        match wait_until(&shared.delivered, &mut slot, deadline, cancel, |s| {
            s.last_taken >= ticket
        }) {
            Wait::Ready => {
                bump(&self.counters.sent);
                Ok(true)
            }
            outcome => {
                // Nobody can install over an occupied slot, so an untaken
                // ticket means the message is still ours to withdraw.
                slot.message = None;
                shared.not_full.notify_one();
                drop(slot);
                trace!(channel = %self.name, %message_id, "Message withdrawn");
                self.abandon(outcome, "send").map(|()| false)
            }
        }
    }

    fn take(
        &self,
        deadline: Option<Instant>,
        cancel: Option<&Cancellation>,
    ) -> ChannelResult<Option<Message<T>>> {
        let _registration = self.register(cancel);
        let shared = &*self.shared;
        let mut slot = shared.slot.lock();

        match wait_until(&shared.not_empty, &mut slot, deadline, cancel, |s| {
            s.message.is_some()
        }) {
            Wait::Ready => {
                let message = slot.take();
                shared.not_full.notify_one();
                shared.delivered.notify_all();
                Ok(message)
            }
            outcome => {
                if slot.message.is_some() {
                    shared.not_empty.notify_one();
                }
                drop(slot);
                self.abandon(outcome, "receive").map(|()| None)
            }
        }
    }
}

impl<T: Send + 'static> Default for PointToPointChannel<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Send + 'static> MessageTarget<T> for PointToPointChannel<T> {
    fn send_with(
        &self,
        message: Message<T>,
        timeout: Option<Duration>,
        cancel: Option<&Cancellation>,
    ) -> ChannelResult<bool> {
        let deadline = deadline_after(timeout);
        self.fail_if_cancelled(cancel)?;

        let message = match self.interceptors.pre_send(message, &self.name) {
            Ok(Some(message)) => message,
            Ok(None) => {
                bump(&self.counters.vetoed);
                debug!(channel = %self.name, "Send vetoed by interceptor");
                return Ok(false);
            }
            Err(e) => {
                bump(&self.counters.vetoed);
                return Err(e);
            }
        };

        let headers = message.headers().clone();
        let result = self.deposit(message, deadline, cancel);
        self.interceptors
            .post_send(&headers, &self.name, matches!(result, Ok(true)));
        result
    }
}

impl<T: Send + 'static> MessageSource<T> for PointToPointChannel<T> {
    fn receive_with(
        &self,
        timeout: Option<Duration>,
        cancel: Option<&Cancellation>,
    ) -> ChannelResult<Option<Message<T>>> {
        let deadline = deadline_after(timeout);
        self.fail_if_cancelled(cancel)?;

        if !self.interceptors.pre_receive(&self.name) {
            bump(&self.counters.vetoed);
            return Ok(None);
        }

        let Some(message) = self.take(deadline, cancel)? else {
            return Ok(None);
        };
        bump(&self.counters.received);
        trace!(channel = %self.name, message_id = %message.id(), "Message taken");

        Ok(self.interceptors.post_receive(message, &self.name))
    }
}

impl<T: Send + 'static> MessageChannel<T> for PointToPointChannel<T> {
    fn name(&self) -> &str {
        &self.name
    }
}

impl<T> fmt::Debug for PointToPointChannel<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PointToPointChannel")
            .field("name", &self.name)
            .field("mode", &self.mode)
            .field("occupied", &self.shared.slot.lock().message.is_some())
            .finish()
    }
}
