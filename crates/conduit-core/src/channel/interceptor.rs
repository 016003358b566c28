//! Channel interceptors.
//!
//! Interceptors observe and shape the traffic of a single channel. They run on
//! the calling thread, outside the channel's lock, in registration order.

use std::sync::Arc;

use parking_lot::RwLock;
use tracing::trace;

use crate::error::ChannelResult;
use crate::message::{Message, MessageHeaders};

/// Hooks invoked around send and receive operations.
///
/// Every hook has a pass-through default, so implementations only override
/// what they need.
pub trait ChannelInterceptor<T>: Send + Sync {
    /// Runs before a message enters the channel.
    ///
    /// Returning `Ok(None)` vetoes the send; the send then reports `Ok(false)`
    /// without touching the channel. Returning an error aborts the send.
    fn pre_send(&self, message: Message<T>, channel: &str) -> ChannelResult<Option<Message<T>>> {
        let _ = channel;
        Ok(Some(message))
    }

    /// Runs after a send attempt, whether or not it delivered.
    fn post_send(&self, headers: &MessageHeaders, channel: &str, sent: bool) {
        let _ = (headers, channel, sent);
    }

    /// Runs before a receive starts waiting. Returning `false` makes the
    /// receive return `Ok(None)` immediately.
    fn pre_receive(&self, channel: &str) -> bool {
        let _ = channel;
        true
    }

    /// Runs after a message has been taken from the channel. Returning `None`
    /// drops the message.
    fn post_receive(&self, message: Message<T>, channel: &str) -> Option<Message<T>> {
        let _ = channel;
        Some(message)
    }
}

/// Shared interceptor handle.
pub type BoxedInterceptor<T> = Arc<dyn ChannelInterceptor<T>>;

/// Ordered interceptor list owned by a channel.
pub(crate) struct InterceptorList<T> {
    interceptors: RwLock<Vec<BoxedInterceptor<T>>>,
}

impl<T> InterceptorList<T> {
    pub(crate) fn new() -> Self {
        Self {
            interceptors: RwLock::new(Vec::new()),
        }
    }

    pub(crate) fn set(&self, interceptors: Vec<BoxedInterceptor<T>>) {
        *self.interceptors.write() = interceptors;
    }

    pub(crate) fn add(&self, interceptor: BoxedInterceptor<T>) {
        self.interceptors.write().push(interceptor);
    }

    pub(crate) fn len(&self) -> usize {
        self.interceptors.read().len()
    }

    fn snapshot(&self) -> Vec<BoxedInterceptor<T>> {
        self.interceptors.read().clone()
    }

    pub(crate) fn pre_send(
        &self,
        mut message: Message<T>,
        channel: &str,
    ) -> ChannelResult<Option<Message<T>>> {
        trace!(channel, message_id = %message.id(), "running pre-send interceptors");
        for interceptor in self.snapshot() {
            match interceptor.pre_send(message, channel)? {
                Some(next) => message = next,
                None => return Ok(None),
            }
        }
        Ok(Some(message))
    }

    pub(crate) fn post_send(&self, headers: &MessageHeaders, channel: &str, sent: bool) {
        trace!(channel, message_id = %headers.id(), sent, "running post-send interceptors");
        for interceptor in self.snapshot() {
            interceptor.post_send(headers, channel, sent);
        }
    }

    pub(crate) fn pre_receive(&self, channel: &str) -> bool {
        trace!(channel, "running pre-receive interceptors");
        self.snapshot()
            .iter()
            .all(|interceptor| interceptor.pre_receive(channel))
    }

    pub(crate) fn post_receive(
        &self,
        mut message: Message<T>,
        channel: &str,
    ) -> Option<Message<T>> {
        trace!(channel, message_id = %message.id(), "running post-receive interceptors");
        for interceptor in self.snapshot() {
            message = interceptor.post_receive(message, channel)?;
        }
        Some(message)
    }
}
