//! Channel capabilities and implementations.
//!
//! Producers depend on [`MessageTarget`], consumers on [`MessageSource`], and
//! whoever wires them together on [`MessageChannel`], the union of both. Any
//! channel variant implementing the pair can be substituted for another.
//!
//! Each capability has a single primitive taking an optional bound and an
//! optional [`Cancellation`]; the remaining methods are shorthands for it.
//!
//! | timeout              | behaviour                           |
//! |----------------------|-------------------------------------|
//! | `None`               | wait indefinitely                   |
//! | `Some(Duration::ZERO)` | try once, return immediately      |
//! | `Some(d)`            | wait at most `d`                    |
//!
//! An expired wait is a normal outcome: sends report `Ok(false)` and receives
//! report `Ok(None)`.

use std::sync::Arc;
use std::time::Duration;

use crate::cancellation::Cancellation;
use crate::error::ChannelResult;
use crate::message::Message;

pub mod interceptor;
pub mod point_to_point;

pub use interceptor::{BoxedInterceptor, ChannelInterceptor};
pub use point_to_point::{ChannelStats, HandoffMode, PointToPointChannel};

/// Pull side of a channel.
pub trait MessageSource<T>: Send + Sync {
    /// Receives one message, waiting at most `timeout` and giving up early if
    /// `cancel` fires.
    fn receive_with(
        &self,
        timeout: Option<Duration>,
        cancel: Option<&Cancellation>,
    ) -> ChannelResult<Option<Message<T>>>;

    /// Blocks until a message is available.
    ///
    /// `Ok(None)` is only possible if an interceptor vetoed the receive or
    /// dropped the message.
    fn receive(&self) -> ChannelResult<Option<Message<T>>> {
        self.receive_with(None, None)
    }

    /// Waits at most `timeout` for a message.
    fn receive_timeout(&self, timeout: Duration) -> ChannelResult<Option<Message<T>>> {
        self.receive_with(Some(timeout), None)
    }

    /// Returns a message only if one is immediately available.
    fn try_receive(&self) -> ChannelResult<Option<Message<T>>> {
        self.receive_with(Some(Duration::ZERO), None)
    }

    /// Like [`receive_with`](Self::receive_with) with a mandatory token.
    fn receive_cancellable(
        &self,
        timeout: Option<Duration>,
        cancel: &Cancellation,
    ) -> ChannelResult<Option<Message<T>>> {
        self.receive_with(timeout, Some(cancel))
    }
}

/// Push side of a channel.
pub trait MessageTarget<T>: Send + Sync {
    /// Sends one message, waiting at most `timeout` and giving up early if
    /// `cancel` fires. Returns whether the message was delivered.
    fn send_with(
        &self,
        message: Message<T>,
        timeout: Option<Duration>,
        cancel: Option<&Cancellation>,
    ) -> ChannelResult<bool>;

    /// Blocks until the channel accepts the message.
    fn send(&self, message: Message<T>) -> ChannelResult<bool> {
        self.send_with(message, None, None)
    }

    /// Waits at most `timeout` for the channel to accept the message.
    fn send_timeout(&self, message: Message<T>, timeout: Duration) -> ChannelResult<bool> {
        self.send_with(message, Some(timeout), None)
    }

    /// Like [`send_with`](Self::send_with) with a mandatory token.
    fn send_cancellable(
        &self,
        message: Message<T>,
        timeout: Option<Duration>,
        cancel: &Cancellation,
    ) -> ChannelResult<bool> {
        self.send_with(message, timeout, Some(cancel))
    }
}

/// A channel: both a source and a target.
pub trait MessageChannel<T>: MessageSource<T> + MessageTarget<T> {
    /// The channel's name, used in logs and errors.
    fn name(&self) -> &str;
}

/// Type-erased, shareable channel.
pub type BoxedChannel<T> = Arc<dyn MessageChannel<T>>;
