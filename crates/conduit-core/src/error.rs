//! Error types for channel operations.
//!
//! A bounded wait that expires is not an error: timed sends report `Ok(false)`
//! and timed receives report `Ok(None)`. The variants below cover the cases a
//! caller has to react to.

use thiserror::Error;

/// Errors that can occur while sending to or receiving from a channel.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChannelError {
    /// The caller supplied an argument the channel cannot accept.
    ///
    /// Raised synchronously, before any blocking begins.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The waiting thread was cancelled before the operation completed.
    #[error("operation on channel '{channel}' was interrupted")]
    Interrupted {
        /// Name of the channel the thread was blocked on.
        channel: String,
    },

    /// An interceptor refused the message.
    #[error("message rejected by channel '{channel}': {reason}")]
    Rejected {
        /// Name of the rejecting channel.
        channel: String,
        /// Reason given by the interceptor.
        reason: String,
    },
}

impl ChannelError {
    /// Creates an invalid-argument error.
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Creates an interrupted error for the named channel.
    pub fn interrupted(channel: impl Into<String>) -> Self {
        Self::Interrupted {
            channel: channel.into(),
        }
    }

    /// Creates a rejection error.
    pub fn rejected(channel: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Rejected {
            channel: channel.into(),
            reason: reason.into(),
        }
    }

    /// Returns `true` if this error was caused by cancellation.
    pub fn is_interrupted(&self) -> bool {
        matches!(self, Self::Interrupted { .. })
    }
}

/// Result type for channel operations.
pub type ChannelResult<T> = Result<T, ChannelError>;
