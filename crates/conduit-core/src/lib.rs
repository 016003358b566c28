//! # Conduit Core
//!
//! Message envelopes and blocking channels for the Conduit messaging framework.
//!
//! ## Building Blocks
//!
//! - **Messages**: immutable envelopes with identity and headers ([`Message`], [`MessageBuilder`])
//! - **Capabilities**: the pull side ([`MessageSource`]), the push side ([`MessageTarget`])
//!   and their union ([`MessageChannel`])
//! - **Point-to-point channel**: a single-slot rendezvous between threads ([`PointToPointChannel`])
//! - **Interceptors**: per-channel hooks around send and receive ([`ChannelInterceptor`])
//! - **Cancellation**: aborting blocked operations from another thread ([`Cancellation`])
//!
//! ## Handoff
//!
//! ```text
//! ┌──────────┐  send   ┌───────────────────┐  receive  ┌──────────┐
//! │ producer │───────▶│ slot (0 or 1 msg) │─────────▶│ consumer │
//! └──────────┘         └───────────────────┘           └──────────┘
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use std::thread;
//! use std::time::Duration;
//! use conduit_core::prelude::*;
//!
//! let channel: BoxedChannel<String> = Arc::new(PointToPointChannel::named("orders"));
//!
//! let consumer = {
//!     let channel = Arc::clone(&channel);
//!     thread::spawn(move || channel.receive_timeout(Duration::from_secs(1)))
//! };
//!
//! channel.send(Message::new("order #1".to_string()))?;
//! assert!(consumer.join().unwrap()?.is_some());
//! ```

pub mod cancellation;
pub mod channel;
pub mod error;
pub mod message;

pub use cancellation::Cancellation;
pub use channel::{
    BoxedChannel, BoxedInterceptor, ChannelInterceptor, ChannelStats, HandoffMode, MessageChannel,
    MessageSource, MessageTarget, PointToPointChannel,
};
pub use error::{ChannelError, ChannelResult};
pub use message::{Message, MessageBuilder, MessageHeaders};

/// Prelude for common imports.
pub mod prelude {
    pub use super::{
        BoxedChannel, Cancellation, ChannelError, ChannelResult, HandoffMode, Message,
        MessageBuilder, MessageChannel, MessageSource, MessageTarget, PointToPointChannel,
    };
}
