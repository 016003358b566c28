//! # Conduit
//!
//! Blocking point-to-point message channels with a polling message bus.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐  send  ┌──────────────────────┐  receive  ┌────────────┐     ┌──────────┐
//! │ producer │───────▶│ PointToPointChannel  │──────────▶│ dispatcher │────▶│ endpoint │
//! └──────────┘        │   (single slot)      │           │ (per sub)  │     └──────────┘
//!                     └──────────────────────┘           └────────────┘
//! ```
//!
//! - **Channels**: thread-safe, blocking handoff of one message at a time
//! - **Interceptors**: per-channel hooks that transform or veto traffic
//! - **Bus**: named channels and endpoints, wired together by subscriptions
//! - **Endpoints**: async consumers invoked under a concurrency limit
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use conduit::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), RuntimeError> {
//!     let bus = MessageBus::<String>::builder().build()?;
//!
//!     bus.register_endpoint(
//!         "greeter",
//!         Arc::new(handler_fn(|msg: Message<String>| async move {
//!             info!("Hello, {}", msg.payload());
//!             Ok(())
//!         })
//!         .input_channel("names")),
//!     )
//!     .await?;
//!
//!     bus.start().await?;
//!     if let Some(names) = bus.channel("names").await {
//!         names.send(Message::new("world".into()))?;
//!     }
//!     bus.stop().await
//! }
//! ```
//!
//! ## Features
//!
//! - `toml-config`: load `conduit.toml` (default)
//! - `yaml-config`: load `conduit.yaml`
//! - `json-log`: JSON log output

pub use conduit_core as core;
pub use conduit_runtime as runtime;

/// Prelude module for convenient imports.
///
/// ```rust,ignore
/// use conduit::prelude::*;
/// ```
pub mod prelude {
    // Channels and messages
    pub use conduit_core::prelude::*;
    pub use conduit_core::{BoxedInterceptor, ChannelInterceptor, ChannelStats, MessageHeaders};

    // Bus
    pub use conduit_runtime::{
        BoxedEndpoint, BusStats, ConsumerPolicy, EndpointError, MessageBus, MessageEndpoint,
        RuntimeError, RuntimeResult, Subscription, handler_fn,
    };

    // Configuration and logging
    pub use conduit_runtime::config::{ConduitConfig, ConfigLoader, load_config};
    pub use conduit_runtime::logging::{LoggingBuilder, SpanEvents, init_from_config};

    // Logging macros
    pub use conduit_runtime::tracing::{debug, error, info, instrument, trace, warn};
}
