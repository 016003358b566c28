//! Conduit Runtime - message bus and runtime configuration for Conduit.
//!
//! This crate provides:
//! - A registry of named channels and endpoints (`MessageBus`)
//! - Polling consumers that move messages from channels to endpoints
//!   (`Subscription`, `ConsumerPolicy`)
//! - Async message endpoints (`MessageEndpoint`, `handler_fn`)
//! - figment-based configuration loading (`ConfigLoader`)
//! - Logging configuration
//!
//! ```ignore
//! use std::sync::Arc;
//! use conduit_runtime::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), RuntimeError> {
//!     let bus = MessageBus::<String>::builder().build()?;
//!
//!     bus.register_endpoint(
//!         "audit",
//!         Arc::new(handler_fn(|msg: Message<String>| async move {
//!             info!(payload = %msg.payload(), "Audited");
//!             Ok(())
//!         })
//!         .input_channel("events")),
//!     )
//!     .await?;
//!
//!     bus.run_until(async { tokio::signal::ctrl_c().await.ok(); }).await
//! }
//! ```

pub mod bus;
pub mod config;
pub mod endpoint;
pub mod error;
mod executor;
pub mod logging;
pub mod policy;

// Re-exports
pub use bus::{BusBuilder, BusStats, MessageBus, Subscription};
pub use config::{BusConfig, ChannelConfig, ConduitConfig, ConfigLoader, LoggingConfig};
pub use endpoint::{BoxedEndpoint, FnEndpoint, MessageEndpoint, handler_fn};
pub use error::{ConfigError, ConfigResult, EndpointError, RuntimeError, RuntimeResult};
pub use logging::{LoggingBuilder, SpanEvents};
pub use policy::ConsumerPolicy;

// Re-export tracing for use by other crates
pub use tracing;
pub use tracing_subscriber;

/// Prelude module for convenient imports.
///
/// Includes the bus types, the core channel types and the `tracing` macros.
pub mod prelude {
    pub use crate::{
        BoxedEndpoint, ConsumerPolicy, EndpointError, MessageBus, MessageEndpoint, RuntimeError,
        Subscription, handler_fn,
    };
    pub use conduit_core::prelude::*;
    pub use tracing::{Level, debug, error, info, instrument, span, trace, warn};
}
