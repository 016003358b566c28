//! Runtime error types.

use conduit_core::ChannelError;
use thiserror::Error;

pub use crate::config::{ConfigError, ConfigResult};

/// Errors that can occur during bus operations.
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// No channel is registered under the name.
    #[error("Channel not found: {0}")]
    ChannelNotFound(String),

    /// A channel is already registered under the name.
    #[error("Channel already exists: {0}")]
    ChannelExists(String),

    /// No endpoint is registered under the name.
    #[error("Endpoint not found: {0}")]
    EndpointNotFound(String),

    /// An endpoint is already registered under the name.
    #[error("Endpoint already exists: {0}")]
    EndpointExists(String),

    /// Configuration or policy error.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Channel operation error.
    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;

/// Error returned by a message endpoint.
#[derive(Error, Debug)]
pub enum EndpointError {
    /// The endpoint could not process the message.
    #[error("Endpoint failed: {0}")]
    Failed(String),

    /// A channel operation performed by the endpoint failed.
    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),
}

impl EndpointError {
    /// Creates a processing failure with the given message.
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}
