//! Configuration module for the Conduit runtime.
//!
//! This module provides figment-based configuration loading and validation
//! for logging, the message bus and pre-declared channels.

pub mod error;
pub mod loader;
pub mod schema;
pub mod validation;

pub use error::{ConfigError, ConfigResult};
pub use loader::{ConfigLoader, Profile, load_config, load_config_from_file};
pub use schema::{
    BusConfig, ChannelConfig, ConduitConfig, LogFormat, LogLevel, LogOutput, LogRotation,
    LoggingConfig, SpanEventConfig,
};
pub use validation::{validate_config, validate_policy};
