//! Configuration validation utilities.

use std::collections::HashSet;

use super::error::{ConfigError, ConfigResult};
use super::schema::{ChannelConfig, ConduitConfig, LogOutput, LoggingConfig};
use crate::policy::ConsumerPolicy;

/// Validates the entire configuration.
pub fn validate_config(config: &ConduitConfig) -> ConfigResult<()> {
    validate_logging_config(&config.logging)?;
    validate_policy(&config.bus.default_policy)?;
    validate_channels_config(&config.channels)?;
    Ok(())
}

/// Validates logging settings.
fn validate_logging_config(logging: &LoggingConfig) -> ConfigResult<()> {
    if logging.output == LogOutput::File && logging.file_path.is_none() {
        return Err(ConfigError::missing_field("logging.file_path"));
    }

    if logging.max_files == 0 {
        return Err(ConfigError::validation(
            "logging.max_files must be greater than 0",
        ));
    }

    for module in logging.filters.keys() {
        if module.is_empty() || module.contains(char::is_whitespace) {
            return Err(ConfigError::validation(format!(
                "Invalid log filter module: {module:?}"
            )));
        }
    }

    Ok(())
}

/// Validates a consumer policy.
pub fn validate_policy(policy: &ConsumerPolicy) -> ConfigResult<()> {
    if policy.max_concurrency == 0 {
        return Err(ConfigError::invalid_policy(
            "max_concurrency",
            "must be at least 1",
        ));
    }

    if policy.max_messages_per_task == 0 {
        return Err(ConfigError::invalid_policy(
            "max_messages_per_task",
            "must be at least 1",
        ));
    }

    if policy.rejection_limit == 0 {
        return Err(ConfigError::invalid_policy(
            "rejection_limit",
            "must be at least 1",
        ));
    }

    Ok(())
}

/// Validates declared channels.
fn validate_channels_config(channels: &[ChannelConfig]) -> ConfigResult<()> {
    let mut seen_names = HashSet::new();

    for channel in channels {
        if channel.name.is_empty() {
            return Err(ConfigError::missing_field("channels.name"));
        }

        if channel.name.contains(char::is_whitespace) {
            return Err(ConfigError::validation(format!(
                "Channel name cannot contain whitespace: {:?}",
                channel.name
            )));
        }

        if !seen_names.insert(&channel.name) {
            return Err(ConfigError::DuplicateChannel(channel.name.clone()));
        }
    }

    Ok(())
}
