//! Consumer policies.
//!
//! A [`ConsumerPolicy`] controls how a subscription's dispatcher polls its
//! channel and how many endpoint invocations it allows at once.
//!
//! ```text
//! initial_delay ─▶ ┌ run ──────────────────────────────┐ ─▶ period ─▶ run ─▶ ...
//!                  │ receive ≤ max_messages_per_task   │
//!                  │ (each waits ≤ receive_timeout)    │
//!                  └───────────────────────────────────┘
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Polling and concurrency settings for one subscription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsumerPolicy {
    /// Maximum concurrent endpoint invocations.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// Maximum messages received per scheduled run.
    #[serde(default = "default_max_messages_per_task")]
    pub max_messages_per_task: usize,

    /// How long each receive waits, in milliseconds. Zero polls without waiting.
    #[serde(default = "default_receive_timeout_ms")]
    pub receive_timeout_ms: u64,

    /// Pause between runs, in milliseconds. Zero starts the next run immediately.
    #[serde(default)]
    pub period_ms: u64,

    /// Delay before the first run, in milliseconds.
    #[serde(default)]
    pub initial_delay_ms: u64,

    /// Measure `period_ms` from the start of each run instead of its end.
    #[serde(default)]
    pub fixed_rate: bool,

    /// Rejected submissions tolerated before backing off.
    #[serde(default = "default_rejection_limit")]
    pub rejection_limit: u32,

    /// Back-off after `rejection_limit` rejections, in milliseconds.
    #[serde(default = "default_rejection_limit_wait_ms")]
    pub rejection_limit_wait_ms: u64,
}

impl Default for ConsumerPolicy {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
            max_messages_per_task: default_max_messages_per_task(),
            receive_timeout_ms: default_receive_timeout_ms(),
            period_ms: 0,
            initial_delay_ms: 0,
            fixed_rate: false,
            rejection_limit: default_rejection_limit(),
            rejection_limit_wait_ms: default_rejection_limit_wait_ms(),
        }
    }
}

impl ConsumerPolicy {
    /// Sets the maximum concurrent endpoint invocations (builder pattern).
    pub fn max_concurrency(mut self, max: usize) -> Self {
        self.max_concurrency = max;
        self
    }

    /// Sets the maximum messages per run (builder pattern).
    pub fn max_messages_per_task(mut self, max: usize) -> Self {
        self.max_messages_per_task = max;
        self
    }

    /// Sets the per-receive wait (builder pattern).
    pub fn receive_timeout(mut self, timeout: Duration) -> Self {
        self.receive_timeout_ms = duration_ms(timeout);
        self
    }

    /// Sets the pause between runs (builder pattern).
    pub fn period(mut self, period: Duration) -> Self {
        self.period_ms = duration_ms(period);
        self
    }

    /// Sets the delay before the first run (builder pattern).
    pub fn initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay_ms = duration_ms(delay);
        self
    }

    /// Switches between fixed-rate and fixed-delay scheduling (builder pattern).
    pub fn fixed_rate(mut self, fixed_rate: bool) -> Self {
        self.fixed_rate = fixed_rate;
        self
    }

    /// Sets the rejection limit and the back-off that follows it (builder pattern).
    pub fn rejection_limit(mut self, limit: u32, wait: Duration) -> Self {
        self.rejection_limit = limit;
        self.rejection_limit_wait_ms = duration_ms(wait);
        self
    }

    /// How long each receive waits for a message.
    pub fn receive_timeout_duration(&self) -> Duration {
        Duration::from_millis(self.receive_timeout_ms)
    }

    /// Interval between scheduled runs. Zero polls continuously.
    pub fn period_duration(&self) -> Duration {
        Duration::from_millis(self.period_ms)
    }

    /// Delay before the first run after start.
    pub fn initial_delay_duration(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    /// Back-off applied once the executor has rejected `rejection_limit` submissions.
    pub fn rejection_limit_wait_duration(&self) -> Duration {
        Duration::from_millis(self.rejection_limit_wait_ms)
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

fn default_max_concurrency() -> usize {
    10
}

fn default_max_messages_per_task() -> usize {
    10
}

fn default_receive_timeout_ms() -> u64 {
    1000
}

fn default_rejection_limit() -> u32 {
    5
}

fn default_rejection_limit_wait_ms() -> u64 {
    1000
}
