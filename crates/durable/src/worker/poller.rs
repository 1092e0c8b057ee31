//! Slot polling with exponential backoff
//!
//! Claiming a worker slot (for an activity attempt or a session binding) is
//! a poll: try every eligible worker, back off while none is free.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::reliability::duration_millis;

/// Polling configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PollerConfig {
    /// Poll interval after the first miss
    #[serde(with = "duration_millis")]
    pub min_interval: Duration,

    /// Maximum poll interval while waiting
    #[serde(with = "duration_millis")]
    pub max_interval: Duration,

    /// Backoff multiplier applied after every miss
    pub backoff_multiplier: f64,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            min_interval: Duration::from_millis(10),
            max_interval: Duration::from_secs(1),
            backoff_multiplier: 1.5,
        }
    }
}

impl PollerConfig {
    /// Create a new poller configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Set minimum poll interval
    pub fn with_min_interval(mut self, interval: Duration) -> Self {
        self.min_interval = interval;
        self
    }

    /// Set maximum poll interval
    pub fn with_max_interval(mut self, interval: Duration) -> Self {
        self.max_interval = interval;
        self
    }

    /// Set backoff multiplier
    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier.max(1.0);
        self
    }
}

/// Backoff state for one claim attempt
#[derive(Debug)]
pub(crate) struct SlotPoller {
    config: PollerConfig,
    current_interval: Duration,
}

impl SlotPoller {
    pub(crate) fn new(config: &PollerConfig) -> Self {
        Self {
            config: config.clone(),
            current_interval: config.min_interval,
        }
    }

    /// Sleep for the current interval, then grow it
    pub(crate) async fn wait(&mut self) {
        trace!(
            interval_ms = self.current_interval.as_millis() as u64,
            "No free slot, backing off"
        );
        tokio::time::sleep(self.current_interval).await;
        self.increase_backoff();
    }

    fn increase_backoff(&mut self) {
        let next = self.current_interval.as_secs_f64() * self.config.backoff_multiplier;
        self.current_interval =
            Duration::from_secs_f64(next.min(self.config.max_interval.as_secs_f64()));
    }

    #[cfg(test)]
    pub(crate) fn current_interval(&self) -> Duration {
        self.current_interval
    }
}
