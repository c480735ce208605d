//! Exponential reconnect backoff

use core::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::RealtimeConfig;

/// Backoff configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackoffConfig {
    /// Delay after the first failure
    pub initial_delay: Duration,
    /// Cap on the delay
    pub max_delay: Duration,
    /// Growth factor per consecutive failure
    pub multiplier: u32,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            multiplier: 2,
        }
    }
}

impl From<&RealtimeConfig> for BackoffConfig {
    fn from(config: &RealtimeConfig) -> Self {
        Self {
            initial_delay: Duration::from_millis(config.backoff_min_ms),
            max_delay: Duration::from_millis(config.backoff_max_ms),
            multiplier: 2,
        }
    }
}

/// Delay tracker for consecutive connection failures
#[derive(Debug, Clone)]
pub struct ReconnectBackoff {
    config: BackoffConfig,
    current_delay: Duration,
    attempt_count: u32,
}

impl ReconnectBackoff {
    pub fn new(config: BackoffConfig) -> Self {
        let current_delay = config.initial_delay;
        Self {
            config,
            current_delay,
            attempt_count: 0,
        }
    }

    /// Delay before the next attempt; grows for the one after
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current_delay;
        self.attempt_count = self.attempt_count.saturating_add(1);
        self.current_delay = self
            .current_delay
            .saturating_mul(self.config.multiplier.max(1))
            .min(self.config.max_delay);
        delay
    }

    /// Delay the next failure would yield, without consuming it
    pub fn peek_delay(&self) -> Duration {
        self.current_delay
    }

    /// Back to the minimum after a successful connect
    pub fn reset(&mut self) {
        self.current_delay = self.config.initial_delay;
        self.attempt_count = 0;
    }

    /// Consecutive failures since the last reset
    pub fn attempt_count(&self) -> u32 {
        self.attempt_count
    }
}
