//! Reconnection Policy
//!
//! Fixed backoff between reconnect attempts, with optional jitter. The
//! number of attempts is bounded by the connection's `RetryBudget`, not by
//! this policy.

use std::time::Duration;

use rand::Rng;

use crate::domain::connection::DEFAULT_MAX_RETRIES;

/// Default wait between an abnormal closure and the next connect.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Configuration for reconnection behavior.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectConfig {
    /// Wait before each reconnect attempt.
    pub delay: Duration,
    /// Consecutive abnormal closures tolerated before giving up.
    pub max_retries: u32,
    /// Jitter factor as a fraction (e.g., 0.1 = ±10% randomization).
    pub jitter_factor: f64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            delay: DEFAULT_RECONNECT_DELAY,
            max_retries: DEFAULT_MAX_RETRIES,
            jitter_factor: 0.0,
        }
    }
}

impl ReconnectConfig {
    /// Create configuration from `StreamSettings`.
    #[must_use]
    pub const fn from_stream_settings(settings: &crate::StreamSettings) -> Self {
        Self {
            delay: settings.reconnect_delay,
            max_retries: settings.max_retries,
            jitter_factor: settings.reconnect_jitter,
        }
    }
}

/// Computes the wait before each reconnect.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    config: ReconnectConfig,
}

impl ReconnectPolicy {
    /// Create a new reconnection policy.
    #[must_use]
    pub const fn new(config: ReconnectConfig) -> Self {
        Self { config }
    }

    /// Configured retry limit.
    #[must_use]
    pub const fn max_retries(&self) -> u32 {
        self.config.max_retries
    }

    /// Backoff before the next attempt.
    #[must_use]
    pub fn delay(&self) -> Duration {
        self.apply_jitter(self.config.delay)
    }

    fn apply_jitter(&self, duration: Duration) -> Duration {
        if self.config.jitter_factor <= 0.0 || duration.is_zero() {
            return duration;
        }

        #[allow(clippy::cast_precision_loss)]
        let base_millis = duration.as_millis() as f64;
        let jitter_range = base_millis * self.config.jitter_factor;
        let jitter: f64 = rand::rng().random_range(-jitter_range..=jitter_range);
        let adjusted_millis = (base_millis + jitter).max(1.0);

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let adjusted_u64 = adjusted_millis as u64;
        Duration::from_millis(adjusted_u64)
    }
}
