//! Reconnection policy for push streams.
//!
//! A dropped stream is reopened at once. Only when reopening itself fails do
//! later attempts back off, so a healthy server sees exactly one new
//! connection per disconnect while an unreachable one is not hammered.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::sleep;
use tracing::debug;

use crate::{DEFAULT_RECONNECT_DELAY, MAX_RECONNECT_DELAY, StreamError, StreamResult};

/// Reconnection configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectConfig {
    /// Maximum number of consecutive attempts; `None` retries forever.
    pub max_attempts: Option<u32>,
    /// Delay before the second attempt. The first attempt is immediate.
    #[serde(with = "crate::duration_ms")]
    pub initial_delay: Duration,
    /// Maximum delay between attempts.
    #[serde(with = "crate::duration_ms")]
    pub max_delay: Duration,
    /// Backoff multiplier.
    pub backoff_multiplier: f64,
    /// Whether to add jitter.
    pub jitter: bool,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: None,
            initial_delay: DEFAULT_RECONNECT_DELAY,
            max_delay: MAX_RECONNECT_DELAY,
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

impl ReconnectConfig {
    /// Create a new reconnection configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set maximum attempts.
    #[must_use]
    pub const fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = Some(attempts);
        self
    }

    /// Set initial delay.
    #[must_use]
    pub const fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Set maximum delay.
    #[must_use]
    pub const fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Set backoff multiplier.
    #[must_use]
    pub const fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Enable or disable jitter.
    #[must_use]
    pub const fn with_jitter(mut self, enabled: bool) -> Self {
        self.jitter = enabled;
        self
    }

    /// Delay before the given attempt (0-based).
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let exponent = i32::try_from(attempt - 1).unwrap_or(i32::MAX);
        let base = self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(exponent);
        let capped = base.min(self.max_delay.as_secs_f64());

        let delay = if self.jitter {
            // 0.5x to 1.5x
            let jitter = 0.5 + rand::random::<f64>();
            capped * jitter
        } else {
            capped
        };

        Duration::from_secs_f64(delay)
    }
}

/// Tracks consecutive attempts for one disconnect.
#[derive(Debug)]
pub struct ReconnectHandler {
    config: ReconnectConfig,
    attempts: u32,
}

impl ReconnectHandler {
    /// Create a new reconnection handler.
    #[must_use]
    pub const fn new(config: ReconnectConfig) -> Self {
        Self {
            config,
            attempts: 0,
        }
    }

    /// Get the current attempt count.
    #[must_use]
    pub const fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Check if another attempt is allowed.
    #[must_use]
    pub fn can_reconnect(&self) -> bool {
        self.config
            .max_attempts
            .is_none_or(|max| self.attempts < max)
    }

    /// Wait for the next attempt slot.
    pub async fn wait_for_reconnect(&mut self) -> StreamResult<()> {
        if !self.can_reconnect() {
            return Err(StreamError::ReconnectLimitExceeded {
                attempts: self.attempts,
            });
        }

        let delay = self.config.delay_for_attempt(self.attempts);
        if !delay.is_zero() {
            debug!(
                attempt = self.attempts,
                delay_ms = delay.as_millis(),
                "Waiting before reconnection"
            );
            sleep(delay).await;
        }
        self.attempts += 1;

        Ok(())
    }
}
