//! Reconnection Policy
//!
//! Fixed-delay reconnection for the viewport socket. Every attempt waits the
//! same `delay`, and attempts continue until the owner stops the client.

use std::time::Duration;

/// Default delay between losing the socket and the next connection attempt.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_millis(2000);

/// Configuration for reconnection behavior.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectConfig {
    /// Delay before each reconnection attempt.
    pub delay: Duration,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            delay: DEFAULT_RECONNECT_DELAY,
        }
    }
}

impl ReconnectConfig {
    /// Create a configuration with a custom delay.
    #[must_use]
    pub const fn with_delay(delay: Duration) -> Self {
        Self { delay }
    }

    /// Create configuration from `ClientConfig`.
    #[must_use]
    pub const fn from_client_config(config: &crate::ClientConfig) -> Self {
        Self::with_delay(config.reconnect_delay)
    }
}

/// Reconnection policy with a fixed delay.
///
/// # Example
///
/// ```rust
/// use viewport_client::infrastructure::viewport::reconnect::{ReconnectConfig, ReconnectPolicy};
/// use std::time::Duration;
///
/// let mut policy = ReconnectPolicy::new(ReconnectConfig::default());
///
/// assert_eq!(policy.next_delay(), Duration::from_millis(2000));
/// assert_eq!(policy.attempt_count(), 1);
///
/// // Simulate successful connection
/// policy.reset();
/// assert_eq!(policy.attempt_count(), 0);
/// ```
#[derive(Debug)]
pub struct ReconnectPolicy {
    config: ReconnectConfig,
    attempt_count: u32,
}

impl ReconnectPolicy {
    /// Create a new reconnection policy.
    #[must_use]
    pub const fn new(config: ReconnectConfig) -> Self {
        Self {
            config,
            attempt_count: 0,
        }
    }

    /// Get the delay before the next attempt and count the attempt.
    #[must_use]
    pub const fn next_delay(&mut self) -> Duration {
        self.attempt_count = self.attempt_count.saturating_add(1);
        self.config.delay
    }

    /// Reset the policy after a successful connection.
    pub const fn reset(&mut self) {
        self.attempt_count = 0;
    }

    /// Number of reconnection attempts since the last successful connection.
    #[must_use]
    pub const fn attempt_count(&self) -> u32 {
        self.attempt_count
    }

    /// Configured delay.
    #[must_use]
    pub const fn delay(&self) -> Duration {
        self.config.delay
    }
}
