//! Client Configuration Settings
//!
//! Configuration for the viewport client, loaded from environment variables.

use std::time::Duration;

use crate::infrastructure::viewport::reconnect::DEFAULT_RECONNECT_DELAY;

/// Endpoint of the rendering process in a local deployment.
pub const DEFAULT_VIEWPORT_URL: &str = "ws://127.0.0.1:7777/ws";

/// Default limit on how long a connection attempt may stay in `Connecting`.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Complete client configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// WebSocket endpoint of the rendering process.
    pub url: String,
    /// Delay before each reconnection attempt.
    pub reconnect_delay: Duration,
    /// Connect timeout (`None` = wait for the transport indefinitely).
    pub connect_timeout: Option<Duration>,
    /// Prometheus metrics port for the probe binary (0 = disabled).
    pub metrics_port: u16,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_VIEWPORT_URL.to_string(),
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            connect_timeout: Some(DEFAULT_CONNECT_TIMEOUT),
            metrics_port: 0,
        }
    }
}

impl ClientConfig {
    /// Default configuration pointed at another endpoint.
    #[must_use]
    pub fn with_url(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if `VIEWPORT_WS_URL` is set to an empty or
    /// non-WebSocket URL.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is empty or not a WebSocket URL.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let url = match lookup("VIEWPORT_WS_URL") {
            Some(url) if url.trim().is_empty() => {
                return Err(ConfigError::EmptyValue("VIEWPORT_WS_URL".to_string()));
            }
            Some(url) => url.trim().to_string(),
            None => defaults.url,
        };

        let reconnect_delay = parse_duration_millis(
            &lookup,
            "VIEWPORT_RECONNECT_DELAY_MS",
            defaults.reconnect_delay,
        );

        // 0 disables the timeout
        let connect_timeout = parse_duration_millis(
            &lookup,
            "VIEWPORT_CONNECT_TIMEOUT_MS",
            DEFAULT_CONNECT_TIMEOUT,
        );
        let connect_timeout = (!connect_timeout.is_zero()).then_some(connect_timeout);

        let metrics_port = parse_u16(&lookup, "VIEWPORT_METRICS_PORT", defaults.metrics_port);

        let config = Self {
            url,
            reconnect_delay,
            connect_timeout,
            metrics_port,
        };
        config.validate()?;
        Ok(config)
    }

    /// Check that the endpoint is a WebSocket URL.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidUrl`] for any scheme other than `ws`
    /// or `wss`.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let lower = self.url.to_ascii_lowercase();
        if lower.starts_with("ws://") || lower.starts_with("wss://") {
            Ok(())
        } else {
            Err(ConfigError::InvalidUrl(self.url.clone()))
        }
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Environment variable has empty value.
    #[error("environment variable {0} cannot be empty")]
    EmptyValue(String),
    /// Endpoint is not a WebSocket URL.
    #[error("viewport endpoint must be a ws:// or wss:// URL, got {0}")]
    InvalidUrl(String),
}

fn parse_u16<F: Fn(&str) -> Option<String>>(lookup: &F, key: &str, default: u16) -> u16 {
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn parse_duration_millis<F: Fn(&str) -> Option<String>>(
    lookup: &F,
    key: &str,
    default: Duration,
) -> Duration {
    lookup(key)
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map_or(default, Duration::from_millis)
}
