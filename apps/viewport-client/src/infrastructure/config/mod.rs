//! Configuration Module
//!
//! Configuration loading for the viewport client and probe binary.

mod settings;

pub use settings::{ClientConfig, ConfigError, DEFAULT_CONNECT_TIMEOUT, DEFAULT_VIEWPORT_URL};
