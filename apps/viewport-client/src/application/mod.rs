//! Application Layer - Port definitions and services.
//!
//! This layer defines how the connection manager reaches the outside world
//! and holds the services that present state to callers.

/// Port interfaces for sockets and timers.
pub mod ports;

/// Application services (frame sink).
pub mod services;
