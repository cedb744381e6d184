//! Domain Layer - Core viewport streaming types.
//!
//! This layer contains the connection lifecycle and frame types with no
//! I/O. Everything here is plain data.

/// Connection states, generation tags and client errors.
pub mod connection;

/// Rendered frames and observable snapshots.
pub mod frame;
