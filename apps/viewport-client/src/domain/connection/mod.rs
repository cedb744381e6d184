//! Connection Domain Types
//!
//! Connection lifecycle states, socket generation tags and the error
//! taxonomy surfaced to callers of the viewport client.

use std::fmt;

// =============================================================================
// Connection State
// =============================================================================

/// Lifecycle state of a viewport client.
///
/// Exactly one state is active at a time. `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionState {
    /// Created but never started.
    #[default]
    Disconnected,
    /// A socket is being opened.
    Connecting,
    /// Socket open and subscribed to viewport frames.
    Connected,
    /// Socket lost; a reconnect attempt is scheduled.
    ReconnectPending,
    /// Explicit stop in progress.
    Closing,
    /// Torn down. A new client must be created to reconnect.
    Closed,
}

impl ConnectionState {
    /// Get the state name for logs and metrics.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::ReconnectPending => "reconnect_pending",
            Self::Closing => "closing",
            Self::Closed => "closed",
        }
    }

    /// Whether the client has been stopped (or is stopping).
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Closing | Self::Closed)
    }

    /// Numeric code used for the connection state gauge.
    #[must_use]
    pub const fn as_gauge(&self) -> f64 {
        match self {
            Self::Disconnected => 0.0,
            Self::Connecting => 1.0,
            Self::Connected => 2.0,
            Self::ReconnectPending => 3.0,
            Self::Closing => 4.0,
            Self::Closed => 5.0,
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Generation Tag
// =============================================================================

/// Monotonically increasing tag identifying one socket instance.
///
/// Events carrying a generation other than the live one are stale and must
/// not mutate client state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Generation(u64);

impl Generation {
    /// Create a generation from a raw value.
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// The generation following this one.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0.wrapping_add(1))
    }

    /// Raw counter value.
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// =============================================================================
// Client Error
// =============================================================================

/// Errors observable by the owner of a viewport client.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClientError {
    /// The transport could not be established or was lost. Retried.
    #[error("connection error: {0}")]
    Connect(String),

    /// A message from the rendering process could not be used. The
    /// connection stays open.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// `start()` was called on a client that has already been stopped.
    #[error("viewport client already closed")]
    AlreadyClosed,
}
