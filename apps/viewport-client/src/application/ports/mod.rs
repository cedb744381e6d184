//! Port Interfaces
//!
//! Defines the interfaces the connection manager drives. Infrastructure
//! adapters implement them over tokio; tests implement them with fakes.
//!
//! ## Driven Ports (Outbound)
//!
//! - `Transport`: Opens, writes to and closes generation-tagged sockets
//! - `TimerScheduler`: Schedules and cancels one-shot timers
//!
//! Both ports are fire-and-forget: results arrive later as
//! [`TransportEvent`]s and timer expiries posted to the client event loop.

use std::time::Duration;

use crate::domain::connection::Generation;

// =============================================================================
// Transport Port
// =============================================================================

/// Errors reported synchronously by a transport.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// The socket could not be opened.
    #[error("failed to open socket: {0}")]
    Open(String),

    /// No live socket exists for the generation.
    #[error("socket {0} is not open")]
    NotOpen(Generation),

    /// The socket refused the outgoing message.
    #[error("failed to send on socket: {0}")]
    Send(String),
}

/// Something that happened on a socket, tagged with its generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportEvent {
    /// Socket instance the event belongs to.
    pub generation: Generation,
    /// What happened.
    pub kind: TransportEventKind,
}

impl TransportEvent {
    /// Create a new event.
    #[must_use]
    pub const fn new(generation: Generation, kind: TransportEventKind) -> Self {
        Self { generation, kind }
    }
}

/// Kinds of socket events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEventKind {
    /// Handshake completed.
    Opened,
    /// A text message arrived.
    Message(String),
    /// A binary message arrived.
    Binary(Vec<u8>),
    /// The peer closed the socket or the stream ended.
    Closed {
        /// Close reason, if the peer gave one.
        reason: Option<String>,
    },
    /// The socket failed to open or hit an I/O error.
    Failed(String),
}

/// Outbound socket operations.
pub trait Transport {
    /// Begin opening a socket for `generation`.
    ///
    /// Completion is reported later as [`TransportEventKind::Opened`] or
    /// [`TransportEventKind::Failed`].
    ///
    /// # Errors
    ///
    /// Returns an error if the open cannot even be attempted.
    fn open(&mut self, generation: Generation, url: &str) -> Result<(), TransportError>;

    /// Queue a text message on the socket for `generation`.
    ///
    /// # Errors
    ///
    /// Returns an error if the socket is gone or rejects the message.
    fn send(&mut self, generation: Generation, text: String) -> Result<(), TransportError>;

    /// Close the socket for `generation`, abandoning an in-flight open.
    fn close(&mut self, generation: Generation);
}

// =============================================================================
// Timer Port
// =============================================================================

/// Identifies one scheduled timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(u64);

impl TimerId {
    /// Create a timer id from a raw value.
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Raw id value.
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }
}

/// One-shot timer scheduling.
pub trait TimerScheduler {
    /// Schedule a timer; its id is posted back when `delay` elapses.
    fn schedule(&mut self, delay: Duration) -> TimerId;

    /// Cancel a pending timer. Cancelling an expired timer is a no-op.
    fn cancel(&mut self, id: TimerId);
}
