//! Viewport Protocol Message Types
//!
//! Wire format types for the rendering process WebSocket API.
//!
//! # Message Types
//!
//! ## Commands (client -> server)
//! - `subscribe_viewport`: Start receiving rendered frames
//! - `unsubscribe_viewport`: Stop receiving rendered frames
//!
//! ## Events (server -> client)
//! - `viewport_frame`: One rendered frame as base64 PNG
//! - anything else: ignored, the protocol may grow new events
//!
//! ## Acknowledgements (server -> client)
//! - `{"ok": true, "cmd": "..."}`: sent after every command

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::frame::Frame;

/// Event name carrying rendered frames.
pub const VIEWPORT_FRAME_EVENT: &str = "viewport_frame";

// =============================================================================
// Commands
// =============================================================================

/// Commands understood by the rendering process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewportCommand {
    /// Start streaming frames to this connection.
    SubscribeViewport,
    /// Stop streaming frames to this connection.
    UnsubscribeViewport,
}

impl ViewportCommand {
    /// Wire name of the command.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::SubscribeViewport => "subscribe_viewport",
            Self::UnsubscribeViewport => "unsubscribe_viewport",
        }
    }
}

/// Outgoing command envelope.
///
/// # Wire Format (JSON)
/// ```json
/// {"cmd": "subscribe_viewport"}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandEnvelope {
    /// Command name.
    pub cmd: ViewportCommand,
}

impl CommandEnvelope {
    /// Wrap a command.
    #[must_use]
    pub const fn new(cmd: ViewportCommand) -> Self {
        Self { cmd }
    }
}

// =============================================================================
// Server Messages
// =============================================================================

/// Raw server envelope before the event name is inspected.
///
/// Events carry `event` and `data`; acknowledgements carry `ok`, `cmd`,
/// `request_id` and `error`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawServerEnvelope {
    /// Event name, absent on acknowledgements.
    #[serde(default)]
    pub event: Option<String>,
    /// Event payload.
    #[serde(default)]
    pub data: Value,
    /// Acknowledgement status.
    #[serde(default)]
    pub ok: Option<bool>,
    /// Acknowledged command.
    #[serde(default)]
    pub cmd: Option<String>,
    /// Request id echoed back by the server.
    #[serde(default)]
    pub request_id: Option<String>,
    /// Error text on a negative acknowledgement.
    #[serde(default)]
    pub error: Option<String>,
}

/// Payload of a `viewport_frame` event.
///
/// # Wire Format (JSON)
/// ```json
/// {"frame": "iVBORw0KGgo..."}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FramePayload {
    /// Base64-encoded PNG.
    pub frame: String,
}

/// Acknowledgement of a previously sent command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandAck {
    /// Whether the command was accepted.
    pub ok: bool,
    /// Acknowledged command name.
    pub cmd: Option<String>,
    /// Request id, if one was sent.
    pub request_id: Option<String>,
    /// Error text on rejection.
    pub error: Option<String>,
}

/// Decoded server message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerMessage {
    /// A validated viewport frame.
    ViewportFrame(Frame),
    /// A command acknowledgement.
    Ack(CommandAck),
    /// An event this client does not handle.
    Event {
        /// Event name.
        name: String,
    },
}
