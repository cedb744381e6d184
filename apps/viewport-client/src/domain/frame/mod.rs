//! Viewport Frame Types
//!
//! A [`Frame`] is one rendered image received from the rendering process.
//! A [`ViewportSnapshot`] is everything an observer needs to draw the
//! viewport panel: the connection state, the latest frame and the latest
//! error.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::domain::connection::{ClientError, ConnectionState};

// =============================================================================
// Frame
// =============================================================================

/// Encoding of the image payload carried on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FrameEncoding {
    /// PNG image transported as a base64 string.
    #[default]
    Base64Png,
}

impl FrameEncoding {
    /// Wire name of the encoding.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Base64Png => "base64-png",
        }
    }

    /// MIME type of the decoded bytes.
    #[must_use]
    pub const fn mime_type(&self) -> &'static str {
        match self {
            Self::Base64Png => "image/png",
        }
    }
}

/// One decoded, renderable viewport image.
///
/// Frames are immutable; the bytes are shared so snapshots can be cloned
/// cheaply by every observer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    bytes: Arc<[u8]>,
    encoding: FrameEncoding,
}

impl Frame {
    /// Create a frame from decoded image bytes.
    #[must_use]
    pub fn new(bytes: impl Into<Arc<[u8]>>, encoding: FrameEncoding) -> Self {
        Self {
            bytes: bytes.into(),
            encoding,
        }
    }

    /// Decoded image bytes.
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Encoding the frame arrived in.
    #[must_use]
    pub const fn encoding(&self) -> FrameEncoding {
        self.encoding
    }

    /// Size of the decoded image in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Whether the frame holds no bytes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

// =============================================================================
// Snapshot
// =============================================================================

/// Observable state of a viewport client.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ViewportSnapshot {
    /// Current connection state.
    pub state: ConnectionState,
    /// Most recent frame, if any has arrived.
    pub frame: Option<Frame>,
    /// Most recent error, cleared on a successful connect.
    pub error: Option<ClientError>,
    /// Number of frames accepted since the client was created.
    pub frames_received: u64,
    /// When the current frame was accepted.
    pub last_frame_at: Option<DateTime<Utc>>,
}

impl ViewportSnapshot {
    /// Human-readable status line for the viewport panel.
    #[must_use]
    pub fn status_text(&self) -> String {
        match self.state {
            ConnectionState::Disconnected => "Disconnected".to_string(),
            ConnectionState::Connecting => "Connecting...".to_string(),
            ConnectionState::Connected if self.frame.is_none() => {
                "Waiting for frames...".to_string()
            }
            ConnectionState::Connected => "Live".to_string(),
            ConnectionState::ReconnectPending => match &self.error {
                Some(ClientError::Connect(reason)) => {
                    format!("Disconnected ({reason}) - retrying...")
                }
                _ => "Disconnected - retrying...".to_string(),
            },
            ConnectionState::Closing => "Closing...".to_string(),
            ConnectionState::Closed => "Closed".to_string(),
        }
    }
}
