//! Viewport Protocol Codec
//!
//! Pure translation between typed commands/events and JSON text messages.
//!
//! A `viewport_frame` payload arrives in one of two shapes, both accepted:
//!
//! ```json
//! {"event":"viewport_frame","data":{"frame":"QQ=="}}
//! {"event":"viewport_frame","data":"{\"frame\":\"QQ==\"}"}
//! ```
//!
//! Decode failures are returned as values and never abort the connection.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde_json::Value;

use super::messages::{
    CommandAck, CommandEnvelope, FramePayload, RawServerEnvelope, ServerMessage,
    VIEWPORT_FRAME_EVENT, ViewportCommand,
};
use crate::domain::frame::{Frame, FrameEncoding};

/// Codec errors (decode failures).
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// JSON encoding/decoding failed.
    #[error("JSON codec error: {0}")]
    Json(#[from] serde_json::Error),

    /// Message is not a JSON object.
    #[error("invalid message format: {0}")]
    InvalidFormat(String),

    /// Message is neither an event nor an acknowledgement.
    #[error("message has no event name")]
    MissingEvent,

    /// Frame payload did not have the expected shape.
    #[error("invalid frame payload: {0}")]
    InvalidFrame(String),

    /// Frame payload was not valid base64.
    #[error("frame is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),

    /// Frame payload decoded to nothing.
    #[error("frame is empty")]
    EmptyFrame,
}

impl CodecError {
    /// Short label for metrics.
    #[must_use]
    pub const fn reason(&self) -> &'static str {
        match self {
            Self::Json(_) => "json",
            Self::InvalidFormat(_) => "format",
            Self::MissingEvent => "missing_event",
            Self::InvalidFrame(_) => "invalid_frame",
            Self::Base64(_) => "base64",
            Self::EmptyFrame => "empty_frame",
        }
    }
}

/// JSON codec for the viewport protocol.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProtocolCodec;

impl ProtocolCodec {
    /// Create a new codec.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Encode a command as a wire message.
    ///
    /// # Errors
    ///
    /// Returns an error if JSON serialization fails.
    pub fn encode_command(&self, command: ViewportCommand) -> Result<String, CodecError> {
        Ok(serde_json::to_string(&CommandEnvelope::new(command))?)
    }

    /// Decode a text message from the rendering process.
    ///
    /// # Errors
    ///
    /// Returns an error on malformed JSON, on a message that is neither an
    /// event nor an acknowledgement, or on a `viewport_frame` whose payload
    /// fails validation. Unknown events are not errors.
    pub fn decode(&self, text: &str) -> Result<ServerMessage, CodecError> {
        let trimmed = text.trim();
        if !trimmed.starts_with('{') {
            return Err(CodecError::InvalidFormat(format!(
                "expected JSON object, got: {}...",
                trimmed.chars().take(50).collect::<String>()
            )));
        }

        let raw: RawServerEnvelope = serde_json::from_str(trimmed)?;

        match raw.event {
            Some(name) if name == VIEWPORT_FRAME_EVENT => {
                self.decode_frame(raw.data).map(ServerMessage::ViewportFrame)
            }
            Some(name) => Ok(ServerMessage::Event { name }),
            None => raw.ok.map_or(Err(CodecError::MissingEvent), |ok| {
                Ok(ServerMessage::Ack(CommandAck {
                    ok,
                    cmd: raw.cmd,
                    request_id: raw.request_id,
                    error: raw.error,
                }))
            }),
        }
    }

    /// Decode a binary message holding UTF-8 JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes are not UTF-8 or fail [`Self::decode`].
    pub fn decode_bytes(&self, data: &[u8]) -> Result<ServerMessage, CodecError> {
        let text = std::str::from_utf8(data).map_err(|e| {
            CodecError::InvalidFormat(format!("binary message is not UTF-8: {e}"))
        })?;
        self.decode(text)
    }

    /// Validate a frame payload and extract the image bytes.
    fn decode_frame(&self, data: Value) -> Result<Frame, CodecError> {
        // Some senders JSON-encode the payload a second time.
        let data = match data {
            Value::String(inner) => serde_json::from_str::<Value>(&inner)
                .map_err(|e| CodecError::InvalidFrame(format!("nested payload: {e}")))?,
            other => other,
        };

        let payload: FramePayload =
            serde_json::from_value(data).map_err(|e| CodecError::InvalidFrame(e.to_string()))?;

        if payload.frame.is_empty() {
            return Err(CodecError::EmptyFrame);
        }

        let bytes = STANDARD.decode(payload.frame.as_bytes())?;
        if bytes.is_empty() {
            return Err(CodecError::EmptyFrame);
        }

        Ok(Frame::new(bytes, FrameEncoding::Base64Png))
    }
}
