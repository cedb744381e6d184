//! Viewport Stream Adapters
//!
//! Implements the live viewport streaming client:
//!
//! - **Codec**: JSON commands and events of the rendering process API
//! - **Manager**: Connection state machine with fixed-delay reconnects
//! - **Transport / Timer**: Tokio adapters for the application ports
//! - **Client**: The caller-facing handle and its event loop

pub mod client;
pub mod codec;
pub mod manager;
pub mod messages;
pub mod reconnect;
pub mod timer;
pub mod transport;

pub use client::ViewportClient;
pub use codec::{CodecError, ProtocolCodec};
pub use manager::ConnectionManager;
pub use messages::*;
pub use reconnect::{ReconnectConfig, ReconnectPolicy};
pub use timer::TokioTimerScheduler;
pub use transport::WsTransport;
