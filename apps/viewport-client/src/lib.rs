#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::needless_pass_by_value,
        clippy::items_after_statements
    )
)]

//! Viewport Client - Live Viewport Frame Streaming
//!
//! Keeps an editor's viewport panel fed with frames rendered by a separate
//! rendering process. The client holds one persistent WebSocket, subscribes
//! to the viewport stream, decodes each base64 PNG frame and keeps only the
//! latest one. Lost connections are retried after a fixed delay until the
//! client is stopped.
//!
//! # Layers (inside to outside)
//!
//! - **Domain**: Connection states, generations, frames and snapshots
//!
//! - **Application**: Port definitions and services
//!   - `ports`: Socket transport and timer scheduler interfaces
//!   - `services`: Frame sink holding the latest snapshot
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `viewport`: Protocol codec, connection manager, tokio adapters, client handle
//!   - `config`: Environment-driven configuration
//!   - `metrics`: Prometheus instrumentation
//!   - `telemetry`: Logging and OpenTelemetry tracing
//!
//! # Data Flow
//!
//! ```text
//! rendering process --ws--> WsTransport --events--> ConnectionManager
//!                                                      |  ProtocolCodec
//!                                                      v
//!                      editor panel <--watch-- FrameSink
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Core viewport types with no I/O.
pub mod domain;

/// Application layer - Port definitions and services.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::connection::{ClientError, ConnectionState, Generation};
pub use domain::frame::{Frame, FrameEncoding, ViewportSnapshot};

// Application
pub use application::ports::{
    TimerId, TimerScheduler, Transport, TransportError, TransportEvent, TransportEventKind,
};
pub use application::services::FrameSink;

// Infrastructure config
pub use infrastructure::config::{ClientConfig, ConfigError};

// Viewport client
pub use infrastructure::viewport::{
    CodecError, ConnectionManager, ProtocolCodec, ServerMessage, ViewportClient, ViewportCommand,
};

// Metrics
pub use infrastructure::metrics::{MetricsError, init_metrics};

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
