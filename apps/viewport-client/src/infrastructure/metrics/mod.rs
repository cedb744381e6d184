//! Prometheus Metrics Module
//!
//! Exposes viewport client metrics in Prometheus format.
//!
//! # Metrics Categories
//!
//! - **Frames**: Frames received and their payload sizes
//! - **Connection**: Current state and reconnect attempts
//! - **Errors**: Decode failures and command send failures
//!
//! Recording functions are no-ops until a recorder is installed, so the
//! library can be embedded without metrics.

use std::net::SocketAddr;
use std::sync::OnceLock;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

use crate::domain::connection::ConnectionState;

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Metrics initialization error.
#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    /// Prometheus exporter could not be built.
    #[error("failed to build Prometheus exporter: {0}")]
    Build(#[from] BuildError),
    /// Another global recorder is already installed.
    #[error("failed to install metrics recorder: {0}")]
    Install(String),
}

/// Initialize the Prometheus metrics recorder.
///
/// With a port, metrics are also served over HTTP on `0.0.0.0:<port>`.
/// Calling this again returns the handle installed by the first call.
///
/// # Errors
///
/// Returns an error if the exporter cannot be built or a different
/// recorder is already installed.
pub fn init_metrics(port: Option<u16>) -> Result<PrometheusHandle, MetricsError> {
    if let Some(handle) = PROMETHEUS_HANDLE.get() {
        return Ok(handle.clone());
    }

    let builder = PrometheusBuilder::new();
    let handle = match port {
        Some(port) => {
            let addr = SocketAddr::from(([0, 0, 0, 0], port));
            let (recorder, exporter) = builder.with_http_listener(addr).build()?;
            let handle = recorder.handle();
            metrics::set_global_recorder(recorder)
                .map_err(|e| MetricsError::Install(e.to_string()))?;

            tokio::spawn(async move {
                if let Err(e) = exporter.await {
                    tracing::error!(error = ?e, "Metrics exporter stopped");
                }
            });
            tracing::info!(%addr, "Prometheus metrics listening");
            handle
        }
        None => builder.install_recorder()?,
    };

    register_metrics();
    Ok(PROMETHEUS_HANDLE.get_or_init(|| handle).clone())
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    describe_counter!(
        "viewport_client_frames_received_total",
        "Total viewport frames delivered to the frame sink"
    );
    describe_histogram!(
        "viewport_client_frame_bytes",
        "Decoded size of viewport frames in bytes"
    );

    describe_gauge!(
        "viewport_client_connection_state",
        "Connection state (0=disconnected 1=connecting 2=connected 3=reconnect_pending 4=closing 5=closed)"
    );
    describe_counter!(
        "viewport_client_reconnects_total",
        "Total reconnection attempts scheduled"
    );

    describe_counter!(
        "viewport_client_decode_failures_total",
        "Total inbound messages dropped as malformed"
    );
    describe_counter!(
        "viewport_client_command_send_failures_total",
        "Total commands that could not be written to the socket"
    );
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Record a frame delivered to the sink.
pub fn record_frame_received(bytes: usize) {
    counter!("viewport_client_frames_received_total").increment(1);
    #[allow(clippy::cast_precision_loss)]
    histogram!("viewport_client_frame_bytes").record(bytes as f64);
}

/// Record a malformed inbound message.
pub fn record_decode_failure(reason: &'static str) {
    counter!(
        "viewport_client_decode_failures_total",
        "reason" => reason
    )
    .increment(1);
}

/// Record a scheduled reconnection attempt.
pub fn record_reconnect() {
    counter!("viewport_client_reconnects_total").increment(1);
}

/// Update the connection state gauge.
pub fn set_connection_state(state: ConnectionState) {
    gauge!("viewport_client_connection_state").set(state.as_gauge());
}

/// Record a command the transport refused.
pub fn record_command_send_failure(cmd: &str) {
    counter!(
        "viewport_client_command_send_failures_total",
        "cmd" => cmd.to_string()
    )
    .increment(1);
}

// =============================================================================
// Tests
// =============================================================================
