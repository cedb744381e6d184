//! Viewport Probe Binary
//!
//! Connects to a rendering process, subscribes to the viewport stream and
//! logs every state change and frame until interrupted.
//!
//! # Usage
//!
//! ```bash
//! cargo run -p viewport-client --bin viewport-probe
//! ```
//!
//! # Environment Variables
//!
//! - `VIEWPORT_WS_URL`: Rendering process endpoint (default: <ws://127.0.0.1:7777/ws>)
//! - `VIEWPORT_RECONNECT_DELAY_MS`: Delay between reconnects (default: 2000)
//! - `VIEWPORT_CONNECT_TIMEOUT_MS`: Connect timeout, 0 disables (default: 10000)
//! - `VIEWPORT_METRICS_PORT`: Prometheus metrics port, 0 disables (default: 0)
//! - `OTEL_ENABLED`: Export traces over OTLP (default: false)
//! - `OTEL_EXPORTER_OTLP_ENDPOINT`: OTLP endpoint (default: <http://localhost:4317>)
//! - `OTEL_SERVICE_NAME`: Service name (default: kenga-viewport-probe)
//! - `RUST_LOG`: Log level (default: info)

use anyhow::Context;
use tokio::signal;
use tokio::sync::watch;
use viewport_client::infrastructure::telemetry;
use viewport_client::{
    ClientConfig, ConnectionState, ViewportClient, ViewportSnapshot, init_metrics,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("failed to install rustls crypto provider"))?;

    load_dotenv();

    let _telemetry_guard = telemetry::init();

    tracing::info!("Starting viewport probe");

    let config = ClientConfig::from_env().context("invalid viewport configuration")?;
    log_config(&config);

    let _metrics_handle = if config.metrics_port == 0 {
        None
    } else {
        Some(init_metrics(Some(config.metrics_port)).context("failed to start metrics exporter")?)
    };

    let client = ViewportClient::spawn(config);
    let snapshots = client.subscribe();
    client.start().await?;

    tokio::select! {
        () = watch_snapshots(snapshots) => {
            tracing::warn!("Viewport client stopped on its own");
        }
        () = await_shutdown() => {}
    }

    client.shutdown().await;

    tracing::info!("Viewport probe stopped");
    Ok(())
}

/// Log state transitions and frame arrivals until the client closes.
async fn watch_snapshots(mut snapshots: watch::Receiver<ViewportSnapshot>) {
    let mut last_state = ConnectionState::Disconnected;
    let mut last_count = 0;

    while snapshots.changed().await.is_ok() {
        let snapshot = snapshots.borrow_and_update().clone();

        if snapshot.state != last_state {
            tracing::info!(
                from = %last_state,
                to = %snapshot.state,
                status = %snapshot.status_text(),
                "Viewport state changed"
            );
            last_state = snapshot.state;
        }

        if snapshot.frames_received != last_count {
            last_count = snapshot.frames_received;
            if let Some(frame) = &snapshot.frame {
                tracing::info!(
                    frames = last_count,
                    bytes = frame.len(),
                    mime = frame.encoding().mime_type(),
                    "Viewport frame"
                );
            }
        }

        if let Some(error) = &snapshot.error {
            tracing::debug!(%error, "Viewport error reported");
        }

        if snapshot.state.is_terminal() {
            return;
        }
    }
}

/// Load .env file from current or ancestor directories.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Log the parsed configuration.
fn log_config(config: &ClientConfig) {
    tracing::info!(
        url = %config.url,
        reconnect_delay_ms = config.reconnect_delay.as_millis(),
        connect_timeout_ms = config.connect_timeout.map(|t| t.as_millis()),
        metrics_port = config.metrics_port,
        "Configuration loaded"
    );
}

/// Wait for shutdown signal (SIGTERM or SIGINT).
async fn await_shutdown() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, stopping viewport client");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, stopping viewport client");
        }
    }
}
