//! Viewport Client
//!
//! The handle the editor holds for one viewport panel. It spawns a single
//! event loop task that owns the [`ConnectionManager`] and feeds it caller
//! commands, socket events and timer expiries one at a time.
//!
//! # Example
//!
//! ```rust,no_run
//! use viewport_client::{ClientConfig, ViewportClient};
//!
//! async fn example() -> Result<(), viewport_client::ClientError> {
//!     let client = ViewportClient::spawn(ClientConfig::default());
//!     client.start().await?;
//!
//!     let mut snapshots = client.subscribe();
//!     while snapshots.changed().await.is_ok() {
//!         let snapshot = snapshots.borrow_and_update().clone();
//!         println!("{}", snapshot.status_text());
//!     }
//!
//!     client.shutdown().await;
//!     Ok(())
//! }
//! ```

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::manager::ConnectionManager;
use super::timer::TokioTimerScheduler;
use super::transport::WsTransport;
use crate::ClientConfig;
use crate::application::ports::{TimerId, TransportEvent};
use crate::application::services::FrameSink;
use crate::domain::connection::{ClientError, ConnectionState};
use crate::domain::frame::ViewportSnapshot;

/// Capacity of the socket event channel.
const SOCKET_EVENT_CAPACITY: usize = 64;

/// Capacity of the command and timer channels.
const CONTROL_CAPACITY: usize = 8;

/// Requests from the handle to the event loop.
#[derive(Debug)]
enum Command {
    Start(oneshot::Sender<Result<(), ClientError>>),
    Stop(oneshot::Sender<()>),
}

/// Handle to a running viewport stream client.
///
/// Dropping the handle tears the client down.
#[derive(Debug)]
pub struct ViewportClient {
    commands: mpsc::Sender<Command>,
    snapshots: watch::Receiver<ViewportSnapshot>,
    shutdown: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl ViewportClient {
    /// Create a client and spawn its event loop. The client stays
    /// `Disconnected` until [`ViewportClient::start`] is called.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    #[must_use]
    pub fn spawn(config: ClientConfig) -> Self {
        let (command_tx, command_rx) = mpsc::channel(CONTROL_CAPACITY);
        let (socket_tx, socket_rx) = mpsc::channel(SOCKET_EVENT_CAPACITY);
        let (timer_tx, timer_rx) = mpsc::channel(CONTROL_CAPACITY);

        let sink = FrameSink::new();
        let snapshots = sink.subscribe();
        let manager = ConnectionManager::new(
            &config,
            WsTransport::new(socket_tx),
            TokioTimerScheduler::new(timer_tx),
            sink,
        );

        let shutdown = CancellationToken::new();
        let task = tokio::spawn(run_event_loop(
            manager,
            command_rx,
            socket_rx,
            timer_rx,
            shutdown.clone(),
        ));

        Self {
            commands: command_tx,
            snapshots,
            shutdown,
            task: Some(task),
        }
    }

    /// Start streaming.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::AlreadyClosed`] if the client has been stopped.
    pub async fn start(&self) -> Result<(), ClientError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.commands
            .send(Command::Start(reply_tx))
            .await
            .map_err(|_| ClientError::AlreadyClosed)?;
        reply_rx.await.unwrap_or(Err(ClientError::AlreadyClosed))
    }

    /// Stop streaming and release the socket and any pending timer.
    ///
    /// Idempotent; returns once the client is `Closed`.
    pub async fn stop(&self) {
        let (reply_tx, reply_rx) = oneshot::channel();
        if self.commands.send(Command::Stop(reply_tx)).await.is_ok() {
            let _ = reply_rx.await;
        }
    }

    /// Stop the client and wait for its event loop to finish.
    pub async fn shutdown(mut self) {
        self.stop().await;
        if let Some(task) = self.task.take()
            && let Err(e) = task.await
        {
            tracing::error!(error = %e, "Viewport event loop panicked");
        }
    }

    /// Subscribe to snapshot changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ViewportSnapshot> {
        self.snapshots.clone()
    }

    /// Latest snapshot.
    #[must_use]
    pub fn snapshot(&self) -> ViewportSnapshot {
        self.snapshots.borrow().clone()
    }

    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.snapshots.borrow().state
    }
}

impl Drop for ViewportClient {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// Serialize every input to the manager until it reaches `Closed`.
async fn run_event_loop(
    mut manager: ConnectionManager<WsTransport, TokioTimerScheduler>,
    mut commands: mpsc::Receiver<Command>,
    mut socket_events: mpsc::Receiver<TransportEvent>,
    mut timer_events: mpsc::Receiver<TimerId>,
    shutdown: CancellationToken,
) {
    tracing::debug!("Viewport event loop started");

    loop {
        tokio::select! {
            biased;
            () = shutdown.cancelled() => {
                tracing::debug!("Viewport client handle dropped");
                manager.stop();
            }
            command = commands.recv() => match command {
                Some(Command::Start(reply)) => {
                    let _ = reply.send(manager.start());
                }
                Some(Command::Stop(reply)) => {
                    manager.stop();
                    let _ = reply.send(());
                }
                None => manager.stop(),
            },
            Some(event) = socket_events.recv() => manager.handle_transport_event(event),
            Some(id) = timer_events.recv() => manager.handle_timer(id),
        }

        if manager.state() == ConnectionState::Closed {
            break;
        }
    }

    tracing::debug!("Viewport event loop finished");
}
