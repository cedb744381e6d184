//! Frame Sink
//!
//! Single-slot cache for the latest viewport frame and connection status.
//! Backed by a `watch` channel: observers always see the newest value and
//! superseded frames are simply overwritten.

use chrono::Utc;
use tokio::sync::watch;

use crate::domain::connection::{ClientError, ConnectionState};
use crate::domain::frame::{Frame, ViewportSnapshot};

/// Latest-value store for frames and status.
#[derive(Debug)]
pub struct FrameSink {
    tx: watch::Sender<ViewportSnapshot>,
}

impl Default for FrameSink {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameSink {
    /// Create an empty sink in the `Disconnected` state.
    #[must_use]
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(ViewportSnapshot::default());
        Self { tx }
    }

    /// Subscribe to snapshot changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ViewportSnapshot> {
        self.tx.subscribe()
    }

    /// Current snapshot.
    #[must_use]
    pub fn snapshot(&self) -> ViewportSnapshot {
        self.tx.borrow().clone()
    }

    /// Replace the stored frame. Last write wins.
    pub fn set_frame(&self, frame: Frame) {
        self.tx.send_modify(|snapshot| {
            snapshot.frame = Some(frame);
            snapshot.frames_received += 1;
            snapshot.last_frame_at = Some(Utc::now());
        });
    }

    /// Update the connection state and error. Observers are only woken when
    /// something actually changed.
    pub fn set_status(&self, state: ConnectionState, error: Option<ClientError>) {
        self.tx.send_if_modified(|snapshot| {
            if snapshot.state == state && snapshot.error == error {
                return false;
            }
            snapshot.state = state;
            snapshot.error = error;
            true
        });
    }

    /// Record an error without changing the connection state.
    pub fn set_error(&self, error: ClientError) {
        self.tx.send_if_modified(|snapshot| {
            if snapshot.error.as_ref() == Some(&error) {
                return false;
            }
            snapshot.error = Some(error);
            true
        });
    }
}
