//! Tokio Timer Scheduler
//!
//! [`TimerScheduler`] adapter that runs each timer as a sleeping task and
//! posts its id to the client event loop on expiry. Cancelling aborts the
//! task, so a cancelled timer never posts.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::application::ports::{TimerId, TimerScheduler};

/// Tokio implementation of [`TimerScheduler`].
#[derive(Debug)]
pub struct TokioTimerScheduler {
    expired: mpsc::Sender<TimerId>,
    next_id: u64,
    pending: HashMap<TimerId, JoinHandle<()>>,
}

impl TokioTimerScheduler {
    /// Create a scheduler posting expired timer ids to `expired`.
    #[must_use]
    pub fn new(expired: mpsc::Sender<TimerId>) -> Self {
        Self {
            expired,
            next_id: 0,
            pending: HashMap::new(),
        }
    }

    /// Number of timers that have neither fired nor been cancelled.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.pending.values().filter(|t| !t.is_finished()).count()
    }
}

impl TimerScheduler for TokioTimerScheduler {
    fn schedule(&mut self, delay: Duration) -> TimerId {
        self.pending.retain(|_, task| !task.is_finished());

        self.next_id += 1;
        let id = TimerId::new(self.next_id);
        let expired = self.expired.clone();

        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = expired.send(id).await;
        });
        self.pending.insert(id, task);

        tracing::trace!(timer = id.value(), delay_ms = delay.as_millis(), "Timer scheduled");
        id
    }

    fn cancel(&mut self, id: TimerId) {
        if let Some(task) = self.pending.remove(&id) {
            task.abort();
            tracing::trace!(timer = id.value(), "Timer cancelled");
        }
    }
}

impl Drop for TokioTimerScheduler {
    fn drop(&mut self) {
        for (_, task) in self.pending.drain() {
            task.abort();
        }
    }
}
