//! Connection Manager
//!
//! Owns the viewport socket, the single timer slot and the connection state
//! machine:
//!
//! ```text
//!  Disconnected --start--> Connecting --opened--> Connected
//!                              |  ^                   |
//!          failed/closed/      |  | timer             | closed/failed
//!          connect timeout     v  |                   v
//!                         ReconnectPending <----------+
//!
//!  any state --stop--> (Closing) --> Closed
//! ```
//!
//! Every input is a method call made from the client event loop, so the
//! manager is never shared between tasks. Socket events carry a generation
//! tag and timer expiries carry a timer id; anything that does not match the
//! live socket or the pending timer is ignored.

use std::time::Duration;

use super::codec::ProtocolCodec;
use super::messages::{ServerMessage, ViewportCommand};
use super::reconnect::{ReconnectConfig, ReconnectPolicy};
use crate::ClientConfig;
use crate::application::ports::{
    TimerId, TimerScheduler, Transport, TransportError, TransportEvent, TransportEventKind,
};
use crate::application::services::FrameSink;
use crate::domain::connection::{ClientError, ConnectionState, Generation};
use crate::domain::frame::ViewportSnapshot;
use crate::infrastructure::metrics;

/// What the pending timer is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TimerPurpose {
    /// Fire the next connection attempt.
    Reconnect,
    /// Abandon a connection attempt that never completed.
    ConnectTimeout,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PendingTimer {
    id: TimerId,
    purpose: TimerPurpose,
}

/// Viewport connection state machine.
///
/// Holds at most one live socket and at most one pending timer. Both are
/// released by [`ConnectionManager::stop`], which is idempotent, and by
/// `Drop`.
pub struct ConnectionManager<T: Transport, S: TimerScheduler> {
    url: String,
    transport: T,
    timers: S,
    codec: ProtocolCodec,
    sink: FrameSink,
    policy: ReconnectPolicy,
    connect_timeout: Option<Duration>,
    state: ConnectionState,
    last_error: Option<ClientError>,
    generation: Generation,
    socket: Option<Generation>,
    timer: Option<PendingTimer>,
}

impl<T: Transport, S: TimerScheduler> ConnectionManager<T, S> {
    /// Create a manager in the `Disconnected` state.
    #[must_use]
    pub fn new(config: &ClientConfig, transport: T, timers: S, sink: FrameSink) -> Self {
        Self {
            url: config.url.clone(),
            transport,
            timers,
            codec: ProtocolCodec::new(),
            sink,
            policy: ReconnectPolicy::new(ReconnectConfig::from_client_config(config)),
            connect_timeout: config.connect_timeout,
            state: ConnectionState::Disconnected,
            last_error: None,
            generation: Generation::default(),
            socket: None,
            timer: None,
        }
    }

    /// Current connection state.
    #[must_use]
    pub const fn state(&self) -> ConnectionState {
        self.state
    }

    /// Generation of the live socket, if one is open or opening.
    #[must_use]
    pub const fn live_socket(&self) -> Option<Generation> {
        self.socket
    }

    /// Whether a reconnect or connect-timeout timer is pending.
    #[must_use]
    pub const fn has_pending_timer(&self) -> bool {
        self.timer.is_some()
    }

    /// Current observable snapshot.
    #[must_use]
    pub fn snapshot(&self) -> ViewportSnapshot {
        self.sink.snapshot()
    }

    /// Start connecting.
    ///
    /// Calling `start` on a running client is a no-op; it never opens a
    /// second socket.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::AlreadyClosed`] once the client has been
    /// stopped.
    pub fn start(&mut self) -> Result<(), ClientError> {
        match self.state {
            ConnectionState::Disconnected => {
                self.connect();
                Ok(())
            }
            ConnectionState::Connecting
            | ConnectionState::Connected
            | ConnectionState::ReconnectPending => {
                tracing::debug!(state = %self.state, "Viewport client already running");
                Ok(())
            }
            ConnectionState::Closing | ConnectionState::Closed => Err(ClientError::AlreadyClosed),
        }
    }

    /// Tear the client down.
    ///
    /// Safe from any state and idempotent. Ends in `Closed` with no socket and
    /// no timer. From `Connected`, `unsubscribe_viewport` is sent first on a
    /// best-effort basis.
    pub fn stop(&mut self) {
        match self.state {
            ConnectionState::Closed => {
                tracing::trace!("Viewport client already closed");
                return;
            }
            ConnectionState::Connected => {
                self.state = ConnectionState::Closing;
                self.publish();
                if let Err(e) = self.send_command(ViewportCommand::UnsubscribeViewport) {
                    tracing::debug!(error = %e, "Unsubscribe not delivered, closing anyway");
                }
            }
            _ => {}
        }

        self.cancel_timer();
        self.close_socket();
        self.state = ConnectionState::Closed;
        self.publish();
        tracing::info!(generation = %self.generation, "Viewport client closed");
    }

    /// Apply a socket event.
    pub fn handle_transport_event(&mut self, event: TransportEvent) {
        if self.socket != Some(event.generation) {
            tracing::trace!(
                generation = %event.generation,
                live = ?self.socket,
                "Ignoring event from stale socket"
            );
            return;
        }

        match event.kind {
            TransportEventKind::Opened => self.on_opened(),
            TransportEventKind::Message(text) => {
                let decoded = self.codec.decode(&text);
                self.on_message(decoded);
            }
            TransportEventKind::Binary(data) => {
                let decoded = self.codec.decode_bytes(&data);
                self.on_message(decoded);
            }
            TransportEventKind::Closed { reason } => {
                let message = reason.map_or_else(
                    || "connection closed".to_string(),
                    |r| format!("connection closed: {r}"),
                );
                self.on_socket_lost(ClientError::Connect(message));
            }
            TransportEventKind::Failed(error) => {
                self.on_socket_lost(ClientError::Connect(error));
            }
        }
    }

    /// Apply a timer expiry.
    pub fn handle_timer(&mut self, id: TimerId) {
        let Some(pending) = self.timer.filter(|t| t.id == id) else {
            tracing::trace!(timer = id.value(), "Ignoring stale timer");
            return;
        };
        self.timer = None;

        match pending.purpose {
            TimerPurpose::Reconnect => {
                if self.state == ConnectionState::ReconnectPending {
                    self.connect();
                }
            }
            TimerPurpose::ConnectTimeout => {
                if self.state == ConnectionState::Connecting {
                    let timeout_ms = self.connect_timeout.map_or(0, |d| d.as_millis());
                    tracing::warn!(
                        generation = %self.generation,
                        timeout_ms,
                        "Viewport connection attempt timed out"
                    );
                    self.close_socket();
                    self.schedule_reconnect(ClientError::Connect(format!(
                        "connect timed out after {timeout_ms}ms"
                    )));
                }
            }
        }
    }

    // -------------------------------------------------------------------------
    // Transitions
    // -------------------------------------------------------------------------

    fn connect(&mut self) {
        self.generation = self.generation.next();
        let generation = self.generation;
        self.socket = Some(generation);
        self.state = ConnectionState::Connecting;
        self.publish();

        tracing::info!(%generation, url = %self.url, "Connecting to viewport stream");

        if let Err(e) = self.transport.open(generation, &self.url) {
            tracing::warn!(%generation, error = %e, "Viewport socket could not be opened");
            self.socket = None;
            self.schedule_reconnect(ClientError::Connect(e.to_string()));
            return;
        }

        if let Some(timeout) = self.connect_timeout {
            self.arm_timer(timeout, TimerPurpose::ConnectTimeout);
        }
    }

    fn on_opened(&mut self) {
        if self.state != ConnectionState::Connecting {
            return;
        }

        self.cancel_timer();
        self.policy.reset();
        self.state = ConnectionState::Connected;
        self.last_error = None;
        self.publish();

        tracing::info!(generation = %self.generation, "Viewport stream connected");

        if let Err(e) = self.send_command(ViewportCommand::SubscribeViewport) {
            // The socket is dying; its close event drives the reconnect.
            tracing::warn!(error = %e, "Failed to send viewport subscription");
        }
    }

    fn on_message(&mut self, decoded: Result<ServerMessage, super::codec::CodecError>) {
        if self.state != ConnectionState::Connected {
            return;
        }

        match decoded {
            Ok(ServerMessage::ViewportFrame(frame)) => {
                tracing::trace!(bytes = frame.len(), "Viewport frame received");
                metrics::record_frame_received(frame.len());
                self.sink.set_frame(frame);
            }
            Ok(ServerMessage::Ack(ack)) if ack.ok => {
                tracing::debug!(cmd = ?ack.cmd, "Command acknowledged");
            }
            Ok(ServerMessage::Ack(ack)) => {
                let cmd = ack.cmd.unwrap_or_else(|| "command".to_string());
                let reason = ack.error.unwrap_or_else(|| "rejected".to_string());
                tracing::warn!(%cmd, %reason, "Rendering process rejected command");
                self.report_protocol_error(format!("{cmd} rejected: {reason}"));
            }
            Ok(ServerMessage::Event { name }) => {
                tracing::trace!(event = %name, "Ignoring unhandled event");
            }
            Err(e) => {
                tracing::warn!(error = %e, "Dropping malformed viewport message");
                metrics::record_decode_failure(e.reason());
                self.report_protocol_error(e.to_string());
            }
        }
    }

    fn on_socket_lost(&mut self, error: ClientError) {
        tracing::warn!(generation = %self.generation, state = %self.state, %error, "Viewport socket lost");
        self.cancel_timer();
        self.close_socket();
        self.schedule_reconnect(error);
    }

    fn schedule_reconnect(&mut self, error: ClientError) {
        let delay = self.policy.next_delay();
        let attempt = self.policy.attempt_count();
        metrics::record_reconnect();

        tracing::info!(
            attempt,
            delay_ms = delay.as_millis(),
            "Reconnecting to viewport stream"
        );

        self.state = ConnectionState::ReconnectPending;
        self.last_error = Some(error);
        self.publish();
        self.arm_timer(delay, TimerPurpose::Reconnect);
    }

    // -------------------------------------------------------------------------
    // Resources
    // -------------------------------------------------------------------------

    fn send_command(&mut self, command: ViewportCommand) -> Result<(), TransportError> {
        let generation = self.socket.ok_or(TransportError::NotOpen(self.generation))?;
        let text = self
            .codec
            .encode_command(command)
            .map_err(|e| TransportError::Send(e.to_string()))?;

        tracing::debug!(cmd = command.as_str(), %generation, "Sending viewport command");

        self.transport.send(generation, text).inspect_err(|_| {
            metrics::record_command_send_failure(command.as_str());
        })
    }

    fn arm_timer(&mut self, delay: Duration, purpose: TimerPurpose) {
        self.cancel_timer();
        let id = self.timers.schedule(delay);
        self.timer = Some(PendingTimer { id, purpose });
    }

    fn cancel_timer(&mut self) {
        if let Some(pending) = self.timer.take() {
            self.timers.cancel(pending.id);
        }
    }

    fn close_socket(&mut self) {
        if let Some(generation) = self.socket.take() {
            self.transport.close(generation);
        }
    }

    fn report_protocol_error(&mut self, message: String) {
        let error = ClientError::Protocol(message);
        self.last_error = Some(error.clone());
        self.sink.set_error(error);
    }

    fn publish(&self) {
        metrics::set_connection_state(self.state);
        self.sink.set_status(self.state, self.last_error.clone());
    }
}

impl<T: Transport, S: TimerScheduler> Drop for ConnectionManager<T, S> {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use proptest::prelude::*;

    use super::*;

    // -------------------------------------------------------------------------
    // Fakes
    // -------------------------------------------------------------------------

    #[derive(Debug, Default)]
    struct TransportLog {
        opens: Vec<Generation>,
        sends: Vec<(Generation, String)>,
        closes: Vec<Generation>,
        fail_open: bool,
        fail_send: bool,
    }

    #[derive(Debug, Clone, Default)]
    struct FakeTransport(Rc<RefCell<TransportLog>>);

    impl Transport for FakeTransport {
        fn open(&mut self, generation: Generation, _url: &str) -> Result<(), TransportError> {
            let mut log = self.0.borrow_mut();
            if log.fail_open {
                return Err(TransportError::Open("invalid url".to_string()));
            }
            log.opens.push(generation);
            Ok(())
        }

        fn send(&mut self, generation: Generation, text: String) -> Result<(), TransportError> {
            let mut log = self.0.borrow_mut();
            log.sends.push((generation, text));
            if log.fail_send {
                return Err(TransportError::Send("broken pipe".to_string()));
            }
            Ok(())
        }

        fn close(&mut self, generation: Generation) {
            self.0.borrow_mut().closes.push(generation);
        }
    }

    #[derive(Debug, Default)]
    struct TimerLog {
        next_id: u64,
        scheduled: Vec<(TimerId, Duration)>,
        cancelled: Vec<TimerId>,
        fired: Vec<TimerId>,
    }

    impl TimerLog {
        fn last(&self) -> TimerId {
            self.scheduled.last().unwrap().0
        }

        fn pending(&self) -> usize {
            self.scheduled
                .iter()
                .filter(|(id, _)| !self.cancelled.contains(id) && !self.fired.contains(id))
                .count()
        }
    }

    #[derive(Debug, Clone, Default)]
    struct FakeTimers(Rc<RefCell<TimerLog>>);

    impl TimerScheduler for FakeTimers {
        fn schedule(&mut self, delay: Duration) -> TimerId {
            let mut log = self.0.borrow_mut();
            log.next_id += 1;
            let id = TimerId::new(log.next_id);
            log.scheduled.push((id, delay));
            id
        }

        fn cancel(&mut self, id: TimerId) {
            self.0.borrow_mut().cancelled.push(id);
        }
    }

    struct Harness {
        manager: ConnectionManager<FakeTransport, FakeTimers>,
        transport: Rc<RefCell<TransportLog>>,
        timers: Rc<RefCell<TimerLog>>,
    }

    impl Harness {
        fn new() -> Self {
            Self::with_config(&ClientConfig {
                connect_timeout: None,
                ..ClientConfig::default()
            })
        }

        fn with_config(config: &ClientConfig) -> Self {
            let transport = FakeTransport::default();
            let timers = FakeTimers::default();
            let transport_log = Rc::clone(&transport.0);
            let timer_log = Rc::clone(&timers.0);
            Self {
                manager: ConnectionManager::new(config, transport, timers, FrameSink::new()),
                transport: transport_log,
                timers: timer_log,
            }
        }

        fn connected() -> Self {
            let mut h = Self::new();
            h.manager.start().unwrap();
            h.event(TransportEventKind::Opened);
            h
        }

        fn live(&self) -> Generation {
            self.manager.live_socket().unwrap()
        }

        fn event(&mut self, kind: TransportEventKind) {
            let generation = self.live();
            self.manager
                .handle_transport_event(TransportEvent::new(generation, kind));
        }

        fn message(&mut self, text: &str) {
            self.event(TransportEventKind::Message(text.to_string()));
        }

        fn fire_last_timer(&mut self) {
            let id = self.timers.borrow().last();
            self.timers.borrow_mut().fired.push(id);
            self.manager.handle_timer(id);
        }

        fn sent_commands(&self) -> Vec<String> {
            self.transport
                .borrow()
                .sends
                .iter()
                .map(|(_, text)| text.clone())
                .collect()
        }
    }

    const SUBSCRIBE: &str = r#"{"cmd":"subscribe_viewport"}"#;
    const UNSUBSCRIBE: &str = r#"{"cmd":"unsubscribe_viewport"}"#;
    const FRAME_A: &str = r#"{"event":"viewport_frame","data":{"frame":"QQ=="}}"#;

    // -------------------------------------------------------------------------
    // Start / connect
    // -------------------------------------------------------------------------

    #[test]
    fn start_opens_one_socket() {
        let mut h = Harness::new();
        h.manager.start().unwrap();

        assert_eq!(h.manager.state(), ConnectionState::Connecting);
        assert_eq!(h.transport.borrow().opens, vec![Generation::new(1)]);
        assert_eq!(h.manager.snapshot().state, ConnectionState::Connecting);
    }

    #[test]
    fn second_start_does_not_open_another_socket() {
        let mut h = Harness::new();
        h.manager.start().unwrap();
        h.manager.start().unwrap();
        assert_eq!(h.transport.borrow().opens.len(), 1);

        h.event(TransportEventKind::Opened);
        h.manager.start().unwrap();
        assert_eq!(h.transport.borrow().opens.len(), 1);
    }

    #[test]
    fn open_sends_subscribe() {
        let h = Harness::connected();
        assert_eq!(h.manager.state(), ConnectionState::Connected);
        assert_eq!(h.sent_commands(), vec![SUBSCRIBE.to_string()]);
        assert!(h.manager.snapshot().error.is_none());
    }

    #[test]
    fn start_after_stop_is_already_closed() {
        let mut h = Harness::new();
        h.manager.stop();
        assert_eq!(h.manager.start(), Err(ClientError::AlreadyClosed));
        assert!(h.transport.borrow().opens.is_empty());
    }

    #[test]
    fn synchronous_open_failure_schedules_reconnect() {
        let mut h = Harness::new();
        h.transport.borrow_mut().fail_open = true;
        h.manager.start().unwrap();

        assert_eq!(h.manager.state(), ConnectionState::ReconnectPending);
        assert!(h.manager.live_socket().is_none());
        assert!(h.transport.borrow().closes.is_empty());
        assert!(matches!(
            h.manager.snapshot().error,
            Some(ClientError::Connect(_))
        ));
        assert_eq!(h.timers.borrow().scheduled.len(), 1);
    }

    // -------------------------------------------------------------------------
    // Frames and protocol errors
    // -------------------------------------------------------------------------

    #[test]
    fn frame_reaches_sink() {
        let mut h = Harness::connected();
        h.message(FRAME_A);

        let snapshot = h.manager.snapshot();
        assert_eq!(snapshot.frame.unwrap().bytes(), b"A");
        assert_eq!(snapshot.frames_received, 1);
    }

    #[test]
    fn malformed_frame_leaves_sink_unchanged() {
        let mut h = Harness::connected();
        h.message(FRAME_A);
        h.message(r#"{"event":"viewport_frame","data":{}}"#);

        let snapshot = h.manager.snapshot();
        assert_eq!(snapshot.frame.unwrap().bytes(), b"A");
        assert_eq!(snapshot.frames_received, 1);
        assert_eq!(snapshot.state, ConnectionState::Connected);
        assert!(matches!(snapshot.error, Some(ClientError::Protocol(_))));
        assert!(h.transport.borrow().closes.is_empty());
    }

    #[test]
    fn unknown_event_is_ignored() {
        let mut h = Harness::connected();
        h.message(r#"{"event":"collision","data":{"a":1}}"#);

        let snapshot = h.manager.snapshot();
        assert!(snapshot.frame.is_none());
        assert!(snapshot.error.is_none());
        assert_eq!(snapshot.state, ConnectionState::Connected);
    }

    #[test]
    fn rejected_command_is_protocol_error() {
        let mut h = Harness::connected();
        h.message(r#"{"ok":false,"cmd":"subscribe_viewport","error":"no renderer"}"#);

        assert_eq!(
            h.manager.snapshot().error,
            Some(ClientError::Protocol(
                "subscribe_viewport rejected: no renderer".to_string()
            ))
        );
        assert_eq!(h.manager.state(), ConnectionState::Connected);
    }

    #[test]
    fn binary_frame_is_decoded() {
        let mut h = Harness::connected();
        h.event(TransportEventKind::Binary(FRAME_A.as_bytes().to_vec()));
        assert_eq!(h.manager.snapshot().frames_received, 1);
    }

    #[test]
    fn last_frame_wins() {
        let mut h = Harness::connected();
        h.message(FRAME_A);
        h.message(r#"{"event":"viewport_frame","data":{"frame":"Qg=="}}"#);
        assert_eq!(h.manager.snapshot().frame.unwrap().bytes(), b"B");
    }

    // -------------------------------------------------------------------------
    // Reconnect
    // -------------------------------------------------------------------------

    #[test]
    fn abrupt_close_schedules_single_reconnect() {
        let mut h = Harness::connected();
        h.event(TransportEventKind::Closed { reason: None });

        assert_eq!(h.manager.state(), ConnectionState::ReconnectPending);
        assert!(h.manager.live_socket().is_none());
        assert_eq!(
            h.timers.borrow().scheduled,
            vec![(TimerId::new(1), Duration::from_millis(2000))]
        );

        h.fire_last_timer();
        assert_eq!(h.manager.state(), ConnectionState::Connecting);
        assert_eq!(
            h.transport.borrow().opens,
            vec![Generation::new(1), Generation::new(2)]
        );

        // A duplicate expiry of the same timer does nothing.
        h.manager.handle_timer(TimerId::new(1));
        assert_eq!(h.transport.borrow().opens.len(), 2);
    }

    #[test]
    fn failure_while_connecting_schedules_reconnect() {
        let mut h = Harness::new();
        h.manager.start().unwrap();
        h.event(TransportEventKind::Failed("connection refused".to_string()));

        assert_eq!(h.manager.state(), ConnectionState::ReconnectPending);
        assert_eq!(
            h.manager.snapshot().error,
            Some(ClientError::Connect("connection refused".to_string()))
        );
        assert_eq!(h.manager.snapshot().status_text(), "Disconnected (connection refused) - retrying...");
    }

    #[test]
    fn lost_socket_is_released_once() {
        let mut h = Harness::connected();
        h.event(TransportEventKind::Closed {
            reason: Some("going away".to_string()),
        });
        assert_eq!(h.transport.borrow().closes, vec![Generation::new(1)]);

        h.manager.stop();
        assert_eq!(h.transport.borrow().closes, vec![Generation::new(1)]);
    }

    #[test]
    fn reconnect_cycle_resubscribes_and_clears_error() {
        let mut h = Harness::connected();
        h.event(TransportEventKind::Closed { reason: None });
        h.fire_last_timer();
        h.event(TransportEventKind::Opened);

        assert_eq!(h.manager.state(), ConnectionState::Connected);
        assert!(h.manager.snapshot().error.is_none());
        assert_eq!(
            h.sent_commands(),
            vec![SUBSCRIBE.to_string(), SUBSCRIBE.to_string()]
        );
        assert_eq!(h.transport.borrow().sends[1].0, Generation::new(2));
    }

    #[test]
    fn frame_survives_reconnect() {
        let mut h = Harness::connected();
        h.message(FRAME_A);
        h.event(TransportEventKind::Closed { reason: None });
        assert_eq!(h.manager.snapshot().frame.unwrap().bytes(), b"A");
    }

    #[test]
    fn retries_indefinitely() {
        let mut h = Harness::new();
        h.manager.start().unwrap();
        for _ in 0..25 {
            h.event(TransportEventKind::Failed("refused".to_string()));
            h.fire_last_timer();
        }
        assert_eq!(h.manager.state(), ConnectionState::Connecting);
        assert_eq!(h.transport.borrow().opens.len(), 26);
        assert!(
            h.timers
                .borrow()
                .scheduled
                .iter()
                .all(|(_, d)| *d == Duration::from_millis(2000))
        );
    }

    // -------------------------------------------------------------------------
    // Connect timeout
    // -------------------------------------------------------------------------

    #[test]
    fn connect_timeout_abandons_attempt() {
        let mut h = Harness::with_config(&ClientConfig {
            connect_timeout: Some(Duration::from_secs(5)),
            ..ClientConfig::default()
        });
        h.manager.start().unwrap();
        assert_eq!(
            h.timers.borrow().scheduled,
            vec![(TimerId::new(1), Duration::from_secs(5))]
        );

        h.fire_last_timer();

        assert_eq!(h.manager.state(), ConnectionState::ReconnectPending);
        assert_eq!(h.transport.borrow().closes, vec![Generation::new(1)]);
        assert_eq!(
            h.manager.snapshot().error,
            Some(ClientError::Connect(
                "connect timed out after 5000ms".to_string()
            ))
        );
        assert_eq!(h.timers.borrow().pending(), 1);
    }

    #[test]
    fn open_cancels_connect_timeout() {
        let mut h = Harness::with_config(&ClientConfig {
            connect_timeout: Some(Duration::from_secs(5)),
            ..ClientConfig::default()
        });
        h.manager.start().unwrap();
        h.event(TransportEventKind::Opened);

        assert!(!h.manager.has_pending_timer());
        assert_eq!(h.timers.borrow().cancelled, vec![TimerId::new(1)]);

        // A late expiry of the cancelled timer is ignored.
        h.manager.handle_timer(TimerId::new(1));
        assert_eq!(h.manager.state(), ConnectionState::Connected);
    }

    #[test]
    fn late_open_after_timeout_is_ignored() {
        let mut h = Harness::with_config(&ClientConfig {
            connect_timeout: Some(Duration::from_secs(5)),
            ..ClientConfig::default()
        });
        h.manager.start().unwrap();
        h.fire_last_timer();

        h.manager.handle_transport_event(TransportEvent::new(
            Generation::new(1),
            TransportEventKind::Opened,
        ));
        assert_eq!(h.manager.state(), ConnectionState::ReconnectPending);
        assert!(h.sent_commands().is_empty());
    }

    // -------------------------------------------------------------------------
    // Stop
    // -------------------------------------------------------------------------

    #[test]
    fn stop_from_connected_unsubscribes_once() {
        let mut h = Harness::connected();
        h.manager.stop();
        h.manager.stop();

        assert_eq!(h.manager.state(), ConnectionState::Closed);
        assert_eq!(
            h.sent_commands(),
            vec![SUBSCRIBE.to_string(), UNSUBSCRIBE.to_string()]
        );
        assert_eq!(h.transport.borrow().closes, vec![Generation::new(1)]);
        assert!(h.manager.live_socket().is_none());
    }

    #[test]
    fn stop_from_connected_ignores_send_failure() {
        let mut h = Harness::connected();
        h.transport.borrow_mut().fail_send = true;
        h.manager.stop();

        assert_eq!(h.manager.state(), ConnectionState::Closed);
        assert_eq!(h.transport.borrow().closes.len(), 1);
    }

    #[test]
    fn stop_from_disconnected_sends_nothing() {
        let mut h = Harness::new();
        h.manager.stop();

        assert_eq!(h.manager.state(), ConnectionState::Closed);
        assert!(h.sent_commands().is_empty());
        assert!(h.transport.borrow().closes.is_empty());
        assert!(h.timers.borrow().cancelled.is_empty());
    }

    #[test]
    fn stop_while_connecting_closes_pending_socket() {
        let mut h = Harness::new();
        h.manager.start().unwrap();
        h.manager.stop();

        assert_eq!(h.manager.state(), ConnectionState::Closed);
        assert!(h.sent_commands().is_empty());
        assert_eq!(h.transport.borrow().closes, vec![Generation::new(1)]);

        // The open completing after teardown must not revive the client.
        h.manager.handle_transport_event(TransportEvent::new(
            Generation::new(1),
            TransportEventKind::Opened,
        ));
        assert_eq!(h.manager.state(), ConnectionState::Closed);
        assert!(h.sent_commands().is_empty());
    }

    #[test]
    fn stop_while_reconnect_pending_cancels_timer() {
        let mut h = Harness::connected();
        h.event(TransportEventKind::Closed { reason: None });
        let timer = h.timers.borrow().last();

        h.manager.stop();
        assert_eq!(h.manager.state(), ConnectionState::Closed);
        assert_eq!(h.timers.borrow().cancelled, vec![timer]);

        // The timer firing anyway must not reconnect.
        h.manager.handle_timer(timer);
        assert_eq!(h.manager.state(), ConnectionState::Closed);
        assert_eq!(h.transport.borrow().opens.len(), 1);
    }

    #[test]
    fn stop_from_every_state_releases_everything() {
        type Setup = fn(&mut Harness);
        let setups: [(&str, Setup); 5] = [
            ("disconnected", |_| {}),
            ("connecting", |h| h.manager.start().unwrap()),
            ("connected", |h| {
                h.manager.start().unwrap();
                h.event(TransportEventKind::Opened);
            }),
            ("reconnect_pending", |h| {
                h.manager.start().unwrap();
                h.event(TransportEventKind::Failed("refused".to_string()));
            }),
            ("closed", |h| h.manager.stop()),
        ];

        for (name, setup) in setups {
            let mut h = Harness::with_config(&ClientConfig::default());
            setup(&mut h);
            h.manager.stop();
            h.manager.stop();

            assert_eq!(h.manager.state(), ConnectionState::Closed, "{name}");
            assert!(h.manager.live_socket().is_none(), "{name}");
            assert!(!h.manager.has_pending_timer(), "{name}");

            let transport = h.transport.borrow();
            assert_eq!(transport.opens.len(), transport.closes.len(), "{name}");
            assert!(transport.closes.len() <= 1, "{name}");

            let timers = h.timers.borrow();
            assert_eq!(timers.pending(), 0, "{name}");
            let mut cancelled = timers.cancelled.clone();
            cancelled.dedup();
            assert_eq!(cancelled.len(), timers.cancelled.len(), "{name}");
        }
    }

    #[test]
    fn drop_tears_down() {
        let mut h = Harness::connected();
        h.event(TransportEventKind::Closed { reason: None });
        let Harness {
            manager, timers, ..
        } = h;
        drop(manager);
        assert_eq!(timers.borrow().pending(), 0);
    }

    #[test]
    fn closed_snapshot_is_published() {
        let mut h = Harness::connected();
        let rx = h.manager.sink.subscribe();
        h.manager.stop();
        assert_eq!(rx.borrow().state, ConnectionState::Closed);
    }

    // -------------------------------------------------------------------------
    // Stale generations
    // -------------------------------------------------------------------------

    #[test]
    fn stale_close_after_reconnect_is_ignored() {
        let mut h = Harness::connected();
        h.event(TransportEventKind::Closed { reason: None });
        h.fire_last_timer();
        h.event(TransportEventKind::Opened);

        h.manager.handle_transport_event(TransportEvent::new(
            Generation::new(1),
            TransportEventKind::Closed { reason: None },
        ));
        assert_eq!(h.manager.state(), ConnectionState::Connected);
        assert_eq!(h.manager.live_socket(), Some(Generation::new(2)));
    }

    fn stale_kind(selector: u8) -> TransportEventKind {
        match selector % 5 {
            0 => TransportEventKind::Opened,
            1 => TransportEventKind::Message(FRAME_A.to_string()),
            2 => TransportEventKind::Binary(b"{oops".to_vec()),
            3 => TransportEventKind::Closed { reason: None },
            _ => TransportEventKind::Failed("reset".to_string()),
        }
    }

    proptest! {
        #[test]
        fn stale_events_never_change_state(
            connected in any::<bool>(),
            events in prop::collection::vec((0u64..8, any::<u8>()), 0..32),
        ) {
            let mut h = Harness::new();
            h.manager.start().unwrap();
            h.event(TransportEventKind::Failed("refused".to_string()));
            h.fire_last_timer();
            if connected {
                h.event(TransportEventKind::Opened);
            }

            let live = h.live();
            let state = h.manager.state();
            let snapshot = h.manager.snapshot();
            let sends = h.transport.borrow().sends.len();
            let closes = h.transport.borrow().closes.len();

            for (raw, selector) in events {
                let generation = Generation::new(raw);
                if generation == live {
                    continue;
                }
                h.manager.handle_transport_event(TransportEvent::new(generation, stale_kind(selector)));
            }

            prop_assert_eq!(h.manager.state(), state);
            prop_assert_eq!(h.manager.live_socket(), Some(live));
            prop_assert_eq!(h.manager.snapshot(), snapshot);
            prop_assert_eq!(h.transport.borrow().sends.len(), sends);
            prop_assert_eq!(h.transport.borrow().closes.len(), closes);
        }
    }
}
