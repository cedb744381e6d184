//! WebSocket Transport
//!
//! [`Transport`] adapter over `tokio-tungstenite`. Each socket runs in its
//! own task and reports back through a channel of generation-tagged
//! [`TransportEvent`]s. Writes go through a per-socket queue. Closing a
//! socket cancels its task: a pending handshake is abandoned, an open socket
//! flushes queued writes and sends a close frame, bounded by a timeout, and
//! the stream is dropped either way.

use std::collections::HashMap;
use std::time::Duration;

use futures_util::{Sink, SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_util::sync::CancellationToken;

use crate::application::ports::{Transport, TransportError, TransportEvent, TransportEventKind};
use crate::domain::connection::Generation;

/// Upper bound on flushing queued writes and the close handshake.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

/// Write side of one socket task.
#[derive(Debug)]
struct SocketHandle {
    outbound: mpsc::UnboundedSender<String>,
    cancel: CancellationToken,
}

/// `tokio-tungstenite` implementation of [`Transport`].
#[derive(Debug)]
pub struct WsTransport {
    events: mpsc::Sender<TransportEvent>,
    sockets: HashMap<Generation, SocketHandle>,
}

impl WsTransport {
    /// Create a transport posting socket events to `events`.
    #[must_use]
    pub fn new(events: mpsc::Sender<TransportEvent>) -> Self {
        Self {
            events,
            sockets: HashMap::new(),
        }
    }

    /// Number of sockets this transport still owns.
    #[must_use]
    pub fn open_sockets(&self) -> usize {
        self.sockets.len()
    }
}

impl Transport for WsTransport {
    fn open(&mut self, generation: Generation, url: &str) -> Result<(), TransportError> {
        let request = url
            .into_client_request()
            .map_err(|e| TransportError::Open(e.to_string()))?;

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();

        tokio::spawn(run_socket(
            generation,
            request,
            self.events.clone(),
            outbound_rx,
            cancel.clone(),
        ));

        if let Some(previous) = self.sockets.insert(
            generation,
            SocketHandle {
                outbound: outbound_tx,
                cancel,
            },
        ) {
            previous.cancel.cancel();
        }

        Ok(())
    }

    fn send(&mut self, generation: Generation, text: String) -> Result<(), TransportError> {
        let socket = self
            .sockets
            .get(&generation)
            .ok_or(TransportError::NotOpen(generation))?;

        socket
            .outbound
            .send(text)
            .map_err(|_| TransportError::Send("socket task has exited".to_string()))
    }

    fn close(&mut self, generation: Generation) {
        if let Some(socket) = self.sockets.remove(&generation) {
            tracing::debug!(%generation, "Closing viewport socket");
            // The socket task flushes what is already queued, then closes
            // within CLOSE_TIMEOUT.
            socket.cancel.cancel();
        }
    }
}

impl Drop for WsTransport {
    fn drop(&mut self) {
        for (_, socket) in self.sockets.drain() {
            socket.cancel.cancel();
        }
    }
}

/// Drive one socket from handshake to close.
async fn run_socket(
    generation: Generation,
    request: Request,
    events: mpsc::Sender<TransportEvent>,
    mut outbound: mpsc::UnboundedReceiver<String>,
    cancel: CancellationToken,
) {
    let post = |kind| events.send(TransportEvent::new(generation, kind));

    let ws_stream = tokio::select! {
        () = cancel.cancelled() => {
            tracing::debug!(%generation, "Viewport handshake abandoned");
            return;
        }
        result = tokio_tungstenite::connect_async(request) => match result {
            Ok((ws_stream, _response)) => ws_stream,
            Err(e) => {
                let _ = post(TransportEventKind::Failed(e.to_string())).await;
                return;
            }
        },
    };

    let (mut write, mut read) = ws_stream.split();

    if post(TransportEventKind::Opened).await.is_err() {
        return;
    }

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                close_socket(&mut write, &mut outbound, generation).await;
                return;
            }
            text = outbound.recv() => match text {
                Some(text) => {
                    match write_message(&mut write, &cancel, Message::Text(text.into())).await {
                        Some(Ok(())) => {}
                        Some(Err(e)) => {
                            let _ = post(TransportEventKind::Failed(e.to_string())).await;
                            return;
                        }
                        None => {
                            close_socket(&mut write, &mut outbound, generation).await;
                            return;
                        }
                    }
                }
                None => {
                    close_socket(&mut write, &mut outbound, generation).await;
                    return;
                }
            },
            msg = read.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    if post(TransportEventKind::Message(text.as_str().to_owned())).await.is_err() {
                        return;
                    }
                }
                Some(Ok(Message::Binary(data))) => {
                    if post(TransportEventKind::Binary(data.to_vec())).await.is_err() {
                        return;
                    }
                }
                Some(Ok(Message::Ping(data))) => {
                    match write_message(&mut write, &cancel, Message::Pong(data)).await {
                        Some(Ok(())) => {}
                        Some(Err(e)) => {
                            let _ = post(TransportEventKind::Failed(e.to_string())).await;
                            return;
                        }
                        None => {
                            close_socket(&mut write, &mut outbound, generation).await;
                            return;
                        }
                    }
                }
                Some(Ok(Message::Close(frame))) => {
                    let reason = frame
                        .map(|f| f.reason.as_str().to_owned())
                        .filter(|r| !r.is_empty());
                    tracing::info!(%generation, ?reason, "Server sent close frame");
                    let _ = post(TransportEventKind::Closed { reason }).await;
                    return;
                }
                Some(Ok(_)) => {
                    // Ignore pong and raw frames
                }
                Some(Err(e)) => {
                    let _ = post(TransportEventKind::Failed(e.to_string())).await;
                    return;
                }
                None => {
                    tracing::info!(%generation, "WebSocket stream ended");
                    let _ = post(TransportEventKind::Closed { reason: None }).await;
                    return;
                }
            },
        }
    }
}

/// Write one message unless the socket is cancelled first.
///
/// Returns `None` on cancellation.
async fn write_message<W>(
    write: &mut W,
    cancel: &CancellationToken,
    message: Message,
) -> Option<Result<(), WsError>>
where
    W: Sink<Message, Error = WsError> + Unpin,
{
    tokio::select! {
        biased;
        () = cancel.cancelled() => None,
        result = write.send(message) => Some(result),
    }
}

/// Flush queued writes, then send a close frame, all within
/// [`CLOSE_TIMEOUT`].
async fn close_socket<W>(
    write: &mut W,
    outbound: &mut mpsc::UnboundedReceiver<String>,
    generation: Generation,
) where
    W: Sink<Message, Error = WsError> + Unpin,
{
    let handshake = async {
        while let Ok(text) = outbound.try_recv() {
            write.send(Message::Text(text.into())).await?;
        }
        write.send(Message::Close(None)).await?;
        write.close().await
    };

    match tokio::time::timeout(CLOSE_TIMEOUT, handshake).await {
        Ok(Ok(())) => tracing::trace!(%generation, "Viewport socket closed locally"),
        Ok(Err(e)) => tracing::debug!(%generation, error = %e, "Viewport close handshake failed"),
        Err(_) => tracing::debug!(
            %generation,
            timeout_ms = CLOSE_TIMEOUT.as_millis(),
            "Viewport close handshake timed out, dropping socket"
        ),
    }
}
