//! WebSocket transport task with reconnect, backoff, and an offline queue.
//!
//! The transport runs as its own tokio task and talks to the rest of the
//! engine over two unbounded channels: client envelopes in, transport events
//! out. Connection loss is not an error to callers; the task reconnects with
//! exponential backoff and jitter, queues outbound messages while offline,
//! and requests a fresh snapshot on every (re)connect instead of replaying
//! missed traffic.

use std::collections::VecDeque;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use rand::Rng;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use protocol::{ClientMessage, ServerMessage, decode_server, encode_client};

const BACKOFF_BASE_MS: u64 = 1_000;
const BACKOFF_CAP_MS: u64 = 30_000;
const BACKOFF_JITTER_MS: u64 = 250;
const BACKOFF_RESET_AFTER: Duration = Duration::from_secs(5);

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;

/// What the transport task reports to the engine.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// A connection attempt is starting.
    Connecting,
    /// The socket is up; a resync request has already been sent.
    Connected,
    /// The socket dropped; a reconnect attempt follows.
    Disconnected,
    /// A decoded server envelope.
    Message(ServerMessage),
}

/// The engine's two ends of a running transport task.
#[derive(Debug)]
pub struct TransportHandle {
    /// Envelopes to send; queued while the socket is down.
    pub outbound: mpsc::UnboundedSender<ClientMessage>,
    /// Connection lifecycle and inbound messages.
    pub events: mpsc::UnboundedReceiver<TransportEvent>,
}

/// Spawn the transport task for `url`.
///
/// Dropping the handle's `outbound` sender shuts the task down after the
/// current connection closes.
#[must_use]
pub fn connect(url: String) -> TransportHandle {
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    tokio::spawn(transport_loop(url, outbound_rx, event_tx));
    TransportHandle {
        outbound: outbound_tx,
        events: event_rx,
    }
}

/// Messages held while the socket is down, flushed FIFO on reconnect.
#[derive(Debug, Default)]
pub struct OutboundQueue {
    queued: VecDeque<ClientMessage>,
}

impl OutboundQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, message: ClientMessage) {
        self.queued.push_back(message);
    }

    /// Drain in FIFO order. Edits get a fresh client timestamp so delivery
    /// reflects send time, but keep their ids so the server's dedup and our
    /// echo matching still line up.
    pub fn drain_restamped(&mut self, now_ms: i64) -> Vec<ClientMessage> {
        self.queued
            .drain(..)
            .map(|mut message| {
                if let ClientMessage::Edit { operation } = &mut message {
                    operation.client_timestamp_ms = now_ms;
                }
                message
            })
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.queued.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queued.is_empty()
    }
}

/// Milliseconds since the Unix epoch.
#[must_use]
pub fn now_ms() -> i64 {
    let Ok(elapsed) = SystemTime::now().duration_since(UNIX_EPOCH) else {
        return 0;
    };
    i64::try_from(elapsed.as_millis()).unwrap_or(0)
}

/// Exponential backoff before reconnect attempt `attempt`, with jitter.
#[must_use]
pub fn backoff_delay(attempt: u32) -> Duration {
    Duration::from_millis(backoff_base_ms(attempt) + jitter_ms())
}

fn backoff_base_ms(attempt: u32) -> u64 {
    // 1 << 5 already exceeds the cap, so larger attempts can saturate.
    let doubled = BACKOFF_BASE_MS.saturating_mul(1_u64 << attempt.min(5));
    doubled.min(BACKOFF_CAP_MS)
}

fn jitter_ms() -> u64 {
    rand::rng().random_range(0..BACKOFF_JITTER_MS)
}

/// Whether a connection lived long enough to call the link healthy and
/// restart the backoff schedule.
fn backoff_resets_after(connected_for: Duration) -> bool {
    connected_for >= BACKOFF_RESET_AFTER
}

/// Why a live connection ended.
enum ConnectionEnd {
    /// Socket closed or errored; reconnect.
    Lost,
    /// The engine dropped its sender or receiver; shut down.
    EngineGone,
}

async fn transport_loop(
    url: String,
    mut outbound: mpsc::UnboundedReceiver<ClientMessage>,
    events: mpsc::UnboundedSender<TransportEvent>,
) {
    let mut queue = OutboundQueue::new();
    let mut attempt: u32 = 0;

    loop {
        if events.send(TransportEvent::Connecting).is_err() {
            return;
        }
        match connect_async(url.as_str()).await {
            Ok((stream, _)) => {
                if events.send(TransportEvent::Connected).is_err() {
                    return;
                }
                let connected_at = Instant::now();
                let end = run_connection(stream, &mut outbound, &events, &mut queue).await;
                if events.send(TransportEvent::Disconnected).is_err() {
                    return;
                }
                if matches!(end, ConnectionEnd::EngineGone) {
                    return;
                }
                // A handshake that is accepted and dropped right away still
                // escalates the backoff; only a connection that held for a
                // while restarts the schedule.
                if backoff_resets_after(connected_at.elapsed()) {
                    attempt = 0;
                }
            }
            Err(error) => {
                tracing::warn!(%error, url = %url, "websocket connect failed");
            }
        }

        // Keep accepting outbound messages into the queue while waiting.
        let delay = tokio::time::sleep(backoff_delay(attempt));
        attempt = attempt.saturating_add(1);
        tokio::pin!(delay);
        loop {
            tokio::select! {
                () = &mut delay => break,
                message = outbound.recv() => match message {
                    Some(message) => queue.push(message),
                    None => return,
                },
            }
        }
    }
}

async fn run_connection(
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    outbound: &mut mpsc::UnboundedReceiver<ClientMessage>,
    events: &mpsc::UnboundedSender<TransportEvent>,
    queue: &mut OutboundQueue,
) -> ConnectionEnd {
    let (mut sink, mut source) = stream.split();

    // A fresh snapshot replaces anything missed while offline.
    if !send_message(&mut sink, &ClientMessage::Resync).await {
        return ConnectionEnd::Lost;
    }
    for message in queue.drain_restamped(now_ms()) {
        if !send_message(&mut sink, &message).await {
            return ConnectionEnd::Lost;
        }
    }

    loop {
        tokio::select! {
            outgoing = outbound.recv() => match outgoing {
                Some(message) => {
                    if !send_message(&mut sink, &message).await {
                        // Keep it for the next connection.
                        queue.push(message);
                        return ConnectionEnd::Lost;
                    }
                }
                None => {
                    if let Err(error) = sink.send(Message::Close(None)).await {
                        tracing::debug!(%error, "close frame failed");
                    }
                    return ConnectionEnd::EngineGone;
                }
            },
            incoming = source.next() => {
                if let Some(end) = handle_incoming(incoming, events) {
                    return end;
                }
            }
        }
    }
}

fn handle_incoming(
    incoming: Option<Result<Message, tokio_tungstenite::tungstenite::Error>>,
    events: &mpsc::UnboundedSender<TransportEvent>,
) -> Option<ConnectionEnd> {
    match incoming {
        Some(Ok(Message::Text(text))) => {
            match decode_server(text.as_str()) {
                Ok(message) => {
                    if events.send(TransportEvent::Message(message)).is_err() {
                        return Some(ConnectionEnd::EngineGone);
                    }
                }
                Err(error) => {
                    tracing::warn!(%error, "ignoring undecodable frame");
                }
            }
            None
        }
        // Pings and pongs are handled by the library; binary is not part of
        // the protocol.
        Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Binary(_) | Message::Frame(_))) => {
            None
        }
        Some(Ok(Message::Close(_))) | None => Some(ConnectionEnd::Lost),
        Some(Err(error)) => {
            tracing::warn!(%error, "websocket read failed");
            Some(ConnectionEnd::Lost)
        }
    }
}

async fn send_message(sink: &mut WsSink, message: &ClientMessage) -> bool {
    let text = match encode_client(message) {
        Ok(text) => text,
        Err(error) => {
            tracing::error!(%error, "dropping unencodable message");
            return true;
        }
    };
    match sink.send(Message::Text(text.into())).await {
        Ok(()) => true,
        Err(error) => {
            tracing::warn!(%error, "websocket send failed");
            false
        }
    }
}

#[cfg(test)]
#[path = "transport_test.rs"]
mod tests;
