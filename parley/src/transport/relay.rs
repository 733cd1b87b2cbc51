//! WebSocket transport to the relay endpoint.
//!
//! Implements the [`Transport`] trait over a WebSocket connection. The
//! relay terminates the persistent connection and fans events out
//! between participants; this transport only moves opaque JSON text
//! frames and never interprets them.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::{Mutex, mpsc};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use super::{Connector, Transport, TransportError};

/// Type alias for the write half of a WebSocket connection.
type WsSender = futures_util::stream::SplitSink<
    WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>,
    Message,
>;

/// Type alias for the read half of a WebSocket connection.
type WsReader =
    futures_util::stream::SplitStream<WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>>;

/// Default timeout for establishing the WebSocket connection.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Capacity of the inbound frame channel fed by the reader task.
const INCOMING_BUFFER: usize = 256;

/// WebSocket transport implementing the [`Transport`] trait.
///
/// Created via [`RelayTransport::connect`], which establishes the
/// connection and spawns a background reader task that forwards text
/// frames into an internal channel. Ping/pong and binary frames are
/// ignored; a close frame or read error flips the connected flag.
pub struct RelayTransport {
    /// Write half of the WebSocket connection (shared for concurrent sends).
    ws_sender: Arc<Mutex<WsSender>>,
    /// Channel of frames received by the background reader task.
    incoming: Mutex<mpsc::Receiver<String>>,
    /// Whether the WebSocket connection is active.
    connected: Arc<AtomicBool>,
    /// Handle to the background reader task (kept alive for the transport's lifetime).
    _reader_handle: tokio::task::JoinHandle<()>,
}

impl RelayTransport {
    /// Connect to the relay endpoint.
    ///
    /// # Errors
    ///
    /// - [`TransportError::InvalidUrl`] if `relay_url` is not a `ws://`
    ///   or `wss://` URL.
    /// - [`TransportError::Timeout`] if the connection does not come up
    ///   within `connect_timeout`.
    /// - [`TransportError::Io`] for resolution, TCP, or TLS failures.
    pub async fn connect(
        relay_url: &str,
        connect_timeout: Duration,
    ) -> Result<Self, TransportError> {
        let parsed = url::Url::parse(relay_url)
            .map_err(|e| TransportError::InvalidUrl(format!("{relay_url}: {e}")))?;
        if parsed.scheme() != "ws" && parsed.scheme() != "wss" {
            return Err(TransportError::InvalidUrl(format!(
                "unsupported scheme '{}'",
                parsed.scheme()
            )));
        }

        let (ws_stream, _response) =
            tokio::time::timeout(connect_timeout, connect_async(relay_url))
                .await
                .map_err(|_| {
                    tracing::warn!(url = relay_url, "relay WebSocket connect timed out");
                    TransportError::Timeout
                })?
                .map_err(|e| {
                    tracing::warn!(url = relay_url, err = %e, "relay WebSocket connect failed");
                    TransportError::Io(std::io::Error::other(format!("connect failed: {e}")))
                })?;

        tracing::info!(url = relay_url, "connected to relay endpoint");

        let (ws_sender, ws_reader) = ws_stream.split();

        let (tx, rx) = mpsc::channel(INCOMING_BUFFER);
        let connected = Arc::new(AtomicBool::new(true));
        let reader_connected = Arc::clone(&connected);
        let reader_handle = tokio::spawn(reader_loop(ws_reader, tx, reader_connected));

        Ok(Self {
            ws_sender: Arc::new(Mutex::new(ws_sender)),
            incoming: Mutex::new(rx),
            connected,
            _reader_handle: reader_handle,
        })
    }
}

impl Transport for RelayTransport {
    /// Send one text frame over the WebSocket.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::ConnectionClosed`] if the connection
    /// is down or the write fails.
    async fn send(&self, frame: &str) -> Result<(), TransportError> {
        if !self.connected.load(Ordering::Relaxed) {
            return Err(TransportError::ConnectionClosed);
        }

        let mut sender = self.ws_sender.lock().await;
        sender
            .send(Message::Text(frame.to_string().into()))
            .await
            .map_err(|e| {
                tracing::warn!(err = %e, "relay send failed");
                self.connected.store(false, Ordering::Relaxed);
                TransportError::ConnectionClosed
            })?;

        Ok(())
    }

    /// Receive the next text frame from the relay.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::ConnectionClosed`] once the background
    /// reader task has exited.
    async fn recv(&self) -> Result<String, TransportError> {
        let mut rx = self.incoming.lock().await;
        rx.recv().await.ok_or(TransportError::ConnectionClosed)
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }
}

/// Background task that reads WebSocket frames and forwards text frames.
///
/// Ping/pong and binary frames are ignored. Sets `connected` to `false`
/// when the WebSocket closes or errors out.
async fn reader_loop(mut ws_reader: WsReader, tx: mpsc::Sender<String>, connected: Arc<AtomicBool>) {
    while let Some(msg_result) = ws_reader.next().await {
        match msg_result {
            Ok(Message::Text(text)) => {
                if tx.send(text.to_string()).await.is_err() {
                    // Receiver dropped — transport was dropped, exit.
                    break;
                }
            }
            Ok(Message::Close(_)) => {
                tracing::info!("relay WebSocket closed by server");
                break;
            }
            Ok(Message::Binary(_) | Message::Ping(_) | Message::Pong(_) | Message::Frame(_)) => {
                // The relay protocol is text-only; ignore everything else.
            }
            Err(e) => {
                tracing::warn!(err = %e, "relay WebSocket read error");
                break;
            }
        }
    }
    connected.store(false, Ordering::Relaxed);
    tracing::info!("relay reader task exiting");
}

/// Connector that dials the relay endpoint over WebSocket.
#[derive(Debug, Clone)]
pub struct RelayConnector {
    /// The relay endpoint URL (`ws://` or `wss://`).
    relay_url: String,
    /// Timeout for each dial attempt.
    connect_timeout: Duration,
}

impl RelayConnector {
    /// Creates a connector for the given relay URL.
    #[must_use]
    pub fn new(relay_url: impl Into<String>, connect_timeout: Duration) -> Self {
        Self {
            relay_url: relay_url.into(),
            connect_timeout,
        }
    }

    /// Returns the relay URL this connector dials.
    #[must_use]
    pub fn relay_url(&self) -> &str {
        &self.relay_url
    }
}

impl Connector for RelayConnector {
    type Transport = RelayTransport;

    async fn dial(&self) -> Result<Self::Transport, TransportError> {
        RelayTransport::connect(&self.relay_url, self.connect_timeout).await
    }
}
