//! Loopback transport for testing.
//!
//! Uses in-process [`tokio::sync::mpsc`] channels to simulate the relay
//! connection. [`LoopbackTransport::create_pair`] returns two connected
//! endpoints — one plays the client, the other plays the relay server.
//! [`ScriptedConnector`] feeds pre-arranged dial outcomes to the
//! connection manager for reconnect tests.

use std::collections::VecDeque;

use tokio::sync::{Mutex, mpsc};

use super::{Connector, Transport, TransportError};

/// In-process transport backed by `tokio::sync::mpsc` channels.
///
/// Each endpoint holds a sender into the other side's receiver. Use
/// [`create_pair`](LoopbackTransport::create_pair) to get two connected endpoints.
pub struct LoopbackTransport {
    /// Sender for outgoing frames (delivers to the remote's receiver).
    tx: mpsc::Sender<String>,
    /// Receiver for incoming frames (fed by the remote's sender).
    rx: Mutex<mpsc::Receiver<String>>,
}

impl LoopbackTransport {
    /// Create a pair of connected loopback transports.
    ///
    /// Frames sent by one end are received by the other. The `buffer`
    /// parameter controls the channel capacity for each direction.
    #[must_use]
    pub fn create_pair(buffer: usize) -> (Self, Self) {
        let (tx_a, rx_a) = mpsc::channel(buffer);
        let (tx_b, rx_b) = mpsc::channel(buffer);

        let a = Self {
            tx: tx_b, // A sends into B's receiver
            rx: Mutex::new(rx_a),
        };
        let b = Self {
            tx: tx_a, // B sends into A's receiver
            rx: Mutex::new(rx_b),
        };

        (a, b)
    }
}

impl Transport for LoopbackTransport {
    async fn send(&self, frame: &str) -> Result<(), TransportError> {
        self.tx
            .send(frame.to_string())
            .await
            .map_err(|_| TransportError::ConnectionClosed)
    }

    async fn recv(&self) -> Result<String, TransportError> {
        let mut rx = self.rx.lock().await;
        rx.recv().await.ok_or(TransportError::ConnectionClosed)
    }

    fn is_connected(&self) -> bool {
        !self.tx.is_closed()
    }
}

/// A dial outcome queued in a [`ScriptedConnector`].
enum DialOutcome {
    /// The dial succeeds with this transport.
    Connect(LoopbackTransport),
    /// The dial fails.
    Fail,
}

/// Connector that replays a scripted sequence of dial outcomes.
///
/// Tests queue failures and pre-built loopback endpoints, keeping the
/// far end of each pair to observe frames and inject events. Once the
/// script is exhausted every further dial fails.
pub struct ScriptedConnector {
    script: Mutex<VecDeque<DialOutcome>>,
}

impl ScriptedConnector {
    /// Creates a connector with an empty script (every dial fails).
    #[must_use]
    pub fn new() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
        }
    }

    /// Queues a successful dial producing the given transport.
    pub async fn push_transport(&self, transport: LoopbackTransport) {
        self.script
            .lock()
            .await
            .push_back(DialOutcome::Connect(transport));
    }

    /// Queues a failed dial attempt.
    pub async fn push_failure(&self) {
        self.script.lock().await.push_back(DialOutcome::Fail);
    }
}

impl Default for ScriptedConnector {
    fn default() -> Self {
        Self::new()
    }
}

impl Connector for ScriptedConnector {
    type Transport = LoopbackTransport;

    async fn dial(&self) -> Result<Self::Transport, TransportError> {
        match self.script.lock().await.pop_front() {
            Some(DialOutcome::Connect(transport)) => Ok(transport),
            Some(DialOutcome::Fail) | None => Err(TransportError::ConnectionClosed),
        }
    }
}
