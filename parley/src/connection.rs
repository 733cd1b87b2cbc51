//! Connection manager for the relay link.
//!
//! Owns exactly one logical connection per session: dials through a
//! [`Connector`], reconnects with bounded exponential backoff on
//! transport loss, buffers outbound events while the link is down, and
//! demultiplexes inbound frames into [`SessionEvent`]s consumed by the
//! session's single apply loop.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::{Mutex, mpsc};

use parley_proto::codec::{self, CodecError};
use parley_proto::event::WireEvent;
use parley_proto::message::MessageId;

use crate::transport::{Connector, Transport, TransportError};

/// Errors returned to callers of [`ConnectionManager::send`].
#[derive(Debug, thiserror::Error)]
pub enum SendError {
    /// The link is down and the outbound queue is full.
    #[error("transport unavailable and outbound queue full")]
    TransportUnavailable,

    /// The event could not be encoded for the wire.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// The transport rejected the frame.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
}

/// Observable state of the relay link.
///
/// `Reconnecting` is the indicator the UI shows while backoff is in
/// progress; `Offline` means the backoff ceiling was reached and no
/// further automatic attempts will be made (the persistent banner
/// state). Conversation presence is never derived from this — presence
/// stays server-authoritative.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkStatus {
    /// The transport is up.
    Connected,
    /// The transport is down and a numbered dial attempt is pending.
    Reconnecting {
        /// The attempt about to be made (1-based).
        attempt: u32,
    },
    /// Reconnect attempts are exhausted; a manual `connect()` is required.
    Offline,
}

/// Exponential backoff parameters for reconnect attempts.
#[derive(Debug, Clone)]
pub struct BackoffConfig {
    /// Delay before the second attempt; doubles on each failure.
    pub initial: Duration,
    /// Upper bound on the delay between attempts.
    pub ceiling: Duration,
    /// Total dial attempts per connect cycle before giving up.
    pub max_attempts: u32,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(500),
            ceiling: Duration::from_secs(30),
            max_attempts: 6,
        }
    }
}

/// Configuration for the connection manager.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Reconnect backoff parameters.
    pub backoff: BackoffConfig,
    /// Capacity of the outbound buffer used while the link is down.
    pub queue_capacity: usize,
    /// Capacity of the session event channel.
    pub event_buffer: usize,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            backoff: BackoffConfig::default(),
            queue_capacity: 64,
            event_buffer: 256,
        }
    }
}

/// Events flowing into the session's single apply loop, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// A decoded inbound wire event.
    Wire(WireEvent),
    /// The transport accepted an outbound message (local network ack).
    Delivered {
        /// The acknowledged message.
        message_id: MessageId,
    },
    /// An outbound message could not be transmitted.
    SendFailed {
        /// The failed message.
        message_id: MessageId,
    },
    /// The link status changed.
    Link(LinkStatus),
}

/// State shared between the manager handle and its background tasks.
struct Shared<C: Connector> {
    /// Current link status.
    status: parking_lot::Mutex<LinkStatus>,
    /// The live transport, if any.
    transport: Mutex<Option<Arc<C::Transport>>>,
    /// Outbound events buffered while the link is down, oldest first.
    queue: Mutex<VecDeque<WireEvent>>,
    /// Maximum number of buffered outbound events.
    queue_capacity: usize,
    /// Channel into the session apply loop.
    events: mpsc::Sender<SessionEvent>,
    /// Backoff parameters.
    backoff: BackoffConfig,
    /// Whether a supervise task is live (guards `connect()` idempotence).
    running: AtomicBool,
}

impl<C: Connector> Shared<C> {
    async fn set_status(&self, status: LinkStatus) {
        *self.status.lock() = status;
        // Receiver may be gone during shutdown; that's fine.
        let _ = self.events.send(SessionEvent::Link(status)).await;
    }
}

/// Manages the single live relay connection for a session.
///
/// Created with [`ConnectionManager::new`], which also returns the
/// receiver for [`SessionEvent`]s. Call [`connect`](Self::connect) to
/// bring the link up; duplicate calls while a link is live or a dial is
/// pending are no-ops.
pub struct ConnectionManager<C: Connector> {
    connector: Arc<C>,
    shared: Arc<Shared<C>>,
    /// Handle to the supervise task, for cancellation on close.
    supervisor: parking_lot::Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl<C: Connector> ConnectionManager<C> {
    /// Creates a manager and the session event receiver.
    #[must_use]
    pub fn new(connector: C, config: ConnectionConfig) -> (Self, mpsc::Receiver<SessionEvent>) {
        let (events, events_rx) = mpsc::channel(config.event_buffer);
        let shared = Arc::new(Shared {
            status: parking_lot::Mutex::new(LinkStatus::Offline),
            transport: Mutex::new(None),
            queue: Mutex::new(VecDeque::new()),
            queue_capacity: config.queue_capacity,
            events,
            backoff: config.backoff,
            running: AtomicBool::new(false),
        });
        let manager = Self {
            connector: Arc::new(connector),
            shared,
            supervisor: parking_lot::Mutex::new(None),
        };
        (manager, events_rx)
    }

    /// Brings the link up, spawning the supervise task.
    ///
    /// Idempotent: while a transport is live or a dial cycle is pending,
    /// further calls return immediately and no second transport is
    /// opened. After the backoff ceiling is reached (status `Offline`),
    /// calling `connect()` again starts a fresh dial cycle.
    pub fn connect(&self) {
        if self.shared.running.swap(true, Ordering::SeqCst) {
            tracing::debug!("connect() ignored, link already live or dialing");
            return;
        }

        let connector = Arc::clone(&self.connector);
        let shared = Arc::clone(&self.shared);
        let handle = tokio::spawn(supervise(connector, shared));
        *self.supervisor.lock() = Some(handle);
    }

    /// The connector this manager dials through.
    #[must_use]
    pub fn connector(&self) -> &C {
        &self.connector
    }

    /// Returns the current link status.
    #[must_use]
    pub fn status(&self) -> LinkStatus {
        *self.shared.status.lock()
    }

    /// Number of outbound events currently buffered.
    pub async fn queued(&self) -> usize {
        self.shared.queue.lock().await.len()
    }

    /// Sends an outbound event, or buffers it while the link is down.
    ///
    /// On a live link the event is encoded and transmitted; a
    /// successfully transmitted `message` event yields a
    /// [`SessionEvent::Delivered`] acknowledgment. While the link is
    /// down — or while older buffered events are still draining after a
    /// reconnect — the event is buffered (bounded FIFO, flushed in
    /// order), so the relay never sees a new send overtake a buffered
    /// one.
    ///
    /// # Errors
    ///
    /// - [`SendError::TransportUnavailable`] if the event has to be
    ///   buffered (link down, or queued predecessors still draining)
    ///   and the buffer is full. The event is NOT silently dropped: a
    ///   `message` event additionally yields [`SessionEvent::SendFailed`].
    /// - [`SendError::Transport`] if the live transport rejects the
    ///   frame (a `message` event yields [`SessionEvent::SendFailed`]).
    /// - [`SendError::Codec`] if the event cannot be encoded.
    pub async fn send(&self, event: WireEvent) -> Result<(), SendError> {
        // The queue mutex is the serialization point for all outbound
        // traffic: held across the transport write, it keeps concurrent
        // sends ordered and keeps new sends behind a reconnect flush
        // that is still draining.
        let mut queue = self.shared.queue.lock().await;
        let transport = self.shared.transport.lock().await.clone();

        let live = transport.filter(|t| t.is_connected());
        let Some(transport) = live.filter(|_| queue.is_empty()) else {
            return self.buffer(&mut queue, event).await;
        };

        let frame = codec::encode(&event)?;
        match transport.send(&frame).await {
            Ok(()) => {
                if let Some(message_id) = outbound_message_id(&event) {
                    let _ = self
                        .shared
                        .events
                        .send(SessionEvent::Delivered { message_id })
                        .await;
                }
                Ok(())
            }
            Err(e) => {
                tracing::warn!(kind = event.kind(), err = %e, "outbound send failed");
                if let Some(message_id) = outbound_message_id(&event) {
                    let _ = self
                        .shared
                        .events
                        .send(SessionEvent::SendFailed { message_id })
                        .await;
                }
                Err(SendError::Transport(e))
            }
        }
    }

    /// Cancels the supervise task and drops the live transport.
    ///
    /// Pending reconnect timers die with the task. An in-flight `send`
    /// on a caller's task is not canceled (fire-and-forget once the
    /// frame is handed to the transport).
    pub async fn close(&self) {
        if let Some(handle) = self.supervisor.lock().take() {
            handle.abort();
        }
        self.shared.transport.lock().await.take();
        self.shared.running.store(false, Ordering::SeqCst);
        *self.shared.status.lock() = LinkStatus::Offline;
    }

    /// Buffers an event behind any queued predecessors. Caller holds
    /// the queue lock.
    async fn buffer(
        &self,
        queue: &mut VecDeque<WireEvent>,
        event: WireEvent,
    ) -> Result<(), SendError> {
        if queue.len() >= self.shared.queue_capacity {
            tracing::warn!(kind = event.kind(), "outbound queue full, rejecting send");
            if let Some(message_id) = outbound_message_id(&event) {
                let _ = self
                    .shared
                    .events
                    .send(SessionEvent::SendFailed { message_id })
                    .await;
            }
            return Err(SendError::TransportUnavailable);
        }
        queue.push_back(event);
        tracing::debug!(queue_len = queue.len(), "event buffered while link down");
        Ok(())
    }
}

/// Extracts the message id from an outbound `message` event, if any.
const fn outbound_message_id(event: &WireEvent) -> Option<MessageId> {
    match event {
        WireEvent::Message { message, .. } => Some(message.id),
        _ => None,
    }
}

/// Background task: dial, pump frames, redial on loss, give up after
/// the backoff ceiling.
async fn supervise<C: Connector>(connector: Arc<C>, shared: Arc<Shared<C>>) {
    loop {
        match dial_with_backoff(connector.as_ref(), &shared).await {
            Some(transport) => {
                let transport = Arc::new(transport);
                *shared.transport.lock().await = Some(Arc::clone(&transport));
                shared.set_status(LinkStatus::Connected).await;
                flush_queue(&shared, &transport).await;
                read_frames(&shared, &transport).await;

                // Transport lost; clear it and go around for a redial.
                shared.transport.lock().await.take();
                tracing::info!("relay link lost, scheduling reconnect");
            }
            None => {
                tracing::warn!("reconnect attempts exhausted, going offline");
                fail_queued_messages(&shared).await;
                shared.set_status(LinkStatus::Offline).await;
                shared.running.store(false, Ordering::SeqCst);
                return;
            }
        }
    }
}

/// Dials until a transport comes up or attempts are exhausted.
///
/// The delay doubles after each failure, capped at the ceiling; no
/// sleep follows the final failed attempt.
async fn dial_with_backoff<C: Connector>(
    connector: &C,
    shared: &Shared<C>,
) -> Option<C::Transport> {
    let mut delay = shared.backoff.initial;
    for attempt in 1..=shared.backoff.max_attempts {
        match connector.dial().await {
            Ok(transport) => {
                tracing::info!(attempt, "relay dial succeeded");
                return Some(transport);
            }
            Err(e) => {
                tracing::warn!(attempt, err = %e, "relay dial failed");
                if attempt < shared.backoff.max_attempts {
                    shared
                        .set_status(LinkStatus::Reconnecting {
                            attempt: attempt + 1,
                        })
                        .await;
                    tokio::time::sleep(delay).await;
                    delay = (delay * 2).min(shared.backoff.ceiling);
                }
            }
        }
    }
    None
}

/// Drains the outbound buffer through a freshly connected transport.
///
/// The queue lock is held for the whole drain, so `send()` callers wait
/// behind it instead of racing fresh events past buffered ones. An
/// event that cannot be sent goes back to the front of the queue.
async fn flush_queue<C: Connector>(shared: &Shared<C>, transport: &C::Transport) {
    let mut queue = shared.queue.lock().await;
    let total = queue.len();
    let mut sent = 0usize;

    while let Some(event) = queue.pop_front() {
        let frame = match codec::encode(&event) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!(kind = event.kind(), err = %e, "dropping unencodable queued event");
                continue;
            }
        };
        match transport.send(&frame).await {
            Ok(()) => {
                sent += 1;
                if let Some(message_id) = outbound_message_id(&event) {
                    let _ = shared
                        .events
                        .send(SessionEvent::Delivered { message_id })
                        .await;
                }
            }
            Err(e) => {
                tracing::warn!(err = %e, "flush interrupted, re-queueing remainder");
                queue.push_front(event);
                break;
            }
        }
    }

    if sent > 0 {
        tracing::info!(sent, remaining = total - sent, "flushed buffered events");
    }
}

/// Emits `SendFailed` for every buffered `message` event and clears the
/// buffer. Called when reconnect attempts are exhausted so the index
/// can mark the affected messages as failed instead of leaving them
/// stuck in `Sent`.
async fn fail_queued_messages<C: Connector>(shared: &Shared<C>) {
    let drained: Vec<WireEvent> = shared.queue.lock().await.drain(..).collect();
    for event in drained {
        if let Some(message_id) = outbound_message_id(&event) {
            let _ = shared
                .events
                .send(SessionEvent::SendFailed { message_id })
                .await;
        }
    }
}

/// Pumps inbound frames into the session channel until the transport
/// drops. Unknown kinds and malformed payloads are logged and skipped;
/// the loop never crashes on bad data.
async fn read_frames<C: Connector>(shared: &Shared<C>, transport: &C::Transport) {
    loop {
        match transport.recv().await {
            Ok(frame) => match codec::decode(&frame) {
                Ok(event) => {
                    if shared.events.send(SessionEvent::Wire(event)).await.is_err() {
                        // Session dropped the receiver; stop pumping.
                        return;
                    }
                }
                Err(CodecError::UnknownKind(kind)) => {
                    tracing::warn!(kind = %kind, "unknown inbound event kind, ignoring");
                }
                Err(e @ CodecError::Malformed(_)) => {
                    tracing::warn!(err = %e, "malformed inbound frame, dropping");
                }
            },
            Err(e) => {
                tracing::warn!(err = %e, "relay recv failed");
                return;
            }
        }
    }
}
