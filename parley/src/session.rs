//! Session wiring: one running conversation engine instance.
//!
//! A session owns the conversation index behind a single mutex, the
//! connection manager, the inbound apply task (one event at a time, in
//! arrival order) and the outbound pump that hands wire events from the
//! index to the manager.

use std::sync::Arc;

use tokio::sync::mpsc;

use parley_proto::event::WireEvent;
use parley_proto::message::{ChatId, MessageId};

use crate::config::ClientConfig;
use crate::connection::{ConnectionManager, LinkStatus};
use crate::index::{ConversationIndex, IndexError};
use crate::model::Attachment;
use crate::presence::PresenceTracker;
use crate::roster::{Identity, IdentityProvider, RosterProvider};
use crate::transport::Connector;

/// A running conversation engine.
///
/// All conversation state is reachable through
/// [`Session::with_index`]; background tasks stop when
/// [`Session::close`] is called.
pub struct Session<C: Connector> {
    identity: Identity,
    index: Arc<parking_lot::Mutex<ConversationIndex>>,
    manager: Arc<ConnectionManager<C>>,
    /// Direct handle on the outbound channel for intents that bypass
    /// the index, such as local typing signals.
    outbound: mpsc::Sender<WireEvent>,
    apply_task: tokio::task::JoinHandle<()>,
    pump_task: tokio::task::JoinHandle<()>,
}

impl<C: Connector> Session<C> {
    /// Boots a session: seeds the index from the roster, starts the
    /// connection manager and spawns the apply and pump tasks.
    #[must_use]
    pub fn start(
        identity: &dyn IdentityProvider,
        roster: &dyn RosterProvider,
        connector: C,
        config: &ClientConfig,
    ) -> Self {
        let identity = identity.identity();
        let (outbound_tx, outbound_rx) = mpsc::channel(config.outbound_buffer);
        let (manager, events_rx) = ConnectionManager::new(connector, config.connection());
        let manager = Arc::new(manager);

        let mut index = ConversationIndex::new(
            identity.user_id,
            PresenceTracker::new(config.typing_timeout),
            outbound_tx.clone(),
        );
        let chats = roster.chats();
        tracing::info!(user_id = %identity.user_id, chats = chats.len(), "session starting");
        for chat in chats {
            index.insert_chat(chat);
        }
        let index = Arc::new(parking_lot::Mutex::new(index));

        manager.connect();
        let apply_task = tokio::spawn(apply_loop(Arc::clone(&index), events_rx));
        let pump_task = tokio::spawn(outbound_pump(Arc::clone(&manager), outbound_rx));

        Self {
            identity,
            index,
            manager,
            outbound: outbound_tx,
            apply_task,
            pump_task,
        }
    }

    /// The identity this session runs as.
    #[must_use]
    pub const fn identity(&self) -> &Identity {
        &self.identity
    }

    /// Current relay link status.
    #[must_use]
    pub fn link_status(&self) -> LinkStatus {
        self.manager.status()
    }

    /// Runs a closure against the conversation index under its mutex.
    pub fn with_index<R>(&self, f: impl FnOnce(&mut ConversationIndex) -> R) -> R {
        f(&mut self.index.lock())
    }

    /// Creates and dispatches an outbound message.
    ///
    /// # Errors
    ///
    /// See [`ConversationIndex::create_message`].
    pub fn send_message(
        &self,
        chat_id: ChatId,
        text: String,
        attachment: Option<Attachment>,
    ) -> Result<MessageId, IndexError> {
        self.index.lock().create_message(chat_id, text, attachment)
    }

    /// Signals the local user's typing state to the other participants.
    ///
    /// Fire-and-forget: a full outbound channel drops the signal, since
    /// typing is ephemeral and renewed on the next keystroke anyway.
    pub fn signal_typing(&self, is_typing: bool) {
        let event = WireEvent::Typing {
            user_id: self.identity.user_id,
            is_typing,
        };
        if let Err(e) = self.outbound.try_send(event) {
            tracing::debug!(err = %e, "typing signal dropped");
        }
    }

    /// Stops the background tasks and drops the relay link.
    ///
    /// Typing indicators need no cleanup: decay deadlines are lazy and
    /// die with the index.
    pub async fn close(self) {
        self.apply_task.abort();
        self.pump_task.abort();
        self.manager.close().await;
        tracing::info!(user_id = %self.identity.user_id, "session closed");
    }
}

/// Applies session events to the index, strictly in arrival order.
async fn apply_loop(
    index: Arc<parking_lot::Mutex<ConversationIndex>>,
    mut events: mpsc::Receiver<crate::connection::SessionEvent>,
) {
    while let Some(event) = events.recv().await {
        // The mutex is held only for the synchronous apply, never
        // across an await point.
        index.lock().apply(event);
    }
    tracing::debug!("session event channel closed, apply loop exiting");
}

/// Forwards outbound wire events from the index to the manager.
///
/// Send errors are logged only; message failures are already surfaced
/// through the message state by the manager's `SendFailed` events.
async fn outbound_pump<C: Connector>(
    manager: Arc<ConnectionManager<C>>,
    mut outbound: mpsc::Receiver<WireEvent>,
) {
    while let Some(event) = outbound.recv().await {
        if let Err(e) = manager.send(event).await {
            tracing::warn!(err = %e, "outbound dispatch failed");
        }
    }
    tracing::debug!("outbound channel closed, pump exiting");
}
