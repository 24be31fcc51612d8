//! The session client: command surface, server event handling, and the glue
//! between the store, echo queue, presence tracker, and transport.
//!
//! The client is single-threaded state driven from two directions. Commands
//! (edits, chat, undo) come from the host application; transport events come
//! from the socket task. Both funnel through `&mut self` methods, so there
//! is no locking; [`run`] pumps the transport side on a `LocalSet`.
//!
//! Interested parties subscribe for [`SessionEvent`]s rather than polling.

use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;
use std::time::{Duration, Instant};

use serde_json::Value;
use tokio::sync::mpsc;
use uuid::Uuid;

use document::{Document, LayerOp, Operation, OperationKind, invert};
use protocol::{
    AiContribution, ChatBroadcast, ClientMessage, Participant, ServerError, ServerMessage,
    SessionSnapshot,
};

use crate::echo::LocalEcho;
use crate::error::SessionError;
use crate::presence::{PresenceDiff, PresenceTracker};
use crate::store::{CanonicalOutcome, SessionStore};
use crate::transport::{self, TransportEvent, now_ms};

const TICK_INTERVAL_MS: u64 = 250;

/// Tunables for a session client.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// How long a pending operation may wait for its echo before it is
    /// rolled back.
    pub pending_timeout: Duration,
    /// Size of the duplicate-detection window of operation ids.
    pub applied_window: usize,
    /// Cap on the canonical operation log.
    pub log_cap: usize,
    /// Undo and redo depth.
    pub history_cap: usize,
    /// Retained chat lines.
    pub chat_cap: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            pending_timeout: Duration::from_secs(5),
            applied_window: 500,
            log_cap: 1_024,
            history_cap: 100,
            chat_cap: 200,
        }
    }
}

/// Transport-level connection state, as the UI should display it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConnectionStatus {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

/// One line in the session chat, whichever path delivered it.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatEntry {
    pub id: Uuid,
    pub actor_id: Uuid,
    /// Resolved from the roster when the server does not include it.
    pub username: Option<String>,
    pub text: String,
    pub timestamp_ms: i64,
}

/// A non-fatal condition the UI should surface as a toast.
#[derive(Debug, Clone, PartialEq)]
pub enum Notice {
    /// The server rejected a pending operation
    /// ([`SessionError::ServerRejected`]); its effect was rolled back.
    Rejected(SessionError),
    /// A pending operation went unacknowledged past the timeout and was
    /// rolled back.
    TimedOut { operation_id: Uuid },
}

/// What subscribers are told about.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// The rendered document changed; re-read [`SessionClient::document`].
    DocumentChanged,
    /// The connection status changed.
    ConnectionChanged(ConnectionStatus),
    /// A full snapshot replaced all session state.
    Resynced,
    /// A roster change.
    Presence(PresenceDiff),
    /// A chat line arrived.
    Chat(ChatEntry),
    /// An AI contribution arrived.
    AiContribution(AiContribution),
    /// Something the user should see but need not act on.
    Notice(Notice),
}

/// Client-side synchronization engine for one session.
#[derive(Debug)]
pub struct SessionClient {
    actor_id: Uuid,
    config: SessionConfig,
    status: ConnectionStatus,
    /// `None` until the first snapshot arrives.
    store: Option<SessionStore>,
    echo: LocalEcho,
    presence: PresenceTracker,
    chat: Vec<ChatEntry>,
    undo_stack: Vec<OperationKind>,
    redo_stack: Vec<OperationKind>,
    /// Ids issued by undo or redo; their confirmation must not register a
    /// second history entry.
    history_quiet: HashSet<Uuid>,
    outbound: mpsc::UnboundedSender<ClientMessage>,
    subscribers: Vec<mpsc::UnboundedSender<SessionEvent>>,
}

impl SessionClient {
    #[must_use]
    pub fn new(
        actor_id: Uuid,
        config: SessionConfig,
        outbound: mpsc::UnboundedSender<ClientMessage>,
    ) -> Self {
        let echo = LocalEcho::new(config.pending_timeout);
        Self {
            actor_id,
            config,
            status: ConnectionStatus::default(),
            store: None,
            echo,
            presence: PresenceTracker::new(),
            chat: Vec::new(),
            undo_stack: Vec::new(),
            redo_stack: Vec::new(),
            history_quiet: HashSet::new(),
            outbound,
            subscribers: Vec::new(),
        }
    }

    /// Register for session events. Receivers that fall behind or drop are
    /// pruned on the next emit.
    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<SessionEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.push(tx);
        rx
    }

    // ---- commands -------------------------------------------------------

    /// Validate, optimistically apply, and send a local edit.
    ///
    /// On success the view already reflects the edit and the returned id
    /// identifies the pending operation until the server confirms or
    /// rejects it.
    ///
    /// # Errors
    ///
    /// [`SessionError::PreconditionFailed`] for edits that are invalid
    /// against the current view (caught locally, nothing is sent),
    /// [`SessionError::InvalidOperation`] if the reducer disagrees, and
    /// [`SessionError::ConnectionLost`] if the transport task is gone.
    pub fn apply_local_edit(&mut self, kind: OperationKind) -> Result<Uuid, SessionError> {
        let id = self.issue(kind, false)?;
        // A fresh edit invalidates the redo branch.
        self.redo_stack.clear();
        Ok(id)
    }

    /// Send a chat line. Chat is not an edit: no optimistic apply, no echo
    /// tracking, it simply shows up when the server broadcasts it.
    ///
    /// # Errors
    ///
    /// [`SessionError::PreconditionFailed`] for empty text and
    /// [`SessionError::ConnectionLost`] if the transport task is gone.
    pub fn send_chat(&mut self, text: &str) -> Result<(), SessionError> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(SessionError::PreconditionFailed(
                "empty chat line".to_owned(),
            ));
        }
        self.send(ClientMessage::Chat {
            text: trimmed.to_owned(),
        })
    }

    /// Ask the backend for an AI contribution ("melody",
    /// "chord_progression", ...). The result arrives asynchronously as a
    /// [`SessionEvent::AiContribution`].
    ///
    /// # Errors
    ///
    /// [`SessionError::ConnectionLost`] if the transport task is gone.
    pub fn request_ai_contribution(
        &mut self,
        kind: &str,
        context: Value,
    ) -> Result<(), SessionError> {
        self.send(ClientMessage::AiRequest {
            kind: kind.to_owned(),
            context,
        })
    }

    /// Withdraw an unconfirmed local operation from the view. Returns false
    /// if the id is not pending. The server may still sequence the
    /// operation, in which case it later applies as a normal remote edit.
    pub fn cancel_pending(&mut self, id: &Uuid) -> bool {
        if self.rollback_pending(id) {
            self.emit(SessionEvent::DocumentChanged);
            true
        } else {
            false
        }
    }

    /// Undo the most recent confirmed local edit by issuing its inverse as
    /// a fresh operation. Returns `Ok(None)` when there is nothing to undo.
    ///
    /// # Errors
    ///
    /// Same failure modes as [`Self::apply_local_edit`]; the history entry
    /// is kept for retry unless it no longer applies at all.
    pub fn undo(&mut self) -> Result<Option<Uuid>, SessionError> {
        let Some(kind) = self.undo_stack.pop() else {
            return Ok(None);
        };
        let redo = match self.inverse_of(&kind) {
            Ok(redo) => redo,
            Err(error) => {
                // The state this entry targeted has drifted away.
                tracing::debug!(%error, "undo entry no longer applies; dropped");
                return Err(error);
            }
        };
        match self.issue(kind.clone(), true) {
            Ok(id) => {
                if let Some(redo) = redo {
                    push_capped(&mut self.redo_stack, redo, self.config.history_cap);
                }
                Ok(Some(id))
            }
            Err(error) => {
                self.undo_stack.push(kind);
                Err(error)
            }
        }
    }

    /// Re-apply the most recently undone edit. Returns `Ok(None)` when
    /// there is nothing to redo.
    ///
    /// # Errors
    ///
    /// Same failure modes as [`Self::undo`].
    pub fn redo(&mut self) -> Result<Option<Uuid>, SessionError> {
        let Some(kind) = self.redo_stack.pop() else {
            return Ok(None);
        };
        let undo = match self.inverse_of(&kind) {
            Ok(undo) => undo,
            Err(error) => {
                tracing::debug!(%error, "redo entry no longer applies; dropped");
                return Err(error);
            }
        };
        match self.issue(kind.clone(), true) {
            Ok(id) => {
                if let Some(undo) = undo {
                    push_capped(&mut self.undo_stack, undo, self.config.history_cap);
                }
                Ok(Some(id))
            }
            Err(error) => {
                self.redo_stack.push(kind);
                Err(error)
            }
        }
    }

    // ---- transport side -------------------------------------------------

    /// Feed one transport event through the engine.
    pub fn handle_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Connecting => self.set_status(ConnectionStatus::Connecting),
            TransportEvent::Connected => self.set_status(ConnectionStatus::Connected),
            TransportEvent::Disconnected => self.set_status(ConnectionStatus::Disconnected),
            TransportEvent::Message(message) => self.handle_message(message),
        }
    }

    /// Roll back pending operations whose echo is overdue.
    pub fn tick(&mut self, now: Instant) {
        let mut events = Vec::new();
        for operation_id in self.echo.expired_ids(now) {
            if self.rollback_pending(&operation_id) {
                tracing::warn!(operation = %operation_id, "pending operation timed out; rolled back");
                events.push(SessionEvent::Notice(Notice::TimedOut { operation_id }));
                events.push(SessionEvent::DocumentChanged);
            }
        }
        self.emit_all(events);
    }

    // ---- accessors ------------------------------------------------------

    /// The document to render: canonical state plus pending local edits.
    /// `None` before the first snapshot.
    #[must_use]
    pub fn document(&self) -> Option<&Document> {
        self.store.as_ref().map(SessionStore::document)
    }

    /// The server-confirmed document, without local pending edits.
    #[must_use]
    pub fn canonical_document(&self) -> Option<&Document> {
        self.store.as_ref().map(SessionStore::canonical_document)
    }

    /// Sequence of the last canonical operation, once a snapshot is loaded.
    #[must_use]
    pub fn sequence(&self) -> Option<u64> {
        self.store.as_ref().map(SessionStore::sequence)
    }

    #[must_use]
    pub fn session_name(&self) -> Option<&str> {
        self.store.as_ref().map(SessionStore::name)
    }

    #[must_use]
    pub fn connection_status(&self) -> ConnectionStatus {
        self.status
    }

    /// Roster sorted by username.
    #[must_use]
    pub fn roster(&self) -> Vec<&Participant> {
        self.presence.participants()
    }

    #[must_use]
    pub fn chat_log(&self) -> &[ChatEntry] {
        &self.chat
    }

    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.echo.len()
    }

    #[must_use]
    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    #[must_use]
    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    // ---- internals ------------------------------------------------------

    fn handle_message(&mut self, message: ServerMessage) {
        match message {
            ServerMessage::SessionState(snapshot) => self.on_snapshot(&snapshot),
            ServerMessage::Edit { operation } => self.on_canonical_edit(&operation),
            ServerMessage::Chat(broadcast) => self.on_chat(broadcast),
            ServerMessage::AiContribution(contribution) => {
                self.emit(SessionEvent::AiContribution(contribution));
            }
            ServerMessage::Error(error) => self.on_server_error(error),
            ServerMessage::Roster { participants } => self.on_roster(&participants),
        }
    }

    /// A snapshot replaces everything; still-unconfirmed local edits are
    /// replayed on top so in-flight work is not lost.
    fn on_snapshot(&mut self, snapshot: &SessionSnapshot) {
        match self.store.as_mut() {
            Some(store) => store.load_snapshot(snapshot),
            None => {
                self.store = Some(SessionStore::from_snapshot(
                    snapshot,
                    self.config.applied_window,
                    self.config.log_cap,
                ));
            }
        }
        if let Some(store) = self.store.as_mut() {
            store.rebuild_view(self.echo.operations());
        }
        let diffs = self.presence.apply_roster(&snapshot.participants);

        let mut events = vec![SessionEvent::Resynced, SessionEvent::DocumentChanged];
        events.extend(diffs.into_iter().map(SessionEvent::Presence));
        self.emit_all(events);
    }

    fn on_canonical_edit(&mut self, operation: &Operation) {
        let was_pending = match self.echo.confirm(&operation.id) {
            Some(entry) => {
                if !self.history_quiet.remove(&entry.operation.id) {
                    if let Some(inverse) = entry.inverse {
                        push_capped(&mut self.undo_stack, inverse, self.config.history_cap);
                    }
                }
                true
            }
            None => false,
        };

        let Some(store) = self.store.as_mut() else {
            tracing::debug!("canonical edit before first snapshot; requesting resync");
            self.request_resync();
            return;
        };

        let mut events = Vec::new();
        let mut applied = false;
        match store.apply_canonical(operation) {
            Ok(CanonicalOutcome::Applied) => {
                applied = true;
                store.rebuild_view(self.echo.operations());
                events.push(SessionEvent::DocumentChanged);
            }
            Ok(CanonicalOutcome::Duplicate) => {}
            Ok(CanonicalOutcome::Rejected(reason)) => {
                tracing::warn!(
                    operation = %operation.id,
                    %reason,
                    "ordered operation does not reduce against canonical state; dropped"
                );
                if was_pending {
                    // Our optimistic copy is in the view; take it out.
                    store.rebuild_view(self.echo.operations());
                    events.push(SessionEvent::DocumentChanged);
                }
            }
            Err(SessionError::SequenceGap { current, received }) => {
                tracing::warn!(current, received, "sequence gap; requesting full resync");
                self.request_resync();
            }
            Err(error) => {
                tracing::warn!(%error, operation = %operation.id, "ignoring canonical operation");
            }
        }

        // Chat can also travel the operation log when a server wants it
        // totally ordered with edits.
        if applied {
            if let OperationKind::ChatMessage { text } = &operation.kind {
                let entry = ChatEntry {
                    id: operation.id,
                    actor_id: operation.actor_id,
                    username: self.username_of(&operation.actor_id),
                    text: text.clone(),
                    timestamp_ms: operation.client_timestamp_ms,
                };
                events.push(self.push_chat(entry));
            }
        }

        self.emit_all(events);
    }

    fn on_chat(&mut self, broadcast: ChatBroadcast) {
        let username = broadcast
            .username
            .clone()
            .or_else(|| self.username_of(&broadcast.actor_id));
        let entry = ChatEntry {
            id: broadcast.id,
            actor_id: broadcast.actor_id,
            username,
            text: broadcast.text,
            timestamp_ms: broadcast.timestamp_ms,
        };
        let event = self.push_chat(entry);
        self.emit(event);
    }

    fn on_server_error(&mut self, error: ServerError) {
        if let Some(operation_id) = error.correlation_id {
            if self.rollback_pending(&operation_id) {
                tracing::warn!(
                    operation = %operation_id,
                    message = %error.message,
                    "server rejected pending operation; rolled back"
                );
                self.emit_all(vec![
                    SessionEvent::Notice(Notice::Rejected(SessionError::ServerRejected {
                        operation_id,
                        message: error.message,
                    })),
                    SessionEvent::DocumentChanged,
                ]);
                return;
            }
        }
        tracing::warn!(message = %error.message, "server error");
    }

    fn on_roster(&mut self, participants: &[Participant]) {
        let diffs = self.presence.apply_roster(participants);
        self.emit_all(diffs.into_iter().map(SessionEvent::Presence).collect());
    }

    /// Validate, apply to the view, record in the echo queue, and send.
    fn issue(&mut self, kind: OperationKind, from_history: bool) -> Result<Uuid, SessionError> {
        let store = self.store.as_mut().ok_or_else(|| {
            SessionError::PreconditionFailed("no session snapshot yet".to_owned())
        })?;
        validate_intent(store.document(), &kind)?;
        let inverse = invert(store.document(), &kind)
            .map_err(|error| SessionError::InvalidOperation(error.to_string()))?;
        store
            .apply_view(&kind)
            .map_err(|error| SessionError::InvalidOperation(error.to_string()))?;

        let operation = Operation {
            id: Uuid::new_v4(),
            session_id: store.session_id(),
            sequence: None,
            actor_id: self.actor_id,
            client_timestamp_ms: now_ms(),
            kind,
        };
        self.echo.push(operation.clone(), inverse, Instant::now());
        if from_history {
            self.history_quiet.insert(operation.id);
        }
        if let Err(error) = self.send(ClientMessage::Edit {
            operation: operation.clone(),
        }) {
            self.rollback_pending(&operation.id);
            return Err(error);
        }
        self.emit(SessionEvent::DocumentChanged);
        Ok(operation.id)
    }

    /// Remove a pending entry and undo its optimistic effect by recomputing
    /// the view from canonical state and replaying what is still pending.
    /// The inverse stored at issue time is never applied here: canonical
    /// traffic that arrived after issuance can make it stale.
    fn rollback_pending(&mut self, id: &Uuid) -> bool {
        if self.echo.reject(id).is_none() {
            return false;
        }
        self.history_quiet.remove(id);
        if let Some(store) = self.store.as_mut() {
            store.rebuild_view(self.echo.operations());
        }
        true
    }

    fn inverse_of(&self, kind: &OperationKind) -> Result<Option<OperationKind>, SessionError> {
        let store = self.store.as_ref().ok_or_else(|| {
            SessionError::PreconditionFailed("no session snapshot yet".to_owned())
        })?;
        invert(store.document(), kind)
            .map_err(|error| SessionError::InvalidOperation(error.to_string()))
    }

    fn username_of(&self, actor_id: &Uuid) -> Option<String> {
        self.presence
            .participant(actor_id)
            .map(|p| p.username.clone())
    }

    fn push_chat(&mut self, entry: ChatEntry) -> SessionEvent {
        self.chat.push(entry.clone());
        if self.chat.len() > self.config.chat_cap {
            self.chat.remove(0);
        }
        SessionEvent::Chat(entry)
    }

    fn set_status(&mut self, status: ConnectionStatus) {
        if self.status == status {
            return;
        }
        self.status = status;
        self.emit(SessionEvent::ConnectionChanged(status));
    }

    fn request_resync(&mut self) {
        if let Err(error) = self.send(ClientMessage::Resync) {
            tracing::warn!(%error, "resync request failed");
        }
    }

    fn send(&mut self, message: ClientMessage) -> Result<(), SessionError> {
        self.outbound
            .send(message)
            .map_err(|_| SessionError::ConnectionLost)
    }

    fn emit(&mut self, event: SessionEvent) {
        self.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    fn emit_all(&mut self, events: Vec<SessionEvent>) {
        for event in events {
            self.emit(event);
        }
    }
}

fn push_capped(stack: &mut Vec<OperationKind>, kind: OperationKind, cap: usize) {
    if stack.len() == cap {
        stack.remove(0);
    }
    stack.push(kind);
}

/// Local validation run before an operation is built, so obviously invalid
/// intents fail immediately instead of round-tripping to the server.
fn validate_intent(document: &Document, kind: &OperationKind) -> Result<(), SessionError> {
    let fail = |message: String| Err(SessionError::PreconditionFailed(message));
    match kind {
        OperationKind::ChatMessage { .. } => fail("chat lines are sent with send_chat".to_owned()),

        OperationKind::InsertEvent { track_id, event } => {
            let Document::Composition(comp) = document else {
                return fail("not a composition session".to_owned());
            };
            let Some(track) = comp.track(track_id) else {
                return fail(format!("unknown track {track_id}"));
            };
            if event.duration <= 0.0 {
                return fail("event duration must be positive".to_owned());
            }
            if track.conflicts(event, None) {
                return fail(format!("events would overlap on {}", track.name));
            }
            Ok(())
        }

        OperationKind::EditEvent {
            track_id,
            event_id,
            changes,
        } => {
            let Document::Composition(comp) = document else {
                return fail("not a composition session".to_owned());
            };
            let Some(track) = comp.track(track_id) else {
                return fail(format!("unknown track {track_id}"));
            };
            let Some(old) = track.event(event_id) else {
                return fail(format!("unknown event {event_id}"));
            };
            let updated = changes.applied_to(old);
            if updated.duration <= 0.0 {
                return fail("event duration must be positive".to_owned());
            }
            if track.conflicts(&updated, Some(event_id)) {
                return fail(format!("events would overlap on {}", track.name));
            }
            Ok(())
        }

        OperationKind::DeleteEvent { track_id, event_id } => {
            let Document::Composition(comp) = document else {
                return fail("not a composition session".to_owned());
            };
            let Some(track) = comp.track(track_id) else {
                return fail(format!("unknown track {track_id}"));
            };
            if track.event(event_id).is_none() {
                return fail(format!("unknown event {event_id}"));
            }
            Ok(())
        }

        OperationKind::StrokeSegment { layer_id, .. } => {
            let Document::Drawing(drawing) = document else {
                return fail("not a drawing session".to_owned());
            };
            let Some(layer) = drawing.layer(layer_id) else {
                return fail(format!("unknown layer {layer_id}"));
            };
            if layer.locked {
                return fail(format!("layer {} is locked", layer.name));
            }
            Ok(())
        }

        OperationKind::LayerOp(op) => {
            let Document::Drawing(drawing) = document else {
                return fail("not a drawing session".to_owned());
            };
            match op {
                LayerOp::AddLayer { layer, index } => {
                    if drawing.layer(&layer.id).is_some() {
                        return fail(format!("layer {} already exists", layer.id));
                    }
                    if *index > drawing.layers.len() {
                        return fail(format!("layer index {index} out of range"));
                    }
                    Ok(())
                }
                LayerOp::RemoveLayer { layer_id }
                | LayerOp::MoveLayer { layer_id, .. }
                | LayerOp::SetVisible { layer_id, .. }
                | LayerOp::SetOpacity { layer_id, .. }
                | LayerOp::SetLocked { layer_id, .. }
                | LayerOp::RenameLayer { layer_id, .. }
                | LayerOp::RemoveStroke { layer_id, .. } => {
                    if drawing.layer(layer_id).is_none() {
                        return fail(format!("unknown layer {layer_id}"));
                    }
                    Ok(())
                }
            }
        }
    }
}

// ---- wiring -------------------------------------------------------------

/// Connect to `url` and return a client driven by a background pump.
///
/// Must run inside a `tokio::task::LocalSet`; the client is shared by `Rc`
/// and never crosses threads.
#[must_use]
pub fn start(url: &str, actor_id: Uuid, config: SessionConfig) -> Rc<RefCell<SessionClient>> {
    let handle = transport::connect(url.to_owned());
    let client = Rc::new(RefCell::new(SessionClient::new(
        actor_id,
        config,
        handle.outbound,
    )));
    let pump = Rc::clone(&client);
    tokio::task::spawn_local(run(pump, handle.events));
    client
}

/// Pump transport events and the timeout ticker into `client` until the
/// transport closes.
pub async fn run(
    client: Rc<RefCell<SessionClient>>,
    mut events: mpsc::UnboundedReceiver<TransportEvent>,
) {
    let mut ticker = tokio::time::interval(Duration::from_millis(TICK_INTERVAL_MS));
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(event) => client.borrow_mut().handle_event(event),
                None => break,
            },
            _ = ticker.tick() => client.borrow_mut().tick(Instant::now()),
        }
    }
}

#[cfg(test)]
#[path = "client_test.rs"]
mod tests;
