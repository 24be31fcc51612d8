//! Wire envelopes and JSON codec for the realtime session channel.
//!
//! This crate owns the wire representation shared by the engine and any
//! server or test harness speaking the protocol. Inbound messages are tagged
//! `{"type", "data"}` and outbound actions `{"action", "payload"}`; both are
//! modeled as exhaustive tagged unions so adding a message kind is a
//! compile-checked change rather than a silent fallthrough in a string
//! switch.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use document::{Document, Operation};

/// Error returned by the codec functions.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The text could not be decoded as a known envelope.
    #[error("failed to decode message: {0}")]
    Decode(#[source] serde_json::Error),
    /// The envelope could not be serialized.
    #[error("failed to encode message: {0}")]
    Encode(#[source] serde_json::Error),
}

/// A participant's role within a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Producer,
    Composer,
    Arranger,
    Performer,
    Viewer,
}

/// One member of the session roster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Participant {
    /// Stable participant id.
    pub id: Uuid,
    /// Display name.
    pub username: String,
    /// Current role.
    pub role: Role,
    /// Whether the participant is currently connected.
    pub online: bool,
}

/// Full session state, sent on join and on resync.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    /// The session id.
    pub session_id: Uuid,
    /// Display name of the session.
    pub name: String,
    /// The authoritative document at `sequence`.
    pub document: Document,
    /// Current roster.
    pub participants: Vec<Participant>,
    /// Sequence number of the last operation folded into `document`.
    pub sequence: u64,
}

/// A chat line broadcast outside the operation log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatBroadcast {
    /// Server-assigned message id.
    pub id: Uuid,
    /// Who said it.
    pub actor_id: Uuid,
    /// Display name at send time, if the server includes it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// The message text.
    pub text: String,
    /// Milliseconds since the Unix epoch, server clock.
    pub timestamp_ms: i64,
}

/// An AI-generated contribution delivered into the session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AiContribution {
    /// Server-assigned id.
    pub id: Uuid,
    /// What was requested ("melody", "chord_progression", ...).
    pub kind: String,
    /// Open-ended contribution payload.
    pub content: Value,
}

/// An error envelope from the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerError {
    /// Human-readable description.
    pub message: String,
    /// The client-generated operation id this error rejects, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<Uuid>,
}

/// Everything the server can send down the channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Full document + roster snapshot; replaces all client state.
    SessionState(SessionSnapshot),
    /// A canonical operation with its server-assigned sequence.
    Edit { operation: Operation },
    /// A chat line.
    Chat(ChatBroadcast),
    /// An AI contribution.
    AiContribution(AiContribution),
    /// An error, possibly correlated to a pending operation.
    Error(ServerError),
    /// The full participant list.
    Roster { participants: Vec<Participant> },
}

/// Everything the client can send up the channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", content = "payload", rename_all = "snake_case")]
pub enum ClientMessage {
    /// An operation awaiting a sequence assignment.
    Edit { operation: Operation },
    /// A chat line.
    Chat { text: String },
    /// Ask the backend for an AI contribution.
    AiRequest { kind: String, context: Value },
    /// Request a fresh [`SessionSnapshot`]. Sent on connect and on a
    /// detected sequence gap.
    Resync,
}

/// Decode an inbound server envelope from JSON text.
///
/// # Errors
///
/// Returns [`CodecError::Decode`] for malformed or unknown envelopes.
pub fn decode_server(text: &str) -> Result<ServerMessage, CodecError> {
    serde_json::from_str(text).map_err(CodecError::Decode)
}

/// Encode an outbound client envelope as JSON text.
///
/// # Errors
///
/// Returns [`CodecError::Encode`] if serialization fails.
pub fn encode_client(message: &ClientMessage) -> Result<String, CodecError> {
    serde_json::to_string(message).map_err(CodecError::Encode)
}

/// Encode a server envelope. Used by test harnesses and loopback servers.
///
/// # Errors
///
/// Returns [`CodecError::Encode`] if serialization fails.
pub fn encode_server(message: &ServerMessage) -> Result<String, CodecError> {
    serde_json::to_string(message).map_err(CodecError::Encode)
}

/// Decode a client envelope. Used by test harnesses and loopback servers.
///
/// # Errors
///
/// Returns [`CodecError::Decode`] for malformed or unknown envelopes.
pub fn decode_client(text: &str) -> Result<ClientMessage, CodecError> {
    serde_json::from_str(text).map_err(CodecError::Decode)
}

#[cfg(test)]
#[path = "lib_test.rs"]
mod tests;
