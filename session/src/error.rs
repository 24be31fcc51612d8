//! Error taxonomy for the synchronization engine.
//!
//! Nothing here is fatal to the host process. Transport and protocol errors
//! are handled inside the engine; only `PreconditionFailed` and
//! `ServerRejected` are surfaced to users, as non-modal notices.

use uuid::Uuid;

/// Everything that can go wrong inside the engine.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    /// The transport channel is gone. The transport task reconnects with
    /// backoff; commands issued meanwhile fail with this.
    #[error("connection lost")]
    ConnectionLost,

    /// An operation that does not reduce against the current document.
    /// Logged and dropped, never surfaced as fatal.
    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    /// A local validation failure caught before the operation was built.
    /// Never round-trips to the server.
    #[error("precondition failed: {0}")]
    PreconditionFailed(String),

    /// The server explicitly rejected a pending operation; the optimistic
    /// apply has been rolled back.
    #[error("server rejected operation {operation_id}: {message}")]
    ServerRejected { operation_id: Uuid, message: String },

    /// A discontinuity in server-assigned sequence numbers. Triggers a full
    /// resync rather than partial repair.
    #[error("sequence gap: last applied {current}, received {received}")]
    SequenceGap { current: u64, received: u64 },
}
