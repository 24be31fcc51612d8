//! Client-side synchronization engine for collaborative sessions.
//!
//! All collaboration flows through a single WebSocket per session. The
//! server assigns every accepted operation a sequence number and that total
//! order is the only truth; this crate keeps a local replica converged on
//! it while hiding network latency behind optimistic local application.
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`client`] | Command surface, event handling, undo/redo |
//! | [`echo`] | Pending queue for unconfirmed local operations |
//! | [`error`] | Error taxonomy |
//! | [`log`] | Append-only record of canonical operations |
//! | [`presence`] | Roster tracking and presence diffing |
//! | [`store`] | Canonical document plus the optimistic view |
//! | [`transport`] | WebSocket task, reconnect backoff, offline queue |
//!
//! The usual wiring is [`client::start`], which spawns the transport task
//! and returns a shared [`client::SessionClient`]; see [`client::run`] for
//! driving one by hand.

pub mod client;
pub mod echo;
pub mod error;
pub mod log;
pub mod presence;
pub mod store;
pub mod transport;

pub use client::{
    ChatEntry, ConnectionStatus, Notice, SessionClient, SessionConfig, SessionEvent, run, start,
};
pub use echo::{LocalEcho, PendingOperation};
pub use error::SessionError;
pub use log::OperationLog;
pub use presence::{PresenceDiff, PresenceTracker};
pub use store::{CanonicalOutcome, SessionStore};
pub use transport::{OutboundQueue, TransportEvent, TransportHandle, backoff_delay, connect};
