//! Pending queue for locally issued operations.
//!
//! Every optimistic edit waits here, in issue order, until the server echoes
//! it back with a sequence number or rejects it. Each entry carries the
//! inverse computed at issue time; it feeds the undo history when the entry
//! is confirmed. Rollback of a rejected or expired entry always recomputes
//! the view from canonical state instead, because canonical traffic arriving
//! after issuance can invalidate a stored inverse.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use uuid::Uuid;

use document::{Operation, OperationKind};

/// One locally issued operation awaiting its server echo.
#[derive(Debug, Clone)]
pub struct PendingOperation {
    /// The operation as sent, without a sequence number.
    pub operation: Operation,
    /// Inverse computed against the view at issue time, kept for undo
    /// registration on confirmation. `None` for kinds with no document
    /// effect.
    pub inverse: Option<OperationKind>,
    /// When the operation was issued, for timeout tracking.
    pub issued_at: Instant,
}

/// FIFO of unconfirmed local operations.
#[derive(Debug)]
pub struct LocalEcho {
    pending: VecDeque<PendingOperation>,
    timeout: Duration,
}

impl LocalEcho {
    /// A queue whose entries expire after `timeout` without a server echo.
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self {
            pending: VecDeque::new(),
            timeout,
        }
    }

    /// Record a newly issued operation.
    pub fn push(&mut self, operation: Operation, inverse: Option<OperationKind>, now: Instant) {
        self.pending.push_back(PendingOperation {
            operation,
            inverse,
            issued_at: now,
        });
    }

    /// Remove and return the entry confirmed by a server echo, if present.
    pub fn confirm(&mut self, id: &Uuid) -> Option<PendingOperation> {
        let at = self.position(id)?;
        self.pending.remove(at)
    }

    /// Remove a rejected or expired entry. The caller recomputes the view
    /// from canonical state afterwards; the entry's stored inverse is not
    /// safe to apply once later traffic may have touched the same region.
    pub fn reject(&mut self, id: &Uuid) -> Option<PendingOperation> {
        let at = self.position(id)?;
        self.pending.remove(at)
    }

    /// Ids of entries that have waited longer than the timeout, oldest first.
    #[must_use]
    pub fn expired_ids(&self, now: Instant) -> Vec<Uuid> {
        self.pending
            .iter()
            .filter(|entry| now.duration_since(entry.issued_at) >= self.timeout)
            .map(|entry| entry.operation.id)
            .collect()
    }

    /// Pending operations in issue order, for view replay.
    pub fn operations(&self) -> impl Iterator<Item = &Operation> {
        self.pending.iter().map(|entry| &entry.operation)
    }

    #[must_use]
    pub fn contains(&self, id: &Uuid) -> bool {
        self.position(id).is_some()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    fn position(&self, id: &Uuid) -> Option<usize> {
        self.pending.iter().position(|entry| entry.operation.id == *id)
    }
}

#[cfg(test)]
#[path = "echo_test.rs"]
mod tests;
