//! Append-only log of canonical operations.
//!
//! The log records every server-ordered operation that reduced successfully,
//! in sequence order. It exists for inspection and debugging, not for
//! replay; the canonical document in [`crate::store`] is the authority. A
//! cap keeps long sessions from growing without bound, oldest entries drop
//! first.

use std::collections::VecDeque;

use document::Operation;

/// Ordered record of applied canonical operations, capped.
#[derive(Debug)]
pub struct OperationLog {
    entries: VecDeque<Operation>,
    cap: usize,
}

impl OperationLog {
    /// A log retaining at most `cap` entries.
    #[must_use]
    pub fn new(cap: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            cap,
        }
    }

    /// Append one operation, evicting the oldest entry when full.
    pub fn append(&mut self, operation: Operation) {
        if self.entries.len() == self.cap {
            self.entries.pop_front();
        }
        self.entries.push_back(operation);
    }

    /// Drop every entry. Called when a fresh snapshot replaces all state.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Entries in application order, oldest first.
    pub fn entries(&self) -> impl Iterator<Item = &Operation> {
        self.entries.iter()
    }

    /// Sequence of the most recently appended operation.
    #[must_use]
    pub fn last_sequence(&self) -> Option<u64> {
        self.entries.back().and_then(|op| op.sequence)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
#[path = "log_test.rs"]
mod tests;
