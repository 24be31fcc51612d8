//! Canonical session state and the optimistic view derived from it.
//!
//! The store holds two documents. The canonical document is exactly the
//! server's: only operations carrying a server-assigned sequence number ever
//! touch it, strictly in order. The view document is what the UI renders:
//! the canonical document with the local pending queue replayed on top. The
//! view is always recomputable from the canonical document, so rollback can
//! never corrupt confirmed state.

use std::collections::{HashSet, VecDeque};

use uuid::Uuid;

use document::{Document, Operation, OperationKind, ReduceError, reduce};
use protocol::SessionSnapshot;

use crate::error::SessionError;
use crate::log::OperationLog;

/// What [`SessionStore::apply_canonical`] did with an in-order operation.
#[derive(Debug, Clone, PartialEq)]
pub enum CanonicalOutcome {
    /// Folded into the canonical document.
    Applied,
    /// Seen before (or older than the current sequence); dropped without
    /// effect.
    Duplicate,
    /// In order but does not reduce against the canonical document. The
    /// sequence still advances so later operations stay contiguous.
    Rejected(ReduceError),
}

/// Recently applied operation ids, bounded FIFO.
///
/// Membership answers "have we folded this operation in already". The cap
/// bounds memory on long sessions; an id that ages out of the window is also
/// far below the current sequence, so the stale-sequence check catches its
/// replays instead.
#[derive(Debug)]
struct AppliedWindow {
    ids: HashSet<Uuid>,
    order: VecDeque<Uuid>,
    cap: usize,
}

impl AppliedWindow {
    fn new(cap: usize) -> Self {
        Self {
            ids: HashSet::new(),
            order: VecDeque::new(),
            cap,
        }
    }

    fn contains(&self, id: &Uuid) -> bool {
        self.ids.contains(id)
    }

    fn insert(&mut self, id: Uuid) {
        if !self.ids.insert(id) {
            return;
        }
        self.order.push_back(id);
        if self.order.len() > self.cap {
            if let Some(evicted) = self.order.pop_front() {
                self.ids.remove(&evicted);
            }
        }
    }

    fn clear(&mut self) {
        self.ids.clear();
        self.order.clear();
    }
}

/// Authoritative document state plus the derived optimistic view.
#[derive(Debug)]
pub struct SessionStore {
    session_id: Uuid,
    name: String,
    canonical: Document,
    view: Document,
    sequence: u64,
    applied: AppliedWindow,
    log: OperationLog,
}

impl SessionStore {
    /// Build a store from a full snapshot.
    #[must_use]
    pub fn from_snapshot(snapshot: &SessionSnapshot, applied_window: usize, log_cap: usize) -> Self {
        Self {
            session_id: snapshot.session_id,
            name: snapshot.name.clone(),
            canonical: snapshot.document.clone(),
            view: snapshot.document.clone(),
            sequence: snapshot.sequence,
            applied: AppliedWindow::new(applied_window),
            log: OperationLog::new(log_cap),
        }
    }

    /// Replace all state with a fresh snapshot. Used on resync; the log and
    /// dedup window restart because the snapshot already folds their history
    /// in.
    pub fn load_snapshot(&mut self, snapshot: &SessionSnapshot) {
        self.session_id = snapshot.session_id;
        self.name.clone_from(&snapshot.name);
        self.canonical = snapshot.document.clone();
        self.view = snapshot.document.clone();
        self.sequence = snapshot.sequence;
        self.applied.clear();
        self.log.clear();
    }

    /// Fold a server-ordered operation into the canonical document.
    ///
    /// Duplicates (by id, or by a sequence at or below the current one) are
    /// reported and dropped. The sequence advances even when the operation
    /// fails to reduce, so a rejected operation cannot wedge the stream.
    ///
    /// # Errors
    ///
    /// [`SessionError::SequenceGap`] when the operation skips ahead of the
    /// next expected sequence, and [`SessionError::InvalidOperation`] when
    /// it carries no sequence at all. Neither mutates the store.
    pub fn apply_canonical(
        &mut self,
        operation: &Operation,
    ) -> Result<CanonicalOutcome, SessionError> {
        let Some(sequence) = operation.sequence else {
            return Err(SessionError::InvalidOperation(
                "canonical operation without a sequence number".to_owned(),
            ));
        };
        if self.applied.contains(&operation.id) {
            return Ok(CanonicalOutcome::Duplicate);
        }
        if sequence <= self.sequence {
            // A redelivery from before the dedup window; the id is new to us
            // but the state already includes it.
            self.applied.insert(operation.id);
            return Ok(CanonicalOutcome::Duplicate);
        }
        if sequence > self.sequence + 1 {
            return Err(SessionError::SequenceGap {
                current: self.sequence,
                received: sequence,
            });
        }

        self.sequence = sequence;
        self.applied.insert(operation.id);
        match reduce(&self.canonical, &operation.kind) {
            Ok(next) => {
                self.canonical = next;
                self.log.append(operation.clone());
                Ok(CanonicalOutcome::Applied)
            }
            Err(reason) => Ok(CanonicalOutcome::Rejected(reason)),
        }
    }

    /// Recompute the view as the canonical document plus `pending` replayed
    /// in issue order. Entries that no longer reduce are skipped; they will
    /// be rejected or time out on their own.
    pub fn rebuild_view<'a>(&mut self, pending: impl Iterator<Item = &'a Operation>) {
        let mut view = self.canonical.clone();
        for operation in pending {
            match reduce(&view, &operation.kind) {
                Ok(next) => view = next,
                Err(reason) => {
                    tracing::debug!(
                        operation = %operation.id,
                        %reason,
                        "pending operation no longer reduces; skipped in view"
                    );
                }
            }
        }
        self.view = view;
    }

    /// Apply one operation kind directly to the view. Fast path for a new
    /// local edit, avoiding a full replay.
    ///
    /// # Errors
    ///
    /// Returns the reducer's error unchanged; the view is untouched.
    pub fn apply_view(&mut self, kind: &OperationKind) -> Result<(), ReduceError> {
        self.view = reduce(&self.view, kind)?;
        Ok(())
    }

    /// The document the UI should render.
    #[must_use]
    pub fn document(&self) -> &Document {
        &self.view
    }

    /// The server-confirmed document.
    #[must_use]
    pub fn canonical_document(&self) -> &Document {
        &self.canonical
    }

    /// Sequence of the last canonical operation folded in.
    #[must_use]
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    #[must_use]
    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The append-only record of applied canonical operations.
    #[must_use]
    pub fn log(&self) -> &OperationLog {
        &self.log
    }
}

#[cfg(test)]
#[path = "store_test.rs"]
mod tests;
