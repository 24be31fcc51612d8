//! Roster tracking and presence diffing.
//!
//! The server sends the full participant list on every roster change. The
//! tracker diffs each list against the previous one and reports joins,
//! leaves, role changes, and online-status changes exactly once each, so the
//! UI can show toasts without re-deriving them.

use std::collections::HashMap;

use uuid::Uuid;

use protocol::{Participant, Role};

/// One observed change between consecutive rosters.
#[derive(Debug, Clone, PartialEq)]
pub enum PresenceDiff {
    /// A participant appeared in the roster.
    Joined(Participant),
    /// A participant disappeared from the roster.
    Left(Participant),
    /// A participant's role changed.
    RoleChanged {
        participant: Participant,
        previous: Role,
    },
    /// A participant's online flag flipped.
    StatusChanged(Participant),
}

/// Current roster with diffing against the previously seen one.
#[derive(Debug, Default)]
pub struct PresenceTracker {
    roster: HashMap<Uuid, Participant>,
}

impl PresenceTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the roster with `incoming` and report every change.
    ///
    /// Joins and changes come back in the incoming list's order; leaves
    /// follow, sorted by username so the output is deterministic.
    pub fn apply_roster(&mut self, incoming: &[Participant]) -> Vec<PresenceDiff> {
        let mut previous = std::mem::take(&mut self.roster);
        let mut diffs = Vec::new();

        for participant in incoming {
            match previous.remove(&participant.id) {
                None => diffs.push(PresenceDiff::Joined(participant.clone())),
                Some(known) => {
                    if known.role != participant.role {
                        diffs.push(PresenceDiff::RoleChanged {
                            participant: participant.clone(),
                            previous: known.role,
                        });
                    }
                    if known.online != participant.online {
                        diffs.push(PresenceDiff::StatusChanged(participant.clone()));
                    }
                }
            }
            self.roster.insert(participant.id, participant.clone());
        }

        let mut left: Vec<_> = previous.into_values().collect();
        left.sort_by(|a, b| a.username.cmp(&b.username));
        diffs.extend(left.into_iter().map(PresenceDiff::Left));

        diffs
    }

    /// Look up a participant by id.
    #[must_use]
    pub fn participant(&self, id: &Uuid) -> Option<&Participant> {
        self.roster.get(id)
    }

    /// The current roster, sorted by username.
    #[must_use]
    pub fn participants(&self) -> Vec<&Participant> {
        let mut all: Vec<_> = self.roster.values().collect();
        all.sort_by(|a, b| a.username.cmp(&b.username));
        all
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.roster.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.roster.is_empty()
    }
}

#[cfg(test)]
#[path = "presence_test.rs"]
mod tests;
