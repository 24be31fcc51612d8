//! Composition timeline: ordered tracks of timed musical events.
//!
//! Events within a track are kept sorted by `(start, id)`. Monophonic tracks
//! additionally reject overlapping events; polyphonic tracks allow chords.

#[cfg(test)]
#[path = "composition_test.rs"]
mod composition_test;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a track.
pub type TrackId = Uuid;

/// Unique identifier for a timed event.
pub type EventId = Uuid;

/// A single timed event on a track: a note (or note-like payload) with a
/// start position and a length.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimedEvent {
    /// Unique identifier for this event.
    pub id: EventId,
    /// Start position in beats from the beginning of the composition.
    pub start: f64,
    /// Length in beats. Always strictly positive.
    pub duration: f64,
    /// MIDI pitch, 0..=127.
    pub pitch: u8,
    /// MIDI velocity, 0..=127.
    pub velocity: u8,
}

impl TimedEvent {
    /// End position in beats (exclusive).
    #[must_use]
    pub fn end(&self) -> f64 {
        self.start + self.duration
    }

    /// Whether this event's span intersects `other`'s. Touching endpoints do
    /// not count as overlap.
    #[must_use]
    pub fn overlaps(&self, other: &TimedEvent) -> bool {
        self.start < other.end() && other.start < self.end()
    }
}

/// An ordered sequence of timed events with a polyphony rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    /// Unique identifier for this track.
    pub id: TrackId,
    /// Display name ("Drums", "Lead", ...).
    pub name: String,
    /// Whether simultaneous (overlapping) events are allowed.
    pub polyphonic: bool,
    /// Events sorted by `(start, id)`.
    pub events: Vec<TimedEvent>,
}

impl Track {
    /// Look up an event by id.
    #[must_use]
    pub fn event(&self, id: &EventId) -> Option<&TimedEvent> {
        self.events.iter().find(|e| e.id == *id)
    }

    /// Index of an event in the sorted sequence.
    #[must_use]
    pub fn position(&self, id: &EventId) -> Option<usize> {
        self.events.iter().position(|e| e.id == *id)
    }

    /// True if `event` would overlap an existing event other than `ignore`.
    /// Always false for polyphonic tracks.
    #[must_use]
    pub fn conflicts(&self, event: &TimedEvent, ignore: Option<&EventId>) -> bool {
        if self.polyphonic {
            return false;
        }
        self.events
            .iter()
            .filter(|e| Some(&e.id) != ignore)
            .any(|e| e.overlaps(event))
    }

    /// Insert an event, keeping the `(start, id)` sort order.
    pub fn insert_sorted(&mut self, event: TimedEvent) {
        let at = self
            .events
            .partition_point(|e| (e.start, e.id) < (event.start, event.id));
        self.events.insert(at, event);
    }

    /// Remove an event by id, returning it if it was present.
    pub fn remove(&mut self, id: &EventId) -> Option<TimedEvent> {
        let at = self.position(id)?;
        Some(self.events.remove(at))
    }
}

/// The composition variant of a session document: an ordered set of tracks.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Composition {
    /// Tracks in display order.
    pub tracks: Vec<Track>,
}

impl Composition {
    /// Look up a track by id.
    #[must_use]
    pub fn track(&self, id: &TrackId) -> Option<&Track> {
        self.tracks.iter().find(|t| t.id == *id)
    }

    /// Look up a track by id, mutably.
    pub fn track_mut(&mut self, id: &TrackId) -> Option<&mut Track> {
        self.tracks.iter_mut().find(|t| t.id == *id)
    }
}
