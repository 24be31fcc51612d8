//! Operations: uniquely-identified, idempotent edit intents.
//!
//! An [`Operation`] is the unit of synchronization. The client generates its
//! `id`; the server assigns `sequence` when it accepts the operation and
//! broadcasts it back in canonical order. Replaying an operation whose `id`
//! has already been applied is a no-op (the session store enforces this).

#[cfg(test)]
#[path = "op_test.rs"]
mod op_test;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::composition::{EventId, TimedEvent, TrackId};
use crate::drawing::{Layer, LayerId, Stroke, StrokeId};

/// A single edit intent applied to the shared document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    /// Client-generated correlation id. Stable across retries.
    pub id: Uuid,
    /// The session this operation belongs to.
    pub session_id: Uuid,
    /// Server-assigned position in the canonical order. Absent until the
    /// server acknowledges the operation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sequence: Option<u64>,
    /// The participant who issued the operation.
    pub actor_id: Uuid,
    /// Milliseconds since the Unix epoch on the issuing client's clock.
    pub client_timestamp_ms: i64,
    /// What the operation does.
    #[serde(flatten)]
    pub kind: OperationKind,
}

/// Discriminated union of everything an operation can do.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OperationKind {
    /// Add a new event to a composition track.
    InsertEvent { track_id: TrackId, event: TimedEvent },
    /// Sparse-update an existing event.
    EditEvent {
        track_id: TrackId,
        event_id: EventId,
        changes: EventChanges,
    },
    /// Remove an event from a track.
    DeleteEvent { track_id: TrackId, event_id: EventId },
    /// Append a stroke to a drawing layer.
    StrokeSegment { layer_id: LayerId, stroke: Stroke },
    /// Structural layer edit on a drawing.
    LayerOp(LayerOp),
    /// A chat line sequenced through the operation log. Document no-op.
    ChatMessage { text: String },
}

/// Sparse update for a timed event. Only present fields are applied.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventChanges {
    /// New start in beats, if being updated.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start: Option<f64>,
    /// New duration in beats, if being updated.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    /// New pitch, if being updated.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pitch: Option<u8>,
    /// New velocity, if being updated.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub velocity: Option<u8>,
}

impl EventChanges {
    /// True when no field is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.start.is_none()
            && self.duration.is_none()
            && self.pitch.is_none()
            && self.velocity.is_none()
    }

    /// A copy of `event` with these changes applied.
    #[must_use]
    pub fn applied_to(&self, event: &TimedEvent) -> TimedEvent {
        TimedEvent {
            id: event.id,
            start: self.start.unwrap_or(event.start),
            duration: self.duration.unwrap_or(event.duration),
            pitch: self.pitch.unwrap_or(event.pitch),
            velocity: self.velocity.unwrap_or(event.velocity),
        }
    }

    /// The changes that would restore `event` after these changes were
    /// applied: same fields set, previous values.
    #[must_use]
    pub fn inverse_for(&self, event: &TimedEvent) -> EventChanges {
        EventChanges {
            start: self.start.map(|_| event.start),
            duration: self.duration.map(|_| event.duration),
            pitch: self.pitch.map(|_| event.pitch),
            velocity: self.velocity.map(|_| event.velocity),
        }
    }
}

/// Structural edits to the layer stack of a drawing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum LayerOp {
    /// Insert a layer at a z-position (0 = bottom, `len` = top).
    AddLayer { layer: Layer, index: usize },
    /// Remove a layer and everything on it.
    RemoveLayer { layer_id: LayerId },
    /// Move a layer to a new z-position.
    MoveLayer { layer_id: LayerId, index: usize },
    /// Show or hide a layer.
    SetVisible { layer_id: LayerId, visible: bool },
    /// Change a layer's opacity (`0.0..=1.0`).
    SetOpacity { layer_id: LayerId, opacity: f64 },
    /// Lock or unlock a layer.
    SetLocked { layer_id: LayerId, locked: bool },
    /// Rename a layer.
    RenameLayer { layer_id: LayerId, name: String },
    /// Remove a single stroke. Exists as the inverse of
    /// [`OperationKind::StrokeSegment`].
    RemoveStroke { layer_id: LayerId, stroke_id: StrokeId },
}
