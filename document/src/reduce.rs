//! The document union and the pure reducer.
//!
//! [`reduce`] never mutates its input: it returns the next document on
//! success and leaves the caller holding the unchanged original on error.
//! Malformed operations (unknown ids, locked layers, overlap violations,
//! wrong document variant) are rejected with a [`ReduceError`]; nothing here
//! panics for well-formed or malformed input.

#[cfg(test)]
#[path = "reduce_test.rs"]
mod reduce_test;

use serde::{Deserialize, Serialize};

use crate::composition::{Composition, EventId, TrackId};
use crate::drawing::{Drawing, LayerId, StrokeId};
use crate::op::{LayerOp, OperationKind};

/// The shared mutable artifact of a session, discriminated by session type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "session_type", rename_all = "lowercase")]
pub enum Document {
    /// A musical composition timeline.
    Composition(Composition),
    /// A layered drawing canvas.
    Drawing(Drawing),
}

impl Document {
    /// The composition variant, or `KindMismatch`.
    fn as_composition(&self) -> Result<&Composition, ReduceError> {
        match self {
            Document::Composition(c) => Ok(c),
            Document::Drawing(_) => Err(ReduceError::KindMismatch),
        }
    }

    /// The drawing variant, or `KindMismatch`.
    fn as_drawing(&self) -> Result<&Drawing, ReduceError> {
        match self {
            Document::Drawing(d) => Ok(d),
            Document::Composition(_) => Err(ReduceError::KindMismatch),
        }
    }
}

/// Why the reducer rejected an operation. The input document is unchanged in
/// every case.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ReduceError {
    /// The operation names a track that does not exist.
    #[error("unknown track {0}")]
    UnknownTrack(TrackId),
    /// The operation names an event that does not exist on its track.
    #[error("unknown event {event} on track {track}")]
    UnknownEvent { track: TrackId, event: EventId },
    /// An event with this id already exists on the track.
    #[error("duplicate event {0}")]
    DuplicateEvent(EventId),
    /// The event would overlap another on a monophonic track.
    #[error("events overlap on monophonic track {0}")]
    Overlap(TrackId),
    /// Event durations must be strictly positive.
    #[error("non-positive event duration {0}")]
    NonPositiveDuration(f64),
    /// The operation names a layer that does not exist.
    #[error("unknown layer {0}")]
    UnknownLayer(LayerId),
    /// A layer with this id already exists.
    #[error("duplicate layer {0}")]
    DuplicateLayer(LayerId),
    /// The operation names a stroke that does not exist on its layer.
    #[error("unknown stroke {stroke} on layer {layer}")]
    UnknownStroke { layer: LayerId, stroke: StrokeId },
    /// A stroke with this id already exists on the layer.
    #[error("duplicate stroke {0}")]
    DuplicateStroke(StrokeId),
    /// The target layer is locked against new strokes.
    #[error("layer {0} is locked")]
    LayerLocked(LayerId),
    /// A layer index is out of range for the current stack.
    #[error("layer index {index} out of range for {len} layers")]
    LayerIndex { index: usize, len: usize },
    /// Opacity must be within `0.0..=1.0`.
    #[error("opacity {0} outside 0.0..=1.0")]
    OpacityRange(f64),
    /// The operation does not apply to this document variant.
    #[error("operation does not apply to this document type")]
    KindMismatch,
}

/// Apply `kind` to `document`, returning the next document.
///
/// # Errors
///
/// Returns a [`ReduceError`] describing why the operation is invalid; the
/// input document is never partially applied.
pub fn reduce(document: &Document, kind: &OperationKind) -> Result<Document, ReduceError> {
    match kind {
        OperationKind::InsertEvent { track_id, event } => {
            let comp = document.as_composition()?;
            let track = comp
                .track(track_id)
                .ok_or(ReduceError::UnknownTrack(*track_id))?;
            if event.duration <= 0.0 {
                return Err(ReduceError::NonPositiveDuration(event.duration));
            }
            if track.event(&event.id).is_some() {
                return Err(ReduceError::DuplicateEvent(event.id));
            }
            if track.conflicts(event, None) {
                return Err(ReduceError::Overlap(*track_id));
            }
            let mut next = comp.clone();
            if let Some(t) = next.track_mut(track_id) {
                t.insert_sorted(event.clone());
            }
            Ok(Document::Composition(next))
        }

        OperationKind::EditEvent { track_id, event_id, changes } => {
            let comp = document.as_composition()?;
            let track = comp
                .track(track_id)
                .ok_or(ReduceError::UnknownTrack(*track_id))?;
            let old = track.event(event_id).ok_or(ReduceError::UnknownEvent {
                track: *track_id,
                event: *event_id,
            })?;
            let updated = changes.applied_to(old);
            if updated.duration <= 0.0 {
                return Err(ReduceError::NonPositiveDuration(updated.duration));
            }
            if track.conflicts(&updated, Some(event_id)) {
                return Err(ReduceError::Overlap(*track_id));
            }
            let mut next = comp.clone();
            if let Some(t) = next.track_mut(track_id) {
                t.remove(event_id);
                t.insert_sorted(updated);
            }
            Ok(Document::Composition(next))
        }

        OperationKind::DeleteEvent { track_id, event_id } => {
            let comp = document.as_composition()?;
            let track = comp
                .track(track_id)
                .ok_or(ReduceError::UnknownTrack(*track_id))?;
            if track.event(event_id).is_none() {
                return Err(ReduceError::UnknownEvent {
                    track: *track_id,
                    event: *event_id,
                });
            }
            let mut next = comp.clone();
            if let Some(t) = next.track_mut(track_id) {
                t.remove(event_id);
            }
            Ok(Document::Composition(next))
        }

        OperationKind::StrokeSegment { layer_id, stroke } => {
            let drawing = document.as_drawing()?;
            let layer = drawing
                .layer(layer_id)
                .ok_or(ReduceError::UnknownLayer(*layer_id))?;
            if layer.locked {
                return Err(ReduceError::LayerLocked(*layer_id));
            }
            if layer.stroke(&stroke.id).is_some() {
                return Err(ReduceError::DuplicateStroke(stroke.id));
            }
            let mut next = drawing.clone();
            if let Some(l) = next.layer_mut(layer_id) {
                l.strokes.push(stroke.clone());
            }
            Ok(Document::Drawing(next))
        }

        OperationKind::LayerOp(op) => {
            let drawing = document.as_drawing()?;
            apply_layer_op(drawing, op).map(Document::Drawing)
        }

        // Chat lines are sequenced for ordering but do not touch the document.
        OperationKind::ChatMessage { .. } => Ok(document.clone()),
    }
}

fn apply_layer_op(drawing: &Drawing, op: &LayerOp) -> Result<Drawing, ReduceError> {
    match op {
        LayerOp::AddLayer { layer, index } => {
            if drawing.layer(&layer.id).is_some() {
                return Err(ReduceError::DuplicateLayer(layer.id));
            }
            let len = drawing.layers.len();
            if *index > len {
                return Err(ReduceError::LayerIndex { index: *index, len });
            }
            let mut next = drawing.clone();
            next.layers.insert(*index, layer.clone());
            Ok(next)
        }

        LayerOp::RemoveLayer { layer_id } => {
            let at = drawing
                .position(layer_id)
                .ok_or(ReduceError::UnknownLayer(*layer_id))?;
            let mut next = drawing.clone();
            next.layers.remove(at);
            Ok(next)
        }

        LayerOp::MoveLayer { layer_id, index } => {
            let at = drawing
                .position(layer_id)
                .ok_or(ReduceError::UnknownLayer(*layer_id))?;
            let len = drawing.layers.len();
            if *index >= len {
                return Err(ReduceError::LayerIndex { index: *index, len });
            }
            let mut next = drawing.clone();
            let layer = next.layers.remove(at);
            next.layers.insert(*index, layer);
            Ok(next)
        }

        LayerOp::SetVisible { layer_id, visible } => {
            let mut next = drawing.clone();
            let layer = next
                .layer_mut(layer_id)
                .ok_or(ReduceError::UnknownLayer(*layer_id))?;
            layer.visible = *visible;
            Ok(next)
        }

        LayerOp::SetOpacity { layer_id, opacity } => {
            if !(0.0..=1.0).contains(opacity) {
                return Err(ReduceError::OpacityRange(*opacity));
            }
            let mut next = drawing.clone();
            let layer = next
                .layer_mut(layer_id)
                .ok_or(ReduceError::UnknownLayer(*layer_id))?;
            layer.opacity = *opacity;
            Ok(next)
        }

        LayerOp::SetLocked { layer_id, locked } => {
            let mut next = drawing.clone();
            let layer = next
                .layer_mut(layer_id)
                .ok_or(ReduceError::UnknownLayer(*layer_id))?;
            layer.locked = *locked;
            Ok(next)
        }

        LayerOp::RenameLayer { layer_id, name } => {
            let mut next = drawing.clone();
            let layer = next
                .layer_mut(layer_id)
                .ok_or(ReduceError::UnknownLayer(*layer_id))?;
            layer.name = name.clone();
            Ok(next)
        }

        // The lock guards new content only; removals still apply so that
        // rollback of a stroke works even if the layer was locked afterward.
        LayerOp::RemoveStroke { layer_id, stroke_id } => {
            let layer = drawing
                .layer(layer_id)
                .ok_or(ReduceError::UnknownLayer(*layer_id))?;
            if layer.stroke(stroke_id).is_none() {
                return Err(ReduceError::UnknownStroke {
                    layer: *layer_id,
                    stroke: *stroke_id,
                });
            }
            let mut next = drawing.clone();
            if let Some(l) = next.layer_mut(layer_id) {
                l.strokes.retain(|s| s.id != *stroke_id);
            }
            Ok(next)
        }
    }
}

/// Compute the operation that undoes `kind`, evaluated against the document
/// state *before* `kind` is applied.
///
/// Returns `Ok(None)` for kinds with no document effect (`chat_message`).
///
/// # Errors
///
/// Returns a [`ReduceError`] when `kind` references state that does not
/// exist, in which case `kind` itself would not reduce either.
pub fn invert(
    document: &Document,
    kind: &OperationKind,
) -> Result<Option<OperationKind>, ReduceError> {
    match kind {
        OperationKind::InsertEvent { track_id, event } => Ok(Some(OperationKind::DeleteEvent {
            track_id: *track_id,
            event_id: event.id,
        })),

        OperationKind::EditEvent { track_id, event_id, changes } => {
            let comp = document.as_composition()?;
            let track = comp
                .track(track_id)
                .ok_or(ReduceError::UnknownTrack(*track_id))?;
            let old = track.event(event_id).ok_or(ReduceError::UnknownEvent {
                track: *track_id,
                event: *event_id,
            })?;
            Ok(Some(OperationKind::EditEvent {
                track_id: *track_id,
                event_id: *event_id,
                changes: changes.inverse_for(old),
            }))
        }

        OperationKind::DeleteEvent { track_id, event_id } => {
            let comp = document.as_composition()?;
            let track = comp
                .track(track_id)
                .ok_or(ReduceError::UnknownTrack(*track_id))?;
            let old = track.event(event_id).ok_or(ReduceError::UnknownEvent {
                track: *track_id,
                event: *event_id,
            })?;
            Ok(Some(OperationKind::InsertEvent {
                track_id: *track_id,
                event: old.clone(),
            }))
        }

        OperationKind::StrokeSegment { layer_id, stroke } => {
            Ok(Some(OperationKind::LayerOp(LayerOp::RemoveStroke {
                layer_id: *layer_id,
                stroke_id: stroke.id,
            })))
        }

        OperationKind::LayerOp(op) => invert_layer_op(document.as_drawing()?, op).map(Some),

        OperationKind::ChatMessage { .. } => Ok(None),
    }
}

fn invert_layer_op(drawing: &Drawing, op: &LayerOp) -> Result<OperationKind, ReduceError> {
    let inverse = match op {
        LayerOp::AddLayer { layer, .. } => LayerOp::RemoveLayer { layer_id: layer.id },

        LayerOp::RemoveLayer { layer_id } => {
            let at = drawing
                .position(layer_id)
                .ok_or(ReduceError::UnknownLayer(*layer_id))?;
            let layer = drawing.layers[at].clone();
            LayerOp::AddLayer { layer, index: at }
        }

        LayerOp::MoveLayer { layer_id, .. } => {
            let at = drawing
                .position(layer_id)
                .ok_or(ReduceError::UnknownLayer(*layer_id))?;
            LayerOp::MoveLayer { layer_id: *layer_id, index: at }
        }

        LayerOp::SetVisible { layer_id, .. } => {
            let layer = drawing
                .layer(layer_id)
                .ok_or(ReduceError::UnknownLayer(*layer_id))?;
            LayerOp::SetVisible { layer_id: *layer_id, visible: layer.visible }
        }

        LayerOp::SetOpacity { layer_id, .. } => {
            let layer = drawing
                .layer(layer_id)
                .ok_or(ReduceError::UnknownLayer(*layer_id))?;
            LayerOp::SetOpacity { layer_id: *layer_id, opacity: layer.opacity }
        }

        LayerOp::SetLocked { layer_id, .. } => {
            let layer = drawing
                .layer(layer_id)
                .ok_or(ReduceError::UnknownLayer(*layer_id))?;
            LayerOp::SetLocked { layer_id: *layer_id, locked: layer.locked }
        }

        LayerOp::RenameLayer { layer_id, .. } => {
            let layer = drawing
                .layer(layer_id)
                .ok_or(ReduceError::UnknownLayer(*layer_id))?;
            LayerOp::RenameLayer { layer_id: *layer_id, name: layer.name.clone() }
        }

        LayerOp::RemoveStroke { layer_id, stroke_id } => {
            let layer = drawing
                .layer(layer_id)
                .ok_or(ReduceError::UnknownLayer(*layer_id))?;
            let stroke = layer.stroke(stroke_id).ok_or(ReduceError::UnknownStroke {
                layer: *layer_id,
                stroke: *stroke_id,
            })?;
            return Ok(OperationKind::StrokeSegment {
                layer_id: *layer_id,
                stroke: stroke.clone(),
            });
        }
    };
    Ok(OperationKind::LayerOp(inverse))
}
