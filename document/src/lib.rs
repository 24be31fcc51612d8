//! Shared document model and pure reducer for collaborative sessions.
//!
//! A session edits exactly one [`Document`]: either a composition timeline
//! (ordered tracks of timed musical events) or a drawing canvas (an ordered
//! stack of stroke layers). All mutation flows through [`reduce`], a pure
//! function from a document and an [`OperationKind`] to the next document.
//! [`invert`] computes the operation that undoes another, which is how
//! optimistic rollback and undo are implemented without snapshotting whole
//! documents.
//!
//! ## Module layout
//!
//! | Module | Role |
//! |--------|------|
//! | [`composition`] | Timeline variant: tracks, timed events, overlap rules |
//! | [`drawing`] | Canvas variant: layers, strokes, z-order and lock rules |
//! | [`op`] | [`Operation`] and the [`OperationKind`] discriminated union |
//! | [`reduce`] | The [`Document`] union, [`reduce`](reduce::reduce) and [`invert`](reduce::invert) |

pub mod composition;
pub mod drawing;
pub mod op;
pub mod reduce;

pub use composition::{Composition, EventId, TimedEvent, Track, TrackId};
pub use drawing::{Drawing, Layer, LayerId, Stroke, StrokeId, StrokePoint};
pub use op::{EventChanges, LayerOp, Operation, OperationKind};
pub use reduce::{Document, ReduceError, invert, reduce};
