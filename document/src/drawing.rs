//! Drawing canvas: an ordered stack of stroke layers.
//!
//! Z-order is the layer vector order (index 0 draws first, i.e. bottom), so
//! the order is total by construction with no duplicate ranks. Locked layers
//! reject new strokes; see the reducer for the enforcement point.

#[cfg(test)]
#[path = "drawing_test.rs"]
mod drawing_test;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a layer.
pub type LayerId = Uuid;

/// Unique identifier for a stroke.
pub type StrokeId = Uuid;

/// A single point on a stroke path, in canvas world coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StrokePoint {
    pub x: f64,
    pub y: f64,
}

/// A polyline stroke with paint attributes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stroke {
    /// Unique identifier for this stroke.
    pub id: StrokeId,
    /// Path points in draw order.
    pub points: Vec<StrokePoint>,
    /// Stroke color as a CSS color string.
    pub color: String,
    /// Stroke width in world units.
    pub width: f64,
}

/// One layer of the canvas: strokes plus visibility and edit attributes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Layer {
    /// Unique identifier for this layer.
    pub id: LayerId,
    /// Display name.
    pub name: String,
    /// Hidden layers are skipped by renderers but still editable.
    pub visible: bool,
    /// Opacity in `0.0..=1.0`.
    pub opacity: f64,
    /// Locked layers reject new strokes.
    pub locked: bool,
    /// Strokes in draw order.
    pub strokes: Vec<Stroke>,
}

impl Layer {
    /// Look up a stroke by id.
    #[must_use]
    pub fn stroke(&self, id: &StrokeId) -> Option<&Stroke> {
        self.strokes.iter().find(|s| s.id == *id)
    }
}

/// The drawing variant of a session document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Drawing {
    /// Layers bottom to top.
    pub layers: Vec<Layer>,
}

impl Drawing {
    /// Look up a layer by id.
    #[must_use]
    pub fn layer(&self, id: &LayerId) -> Option<&Layer> {
        self.layers.iter().find(|l| l.id == *id)
    }

    /// Look up a layer by id, mutably.
    pub fn layer_mut(&mut self, id: &LayerId) -> Option<&mut Layer> {
        self.layers.iter_mut().find(|l| l.id == *id)
    }

    /// Z-position of a layer (0 = bottom).
    #[must_use]
    pub fn position(&self, id: &LayerId) -> Option<usize> {
        self.layers.iter().position(|l| l.id == *id)
    }
}
