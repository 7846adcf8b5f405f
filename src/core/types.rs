//! Core data types for the positioning system

use std::collections::HashMap;

use nalgebra::Vector2;
use serde::{Deserialize, Serialize};

/// Receiver identifier to installed location
pub type ReceiverMap = HashMap<String, ReceiverLocation>;

/// 2-D position in floor-plan coordinates
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to another position
    pub fn distance_to(&self, other: &Position) -> f64 {
        (self.to_vector() - other.to_vector()).norm()
    }

    pub fn to_vector(&self) -> Vector2<f64> {
        Vector2::new(self.x, self.y)
    }

    pub fn from_vector(v: &Vector2<f64>) -> Self {
        Self { x: v.x, y: v.y }
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

impl From<[f64; 2]> for Position {
    fn from(p: [f64; 2]) -> Self {
        Self { x: p[0], y: p[1] }
    }
}

/// Installed location of a receiver.
///
/// `z` is carried through registration and persistence but ignored by the
/// 2-D estimator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReceiverLocation {
    pub x: f64,
    pub y: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub z: Option<f64>,
}

impl ReceiverLocation {
    pub fn planar(x: f64, y: f64) -> Self {
        Self { x, y, z: None }
    }

    pub fn position(&self) -> Position {
        Position::new(self.x, self.y)
    }
}

/// A receiver identifier paired with its installed location
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReceiverPosition {
    pub receiver_id: String,
    pub position: ReceiverLocation,
}

/// Axis-aligned rectangle `[min_x, max_x] × [min_y, max_y]`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl BoundingBox {
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self { min_x, min_y, max_x, max_y }
    }

    /// Normalised region used when no floor plan is loaded
    pub fn unit() -> Self {
        Self::new(0.0, 0.0, 1.0, 1.0)
    }

    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    pub fn contains(&self, p: &Position) -> bool {
        p.x >= self.min_x && p.x <= self.max_x && p.y >= self.min_y && p.y <= self.max_y
    }

    /// Project a point onto the box
    pub fn clamp(&self, v: Vector2<f64>) -> Vector2<f64> {
        Vector2::new(v.x.clamp(self.min_x, self.max_x), v.y.clamp(self.min_y, self.max_y))
    }
}

impl Default for BoundingBox {
    fn default() -> Self {
        Self::unit()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_position_distance() {
        let a = Position::new(0.0, 0.0);
        let b = Position::new(3.0, 4.0);
        assert!((a.distance_to(&b) - 5.0).abs() < 1e-12);
    }

    #[test]
    fn test_bounding_box_clamp() {
        let bbox = BoundingBox::new(0.0, 0.0, 10.0, 5.0);
        let clamped = bbox.clamp(Vector2::new(-3.0, 7.5));
        assert_eq!(clamped, Vector2::new(0.0, 5.0));
        assert!(bbox.contains(&Position::new(10.0, 5.0)));
        assert!(!bbox.contains(&Position::new(10.1, 5.0)));
    }

    #[test]
    fn test_receiver_location_serde_without_z() {
        let loc: ReceiverLocation = serde_json::from_str(r#"{"x": 1.5, "y": 2.0}"#).unwrap();
        assert_eq!(loc, ReceiverLocation::planar(1.5, 2.0));
        assert_eq!(serde_json::to_string(&loc).unwrap(), r#"{"x":1.5,"y":2.0}"#);
    }
}
