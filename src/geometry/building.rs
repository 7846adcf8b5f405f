//! Building footprint, rooms and the calibration point

use parking_lot::RwLock;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::core::{BoundingBox, Position};
use crate::geometry::polygon::Polygon;
use crate::validation::GeometryError;

/// Name used when reporting problems with the outer walls
const OUTER_WALLS: &str = "building.walls";

/// A named room outline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomPolygon {
    pub name: String,
    pub polygon: Polygon,
}

impl RoomPolygon {
    pub fn new(name: impl Into<String>, polygon: Polygon) -> Self {
        Self { name: name.into(), polygon }
    }

    pub fn contains(&self, point: &Position) -> bool {
        self.polygon.contains(point)
    }
}

/// A sampled point and the room it fell in
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomSample {
    pub room: String,
    pub position: Position,
}

/// Reference position where the calibration beacon is currently placed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationPoint {
    /// Room name
    pub place: String,
    pub position: Position,
}

impl From<RoomSample> for CalibrationPoint {
    fn from(sample: RoomSample) -> Self {
        Self { place: sample.room, position: sample.position }
    }
}

/// Building geometry.
///
/// Walls and rooms are fixed after construction. The calibration point is the
/// only mutable part and is swapped atomically on resampling.
#[derive(Debug)]
pub struct Building {
    outer_walls: Polygon,
    bounds: BoundingBox,
    rooms: Vec<RoomPolygon>,
    calibration_point: RwLock<Option<CalibrationPoint>>,
}

impl Building {
    /// Build from validated geometry. Every polygon must pass
    /// [`Polygon::validate`].
    pub fn new(outer_walls: Polygon, rooms: Vec<RoomPolygon>) -> Result<Self, GeometryError> {
        outer_walls.validate(OUTER_WALLS)?;
        for room in &rooms {
            room.polygon.validate(&room.name)?;
        }

        let bounds = outer_walls.bounding_box().ok_or(GeometryError::TooFewVertices {
            polygon: OUTER_WALLS.to_string(),
            count: 0,
        })?;

        Ok(Self {
            outer_walls,
            bounds,
            rooms,
            calibration_point: RwLock::new(None),
        })
    }

    pub fn outer_walls(&self) -> &Polygon {
        &self.outer_walls
    }

    pub fn rooms(&self) -> &[RoomPolygon] {
        &self.rooms
    }

    /// Extent of the outer walls
    pub fn bounding_box(&self) -> BoundingBox {
        self.bounds
    }

    /// First room, in declaration order, that contains `point`
    pub fn room_at(&self, point: &Position) -> Option<&RoomPolygon> {
        self.rooms.iter().find(|room| room.contains(point))
    }

    /// Rejection-sample a point that lies in some room.
    ///
    /// Points are drawn uniformly over the outer walls' bounding box and tested
    /// against each room in turn. Gives up with
    /// [`GeometryError::NoRoomFound`] after `max_attempts` draws.
    pub fn sample_point_in_any_room<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        max_attempts: usize,
    ) -> Result<RoomSample, GeometryError> {
        if self.rooms.is_empty() {
            return Err(GeometryError::NoRooms);
        }

        let bbox = self.bounds;
        for attempt in 1..=max_attempts {
            let position = Position::new(
                rng.gen_range(bbox.min_x..=bbox.max_x),
                rng.gen_range(bbox.min_y..=bbox.max_y),
            );
            if let Some(room) = self.room_at(&position) {
                debug!(room = %room.name, attempt, "sampled point inside room");
                return Ok(RoomSample { room: room.name.clone(), position });
            }
        }

        Err(GeometryError::NoRoomFound { attempts: max_attempts })
    }

    pub fn calibration_point(&self) -> Option<CalibrationPoint> {
        self.calibration_point.read().clone()
    }

    /// Draw a fresh calibration point and make it current.
    ///
    /// On failure the previous calibration point is kept.
    pub fn resample_calibration_point<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        max_attempts: usize,
    ) -> Result<CalibrationPoint, GeometryError> {
        let point = CalibrationPoint::from(self.sample_point_in_any_room(rng, max_attempts)?);
        info!(
            place = %point.place,
            x = point.position.x,
            y = point.position.y,
            "calibration point moved"
        );
        *self.calibration_point.write() = Some(point.clone());
        Ok(point)
    }

    pub fn clear_calibration_point(&self) {
        *self.calibration_point.write() = None;
    }
}
