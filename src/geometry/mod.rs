//! Floor-plan geometry: polygons, rooms and the building footprint

pub mod polygon;
pub mod building;
pub mod floor_plan;

pub use polygon::{bounding_box, point_in_polygon, Polygon};
pub use building::{Building, CalibrationPoint, RoomPolygon, RoomSample};
pub use floor_plan::FloorPlan;
