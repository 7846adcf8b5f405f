//! BLE Beacon Positioning
//!
//! Ingests beacon sightings from fixed receivers, keeps a sliding window of
//! the latest reading per receiver for every beacon, and estimates beacon
//! positions by RSSI multilateration inside a floor-plan geometry.

pub mod core;
pub mod algorithms;
pub mod geometry;
pub mod processing;
pub mod validation;
pub mod utils;
pub mod api;

// Re-export commonly used types
pub use core::{BoundingBox, Position, ReceiverLocation, ReceiverMap, ReceiverPosition};
pub use algorithms::{distance_from_rssi, rssi_from_distance, Estimate, Multilaterator, PathLossModel};
pub use geometry::{point_in_polygon, Building, FloorPlan, Polygon, RoomPolygon};
pub use processing::{ReceiverRegistry, ScanObservation, ScanRecord, ScanStore};
pub use validation::{Error, EstimationError, GeometryError, RejectReason, Result};
pub use utils::SystemConfig;
pub use api::{EstimateOutcome, EstimateReport, PeriodicEstimator, PositioningService};
