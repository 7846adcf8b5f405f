//! Service façade and the views it returns
//!
//! Transport layers (HTTP handlers, the CLI) talk to [`PositioningService`];
//! everything it returns serializes to JSON.

pub mod calibration;
pub mod periodic;
pub mod service;
pub mod types;

pub use calibration::{CalibrationSample, CalibrationSink, JsonLinesCalibrationSink, MemoryCalibrationSink};
pub use periodic::PeriodicEstimator;
pub use service::PositioningService;
pub use types::{EstimateOutcome, EstimateReport, PositionsView, RssiGroups};
