//! Calibration sample capture
//!
//! While a calibration point is set, every accepted scan of the calibration
//! beacon is paired with that point and handed to a [`CalibrationSink`].

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::core::Position;
use crate::geometry::CalibrationPoint;
use crate::processing::ScanObservation;
use crate::validation::PersistenceError;

/// A receiver's reading of the calibration beacon at a known position
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationSample {
    /// Receiver that heard the beacon
    pub device_id: String,
    pub rssi: i32,
    pub timestamp: DateTime<Utc>,
    /// Room the calibration point lies in
    pub place: String,
    pub position: Position,
}

impl CalibrationSample {
    pub fn new(observation: &ScanObservation, point: &CalibrationPoint) -> Self {
        Self {
            device_id: observation.receiver_id.clone(),
            rssi: observation.rssi,
            timestamp: observation.timestamp,
            place: point.place.clone(),
            position: point.position,
        }
    }
}

/// Destination for calibration samples
pub trait CalibrationSink: Send + Sync {
    fn record(&self, sample: &CalibrationSample) -> Result<(), PersistenceError>;
}

/// Keeps samples in memory
#[derive(Debug, Default)]
pub struct MemoryCalibrationSink {
    samples: Mutex<Vec<CalibrationSample>>,
}

impl MemoryCalibrationSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn samples(&self) -> Vec<CalibrationSample> {
        self.samples.lock().clone()
    }
}

impl CalibrationSink for MemoryCalibrationSink {
    fn record(&self, sample: &CalibrationSample) -> Result<(), PersistenceError> {
        self.samples.lock().push(sample.clone());
        Ok(())
    }
}

/// Appends one JSON object per line to a file
#[derive(Debug)]
pub struct JsonLinesCalibrationSink {
    path: PathBuf,
    writer: Mutex<()>,
}

impl JsonLinesCalibrationSink {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into(), writer: Mutex::new(()) }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CalibrationSink for JsonLinesCalibrationSink {
    fn record(&self, sample: &CalibrationSample) -> Result<(), PersistenceError> {
        let mut line = serde_json::to_string(sample).map_err(|source| PersistenceError::Json {
            path: self.path.clone(),
            source,
        })?;
        line.push('\n');

        let io_err = |source| PersistenceError::Io { path: self.path.clone(), source };
        let _guard = self.writer.lock();
        let mut file = OpenOptions::new().create(true).append(true).open(&self.path).map_err(io_err)?;
        file.write_all(line.as_bytes()).map_err(io_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::fs;
    use tempfile::tempdir;

    fn sample(rssi: i32) -> CalibrationSample {
        CalibrationSample {
            device_id: "rx-01".to_string(),
            rssi,
            timestamp: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
            place: "kitchen".to_string(),
            position: Position::new(2.5, 4.0),
        }
    }

    #[test]
    fn test_memory_sink_keeps_order() {
        let sink = MemoryCalibrationSink::new();
        sink.record(&sample(-60)).unwrap();
        sink.record(&sample(-61)).unwrap();
        let rssi: Vec<i32> = sink.samples().iter().map(|s| s.rssi).collect();
        assert_eq!(rssi, vec![-60, -61]);
    }

    #[test]
    fn test_json_lines_sink_appends() {
        let dir = tempdir().unwrap();
        let sink = JsonLinesCalibrationSink::new(dir.path().join("calibration.jsonl"));
        sink.record(&sample(-60)).unwrap();
        sink.record(&sample(-70)).unwrap();

        let text = fs::read_to_string(sink.path()).unwrap();
        let parsed: Vec<CalibrationSample> = text.lines().map(|l| serde_json::from_str(l).unwrap()).collect();
        assert_eq!(parsed, vec![sample(-60), sample(-70)]);
    }

    #[test]
    fn test_sample_from_observation() {
        let observation = ScanObservation {
            address: "cal".to_string(),
            receiver_id: "rx-09".to_string(),
            rssi: -55,
            timestamp: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
            name: Some("ble_calibration".to_string()),
            manufacturer: None,
        };
        let point = CalibrationPoint { place: "hall".to_string(), position: Position::new(1.0, 1.0) };
        let sample = CalibrationSample::new(&observation, &point);
        assert_eq!(sample.device_id, "rx-09");
        assert_eq!(sample.place, "hall");
        assert_eq!(sample.position, Position::new(1.0, 1.0));
    }
}
