//! Positioning service
//!
//! Owns the scan store and wires it to the receiver registry, the building
//! geometry and the estimator. Transport layers call into this type; it holds
//! no global state.

use chrono::{DateTime, Utc};
use rand::Rng;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

use crate::algorithms::Multilaterator;
use crate::api::calibration::{CalibrationSample, CalibrationSink, JsonLinesCalibrationSink};
use crate::api::types::{sorted_groups, EstimateReport, PositionsView, RssiGroups};
use crate::core::{BoundingBox, ReceiverPosition};
use crate::geometry::{Building, CalibrationPoint, FloorPlan};
use crate::processing::{parse_registration_payload, Accepted, BeaconEntry, ReceiverRegistry, ScanObservation, ScanStore};
use crate::utils::SystemConfig;
use crate::validation::{Error, GeometryError, RejectReason};

pub struct PositioningService {
    config: SystemConfig,
    store: ScanStore,
    registry: Arc<ReceiverRegistry>,
    building: Option<Arc<Building>>,
    estimator: Multilaterator,
    calibration_sink: Option<Arc<dyn CalibrationSink>>,
}

impl PositioningService {
    /// Assemble a service from already-loaded parts.
    ///
    /// The estimator searches the building's bounding box, or the unit square
    /// when there is no building.
    pub fn new(config: SystemConfig, registry: Arc<ReceiverRegistry>, building: Option<Arc<Building>>) -> Self {
        let bounds = building
            .as_ref()
            .map(|b| b.bounding_box())
            .unwrap_or_else(BoundingBox::unit);
        let estimator = Multilaterator::new(config.multilateration_config(bounds));
        let store = ScanStore::new(config.store);

        Self {
            config,
            store,
            registry,
            building,
            estimator,
            calibration_sink: None,
        }
    }

    pub fn with_calibration_sink(mut self, sink: Arc<dyn CalibrationSink>) -> Self {
        self.calibration_sink = Some(sink);
        self
    }

    /// Load the floor plan, receiver registry and calibration log named in
    /// `config.paths`.
    ///
    /// Receivers declared in the floor plan are added to the registry unless
    /// the registry already has a position for them.
    pub fn from_config(config: SystemConfig) -> Result<Self, Error> {
        let floor_plan = config.paths.floor_plan.as_ref().map(FloorPlan::load).transpose()?;

        let registry = match &config.paths.receivers {
            Some(path) => ReceiverRegistry::with_persistence(path)?,
            None => ReceiverRegistry::new(),
        };

        let building = match floor_plan {
            Some(plan) => {
                let missing: Vec<ReceiverPosition> = plan
                    .receivers
                    .into_iter()
                    .filter(|(id, _)| registry.get(id).is_none())
                    .map(|(receiver_id, position)| ReceiverPosition { receiver_id, position })
                    .collect();
                if !missing.is_empty() {
                    info!(count = missing.len(), "seeding registry from floor plan");
                    registry.register(missing)?;
                }
                Some(Arc::new(plan.building))
            }
            None => None,
        };

        let sink = config
            .paths
            .calibration_log
            .clone()
            .map(|path| Arc::new(JsonLinesCalibrationSink::new(path)) as Arc<dyn CalibrationSink>);

        let service = Self::new(config, Arc::new(registry), building);
        Ok(match sink {
            Some(sink) => service.with_calibration_sink(sink),
            None => service,
        })
    }

    pub fn config(&self) -> &SystemConfig {
        &self.config
    }

    pub fn store(&self) -> &ScanStore {
        &self.store
    }

    pub fn registry(&self) -> &Arc<ReceiverRegistry> {
        &self.registry
    }

    pub fn building(&self) -> Option<&Arc<Building>> {
        self.building.as_ref()
    }

    pub fn estimator(&self) -> &Multilaterator {
        &self.estimator
    }

    /// Ingest a JSON scan report
    pub fn handle_scan(&self, body: &str, now: DateTime<Utc>) -> Result<Accepted, RejectReason> {
        let observation = crate::processing::parse_scan_payload(body).map_err(|reason| {
            warn!(%reason, "scan rejected");
            reason
        })?;
        Ok(self.ingest(observation, now))
    }

    /// Ingest a decoded observation, capturing a calibration sample when it
    /// comes from the calibration beacon
    pub fn ingest(&self, observation: ScanObservation, now: DateTime<Utc>) -> Accepted {
        let calibration = self.calibration_sample(&observation);
        let accepted = self.store.ingest(observation, now);

        if let (Some(mut sample), Some(sink)) = (calibration, &self.calibration_sink) {
            if accepted.timestamp_clamped {
                sample.timestamp = now;
            }
            match sink.record(&sample) {
                Ok(()) => info!(
                    device_id = %sample.device_id,
                    rssi = sample.rssi,
                    place = %sample.place,
                    "calibration sample recorded"
                ),
                Err(e) => warn!(error = %e, "failed to record calibration sample"),
            }
        }
        accepted
    }

    fn calibration_sample(&self, observation: &ScanObservation) -> Option<CalibrationSample> {
        if observation.name.as_deref() != Some(self.config.calibration.beacon_name.as_str()) {
            return None;
        }
        let point = self.building.as_ref()?.calibration_point()?;
        Some(CalibrationSample::new(observation, &point))
    }

    /// Merge a JSON receiver registration into the registry. Returns the
    /// registry size.
    pub fn register_receivers(&self, body: &str) -> Result<usize, Error> {
        let receivers = parse_registration_payload(body)?;
        Ok(self.registry.register(receivers)?)
    }

    /// Readings fed to the estimator: recent readings of currently valid beacons
    fn estimation_input(&self, now: DateTime<Utc>) -> HashMap<String, HashMap<String, i32>> {
        let valid = self.store.current_valid_addresses(now);
        let mut readings = self.store.estimation_input(now);
        readings.retain(|address, _| valid.contains(address));
        readings
    }

    /// Estimate every beacon with recent readings
    pub fn estimate_positions(&self, now: DateTime<Utc>) -> EstimateReport {
        let readings = self.estimation_input(now);
        let receivers = self.registry.snapshot();
        EstimateReport::new(now, self.estimator.estimate_all(&readings, &receivers))
    }

    /// The per-receiver RSSI the estimator would see right now
    pub fn rssi_groups(&self, now: DateTime<Utc>) -> RssiGroups {
        sorted_groups(self.estimation_input(now))
    }

    pub fn valid_device_count(&self, now: DateTime<Utc>) -> usize {
        self.store.current_valid_addresses(now).len()
    }

    /// Every beacon in the store, most recently seen first
    pub fn scanned_devices(&self) -> Vec<BeaconEntry> {
        self.store.snapshot()
    }

    pub fn positions_view(&self, now: DateTime<Utc>) -> PositionsView {
        PositionsView::new(&self.registry.snapshot(), &self.estimate_positions(now))
    }

    /// Move the calibration point to a fresh random spot inside some room
    pub fn resample_calibration_point<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<CalibrationPoint, GeometryError> {
        let building = self.building.as_ref().ok_or(GeometryError::NoRooms)?;
        building.resample_calibration_point(rng, self.config.sampling.max_attempts)
    }
}
