//! RSSI multilateration
//!
//! Each reading is turned into a range estimate with the path-loss model, then
//! the position minimising `Σ (‖p - r_i‖ - d_i)²` over the located receivers is
//! found with a bounded Nelder-Mead search seeded at the receivers' centroid.

use std::collections::{BTreeMap, HashMap};

use nalgebra::Vector2;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::algorithms::optimizer::{BoundedNelderMead, NelderMeadConfig};
use crate::algorithms::path_loss::PathLossModel;
use crate::core::{BoundingBox, Position, ReceiverMap, MIN_RECEIVERS_FOR_FIX};
use crate::validation::EstimationError;

/// Estimator parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultilaterationConfig {
    pub path_loss: PathLossModel,
    pub solver: NelderMeadConfig,
    /// Located receivers required before a fix is attempted
    pub min_receivers: usize,
    /// Search region; the floor-plan extent when one is loaded
    pub bounds: BoundingBox,
}

impl Default for MultilaterationConfig {
    fn default() -> Self {
        Self {
            path_loss: PathLossModel::default(),
            solver: NelderMeadConfig::default(),
            min_receivers: MIN_RECEIVERS_FOR_FIX,
            bounds: BoundingBox::unit(),
        }
    }
}

/// A computed beacon position with solver diagnostics
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Estimate {
    pub position: Position,
    /// Receivers that contributed, in identifier order
    pub receivers_used: Vec<String>,
    /// Receivers that reported the beacon but have no registered location
    pub unknown_receivers: Vec<String>,
    /// Objective value at the returned position
    pub residual: f64,
    pub iterations: usize,
    pub converged: bool,
}

/// One located reading: receiver position and range derived from RSSI
#[derive(Debug, Clone, Copy)]
struct RangeMeasurement {
    receiver: Vector2<f64>,
    distance: f64,
}

/// Position estimator over a receiver registry
#[derive(Debug, Clone)]
pub struct Multilaterator {
    config: MultilaterationConfig,
    solver: BoundedNelderMead,
}

impl Default for Multilaterator {
    fn default() -> Self {
        Self::new(MultilaterationConfig::default())
    }
}

impl Multilaterator {
    pub fn new(config: MultilaterationConfig) -> Self {
        let solver = BoundedNelderMead::new(config.solver);
        Self { config, solver }
    }

    /// Same estimator restricted to a different search region
    pub fn with_bounds(mut self, bounds: BoundingBox) -> Self {
        self.config.bounds = bounds;
        self
    }

    pub fn config(&self) -> &MultilaterationConfig {
        &self.config
    }

    /// Estimate a beacon position from its per-receiver readings.
    ///
    /// Readings from receivers missing in `receivers` are skipped and listed in
    /// the result. Fewer than `min_receivers` located readings yields
    /// [`EstimationError::InsufficientCoverage`].
    pub fn estimate_position<R>(
        &self,
        readings: &HashMap<String, R>,
        receivers: &ReceiverMap,
    ) -> Result<Estimate, EstimationError>
    where
        R: Copy + Into<f64>,
    {
        // Sorted so that the objective sums in a fixed order
        let ordered: BTreeMap<&String, f64> =
            readings.iter().map(|(id, rssi)| (id, (*rssi).into())).collect();

        let mut measurements = Vec::with_capacity(ordered.len());
        let mut receivers_used = Vec::with_capacity(ordered.len());
        let mut unknown_receivers = Vec::new();

        for (receiver_id, rssi) in ordered {
            match receivers.get(receiver_id) {
                Some(location) => {
                    measurements.push(RangeMeasurement {
                        receiver: location.position().to_vector(),
                        distance: self.config.path_loss.distance(rssi),
                    });
                    receivers_used.push(receiver_id.clone());
                }
                None => {
                    warn!(receiver_id = %receiver_id, "reading from unregistered receiver skipped");
                    unknown_receivers.push(receiver_id.clone());
                }
            }
        }

        if measurements.len() < self.config.min_receivers {
            debug!(
                usable = measurements.len(),
                required = self.config.min_receivers,
                "not enough located receivers for a fix"
            );
            return Err(EstimationError::InsufficientCoverage {
                usable: measurements.len(),
                required: self.config.min_receivers,
                unknown_receivers,
            });
        }

        let seed = centroid(&measurements);
        let minimum = self.solver.minimize(
            |p| range_residual(&measurements, p),
            seed,
            &self.config.bounds,
        );

        let position = Position::from_vector(&minimum.point);
        if !position.is_finite() || !minimum.value.is_finite() {
            return Err(EstimationError::NonFinite { iterations: minimum.iterations });
        }

        Ok(Estimate {
            position,
            receivers_used,
            unknown_receivers,
            residual: minimum.value,
            iterations: minimum.iterations,
            converged: minimum.converged,
        })
    }

    /// Estimate every beacon in `groups` (address to per-receiver readings).
    ///
    /// Each address is solved independently; a failure is recorded for that
    /// address only.
    pub fn estimate_all<R>(
        &self,
        groups: &HashMap<String, HashMap<String, R>>,
        receivers: &ReceiverMap,
    ) -> BTreeMap<String, Result<Estimate, EstimationError>>
    where
        R: Copy + Into<f64>,
    {
        groups
            .iter()
            .map(|(address, readings)| {
                (address.clone(), self.estimate_position(readings, receivers))
            })
            .collect()
    }
}

fn centroid(measurements: &[RangeMeasurement]) -> Vector2<f64> {
    let sum = measurements
        .iter()
        .fold(Vector2::zeros(), |acc, m| acc + m.receiver);
    sum / measurements.len() as f64
}

fn range_residual(measurements: &[RangeMeasurement], p: &Vector2<f64>) -> f64 {
    measurements
        .iter()
        .map(|m| {
            let err = (p - m.receiver).norm() - m.distance;
            err * err
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ReceiverLocation;

    fn triangle_receivers() -> ReceiverMap {
        let mut receivers = ReceiverMap::new();
        receivers.insert("r1".to_string(), ReceiverLocation::planar(0.0, 0.0));
        receivers.insert("r2".to_string(), ReceiverLocation::planar(10.0, 0.0));
        receivers.insert("r3".to_string(), ReceiverLocation::planar(0.0, 10.0));
        receivers
    }

    fn room_estimator() -> Multilaterator {
        Multilaterator::default().with_bounds(BoundingBox::new(0.0, 0.0, 10.0, 10.0))
    }

    fn synthetic_readings(receivers: &ReceiverMap, beacon: Position, model: &PathLossModel) -> HashMap<String, f64> {
        receivers
            .iter()
            .map(|(id, loc)| (id.clone(), model.rssi(loc.position().distance_to(&beacon))))
            .collect()
    }

    #[test]
    fn test_recovers_ground_truth_from_noiseless_readings() {
        let estimator = room_estimator();
        let receivers = triangle_receivers();
        let truth = Position::new(5.0, 5.0);
        let readings = synthetic_readings(&receivers, truth, &estimator.config().path_loss);

        let estimate = estimator.estimate_position(&readings, &receivers).unwrap();

        assert!(estimate.position.distance_to(&truth) < 0.5, "got {:?}", estimate.position);
        assert_eq!(estimate.receivers_used, vec!["r1", "r2", "r3"]);
        assert!(estimate.unknown_receivers.is_empty());
        assert!(estimate.residual < 1e-6);
    }

    #[test]
    fn test_integer_rssi_readings_are_accepted() {
        let estimator = room_estimator();
        let receivers = triangle_receivers();
        let readings: HashMap<String, i32> = synthetic_readings(&receivers, Position::new(5.0, 5.0), &estimator.config().path_loss)
            .into_iter()
            .map(|(id, rssi)| (id, rssi.round() as i32))
            .collect();

        let estimate = estimator.estimate_position(&readings, &receivers).unwrap();
        assert!(estimate.position.distance_to(&Position::new(5.0, 5.0)) < 0.5);
    }

    #[test]
    fn test_two_readings_is_insufficient_coverage() {
        let estimator = room_estimator();
        let receivers = triangle_receivers();
        let mut readings = HashMap::new();
        readings.insert("r1".to_string(), -60.0);
        readings.insert("r2".to_string(), -65.0);

        let err = estimator.estimate_position(&readings, &receivers).unwrap_err();
        assert_eq!(
            err,
            EstimationError::InsufficientCoverage { usable: 2, required: 3, unknown_receivers: vec![] }
        );
    }

    #[test]
    fn test_unknown_receivers_are_skipped_not_fatal() {
        let estimator = room_estimator();
        let receivers = triangle_receivers();
        let mut readings = synthetic_readings(&receivers, Position::new(5.0, 5.0), &estimator.config().path_loss);
        readings.insert("ghost".to_string(), -40.0);

        let estimate = estimator.estimate_position(&readings, &receivers).unwrap();
        assert_eq!(estimate.unknown_receivers, vec!["ghost"]);
        assert_eq!(estimate.receivers_used.len(), 3);
        assert!(estimate.position.distance_to(&Position::new(5.0, 5.0)) < 0.5);
    }

    #[test]
    fn test_unknown_receivers_count_against_coverage() {
        let estimator = room_estimator();
        let receivers = triangle_receivers();
        let mut readings = HashMap::new();
        readings.insert("r1".to_string(), -60);
        readings.insert("r2".to_string(), -60);
        readings.insert("ghost".to_string(), -60);

        match estimator.estimate_position(&readings, &receivers) {
            Err(EstimationError::InsufficientCoverage { usable, unknown_receivers, .. }) => {
                assert_eq!(usable, 2);
                assert_eq!(unknown_receivers, vec!["ghost"]);
            }
            other => panic!("expected insufficient coverage, got {:?}", other),
        }
    }

    #[test]
    fn test_default_bounds_keep_estimate_in_unit_square() {
        let estimator = Multilaterator::default();
        let receivers = triangle_receivers();
        let readings = synthetic_readings(&receivers, Position::new(5.0, 5.0), &estimator.config().path_loss);

        let estimate = estimator.estimate_position(&readings, &receivers).unwrap();
        assert!(BoundingBox::unit().contains(&estimate.position));
    }

    #[test]
    fn test_estimate_all_isolates_failures() {
        let estimator = room_estimator();
        let receivers = triangle_receivers();
        let mut groups = HashMap::new();
        groups.insert(
            "aa:aa".to_string(),
            synthetic_readings(&receivers, Position::new(2.0, 3.0), &estimator.config().path_loss),
        );
        let mut sparse = HashMap::new();
        sparse.insert("r1".to_string(), -70.0);
        groups.insert("bb:bb".to_string(), sparse);

        let results = estimator.estimate_all(&groups, &receivers);
        assert_eq!(results.len(), 2);
        assert!(results["aa:aa"].as_ref().unwrap().position.distance_to(&Position::new(2.0, 3.0)) < 0.5);
        assert!(matches!(results["bb:bb"], Err(EstimationError::InsufficientCoverage { usable: 1, .. })));
    }

    #[test]
    fn test_estimation_is_deterministic() {
        let estimator = room_estimator();
        let receivers = triangle_receivers();
        let readings = synthetic_readings(&receivers, Position::new(6.5, 1.5), &estimator.config().path_loss);

        let first = estimator.estimate_position(&readings, &receivers).unwrap();
        let second = estimator.estimate_position(&readings, &receivers).unwrap();
        assert_eq!(first, second);
    }
}
