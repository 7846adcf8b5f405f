//! Serializable views returned by the service

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

use crate::algorithms::Estimate;
use crate::core::{Position, ReceiverLocation, ReceiverMap};
use crate::validation::EstimationError;

/// Estimate query result for one beacon: a position, or the reason there is none
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum EstimateOutcome {
    Located { x: f64, y: f64 },
    Unavailable(EstimationError),
}

impl From<Result<Estimate, EstimationError>> for EstimateOutcome {
    fn from(result: Result<Estimate, EstimationError>) -> Self {
        match result {
            Ok(estimate) => EstimateOutcome::Located {
                x: estimate.position.x,
                y: estimate.position.y,
            },
            Err(e) => EstimateOutcome::Unavailable(e),
        }
    }
}

impl EstimateOutcome {
    pub fn position(&self) -> Option<Position> {
        match self {
            EstimateOutcome::Located { x, y } => Some(Position::new(*x, *y)),
            EstimateOutcome::Unavailable(_) => None,
        }
    }
}

/// One estimation pass over every beacon with recent readings
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EstimateReport {
    pub generated_at: DateTime<Utc>,
    pub located: usize,
    pub unavailable: usize,
    /// Keyed by beacon address
    pub positions: BTreeMap<String, EstimateOutcome>,
}

impl EstimateReport {
    pub fn new(generated_at: DateTime<Utc>, results: BTreeMap<String, Result<Estimate, EstimationError>>) -> Self {
        let positions: BTreeMap<String, EstimateOutcome> =
            results.into_iter().map(|(address, result)| (address, result.into())).collect();
        let located = positions.values().filter(|o| o.position().is_some()).count();
        Self {
            generated_at,
            located,
            unavailable: positions.len() - located,
            positions,
        }
    }

    pub fn empty(generated_at: DateTime<Utc>) -> Self {
        Self::new(generated_at, BTreeMap::new())
    }

    /// Located beacons only
    pub fn senders(&self) -> BTreeMap<String, Position> {
        self.positions
            .iter()
            .filter_map(|(address, outcome)| outcome.position().map(|p| (address.clone(), p)))
            .collect()
    }
}

/// Raw per-receiver RSSI, keyed by address then receiver, for diagnostics
pub type RssiGroups = BTreeMap<String, BTreeMap<String, i32>>;

pub(crate) fn sorted_groups(groups: HashMap<String, HashMap<String, i32>>) -> RssiGroups {
    groups
        .into_iter()
        .map(|(address, readings)| (address, readings.into_iter().collect()))
        .collect()
}

/// Everything with a position: fixed receivers and located beacons
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PositionsView {
    pub receivers: BTreeMap<String, ReceiverLocation>,
    pub senders: BTreeMap<String, Position>,
}

impl PositionsView {
    pub fn new(receivers: &ReceiverMap, report: &EstimateReport) -> Self {
        Self {
            receivers: receivers.iter().map(|(id, loc)| (id.clone(), *loc)).collect(),
            senders: report.senders(),
        }
    }
}
