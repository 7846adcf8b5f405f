//! Log-distance path-loss model
//!
//! Relates received signal strength to distance as
//! `rssi = tx_power - 10 * n * log10(d)`, where `tx_power` is the RSSI measured
//! at one distance unit and `n` is the environment-dependent path-loss exponent.

use serde::{Deserialize, Serialize};

use crate::core::{DEFAULT_PATH_LOSS_EXPONENT, DEFAULT_TX_POWER_DBM};

/// Estimated distance for a reading of `rssi` dBm.
///
/// # Panics
///
/// Panics if `path_loss_exponent` is not a positive finite number. That is a
/// configuration bug, not bad sensor data.
pub fn distance_from_rssi(rssi: f64, tx_power: f64, path_loss_exponent: f64) -> f64 {
    assert_valid_exponent(path_loss_exponent);
    10f64.powf((tx_power - rssi) / (10.0 * path_loss_exponent))
}

/// Expected RSSI at `distance`. Inverse of [`distance_from_rssi`] for positive distances.
///
/// # Panics
///
/// Panics if `path_loss_exponent` is not a positive finite number.
pub fn rssi_from_distance(distance: f64, tx_power: f64, path_loss_exponent: f64) -> f64 {
    assert_valid_exponent(path_loss_exponent);
    tx_power - 10.0 * path_loss_exponent * distance.log10()
}

fn assert_valid_exponent(n: f64) {
    assert!(
        n.is_finite() && n > 0.0,
        "path-loss exponent must be positive and finite, got {}",
        n
    );
}

/// Path-loss parameters shared by every receiver
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathLossModel {
    /// RSSI at one distance unit (dBm)
    pub tx_power_dbm: f64,
    /// Propagation exponent, 2.0 in free space
    pub path_loss_exponent: f64,
}

impl Default for PathLossModel {
    fn default() -> Self {
        Self {
            tx_power_dbm: DEFAULT_TX_POWER_DBM,
            path_loss_exponent: DEFAULT_PATH_LOSS_EXPONENT,
        }
    }
}

impl PathLossModel {
    /// # Panics
    ///
    /// Panics if `path_loss_exponent` is not a positive finite number.
    pub fn new(tx_power_dbm: f64, path_loss_exponent: f64) -> Self {
        assert_valid_exponent(path_loss_exponent);
        Self { tx_power_dbm, path_loss_exponent }
    }

    pub fn distance(&self, rssi: f64) -> f64 {
        distance_from_rssi(rssi, self.tx_power_dbm, self.path_loss_exponent)
    }

    pub fn rssi(&self, distance: f64) -> f64 {
        rssi_from_distance(distance, self.tx_power_dbm, self.path_loss_exponent)
    }
}
