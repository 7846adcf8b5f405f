//! Default model parameters and time windows

/// Transmit power assumed for beacons when none is configured (dBm at 1 m)
pub const DEFAULT_TX_POWER_DBM: f64 = -50.0;

/// Path-loss exponent for free-space-like propagation
pub const DEFAULT_PATH_LOSS_EXPONENT: f64 = 2.0;

/// Beacons not heard from within this window are evicted (seconds)
pub const DEFAULT_STALE_WINDOW_SECS: u64 = 30 * 60;

/// Window in which a beacon counts as currently valid (seconds)
pub const DEFAULT_VALIDITY_WINDOW_SECS: u64 = 5 * 60;

/// Readings older than this are not used for position estimation (seconds)
pub const DEFAULT_ESTIMATION_WINDOW_SECS: u64 = 10;

/// Minimum strongest-reading RSSI for a valid beacon. -200 dBm accepts everything.
pub const DEFAULT_RSSI_THRESHOLD_DBM: i32 = -200;

/// Timestamps older than this many days are replaced with the ingestion time
pub const DEFAULT_MAX_TIMESTAMP_AGE_DAYS: i64 = 365;

/// Minimum number of located receivers needed for a 2-D fix
pub const MIN_RECEIVERS_FOR_FIX: usize = 3;

/// Draw budget for rejection sampling inside rooms
pub const DEFAULT_SAMPLING_ATTEMPTS: usize = 10_000;

/// Advertised name of the beacon used for calibration captures
pub const DEFAULT_CALIBRATION_BEACON_NAME: &str = "ble_calibration";

/// Upper bound accepted for any store window: ten years (seconds)
pub const MAX_WINDOW_SECS: u64 = 10 * 365 * 24 * 60 * 60;

/// Upper bound accepted for the timestamp clamp age (days)
pub const MAX_TIMESTAMP_AGE_DAYS: i64 = 100 * 365;
