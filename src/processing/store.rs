//! Windowed scan store
//!
//! Keeps the latest reading of every receiver for every beacon heard within
//! the stale window. All state sits behind one `RwLock`; writers hold it only
//! for a single map update, and readers copy out a snapshot, so a reader never
//! sees a half-applied upsert.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::{
    DEFAULT_ESTIMATION_WINDOW_SECS, DEFAULT_MAX_TIMESTAMP_AGE_DAYS, DEFAULT_RSSI_THRESHOLD_DBM,
    DEFAULT_STALE_WINDOW_SECS, DEFAULT_VALIDITY_WINDOW_SECS,
};
use crate::processing::parser::{clamp_stale_timestamp, parse_scan_payload, ManufacturerCode, ScanObservation};
use crate::validation::RejectReason;

/// One receiver's latest reading of a beacon
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScanRecord {
    pub receiver_id: String,
    pub rssi: i32,
    pub timestamp: DateTime<Utc>,
}

/// Everything known about one beacon
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BeaconEntry {
    pub address: String,
    pub display_name: Option<String>,
    pub manufacturer_code: Option<ManufacturerCode>,
    /// Latest timestamp over `readings`
    pub last_seen: DateTime<Utc>,
    pub readings: HashMap<String, ScanRecord>,
}

impl BeaconEntry {
    fn new(obs: ScanObservation) -> Self {
        let record = ScanRecord {
            receiver_id: obs.receiver_id.clone(),
            rssi: obs.rssi,
            timestamp: obs.timestamp,
        };
        let mut readings = HashMap::new();
        readings.insert(obs.receiver_id, record);

        Self {
            address: obs.address,
            display_name: obs.name,
            manufacturer_code: obs.manufacturer,
            last_seen: obs.timestamp,
            readings,
        }
    }

    /// Replace this receiver's reading and refresh the beacon metadata
    fn upsert(&mut self, obs: ScanObservation) {
        if obs.name.is_some() {
            self.display_name = obs.name;
        }
        if obs.manufacturer.is_some() {
            self.manufacturer_code = obs.manufacturer;
        }
        self.readings.insert(
            obs.receiver_id.clone(),
            ScanRecord {
                receiver_id: obs.receiver_id,
                rssi: obs.rssi,
                timestamp: obs.timestamp,
            },
        );
        if let Some(latest) = self.readings.values().map(|r| r.timestamp).max() {
            self.last_seen = latest;
        }
    }

    /// Strongest current reading
    pub fn max_rssi(&self) -> Option<i32> {
        self.readings.values().map(|r| r.rssi).max()
    }
}

/// Time windows and thresholds for the store
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Beacons unseen for longer than this are evicted
    pub stale_window_secs: u64,
    /// A beacon is valid if seen within this window
    pub validity_window_secs: u64,
    /// ...and its strongest reading is at least this strong
    pub rssi_threshold_dbm: i32,
    /// Only readings this recent feed position estimation
    pub estimation_window_secs: u64,
    /// Reported timestamps older than this are replaced with the ingestion time
    pub max_timestamp_age_days: i64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            stale_window_secs: DEFAULT_STALE_WINDOW_SECS,
            validity_window_secs: DEFAULT_VALIDITY_WINDOW_SECS,
            rssi_threshold_dbm: DEFAULT_RSSI_THRESHOLD_DBM,
            estimation_window_secs: DEFAULT_ESTIMATION_WINDOW_SECS,
            max_timestamp_age_days: DEFAULT_MAX_TIMESTAMP_AGE_DAYS,
        }
    }
}

/// Windows beyond the representable range saturate at `Duration::MAX`
fn saturating_seconds(secs: u64) -> Duration {
    i64::try_from(secs)
        .ok()
        .and_then(Duration::try_seconds)
        .unwrap_or(Duration::MAX)
}

/// Start of the window ending at `now`; a window older than the calendar
/// starts at its earliest instant
fn window_start(now: DateTime<Utc>, window: Duration) -> DateTime<Utc> {
    now.checked_sub_signed(window).unwrap_or(DateTime::<Utc>::MIN_UTC)
}

impl StoreConfig {
    pub fn stale_window(&self) -> Duration {
        saturating_seconds(self.stale_window_secs)
    }

    pub fn validity_window(&self) -> Duration {
        saturating_seconds(self.validity_window_secs)
    }

    pub fn estimation_window(&self) -> Duration {
        saturating_seconds(self.estimation_window_secs)
    }

    pub fn max_timestamp_age(&self) -> Duration {
        Duration::try_days(self.max_timestamp_age_days).unwrap_or(Duration::MAX)
    }
}

/// Result of a successful ingestion
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Accepted {
    pub address: String,
    /// First reading for this address in the current window
    pub created: bool,
    /// The reported timestamp was too old and was replaced with `now`
    pub timestamp_clamped: bool,
    /// Beacons removed by the post-ingestion sweep
    pub evicted: usize,
}

/// Concurrent beacon-address keyed store of recent scans
#[derive(Debug, Default)]
pub struct ScanStore {
    config: StoreConfig,
    beacons: RwLock<HashMap<String, BeaconEntry>>,
}

impl ScanStore {
    pub fn new(config: StoreConfig) -> Self {
        Self {
            config,
            beacons: RwLock::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Decode and ingest a JSON scan report
    pub fn ingest_payload(&self, body: &str, now: DateTime<Utc>) -> Result<Accepted, RejectReason> {
        let observation = parse_scan_payload(body)?;
        Ok(self.ingest(observation, now))
    }

    /// Record a well-formed observation, then sweep stale beacons.
    ///
    /// Only the latest reading per (address, receiver) is kept; a second
    /// reading from the same receiver overwrites the first.
    pub fn ingest(&self, mut observation: ScanObservation, now: DateTime<Utc>) -> Accepted {
        let (timestamp, timestamp_clamped) =
            clamp_stale_timestamp(observation.timestamp, now, self.config.max_timestamp_age());
        if timestamp_clamped {
            debug!(
                address = %observation.address,
                reported = %observation.timestamp,
                "timestamp too old, using ingestion time"
            );
        }
        observation.timestamp = timestamp;

        let address = observation.address.clone();
        let created = {
            let mut beacons = self.beacons.write();
            match beacons.get_mut(&address) {
                Some(entry) => {
                    entry.upsert(observation);
                    false
                }
                None => {
                    beacons.insert(address.clone(), BeaconEntry::new(observation));
                    true
                }
            }
        };

        let evicted = self.evict_stale(now, self.config.stale_window());
        Accepted { address, created, timestamp_clamped, evicted }
    }

    /// Remove every beacon whose `last_seen` is older than `now - window`.
    /// Returns how many were removed.
    pub fn evict_stale(&self, now: DateTime<Utc>, window: Duration) -> usize {
        let cutoff = window_start(now, window);
        let mut beacons = self.beacons.write();
        let before = beacons.len();
        beacons.retain(|_, entry| entry.last_seen >= cutoff && !entry.readings.is_empty());
        let evicted = before - beacons.len();
        if evicted > 0 {
            debug!(evicted, remaining = beacons.len(), "stale beacons evicted");
        }
        evicted
    }

    /// Addresses seen within `validity_window` whose strongest current reading
    /// is at least `rssi_threshold` dBm
    pub fn valid_addresses(
        &self,
        now: DateTime<Utc>,
        validity_window: Duration,
        rssi_threshold: i32,
    ) -> HashSet<String> {
        let cutoff = window_start(now, validity_window);
        self.beacons
            .read()
            .values()
            .filter(|entry| entry.last_seen >= cutoff)
            .filter(|entry| entry.max_rssi().map_or(false, |rssi| rssi >= rssi_threshold))
            .map(|entry| entry.address.clone())
            .collect()
    }

    /// [`valid_addresses`](Self::valid_addresses) with the configured window and threshold
    pub fn current_valid_addresses(&self, now: DateTime<Utc>) -> HashSet<String> {
        self.valid_addresses(now, self.config.validity_window(), self.config.rssi_threshold_dbm)
    }

    /// Point-in-time copy of every beacon's readings, keyed by address then receiver
    pub fn group_by_address(&self) -> HashMap<String, HashMap<String, ScanRecord>> {
        self.beacons
            .read()
            .iter()
            .map(|(address, entry)| (address.clone(), entry.readings.clone()))
            .collect()
    }

    /// RSSI per receiver for readings no older than `max_age`.
    ///
    /// Beacons left with no qualifying readings are omitted.
    pub fn recent_readings(&self, now: DateTime<Utc>, max_age: Duration) -> HashMap<String, HashMap<String, i32>> {
        let cutoff = window_start(now, max_age);
        self.beacons
            .read()
            .iter()
            .filter_map(|(address, entry)| {
                let readings: HashMap<String, i32> = entry
                    .readings
                    .values()
                    .filter(|r| r.timestamp >= cutoff)
                    .map(|r| (r.receiver_id.clone(), r.rssi))
                    .collect();
                (!readings.is_empty()).then(|| (address.clone(), readings))
            })
            .collect()
    }

    /// Readings inside the configured estimation window
    pub fn estimation_input(&self, now: DateTime<Utc>) -> HashMap<String, HashMap<String, i32>> {
        self.recent_readings(now, self.config.estimation_window())
    }

    /// Copy of every entry, most recently seen first
    pub fn snapshot(&self) -> Vec<BeaconEntry> {
        let mut entries: Vec<BeaconEntry> = self.beacons.read().values().cloned().collect();
        entries.sort_by(|a, b| b.last_seen.cmp(&a.last_seen).then_with(|| a.address.cmp(&b.address)));
        entries
    }

    pub fn get(&self, address: &str) -> Option<BeaconEntry> {
        self.beacons.read().get(address).cloned()
    }

    pub fn len(&self) -> usize {
        self.beacons.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.beacons.read().is_empty()
    }
}
