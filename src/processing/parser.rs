use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use tracing::debug;

use crate::core::{ReceiverLocation, ReceiverPosition};
use crate::validation::RejectReason;

/// Accepted `time` layouts, tried in order.
///
/// The first layout also accepts a missing fractional part, so both
/// `2024-05-01T12:00:00.123456Z` and `2024-05-01T12:00:00Z` resolve there.
/// RFC 3339 with an explicit offset is the last resort.
const TIMESTAMP_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.fZ", "%Y-%m-%dT%H:%M:%SZ"];

/// Receiver identifiers arrive as strings or bare integers
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
enum Identifier {
    Text(String),
    Number(i64),
}

impl From<Identifier> for String {
    fn from(id: Identifier) -> Self {
        match id {
            Identifier::Text(s) => s,
            Identifier::Number(n) => n.to_string(),
        }
    }
}

/// Advertised manufacturer identifier, numeric or textual depending on the sender
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ManufacturerCode {
    Numeric(u64),
    Text(String),
}

impl ManufacturerCode {
    /// Map any JSON value onto a code. Unsigned integers stay numeric, strings
    /// stay textual, anything else keeps its JSON rendering as text.
    fn from_json(value: Value) -> Option<Self> {
        match value {
            Value::Null => None,
            Value::Number(n) => Some(match n.as_u64() {
                Some(code) => ManufacturerCode::Numeric(code),
                None => ManufacturerCode::Text(n.to_string()),
            }),
            Value::String(s) => Some(ManufacturerCode::Text(s)),
            other => Some(ManufacturerCode::Text(other.to_string())),
        }
    }
}

impl fmt::Display for ManufacturerCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ManufacturerCode::Numeric(n) => write!(f, "{}", n),
            ManufacturerCode::Text(s) => write!(f, "{}", s),
        }
    }
}

/// Wire form of a scan report. Every field is optional here so that missing
/// fields can be reported by name. Metadata fields are kept as raw JSON and
/// never cause a rejection.
#[derive(Debug, Deserialize)]
struct ScanPayload {
    #[serde(default)]
    device_id: Option<Identifier>,
    #[serde(default)]
    address: Option<String>,
    #[serde(default)]
    rssi: Option<i32>,
    #[serde(default)]
    manufacture_id: Option<Value>,
    #[serde(default)]
    name: Option<Value>,
    #[serde(default)]
    time: Option<String>,
}

/// A well-formed scan report: one receiver hearing one beacon
#[derive(Debug, Clone, PartialEq)]
pub struct ScanObservation {
    pub address: String,
    pub receiver_id: String,
    pub rssi: i32,
    pub timestamp: DateTime<Utc>,
    pub name: Option<String>,
    pub manufacturer: Option<ManufacturerCode>,
}

/// Decode an ingestion payload.
///
/// `address`, `device_id`, `rssi` and `time` are required; empty strings count
/// as missing.
pub fn parse_scan_payload(body: &str) -> Result<ScanObservation, RejectReason> {
    let payload: ScanPayload = serde_json::from_str(body)
        .map_err(|e| RejectReason::malformed(format!("request body must be a JSON object: {}", e)))?;

    let address = payload
        .address
        .filter(|a| !a.is_empty())
        .ok_or_else(|| RejectReason::malformed("missing address"))?;
    let receiver_id: String = payload
        .device_id
        .map(String::from)
        .filter(|id| !id.is_empty())
        .ok_or_else(|| RejectReason::malformed("missing device_id"))?;
    let rssi = payload.rssi.ok_or_else(|| RejectReason::malformed("missing rssi"))?;
    let time = payload.time.ok_or_else(|| RejectReason::malformed("missing time"))?;
    let timestamp = parse_timestamp(&time)?;

    Ok(ScanObservation {
        address,
        receiver_id,
        rssi,
        timestamp,
        name: payload.name.and_then(beacon_name),
        manufacturer: payload.manufacture_id.and_then(ManufacturerCode::from_json),
    })
}

/// Advertised names are text; scalars are rendered, structures are dropped
fn beacon_name(value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        other => {
            debug!(name = %other, "non-scalar beacon name ignored");
            None
        }
    }
}

/// Parse a UTC timestamp in any of the accepted wire layouts
pub fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, RejectReason> {
    for format in TIMESTAMP_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
            return Ok(naive.and_utc());
        }
    }
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| RejectReason::UnparseableTimestamp { value: value.to_string() })
}

/// Replace timestamps older than `max_age` with `now`.
///
/// Returns the timestamp to store and whether it was replaced. Senders with a
/// reset clock report dates decades in the past; their scans are still current.
pub fn clamp_stale_timestamp(
    timestamp: DateTime<Utc>,
    now: DateTime<Utc>,
    max_age: Duration,
) -> (DateTime<Utc>, bool) {
    // A window reaching past the representable range clamps nothing
    let oldest = match now.checked_sub_signed(max_age) {
        Some(oldest) => oldest,
        None => return (timestamp, false),
    };
    if timestamp < oldest {
        (now, true)
    } else {
        (timestamp, false)
    }
}

#[derive(Debug, Deserialize)]
struct RegistrationEntry {
    #[serde(default)]
    device_id: Option<Identifier>,
    #[serde(default)]
    position: Option<ReceiverLocation>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RegistrationDocument {
    Wrapped { devices: Vec<RegistrationEntry> },
    Bare(Vec<RegistrationEntry>),
}

/// Decode a receiver registration payload.
///
/// Accepts either a bare list or `{"devices": [...]}`. Entries without a
/// `device_id` or `position` are skipped.
pub fn parse_registration_payload(body: &str) -> Result<Vec<ReceiverPosition>, RejectReason> {
    let document: RegistrationDocument = serde_json::from_str(body).map_err(|e| {
        RejectReason::malformed(format!("expected a list of {{device_id, position}}: {}", e))
    })?;
    let entries = match document {
        RegistrationDocument::Wrapped { devices } => devices,
        RegistrationDocument::Bare(devices) => devices,
    };

    let total = entries.len();
    let receivers: Vec<ReceiverPosition> = entries
        .into_iter()
        .filter_map(|entry| {
            let receiver_id = String::from(entry.device_id?);
            if receiver_id.is_empty() {
                return None;
            }
            Some(ReceiverPosition { receiver_id, position: entry.position? })
        })
        .collect();

    if receivers.len() < total {
        debug!(skipped = total - receivers.len(), "incomplete receiver entries ignored");
    }
    Ok(receivers)
}
