//! Scan ingestion, the windowed scan store and the receiver registry

pub mod parser;
pub mod registry;
pub mod store;

pub use parser::{
    clamp_stale_timestamp, parse_registration_payload, parse_scan_payload, parse_timestamp, ManufacturerCode,
    ScanObservation,
};
pub use registry::ReceiverRegistry;
pub use store::{Accepted, BeaconEntry, ScanRecord, ScanStore, StoreConfig};
