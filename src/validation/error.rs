use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

/// Why an ingestion payload was refused.
///
/// A rejected payload leaves the scan store untouched.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum RejectReason {
    /// Body is not JSON, or a required field is missing or has the wrong type
    #[error("malformed payload: {details}")]
    MalformedPayload { details: String },
    /// `time` did not match any accepted wire format
    #[error("unparseable timestamp: {value:?}")]
    UnparseableTimestamp { value: String },
}

impl RejectReason {
    pub fn malformed(details: impl Into<String>) -> Self {
        RejectReason::MalformedPayload { details: details.into() }
    }

    /// HTTP-equivalent status for the transport layer
    pub fn status_code(&self) -> u16 {
        400
    }
}

/// Per-beacon estimation failure. Never aborts a batch.
#[derive(Debug, Clone, PartialEq, Error, Serialize)]
#[serde(tag = "error", rename_all = "snake_case")]
pub enum EstimationError {
    #[error("insufficient coverage: {usable} located receivers, {required} required")]
    InsufficientCoverage {
        usable: usize,
        required: usize,
        /// Receivers that reported the beacon but are missing from the registry
        unknown_receivers: Vec<String>,
    },
    #[error("solver produced a non-finite position after {iterations} iterations")]
    NonFinite { iterations: usize },
}

/// Malformed floor-plan geometry or failed sampling
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GeometryError {
    #[error("polygon {polygon:?} has {count} vertices, at least 3 required")]
    TooFewVertices { polygon: String, count: usize },
    #[error("polygon {polygon:?} has a non-finite coordinate at vertex {index}")]
    NonFiniteVertex { polygon: String, index: usize },
    #[error("polygon {polygon:?} has a zero-length edge at vertex {index}")]
    ZeroLengthEdge { polygon: String, index: usize },
    #[error("polygon {polygon:?} encloses zero area")]
    ZeroArea { polygon: String },
    #[error("polygon {polygon:?} self-intersects between edges {first_edge} and {second_edge}")]
    SelfIntersecting {
        polygon: String,
        first_edge: usize,
        second_edge: usize,
    },
    #[error("building has no rooms")]
    NoRooms,
    #[error("no room hit after {attempts} sampling attempts")]
    NoRoomFound { attempts: usize },
}

/// Configuration and floor-plan loading failures
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Toml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid {parameter} = {value}: {reason}")]
    InvalidParameter {
        parameter: String,
        value: String,
        reason: String,
    },
    #[error(transparent)]
    Geometry(#[from] GeometryError),
}

impl ConfigError {
    pub fn invalid(parameter: &str, value: impl ToString, reason: &str) -> Self {
        ConfigError::InvalidParameter {
            parameter: parameter.to_string(),
            value: value.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Failures reading or writing JSON documents on disk
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("i/o error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Top-level error for fallible crate operations
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Rejected(#[from] RejectReason),
    #[error(transparent)]
    Estimation(#[from] EstimationError),
    #[error(transparent)]
    Geometry(#[from] GeometryError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

pub type Result<T> = std::result::Result<T, Error>;
