//! Error taxonomy and input validation

pub mod error;

pub use error::{
    ConfigError, Error, EstimationError, GeometryError, PersistenceError, RejectReason, Result,
};
