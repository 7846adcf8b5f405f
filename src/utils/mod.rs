//! Configuration and logging

pub mod config;
pub mod logging;

pub use config::{CalibrationConfig, PathsConfig, SamplingConfig, SolverConfig, SystemConfig, ValidationReport};
pub use logging::{init_logging, LogConfig, LogFormat, LogLevel};
