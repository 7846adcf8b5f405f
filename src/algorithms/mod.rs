//! Positioning algorithms

pub mod path_loss;
pub mod optimizer;
pub mod multilateration;

pub use path_loss::{distance_from_rssi, rssi_from_distance, PathLossModel};
pub use optimizer::{BoundedNelderMead, Minimum, NelderMeadConfig};
pub use multilateration::{Estimate, Multilaterator, MultilaterationConfig};
