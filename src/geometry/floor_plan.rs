//! Floor-plan documents
//!
//! A floor plan is a TOML document of the form
//!
//! ```toml
//! [building]
//! walls = [[0, 0], [30, 0], [30, 20], [0, 20]]
//!
//! [[building.room]]
//! name = "kitchen"
//! walls = [[0, 0], [10, 0], [10, 20], [0, 20]]
//!
//! [[building.receiver]]
//! device_id = "rx-01"
//! position = { x = 1.0, y = 1.0, z = 2.5 }
//! ```
//!
//! Rooms and receivers are optional. All polygons are validated on load.

use std::fs;
use std::path::Path;

use serde::Deserialize;
use tracing::info;

use crate::core::{ReceiverLocation, ReceiverMap};
use crate::geometry::building::{Building, RoomPolygon};
use crate::geometry::polygon::Polygon;
use crate::validation::ConfigError;

#[derive(Debug, Deserialize)]
struct FloorPlanDocument {
    building: BuildingSection,
}

#[derive(Debug, Deserialize)]
struct BuildingSection {
    walls: Polygon,
    #[serde(default)]
    room: Vec<RoomSection>,
    #[serde(default)]
    receiver: Vec<ReceiverSection>,
}

#[derive(Debug, Deserialize)]
struct RoomSection {
    name: String,
    #[serde(alias = "vertices")]
    walls: Polygon,
}

#[derive(Debug, Deserialize)]
struct ReceiverSection {
    device_id: String,
    position: ReceiverLocation,
}

/// A loaded floor plan: geometry plus any receivers it declares
#[derive(Debug)]
pub struct FloorPlan {
    pub building: Building,
    pub receivers: ReceiverMap,
}

impl FloorPlan {
    /// Read and validate a floor plan from disk
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let plan = Self::parse(&text, path)?;
        info!(
            path = %path.display(),
            rooms = plan.building.rooms().len(),
            receivers = plan.receivers.len(),
            "floor plan loaded"
        );
        Ok(plan)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Self::parse(text, Path::new("<inline floor plan>"))
    }

    fn parse(text: &str, path: &Path) -> Result<Self, ConfigError> {
        let document: FloorPlanDocument = toml::from_str(text).map_err(|source| ConfigError::Toml {
            path: path.to_path_buf(),
            source,
        })?;
        let section = document.building;

        let rooms = section
            .room
            .into_iter()
            .map(|room| RoomPolygon::new(room.name, room.walls))
            .collect();
        let building = Building::new(section.walls, rooms)?;

        let receivers = section
            .receiver
            .into_iter()
            .map(|r| (r.device_id, r.position))
            .collect();

        Ok(Self { building, receivers })
    }
}
