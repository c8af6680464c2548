//! Static universe data lookups.

use crate::types::{SolarSystemId, SolarSystemInfo};
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

/// Class code reported for systems the static data does not classify.
pub const UNKNOWN_SYSTEM_CLASS: i32 = -1;

/// Resolves solar system ids to their static description.
pub trait StaticInfo: Send + Sync + std::fmt::Debug {
    fn system_info(&self, solar_system_id: SolarSystemId) -> Option<SolarSystemInfo>;
}

#[derive(Debug, Error)]
pub enum StaticDataError {
    #[error("Failed to read static data file {0}: {1}")]
    Read(String, std::io::Error),

    #[error("Failed to parse static data file {0}: {1}")]
    Parse(String, serde_json::Error),
}

/// Static data held in memory, usually loaded from a JSON export.
#[derive(Debug, Default, Clone)]
pub struct InMemoryStaticInfo {
    systems: HashMap<SolarSystemId, SolarSystemInfo>,
}

impl InMemoryStaticInfo {
    pub fn new(systems: impl IntoIterator<Item = SolarSystemInfo>) -> Self {
        Self {
            systems: systems.into_iter().map(|s| (s.solar_system_id, s)).collect(),
        }
    }

    /// Loads a JSON array of `{solar_system_id, name, system_class}` objects.
    pub fn from_json_file(path: &Path) -> Result<Self, StaticDataError> {
        let display = path.display().to_string();
        let content = std::fs::read_to_string(path).map_err(|e| StaticDataError::Read(display.clone(), e))?;
        let systems: Vec<SolarSystemInfo> =
            serde_json::from_str(&content).map_err(|e| StaticDataError::Parse(display, e))?;
        Ok(Self::new(systems))
    }

    pub fn len(&self) -> usize {
        self.systems.len()
    }

    pub fn is_empty(&self) -> bool {
        self.systems.is_empty()
    }
}

impl StaticInfo for InMemoryStaticInfo {
    fn system_info(&self, solar_system_id: SolarSystemId) -> Option<SolarSystemInfo> {
        self.systems.get(&solar_system_id).cloned()
    }
}

/// Accepts any positive id, naming the system after its id.
///
/// Used when no static data export is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct PermissiveStaticInfo;

impl StaticInfo for PermissiveStaticInfo {
    fn system_info(&self, solar_system_id: SolarSystemId) -> Option<SolarSystemInfo> {
        (solar_system_id > 0).then(|| SolarSystemInfo {
            solar_system_id,
            name: solar_system_id.to_string(),
            system_class: UNKNOWN_SYSTEM_CLASS,
        })
    }
}
