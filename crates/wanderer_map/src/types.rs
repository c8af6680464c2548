//! # Core Map Types
//!
//! Fundamental records managed by a map's state engine: solar systems
//! (nodes), connections (edges), signatures and the per-map option set.
//!
//! ## Key Types
//!
//! - [`MapId`] - Unique identifier of a map
//! - [`System`] - A solar system placed on a map
//! - [`Connection`] - A route between two systems on the same map
//! - [`Signature`] - An in-system object, optionally linked to another system
//! - [`MapOptions`] - Layout and display options that affect the engine

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable external identifier of a solar system.
pub type SolarSystemId = i64;

/// External identifier of a tracked character.
pub type CharacterId = i64;

// ============================================================================
// Identifiers
// ============================================================================

/// Unique identifier for a map.
///
/// Wraps a UUID so map ids cannot be confused with record ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MapId(pub Uuid);

impl MapId {
    /// Creates a new random map ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for MapId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::str::FromStr for MapId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

impl std::fmt::Display for MapId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Systems
// ============================================================================

/// Display status a mapper can assign to a system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SystemStatus {
    #[default]
    Unknown,
    Friendly,
    Warning,
    TargetPrimary,
    TargetSecondary,
    DangerousPrimary,
    DangerousSecondary,
    LookingFor,
    Home,
}

impl SystemStatus {
    /// Maps the numeric status code used by API clients.
    pub fn from_code(code: i64) -> Option<Self> {
        Some(match code {
            0 => Self::Unknown,
            1 => Self::Friendly,
            2 => Self::Warning,
            3 => Self::TargetPrimary,
            4 => Self::TargetSecondary,
            5 => Self::DangerousPrimary,
            6 => Self::DangerousSecondary,
            7 => Self::LookingFor,
            8 => Self::Home,
            _ => return None,
        })
    }
}

/// Largest coordinate magnitude accepted for a system node.
pub const CANVAS_LIMIT: i32 = 1_000_000;

/// Top-left corner of a system node on the map canvas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: i32,
    pub y: i32,
}

impl Position {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Both coordinates lie within [`CANVAS_LIMIT`] of the origin.
    pub fn on_canvas(&self) -> bool {
        let range = -CANVAS_LIMIT..=CANVAS_LIMIT;
        range.contains(&self.x) && range.contains(&self.y)
    }
}

/// A solar system placed on a map.
///
/// Exactly one `System` exists per `(map_id, solar_system_id)`. Instances are
/// only mutated by the map's engine, and a position change always re-indexes
/// the system's bounding rectangle in the same step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct System {
    pub id: Uuid,
    pub map_id: MapId,
    pub solar_system_id: SolarSystemId,
    pub name: String,
    pub custom_name: Option<String>,
    pub temporary_name: Option<String>,
    pub description: Option<String>,
    pub labels: Option<String>,
    pub tag: Option<String>,
    pub status: SystemStatus,
    pub position_x: i32,
    pub position_y: i32,
    pub visible: bool,
    pub locked: bool,
    pub linked_signature_eve_id: Option<String>,
}

impl System {
    /// Creates a visible, unlocked system at the given position.
    pub fn new(map_id: MapId, solar_system_id: SolarSystemId, name: impl Into<String>, position: Position) -> Self {
        Self {
            id: Uuid::new_v4(),
            map_id,
            solar_system_id,
            name: name.into(),
            custom_name: None,
            temporary_name: None,
            description: None,
            labels: None,
            tag: None,
            status: SystemStatus::Unknown,
            position_x: position.x,
            position_y: position.y,
            visible: true,
            locked: false,
            linked_signature_eve_id: None,
        }
    }

    pub fn position(&self) -> Position {
        Position::new(self.position_x, self.position_y)
    }
}

// ============================================================================
// Connections
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionType {
    #[default]
    Wormhole,
    Stargate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MassStatus {
    #[default]
    Normal,
    Reduced,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeStatus {
    #[default]
    Normal,
    EndOfLife,
}

/// Largest hull class a wormhole connection lets through.
///
/// Ordered from smallest to largest so a ceiling can be applied with `min`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShipSizeType {
    Small,
    Medium,
    #[default]
    Large,
    Freight,
    Capital,
}

/// A route between two systems on the same map.
///
/// Stored with a direction, but logically bidirectional: `(a, b)` and
/// `(b, a)` denote the same connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Connection {
    pub id: Uuid,
    pub map_id: MapId,
    pub source_solar_system_id: SolarSystemId,
    pub target_solar_system_id: SolarSystemId,
    #[serde(rename = "type")]
    pub connection_type: ConnectionType,
    pub mass_status: MassStatus,
    pub time_status: TimeStatus,
    pub ship_size_type: ShipSizeType,
    pub locked: bool,
    pub custom_info: Option<String>,
}

impl Connection {
    pub fn new(
        map_id: MapId,
        source: SolarSystemId,
        target: SolarSystemId,
        connection_type: ConnectionType,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            map_id,
            source_solar_system_id: source,
            target_solar_system_id: target,
            connection_type,
            mass_status: MassStatus::Normal,
            time_status: TimeStatus::Normal,
            ship_size_type: ShipSizeType::Large,
            locked: false,
            custom_info: None,
        }
    }

    /// True when the connection joins `a` and `b` in either direction.
    pub fn joins(&self, a: SolarSystemId, b: SolarSystemId) -> bool {
        (self.source_solar_system_id == a && self.target_solar_system_id == b)
            || (self.source_solar_system_id == b && self.target_solar_system_id == a)
    }

    pub fn touches(&self, solar_system_id: SolarSystemId) -> bool {
        self.source_solar_system_id == solar_system_id || self.target_solar_system_id == solar_system_id
    }
}

// ============================================================================
// Signatures
// ============================================================================

/// An in-system signature. Wormhole signatures may be linked to the system
/// the hole leads to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signature {
    pub id: Uuid,
    pub map_id: MapId,
    /// System the signature was scanned in.
    pub solar_system_id: SolarSystemId,
    pub eve_id: String,
    pub linked_system_id: Option<SolarSystemId>,
}

// ============================================================================
// Map options and actors
// ============================================================================

/// Direction in which new systems are placed relative to their origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayoutDirection {
    #[default]
    LeftToRight,
    TopToBottom,
}

/// Per-map options consulted by the engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MapOptions {
    pub layout: LayoutDirection,
}

/// Who issued a command. Character-driven commands seed the layout from the
/// character's last known location.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub user_id: Option<String>,
    pub character_id: Option<CharacterId>,
}

impl Actor {
    pub fn character(character_id: CharacterId) -> Self {
        Self {
            user_id: None,
            character_id: Some(character_id),
        }
    }
}

/// Where a system should be added, optionally with explicit coordinates
/// (a UI drop) that bypass the position calculator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemLocation {
    pub solar_system_id: SolarSystemId,
    pub coordinates: Option<Position>,
}

impl SystemLocation {
    pub fn new(solar_system_id: SolarSystemId) -> Self {
        Self {
            solar_system_id,
            coordinates: None,
        }
    }

    pub fn at(solar_system_id: SolarSystemId, position: Position) -> Self {
        Self {
            solar_system_id,
            coordinates: Some(position),
        }
    }
}

/// Static description of a solar system from the game's universe data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolarSystemInfo {
    pub solar_system_id: SolarSystemId,
    pub name: String,
    /// Wormhole class (1-6, 12-18) or a k-space class code.
    pub system_class: i32,
}

/// Wormhole class code of C1 systems.
pub const C1_SYSTEM_CLASS: i32 = 1;

impl SolarSystemInfo {
    pub fn is_c1(&self) -> bool {
        self.system_class == C1_SYSTEM_CLASS
    }
}
