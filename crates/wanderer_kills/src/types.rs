//! Canonical killmail record

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Stable external identifier of a solar system.
pub type SolarSystemId = i64;

/// One side of a kill: the victim or the final-blow attacker.
///
/// Ids come from the feed; the name fields are filled in by enrichment and
/// stay `None` when a lookup is skipped.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Participant {
    #[serde(default)]
    pub character_id: Option<i64>,
    #[serde(default)]
    pub character_name: Option<String>,
    #[serde(default)]
    pub corporation_id: Option<i64>,
    #[serde(default)]
    pub corporation_name: Option<String>,
    #[serde(default)]
    pub corporation_ticker: Option<String>,
    #[serde(default)]
    pub alliance_id: Option<i64>,
    #[serde(default)]
    pub alliance_name: Option<String>,
    #[serde(default)]
    pub alliance_ticker: Option<String>,
    #[serde(default)]
    pub ship_type_id: Option<i64>,
    #[serde(default)]
    pub ship_name: Option<String>,
    /// Damage taken for a victim, damage dealt for an attacker
    #[serde(default)]
    pub damage: Option<i64>,
}

/// A killmail in the one shape the rest of the system works with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Killmail {
    pub killmail_id: i64,
    pub kill_time: DateTime<Utc>,
    pub solar_system_id: SolarSystemId,
    pub victim: Participant,
    pub final_blow: Option<Participant>,
    pub attacker_count: u32,
    pub total_value: f64,
    pub npc: bool,
}
