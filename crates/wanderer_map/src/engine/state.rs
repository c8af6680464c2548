use crate::types::{CharacterId, Connection, MapId, MapOptions, SolarSystemId, System};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use uuid::Uuid;

/// The in-memory node/edge/hub sets of one map.
#[derive(Debug, Clone)]
pub struct MapState {
    pub map_id: MapId,
    pub options: MapOptions,
    pub systems: HashMap<SolarSystemId, System>,
    pub connections: HashMap<Uuid, Connection>,
    pub hubs: Vec<SolarSystemId>,
    /// Tracked characters and the system each is currently in, if known.
    pub characters: HashMap<CharacterId, Option<SolarSystemId>>,
}

impl MapState {
    pub fn new(map_id: MapId, options: MapOptions) -> Self {
        Self {
            map_id,
            options,
            systems: HashMap::new(),
            connections: HashMap::new(),
            hubs: Vec::new(),
            characters: HashMap::new(),
        }
    }

    pub fn connection_between(&self, a: SolarSystemId, b: SolarSystemId) -> Option<&Connection> {
        self.connections.values().find(|c| c.joins(a, b))
    }

    pub fn has_connections(&self, solar_system_id: SolarSystemId) -> bool {
        self.connections.values().any(|c| c.touches(solar_system_id))
    }

    /// Removes and returns every connection touching any of `solar_system_ids`.
    pub fn take_connections_touching(&mut self, solar_system_ids: &[SolarSystemId]) -> Vec<Connection> {
        let ids: Vec<Uuid> = self
            .connections
            .values()
            .filter(|c| solar_system_ids.iter().any(|id| c.touches(*id)))
            .map(|c| c.id)
            .collect();

        let mut removed: Vec<Connection> = ids
            .iter()
            .filter_map(|id| self.connections.remove(id))
            .collect();
        removed.sort_by_key(|c| (c.source_solar_system_id, c.target_solar_system_id));
        removed
    }

    pub fn characters_in(&self, solar_system_id: SolarSystemId) -> usize {
        self.characters
            .values()
            .filter(|location| **location == Some(solar_system_id))
            .count()
    }

    pub fn location_of(&self, character_id: CharacterId) -> Option<SolarSystemId> {
        self.characters.get(&character_id).copied().flatten()
    }
}

/// Read-only view of a map published after every command.
///
/// Readers (kill routing, the system tracker) use snapshots instead of
/// queueing behind the map's mailbox.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MapSnapshot {
    pub map_id: MapId,
    /// Sorted ascending
    pub system_ids: Vec<SolarSystemId>,
    pub hubs: Vec<SolarSystemId>,
    pub connection_count: usize,
    pub character_count: usize,
    pub updated_at: DateTime<Utc>,
}

impl MapSnapshot {
    pub fn empty(map_id: MapId, updated_at: DateTime<Utc>) -> Self {
        Self {
            map_id,
            system_ids: Vec::new(),
            hubs: Vec::new(),
            connection_count: 0,
            character_count: 0,
            updated_at,
        }
    }

    pub fn contains(&self, solar_system_id: SolarSystemId) -> bool {
        self.system_ids.binary_search(&solar_system_id).is_ok()
    }
}
