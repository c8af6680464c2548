//! Broadcast payloads emitted by map engines.
//!
//! Events for one map are delivered in the order the map's executor applied
//! the underlying mutations. There is no ordering across maps.

use crate::types::{Connection, MapId, SolarSystemId, System};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Capacity of each map's broadcast topic
pub const MAP_EVENT_CAPACITY: usize = 1024;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "body", rename_all = "snake_case")]
pub enum MapEvent {
    AddSystem(System),
    UpdateSystem(System),
    SystemsRemoved(Vec<SolarSystemId>),
    AddConnection(Connection),
    RemoveConnections(Vec<Connection>),
    UpdateConnection(Connection),
    UpdateMap { hubs: Vec<SolarSystemId> },
    SignaturesUpdated(SolarSystemId),
    /// Killmails stored for a system shown on this map
    KillsUpdated {
        solar_system_id: SolarSystemId,
        killmails: serde_json::Value,
    },
}

impl MapEvent {
    /// Event name as seen by subscribers.
    pub fn name(&self) -> &'static str {
        match self {
            MapEvent::AddSystem(_) => "add_system",
            MapEvent::UpdateSystem(_) => "update_system",
            MapEvent::SystemsRemoved(_) => "systems_removed",
            MapEvent::AddConnection(_) => "add_connection",
            MapEvent::RemoveConnections(_) => "remove_connections",
            MapEvent::UpdateConnection(_) => "update_connection",
            MapEvent::UpdateMap { .. } => "update_map",
            MapEvent::SignaturesUpdated(_) => "signatures_updated",
            MapEvent::KillsUpdated { .. } => "kills_updated",
        }
    }
}

/// A map's broadcast topic.
///
/// Cloning shares the same topic. The topic outlives executor restarts so
/// subscribers keep their receivers.
#[derive(Debug, Clone)]
pub struct MapTopic {
    map_id: MapId,
    sender: broadcast::Sender<MapEvent>,
}

impl MapTopic {
    pub fn new(map_id: MapId) -> Self {
        let (sender, _) = broadcast::channel(MAP_EVENT_CAPACITY);
        Self { map_id, sender }
    }

    pub fn map_id(&self) -> MapId {
        self.map_id
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MapEvent> {
        self.sender.subscribe()
    }

    /// Publishes an event. Having no subscribers is not an error.
    pub fn publish(&self, event: MapEvent) {
        tracing::trace!(map_id = %self.map_id, event = event.name(), "broadcast");
        let _ = self.sender.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}
