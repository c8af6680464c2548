//! Glue between the map manager and the kill feed.

use async_trait::async_trait;
use tracing::{debug, warn};
use wanderer_kills::{ActiveMap, ActiveMapSource, KillSink, Killmail};
use wanderer_map::{MapEvent, MapManager, SolarSystemId};

/// Feeds the system tracker from the manager's published snapshots.
#[derive(Debug, Clone)]
pub struct SnapshotMapSource {
    manager: MapManager,
}

impl SnapshotMapSource {
    pub fn new(manager: MapManager) -> Self {
        Self { manager }
    }
}

#[async_trait]
impl ActiveMapSource for SnapshotMapSource {
    async fn active_maps(&self) -> Vec<ActiveMap> {
        self.manager
            .snapshots()
            .into_iter()
            .map(|snapshot| ActiveMap {
                map_id: snapshot.map_id.to_string(),
                updated_at: snapshot.updated_at,
                system_ids: snapshot.system_ids.clone(),
            })
            .collect()
    }
}

/// Broadcasts stored kills as `kills_updated` to every map showing the
/// system.
#[derive(Debug, Clone)]
pub struct MapKillSink {
    manager: MapManager,
}

impl MapKillSink {
    pub fn new(manager: MapManager) -> Self {
        Self { manager }
    }
}

impl KillSink for MapKillSink {
    fn kills_stored(&self, solar_system_id: SolarSystemId, killmails: &[Killmail]) {
        let killmails = match serde_json::to_value(killmails) {
            Ok(value) => value,
            Err(err) => {
                warn!(solar_system_id, error = %err, "Failed to encode killmails");
                return;
            }
        };

        let maps = self.manager.publish_to_system(
            solar_system_id,
            &MapEvent::KillsUpdated {
                solar_system_id,
                killmails,
            },
        );
        debug!(solar_system_id, maps, "Routed kills to maps");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::sync::Arc;
    use std::time::Duration;
    use wanderer_kills::Participant;
    use wanderer_map::{
        EngineContext, EngineSettings, InMemoryRepository, ManagerSettings, MapId, PermissiveStaticInfo,
        SystemClock, SystemLocation,
    };

    fn manager() -> MapManager {
        MapManager::new(
            EngineContext {
                repository: Arc::new(InMemoryRepository::new()),
                static_info: Arc::new(PermissiveStaticInfo),
                clock: Arc::new(SystemClock),
                settings: EngineSettings::default(),
            },
            ManagerSettings::default(),
        )
    }

    fn kill(solar_system_id: SolarSystemId) -> Killmail {
        Killmail {
            killmail_id: 1,
            kill_time: Utc::now(),
            solar_system_id,
            victim: Participant::default(),
            final_blow: None,
            attacker_count: 1,
            total_value: 10.0,
            npc: false,
        }
    }

    #[tokio::test]
    async fn snapshots_become_active_maps() {
        let manager = manager();
        let map_id = MapId::new();
        let map = manager.handle(map_id).unwrap();
        map.add_system(SystemLocation::new(30000142), None).await.unwrap();

        let maps = SnapshotMapSource::new(manager).active_maps().await;
        assert_eq!(maps.len(), 1);
        assert_eq!(maps[0].map_id, map_id.to_string());
        assert_eq!(maps[0].system_ids, vec![30000142]);
    }

    #[tokio::test]
    async fn kills_reach_maps_showing_the_system() {
        let manager = manager();
        let (shown, other) = (MapId::new(), MapId::new());
        manager
            .handle(shown)
            .unwrap()
            .add_system(SystemLocation::new(30000142), None)
            .await
            .unwrap();
        manager
            .handle(other)
            .unwrap()
            .add_system(SystemLocation::new(30000144), None)
            .await
            .unwrap();
        let mut shown_events = manager.subscribe(shown).unwrap();
        let mut other_events = manager.subscribe(other).unwrap();

        MapKillSink::new(manager.clone()).kills_stored(30000142, &[kill(30000142)]);

        let event = tokio::time::timeout(Duration::from_secs(1), shown_events.recv())
            .await
            .unwrap()
            .unwrap();
        let (solar_system_id, killmails) = match event {
            MapEvent::KillsUpdated {
                solar_system_id,
                killmails,
            } => (solar_system_id, killmails),
            other => panic!("expected kills_updated, got {other:?}"),
        };
        assert_eq!(solar_system_id, 30000142);
        assert_eq!(killmails[0]["killmail_id"], 1);
        assert!(other_events.try_recv().is_err());
    }
}
