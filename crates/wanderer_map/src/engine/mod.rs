//! # Map State Engine
//!
//! [`MapEngine`] owns one map's systems, connections and hubs together with
//! the spatial index and last-activity cache derived from them. Every
//! mutation goes through an engine method; the per-map executor
//! ([`crate::executor`]) guarantees those methods are never called
//! concurrently for the same map.
//!
//! ## Persistence
//!
//! Each mutation is written through the [`MapRepository`]. A failed write,
//! including a stale-record conflict, is logged and dropped: the in-memory
//! state stays authoritative for that operation and the next GC or reload
//! reconciles.
//!
//! ## Broadcasts
//!
//! Events are published on the map's [`MapTopic`] in the same order the
//! mutations are applied.

mod characters;
mod connections;
mod gc;
mod hubs;
mod state;
mod systems;

pub use state::{MapSnapshot, MapState};

use crate::activity::ActivityCache;
use crate::clock::Clock;
use crate::error::{MapResult, RepositoryError};
use crate::events::MapTopic;
use crate::repository::MapRepository;
use crate::spatial::{system_rect, PositionCalculator, SpatialIndex};
use crate::static_info::StaticInfo;
use crate::types::{MapId, SolarSystemId};
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Tunables shared by every engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineSettings {
    /// Inactivity after which an unconnected, unoccupied system expires
    pub system_expire: Duration,
    /// How long a last-activity entry is kept at all
    pub activity_ttl: Duration,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            system_expire: Duration::minutes(15),
            activity_ttl: Duration::minutes(60),
        }
    }
}

/// Collaborators injected into every engine.
#[derive(Debug, Clone)]
pub struct EngineContext {
    pub repository: Arc<dyn MapRepository>,
    pub static_info: Arc<dyn StaticInfo>,
    pub clock: Arc<dyn Clock>,
    pub settings: EngineSettings,
}

/// Serialized authority over one map.
#[derive(Debug)]
pub struct MapEngine {
    state: MapState,
    spatial: SpatialIndex,
    activity: ActivityCache,
    calculator: PositionCalculator,
    topic: MapTopic,
    ctx: EngineContext,
    updated_at: DateTime<Utc>,
}

impl MapEngine {
    /// Loads a map's authoritative state from the repository and rebuilds
    /// the spatial index and activity cache from it.
    ///
    /// Every loaded system starts with fresh activity, so a restart never
    /// makes the next GC pass expire the whole map.
    pub async fn load(map_id: MapId, ctx: EngineContext, topic: MapTopic) -> MapResult<Self> {
        let repository = &ctx.repository;
        let options = repository.load_options(map_id).await?;
        let systems = repository.load_systems(map_id).await?;
        let connections = repository.load_connections(map_id).await?;
        let hubs = repository.load_hubs(map_id).await?;

        let now = ctx.clock.now();
        let mut state = MapState::new(map_id, options);
        let mut activity = ActivityCache::new(ctx.settings.activity_ttl);

        for system in systems {
            activity.touch(system.solar_system_id, now);
            state.systems.insert(system.solar_system_id, system);
        }

        for connection in connections {
            let source = connection.source_solar_system_id;
            let target = connection.target_solar_system_id;
            if state.systems.contains_key(&source) && state.systems.contains_key(&target) {
                state.connections.insert(connection.id, connection);
            } else {
                warn!(%map_id, source, target, "Skipping stored connection with a missing endpoint");
            }
        }

        state.hubs = hubs
            .into_iter()
            .filter(|hub| state.systems.contains_key(hub))
            .collect();

        let spatial = SpatialIndex::bulk_load(
            state
                .systems
                .values()
                .map(|s| (s.solar_system_id, system_rect(s.position()))),
        );

        info!(
            %map_id,
            systems = state.systems.len(),
            connections = state.connections.len(),
            "🗺️ Map state loaded"
        );

        Ok(Self {
            calculator: PositionCalculator::new(&state.options),
            state,
            spatial,
            activity,
            topic,
            ctx,
            updated_at: now,
        })
    }

    pub fn map_id(&self) -> MapId {
        self.state.map_id
    }

    pub fn state(&self) -> &MapState {
        &self.state
    }

    pub fn spatial(&self) -> &SpatialIndex {
        &self.spatial
    }

    pub fn topic(&self) -> &MapTopic {
        &self.topic
    }

    pub fn last_activity(&self, solar_system_id: SolarSystemId) -> Option<DateTime<Utc>> {
        self.activity.last_activity(solar_system_id, self.ctx.clock.now())
    }

    pub fn snapshot(&self) -> MapSnapshot {
        let mut system_ids: Vec<SolarSystemId> = self.state.systems.keys().copied().collect();
        system_ids.sort_unstable();

        MapSnapshot {
            map_id: self.state.map_id,
            system_ids,
            hubs: self.state.hubs.clone(),
            connection_count: self.state.connections.len(),
            character_count: self.state.characters.len(),
            updated_at: self.updated_at,
        }
    }

    fn now(&self) -> DateTime<Utc> {
        self.ctx.clock.now()
    }

    fn mark_updated(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
    }

    /// Logs a dropped write. The caller keeps its in-memory result.
    fn persist_failed(&self, operation: &'static str, err: &RepositoryError) {
        let map_id = self.state.map_id;
        match err {
            RepositoryError::StaleRecord(detail) => {
                warn!(%map_id, operation, detail, "Stale record, keeping in-memory state");
            }
            RepositoryError::NotFound => {
                debug!(%map_id, operation, "Record already gone");
            }
            RepositoryError::Backend(detail) => {
                error!(%map_id, operation, detail, "Persistence failed, keeping in-memory state");
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::clock::ManualClock;
    use crate::repository::InMemoryRepository;
    use crate::static_info::InMemoryStaticInfo;
    use crate::types::SolarSystemInfo;

    pub const JITA: SolarSystemId = 30000142;
    pub const PERIMETER: SolarSystemId = 30000144;
    pub const C1_HOLE: SolarSystemId = 31000005;
    pub const C3_HOLE: SolarSystemId = 31000100;

    pub struct Harness {
        pub repo: Arc<InMemoryRepository>,
        pub clock: Arc<ManualClock>,
        pub ctx: EngineContext,
    }

    pub fn static_info() -> InMemoryStaticInfo {
        let mut systems = vec![
            SolarSystemInfo { solar_system_id: JITA, name: "Jita".into(), system_class: 7 },
            SolarSystemInfo { solar_system_id: PERIMETER, name: "Perimeter".into(), system_class: 7 },
            SolarSystemInfo { solar_system_id: C1_HOLE, name: "J164710".into(), system_class: 1 },
            SolarSystemInfo { solar_system_id: C3_HOLE, name: "J105443".into(), system_class: 3 },
        ];
        systems.extend((1..=40).map(|n| SolarSystemInfo {
            solar_system_id: n,
            name: format!("S{n}"),
            system_class: 4,
        }));
        InMemoryStaticInfo::new(systems)
    }

    pub fn harness() -> Harness {
        let repo = Arc::new(InMemoryRepository::new());
        let clock = Arc::new(ManualClock::default());
        let ctx = EngineContext {
            repository: repo.clone(),
            static_info: Arc::new(static_info()),
            clock: clock.clone(),
            settings: EngineSettings::default(),
        };
        Harness { repo, clock, ctx }
    }

    impl Harness {
        pub async fn engine(&self, map_id: MapId) -> MapEngine {
            MapEngine::load(map_id, self.ctx.clone(), MapTopic::new(map_id))
                .await
                .expect("engine loads")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use crate::types::{ConnectionType, SystemLocation};

    #[tokio::test]
    async fn reload_rebuilds_state_from_repository() {
        let h = harness();
        let map_id = MapId::new();
        {
            let mut engine = h.engine(map_id).await;
            engine.add_system(SystemLocation::new(JITA), None).await.unwrap();
            engine.add_system(SystemLocation::new(PERIMETER), None).await.unwrap();
            engine
                .add_connection(JITA, PERIMETER, ConnectionType::Stargate)
                .await
                .unwrap();
            engine.add_hub(JITA).await.unwrap();
        }

        let engine = h.engine(map_id).await;
        assert_eq!(engine.state().systems.len(), 2);
        assert_eq!(engine.state().connections.len(), 1);
        assert_eq!(engine.state().hubs, vec![JITA]);
        assert_eq!(engine.spatial().len(), 2);
        assert!(engine.last_activity(JITA).is_some());
    }

    #[tokio::test]
    async fn snapshot_lists_sorted_system_ids() {
        let h = harness();
        let mut engine = h.engine(MapId::new()).await;
        engine.add_system(SystemLocation::new(PERIMETER), None).await.unwrap();
        engine.add_system(SystemLocation::new(JITA), None).await.unwrap();

        let snapshot = engine.snapshot();
        assert_eq!(snapshot.system_ids, vec![JITA, PERIMETER]);
        assert!(snapshot.contains(JITA));
        assert!(!snapshot.contains(C1_HOLE));
    }
}
