//! Persistence collaborator for map state.
//!
//! The engine treats the repository as durable storage behind an in-memory
//! authority: writes that fail (including stale-record conflicts) are logged
//! and dropped, and a restarted engine reloads everything from here.

use crate::error::{RepositoryError, RepositoryResult};
use crate::types::{Connection, MapId, MapOptions, Signature, SolarSystemId, System};
use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use uuid::Uuid;

/// Map storage trait
#[async_trait]
pub trait MapRepository: Send + Sync + std::fmt::Debug {
    /// Load the visible systems of a map
    async fn load_systems(&self, map_id: MapId) -> RepositoryResult<Vec<System>>;

    /// Fetch one system row, hidden or not
    async fn get_system(&self, map_id: MapId, solar_system_id: SolarSystemId) -> RepositoryResult<Option<System>>;

    /// Insert or replace a system keyed by `(map_id, solar_system_id)`, returning the stored row
    async fn upsert_system(&self, system: &System) -> RepositoryResult<System>;

    /// Replace an existing system row
    async fn update_system(&self, system: &System) -> RepositoryResult<System>;

    /// Mark systems as no longer visible on the map
    async fn hide_systems(&self, map_id: MapId, solar_system_ids: &[SolarSystemId]) -> RepositoryResult<()>;

    /// Load all connections of a map
    async fn load_connections(&self, map_id: MapId) -> RepositoryResult<Vec<Connection>>;

    /// Insert or replace a connection keyed by `(map_id, source, target)`
    async fn upsert_connection(&self, connection: &Connection) -> RepositoryResult<Connection>;

    /// Replace an existing connection row
    async fn update_connection(&self, connection: &Connection) -> RepositoryResult<Connection>;

    /// Delete a connection
    async fn delete_connection(
        &self,
        map_id: MapId,
        source: SolarSystemId,
        target: SolarSystemId,
    ) -> RepositoryResult<()>;

    /// Load the hub list
    async fn load_hubs(&self, map_id: MapId) -> RepositoryResult<Vec<SolarSystemId>>;

    /// Replace the hub list
    async fn save_hubs(&self, map_id: MapId, hubs: &[SolarSystemId]) -> RepositoryResult<()>;

    /// Load per-map options
    async fn load_options(&self, map_id: MapId) -> RepositoryResult<MapOptions>;

    /// Signatures whose `linked_system_id` is one of `solar_system_ids`
    async fn signatures_linked_to(
        &self,
        map_id: MapId,
        solar_system_ids: &[SolarSystemId],
    ) -> RepositoryResult<Vec<Signature>>;

    /// Delete signatures by record id
    async fn delete_signatures(&self, map_id: MapId, signature_ids: &[Uuid]) -> RepositoryResult<()>;
}

#[derive(Debug, Default)]
struct MapRows {
    systems: HashMap<SolarSystemId, System>,
    connections: HashMap<(SolarSystemId, SolarSystemId), Connection>,
    hubs: Vec<SolarSystemId>,
    options: Option<MapOptions>,
    signatures: HashMap<Uuid, Signature>,
}

/// Process-local repository.
///
/// Backs tests and single-node deployments. Failures can be queued with
/// [`InMemoryRepository::fail_next`]; each queued error is returned by the
/// next write.
#[derive(Debug, Default)]
pub struct InMemoryRepository {
    maps: DashMap<MapId, MapRows>,
    default_options: MapOptions,
    injected_failures: Mutex<VecDeque<RepositoryError>>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an error for the next write call.
    pub fn fail_next(&self, error: RepositoryError) {
        self.injected_failures
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push_back(error);
    }

    /// Options returned for maps that never had their own set.
    pub fn with_default_options(default_options: MapOptions) -> Self {
        Self {
            default_options,
            ..Self::default()
        }
    }

    pub fn set_options(&self, map_id: MapId, options: MapOptions) {
        self.maps.entry(map_id).or_default().options = Some(options);
    }

    pub fn insert_signature(&self, signature: Signature) {
        self.maps
            .entry(signature.map_id)
            .or_default()
            .signatures
            .insert(signature.id, signature);
    }

    pub fn signatures(&self, map_id: MapId) -> Vec<Signature> {
        self.maps
            .get(&map_id)
            .map(|rows| rows.signatures.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Stored row count for a map, hidden systems included.
    pub fn system_row_count(&self, map_id: MapId) -> usize {
        self.maps.get(&map_id).map(|rows| rows.systems.len()).unwrap_or(0)
    }

    fn check_injected(&self) -> RepositoryResult<()> {
        let next = self
            .injected_failures
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .pop_front();
        match next {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl MapRepository for InMemoryRepository {
    async fn load_systems(&self, map_id: MapId) -> RepositoryResult<Vec<System>> {
        let mut systems: Vec<System> = self
            .maps
            .get(&map_id)
            .map(|rows| rows.systems.values().filter(|s| s.visible).cloned().collect())
            .unwrap_or_default();
        systems.sort_by_key(|s| s.solar_system_id);
        Ok(systems)
    }

    async fn get_system(&self, map_id: MapId, solar_system_id: SolarSystemId) -> RepositoryResult<Option<System>> {
        Ok(self
            .maps
            .get(&map_id)
            .and_then(|rows| rows.systems.get(&solar_system_id).cloned()))
    }

    async fn upsert_system(&self, system: &System) -> RepositoryResult<System> {
        self.check_injected()?;
        let mut rows = self.maps.entry(system.map_id).or_default();
        let stored = match rows.systems.get(&system.solar_system_id) {
            Some(existing) => System {
                id: existing.id,
                ..system.clone()
            },
            None => system.clone(),
        };
        rows.systems.insert(stored.solar_system_id, stored.clone());
        Ok(stored)
    }

    async fn update_system(&self, system: &System) -> RepositoryResult<System> {
        self.check_injected()?;
        let mut rows = self.maps.get_mut(&system.map_id).ok_or(RepositoryError::NotFound)?;
        let existing = rows
            .systems
            .get_mut(&system.solar_system_id)
            .ok_or(RepositoryError::NotFound)?;
        *existing = System {
            id: existing.id,
            ..system.clone()
        };
        Ok(existing.clone())
    }

    async fn hide_systems(&self, map_id: MapId, solar_system_ids: &[SolarSystemId]) -> RepositoryResult<()> {
        self.check_injected()?;
        if let Some(mut rows) = self.maps.get_mut(&map_id) {
            for id in solar_system_ids {
                if let Some(system) = rows.systems.get_mut(id) {
                    system.visible = false;
                }
            }
        }
        Ok(())
    }

    async fn load_connections(&self, map_id: MapId) -> RepositoryResult<Vec<Connection>> {
        let mut connections: Vec<Connection> = self
            .maps
            .get(&map_id)
            .map(|rows| rows.connections.values().cloned().collect())
            .unwrap_or_default();
        connections.sort_by_key(|c| (c.source_solar_system_id, c.target_solar_system_id));
        Ok(connections)
    }

    async fn upsert_connection(&self, connection: &Connection) -> RepositoryResult<Connection> {
        self.check_injected()?;
        let key = (connection.source_solar_system_id, connection.target_solar_system_id);
        self.maps
            .entry(connection.map_id)
            .or_default()
            .connections
            .insert(key, connection.clone());
        Ok(connection.clone())
    }

    async fn update_connection(&self, connection: &Connection) -> RepositoryResult<Connection> {
        self.check_injected()?;
        let key = (connection.source_solar_system_id, connection.target_solar_system_id);
        let mut rows = self.maps.get_mut(&connection.map_id).ok_or(RepositoryError::NotFound)?;
        let existing = rows.connections.get_mut(&key).ok_or(RepositoryError::NotFound)?;
        *existing = connection.clone();
        Ok(connection.clone())
    }

    async fn delete_connection(
        &self,
        map_id: MapId,
        source: SolarSystemId,
        target: SolarSystemId,
    ) -> RepositoryResult<()> {
        self.check_injected()?;
        let mut rows = self.maps.get_mut(&map_id).ok_or(RepositoryError::NotFound)?;
        rows.connections
            .remove(&(source, target))
            .map(|_| ())
            .ok_or(RepositoryError::NotFound)
    }

    async fn load_hubs(&self, map_id: MapId) -> RepositoryResult<Vec<SolarSystemId>> {
        Ok(self.maps.get(&map_id).map(|rows| rows.hubs.clone()).unwrap_or_default())
    }

    async fn save_hubs(&self, map_id: MapId, hubs: &[SolarSystemId]) -> RepositoryResult<()> {
        self.check_injected()?;
        self.maps.entry(map_id).or_default().hubs = hubs.to_vec();
        Ok(())
    }

    async fn load_options(&self, map_id: MapId) -> RepositoryResult<MapOptions> {
        Ok(self
            .maps
            .get(&map_id)
            .and_then(|rows| rows.options.clone())
            .unwrap_or_else(|| self.default_options.clone()))
    }

    async fn signatures_linked_to(
        &self,
        map_id: MapId,
        solar_system_ids: &[SolarSystemId],
    ) -> RepositoryResult<Vec<Signature>> {
        let mut signatures: Vec<Signature> = self
            .maps
            .get(&map_id)
            .map(|rows| {
                rows.signatures
                    .values()
                    .filter(|sig| sig.linked_system_id.is_some_and(|id| solar_system_ids.contains(&id)))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        signatures.sort_by(|a, b| a.eve_id.cmp(&b.eve_id));
        Ok(signatures)
    }

    async fn delete_signatures(&self, map_id: MapId, signature_ids: &[Uuid]) -> RepositoryResult<()> {
        self.check_injected()?;
        if let Some(mut rows) = self.maps.get_mut(&map_id) {
            for id in signature_ids {
                rows.signatures.remove(id);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ConnectionType, LayoutDirection, Position};

    #[tokio::test]
    async fn upsert_keeps_row_identity() {
        let repo = InMemoryRepository::new();
        let map_id = MapId::new();
        let first = repo
            .upsert_system(&System::new(map_id, 31000001, "J100001", Position::default()))
            .await
            .unwrap();
        let second = repo
            .upsert_system(&System::new(map_id, 31000001, "J100001", Position::new(10, 10)))
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.position_x, 10);
        assert_eq!(repo.system_row_count(map_id), 1);
    }

    #[tokio::test]
    async fn hidden_systems_are_not_loaded_but_still_fetchable() {
        let repo = InMemoryRepository::new();
        let map_id = MapId::new();
        repo.upsert_system(&System::new(map_id, 1, "A", Position::default()))
            .await
            .unwrap();
        repo.hide_systems(map_id, &[1]).await.unwrap();

        assert!(repo.load_systems(map_id).await.unwrap().is_empty());
        let hidden = repo.get_system(map_id, 1).await.unwrap().unwrap();
        assert!(!hidden.visible);
    }

    #[tokio::test]
    async fn injected_failures_hit_the_next_write_only() {
        let repo = InMemoryRepository::new();
        let map_id = MapId::new();
        repo.fail_next(RepositoryError::StaleRecord("connection".into()));

        let conn = Connection::new(map_id, 1, 2, ConnectionType::Wormhole);
        assert!(matches!(
            repo.upsert_connection(&conn).await,
            Err(RepositoryError::StaleRecord(_))
        ));
        assert!(repo.upsert_connection(&conn).await.is_ok());
    }

    #[tokio::test]
    async fn deleting_a_missing_connection_reports_not_found() {
        let repo = InMemoryRepository::new();
        let map_id = MapId::new();
        repo.save_hubs(map_id, &[]).await.unwrap();

        assert_eq!(
            repo.delete_connection(map_id, 1, 2).await,
            Err(RepositoryError::NotFound)
        );
    }

    #[tokio::test]
    async fn default_options_apply_until_a_map_sets_its_own() {
        let repo = InMemoryRepository::with_default_options(MapOptions {
            layout: LayoutDirection::TopToBottom,
        });
        let (a, b) = (MapId::new(), MapId::new());
        repo.set_options(b, MapOptions::default());

        assert_eq!(repo.load_options(a).await.unwrap().layout, LayoutDirection::TopToBottom);
        assert_eq!(repo.load_options(b).await.unwrap().layout, LayoutDirection::LeftToRight);
    }
}
