use super::MapEngine;
use crate::commands::SystemUpdate;
use crate::error::{MapError, MapResult, Outcome};
use crate::events::MapEvent;
use crate::spatial::system_rect;
use crate::types::{Actor, Position, SolarSystemId, System, SystemLocation};
use serde_json::Value;
use std::collections::BTreeSet;
use tracing::{debug, info, instrument};
use uuid::Uuid;

impl MapEngine {
    /// Places a solar system on the map.
    ///
    /// A system that is already on the map is left untouched. Without
    /// explicit coordinates the position is computed next to the actor's
    /// current system, or near the default anchor when there is none. A
    /// previously removed system gets its hidden row back.
    #[instrument(skip(self, actor), fields(map_id = %self.map_id()))]
    pub async fn add_system(&mut self, location: SystemLocation, actor: Option<&Actor>) -> MapResult<Outcome> {
        let solar_system_id = location.solar_system_id;
        if self.state.systems.contains_key(&solar_system_id) {
            debug!(solar_system_id, "System already on map");
            return Ok(Outcome::AlreadyExists);
        }

        if let Some(position) = location.coordinates {
            check_position(position)?;
        }

        let info = self
            .ctx
            .static_info
            .system_info(solar_system_id)
            .ok_or(MapError::InvalidLocation(solar_system_id))?;

        let position = match location.coordinates {
            Some(position) => position,
            None => {
                let origin = self.origin_for(actor);
                self.calculator.new_system_position(origin, &self.spatial)
            }
        };

        let system = match self.ctx.repository.get_system(self.map_id(), solar_system_id).await {
            Ok(Some(hidden)) => System {
                visible: true,
                position_x: position.x,
                position_y: position.y,
                ..hidden
            },
            Ok(None) => System::new(self.map_id(), solar_system_id, info.name, position),
            Err(err) => {
                self.persist_failed("get_system", &err);
                System::new(self.map_id(), solar_system_id, info.name, position)
            }
        };

        let system = match self.ctx.repository.upsert_system(&system).await {
            Ok(stored) => stored,
            Err(err) => {
                self.persist_failed("upsert_system", &err);
                system
            }
        };

        let now = self.now();
        self.spatial.insert(solar_system_id, system_rect(system.position()));
        self.activity.touch(solar_system_id, now);
        self.state.systems.insert(solar_system_id, system.clone());
        self.mark_updated(now);

        debug!(solar_system_id, x = position.x, y = position.y, "System added");
        self.topic.publish(MapEvent::AddSystem(system));
        Ok(Outcome::Applied)
    }

    /// Applies one typed attribute update to a system on the map.
    #[instrument(skip(self), fields(map_id = %self.map_id()))]
    pub async fn update_system(&mut self, solar_system_id: SolarSystemId, update: SystemUpdate) -> MapResult<Outcome> {
        if let SystemUpdate::Position(position) = &update {
            check_position(*position)?;
        }
        let Some(current) = self.state.systems.get(&solar_system_id) else {
            debug!(solar_system_id, "Update for a system not on the map");
            return Ok(Outcome::NotFound);
        };

        let mut updated = current.clone();
        let moved = matches!(update, SystemUpdate::Position(_));
        update.apply(&mut updated);

        let updated = match self.ctx.repository.update_system(&updated).await {
            Ok(stored) => stored,
            Err(err) => {
                self.persist_failed("update_system", &err);
                updated
            }
        };

        if moved {
            self.spatial.update(solar_system_id, system_rect(updated.position()));
        }

        let now = self.now();
        self.activity.touch(solar_system_id, now);
        self.state.systems.insert(solar_system_id, updated.clone());
        self.mark_updated(now);

        self.topic.publish(MapEvent::UpdateSystem(updated));
        Ok(Outcome::Applied)
    }

    /// Attribute-name entry point for API clients. Unknown attributes are ignored.
    pub async fn update_system_attribute(
        &mut self,
        solar_system_id: SolarSystemId,
        attribute: &str,
        value: &Value,
    ) -> MapResult<Outcome> {
        match SystemUpdate::from_attribute(attribute, value) {
            Some(update) => self.update_system(solar_system_id, update).await,
            None => {
                debug!(map_id = %self.map_id(), solar_system_id, attribute, "Ignoring unknown system attribute");
                Ok(Outcome::Ignored)
            }
        }
    }

    /// Removes systems together with everything that references them.
    ///
    /// Events go out as `remove_connections`, then `signatures_updated`
    /// per hosting system, then `systems_removed`, then `update_map` when a
    /// removed system was a hub.
    #[instrument(skip(self, actor), fields(map_id = %self.map_id()))]
    pub async fn delete_systems(&mut self, solar_system_ids: &[SolarSystemId], actor: Option<&Actor>) -> MapResult<Outcome> {
        if solar_system_ids.is_empty() {
            return Ok(Outcome::MissingParams);
        }

        let removed: Vec<SolarSystemId> = solar_system_ids
            .iter()
            .copied()
            .filter(|id| self.state.systems.contains_key(id))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        if removed.is_empty() {
            debug!(?solar_system_ids, "Nothing to delete");
            return Ok(Outcome::NotFound);
        }

        let map_id = self.map_id();

        let connections = self.state.take_connections_touching(&removed);
        for connection in &connections {
            if let Err(err) = self
                .ctx
                .repository
                .delete_connection(map_id, connection.source_solar_system_id, connection.target_solar_system_id)
                .await
            {
                self.persist_failed("delete_connection", &err);
            }
        }
        if !connections.is_empty() {
            self.topic.publish(MapEvent::RemoveConnections(connections));
        }

        for id in &removed {
            self.state.systems.remove(id);
        }
        self.spatial.delete(&removed);
        self.activity.evict(&removed);
        if let Err(err) = self.ctx.repository.hide_systems(map_id, &removed).await {
            self.persist_failed("hide_systems", &err);
        }

        self.remove_linked_signatures(&removed).await;
        self.topic.publish(MapEvent::SystemsRemoved(removed.clone()));

        let hub_count = self.state.hubs.len();
        self.state.hubs.retain(|hub| !removed.contains(hub));
        if self.state.hubs.len() != hub_count {
            self.save_hubs().await;
        }

        self.mark_updated(self.now());
        info!(
            count = removed.len(),
            user_id = actor.and_then(|a| a.user_id.as_deref()),
            "🧹 Systems removed"
        );
        Ok(Outcome::Applied)
    }

    /// Deletes signatures linked to any removed system and notifies each
    /// system that hosted one.
    async fn remove_linked_signatures(&self, removed: &[SolarSystemId]) {
        let map_id = self.map_id();
        let signatures = match self.ctx.repository.signatures_linked_to(map_id, removed).await {
            Ok(signatures) => signatures,
            Err(err) => {
                self.persist_failed("signatures_linked_to", &err);
                return;
            }
        };
        if signatures.is_empty() {
            return;
        }

        let ids: Vec<Uuid> = signatures.iter().map(|sig| sig.id).collect();
        if let Err(err) = self.ctx.repository.delete_signatures(map_id, &ids).await {
            self.persist_failed("delete_signatures", &err);
            return;
        }

        let hosts: BTreeSet<SolarSystemId> = signatures.iter().map(|sig| sig.solar_system_id).collect();
        for host in hosts {
            self.topic.publish(MapEvent::SignaturesUpdated(host));
        }
    }

    /// Position of the system the actor's character currently sits in.
    fn origin_for(&self, actor: Option<&Actor>) -> Option<Position> {
        let character_id = actor?.character_id?;
        let location = self.state.location_of(character_id)?;
        self.state.systems.get(&location).map(System::position)
    }
}

fn check_position(position: Position) -> MapResult<()> {
    if position.on_canvas() {
        Ok(())
    } else {
        Err(MapError::InvalidPosition {
            x: position.x,
            y: position.y,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use crate::error::{MapError, Outcome, RepositoryError};
    use crate::events::MapEvent;
    use crate::types::{Actor, MapId, Position, Signature, SystemLocation, SystemStatus};
    use crate::commands::SystemUpdate;
    use crate::spatial::system_rect;
    use serde_json::json;
    use uuid::Uuid;

    #[tokio::test]
    async fn adding_twice_keeps_one_system() {
        let h = harness();
        let map_id = MapId::new();
        let mut engine = h.engine(map_id).await;

        assert_eq!(engine.add_system(SystemLocation::new(JITA), None).await, Ok(Outcome::Applied));
        assert_eq!(
            engine.add_system(SystemLocation::new(JITA), None).await,
            Ok(Outcome::AlreadyExists)
        );
        assert_eq!(engine.state().systems.len(), 1);
        assert_eq!(h.repo.system_row_count(map_id), 1);
    }

    #[tokio::test]
    async fn unknown_location_is_rejected() {
        let h = harness();
        let mut engine = h.engine(MapId::new()).await;
        assert_eq!(
            engine.add_system(SystemLocation::new(99), None).await,
            Err(MapError::InvalidLocation(99))
        );
    }

    #[tokio::test]
    async fn explicit_coordinates_bypass_the_calculator() {
        let h = harness();
        let mut engine = h.engine(MapId::new()).await;
        engine
            .add_system(SystemLocation::at(JITA, Position::new(500, 250)), None)
            .await
            .unwrap();

        assert_eq!(engine.state().systems[&JITA].position(), Position::new(500, 250));
        assert_eq!(engine.spatial().get(JITA), Some(system_rect(Position::new(500, 250))));
    }

    #[tokio::test]
    async fn new_system_is_placed_next_to_the_actor() {
        let h = harness();
        let mut engine = h.engine(MapId::new()).await;
        engine
            .add_system(SystemLocation::at(JITA, Position::new(0, 0)), None)
            .await
            .unwrap();
        engine.update_character_location(7, Some(JITA)).await.unwrap();

        engine
            .add_system(SystemLocation::new(PERIMETER), Some(&Actor::character(7)))
            .await
            .unwrap();
        let placed = engine.state().systems[&PERIMETER].position();
        assert!(placed.x > 0);
        assert!(!system_rect(placed).intersects(&system_rect(Position::new(0, 0))));
    }

    #[tokio::test]
    async fn persistence_failure_keeps_in_memory_result() {
        let h = harness();
        let map_id = MapId::new();
        let mut engine = h.engine(map_id).await;
        h.repo.fail_next(RepositoryError::StaleRecord("system".into()));

        assert_eq!(engine.add_system(SystemLocation::new(JITA), None).await, Ok(Outcome::Applied));
        assert!(engine.state().systems.contains_key(&JITA));
        assert_eq!(h.repo.system_row_count(map_id), 0);
    }

    #[tokio::test]
    async fn position_update_reindexes() {
        let h = harness();
        let mut engine = h.engine(MapId::new()).await;
        engine.add_system(SystemLocation::new(JITA), None).await.unwrap();

        let outcome = engine
            .update_system(JITA, SystemUpdate::Position(Position::new(900, 900)))
            .await
            .unwrap();
        assert_eq!(outcome, Outcome::Applied);
        assert_eq!(engine.spatial().get(JITA), Some(system_rect(Position::new(900, 900))));
        assert!(engine.spatial().is_free(&system_rect(Position::new(0, 0))));
    }

    #[tokio::test]
    async fn attribute_updates() {
        let h = harness();
        let mut engine = h.engine(MapId::new()).await;
        let mut rx = engine.topic().subscribe();
        engine.add_system(SystemLocation::new(JITA), None).await.unwrap();

        assert_eq!(
            engine.update_system_attribute(JITA, "status", &json!(8)).await,
            Ok(Outcome::Applied)
        );
        assert_eq!(
            engine.update_system_attribute(JITA, "colour", &json!("red")).await,
            Ok(Outcome::Ignored)
        );
        assert_eq!(
            engine.update_system_attribute(PERIMETER, "tag", &json!("A")).await,
            Ok(Outcome::NotFound)
        );
        assert_eq!(engine.state().systems[&JITA].status, SystemStatus::Home);

        assert_eq!(rx.recv().await.unwrap().name(), "add_system");
        assert_eq!(rx.recv().await.unwrap().name(), "update_system");
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn delete_cascades_in_order() {
        let h = harness();
        let map_id = MapId::new();
        let mut engine = h.engine(map_id).await;
        engine.add_system(SystemLocation::new(JITA), None).await.unwrap();
        engine.add_system(SystemLocation::new(PERIMETER), None).await.unwrap();
        engine
            .add_connection(JITA, PERIMETER, crate::types::ConnectionType::Stargate)
            .await
            .unwrap();
        engine.add_hub(PERIMETER).await.unwrap();
        h.repo.insert_signature(Signature {
            id: Uuid::new_v4(),
            map_id,
            solar_system_id: JITA,
            eve_id: "ABC-123".into(),
            linked_system_id: Some(PERIMETER),
        });

        let mut rx = engine.topic().subscribe();
        assert_eq!(engine.delete_systems(&[PERIMETER], None).await, Ok(Outcome::Applied));

        assert!(matches!(rx.recv().await.unwrap(), MapEvent::RemoveConnections(c) if c.len() == 1));
        assert_eq!(rx.recv().await.unwrap(), MapEvent::SignaturesUpdated(JITA));
        assert_eq!(rx.recv().await.unwrap(), MapEvent::SystemsRemoved(vec![PERIMETER]));
        assert_eq!(rx.recv().await.unwrap(), MapEvent::UpdateMap { hubs: vec![] });

        assert!(engine.state().connections.is_empty());
        assert!(engine.spatial().get(PERIMETER).is_none());
        assert!(engine.last_activity(PERIMETER).is_none());
        assert!(h.repo.signatures(map_id).is_empty());
    }

    #[tokio::test]
    async fn deleting_unknown_systems_is_a_no_op() {
        let h = harness();
        let mut engine = h.engine(MapId::new()).await;
        let mut rx = engine.topic().subscribe();

        assert_eq!(engine.delete_systems(&[JITA], None).await, Ok(Outcome::NotFound));
        assert_eq!(engine.delete_systems(&[], None).await, Ok(Outcome::MissingParams));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn re_adding_restores_the_hidden_row() {
        let h = harness();
        let map_id = MapId::new();
        let mut engine = h.engine(map_id).await;
        engine.add_system(SystemLocation::new(JITA), None).await.unwrap();
        engine
            .update_system(JITA, SystemUpdate::Tag(Some("HQ".into())))
            .await
            .unwrap();
        let row_id = engine.state().systems[&JITA].id;

        engine.delete_systems(&[JITA], None).await.unwrap();
        engine.add_system(SystemLocation::new(JITA), None).await.unwrap();

        let restored = &engine.state().systems[&JITA];
        assert_eq!(restored.id, row_id);
        assert_eq!(restored.tag.as_deref(), Some("HQ"));
        assert!(restored.visible);
        assert_eq!(h.repo.system_row_count(map_id), 1);
    }
}
