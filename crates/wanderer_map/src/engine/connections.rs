use super::MapEngine;
use crate::commands::ConnectionUpdate;
use crate::error::{MapError, MapResult, Outcome};
use crate::events::MapEvent;
use crate::types::{Connection, ConnectionType, ShipSizeType, SolarSystemId};
use serde_json::Value;
use tracing::{debug, instrument};
use uuid::Uuid;

/// Largest hull class allowed through a wormhole touching a C1 system.
const C1_SHIP_SIZE_CEILING: ShipSizeType = ShipSizeType::Medium;

impl MapEngine {
    /// Connects two systems already on the map.
    ///
    /// A connection between the same pair in either direction is reported
    /// as [`Outcome::AlreadyExists`]. Wormholes touching a C1 system are
    /// created with the C1 ship-size ceiling.
    #[instrument(skip(self), fields(map_id = %self.map_id()))]
    pub async fn add_connection(
        &mut self,
        source: SolarSystemId,
        target: SolarSystemId,
        connection_type: ConnectionType,
    ) -> MapResult<Outcome> {
        if source == target {
            return Err(MapError::SelfConnection(source));
        }
        if !self.state.systems.contains_key(&source) || !self.state.systems.contains_key(&target) {
            debug!(source, target, "Connection endpoint not on the map");
            return Ok(Outcome::NotFound);
        }
        if self.state.connection_between(source, target).is_some() {
            debug!(source, target, "Connection already exists");
            return Ok(Outcome::AlreadyExists);
        }

        let mut connection = Connection::new(self.map_id(), source, target, connection_type);
        if connection_type == ConnectionType::Wormhole && (self.is_c1(source) || self.is_c1(target)) {
            connection.ship_size_type = connection.ship_size_type.min(C1_SHIP_SIZE_CEILING);
        }

        let connection = match self.ctx.repository.upsert_connection(&connection).await {
            Ok(stored) => stored,
            Err(err) => {
                self.persist_failed("upsert_connection", &err);
                connection
            }
        };

        let now = self.now();
        self.activity.touch(source, now);
        self.activity.touch(target, now);
        self.state.connections.insert(connection.id, connection.clone());
        self.mark_updated(now);

        self.topic.publish(MapEvent::AddConnection(connection));
        Ok(Outcome::Applied)
    }

    /// Removes the connection between two systems, whichever way it was stored.
    #[instrument(skip(self), fields(map_id = %self.map_id()))]
    pub async fn delete_connection(&mut self, source: SolarSystemId, target: SolarSystemId) -> MapResult<Outcome> {
        let Some(id) = self.connection_id(source, target) else {
            debug!(source, target, "Connection not found");
            return Ok(Outcome::NotFound);
        };
        let Some(connection) = self.state.connections.remove(&id) else {
            return Ok(Outcome::NotFound);
        };

        if let Err(err) = self
            .ctx
            .repository
            .delete_connection(
                self.map_id(),
                connection.source_solar_system_id,
                connection.target_solar_system_id,
            )
            .await
        {
            self.persist_failed("delete_connection", &err);
        }

        self.mark_updated(self.now());
        self.topic.publish(MapEvent::RemoveConnections(vec![connection]));
        Ok(Outcome::Applied)
    }

    #[instrument(skip(self), fields(map_id = %self.map_id()))]
    pub async fn update_connection(
        &mut self,
        source: SolarSystemId,
        target: SolarSystemId,
        update: ConnectionUpdate,
    ) -> MapResult<Outcome> {
        let Some(current) = self
            .connection_id(source, target)
            .and_then(|id| self.state.connections.get(&id))
        else {
            debug!(source, target, "Update for a missing connection");
            return Ok(Outcome::NotFound);
        };

        let mut updated = current.clone();
        update.apply(&mut updated);

        let updated = match self.ctx.repository.update_connection(&updated).await {
            Ok(stored) => stored,
            Err(err) => {
                self.persist_failed("update_connection", &err);
                updated
            }
        };

        let now = self.now();
        self.state.connections.insert(updated.id, updated.clone());
        self.mark_updated(now);

        self.topic.publish(MapEvent::UpdateConnection(updated));
        Ok(Outcome::Applied)
    }

    /// Attribute-name entry point for API clients. Unknown attributes are ignored.
    pub async fn update_connection_attribute(
        &mut self,
        source: SolarSystemId,
        target: SolarSystemId,
        attribute: &str,
        value: &Value,
    ) -> MapResult<Outcome> {
        match ConnectionUpdate::from_attribute(attribute, value) {
            Some(update) => self.update_connection(source, target, update).await,
            None => {
                debug!(map_id = %self.map_id(), source, target, attribute, "Ignoring unknown connection attribute");
                Ok(Outcome::Ignored)
            }
        }
    }

    fn connection_id(&self, a: SolarSystemId, b: SolarSystemId) -> Option<Uuid> {
        self.state.connection_between(a, b).map(|c| c.id)
    }

    fn is_c1(&self, solar_system_id: SolarSystemId) -> bool {
        self.ctx
            .static_info
            .system_info(solar_system_id)
            .is_some_and(|info| info.is_c1())
    }
}
