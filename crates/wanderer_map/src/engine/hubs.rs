use super::MapEngine;
use crate::error::{MapResult, Outcome};
use crate::events::MapEvent;
use crate::types::SolarSystemId;
use tracing::{debug, instrument};

impl MapEngine {
    #[instrument(skip(self), fields(map_id = %self.map_id()))]
    pub async fn add_hub(&mut self, solar_system_id: SolarSystemId) -> MapResult<Outcome> {
        if !self.state.systems.contains_key(&solar_system_id) {
            debug!(solar_system_id, "Hub system not on the map");
            return Ok(Outcome::NotFound);
        }
        if self.state.hubs.contains(&solar_system_id) {
            return Ok(Outcome::AlreadyExists);
        }

        self.state.hubs.push(solar_system_id);
        self.save_hubs().await;
        self.mark_updated(self.now());
        Ok(Outcome::Applied)
    }

    #[instrument(skip(self), fields(map_id = %self.map_id()))]
    pub async fn remove_hub(&mut self, solar_system_id: SolarSystemId) -> MapResult<Outcome> {
        if !self.state.hubs.contains(&solar_system_id) {
            debug!(solar_system_id, "Not a hub");
            return Ok(Outcome::NotFound);
        }

        self.state.hubs.retain(|hub| *hub != solar_system_id);
        self.save_hubs().await;
        self.mark_updated(self.now());
        Ok(Outcome::Applied)
    }

    /// Persists the hub list and broadcasts it.
    pub(super) async fn save_hubs(&self) {
        if let Err(err) = self.ctx.repository.save_hubs(self.map_id(), &self.state.hubs).await {
            self.persist_failed("save_hubs", &err);
        }
        self.topic.publish(MapEvent::UpdateMap {
            hubs: self.state.hubs.clone(),
        });
    }
}
