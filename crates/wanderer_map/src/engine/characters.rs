use super::MapEngine;
use crate::error::{MapResult, Outcome};
use crate::types::{Actor, CharacterId, ConnectionType, SolarSystemId, SystemLocation};
use tracing::{debug, instrument};

impl MapEngine {
    /// Records where a tracked character is.
    ///
    /// Moving into a system that is not on the map adds it next to the
    /// previous system, and a jump between two mapped systems creates a
    /// wormhole connection between them if none exists yet. Presence keeps
    /// the destination alive for GC.
    #[instrument(skip(self), fields(map_id = %self.map_id()))]
    pub async fn update_character_location(
        &mut self,
        character_id: CharacterId,
        location: Option<SolarSystemId>,
    ) -> MapResult<Outcome> {
        let previous = self.state.location_of(character_id);
        let Some(destination) = location else {
            self.state.characters.insert(character_id, None);
            return Ok(Outcome::Applied);
        };
        if previous == Some(destination) {
            return Ok(Outcome::AlreadyExists);
        }

        if !self.state.systems.contains_key(&destination) {
            let actor = Actor::character(character_id);
            self.add_system(SystemLocation::new(destination), Some(&actor)).await?;
        }

        self.state.characters.insert(character_id, Some(destination));
        let now = self.now();
        self.activity.touch(destination, now);
        self.mark_updated(now);

        if let Some(origin) = previous.filter(|id| self.state.systems.contains_key(id)) {
            let outcome = self
                .add_connection(origin, destination, ConnectionType::Wormhole)
                .await?;
            debug!(character_id, origin, destination, ?outcome, "Character jumped");
        }

        Ok(Outcome::Applied)
    }

    /// Stops tracking a character.
    pub fn remove_character(&mut self, character_id: CharacterId) -> Outcome {
        match self.state.characters.remove(&character_id) {
            Some(_) => Outcome::Applied,
            None => Outcome::NotFound,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use crate::error::{MapError, Outcome};
    use crate::events::MapEvent;
    use crate::types::{ConnectionType, MapId};

    #[tokio::test]
    async fn moving_adds_systems_and_connects_them() {
        let h = harness();
        let mut engine = h.engine(MapId::new()).await;
        let mut rx = engine.topic().subscribe();

        engine.update_character_location(1, Some(C3_HOLE)).await.unwrap();
        engine.update_character_location(1, Some(C1_HOLE)).await.unwrap();

        assert_eq!(engine.state().systems.len(), 2);
        let connection = engine.state().connection_between(C3_HOLE, C1_HOLE).unwrap();
        assert_eq!(connection.connection_type, ConnectionType::Wormhole);
        assert_eq!(engine.state().characters_in(C1_HOLE), 1);
        assert_eq!(engine.state().characters_in(C3_HOLE), 0);

        let names: Vec<&str> = std::iter::from_fn(|| rx.try_recv().ok())
            .map(|e: MapEvent| e.name())
            .collect();
        assert_eq!(names, vec!["add_system", "add_system", "add_connection"]);
    }

    #[tokio::test]
    async fn jumping_back_reuses_the_connection() {
        let h = harness();
        let mut engine = h.engine(MapId::new()).await;

        engine.update_character_location(1, Some(JITA)).await.unwrap();
        engine.update_character_location(1, Some(PERIMETER)).await.unwrap();
        engine.update_character_location(1, Some(JITA)).await.unwrap();

        assert_eq!(engine.state().connections.len(), 1);
        assert_eq!(
            engine.update_character_location(1, Some(JITA)).await,
            Ok(Outcome::AlreadyExists)
        );
    }

    #[tokio::test]
    async fn unknown_destination_is_an_error_and_not_recorded() {
        let h = harness();
        let mut engine = h.engine(MapId::new()).await;

        assert_eq!(
            engine.update_character_location(1, Some(99)).await,
            Err(MapError::InvalidLocation(99))
        );
        assert_eq!(engine.state().location_of(1), None);
    }

    #[tokio::test]
    async fn removing_characters() {
        let h = harness();
        let mut engine = h.engine(MapId::new()).await;
        engine.update_character_location(1, Some(JITA)).await.unwrap();

        assert_eq!(engine.remove_character(1), Outcome::Applied);
        assert_eq!(engine.remove_character(1), Outcome::NotFound);
        assert_eq!(engine.state().characters_in(JITA), 0);
    }
}
