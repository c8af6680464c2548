use super::MapEngine;
use crate::error::MapResult;
use crate::types::SolarSystemId;
use tracing::{info, instrument, trace};

impl MapEngine {
    /// Systems the next GC pass would remove, sorted.
    ///
    /// A system expires when it is visible and unlocked, has no activity
    /// inside the expiry window, no connections and no characters in it.
    pub fn expired_systems(&self) -> Vec<SolarSystemId> {
        let now = self.now();
        let window = self.ctx.settings.system_expire;

        let mut expired: Vec<SolarSystemId> = self
            .state
            .systems
            .values()
            .filter(|system| system.visible && !system.locked)
            .map(|system| system.solar_system_id)
            .filter(|id| !self.activity.active_within(*id, window, now))
            .filter(|id| !self.state.has_connections(*id))
            .filter(|id| self.state.characters_in(*id) == 0)
            .collect();
        expired.sort_unstable();
        expired
    }

    /// Expires stale systems through the regular delete path.
    ///
    /// Returns the number of systems removed. A pass that finds nothing
    /// performs no writes and publishes nothing.
    #[instrument(skip(self), fields(map_id = %self.map_id()))]
    pub async fn run_gc(&mut self) -> MapResult<usize> {
        let now = self.now();
        let purged = self.activity.purge_expired(now);
        let expired = self.expired_systems();
        if expired.is_empty() {
            trace!(purged, "GC found nothing to expire");
            return Ok(0);
        }

        self.delete_systems(&expired, None).await?;
        info!(count = expired.len(), ?expired, "♻️ Expired stale systems");
        Ok(expired.len())
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use crate::commands::SystemUpdate;
    use crate::types::{ConnectionType, MapId, SystemLocation};
    use chrono::Duration;

    #[tokio::test]
    async fn expires_only_idle_unattached_systems() {
        let h = harness();
        let mut engine = h.engine(MapId::new()).await;
        for id in 1..=5 {
            engine.add_system(SystemLocation::new(id), None).await.unwrap();
        }
        engine.add_connection(2, 3, ConnectionType::Wormhole).await.unwrap();
        engine.update_system(4, SystemUpdate::Locked(true)).await.unwrap();
        engine.update_character_location(9, Some(5)).await.unwrap();

        h.clock.advance(Duration::minutes(16));
        let mut rx = engine.topic().subscribe();

        assert_eq!(engine.run_gc().await, Ok(1));
        assert_eq!(engine.snapshot().system_ids, vec![2, 3, 4, 5]);
        assert_eq!(rx.recv().await.unwrap().name(), "systems_removed");
    }

    #[tokio::test]
    async fn recent_activity_keeps_a_system() {
        let h = harness();
        let mut engine = h.engine(MapId::new()).await;
        engine.add_system(SystemLocation::new(1), None).await.unwrap();
        engine.add_system(SystemLocation::new(2), None).await.unwrap();

        h.clock.advance(Duration::minutes(10));
        engine
            .update_system(2, SystemUpdate::Description(Some("busy".into())))
            .await
            .unwrap();
        h.clock.advance(Duration::minutes(6));

        assert_eq!(engine.expired_systems(), vec![1]);
    }

    #[tokio::test]
    async fn silent_when_nothing_expires() {
        let h = harness();
        let map_id = MapId::new();
        let mut engine = h.engine(map_id).await;
        engine.add_system(SystemLocation::new(1), None).await.unwrap();
        let mut rx = engine.topic().subscribe();

        h.clock.advance(Duration::minutes(5));
        assert_eq!(engine.run_gc().await, Ok(0));
        assert!(rx.try_recv().is_err());
        assert_eq!(h.repo.system_row_count(map_id), 1);
    }

    #[tokio::test]
    async fn reload_grants_a_fresh_window() {
        let h = harness();
        let map_id = MapId::new();
        {
            let mut engine = h.engine(map_id).await;
            engine.add_system(SystemLocation::new(1), None).await.unwrap();
        }
        h.clock.advance(Duration::minutes(30));

        let mut engine = h.engine(map_id).await;
        assert_eq!(engine.run_gc().await, Ok(0));
        h.clock.advance(Duration::minutes(16));
        assert_eq!(engine.run_gc().await, Ok(1));
    }
}
