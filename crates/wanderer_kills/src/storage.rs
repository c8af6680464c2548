//! Per-system cache of recent killmails.

use crate::types::{Killmail, SolarSystemId};
use chrono::{DateTime, Utc};
use dashmap::DashMap;

/// Default number of kills kept per system.
pub const DEFAULT_MAX_KILLS_PER_SYSTEM: usize = 50;

/// Recent kills per system, newest first, bounded and deduplicated by
/// `killmail_id`.
#[derive(Debug)]
pub struct KillCache {
    max_per_system: usize,
    systems: DashMap<SolarSystemId, Vec<Killmail>>,
}

impl Default for KillCache {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_KILLS_PER_SYSTEM)
    }
}

impl KillCache {
    pub fn new(max_per_system: usize) -> Self {
        Self {
            max_per_system: max_per_system.max(1),
            systems: DashMap::new(),
        }
    }

    pub fn contains(&self, solar_system_id: SolarSystemId, killmail_id: i64) -> bool {
        self.systems
            .get(&solar_system_id)
            .is_some_and(|kills| kills.iter().any(|k| k.killmail_id == killmail_id))
    }

    /// Stores a killmail. Returns `false` when it was already cached.
    pub fn insert(&self, killmail: Killmail) -> bool {
        let mut kills = self.systems.entry(killmail.solar_system_id).or_default();
        if kills.iter().any(|k| k.killmail_id == killmail.killmail_id) {
            return false;
        }

        let at = kills
            .iter()
            .position(|k| k.kill_time < killmail.kill_time)
            .unwrap_or(kills.len());
        kills.insert(at, killmail);
        kills.truncate(self.max_per_system);
        true
    }

    /// Cached kills for a system, newest first.
    pub fn kills_for(&self, solar_system_id: SolarSystemId) -> Vec<Killmail> {
        self.systems
            .get(&solar_system_id)
            .map(|kills| kills.clone())
            .unwrap_or_default()
    }

    pub fn kill_count(&self, solar_system_id: SolarSystemId) -> usize {
        self.systems.get(&solar_system_id).map(|kills| kills.len()).unwrap_or(0)
    }

    /// Kill counts for the given systems; systems without kills are omitted.
    pub fn kill_counts(&self, solar_system_ids: &[SolarSystemId]) -> Vec<(SolarSystemId, usize)> {
        solar_system_ids
            .iter()
            .map(|id| (*id, self.kill_count(*id)))
            .filter(|(_, count)| *count > 0)
            .collect()
    }

    /// Drops kills older than `cutoff`, returning how many were removed.
    pub fn prune_older_than(&self, cutoff: DateTime<Utc>) -> usize {
        let mut removed = 0;
        self.systems.retain(|_, kills| {
            let before = kills.len();
            kills.retain(|k| k.kill_time >= cutoff);
            removed += before - kills.len();
            !kills.is_empty()
        });
        removed
    }

    pub fn system_count(&self) -> usize {
        self.systems.len()
    }
}
