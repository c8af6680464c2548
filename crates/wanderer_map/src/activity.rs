//! Per-system last-activity timestamps with a TTL.
//!
//! An entry older than the TTL reads as missing. The cache is scoped to one
//! map and owned by that map's engine; deleting a system evicts its entry.

use crate::types::SolarSystemId;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;

#[derive(Debug)]
pub struct ActivityCache {
    ttl: Duration,
    entries: HashMap<SolarSystemId, DateTime<Utc>>,
}

impl ActivityCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: HashMap::new(),
        }
    }

    pub fn touch(&mut self, solar_system_id: SolarSystemId, now: DateTime<Utc>) {
        self.entries.insert(solar_system_id, now);
    }

    /// Last recorded activity, or `None` if never seen or expired.
    pub fn last_activity(&self, solar_system_id: SolarSystemId, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.entries
            .get(&solar_system_id)
            .copied()
            .filter(|at| now - *at < self.ttl)
    }

    /// True when the system saw activity less than `window` ago.
    pub fn active_within(&self, solar_system_id: SolarSystemId, window: Duration, now: DateTime<Utc>) -> bool {
        self.last_activity(solar_system_id, now)
            .is_some_and(|at| now - at < window)
    }

    pub fn evict(&mut self, solar_system_ids: &[SolarSystemId]) {
        for id in solar_system_ids {
            self.entries.remove(id);
        }
    }

    /// Drops expired entries, returning how many were removed.
    pub fn purge_expired(&mut self, now: DateTime<Utc>) -> usize {
        let before = self.entries.len();
        let ttl = self.ttl;
        self.entries.retain(|_, at| now - *at < ttl);
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entries_expire_after_ttl() {
        let now = Utc::now();
        let mut cache = ActivityCache::new(Duration::minutes(60));
        cache.touch(1, now);

        assert_eq!(cache.last_activity(1, now + Duration::minutes(59)), Some(now));
        assert_eq!(cache.last_activity(1, now + Duration::minutes(60)), None);
        assert_eq!(cache.last_activity(2, now), None);
    }

    #[test]
    fn active_within_window() {
        let now = Utc::now();
        let mut cache = ActivityCache::new(Duration::minutes(60));
        cache.touch(1, now - Duration::minutes(20));

        assert!(!cache.active_within(1, Duration::minutes(15), now));
        assert!(cache.active_within(1, Duration::minutes(30), now));
    }

    #[test]
    fn evict_and_purge() {
        let now = Utc::now();
        let mut cache = ActivityCache::new(Duration::minutes(10));
        cache.touch(1, now - Duration::minutes(30));
        cache.touch(2, now);
        cache.touch(3, now);

        cache.evict(&[3]);
        assert_eq!(cache.purge_expired(now), 1);
        assert_eq!(cache.len(), 1);
    }
}
