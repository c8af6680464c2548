//! Which systems the kill feed should cover.

use crate::subscription::SystemSet;
use crate::types::SolarSystemId;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashSet;

/// Default window within which a map counts as active.
pub const DEFAULT_ACTIVE_WINDOW: Duration = Duration::minutes(30);

/// A map as seen by the tracker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveMap {
    pub map_id: String,
    pub updated_at: DateTime<Utc>,
    pub system_ids: Vec<SolarSystemId>,
}

/// Lists maps and their systems.
#[async_trait]
pub trait ActiveMapSource: Send + Sync + std::fmt::Debug {
    async fn active_maps(&self) -> Vec<ActiveMap>;
}

/// Decides which maps hold a kill feed subscription entitlement.
#[async_trait]
pub trait Entitlements: Send + Sync + std::fmt::Debug {
    async fn is_entitled(&self, map_id: &str) -> bool;
}

/// Every map is entitled; used when subscriptions are not enforced.
#[derive(Debug, Default, Clone, Copy)]
pub struct AlwaysEntitled;

#[async_trait]
impl Entitlements for AlwaysEntitled {
    async fn is_entitled(&self, _: &str) -> bool {
        true
    }
}

/// Fixed allow-list of entitled maps.
#[derive(Debug, Default, Clone)]
pub struct EntitledMaps {
    map_ids: HashSet<String>,
}

impl EntitledMaps {
    pub fn new<I, S>(map_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            map_ids: map_ids.into_iter().map(Into::into).collect(),
        }
    }
}

#[async_trait]
impl Entitlements for EntitledMaps {
    async fn is_entitled(&self, map_id: &str) -> bool {
        self.map_ids.contains(map_id)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SystemTracker {
    window: Duration,
}

impl Default for SystemTracker {
    fn default() -> Self {
        Self::new(DEFAULT_ACTIVE_WINDOW)
    }
}

impl SystemTracker {
    pub fn new(window: Duration) -> Self {
        Self { window }
    }

    /// Maps updated within the window, or the single most recently updated
    /// map when none is.
    pub fn select_active(&self, mut maps: Vec<ActiveMap>, now: DateTime<Utc>) -> Vec<ActiveMap> {
        let cutoff = now - self.window;
        if maps.iter().any(|m| m.updated_at >= cutoff) {
            maps.retain(|m| m.updated_at >= cutoff);
            return maps;
        }
        maps.into_iter().max_by_key(|m| m.updated_at).into_iter().collect()
    }

    /// Union of the systems on active, entitled maps.
    pub async fn tracked_systems(
        &self,
        source: &dyn ActiveMapSource,
        entitlements: &dyn Entitlements,
        now: DateTime<Utc>,
    ) -> SystemSet {
        let mut tracked = SystemSet::new();
        for map in self.select_active(source.active_maps().await, now) {
            if entitlements.is_entitled(&map.map_id).await {
                tracked.extend(map.system_ids);
            }
        }
        tracked
    }
}
