//! Kill feed subscription set and its diffing.
//!
//! The diff functions are pure; [`KillSubscriptionManager::sync_with_server`]
//! is the only place that talks to the feed, and it only commits a change to
//! the set after the feed accepted it.

use crate::error::FeedError;
use crate::feed::KillFeedClient;
use crate::types::SolarSystemId;
use std::collections::BTreeSet;
use tokio::sync::Mutex;
use tracing::{debug, info};

pub type SystemSet = BTreeSet<SolarSystemId>;

/// Adds `requested` to `current`. Returns the new set and the systems that
/// were not yet subscribed.
pub fn subscribe_systems(current: &SystemSet, requested: &SystemSet) -> (SystemSet, Vec<SolarSystemId>) {
    let to_subscribe: Vec<SolarSystemId> = requested.difference(current).copied().collect();
    let next = current.union(requested).copied().collect();
    (next, to_subscribe)
}

/// Removes `requested` from `current`. Returns the new set and the systems
/// that were actually subscribed, i.e. `current ∩ requested`.
pub fn unsubscribe_systems(current: &SystemSet, requested: &SystemSet) -> (SystemSet, Vec<SolarSystemId>) {
    let to_unsubscribe: Vec<SolarSystemId> = current.intersection(requested).copied().collect();
    let next = current.difference(requested).copied().collect();
    (next, to_unsubscribe)
}

/// Drops subscriptions no longer backed by any tracked map.
pub fn cleanup_subscriptions(current: &SystemSet, tracked: &SystemSet) -> (SystemSet, Vec<SolarSystemId>) {
    let orphaned: Vec<SolarSystemId> = current.difference(tracked).copied().collect();
    let pruned = current.intersection(tracked).copied().collect();
    (pruned, orphaned)
}

/// What one sync sent to the feed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub subscribed: Vec<SolarSystemId>,
    pub unsubscribed: Vec<SolarSystemId>,
}

impl SyncReport {
    pub fn is_empty(&self) -> bool {
        self.subscribed.is_empty() && self.unsubscribed.is_empty()
    }
}

/// Owner of the global subscription set.
#[derive(Debug, Default)]
pub struct KillSubscriptionManager {
    subscribed: Mutex<SystemSet>,
}

impl KillSubscriptionManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn subscribed(&self) -> SystemSet {
        self.subscribed.lock().await.clone()
    }

    /// Brings the feed in line with `tracked`: orphaned systems are
    /// unsubscribed first, then new ones subscribed. Concurrent calls are
    /// serialized so the feed never sees duplicate instructions.
    pub async fn sync_with_server(&self, tracked: &SystemSet, client: &dyn KillFeedClient) -> Result<SyncReport, FeedError> {
        let mut subscribed = self.subscribed.lock().await;
        let mut report = SyncReport::default();

        let (_, orphaned) = cleanup_subscriptions(&subscribed, tracked);
        if !orphaned.is_empty() {
            let orphaned: SystemSet = orphaned.into_iter().collect();
            let (next, to_unsubscribe) = unsubscribe_systems(&subscribed, &orphaned);
            client.unsubscribe_systems(&to_unsubscribe).await?;
            *subscribed = next;
            report.unsubscribed = to_unsubscribe;
        }

        let (next, to_subscribe) = subscribe_systems(&subscribed, tracked);
        if !to_subscribe.is_empty() {
            client.subscribe_systems(&to_subscribe).await?;
            *subscribed = next;
            report.subscribed = to_subscribe;
        }

        if report.is_empty() {
            debug!(systems = subscribed.len(), "Kill subscriptions already in sync");
        } else {
            info!(
                subscribed = report.subscribed.len(),
                unsubscribed = report.unsubscribed.len(),
                total = subscribed.len(),
                "📡 Kill subscriptions synced"
            );
        }
        Ok(report)
    }
}
