//! Periodic coordination between the tracker and the feed.

use crate::error::FeedError;
use crate::feed::KillFeedClient;
use crate::subscription::{KillSubscriptionManager, SyncReport};
use crate::tracker::{ActiveMapSource, Entitlements, SystemTracker};
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Everything one subscription sync pass needs.
#[derive(Debug, Clone)]
pub struct SubscriptionSync {
    pub tracker: SystemTracker,
    pub subscriptions: Arc<KillSubscriptionManager>,
    pub source: Arc<dyn ActiveMapSource>,
    pub entitlements: Arc<dyn Entitlements>,
    pub client: Arc<dyn KillFeedClient>,
}

impl SubscriptionSync {
    /// Recomputes the tracked systems and pushes the difference to the feed.
    pub async fn run_once(&self, now: DateTime<Utc>) -> Result<SyncReport, FeedError> {
        let tracked = self
            .tracker
            .tracked_systems(self.source.as_ref(), self.entitlements.as_ref(), now)
            .await;
        self.subscriptions
            .sync_with_server(&tracked, self.client.as_ref())
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subscription::tests::{set, RecordingFeed};
    use crate::tracker::tests::{map, now, StaticMaps};
    use crate::tracker::AlwaysEntitled;

    #[tokio::test]
    async fn follows_map_changes() {
        let feed = Arc::new(RecordingFeed::default());
        let mut sync = SubscriptionSync {
            tracker: SystemTracker::default(),
            subscriptions: Arc::new(KillSubscriptionManager::new()),
            source: Arc::new(StaticMaps(vec![map("a", 1, &[1, 2])])),
            entitlements: Arc::new(AlwaysEntitled),
            client: feed.clone(),
        };

        let first = sync.run_once(now()).await.unwrap();
        assert_eq!(first.subscribed, vec![1, 2]);

        sync.source = Arc::new(StaticMaps(vec![map("a", 1, &[2, 3])]));
        let second = sync.run_once(now()).await.unwrap();
        assert_eq!(second.unsubscribed, vec![1]);
        assert_eq!(second.subscribed, vec![3]);
        assert_eq!(sync.subscriptions.subscribed().await, set([2, 3]));
    }
}
