//! Kill feed transport seams.
//!
//! [`KillFeedClient`] is the outbound side (subscription instructions),
//! [`KillSink`] receives kills once they are stored.

pub mod websocket;

use crate::error::FeedError;
use crate::types::{Killmail, SolarSystemId};
use async_trait::async_trait;

pub use websocket::{FeedEvent, FeedSettings, PhoenixMessage, WebSocketFeedClient, LOBBY_TOPIC};

/// Sends subscription changes to the external kill service.
#[async_trait]
pub trait KillFeedClient: Send + Sync + std::fmt::Debug {
    async fn subscribe_systems(&self, solar_system_ids: &[SolarSystemId]) -> Result<(), FeedError>;
    async fn unsubscribe_systems(&self, solar_system_ids: &[SolarSystemId]) -> Result<(), FeedError>;
}

/// Consumer of freshly stored kills, e.g. the map broadcaster.
pub trait KillSink: Send + Sync + std::fmt::Debug {
    fn kills_stored(&self, solar_system_id: SolarSystemId, killmails: &[Killmail]);
}
