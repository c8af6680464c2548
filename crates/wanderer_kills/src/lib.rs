//! # Wanderer Kills
//!
//! Keeps an external kill feed subscribed to the systems shown on active
//! maps, and turns the killmails it sends into enriched, cached records.
//!
//! ## Ingestion
//!
//! Raw payloads go through [`KillPipeline`]: the [`TimeHandler`] drops kills
//! older than the cutoff, [`adapt_kill_data`] normalizes the accepted payload
//! shapes into a [`Killmail`], the [`Enricher`] resolves names with bounded
//! retries, and the [`KillCache`] stores the result per system.
//!
//! ## Subscriptions
//!
//! [`SystemTracker`] computes the systems that should be covered,
//! [`KillSubscriptionManager`] diffs them against what the feed already has,
//! and [`SubscriptionSync`] pushes the difference through a
//! [`KillFeedClient`] such as the [`WebSocketFeedClient`].

pub mod adapter;
pub mod enricher;
pub mod error;
pub mod feed;
pub mod lookup;
pub mod pipeline;
pub mod retry;
pub mod storage;
pub mod subscription;
pub mod sync;
pub mod time_handler;
pub mod tracker;
pub mod types;

pub use adapter::{adapt_kill_data, detect_shape, PayloadShape};
pub use enricher::{Enricher, EnrichmentReport};
pub use error::{AdapterError, FeedError, IngestError, LookupError, TimeError};
pub use feed::{FeedEvent, FeedSettings, KillFeedClient, KillSink, PhoenixMessage, WebSocketFeedClient};
pub use lookup::{AllianceInfo, CachedLookup, CharacterInfo, CorporationInfo, EsiLookup, OfflineLookup, ShipInfo};
pub use pipeline::{BatchSummary, IngestOutcome, KillPipeline};
pub use retry::RetryPolicy;
pub use storage::{KillCache, DEFAULT_MAX_KILLS_PER_SYSTEM};
pub use subscription::{
    cleanup_subscriptions, subscribe_systems, unsubscribe_systems, KillSubscriptionManager, SyncReport, SystemSet,
};
pub use sync::SubscriptionSync;
pub use time_handler::{extract_kill_time, parse_kill_time, KillAge, TimeHandler, DEFAULT_KILL_CUTOFF};
pub use tracker::{
    ActiveMap, ActiveMapSource, AlwaysEntitled, EntitledMaps, Entitlements, SystemTracker, DEFAULT_ACTIVE_WINDOW,
};
pub use types::{Killmail, Participant, SolarSystemId};
