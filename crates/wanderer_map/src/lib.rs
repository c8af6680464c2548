//! # Wanderer Map Engine
//!
//! Live, collaboratively edited maps of solar systems (nodes) and the
//! connections between them (edges). Each map is owned by one serialized
//! executor that keeps the node/edge/hub sets consistent, lays out newly
//! discovered systems without overlaps, expires stale systems and
//! broadcasts ordered diffs to every viewer.
//!
//! ## Architecture Overview
//!
//! ### Engine
//! [`MapEngine`] applies mutations against the [`SpatialIndex`], the
//! [`ActivityCache`] and the [`MapRepository`], and publishes [`MapEvent`]s.
//!
//! ### Executor
//! One tokio task per map drains a bounded mailbox of [`MapCommand`]s, so two
//! mutations on the same map are never applied concurrently or out of order.
//! [`MapHandle`] is the async API in front of that mailbox.
//!
//! ### Manager
//! [`MapManager`] starts executors lazily, restarts crashed ones from the
//! repository and exposes per-map snapshots that readers use without
//! queueing behind a mailbox.
//!
//! ## Quick Start Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use wanderer_map::*;
//!
//! # async fn demo() -> MapResult<()> {
//! let manager = MapManager::new(
//!     EngineContext {
//!         repository: Arc::new(InMemoryRepository::new()),
//!         static_info: Arc::new(PermissiveStaticInfo),
//!         clock: Arc::new(SystemClock),
//!         settings: EngineSettings::default(),
//!     },
//!     ManagerSettings::default(),
//! );
//!
//! let map = manager.handle(MapId::new())?;
//! map.add_system(SystemLocation::new(30000142), None).await?;
//! map.add_system(SystemLocation::new(30000144), None).await?;
//! map.add_connection(30000142, 30000144, ConnectionType::Stargate).await?;
//! # Ok(())
//! # }
//! ```

pub mod activity;
pub mod clock;
pub mod commands;
pub mod engine;
pub mod error;
pub mod events;
pub mod executor;
pub mod manager;
pub mod repository;
pub mod spatial;
pub mod static_info;
pub mod types;

pub use activity::ActivityCache;
pub use clock::{Clock, ManualClock, SystemClock};
pub use commands::{ConnectionUpdate, SystemUpdate};
pub use engine::{EngineContext, EngineSettings, MapEngine, MapSnapshot, MapState};
pub use error::{MapError, MapResult, Outcome, RepositoryError, RepositoryResult};
pub use events::{MapEvent, MapTopic, MAP_EVENT_CAPACITY};
pub use executor::{MapCommand, MapHandle};
pub use manager::{ManagerSettings, MapManager};
pub use repository::{InMemoryRepository, MapRepository};
pub use spatial::{system_rect, PositionCalculator, Rect, SpatialIndex};
pub use static_info::{InMemoryStaticInfo, PermissiveStaticInfo, StaticDataError, StaticInfo};
pub use types::*;
