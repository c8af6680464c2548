//! # Map Manager
//!
//! Registry of running map executors. Maps start lazily on first access and
//! are supervised by a watchdog task: when an executor panics, the watchdog
//! respawns it against the same broadcast topic and snapshot channel, and
//! the new executor reloads the map from the repository before serving
//! commands. Commands caught in the crash fail with the retriable
//! [`MapError::Restarting`].
//!
//! Every slot carries a generation number. A watchdog only ever touches the
//! slot it was started for, so a map stopped and started again cannot be
//! removed or respawned by the previous executor's watchdog.

use crate::engine::{EngineContext, MapSnapshot};
use crate::error::{MapError, MapResult};
use crate::events::{MapEvent, MapTopic};
use crate::executor::{spawn_executor, ExecutorExit, MapHandle};
use crate::types::{MapId, SolarSystemId};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::join_all;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Manager-wide executor settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ManagerSettings {
    /// Bounded mailbox size of each map executor
    pub mailbox_capacity: usize,
}

impl Default for ManagerSettings {
    fn default() -> Self {
        Self { mailbox_capacity: 256 }
    }
}

#[derive(Debug)]
enum SlotStatus {
    Running(MapHandle),
    Restarting,
    /// Stop was signalled; the slot goes away once the executor exits
    Stopping,
}

#[derive(Debug)]
struct MapSlot {
    generation: u64,
    topic: MapTopic,
    snapshot: Arc<watch::Sender<Arc<MapSnapshot>>>,
    stop: watch::Sender<bool>,
    status: SlotStatus,
}

impl MapSlot {
    fn is_stopping(&self) -> bool {
        *self.stop.borrow()
    }
}

#[derive(Debug)]
struct ManagerInner {
    ctx: EngineContext,
    settings: ManagerSettings,
    maps: DashMap<MapId, MapSlot>,
    next_generation: AtomicU64,
    shutting_down: AtomicBool,
}

impl ManagerInner {
    /// Removes the slot only if it is still the one `generation` refers to.
    fn remove_slot(&self, map_id: MapId, generation: u64) {
        self.maps.remove_if(&map_id, |_, slot| slot.generation == generation);
    }
}

/// Starts, supervises and looks up map executors.
///
/// Cloning is cheap and shares the same registry.
#[derive(Debug, Clone)]
pub struct MapManager {
    inner: Arc<ManagerInner>,
}

impl MapManager {
    pub fn new(ctx: EngineContext, settings: ManagerSettings) -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                ctx,
                settings,
                maps: DashMap::new(),
                next_generation: AtomicU64::new(0),
                shutting_down: AtomicBool::new(false),
            }),
        }
    }

    /// Returns the handle of a map's executor, starting it on first access.
    pub fn handle(&self, map_id: MapId) -> MapResult<MapHandle> {
        if self.inner.shutting_down.load(Ordering::Acquire) {
            return Err(MapError::Unavailable(map_id));
        }

        match self.inner.maps.entry(map_id) {
            Entry::Occupied(entry) => match &entry.get().status {
                SlotStatus::Running(handle) => Ok(handle.clone()),
                SlotStatus::Restarting | SlotStatus::Stopping => Err(MapError::Restarting(map_id)),
            },
            Entry::Vacant(entry) => {
                let generation = self.inner.next_generation.fetch_add(1, Ordering::Relaxed);
                let topic = MapTopic::new(map_id);
                let (snapshot, _) = watch::channel(Arc::new(MapSnapshot::empty(map_id, self.inner.ctx.clock.now())));
                let snapshot = Arc::new(snapshot);
                let (stop, stop_rx) = watch::channel(false);
                let (handle, task) = spawn_executor(
                    map_id,
                    self.inner.ctx.clone(),
                    topic.clone(),
                    snapshot.clone(),
                    stop_rx,
                    self.inner.settings.mailbox_capacity,
                );
                entry.insert(MapSlot {
                    generation,
                    topic,
                    snapshot,
                    stop,
                    status: SlotStatus::Running(handle.clone()),
                });
                tokio::spawn(watchdog(Arc::downgrade(&self.inner), map_id, generation, task));
                info!(%map_id, "🗺️ Map started");
                Ok(handle)
            }
        }
    }

    /// Subscribes to a map's broadcast topic, starting the map if needed.
    pub fn subscribe(&self, map_id: MapId) -> MapResult<broadcast::Receiver<MapEvent>> {
        self.handle(map_id)?;
        self.inner
            .maps
            .get(&map_id)
            .map(|slot| slot.topic.subscribe())
            .ok_or(MapError::Restarting(map_id))
    }

    /// Latest snapshot of a started map, read without touching its mailbox.
    pub fn snapshot(&self, map_id: MapId) -> Option<Arc<MapSnapshot>> {
        self.inner.maps.get(&map_id).map(|slot| slot.snapshot.borrow().clone())
    }

    /// Snapshots of every started map.
    pub fn snapshots(&self) -> Vec<Arc<MapSnapshot>> {
        self.inner
            .maps
            .iter()
            .map(|slot| slot.snapshot.borrow().clone())
            .collect()
    }

    pub fn started_maps(&self) -> Vec<MapId> {
        self.inner.maps.iter().map(|slot| *slot.key()).collect()
    }

    pub fn is_started(&self, map_id: MapId) -> bool {
        self.inner.maps.contains_key(&map_id)
    }

    /// Runs one GC pass on every running map and returns the total number
    /// of expired systems. Passes run concurrently, one per executor; maps
    /// that are restarting or stopping are skipped this round.
    pub async fn run_gc(&self) -> usize {
        let handles: Vec<MapHandle> = self
            .inner
            .maps
            .iter()
            .filter_map(|slot| match &slot.status {
                SlotStatus::Running(handle) => Some(handle.clone()),
                SlotStatus::Restarting | SlotStatus::Stopping => None,
            })
            .collect();

        let passes = handles.iter().map(|handle| async move { (handle.map_id(), handle.run_gc().await) });
        join_all(passes)
            .await
            .into_iter()
            .map(|(map_id, result)| match result {
                Ok(count) => count,
                Err(err) => {
                    warn!(%map_id, error = %err, "GC pass skipped");
                    0
                }
            })
            .sum()
    }

    /// Publishes `event` to every started map that shows `solar_system_id`.
    ///
    /// Goes straight to the broadcast topics; returns how many maps were
    /// notified.
    pub fn publish_to_system(&self, solar_system_id: SolarSystemId, event: &MapEvent) -> usize {
        let mut notified = 0;
        for slot in self.inner.maps.iter() {
            if slot.snapshot.borrow().contains(solar_system_id) {
                slot.topic.publish(event.clone());
                notified += 1;
            }
        }
        notified
    }

    /// Stops a map's executor after the command it is running.
    ///
    /// Handles already given out fail with [`MapError::Restarting`] from
    /// then on. The slot stays registered (and `handle` answers
    /// `Restarting`) until the executor has exited, so the map never has
    /// two executors; the next access after that starts it again.
    pub fn stop(&self, map_id: MapId) -> bool {
        let Some(mut slot) = self.inner.maps.get_mut(&map_id) else {
            return false;
        };
        slot.stop.send_replace(true);
        slot.status = SlotStatus::Stopping;
        debug!(%map_id, generation = slot.generation, "Map stop requested");
        true
    }

    /// Stops every executor and refuses further starts.
    pub fn shutdown(&self) {
        self.inner.shutting_down.store(true, Ordering::Release);
        for slot in self.inner.maps.iter() {
            slot.stop.send_replace(true);
        }
        let count = self.inner.maps.len();
        self.inner.maps.clear();
        info!(count, "🛑 Map executors stopped");
    }
}

/// Supervises the executor of one slot generation until it stops for good.
async fn watchdog(inner: Weak<ManagerInner>, map_id: MapId, generation: u64, mut task: JoinHandle<ExecutorExit>) {
    let mut restarts: u32 = 0;

    loop {
        let exit = (&mut task).await;
        let Some(inner) = inner.upgrade() else {
            return;
        };

        match exit {
            Ok(ExecutorExit::Stopped) => {
                debug!(%map_id, generation, "Map executor stopped");
                inner.remove_slot(map_id, generation);
                return;
            }
            Ok(ExecutorExit::LoadFailed(err)) => {
                warn!(%map_id, error = %err, "Dropping map after failed load, next access retries");
                inner.remove_slot(map_id, generation);
                return;
            }
            Err(join_error) if join_error.is_cancelled() || inner.shutting_down.load(Ordering::Acquire) => {
                inner.remove_slot(map_id, generation);
                return;
            }
            Err(join_error) => {
                let Some(mut slot) = inner.maps.get_mut(&map_id) else {
                    return;
                };
                if slot.generation != generation {
                    return;
                }
                if slot.is_stopping() {
                    drop(slot);
                    inner.remove_slot(map_id, generation);
                    return;
                }

                restarts += 1;
                error!(%map_id, restarts, error = %join_error, "💥 Map executor crashed, restarting");
                slot.status = SlotStatus::Restarting;
                let (handle, next) = spawn_executor(
                    map_id,
                    inner.ctx.clone(),
                    slot.topic.clone(),
                    slot.snapshot.clone(),
                    slot.stop.subscribe(),
                    inner.settings.mailbox_capacity,
                );
                slot.status = SlotStatus::Running(handle);
                task = next;
            }
        }
    }
}
