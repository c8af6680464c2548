//! # Per-Map Executor
//!
//! Each started map runs one tokio task that owns its [`MapEngine`]. Public
//! operations become [`MapCommand`]s sent through a bounded mailbox and are
//! applied strictly in arrival order; callers await the reply on a oneshot.
//!
//! The task loads the engine from the repository before reading its
//! mailbox, so commands queued during a (re)start run against reloaded
//! state. After each command the executor publishes a fresh
//! [`MapSnapshot`] on a watch channel for lock-free readers.
//!
//! A stop signal is only observed between commands. Once it is raised (or
//! its sender is gone) the task exits and every handle still holding the
//! mailbox gets [`MapError::Restarting`].

use crate::commands::{ConnectionUpdate, SystemUpdate};
use crate::engine::{EngineContext, MapEngine, MapSnapshot};
use crate::error::{MapError, MapResult, Outcome};
use crate::events::MapTopic;
use crate::types::{Actor, CharacterId, ConnectionType, MapId, SolarSystemId, SystemLocation};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, error, info};

type Reply<T> = oneshot::Sender<MapResult<T>>;

/// Commands accepted by a map executor.
#[derive(Debug)]
pub enum MapCommand {
    AddSystem {
        location: SystemLocation,
        actor: Option<Actor>,
        reply: Reply<Outcome>,
    },
    UpdateSystem {
        solar_system_id: SolarSystemId,
        update: SystemUpdate,
        reply: Reply<Outcome>,
    },
    UpdateSystemAttribute {
        solar_system_id: SolarSystemId,
        attribute: String,
        value: Value,
        reply: Reply<Outcome>,
    },
    DeleteSystems {
        solar_system_ids: Vec<SolarSystemId>,
        actor: Option<Actor>,
        reply: Reply<Outcome>,
    },
    AddConnection {
        source: SolarSystemId,
        target: SolarSystemId,
        connection_type: ConnectionType,
        reply: Reply<Outcome>,
    },
    DeleteConnection {
        source: SolarSystemId,
        target: SolarSystemId,
        reply: Reply<Outcome>,
    },
    UpdateConnection {
        source: SolarSystemId,
        target: SolarSystemId,
        update: ConnectionUpdate,
        reply: Reply<Outcome>,
    },
    UpdateConnectionAttribute {
        source: SolarSystemId,
        target: SolarSystemId,
        attribute: String,
        value: Value,
        reply: Reply<Outcome>,
    },
    AddHub {
        solar_system_id: SolarSystemId,
        reply: Reply<Outcome>,
    },
    RemoveHub {
        solar_system_id: SolarSystemId,
        reply: Reply<Outcome>,
    },
    UpdateCharacterLocation {
        character_id: CharacterId,
        location: Option<SolarSystemId>,
        reply: Reply<Outcome>,
    },
    RemoveCharacter {
        character_id: CharacterId,
        reply: Reply<Outcome>,
    },
    RunGc {
        reply: Reply<usize>,
    },
}

/// How an executor task ended without panicking.
#[derive(Debug)]
pub(crate) enum ExecutorExit {
    /// Stop was signalled or every handle was dropped
    Stopped,
    /// The engine could not be loaded from the repository
    LoadFailed(MapError),
}

/// Cloneable sender side of a map's mailbox.
#[derive(Debug, Clone)]
pub struct MapHandle {
    map_id: MapId,
    sender: mpsc::Sender<MapCommand>,
}

impl MapHandle {
    pub fn map_id(&self) -> MapId {
        self.map_id
    }

    /// Sends a command and waits for its reply.
    ///
    /// A closed mailbox or a dropped reply means the executor went down
    /// while the command was queued; the caller gets a retriable
    /// [`MapError::Restarting`].
    async fn request<T>(&self, build: impl FnOnce(Reply<T>) -> MapCommand) -> MapResult<T> {
        let (reply, response) = oneshot::channel();
        self.sender
            .send(build(reply))
            .await
            .map_err(|_| MapError::Restarting(self.map_id))?;
        response.await.map_err(|_| MapError::Restarting(self.map_id))?
    }

    pub async fn add_system(&self, location: SystemLocation, actor: Option<Actor>) -> MapResult<Outcome> {
        self.request(|reply| MapCommand::AddSystem { location, actor, reply }).await
    }

    pub async fn update_system(&self, solar_system_id: SolarSystemId, update: SystemUpdate) -> MapResult<Outcome> {
        self.request(|reply| MapCommand::UpdateSystem {
            solar_system_id,
            update,
            reply,
        })
        .await
    }

    pub async fn update_system_attribute(
        &self,
        solar_system_id: SolarSystemId,
        attribute: impl Into<String>,
        value: Value,
    ) -> MapResult<Outcome> {
        let attribute = attribute.into();
        self.request(|reply| MapCommand::UpdateSystemAttribute {
            solar_system_id,
            attribute,
            value,
            reply,
        })
        .await
    }

    pub async fn delete_systems(&self, solar_system_ids: Vec<SolarSystemId>, actor: Option<Actor>) -> MapResult<Outcome> {
        self.request(|reply| MapCommand::DeleteSystems {
            solar_system_ids,
            actor,
            reply,
        })
        .await
    }

    pub async fn add_connection(
        &self,
        source: SolarSystemId,
        target: SolarSystemId,
        connection_type: ConnectionType,
    ) -> MapResult<Outcome> {
        self.request(|reply| MapCommand::AddConnection {
            source,
            target,
            connection_type,
            reply,
        })
        .await
    }

    pub async fn delete_connection(&self, source: SolarSystemId, target: SolarSystemId) -> MapResult<Outcome> {
        self.request(|reply| MapCommand::DeleteConnection { source, target, reply })
            .await
    }

    pub async fn update_connection(
        &self,
        source: SolarSystemId,
        target: SolarSystemId,
        update: ConnectionUpdate,
    ) -> MapResult<Outcome> {
        self.request(|reply| MapCommand::UpdateConnection {
            source,
            target,
            update,
            reply,
        })
        .await
    }

    pub async fn update_connection_attribute(
        &self,
        source: SolarSystemId,
        target: SolarSystemId,
        attribute: impl Into<String>,
        value: Value,
    ) -> MapResult<Outcome> {
        let attribute = attribute.into();
        self.request(|reply| MapCommand::UpdateConnectionAttribute {
            source,
            target,
            attribute,
            value,
            reply,
        })
        .await
    }

    pub async fn add_hub(&self, solar_system_id: SolarSystemId) -> MapResult<Outcome> {
        self.request(|reply| MapCommand::AddHub { solar_system_id, reply }).await
    }

    pub async fn remove_hub(&self, solar_system_id: SolarSystemId) -> MapResult<Outcome> {
        self.request(|reply| MapCommand::RemoveHub { solar_system_id, reply }).await
    }

    pub async fn update_character_location(
        &self,
        character_id: CharacterId,
        location: Option<SolarSystemId>,
    ) -> MapResult<Outcome> {
        self.request(|reply| MapCommand::UpdateCharacterLocation {
            character_id,
            location,
            reply,
        })
        .await
    }

    pub async fn remove_character(&self, character_id: CharacterId) -> MapResult<Outcome> {
        self.request(|reply| MapCommand::RemoveCharacter { character_id, reply })
            .await
    }

    /// Runs one GC pass, returning the number of expired systems.
    pub async fn run_gc(&self) -> MapResult<usize> {
        self.request(|reply| MapCommand::RunGc { reply }).await
    }
}

/// Creates a mailbox and spawns the executor task for `map_id`.
pub(crate) fn spawn_executor(
    map_id: MapId,
    ctx: EngineContext,
    topic: MapTopic,
    snapshot: Arc<watch::Sender<Arc<MapSnapshot>>>,
    stop: watch::Receiver<bool>,
    mailbox_capacity: usize,
) -> (MapHandle, tokio::task::JoinHandle<ExecutorExit>) {
    let (sender, mailbox) = mpsc::channel(mailbox_capacity);
    let task = tokio::spawn(run_executor(map_id, ctx, topic, snapshot, stop, mailbox));
    (MapHandle { map_id, sender }, task)
}

async fn run_executor(
    map_id: MapId,
    ctx: EngineContext,
    topic: MapTopic,
    snapshot: Arc<watch::Sender<Arc<MapSnapshot>>>,
    mut stop: watch::Receiver<bool>,
    mut mailbox: mpsc::Receiver<MapCommand>,
) -> ExecutorExit {
    let engine = match MapEngine::load(map_id, ctx, topic).await {
        Ok(engine) => engine,
        Err(err) => {
            error!(%map_id, error = %err, "❌ Failed to load map state");
            return ExecutorExit::LoadFailed(err);
        }
    };
    snapshot.send_replace(Arc::new(engine.snapshot()));
    info!(%map_id, "🚀 Map executor started");

    let mut executor = Executor { engine, snapshot };
    loop {
        tokio::select! {
            biased;
            _ = async { let _ = stop.wait_for(|stopped| *stopped).await; } => {
                info!(%map_id, "🛑 Map executor stopped");
                break;
            }
            command = mailbox.recv() => match command {
                Some(command) => executor.dispatch(command).await,
                None => {
                    debug!(%map_id, "Map executor mailbox closed");
                    break;
                }
            },
        }
    }

    ExecutorExit::Stopped
}

struct Executor {
    engine: MapEngine,
    snapshot: Arc<watch::Sender<Arc<MapSnapshot>>>,
}

impl Executor {
    /// Publishes the post-command snapshot, then answers the caller. A
    /// caller that stopped waiting is not an error.
    fn reply<T>(&self, reply: Reply<T>, result: MapResult<T>) {
        self.snapshot.send_replace(Arc::new(self.engine.snapshot()));
        let _ = reply.send(result);
    }

    async fn dispatch(&mut self, command: MapCommand) {
        let engine = &mut self.engine;
        match command {
            MapCommand::AddSystem { location, actor, reply } => {
                let result = engine.add_system(location, actor.as_ref()).await;
                self.reply(reply, result);
            }
            MapCommand::UpdateSystem {
                solar_system_id,
                update,
                reply,
            } => {
                let result = engine.update_system(solar_system_id, update).await;
                self.reply(reply, result);
            }
            MapCommand::UpdateSystemAttribute {
                solar_system_id,
                attribute,
                value,
                reply,
            } => {
                let result = engine.update_system_attribute(solar_system_id, &attribute, &value).await;
                self.reply(reply, result);
            }
            MapCommand::DeleteSystems {
                solar_system_ids,
                actor,
                reply,
            } => {
                let result = engine.delete_systems(&solar_system_ids, actor.as_ref()).await;
                self.reply(reply, result);
            }
            MapCommand::AddConnection {
                source,
                target,
                connection_type,
                reply,
            } => {
                let result = engine.add_connection(source, target, connection_type).await;
                self.reply(reply, result);
            }
            MapCommand::DeleteConnection { source, target, reply } => {
                let result = engine.delete_connection(source, target).await;
                self.reply(reply, result);
            }
            MapCommand::UpdateConnection {
                source,
                target,
                update,
                reply,
            } => {
                let result = engine.update_connection(source, target, update).await;
                self.reply(reply, result);
            }
            MapCommand::UpdateConnectionAttribute {
                source,
                target,
                attribute,
                value,
                reply,
            } => {
                let result = engine
                    .update_connection_attribute(source, target, &attribute, &value)
                    .await;
                self.reply(reply, result);
            }
            MapCommand::AddHub { solar_system_id, reply } => {
                let result = engine.add_hub(solar_system_id).await;
                self.reply(reply, result);
            }
            MapCommand::RemoveHub { solar_system_id, reply } => {
                let result = engine.remove_hub(solar_system_id).await;
                self.reply(reply, result);
            }
            MapCommand::UpdateCharacterLocation {
                character_id,
                location,
                reply,
            } => {
                let result = engine.update_character_location(character_id, location).await;
                self.reply(reply, result);
            }
            MapCommand::RemoveCharacter { character_id, reply } => {
                let result = Ok(engine.remove_character(character_id));
                self.reply(reply, result);
            }
            MapCommand::RunGc { reply } => {
                let result = engine.run_gc().await;
                self.reply(reply, result);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::EngineSettings;
    use crate::clock::ManualClock;
    use crate::repository::InMemoryRepository;
    use crate::static_info::PermissiveStaticInfo;
    use chrono::Utc;

    struct Spawned {
        handle: MapHandle,
        snapshot: Arc<watch::Sender<Arc<MapSnapshot>>>,
        topic: MapTopic,
        stop: watch::Sender<bool>,
        task: tokio::task::JoinHandle<ExecutorExit>,
    }

    fn spawn(map_id: MapId) -> Spawned {
        let ctx = EngineContext {
            repository: Arc::new(InMemoryRepository::new()),
            static_info: Arc::new(PermissiveStaticInfo),
            clock: Arc::new(ManualClock::default()),
            settings: EngineSettings::default(),
        };
        let topic = MapTopic::new(map_id);
        let snapshot = Arc::new(watch::channel(Arc::new(MapSnapshot::empty(map_id, Utc::now()))).0);
        let (stop, stop_rx) = watch::channel(false);
        let (handle, task) = spawn_executor(map_id, ctx, topic.clone(), snapshot.clone(), stop_rx, 8);
        Spawned {
            handle,
            snapshot,
            topic,
            stop,
            task,
        }
    }

    #[tokio::test]
    async fn commands_apply_in_order_and_update_the_snapshot() {
        let map_id = MapId::new();
        let Spawned {
            handle,
            snapshot,
            topic,
            stop: _stop,
            ..
        } = spawn(map_id);
        let mut rx = topic.subscribe();

        assert_eq!(handle.add_system(SystemLocation::new(10), None).await, Ok(Outcome::Applied));
        assert_eq!(handle.add_system(SystemLocation::new(20), None).await, Ok(Outcome::Applied));
        assert_eq!(
            handle.add_connection(10, 20, ConnectionType::Wormhole).await,
            Ok(Outcome::Applied)
        );

        let names: Vec<&str> = [rx.recv().await, rx.recv().await, rx.recv().await]
            .into_iter()
            .map(|event| event.unwrap().name())
            .collect();
        assert_eq!(names, vec!["add_system", "add_system", "add_connection"]);

        let current = snapshot.borrow().clone();
        assert_eq!(current.system_ids, vec![10, 20]);
        assert_eq!(current.connection_count, 1);
    }

    #[tokio::test]
    async fn concurrent_callers_are_serialized() {
        let Spawned {
            handle,
            snapshot,
            stop: _stop,
            ..
        } = spawn(MapId::new());

        let tasks: Vec<_> = (1..=20)
            .map(|id| {
                let handle = handle.clone();
                tokio::spawn(async move { handle.add_system(SystemLocation::new(id), None).await })
            })
            .collect();
        for task in tasks {
            assert_eq!(task.await.unwrap(), Ok(Outcome::Applied));
        }

        assert_eq!(snapshot.borrow().system_ids.len(), 20);
    }

    #[tokio::test]
    async fn stop_signal_ends_the_executor() {
        let map_id = MapId::new();
        let spawned = spawn(map_id);
        let handle = spawned.handle.clone();
        handle.add_system(SystemLocation::new(1), None).await.unwrap();

        spawned.stop.send_replace(true);
        let exit = tokio::time::timeout(std::time::Duration::from_secs(1), spawned.task)
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(exit, ExecutorExit::Stopped));

        // The mailbox is gone even though a handle is still held.
        assert_eq!(
            handle.add_system(SystemLocation::new(2), None).await,
            Err(MapError::Restarting(map_id))
        );
        assert_eq!(spawned.snapshot.borrow().system_ids, vec![1]);
    }
}
