//! Phoenix channel client for the external kill service.
//!
//! Wire format is Phoenix v1 JSON: `{"topic", "event", "payload", "ref"}`.
//! The client joins [`LOBBY_TOPIC`] with the current system list, pushes
//! `subscribe_systems`/`unsubscribe_systems` as the set changes, heartbeats on
//! the `phoenix` topic and hands every `killmail_update` to the
//! [`KillPipeline`]. Dropped connections are retried with backoff and the
//! join on reconnect carries the full system list.

use super::{KillFeedClient, KillSink};
use crate::error::FeedError;
use crate::pipeline::KillPipeline;
use crate::retry::RetryPolicy;
use crate::subscription::SystemSet;
use crate::types::SolarSystemId;
use async_trait::async_trait;
use chrono::Utc;
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

pub const LOBBY_TOPIC: &str = "killmails:lobby";
const HEARTBEAT_TOPIC: &str = "phoenix";
const COMMAND_CAPACITY: usize = 64;

/// One Phoenix channel frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhoenixMessage {
    pub topic: String,
    pub event: String,
    #[serde(default)]
    pub payload: Value,
    #[serde(rename = "ref", default)]
    pub reference: Option<String>,
}

impl PhoenixMessage {
    fn new(topic: &str, event: &str, payload: Value, reference: u64) -> Self {
        Self {
            topic: topic.to_string(),
            event: event.to_string(),
            payload,
            reference: Some(reference.to_string()),
        }
    }

    pub fn join(systems: &SystemSet, reference: u64) -> Self {
        Self::new(LOBBY_TOPIC, "phx_join", json!({ "systems": systems }), reference)
    }

    pub fn subscribe(systems: &[SolarSystemId], reference: u64) -> Self {
        Self::new(LOBBY_TOPIC, "subscribe_systems", json!({ "systems": systems }), reference)
    }

    pub fn unsubscribe(systems: &[SolarSystemId], reference: u64) -> Self {
        Self::new(LOBBY_TOPIC, "unsubscribe_systems", json!({ "systems": systems }), reference)
    }

    pub fn heartbeat(reference: u64) -> Self {
        Self::new(HEARTBEAT_TOPIC, "heartbeat", json!({}), reference)
    }

    pub fn encode(&self) -> Result<String, FeedError> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Inbound frames the client acts on.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedEvent {
    KillmailUpdate {
        solar_system_id: SolarSystemId,
        killmails: Vec<Value>,
    },
    Reply {
        reference: Option<String>,
        ok: bool,
        response: Value,
    },
    Other(String),
}

impl FeedEvent {
    pub fn parse(text: &str) -> Result<Self, FeedError> {
        let message: PhoenixMessage =
            serde_json::from_str(text).map_err(|e| FeedError::Protocol(e.to_string()))?;

        match message.event.as_str() {
            "killmail_update" => {
                let solar_system_id = message
                    .payload
                    .get("system_id")
                    .or_else(|| message.payload.get("solar_system_id"))
                    .and_then(Value::as_i64)
                    .ok_or_else(|| FeedError::Protocol("killmail_update without system_id".into()))?;
                let killmails = match message.payload.get("killmails") {
                    Some(Value::Array(kills)) => kills.clone(),
                    None | Some(Value::Null) => Vec::new(),
                    Some(_) => return Err(FeedError::Protocol("killmails is not a list".into())),
                };
                Ok(FeedEvent::KillmailUpdate {
                    solar_system_id,
                    killmails,
                })
            }
            "phx_reply" => Ok(FeedEvent::Reply {
                reference: message.reference,
                ok: message.payload.get("status").and_then(Value::as_str) == Some("ok"),
                response: message.payload.get("response").cloned().unwrap_or(Value::Null),
            }),
            _ => Ok(FeedEvent::Other(message.event)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FeedSettings {
    pub url: String,
    pub heartbeat_interval: Duration,
    /// Only the backoff part is used; reconnects never give up.
    pub reconnect: RetryPolicy,
}

impl FeedSettings {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            heartbeat_interval: Duration::from_secs(30),
            reconnect: RetryPolicy {
                max_attempts: u32::MAX,
                base_delay: Duration::from_secs(1),
                max_delay: Duration::from_secs(30),
            },
        }
    }
}

#[derive(Debug)]
enum FeedCommand {
    Subscribe(Vec<SolarSystemId>),
    Unsubscribe(Vec<SolarSystemId>),
}

/// Handle to the background connection task.
///
/// Subscription calls succeed once the instruction is queued; the task
/// replays the full set on every (re)join, so nothing is lost while
/// disconnected.
#[derive(Debug, Clone)]
pub struct WebSocketFeedClient {
    commands: mpsc::Sender<FeedCommand>,
}

impl WebSocketFeedClient {
    pub fn spawn(
        settings: FeedSettings,
        pipeline: Arc<KillPipeline>,
        sink: Arc<dyn KillSink>,
        shutdown: watch::Receiver<bool>,
    ) -> (Self, JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel(COMMAND_CAPACITY);
        let connection = FeedConnection {
            settings,
            pipeline,
            sink,
            commands: receiver,
            shutdown,
            systems: SystemSet::new(),
            next_ref: 0,
        };
        (Self { commands: sender }, tokio::spawn(connection.run()))
    }

    async fn send(&self, command: FeedCommand) -> Result<(), FeedError> {
        self.commands.send(command).await.map_err(|_| FeedError::Closed)
    }
}

#[async_trait]
impl KillFeedClient for WebSocketFeedClient {
    async fn subscribe_systems(&self, solar_system_ids: &[SolarSystemId]) -> Result<(), FeedError> {
        self.send(FeedCommand::Subscribe(solar_system_ids.to_vec())).await
    }

    async fn unsubscribe_systems(&self, solar_system_ids: &[SolarSystemId]) -> Result<(), FeedError> {
        self.send(FeedCommand::Unsubscribe(solar_system_ids.to_vec())).await
    }
}

enum SessionEnd {
    Dropped,
    Shutdown,
}

struct FeedConnection {
    settings: FeedSettings,
    pipeline: Arc<KillPipeline>,
    sink: Arc<dyn KillSink>,
    commands: mpsc::Receiver<FeedCommand>,
    shutdown: watch::Receiver<bool>,
    systems: SystemSet,
    next_ref: u64,
}

impl FeedConnection {
    async fn run(mut self) {
        let mut failures = 0u32;

        loop {
            if *self.shutdown.borrow() {
                break;
            }

            match self.session().await {
                Ok(SessionEnd::Shutdown) => break,
                Ok(SessionEnd::Dropped) => {
                    warn!(url = %self.settings.url, "🔌 Kill feed connection dropped");
                    failures = 1;
                }
                Err(err) => {
                    failures = failures.saturating_add(1);
                    error!(url = %self.settings.url, attempt = failures, error = %err, "❌ Kill feed session failed");
                }
            }

            let delay = self.settings.reconnect.backoff(failures);
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = self.shutdown.changed() => break,
            }
        }
        info!("🛑 Kill feed client stopped");
    }

    fn reference(&mut self) -> u64 {
        self.next_ref += 1;
        self.next_ref
    }

    fn apply(&mut self, command: &FeedCommand) {
        match command {
            FeedCommand::Subscribe(ids) => self.systems.extend(ids.iter().copied()),
            FeedCommand::Unsubscribe(ids) => {
                for id in ids {
                    self.systems.remove(id);
                }
            }
        }
    }

    async fn session(&mut self) -> Result<SessionEnd, FeedError> {
        let (stream, _) = connect_async(self.settings.url.as_str())
            .await
            .map_err(|e| FeedError::Connect(self.settings.url.clone(), e.to_string()))?;
        let (mut ws_sender, mut ws_receiver) = stream.split();

        // Instructions queued while offline are folded into the join.
        while let Ok(command) = self.commands.try_recv() {
            self.apply(&command);
        }
        let reference = self.reference();
        let join = PhoenixMessage::join(&self.systems, reference).encode()?;
        ws_sender
            .send(Message::Text(join.into()))
            .await
            .map_err(|e| FeedError::Protocol(e.to_string()))?;
        info!(url = %self.settings.url, systems = self.systems.len(), "🔌 Joined kill feed");

        let mut heartbeat = tokio::time::interval(self.settings.heartbeat_interval);
        heartbeat.tick().await;

        loop {
            let outgoing = tokio::select! {
                incoming = ws_receiver.next() => {
                    match incoming {
                        Some(Ok(Message::Text(text))) => {
                            self.handle_text(text.as_str());
                            None
                        }
                        Some(Ok(Message::Close(frame))) => {
                            debug!(?frame, "Kill feed sent close");
                            return Ok(SessionEnd::Dropped);
                        }
                        Some(Ok(_)) => None,
                        Some(Err(e)) => return Err(FeedError::Protocol(e.to_string())),
                        None => return Ok(SessionEnd::Dropped),
                    }
                }
                command = self.commands.recv() => {
                    let Some(command) = command else {
                        let _ = ws_sender.send(Message::Close(None)).await;
                        return Ok(SessionEnd::Shutdown);
                    };
                    self.apply(&command);
                    let reference = self.reference();
                    Some(match &command {
                        FeedCommand::Subscribe(ids) => PhoenixMessage::subscribe(ids, reference),
                        FeedCommand::Unsubscribe(ids) => PhoenixMessage::unsubscribe(ids, reference),
                    })
                }
                _ = heartbeat.tick() => Some(PhoenixMessage::heartbeat(self.reference())),
                _ = self.shutdown.changed() => {
                    let _ = ws_sender.send(Message::Close(None)).await;
                    return Ok(SessionEnd::Shutdown);
                }
            };

            if let Some(message) = outgoing {
                ws_sender
                    .send(Message::Text(message.encode()?.into()))
                    .await
                    .map_err(|e| FeedError::Protocol(e.to_string()))?;
            }
        }
    }

    fn handle_text(&self, text: &str) {
        match FeedEvent::parse(text) {
            Ok(FeedEvent::KillmailUpdate {
                solar_system_id,
                killmails,
            }) => {
                debug!(solar_system_id, count = killmails.len(), "Received killmail update");
                let pipeline = self.pipeline.clone();
                let sink = self.sink.clone();
                tokio::spawn(async move {
                    let summary = pipeline
                        .process_system_update(solar_system_id, &killmails, Utc::now())
                        .await;
                    if !summary.stored.is_empty() {
                        sink.kills_stored(solar_system_id, &summary.stored);
                    }
                });
            }
            Ok(FeedEvent::Reply { ok: false, reference, response }) => {
                warn!(?reference, %response, "Kill feed rejected a request");
            }
            Ok(FeedEvent::Reply { .. }) => {}
            Ok(FeedEvent::Other(event)) => debug!(event, "Ignoring kill feed event"),
            Err(err) => warn!(error = %err, "Unreadable kill feed frame"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_carries_the_system_list() {
        let systems: SystemSet = [31000005, 30000142].into_iter().collect();
        let encoded = PhoenixMessage::join(&systems, 1).encode().unwrap();
        let value: Value = serde_json::from_str(&encoded).unwrap();

        assert_eq!(
            value,
            json!({
                "topic": "killmails:lobby",
                "event": "phx_join",
                "payload": {"systems": [30000142, 31000005]},
                "ref": "1"
            })
        );
    }

    #[test]
    fn heartbeat_goes_to_the_phoenix_topic() {
        let heartbeat = PhoenixMessage::heartbeat(7);
        assert_eq!(heartbeat.topic, "phoenix");
        assert_eq!(heartbeat.event, "heartbeat");
        assert_eq!(PhoenixMessage::unsubscribe(&[1], 8).event, "unsubscribe_systems");
    }

    #[test]
    fn parses_killmail_updates() {
        let text = r#"{"topic":"killmails:lobby","event":"killmail_update","payload":{"system_id":31000005,"killmails":[{"killmail_id":1}]},"ref":null}"#;
        assert_eq!(
            FeedEvent::parse(text).unwrap(),
            FeedEvent::KillmailUpdate {
                solar_system_id: 31000005,
                killmails: vec![json!({"killmail_id": 1})],
            }
        );
    }

    #[test]
    fn parses_replies_and_other_events() {
        let reply = r#"{"topic":"killmails:lobby","event":"phx_reply","payload":{"status":"error","response":{"reason":"unauthorized"}},"ref":"3"}"#;
        let FeedEvent::Reply { ok, reference, .. } = FeedEvent::parse(reply).unwrap() else {
            panic!("expected a reply");
        };
        assert!(!ok);
        assert_eq!(reference.as_deref(), Some("3"));

        let other = r#"{"topic":"killmails:lobby","event":"kill_count_update","payload":{}}"#;
        assert_eq!(FeedEvent::parse(other).unwrap(), FeedEvent::Other("kill_count_update".into()));
    }

    #[test]
    fn rejects_malformed_frames() {
        assert!(matches!(FeedEvent::parse("not json"), Err(FeedError::Protocol(_))));
        let no_system = r#"{"topic":"t","event":"killmail_update","payload":{"killmails":[]}}"#;
        assert!(matches!(FeedEvent::parse(no_system), Err(FeedError::Protocol(_))));
    }
}
