//! End-to-end checks of the websocket kill feed against a local Phoenix-like
//! server.

use chrono::{SecondsFormat, Utc};
use futures::{SinkExt, StreamExt};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tokio::time::timeout;
use tokio_tungstenite::{accept_async, tungstenite::Message, WebSocketStream};
use wanderer_kills::*;

#[derive(Debug)]
struct ChannelSink(mpsc::UnboundedSender<(SolarSystemId, Vec<Killmail>)>);

impl KillSink for ChannelSink {
    fn kills_stored(&self, solar_system_id: SolarSystemId, killmails: &[Killmail]) {
        let _ = self.0.send((solar_system_id, killmails.to_vec()));
    }
}

struct Harness {
    listener: TcpListener,
    client: WebSocketFeedClient,
    kills: mpsc::UnboundedReceiver<(SolarSystemId, Vec<Killmail>)>,
    shutdown: watch::Sender<bool>,
    task: tokio::task::JoinHandle<()>,
}

async fn harness() -> Harness {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}", listener.local_addr().unwrap());

    let mut settings = FeedSettings::new(url);
    settings.reconnect.base_delay = Duration::from_millis(10);
    settings.reconnect.max_delay = Duration::from_millis(50);

    let pipeline = Arc::new(KillPipeline::new(
        TimeHandler::default(),
        Enricher::new(Arc::new(OfflineLookup), RetryPolicy::default()),
        Arc::new(KillCache::default()),
    ));
    let (kill_tx, kills) = mpsc::unbounded_channel();
    let (shutdown, shutdown_rx) = watch::channel(false);
    let (client, task) = WebSocketFeedClient::spawn(settings, pipeline, Arc::new(ChannelSink(kill_tx)), shutdown_rx);

    Harness {
        listener,
        client,
        kills,
        shutdown,
        task,
    }
}

async fn accept(listener: &TcpListener) -> WebSocketStream<TcpStream> {
    let (stream, _) = timeout(Duration::from_secs(5), listener.accept())
        .await
        .expect("client never connected")
        .unwrap();
    accept_async(stream).await.unwrap()
}

/// Next text frame, skipping heartbeats.
async fn next_frame(ws: &mut WebSocketStream<TcpStream>) -> PhoenixMessage {
    loop {
        let message = timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("no frame from client")
            .unwrap()
            .unwrap();
        if let Message::Text(text) = message {
            let frame: PhoenixMessage = serde_json::from_str(text.as_str()).unwrap();
            if frame.event != "heartbeat" {
                return frame;
            }
        }
    }
}

#[tokio::test]
async fn joins_subscribes_and_ingests_kills() {
    let mut h = harness().await;
    let mut server = accept(&h.listener).await;

    let join = next_frame(&mut server).await;
    assert_eq!(join.topic, "killmails:lobby");
    assert_eq!(join.event, "phx_join");
    assert_eq!(join.payload, json!({"systems": []}));

    h.client.subscribe_systems(&[31000005]).await.unwrap();
    let subscribe = next_frame(&mut server).await;
    assert_eq!(subscribe.event, "subscribe_systems");
    assert_eq!(subscribe.payload, json!({"systems": [31000005]}));

    let update = json!({
        "topic": "killmails:lobby",
        "event": "killmail_update",
        "payload": {
            "system_id": 31000005,
            "killmails": [{
                "killmail_id": 77,
                "killmail_time": Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
                "solar_system_id": 31000005,
                "victim": {"character_id": 1},
                "attackers": [{"character_id": 2, "final_blow": true}],
                "zkb": {"totalValue": 5.0}
            }]
        },
        "ref": null
    });
    server.send(Message::Text(update.to_string().into())).await.unwrap();

    let (solar_system_id, kills) = timeout(Duration::from_secs(5), h.kills.recv())
        .await
        .expect("kill never reached the sink")
        .unwrap();
    assert_eq!(solar_system_id, 31000005);
    assert_eq!(kills.len(), 1);
    assert_eq!(kills[0].killmail_id, 77);

    h.shutdown.send(true).unwrap();
    timeout(Duration::from_secs(5), h.task).await.unwrap().unwrap();
}

#[tokio::test]
async fn rejoin_after_drop_replays_subscriptions() {
    let h = harness().await;

    let mut first = accept(&h.listener).await;
    next_frame(&mut first).await;
    h.client.subscribe_systems(&[1, 2]).await.unwrap();
    h.client.unsubscribe_systems(&[2]).await.unwrap();
    assert_eq!(next_frame(&mut first).await.event, "subscribe_systems");
    assert_eq!(next_frame(&mut first).await.event, "unsubscribe_systems");
    drop(first);

    let mut second = accept(&h.listener).await;
    let join = next_frame(&mut second).await;
    assert_eq!(join.event, "phx_join");
    assert_eq!(join.payload, json!({"systems": [1]}));

    h.shutdown.send(true).unwrap();
    timeout(Duration::from_secs(5), h.task).await.unwrap().unwrap();
}
