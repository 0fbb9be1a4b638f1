use std::{net::SocketAddr, sync::Arc, time::Duration};

use dice_party::{round_engine::RoundEngineModule, websocket::router, Conf, Context};
use futures::{SinkExt, StreamExt};
use prometheus::Registry;
use serde_json::{json, Value};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn start_server() -> SocketAddr {
    let conf = Conf {
        id: "dice_party_test".into(),
        log_format: "full".into(),
        server_address: "127.0.0.1:0".into(),
        roll_delay_ms: 20,
        dice_seed: Some(1),
    };
    let (engine, handle) = RoundEngineModule::build(&conf);
    tokio::spawn(engine.run());

    let ctx = Arc::new(Context {
        config: Arc::new(conf),
        engine: handle,
        registry: Registry::new(),
    });
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router(ctx)).await.unwrap();
    });
    addr
}

async fn connect(addr: SocketAddr) -> Client {
    let (ws, _) = connect_async(format!("ws://{addr}/ws")).await.unwrap();
    ws
}

async fn next_json(ws: &mut Client) -> Value {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timed out waiting for a message")
            .expect("stream ended")
            .expect("websocket error");
        if let Message::Text(text) = msg {
            return serde_json::from_str(text.as_str()).unwrap();
        }
    }
}

/// Next text message, or `None` once the socket has been quiet for `quiet`.
async fn try_next_json(ws: &mut Client, quiet: Duration) -> Option<Value> {
    loop {
        let msg = tokio::time::timeout(quiet, ws.next()).await.ok()??.ok()?;
        if let Message::Text(text) = msg {
            return Some(serde_json::from_str(text.as_str()).unwrap());
        }
    }
}

async fn send_json(ws: &mut Client, value: Value) {
    ws.send(Message::text(value.to_string())).await.unwrap();
}

fn send_state() -> Value {
    json!({ "type": "RoundEngine", "payload": { "type": "SendState" } })
}

fn start_round(threshold: &str, condition: &str) -> Value {
    json!({
        "type": "RoundEngine",
        "payload": {
            "type": "StartRound",
            "payload": { "threshold": threshold, "condition": condition }
        }
    })
}

#[tokio::test]
async fn connection_receives_initial_state() {
    let addr = start_server().await;
    let mut ws = connect(addr).await;

    let msg = next_json(&mut ws).await;
    assert_eq!(msg["type"], "RoundEngine");
    assert_eq!(msg["payload"]["type"], "StateUpdated");
    let snapshot = &msg["payload"]["payload"]["state"];
    assert_eq!(snapshot["can_roll"], true);
    assert_eq!(snapshot["state"]["threshold_input"], "50");
    assert_eq!(snapshot["state"]["condition"], "more");
    assert_eq!(snapshot["state"]["history"], json!([]));
}

#[tokio::test]
async fn invalid_threshold_is_reported_to_the_sender() {
    let addr = start_server().await;
    let mut ws = connect(addr).await;
    next_json(&mut ws).await;

    send_json(&mut ws, start_round("0", "more")).await;
    let msg = next_json(&mut ws).await;
    assert_eq!(msg["type"], "Error");
    let message = msg["payload"]["message"].as_str().unwrap();
    assert!(message.contains("1 to 100"), "{message}");
}

#[tokio::test]
async fn round_is_played_over_the_socket() {
    let addr = start_server().await;
    let mut ws = connect(addr).await;
    next_json(&mut ws).await;

    send_json(&mut ws, start_round("50", "less")).await;

    let record = loop {
        let msg = next_json(&mut ws).await;
        assert_eq!(msg["type"], "RoundEngine", "{msg}");
        if msg["payload"]["type"] == "RoundResolved" {
            break msg["payload"]["payload"]["record"].clone();
        }
    };
    let roll = record["roll"].as_u64().unwrap();
    assert!((1..=100).contains(&roll));
    assert_eq!(record["threshold"], 50);
    assert_eq!(record["condition"], "less");
    assert_eq!(record["won"], roll < 50);
}

#[tokio::test]
async fn malformed_messages_keep_the_socket_open() {
    let addr = start_server().await;
    let mut ws = connect(addr).await;
    next_json(&mut ws).await;

    ws.send(Message::text("not json")).await.unwrap();
    let msg = next_json(&mut ws).await;
    assert_eq!(msg["type"], "Error");

    send_json(&mut ws, send_state()).await;
    let msg = next_json(&mut ws).await;
    assert_eq!(msg["payload"]["type"], "StateUpdated");
}

#[tokio::test]
async fn rounds_are_broadcast_to_every_connection() {
    let addr = start_server().await;
    let mut player = connect(addr).await;
    let mut watcher = connect(addr).await;
    next_json(&mut player).await;
    next_json(&mut watcher).await;

    send_json(&mut player, start_round("10", "more")).await;

    loop {
        let msg = next_json(&mut watcher).await;
        if msg["payload"]["type"] == "RoundResolved" {
            assert_eq!(msg["payload"]["payload"]["record"]["threshold"], 10);
            break;
        }
    }
}

#[tokio::test]
async fn state_requests_during_a_roll_never_end_on_a_stale_snapshot() {
    let addr = start_server().await;
    let mut ws = connect(addr).await;
    next_json(&mut ws).await;

    send_json(&mut ws, start_round("50", "more")).await;
    // Keep asking for state across the 20ms roll so replies race the resolution.
    for _ in 0..10 {
        send_json(&mut ws, send_state()).await;
        tokio::time::sleep(Duration::from_millis(4)).await;
    }

    let mut resolved = false;
    let mut revisions = Vec::new();
    let mut last_snapshot = None;
    while let Some(msg) = try_next_json(&mut ws, Duration::from_millis(300)).await {
        match msg["payload"]["type"].as_str() {
            Some("RoundResolved") => resolved = true,
            Some("StateUpdated") => {
                let snapshot = msg["payload"]["payload"]["state"].clone();
                revisions.push(snapshot["revision"].as_u64().unwrap());
                last_snapshot = Some(snapshot);
            }
            _ => panic!("unexpected message {msg}"),
        }
    }

    assert!(resolved);
    assert!(revisions.windows(2).all(|w| w[0] <= w[1]), "{revisions:?}");
    let last = last_snapshot.unwrap();
    assert_eq!(last["state"]["phase"]["type"], "Idle");
    assert_eq!(last["can_roll"], true);
}

#[tokio::test]
async fn ignored_threshold_edit_returns_the_kept_value() {
    let addr = start_server().await;
    let mut ws = connect(addr).await;
    next_json(&mut ws).await;

    send_json(
        &mut ws,
        json!({
            "type": "RoundEngine",
            "payload": { "type": "SetThreshold", "payload": { "input": "250" } }
        }),
    )
    .await;

    let msg = next_json(&mut ws).await;
    assert_eq!(msg["payload"]["type"], "StateUpdated");
    let snapshot = &msg["payload"]["payload"]["state"];
    assert_eq!(snapshot["state"]["threshold_input"], "50");
    assert_eq!(snapshot["can_roll"], true);
}
