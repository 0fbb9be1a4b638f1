use anyhow::{Context as _, Result};
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use futures::{sink::SinkExt, stream::StreamExt};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{broadcast::error::RecvError, mpsc};
use tower_http::cors::CorsLayer;
use tracing::{debug, error, info, warn};

use crate::{
    round_engine::{EngineError, RoundCommand, RoundEngineHandle, RoundEvent},
    Context, InboundWebsocketMessage, OutboundWebsocketMessage,
};

#[derive(Error, Debug)]
pub enum WebSocketError {
    #[error("Failed to reach the round engine: {0}")]
    EngineError(String),
    #[error("Failed to send message through websocket: {0}")]
    WebSocketSendError(String),
    #[error("Invalid message format: {0}")]
    InvalidMessageFormat(String),
    #[error("Server error: {0}")]
    ServerError(String),
}

/// HTTP front of the game: a websocket for play, plus health, state and
/// metrics endpoints.
pub struct WebSocketModule {
    address: String,
    app: Option<Router>,
}

impl WebSocketModule {
    pub fn build(ctx: Arc<Context>) -> Self {
        Self {
            address: ctx.config.server_address.clone(),
            app: Some(router(ctx)),
        }
    }

    pub async fn run(&mut self) -> Result<()> {
        let listener = tokio::net::TcpListener::bind(&self.address)
            .await
            .map_err(|e| WebSocketError::ServerError(format!("Failed to bind to port: {}", e)))?;

        info!("WebSocket server listening on http://{}", self.address);

        let app = self
            .app
            .take()
            .ok_or_else(|| WebSocketError::ServerError("Router was already taken".to_string()))?;

        axum::serve(listener, app)
            .await
            .context("serving websocket router")?;
        Ok(())
    }
}

pub fn router(ctx: Arc<Context>) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/ws_health", get(health_check))
        .route("/api/state", get(state_handler))
        .route("/metrics", get(metrics_handler))
        .layer(CorsLayer::permissive())
        .with_state(ctx)
}

async fn ws_handler(ws: WebSocketUpgrade, State(ctx): State<Arc<Context>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, ctx.engine.clone()))
}

async fn handle_socket(socket: WebSocket, engine: RoundEngineHandle) {
    let (mut sender, mut receiver) = socket.split();

    let id = uuid::Uuid::new_v4();
    info!("WebSocket connection established {}", id);

    // Subscribe before asking for the snapshot so no update falls in between.
    let mut events = engine.subscribe();
    let (direct_tx, mut direct_rx) = mpsc::unbounded_channel::<OutboundWebsocketMessage>();

    match engine.snapshot().await {
        Ok(state) => {
            let _ = direct_tx.send(OutboundWebsocketMessage::RoundEngine(
                RoundEvent::StateUpdated {
                    state,
                    events: vec![],
                },
            ));
        }
        Err(e) => {
            error!("Failed to fetch initial state: {}", e);
            return;
        }
    }

    // Handle incoming messages from the WebSocket client
    let mut recv_task = tokio::spawn(async move {
        while let Some(msg) = receiver.next().await {
            match msg {
                Ok(Message::Text(text)) => {
                    debug!("Received message: {:?}", text);
                    if let Err(e) = handle_incoming_message(text.as_str(), &engine, &direct_tx).await
                    {
                        error!("Error handling incoming message: {}", e);
                        break;
                    }
                }
                Ok(Message::Close(_)) => {
                    debug!("Client initiated close");
                    break;
                }
                Err(e) => {
                    error!("WebSocket receive error: {}", e);
                    break;
                }
                _ => {} // Ignore other message types
            }
        }
        debug!("Receiver task {} shutting down", id);
    });

    let mut send_task = tokio::spawn(async move {
        let mut gate = SnapshotGate::default();
        loop {
            let msg = tokio::select! {
                biased;
                Some(msg) = direct_rx.recv() => msg,
                event = events.recv() => match event {
                    Ok(event) => OutboundWebsocketMessage::RoundEngine(event),
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("Connection {} lagged, skipped {} events", id, skipped);
                        continue;
                    }
                    Err(RecvError::Closed) => break,
                },
            };
            if !gate.admit(&msg) {
                debug!("Dropping stale snapshot for connection {}", id);
                continue;
            }
            if let Err(e) = send_ws_message(&mut sender, &msg).await {
                error!("Error sending round engine message: {}", e);
                break;
            }
        }
        debug!("Sender task {} shutting down", id);
        let _ = sender.send(Message::Close(None)).await;
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }
    info!("WebSocket connection closed {}", id);
}

async fn handle_incoming_message(
    text: &str,
    engine: &RoundEngineHandle,
    direct: &mpsc::UnboundedSender<OutboundWebsocketMessage>,
) -> Result<(), WebSocketError> {
    let ws_msg = serde_json::from_str::<InboundWebsocketMessage>(text);
    let command = match ws_msg {
        Ok(InboundWebsocketMessage::RoundEngine(command)) => command,
        Err(e) => {
            // A malformed message is the client's problem, keep the socket open.
            warn!("Failed to parse message: {}", e);
            let _ = direct.send(OutboundWebsocketMessage::Error {
                message: WebSocketError::InvalidMessageFormat(e.to_string()).to_string(),
            });
            return Ok(());
        }
    };

    debug!("Received round command: {:?}", command);
    let wants_state = matches!(command, RoundCommand::SendState);
    let edit = match &command {
        RoundCommand::SetThreshold { input } => Some(input.clone()),
        _ => None,
    };
    match engine.send(command).await {
        Ok(state) => {
            // An ignored edit produces no broadcast, so only the sender learns the kept value.
            let edit_ignored = edit.is_some_and(|input| input != state.state.threshold_input);
            if wants_state || edit_ignored {
                let _ = direct.send(OutboundWebsocketMessage::RoundEngine(
                    RoundEvent::StateUpdated {
                        state,
                        events: vec![],
                    },
                ));
            }
        }
        Err(EngineError::Round(e)) => {
            let _ = direct.send(OutboundWebsocketMessage::Error {
                message: e.to_string(),
            });
        }
        Err(e @ EngineError::Stopped) => {
            return Err(WebSocketError::EngineError(e.to_string()));
        }
    }
    Ok(())
}

/// Tracks the newest snapshot revision a connection has sent, so a snapshot
/// reply that lost a race against a broadcast is never delivered after it.
#[derive(Default)]
struct SnapshotGate {
    sent: Option<u64>,
}

impl SnapshotGate {
    fn admit(&mut self, msg: &OutboundWebsocketMessage) -> bool {
        let OutboundWebsocketMessage::RoundEngine(RoundEvent::StateUpdated { state, .. }) = msg
        else {
            return true;
        };
        if self.sent.is_some_and(|sent| state.revision < sent) {
            return false;
        }
        self.sent = Some(state.revision);
        true
    }
}

async fn send_ws_message(
    sender: &mut futures::stream::SplitSink<WebSocket, Message>,
    msg: &OutboundWebsocketMessage,
) -> Result<(), WebSocketError> {
    let text = serde_json::to_string(msg)
        .map_err(|e| WebSocketError::InvalidMessageFormat(e.to_string()))?;
    sender
        .send(Message::Text(text.into()))
        .await
        .map_err(|e| WebSocketError::WebSocketSendError(e.to_string()))
}

async fn state_handler(State(ctx): State<Arc<Context>>) -> impl IntoResponse {
    match ctx.engine.snapshot().await {
        Ok(state) => Json(state).into_response(),
        Err(e) => (StatusCode::SERVICE_UNAVAILABLE, e.to_string()).into_response(),
    }
}

async fn metrics_handler(State(ctx): State<Arc<Context>>) -> impl IntoResponse {
    match crate::metrics::render(&ctx.registry) {
        Ok(text) => (StatusCode::OK, text).into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
