use std::sync::Arc;

use prometheus::Registry;
use round_engine::{RoundCommand, RoundEngineHandle, RoundEvent};
use serde::{Deserialize, Serialize};

pub mod conf;
pub mod logger;
pub mod metrics;
pub mod round_engine;
pub mod websocket;

pub use conf::Conf;

pub struct Context {
    pub config: Arc<Conf>,
    pub engine: RoundEngineHandle,
    pub registry: Registry,
}

/// Messages received from WebSocket clients that will be processed by the system
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum InboundWebsocketMessage {
    RoundEngine(RoundCommand),
}

/// Messages sent to WebSocket clients from the system
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum OutboundWebsocketMessage {
    RoundEngine(RoundEvent),
    /// Only sent to the connection whose command failed.
    Error { message: String },
}
