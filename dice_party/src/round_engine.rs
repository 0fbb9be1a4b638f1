use anyhow::Result;
use dice_game::{Condition, Dice, GameAction, GameEvent, GameState, RoundError, RoundRecord};
use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tokio::{
    sync::{broadcast, mpsc, oneshot},
    time::{self, Instant},
};
use tracing::{debug, info, warn};

use crate::{metrics::RoundMetrics, Conf};

const REQUEST_BUFFER: usize = 64;
const EVENT_BUFFER: usize = 256;

// Message types
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum RoundCommand {
    SetThreshold {
        input: String,
    },
    SetCondition {
        condition: Condition,
    },
    StartRound {
        threshold: String,
        condition: Condition,
    },
    SendState,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum RoundEvent {
    StateUpdated {
        state: GameSnapshot,
        events: Vec<GameEvent>,
    },
    RoundResolved {
        record: RoundRecord,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameSnapshot {
    /// Bumped by the engine on every state change. A higher revision is newer.
    pub revision: u64,
    pub state: GameState,
    pub can_roll: bool,
}

impl GameSnapshot {
    pub fn new(state: &GameState, revision: u64) -> Self {
        Self {
            revision,
            state: state.clone(),
            can_roll: state.can_roll(),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error(transparent)]
    Round(#[from] RoundError),
    #[error("Round engine has stopped")]
    Stopped,
}

struct RoundRequest {
    command: RoundCommand,
    reply: oneshot::Sender<Result<GameSnapshot, RoundError>>,
}

/// Client side of the engine. Cheap to clone, one per connection or front-end.
#[derive(Clone)]
pub struct RoundEngineHandle {
    requests: mpsc::Sender<RoundRequest>,
    events: broadcast::Sender<RoundEvent>,
}

impl RoundEngineHandle {
    pub async fn send(&self, command: RoundCommand) -> Result<GameSnapshot, EngineError> {
        let (reply, response) = oneshot::channel();
        self.requests
            .send(RoundRequest { command, reply })
            .await
            .map_err(|_| EngineError::Stopped)?;
        Ok(response.await.map_err(|_| EngineError::Stopped)??)
    }

    pub async fn set_threshold(&self, input: impl Into<String>) -> Result<GameSnapshot, EngineError> {
        self.send(RoundCommand::SetThreshold {
            input: input.into(),
        })
        .await
    }

    pub async fn set_condition(&self, condition: Condition) -> Result<GameSnapshot, EngineError> {
        self.send(RoundCommand::SetCondition { condition }).await
    }

    pub async fn start_round(
        &self,
        threshold: impl Into<String>,
        condition: Condition,
    ) -> Result<GameSnapshot, EngineError> {
        self.send(RoundCommand::StartRound {
            threshold: threshold.into(),
            condition,
        })
        .await
    }

    pub async fn snapshot(&self) -> Result<GameSnapshot, EngineError> {
        self.send(RoundCommand::SendState).await
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RoundEvent> {
        self.events.subscribe()
    }
}

/// Owns the session state and is the only place it gets mutated.
///
/// A started round arms a one-shot timer polled by the same loop that reads
/// commands, so the roll is drawn on this task once the pacing delay is over.
pub struct RoundEngineModule {
    requests: mpsc::Receiver<RoundRequest>,
    events: broadcast::Sender<RoundEvent>,
    state: GameState,
    revision: u64,
    dice: Dice,
    roll_delay: Duration,
    metrics: RoundMetrics,
}

impl RoundEngineModule {
    pub fn build(conf: &Conf) -> (Self, RoundEngineHandle) {
        let dice = match conf.dice_seed {
            Some(seed) => Dice::seeded(seed),
            None => Dice::default(),
        };
        Self::with_dice(dice, conf.roll_delay())
    }

    pub fn with_dice(dice: Dice, roll_delay: Duration) -> (Self, RoundEngineHandle) {
        let (request_tx, request_rx) = mpsc::channel(REQUEST_BUFFER);
        let (event_tx, _) = broadcast::channel(EVENT_BUFFER);

        let module = Self {
            requests: request_rx,
            events: event_tx.clone(),
            state: GameState::new(),
            revision: 0,
            dice,
            roll_delay,
            metrics: RoundMetrics::global(),
        };
        let handle = RoundEngineHandle {
            requests: request_tx,
            events: event_tx,
        };
        (module, handle)
    }

    /// Runs until every handle is dropped. A round in flight at that point
    /// still resolves before the loop exits.
    pub async fn run(mut self) -> Result<()> {
        info!("Round engine is running, roll delay {:?}", self.roll_delay);

        let roll_timer = time::sleep(Duration::ZERO);
        tokio::pin!(roll_timer);
        let mut armed = false;
        let mut closed = false;

        loop {
            tokio::select! {
                () = &mut roll_timer, if armed => {
                    armed = false;
                    self.handle_roll_elapsed()?;
                    if closed {
                        break;
                    }
                }
                request = self.requests.recv(), if !closed => {
                    let Some(RoundRequest { command, reply }) = request else {
                        closed = true;
                        if armed {
                            debug!("All handles dropped, waiting for the rolling round");
                            continue;
                        }
                        break;
                    };
                    let result = self.handle_command(command);
                    if self.state.is_rolling() && !armed {
                        roll_timer.as_mut().reset(Instant::now() + self.roll_delay);
                        armed = true;
                    }
                    // The caller may have gone away, nothing to do then.
                    let _ = reply.send(result);
                }
            }
        }

        info!("Round engine stopped");
        Ok(())
    }

    fn handle_command(&mut self, command: RoundCommand) -> Result<GameSnapshot, RoundError> {
        let action = match command {
            RoundCommand::SetThreshold { input } => GameAction::SetThreshold { input },
            RoundCommand::SetCondition { condition } => GameAction::SetCondition { condition },
            RoundCommand::StartRound {
                threshold,
                condition,
            } => GameAction::StartRound {
                threshold,
                condition,
            },
            RoundCommand::SendState => return Ok(self.snapshot()),
        };
        let is_start = matches!(action, GameAction::StartRound { .. });

        match self.state.process_action(action) {
            Ok(events) => {
                debug!("Applied command, got events: {:?}", events);
                if is_start {
                    if let Some(event) = events.first() {
                        info!("{}", event);
                    }
                }
                if !events.is_empty() {
                    self.revision += 1;
                    self.broadcast_state_update(events);
                }
                Ok(self.snapshot())
            }
            Err(err) => {
                if is_start {
                    self.metrics.record_rejected(&err);
                }
                warn!("Rejected command: {}", err);
                Err(err)
            }
        }
    }

    fn handle_roll_elapsed(&mut self) -> Result<()> {
        let roll = self.dice.roll();
        let record = self.state.resolve_round(roll, now_millis())?;
        self.revision += 1;
        info!("Round {} resolved: {}", record.id, record);

        self.metrics.record_resolved(&record);
        self.send_event(RoundEvent::RoundResolved {
            record: record.clone(),
        });
        self.broadcast_state_update(vec![GameEvent::RoundResolved { record }]);
        Ok(())
    }

    fn snapshot(&self) -> GameSnapshot {
        GameSnapshot::new(&self.state, self.revision)
    }

    // Helper methods
    fn broadcast_state_update(&self, events: Vec<GameEvent>) {
        self.send_event(RoundEvent::StateUpdated {
            state: self.snapshot(),
            events,
        });
    }

    fn send_event(&self, event: RoundEvent) {
        // No subscribers is fine, a front-end may not be attached yet.
        if self.events.send(event).is_err() {
            debug!("No subscriber for round event");
        }
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
