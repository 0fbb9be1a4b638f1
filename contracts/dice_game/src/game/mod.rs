use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod dice;
pub mod history;
pub mod utils;

use history::HistoryLog;

pub const MIN_THRESHOLD: u8 = 1;
pub const MAX_THRESHOLD: u8 = 100;
pub const DEFAULT_THRESHOLD: &str = "50";

#[derive(Default, Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Condition {
    #[default]
    #[serde(rename = "more")]
    GreaterThan,
    #[serde(rename = "less")]
    LessThan,
}

impl Condition {
    /// Equality never wins.
    pub fn is_won(self, threshold: u8, roll: u8) -> bool {
        match self {
            Condition::GreaterThan => roll > threshold,
            Condition::LessThan => roll < threshold,
        }
    }

    pub fn toggled(self) -> Self {
        match self {
            Condition::GreaterThan => Condition::LessThan,
            Condition::LessThan => Condition::GreaterThan,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundRecord {
    pub id: u64,
    pub threshold: u8,
    pub condition: Condition,
    pub roll: u8,
    pub won: bool,
    pub occurred_at: u64,
}

impl RoundRecord {
    pub fn new(id: u64, threshold: u8, condition: Condition, roll: u8, occurred_at: u64) -> Self {
        Self {
            id,
            threshold,
            condition,
            roll,
            won: condition.is_won(threshold, roll),
            occurred_at,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("threshold is required")]
    Empty,
    #[error("threshold {0:?} is not a whole number")]
    NotANumber(String),
    #[error("threshold {0} is outside 1..=100")]
    OutOfRange(i64),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RoundError {
    #[error("Please enter a number from 1 to 100: {0}")]
    Validation(#[from] ValidationError),
    #[error("A round is already rolling")]
    RoundInProgress,
    #[error("No round is rolling")]
    NoRoundInProgress,
    #[error("Roll {0} is outside 1..=100")]
    RollOutOfRange(u8),
}

pub fn parse_threshold(input: &str) -> Result<u8, ValidationError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::Empty);
    }
    let value: i64 = trimmed
        .parse()
        .map_err(|_| ValidationError::NotANumber(trimmed.to_string()))?;
    if !(MIN_THRESHOLD as i64..=MAX_THRESHOLD as i64).contains(&value) {
        return Err(ValidationError::OutOfRange(value));
    }
    Ok(value as u8)
}

#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum RoundPhase {
    #[default]
    Idle,
    /// Threshold and condition are frozen at start time.
    Rolling { threshold: u8, condition: Condition },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum GameAction {
    SetThreshold { input: String },
    SetCondition { condition: Condition },
    StartRound { threshold: String, condition: Condition },
    ResolveRound { roll: u8, timestamp: u64 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum GameEvent {
    ThresholdChanged { input: String },
    ConditionChanged { condition: Condition },
    RoundStarted { threshold: u8, condition: Condition },
    RoundResolved { record: RoundRecord },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameState {
    pub threshold_input: String,
    pub condition: Condition,
    pub phase: RoundPhase,
    pub last_roll: Option<u8>,
    pub history: HistoryLog,
    #[serde(default, skip_serializing)]
    last_id: u64,
}

impl Default for GameState {
    fn default() -> Self {
        Self::new()
    }
}

impl GameState {
    pub fn new() -> Self {
        Self {
            threshold_input: DEFAULT_THRESHOLD.to_string(),
            condition: Condition::default(),
            phase: RoundPhase::Idle,
            last_roll: None,
            history: HistoryLog::new(),
            last_id: 0,
        }
    }

    pub fn is_rolling(&self) -> bool {
        matches!(self.phase, RoundPhase::Rolling { .. })
    }

    /// Whether the roll trigger should be enabled.
    pub fn can_roll(&self) -> bool {
        !self.is_rolling() && parse_threshold(&self.threshold_input).is_ok()
    }

    /// The record created by the most recent round, if any.
    pub fn latest(&self) -> Option<&RoundRecord> {
        self.history.latest()
    }

    pub fn process_action(&mut self, action: GameAction) -> Result<Vec<GameEvent>, RoundError> {
        let mut events = Vec::new();

        match (self.phase.clone(), action) {
            (RoundPhase::Rolling { .. }, GameAction::SetThreshold { .. })
            | (RoundPhase::Rolling { .. }, GameAction::SetCondition { .. })
            | (RoundPhase::Rolling { .. }, GameAction::StartRound { .. }) => {
                return Err(RoundError::RoundInProgress);
            }

            (RoundPhase::Idle, GameAction::SetThreshold { input }) => {
                // Mirrors the input field: only empty or in-range values stick.
                if input.is_empty() || parse_threshold(&input).is_ok() {
                    self.threshold_input = input.clone();
                    events.push(GameEvent::ThresholdChanged { input });
                }
            }

            (RoundPhase::Idle, GameAction::SetCondition { condition }) => {
                self.condition = condition;
                events.push(GameEvent::ConditionChanged { condition });
            }

            (RoundPhase::Idle, GameAction::StartRound { threshold, condition }) => {
                let value = parse_threshold(&threshold)?;
                self.threshold_input = threshold;
                self.condition = condition;
                self.phase = RoundPhase::Rolling {
                    threshold: value,
                    condition,
                };
                events.push(GameEvent::RoundStarted {
                    threshold: value,
                    condition,
                });
            }

            (RoundPhase::Idle, GameAction::ResolveRound { .. }) => {
                return Err(RoundError::NoRoundInProgress);
            }

            (
                RoundPhase::Rolling {
                    threshold,
                    condition,
                },
                GameAction::ResolveRound { roll, timestamp },
            ) => {
                if !(dice::MIN_ROLL..=dice::MAX_ROLL).contains(&roll) {
                    return Err(RoundError::RollOutOfRange(roll));
                }
                let id = self.next_id(timestamp);
                let record = RoundRecord::new(id, threshold, condition, roll, timestamp);
                self.history.push(record.clone());
                self.last_roll = Some(roll);
                self.phase = RoundPhase::Idle;
                events.push(GameEvent::RoundResolved { record });
            }
        }

        Ok(events)
    }

    pub fn set_threshold(&mut self, input: impl Into<String>) -> Result<bool, RoundError> {
        let events = self.process_action(GameAction::SetThreshold {
            input: input.into(),
        })?;
        Ok(!events.is_empty())
    }

    pub fn set_condition(&mut self, condition: Condition) -> Result<(), RoundError> {
        self.process_action(GameAction::SetCondition { condition })?;
        Ok(())
    }

    pub fn start_round(
        &mut self,
        threshold: impl Into<String>,
        condition: Condition,
    ) -> Result<Vec<GameEvent>, RoundError> {
        self.process_action(GameAction::StartRound {
            threshold: threshold.into(),
            condition,
        })
    }

    pub fn resolve_round(&mut self, roll: u8, timestamp: u64) -> Result<RoundRecord, RoundError> {
        let events = self.process_action(GameAction::ResolveRound { roll, timestamp })?;
        match events.into_iter().next() {
            Some(GameEvent::RoundResolved { record }) => Ok(record),
            _ => Err(RoundError::NoRoundInProgress),
        }
    }

    // Timestamps make good ids, but two rounds can land on the same millisecond.
    fn next_id(&mut self, timestamp: u64) -> u64 {
        let id = timestamp.max(self.last_id.saturating_add(1));
        self.last_id = id;
        id
    }
}
