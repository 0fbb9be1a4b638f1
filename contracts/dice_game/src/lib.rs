//! Round engine for the dice game: pick a threshold and a condition, roll
//! 1..=100, keep the last ten outcomes.
//!
//! Everything here is synchronous and free of I/O. Pacing and randomness
//! timing live in the service crate, which feeds resolved rolls back through
//! [`GameState::process_action`].

pub mod game;

pub use game::{
    dice::Dice, history::HistoryLog, parse_threshold, Condition, GameAction, GameEvent, GameState,
    RoundError, RoundPhase, RoundRecord, ValidationError,
};
