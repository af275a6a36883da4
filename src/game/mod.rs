//! Dice game rules.
//!
//! The scoring engine is pure (dice in, points out); the state machine
//! validates turn/roll/score commands and advances turn order. Policy hooks
//! (AI turns, turn-timeout resolution) are traits so the session actor
//! executes decisions without owning them.

pub mod policy;
pub mod scoring;
pub mod state;

pub use policy::{AiPolicy, GreedyPolicy, ScoreLowestPolicy, TimeoutAction, TurnTimeoutPolicy, TurnView};
pub use scoring::{score_roll, Category, Scorecard, ScorecardView};
pub use state::{DiceRoller, FastrandRoller, GameError, GameState, RollResult, ScoreResult};
