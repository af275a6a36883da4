use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use super::scoring::{score_roll, Category, Scorecard};
use crate::protocol::UserId;

/// Rolls allowed per turn.
pub const MAX_ROLLS_PER_TURN: u8 = 3;

/// Errors from game commands. Each maps to a client-facing error code in the
/// session layer; none of them mutate state.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GameError {
    #[error("it is not this player's turn")]
    NotYourTurn,
    #[error("all {MAX_ROLLS_PER_TURN} rolls for this turn have been used")]
    RollLimit,
    #[error("cannot score before the first roll of the turn")]
    NoRollYet,
    #[error("category has already been scored")]
    CategoryUnavailable,
    #[error("player has no scorecard in this game")]
    UnknownPlayer,
    #[error("the game is already complete")]
    GameComplete,
}

/// Dice source. Production rolls through fastrand; tests script the faces.
pub trait DiceRoller: Send + Sync {
    fn roll_die(&self) -> u8;
}

/// Production roller backed by fastrand's thread-local generator.
#[derive(Debug, Default, Clone, Copy)]
pub struct FastrandRoller;

impl DiceRoller for FastrandRoller {
    fn roll_die(&self) -> u8 {
        fastrand::u8(1..=6)
    }
}

/// One recorded roll, kept as the per-game audit log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RollLogEntry {
    pub user_id: UserId,
    pub roll_number: u8,
    pub dice: [u8; 5],
}

/// Result of a successful DICE_ROLL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RollResult {
    pub dice: [u8; 5],
    pub kept: [bool; 5],
    pub roll_number: u8,
}

/// Result of a successful CATEGORY_SCORE.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoreResult {
    pub points: u32,
    pub earned_five_bonus: bool,
    /// Set when every scorecard is complete; no further turns happen
    pub game_complete: bool,
    /// The player whose turn starts next (None when the game completed)
    pub next_player: Option<UserId>,
    pub next_turn_index: usize,
}

/// Authoritative in-game state, persisted under the `game` storage key.
///
/// Present iff the room status is playing, paused or completed. The turn
/// sub-machine is: awaiting roll (roll_number = 0) -> awaiting keep-or-score
/// (1..=3), reset on every score.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameState {
    /// Seat order snapshot taken at game start
    pub turn_order: Vec<UserId>,
    pub turn_index: usize,
    pub roll_number: u8,
    pub dice: [u8; 5],
    pub kept: [bool; 5],
    pub scorecards: BTreeMap<UserId, Scorecard>,
    pub turn_started_at: DateTime<Utc>,
    #[serde(default)]
    pub roll_log: Vec<RollLogEntry>,
}

impl GameState {
    pub fn new(turn_order: Vec<UserId>, now: DateTime<Utc>) -> Self {
        let scorecards = turn_order.iter().map(|&id| (id, Scorecard::new())).collect();
        Self {
            turn_order,
            turn_index: 0,
            roll_number: 0,
            dice: [0; 5],
            kept: [false; 5],
            scorecards,
            turn_started_at: now,
            roll_log: Vec::new(),
        }
    }

    pub fn current_player(&self) -> Option<UserId> {
        self.turn_order.get(self.turn_index).copied()
    }

    pub fn is_complete(&self) -> bool {
        !self.scorecards.is_empty() && self.scorecards.values().all(Scorecard::is_complete)
    }

    pub fn scorecard(&self, user_id: UserId) -> Option<&Scorecard> {
        self.scorecards.get(&user_id)
    }

    /// Roll the non-kept dice. The kept mask is ignored on the first roll of
    /// a turn (there is nothing to keep yet); afterwards, kept dice never
    /// change value within the turn.
    pub fn roll(
        &mut self,
        user_id: UserId,
        kept: [bool; 5],
        roller: &dyn DiceRoller,
    ) -> Result<RollResult, GameError> {
        self.ensure_current(user_id)?;
        if self.roll_number >= MAX_ROLLS_PER_TURN {
            return Err(GameError::RollLimit);
        }

        let kept = if self.roll_number == 0 { [false; 5] } else { kept };
        for (i, die) in self.dice.iter_mut().enumerate() {
            if !kept[i] {
                *die = roller.roll_die();
            }
        }
        self.kept = kept;
        self.roll_number += 1;
        self.roll_log.push(RollLogEntry {
            user_id,
            roll_number: self.roll_number,
            dice: self.dice,
        });

        Ok(RollResult {
            dice: self.dice,
            kept: self.kept,
            roll_number: self.roll_number,
        })
    }

    /// Score the current dice into `category`, then advance the turn.
    pub fn score(
        &mut self,
        user_id: UserId,
        category: Category,
        now: DateTime<Utc>,
    ) -> Result<ScoreResult, GameError> {
        self.ensure_current(user_id)?;
        if self.roll_number == 0 {
            return Err(GameError::NoRollYet);
        }

        let card = self.scorecards.get_mut(&user_id).ok_or(GameError::UnknownPlayer)?;
        if card.is_scored(category) {
            return Err(GameError::CategoryUnavailable);
        }

        let earned_five_bonus = card.maybe_grant_five_bonus(self.dice);
        let points = score_roll(category, self.dice);
        card.record(category, points);

        let game_complete = self.is_complete();
        let (next_player, next_turn_index) = if game_complete {
            (None, self.turn_index)
        } else {
            let next = (self.turn_index + 1) % self.turn_order.len();
            (self.turn_order.get(next).copied(), next)
        };

        self.turn_index = next_turn_index;
        self.roll_number = 0;
        self.dice = [0; 5];
        self.kept = [false; 5];
        self.turn_started_at = now;

        Ok(ScoreResult {
            points,
            earned_five_bonus,
            game_complete,
            next_player,
            next_turn_index,
        })
    }

    /// Remove a player whose seat was released mid-game.
    ///
    /// Their scorecard and turn slot disappear; if they were the current
    /// player the turn passes to the next seat in order. Returns the player
    /// whose turn it now is (None when no players remain or the game just
    /// became complete).
    pub fn remove_player(&mut self, user_id: UserId, now: DateTime<Utc>) -> Option<UserId> {
        let Some(pos) = self.turn_order.iter().position(|&id| id == user_id) else {
            return self.current_player();
        };

        let was_current = pos == self.turn_index;
        self.turn_order.remove(pos);
        self.scorecards.remove(&user_id);

        if self.turn_order.is_empty() {
            self.turn_index = 0;
            return None;
        }

        if pos < self.turn_index {
            self.turn_index -= 1;
        } else if was_current {
            self.turn_index %= self.turn_order.len();
            self.roll_number = 0;
            self.dice = [0; 5];
            self.kept = [false; 5];
            self.turn_started_at = now;
        }

        self.current_player()
    }

    /// Per-player grand totals, highest first.
    pub fn standings(&self) -> Vec<(UserId, u32)> {
        let mut totals: Vec<(UserId, u32)> = self
            .scorecards
            .iter()
            .map(|(&id, card)| (id, card.grand_total()))
            .collect();
        totals.sort_by(|a, b| b.1.cmp(&a.1));
        totals
    }

    fn ensure_current(&self, user_id: UserId) -> Result<(), GameError> {
        if self.is_complete() {
            return Err(GameError::GameComplete);
        }
        if self.current_player() != Some(user_id) {
            return Err(GameError::NotYourTurn);
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::DiceRoller;
    use std::sync::Mutex;

    /// Scripted roller: pops faces front-to-back, then repeats the last face.
    pub struct ScriptedRoller {
        faces: Mutex<Vec<u8>>,
    }

    impl ScriptedRoller {
        pub fn new(faces: &[u8]) -> Self {
            let mut reversed: Vec<u8> = faces.to_vec();
            reversed.reverse();
            Self {
                faces: Mutex::new(reversed),
            }
        }
    }

    impl DiceRoller for ScriptedRoller {
        fn roll_die(&self) -> u8 {
            let mut faces = self.faces.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            match faces.len() {
                0 => 1,
                1 => faces[0],
                _ => faces.pop().unwrap_or(1),
            }
        }
    }
}
