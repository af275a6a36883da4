use super::scoring::{score_roll, Category, Scorecard};
use super::state::MAX_ROLLS_PER_TURN;

/// Read-only view of the current turn handed to policy hooks.
#[derive(Debug, Clone, Copy)]
pub struct TurnView<'a> {
    pub dice: [u8; 5],
    pub roll_number: u8,
    pub scorecard: &'a Scorecard,
}

/// Decision hook for AI-occupied seats.
///
/// The session actor executes the decisions through the same validated
/// command path as human commands; the policy never touches state.
pub trait AiPolicy: Send + Sync {
    /// Which dice to keep for the next reroll; None means stop rolling.
    fn plan_keep(&self, view: TurnView<'_>) -> Option<[bool; 5]>;

    /// Category to score once rolling stops.
    fn choose_category(&self, view: TurnView<'_>) -> Category;
}

/// Decision hook consulted when a turn-timeout alarm fires.
pub trait TurnTimeoutPolicy: Send + Sync {
    fn resolve(&self, view: TurnView<'_>) -> TimeoutAction;
}

/// What to do with a timed-out turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutAction {
    /// Score the current dice into the category (usual case: worth zero)
    Score(Category),
}

fn best_open_category(view: TurnView<'_>) -> Category {
    view.scorecard
        .open_categories()
        .max_by_key(|&c| score_roll(c, view.dice))
        // A turn only exists while the scorecard has an open slot
        .unwrap_or(Category::Chance)
}

fn worst_open_category(view: TurnView<'_>) -> Category {
    view.scorecard
        .open_categories()
        .min_by_key(|&c| score_roll(c, view.dice))
        .unwrap_or(Category::Chance)
}

/// Baseline AI: keep the most frequent face, roll while rolls remain, then
/// score the highest-value open category.
#[derive(Debug, Default, Clone, Copy)]
pub struct GreedyPolicy;

impl AiPolicy for GreedyPolicy {
    fn plan_keep(&self, view: TurnView<'_>) -> Option<[bool; 5]> {
        if view.roll_number >= MAX_ROLLS_PER_TURN {
            return None;
        }
        if view.roll_number == 0 {
            return Some([false; 5]);
        }

        let mut counts = [0u8; 7];
        for die in view.dice {
            if (1..=6).contains(&die) {
                counts[die as usize] += 1;
            }
        }
        let best_face = (1..=6).max_by_key(|&f| counts[f as usize]).unwrap_or(6) as u8;

        let mut keep = [false; 5];
        for (i, &die) in view.dice.iter().enumerate() {
            keep[i] = die == best_face;
        }
        if keep.iter().all(|&k| k) {
            // Everything kept: rolling again changes nothing
            return None;
        }
        Some(keep)
    }

    fn choose_category(&self, view: TurnView<'_>) -> Category {
        best_open_category(view)
    }
}

/// Default turn-timeout resolution: burn the least valuable open category so
/// an absent player loses as little as possible while the game moves on.
#[derive(Debug, Default, Clone, Copy)]
pub struct ScoreLowestPolicy;

impl TurnTimeoutPolicy for ScoreLowestPolicy {
    fn resolve(&self, view: TurnView<'_>) -> TimeoutAction {
        TimeoutAction::Score(worst_open_category(view))
    }
}
