use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Upper-section bonus granted when the upper subtotal reaches the threshold.
pub const UPPER_BONUS_THRESHOLD: u32 = 63;
pub const UPPER_BONUS_POINTS: u32 = 35;
/// Points for each five-of-a-kind rolled after the box already holds 50.
pub const EXTRA_FIVE_KIND_POINTS: u32 = 100;
/// A finished scorecard has exactly this many scored categories.
pub const CATEGORY_COUNT: usize = 13;

/// The 13 scorecard categories.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Ones,
    Twos,
    Threes,
    Fours,
    Fives,
    Sixes,
    ThreeOfAKind,
    FourOfAKind,
    FullHouse,
    SmallStraight,
    LargeStraight,
    FiveOfAKind,
    Chance,
}

impl Category {
    pub const ALL: [Category; CATEGORY_COUNT] = [
        Category::Ones,
        Category::Twos,
        Category::Threes,
        Category::Fours,
        Category::Fives,
        Category::Sixes,
        Category::ThreeOfAKind,
        Category::FourOfAKind,
        Category::FullHouse,
        Category::SmallStraight,
        Category::LargeStraight,
        Category::FiveOfAKind,
        Category::Chance,
    ];

    /// Face value for upper-section categories, None for the lower section.
    pub fn upper_face(self) -> Option<u8> {
        match self {
            Category::Ones => Some(1),
            Category::Twos => Some(2),
            Category::Threes => Some(3),
            Category::Fours => Some(4),
            Category::Fives => Some(5),
            Category::Sixes => Some(6),
            _ => None,
        }
    }
}

fn face_counts(dice: [u8; 5]) -> [u8; 7] {
    let mut counts = [0u8; 7];
    for die in dice {
        if (1..=6).contains(&die) {
            counts[die as usize] += 1;
        }
    }
    counts
}

fn dice_sum(dice: [u8; 5]) -> u32 {
    dice.iter().map(|&d| u32::from(d)).sum()
}

/// Longest run of consecutive faces present at least once.
fn longest_straight(counts: &[u8; 7]) -> u8 {
    let mut best = 0u8;
    let mut run = 0u8;
    for face in 1..=6 {
        if counts[face] > 0 {
            run += 1;
            best = best.max(run);
        } else {
            run = 0;
        }
    }
    best
}

/// Score a set of five dice into a category. Pure function.
pub fn score_roll(category: Category, dice: [u8; 5]) -> u32 {
    let counts = face_counts(dice);

    if let Some(face) = category.upper_face() {
        return u32::from(counts[face as usize]) * u32::from(face);
    }

    match category {
        Category::ThreeOfAKind => {
            if counts.iter().any(|&c| c >= 3) {
                dice_sum(dice)
            } else {
                0
            }
        }
        Category::FourOfAKind => {
            if counts.iter().any(|&c| c >= 4) {
                dice_sum(dice)
            } else {
                0
            }
        }
        Category::FullHouse => {
            let has_three = counts.iter().any(|&c| c == 3);
            let has_pair = counts.iter().any(|&c| c == 2);
            if has_three && has_pair {
                25
            } else {
                0
            }
        }
        Category::SmallStraight => {
            if longest_straight(&counts) >= 4 {
                30
            } else {
                0
            }
        }
        Category::LargeStraight => {
            if longest_straight(&counts) >= 5 {
                40
            } else {
                0
            }
        }
        Category::FiveOfAKind => {
            if counts.iter().any(|&c| c == 5) {
                50
            } else {
                0
            }
        }
        Category::Chance => dice_sum(dice),
        // Upper categories are handled above
        _ => 0,
    }
}

/// True when all five dice show the same face.
pub fn is_five_of_a_kind(dice: [u8; 5]) -> bool {
    dice[0] != 0 && dice.iter().all(|&d| d == dice[0])
}

/// One player's scorecard: category slots plus derived totals.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Scorecard {
    /// Scored categories; a category is scored at most once
    #[serde(default)]
    slots: BTreeMap<Category, u32>,
    /// Extra five-of-a-kinds rolled after the box already held 50
    #[serde(default)]
    bonus_fives: u32,
}

impl Scorecard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_scored(&self, category: Category) -> bool {
        self.slots.contains_key(&category)
    }

    pub fn get(&self, category: Category) -> Option<u32> {
        self.slots.get(&category).copied()
    }

    /// Record points for a category. Returns false if the slot is filled.
    pub fn record(&mut self, category: Category, points: u32) -> bool {
        if self.is_scored(category) {
            return false;
        }
        self.slots.insert(category, points);
        true
    }

    /// Grant an extra five-of-a-kind bonus when the dice qualify and the
    /// five-of-a-kind box already holds 50.
    pub fn maybe_grant_five_bonus(&mut self, dice: [u8; 5]) -> bool {
        if is_five_of_a_kind(dice) && self.get(Category::FiveOfAKind) == Some(50) {
            self.bonus_fives += 1;
            return true;
        }
        false
    }

    pub fn scored_count(&self) -> usize {
        self.slots.len()
    }

    pub fn is_complete(&self) -> bool {
        self.slots.len() == CATEGORY_COUNT
    }

    pub fn open_categories(&self) -> impl Iterator<Item = Category> + '_ {
        Category::ALL.into_iter().filter(|c| !self.is_scored(*c))
    }

    pub fn upper_subtotal(&self) -> u32 {
        self.slots
            .iter()
            .filter(|(c, _)| c.upper_face().is_some())
            .map(|(_, &p)| p)
            .sum()
    }

    pub fn upper_bonus(&self) -> u32 {
        if self.upper_subtotal() >= UPPER_BONUS_THRESHOLD {
            UPPER_BONUS_POINTS
        } else {
            0
        }
    }

    pub fn five_kind_bonus(&self) -> u32 {
        self.bonus_fives * EXTRA_FIVE_KIND_POINTS
    }

    pub fn grand_total(&self) -> u32 {
        let slot_sum: u32 = self.slots.values().sum();
        slot_sum + self.upper_bonus() + self.five_kind_bonus()
    }

    pub fn view(&self) -> ScorecardView {
        ScorecardView {
            categories: self.slots.clone(),
            upper_subtotal: self.upper_subtotal(),
            upper_bonus: self.upper_bonus(),
            five_kind_bonus: self.five_kind_bonus(),
            total: self.grand_total(),
            complete: self.is_complete(),
        }
    }
}

/// Wire view of a scorecard with derived totals.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ScorecardView {
    pub categories: BTreeMap<Category, u32>,
    pub upper_subtotal: u32,
    pub upper_bonus: u32,
    pub five_kind_bonus: u32,
    pub total: u32,
    pub complete: bool,
}
