use std::fmt;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MinigameKind {
    Karate,
    SliceEmAll,
    SimonSays,
}

impl MinigameKind {
    pub const ALL: [MinigameKind; 3] = [
        MinigameKind::SliceEmAll,
        MinigameKind::Karate,
        MinigameKind::SimonSays,
    ];

    pub fn scene_name(self) -> &'static str {
        match self {
            MinigameKind::Karate => "Karate",
            MinigameKind::SliceEmAll => "SliceEmAll",
            MinigameKind::SimonSays => "SimonSays",
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            MinigameKind::Karate => "Karate",
            MinigameKind::SliceEmAll => "Slice 'Em All",
            MinigameKind::SimonSays => "Simon Says",
        }
    }
}

impl fmt::Display for MinigameKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.scene_name())
    }
}

/// Picks which minigame the next round plays.
///
/// `peek_next` must be stable until the following `take_next`, so the round
/// intro can announce the same minigame that is then loaded.
pub trait RoundSelector {
    fn peek_next(&mut self) -> MinigameKind;
    fn take_next(&mut self) -> MinigameKind;
}

/// Walks a shuffled catalog and reshuffles once it runs dry.
#[derive(Debug)]
pub struct ShuffleBag {
    order: Vec<MinigameKind>,
    cursor: usize,
    rng: StdRng,
}

impl ShuffleBag {
    /// An empty catalog falls back to every known minigame.
    pub fn new(catalog: &[MinigameKind]) -> Self {
        Self::with_rng(catalog, StdRng::from_os_rng())
    }

    pub fn seeded(catalog: &[MinigameKind], seed: u64) -> Self {
        Self::with_rng(catalog, StdRng::seed_from_u64(seed))
    }

    fn with_rng(catalog: &[MinigameKind], rng: StdRng) -> Self {
        let order = if catalog.is_empty() {
            MinigameKind::ALL.to_vec()
        } else {
            catalog.to_vec()
        };
        let mut bag = Self {
            order,
            cursor: 0,
            rng,
        };
        bag.reshuffle();
        bag
    }

    fn reshuffle(&mut self) {
        self.order.shuffle(&mut self.rng);
        self.cursor = 0;
        debug!(order = ?self.order, "round_order_shuffled");
    }

    fn refill_if_exhausted(&mut self) {
        if self.cursor >= self.order.len() {
            self.reshuffle();
        }
    }
}

impl RoundSelector for ShuffleBag {
    fn peek_next(&mut self) -> MinigameKind {
        self.refill_if_exhausted();
        self.order[self.cursor]
    }

    fn take_next(&mut self) -> MinigameKind {
        self.refill_if_exhausted();
        let next = self.order[self.cursor];
        self.cursor += 1;
        next
    }
}

/// Deterministic in-order rotation used when no selector is installed.
#[derive(Debug, Clone)]
pub struct FallbackRotation {
    order: Vec<MinigameKind>,
    cursor: usize,
}

impl FallbackRotation {
    pub fn new(catalog: &[MinigameKind]) -> Self {
        let order = if catalog.is_empty() {
            MinigameKind::ALL.to_vec()
        } else {
            catalog.to_vec()
        };
        Self { order, cursor: 0 }
    }
}

impl RoundSelector for FallbackRotation {
    fn peek_next(&mut self) -> MinigameKind {
        self.order[self.cursor % self.order.len()]
    }

    fn take_next(&mut self) -> MinigameKind {
        let next = self.peek_next();
        self.cursor = (self.cursor + 1) % self.order.len();
        next
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn peek_is_stable_until_take() {
        let mut bag = ShuffleBag::seeded(&MinigameKind::ALL, 7);
        let first = bag.peek_next();
        assert_eq!(bag.peek_next(), first);
        assert_eq!(bag.take_next(), first);
    }

    #[test]
    fn each_pass_plays_every_minigame_once() {
        let mut bag = ShuffleBag::seeded(&MinigameKind::ALL, 99);
        for _ in 0..4 {
            let pass: HashSet<_> = (0..3).map(|_| bag.take_next()).collect();
            assert_eq!(pass.len(), 3);
        }
    }

    #[test]
    fn same_seed_gives_same_order() {
        let mut a = ShuffleBag::seeded(&MinigameKind::ALL, 1234);
        let mut b = ShuffleBag::seeded(&MinigameKind::ALL, 1234);
        let a_order: Vec<_> = (0..9).map(|_| a.take_next()).collect();
        let b_order: Vec<_> = (0..9).map(|_| b.take_next()).collect();
        assert_eq!(a_order, b_order);
    }

    #[test]
    fn empty_catalog_uses_all_minigames() {
        let mut bag = ShuffleBag::seeded(&[], 3);
        let pass: HashSet<_> = (0..3).map(|_| bag.take_next()).collect();
        assert_eq!(pass.len(), 3);
    }

    #[test]
    fn fallback_rotation_cycles_in_order() {
        let mut rotation = FallbackRotation::new(&[MinigameKind::Karate, MinigameKind::SimonSays]);
        assert_eq!(rotation.peek_next(), MinigameKind::Karate);
        assert_eq!(rotation.take_next(), MinigameKind::Karate);
        assert_eq!(rotation.take_next(), MinigameKind::SimonSays);
        assert_eq!(rotation.take_next(), MinigameKind::Karate);
    }
}
