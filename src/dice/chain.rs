//! Roll Chains
//!
//! One logical throw and every exploding-dice generation that followed it.
//! Each original die owns a [`DieChain`]; rerolled faces are appended to the
//! die-chain they exploded from, oldest first.

use serde::{Serialize, Deserialize};

use crate::core::damage::DamageCode;
use crate::core::rng::DIE_FACES;
use super::registry::{DiceSetConfig, Role};

/// Stable identifier of a chain, assigned in creation order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ChainId(pub u64);

impl std::fmt::Display for ChainId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "chain-{}", self.0)
    }
}

/// Opaque roll identifier issued by the dice platform.
pub type RollId = String;

/// A single die face.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DieResult {
    /// Face value.
    pub value: u32,
    /// Highest face rolled.
    pub is_max: bool,
    /// Whether this face earned a reroll.
    pub explodes: bool,
}

/// Reroll lineage of one original die.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DieChain {
    /// Results, oldest first.
    pub results: Vec<DieResult>,
}

impl DieChain {
    /// Still waiting for a reroll.
    pub fn is_open(&self) -> bool {
        self.results.last().map(|r| r.explodes).unwrap_or(false)
    }

    /// Sum of all faces.
    pub fn sum(&self) -> u32 {
        self.results.iter().map(|r| r.value).sum()
    }

    /// Face values, oldest first.
    pub fn faces(&self) -> Vec<u32> {
        self.results.iter().map(|r| r.value).collect()
    }
}

/// Where the chain stands with the platform.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChainState {
    /// Waiting for the result of this roll.
    AwaitingResult(RollId),
    /// Reroll decided, platform submission in flight.
    AwaitingReroll,
}

/// An in-flight throw.
#[derive(Clone, Debug)]
pub struct RollChain {
    /// Stable id.
    pub id: ChainId,
    /// Offense or defence.
    pub role: Role,
    /// Index of the dice set in its list.
    pub set_index: usize,
    /// Dice set as it was when the throw started.
    pub set: DiceSetConfig,
    /// Parsed damage code of the set.
    pub damage: Option<DamageCode>,
    /// No threshold; result is the summed total.
    pub is_open_throw: bool,
    /// Karma reroll of leftover dice.
    pub karma_used: bool,
    /// Successes carried over from the chain being rerolled with karma.
    pub banked_successes: u32,
    /// Number of dice in the first generation.
    pub dice_count: u32,
    /// One entry per original die.
    pub dice: Vec<DieChain>,
    /// Sum of every face across all generations.
    pub running_total: u32,
    /// Generations merged so far.
    pub generations: u32,
    /// Platform state.
    pub state: ChainState,
}

impl RollChain {
    /// Merge one generation of faces. Returns how many dice explode.
    ///
    /// The first generation opens one die-chain per face. Later generations
    /// are paired in order with the die-chains that were open before merging.
    pub fn merge(&mut self, faces: &[u32], avoid_unneeded_explosion: bool) -> u32 {
        let highest = faces.iter().copied().max().unwrap_or(0);
        let results: Vec<DieResult> = faces
            .iter()
            .map(|&value| {
                let is_max = value == DIE_FACES;
                let explodes = is_max
                    && (self.is_open_throw
                        || !avoid_unneeded_explosion
                        || self.set.threshold > highest);
                DieResult { value, is_max, explodes }
            })
            .collect();

        if self.generations == 0 {
            self.dice = results
                .into_iter()
                .take(self.dice_count as usize)
                .map(|r| DieChain { results: vec![r] })
                .collect();
        } else {
            let open: Vec<usize> = self
                .dice
                .iter()
                .enumerate()
                .filter(|(_, d)| d.is_open())
                .map(|(i, _)| i)
                .collect();
            for (slot, result) in open.into_iter().zip(results) {
                self.dice[slot].results.push(result);
            }
        }

        self.generations += 1;
        self.running_total = self.dice.iter().map(DieChain::sum).sum();
        self.open_dice()
    }

    /// Die-chains still waiting for a reroll.
    pub fn open_dice(&self) -> u32 {
        self.dice.iter().filter(|d| d.is_open()).count() as u32
    }

    /// Die-chains whose sum reaches the threshold.
    pub fn successes(&self) -> u32 {
        self.dice
            .iter()
            .filter(|d| d.sum() >= self.set.threshold)
            .count() as u32
    }

    /// Successes including those carried over by a karma reroll.
    pub fn total_successes(&self) -> u32 {
        if self.karma_used {
            self.successes() + self.banked_successes
        } else {
            self.successes()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain(set: DiceSetConfig) -> RollChain {
        RollChain {
            id: ChainId(1),
            role: Role::Offense,
            set_index: 0,
            is_open_throw: set.is_open_throw(),
            dice_count: set.amount,
            damage: None,
            set,
            karma_used: false,
            banked_successes: 0,
            dice: Vec::new(),
            running_total: 0,
            generations: 0,
            state: ChainState::AwaitingResult("r1".to_string()),
        }
    }

    #[test]
    fn test_reroll_pairs_with_exploded_die() {
        let mut c = chain(DiceSetConfig::new("Pistol", 4, 3, "8M", 1));

        assert_eq!(c.merge(&[6, 3, 5], false), 1);
        assert_eq!(c.successes(), 2);

        assert_eq!(c.merge(&[2], false), 0);
        assert_eq!(c.dice[0].faces(), vec![6, 2]);
        assert_eq!(c.dice[1].faces(), vec![3]);
        assert_eq!(c.successes(), 2);
    }

    #[test]
    fn test_reroll_pairs_skip_closed_dice() {
        let mut c = chain(DiceSetConfig::new("Burst", 9, 4, "-", 1));

        assert_eq!(c.merge(&[2, 6, 1, 6], false), 2);
        assert_eq!(c.merge(&[6, 3], false), 1);
        assert_eq!(c.dice[1].faces(), vec![6, 6]);
        assert_eq!(c.dice[3].faces(), vec![6, 3]);

        assert_eq!(c.merge(&[1], false), 0);
        assert_eq!(c.dice[1].faces(), vec![6, 6, 1]);
        // 13 and 9 reach the threshold
        assert_eq!(c.successes(), 2);
    }

    #[test]
    fn test_avoid_unneeded_explosion() {
        let mut c = chain(DiceSetConfig::new("Pistol", 4, 2, "8M", 1));
        // A six already reaches threshold 4
        assert_eq!(c.merge(&[6, 2], true), 0);

        let mut c = chain(DiceSetConfig::new("Hard", 8, 2, "8M", 1));
        // Threshold above any single face keeps exploding
        assert_eq!(c.merge(&[6, 2], true), 1);
    }

    #[test]
    fn test_open_throw_always_explodes() {
        let mut c = chain(DiceSetConfig::open_throw("Search", 3));
        assert_eq!(c.merge(&[6, 6, 2], true), 2);
        assert_eq!(c.running_total, 14);
        assert_eq!(c.merge(&[4, 6], true), 1);
        assert_eq!(c.running_total, 24);
        assert_eq!(c.merge(&[1], true), 0);
        assert_eq!(c.running_total, 25);
    }

    #[test]
    fn test_first_generation_capped_at_amount() {
        let mut c = chain(DiceSetConfig::new("Pistol", 4, 2, "8M", 1));
        c.merge(&[1, 2, 3], false);
        assert_eq!(c.dice.len(), 2);
    }

    #[test]
    fn test_karma_total() {
        let mut c = chain(DiceSetConfig::new("Pistol", 4, 3, "8M", 1));
        c.karma_used = true;
        c.banked_successes = 1;
        c.merge(&[5, 1], false);
        assert_eq!(c.total_successes(), 2);
    }
}
