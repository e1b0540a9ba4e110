//! Roll Resolution Engine
//!
//! Owns every in-flight [`RollChain`] of this client and resolves platform
//! callbacks into rerolls or finished outcomes.
//!
//! The engine never talks to the platform itself. Submitting is split in two:
//!
//! 1. [`RollEngine::prepare_throw`] validates and yields a [`ThrowRequest`].
//! 2. After the platform returned a roll id, [`RollEngine::track`] registers it.
//!
//! Results go through [`RollEngine::apply_result`]. When dice exploded the
//! chain is parked until the caller reports the reroll's id with
//! [`RollEngine::attach_reroll`], or gives up with [`RollEngine::abandon`].

use std::collections::{BTreeMap, HashMap, VecDeque};

use serde::{Serialize, Deserialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::core::damage::{
    calculate_damage_code, calculate_reduced_damage_code, DamageCode, DamageCodeError, DamageLevel,
};
use super::chain::{ChainId, ChainState, RollChain, RollId};
use super::outcome::{DamageOutcome, RollOutcome};
use super::registry::{DiceSetConfig, Role};

/// Finished chains remembered for karma rerolls.
pub const HISTORY_CAPACITY: usize = 32;

/// Reasons a throw could not be started.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ThrowError {
    /// Amount is zero.
    #[error("Can't roll 0 dice!")]
    NoDice,

    /// Threshold is zero but a damage code is set.
    #[error("Any dice roll would be above 0!")]
    NoThreshold,

    /// Damage code does not parse, or cannot be raised.
    #[error("{0}")]
    InvalidDamage(#[from] DamageCodeError),

    /// Nothing finished yet to repeat.
    #[error("No previous roll found to repeat.")]
    NoPreviousRoll,

    /// Every die already succeeded.
    #[error("No dice left to roll again.")]
    NoDiceLeft,
}

/// A validated throw, ready for the platform.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ThrowRequest {
    /// Offense or defence.
    pub role: Role,
    /// Dice set position.
    pub set_index: usize,
    /// Dice set snapshot.
    pub set: DiceSetConfig,
    /// Parsed damage code.
    pub damage: Option<DamageCode>,
    /// Dice to roll.
    pub dice_count: u32,
    /// Successes carried over by a karma reroll.
    pub banked_successes: Option<u32>,
}

impl ThrowRequest {
    /// Platform label, the set name in quotes.
    pub fn label(&self) -> String {
        format!("\"{}\"", self.set.name)
    }

    /// Platform expression, e.g. `3d6`.
    pub fn expression(&self) -> String {
        format!("{}d6", self.dice_count)
    }
}

/// Reroll the caller must submit to the platform.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RerollRequest {
    /// Chain waiting for it.
    pub chain_id: ChainId,
    /// Dice set name.
    pub name: String,
    /// Platform label.
    pub label: String,
    /// Number of dice.
    pub count: u32,
}

impl RerollRequest {
    /// Platform expression, e.g. `2d6`.
    pub fn expression(&self) -> String {
        format!("{}d6", self.count)
    }
}

/// What a roll result led to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Resolution {
    /// Dice exploded; submit a reroll.
    Reroll(RerollRequest),
    /// Chain is done.
    Finalized(RollOutcome),
}

/// Summary of a finished chain.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletedRoll {
    /// Chain id.
    pub chain_id: ChainId,
    /// Offense or defence.
    pub role: Role,
    /// Dice set position.
    pub set_index: usize,
    /// Dice set snapshot.
    pub set: DiceSetConfig,
    /// Successes of this chain alone.
    pub successes: u32,
    /// Whether it was a karma reroll.
    pub karma_used: bool,
}

/// Chain bookkeeping for one client.
#[derive(Debug, Default)]
pub struct RollEngine {
    chains: BTreeMap<ChainId, RollChain>,
    outstanding: HashMap<RollId, ChainId>,
    history: VecDeque<CompletedRoll>,
    next_chain: u64,
    avoid_unneeded_explosion: bool,
}

impl RollEngine {
    /// Create an engine.
    pub fn new(avoid_unneeded_explosion: bool) -> Self {
        Self {
            avoid_unneeded_explosion,
            ..Self::default()
        }
    }

    /// Stop exploding once a single face already beats the threshold.
    pub fn set_avoid_unneeded_explosion(&mut self, enabled: bool) {
        self.avoid_unneeded_explosion = enabled;
    }

    /// Current explosion mode.
    pub fn avoid_unneeded_explosion(&self) -> bool {
        self.avoid_unneeded_explosion
    }

    /// Validate a dice set for throwing.
    pub fn prepare_throw(
        &self,
        role: Role,
        set_index: usize,
        set: &DiceSetConfig,
    ) -> Result<ThrowRequest, ThrowError> {
        if set.amount == 0 {
            return Err(ThrowError::NoDice);
        }
        if set.threshold == 0 && set.has_damage_code() {
            return Err(ThrowError::NoThreshold);
        }

        let damage = set.damage()?;
        if let (Role::Offense, Some(code)) = (role, damage) {
            if let DamageLevel::Overflow(_) = code.level {
                return Err(DamageCodeError::InvalidDamageLevel(code.level.to_string()).into());
            }
        }

        Ok(ThrowRequest {
            role,
            set_index,
            set: set.clone(),
            damage,
            dice_count: set.amount,
            banked_successes: None,
        })
    }

    /// Karma reroll of the dice that did not succeed last time.
    ///
    /// Uses the most recently finished chain. `previous_successes` overrides
    /// the successes counted as already banked.
    pub fn repeat_last_roll(&self, previous_successes: Option<u32>) -> Result<ThrowRequest, ThrowError> {
        let last = self.history.back().ok_or(ThrowError::NoPreviousRoll)?;
        let banked = previous_successes.unwrap_or(last.successes);

        if last.set.amount <= banked {
            return Err(ThrowError::NoDiceLeft);
        }

        let mut request = self.prepare_throw(last.role, last.set_index, &last.set)?;
        request.dice_count = last.set.amount - banked;
        request.banked_successes = Some(banked);
        Ok(request)
    }

    /// Register a submitted throw under the platform's roll id.
    pub fn track(&mut self, request: ThrowRequest, roll_id: RollId) -> ChainId {
        self.next_chain += 1;
        let id = ChainId(self.next_chain);

        let chain = RollChain {
            id,
            role: request.role,
            set_index: request.set_index,
            is_open_throw: request.set.is_open_throw(),
            karma_used: request.banked_successes.is_some(),
            banked_successes: request.banked_successes.unwrap_or(0),
            dice_count: request.dice_count,
            damage: request.damage,
            set: request.set,
            dice: Vec::new(),
            running_total: 0,
            generations: 0,
            state: ChainState::AwaitingResult(roll_id.clone()),
        };

        info!(chain = %id, roll = %roll_id, name = %chain.set.name, dice = chain.dice_count, "throw tracked");
        self.outstanding.insert(roll_id, id);
        self.chains.insert(id, chain);
        id
    }

    /// Chain by id.
    pub fn chain(&self, id: ChainId) -> Option<&RollChain> {
        self.chains.get(&id)
    }

    /// Number of unfinished chains.
    pub fn in_flight(&self) -> usize {
        self.chains.len()
    }

    /// Finished chains, oldest first.
    pub fn history(&self) -> impl Iterator<Item = &CompletedRoll> {
        self.history.iter()
    }

    /// Feed one generation of faces.
    ///
    /// Unknown roll ids are ignored, which makes duplicate callbacks harmless.
    pub fn apply_result(&mut self, roll_id: &str, faces: &[u32]) -> Option<Resolution> {
        let Some(id) = self.outstanding.remove(roll_id) else {
            debug!(roll = %roll_id, "result for untracked roll ignored");
            return None;
        };
        let Some(chain) = self.chains.get_mut(&id) else {
            warn!(chain = %id, "roll id pointed to a missing chain");
            return None;
        };

        let rerolls = chain.merge(faces, self.avoid_unneeded_explosion);
        debug!(
            chain = %id,
            generation = chain.generations,
            ?faces,
            rerolls,
            successes = chain.successes(),
            "generation merged"
        );

        if rerolls > 0 {
            chain.state = ChainState::AwaitingReroll;
            return Some(Resolution::Reroll(RerollRequest {
                chain_id: id,
                name: chain.set.name.clone(),
                label: format!("\"{}\"", chain.set.name),
                count: rerolls,
            }));
        }

        let chain = self.chains.remove(&id)?;
        Some(Resolution::Finalized(self.finalize(chain)))
    }

    /// Point a parked chain at its reroll. Returns false if the chain is gone.
    pub fn attach_reroll(&mut self, chain_id: ChainId, roll_id: RollId) -> bool {
        let Some(chain) = self.chains.get_mut(&chain_id) else {
            return false;
        };
        if chain.state != ChainState::AwaitingReroll {
            warn!(chain = %chain_id, "reroll attached to a chain that was not waiting");
            return false;
        }

        debug!(chain = %chain_id, roll = %roll_id, "reroll attached");
        chain.state = ChainState::AwaitingResult(roll_id.clone());
        self.outstanding.insert(roll_id, chain_id);
        true
    }

    /// Drop a chain whose reroll could not be submitted.
    pub fn abandon(&mut self, chain_id: ChainId) -> Option<RollChain> {
        let chain = self.chains.remove(&chain_id)?;
        if let ChainState::AwaitingResult(roll_id) = &chain.state {
            self.outstanding.remove(roll_id);
        }
        warn!(chain = %chain_id, "chain abandoned");
        Some(chain)
    }

    /// The platform removed a roll before it resolved.
    pub fn on_roll_removed(&mut self, roll_id: &str) -> Option<ChainId> {
        let id = self.outstanding.remove(roll_id)?;
        self.chains.remove(&id);
        debug!(chain = %id, roll = %roll_id, "roll removed");
        Some(id)
    }

    fn finalize(&mut self, chain: RollChain) -> RollOutcome {
        let successes = chain.total_successes();

        let damage = match (chain.role, chain.damage) {
            (_, None) => None,
            (Role::Offense, Some(code)) => {
                match calculate_damage_code(code.power, code.level, chain.set.shots, successes) {
                    Ok(code) => Some(DamageOutcome::Dealt { code }),
                    Err(e) => {
                        warn!(chain = %chain.id, error = %e, "damage code not applicable");
                        None
                    }
                }
            }
            (Role::Defence, Some(code)) => Some(DamageOutcome::Taken {
                remaining: calculate_reduced_damage_code(code.level, successes),
            }),
        };

        let outcome = RollOutcome::from_chain(&chain, damage);
        info!(
            chain = %chain.id,
            name = %chain.set.name,
            successes,
            karma = chain.karma_used,
            open_total = ?outcome.open_total,
            "chain finalized"
        );

        if self.history.len() >= HISTORY_CAPACITY {
            self.history.pop_front();
        }
        self.history.push_back(CompletedRoll {
            chain_id: chain.id,
            role: chain.role,
            set_index: chain.set_index,
            set: chain.set,
            successes: outcome.own_successes,
            karma_used: chain.karma_used,
        });

        outcome
    }
}
