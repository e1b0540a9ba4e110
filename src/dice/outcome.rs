//! Roll Outcomes
//!
//! Terminal summary of a chain and the texts derived from it. Only this
//! summary ever leaves the client that threw the dice.

use serde::{Serialize, Deserialize};

use crate::core::damage::{DamageCode, ReducedDamage};
use super::chain::{ChainId, RollChain};
use super::registry::Role;

/// Dice kind shown by the platform.
pub const D6_KIND: &str = "d6";

/// One display group handed back to the dice platform.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultGroup {
    /// Group label.
    pub name: String,
    /// Dice kind, e.g. `d6`.
    pub kind: String,
    /// Face values.
    pub results: Vec<u32>,
    /// Flat value added to the dice.
    #[serde(default)]
    pub modifier: u32,
}

impl ResultGroup {
    /// Group of d6 faces without modifier.
    pub fn d6(name: impl Into<String>, results: Vec<u32>) -> Self {
        Self {
            name: name.into(),
            kind: D6_KIND.to_string(),
            results,
            modifier: 0,
        }
    }

    /// Faces plus modifier.
    pub fn total(&self) -> u32 {
        self.results.iter().fold(self.modifier, |acc, face| acc.saturating_add(*face))
    }
}

/// Damage after applying successes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DamageOutcome {
    /// Raised offensive damage code.
    Dealt {
        /// Resulting code.
        code: DamageCode,
    },
    /// Level left after defending.
    Taken {
        /// Remaining level.
        remaining: ReducedDamage,
    },
}

impl std::fmt::Display for DamageOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DamageOutcome::Dealt { code } => write!(f, "{}", code),
            DamageOutcome::Taken { remaining } => write!(f, "{}", remaining),
        }
    }
}

/// A finished throw.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollOutcome {
    /// Chain that produced it.
    pub chain_id: ChainId,
    /// Offense or defence.
    pub role: Role,
    /// Dice set position.
    pub set_index: usize,
    /// Dice set name.
    pub name: String,
    /// Configured dice amount.
    pub amount: u32,
    /// Configured threshold.
    pub threshold: u32,
    /// Successes of this chain alone.
    pub own_successes: u32,
    /// Successes including karma carry-over.
    pub successes: u32,
    /// Karma reroll.
    pub karma_used: bool,
    /// Summed total, open throws only.
    pub open_total: Option<u32>,
    /// Damage, when the set has a damage code.
    pub damage: Option<DamageOutcome>,
    /// Per-die groups for display.
    pub groups: Vec<ResultGroup>,
}

impl RollOutcome {
    pub(crate) fn from_chain(chain: &RollChain, damage: Option<DamageOutcome>) -> Self {
        let groups = chain
            .dice
            .iter()
            .map(|d| ResultGroup::d6("", d.faces()))
            .collect();

        Self {
            chain_id: chain.id,
            role: chain.role,
            set_index: chain.set_index,
            name: chain.set.name.clone(),
            amount: chain.set.amount,
            threshold: chain.set.threshold,
            own_successes: chain.successes(),
            successes: chain.total_successes(),
            karma_used: chain.karma_used,
            open_total: chain.is_open_throw.then_some(chain.running_total),
            damage,
            groups,
        }
    }

    fn open_throw_line(&self, total: u32) -> String {
        format!("{} => {} D6 => Open Throw Result: {}", self.name, self.amount, total)
    }

    /// Chat announcement.
    pub fn chat_message(&self) -> String {
        if let Some(total) = self.open_total {
            return self.open_throw_line(total);
        }

        let verb = if self.successes == 1 { "was" } else { "were" };
        let mut message = format!(
            "{} of {} dice of the \"{}\" throw {} successful.",
            self.successes, self.amount, self.name, verb
        );

        match (&self.damage, self.successes) {
            (Some(damage), s) if s > 0 => message.push_str(&format!(" Effective damage: {}", damage)),
            (Some(damage @ DamageOutcome::Taken { .. }), _) => {
                message.push_str(&format!(" Full damage: {}", damage))
            }
            (Some(DamageOutcome::Dealt { .. }), _) => message.push_str(" No effective damage!"),
            (None, _) => {}
        }
        message
    }

    /// Line for the shared throw log.
    pub fn log_line(&self) -> String {
        if let Some(total) = self.open_total {
            return self.open_throw_line(total);
        }

        let mut line = match &self.damage {
            Some(damage) => {
                let mut line = format!(
                    "{} => {} D6 vs MW {} : {} success(es).",
                    self.name, self.amount, self.threshold, self.successes
                );
                match damage {
                    DamageOutcome::Dealt { .. } if self.successes == 0 => line.push_str(" No damage!"),
                    _ => line.push_str(&format!(" DMG {}", damage)),
                }
                line
            }
            None if self.successes > 0 => {
                format!("{} => {} D6: {} success(es)", self.name, self.amount, self.successes)
            }
            None => format!("{} => {} D6: No successes", self.name, self.amount),
        };

        if self.karma_used {
            line.push_str(" Karma used!");
        }
        line
    }

    /// Short local notice.
    pub fn notice(&self) -> String {
        if let Some(total) = self.open_total {
            return self.open_throw_line(total);
        }
        match &self.damage {
            Some(damage) if self.successes > 0 => format!(
                "{} => {} success(es) => Effective damage: {}",
                self.name, self.successes, damage
            ),
            Some(damage @ DamageOutcome::Taken { .. }) => {
                format!("No successes => full damage: {}", damage)
            }
            Some(DamageOutcome::Dealt { .. }) => "No hit => no damage".to_string(),
            None => format!("{} => {} D6: {} success(es)", self.name, self.amount, self.successes),
        }
    }
}

/// Announcement that exploded dice may be rolled again.
pub fn reroll_note(name: &str, count: u32) -> String {
    format!("{} dice of the \"{}\" throw can be rerolled.", count, name)
}
