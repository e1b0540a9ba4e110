//! Dice Set Registry
//!
//! Configured throw profiles, one list for offense and one for defence.
//! The surrounding UI edits these lists; the engine only reads a snapshot
//! when a throw is submitted.

use serde::{Serialize, Deserialize};
use thiserror::Error;
use tracing::debug;

use crate::core::damage::{DamageCode, DamageCodeError, NO_DAMAGE_CODE};

/// Which list a dice set lives in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Attack throws; successes raise damage.
    Offense,
    /// Defence throws; successes reduce damage.
    Defence,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Offense => write!(f, "offense"),
            Role::Defence => write!(f, "defence"),
        }
    }
}

fn default_shots() -> u32 {
    1
}

/// A configured throw profile.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiceSetConfig {
    /// Display name.
    pub name: String,
    /// Minimum die-chain sum that counts as a success.
    #[serde(alias = "mw")]
    pub threshold: u32,
    /// Number of dice.
    pub amount: u32,
    /// Damage code, or `-` for none.
    #[serde(rename = "dmg")]
    pub damage_code: String,
    /// Shot count.
    #[serde(rename = "bullets", default = "default_shots")]
    pub shots: u32,
}

impl DiceSetConfig {
    /// Create a dice set.
    pub fn new(
        name: impl Into<String>,
        threshold: u32,
        amount: u32,
        damage_code: impl Into<String>,
        shots: u32,
    ) -> Self {
        Self {
            name: name.into(),
            threshold,
            amount,
            damage_code: damage_code.into(),
            shots,
        }
    }

    /// A throw without threshold or damage; its result is the summed total.
    pub fn open_throw(name: impl Into<String>, amount: u32) -> Self {
        Self::new(name, 0, amount, NO_DAMAGE_CODE, 1)
    }

    /// Threshold 0 and no damage code.
    pub fn is_open_throw(&self) -> bool {
        self.threshold == 0 && !self.has_damage_code()
    }

    /// Whether a damage code is configured.
    pub fn has_damage_code(&self) -> bool {
        self.damage_code != NO_DAMAGE_CODE
    }

    /// Parsed damage code, `None` for `-`.
    pub fn damage(&self) -> Result<Option<DamageCode>, DamageCodeError> {
        if !self.has_damage_code() {
            return Ok(None);
        }
        DamageCode::parse(&self.damage_code).map(Some)
    }
}

/// Registry errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// No dice set at this position.
    #[error("no {role} dice set at index {index}")]
    NotFound {
        /// List searched.
        role: Role,
        /// Requested index.
        index: usize,
    },
}

/// Offense and defence dice sets.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiceSetRegistry {
    offense: Vec<DiceSetConfig>,
    defence: Vec<DiceSetConfig>,
}

impl DiceSetRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry from stored lists.
    pub fn from_lists(offense: Vec<DiceSetConfig>, defence: Vec<DiceSetConfig>) -> Self {
        Self { offense, defence }
    }

    fn list_mut(&mut self, role: Role) -> &mut Vec<DiceSetConfig> {
        match role {
            Role::Offense => &mut self.offense,
            Role::Defence => &mut self.defence,
        }
    }

    /// All sets for a role, in display order.
    pub fn list(&self, role: Role) -> &[DiceSetConfig] {
        match role {
            Role::Offense => &self.offense,
            Role::Defence => &self.defence,
        }
    }

    /// Dice set by position.
    pub fn get(&self, role: Role, index: usize) -> Option<&DiceSetConfig> {
        self.list(role).get(index)
    }

    /// Append a dice set, returning its index.
    pub fn add(&mut self, role: Role, config: DiceSetConfig) -> usize {
        let list = self.list_mut(role);
        list.push(config);
        debug!(%role, index = list.len() - 1, "dice set added");
        list.len() - 1
    }

    /// Replace the dice set at `index`.
    pub fn update(&mut self, role: Role, index: usize, config: DiceSetConfig) -> Result<(), RegistryError> {
        let slot = self
            .list_mut(role)
            .get_mut(index)
            .ok_or(RegistryError::NotFound { role, index })?;
        *slot = config;
        Ok(())
    }

    /// Remove the dice set at `index`. Later sets shift down.
    pub fn remove(&mut self, role: Role, index: usize) -> Result<DiceSetConfig, RegistryError> {
        let list = self.list_mut(role);
        if index >= list.len() {
            return Err(RegistryError::NotFound { role, index });
        }
        Ok(list.remove(index))
    }

    /// Number of sets for a role.
    pub fn len(&self, role: Role) -> usize {
        self.list(role).len()
    }

    /// True when both lists are empty.
    pub fn is_empty(&self) -> bool {
        self.offense.is_empty() && self.defence.is_empty()
    }
}
