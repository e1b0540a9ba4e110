//! Initiative Scheduler
//!
//! Turn order from initiative values. Every participant acts once per pass
//! of 10 points: a value of 23 acts at 23, 13 and 3. Each round collects the
//! next slot of every participant who still has one, sorted highest first.
//!
//! Equal slots keep insertion order, so the participant added first wins ties.

use serde::{Serialize, Deserialize};
use thiserror::Error;
use tracing::debug;

use crate::core::damage::Severity;
use crate::core::expr::{ExpressionError, InitiativeExpression};
use crate::core::rng::DeterministicRng;
use super::table::{InitiativeTable, TableRow};

/// Points consumed per action.
pub const PASS_COST: i32 = 10;

/// One of the two condition monitor rows.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionRow {
    /// First row.
    Row1,
    /// Second row.
    Row2,
}

/// Penalty of a condition box: L = -1 up to T = -4.
pub fn condition_penalty(level: Option<Severity>) -> i32 {
    match level {
        Some(severity) => -(severity.index() as i32 + 1),
        None => 0,
    }
}

/// Condition penalties of one participant.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Penalties {
    /// First row, 0 to -4.
    pub row1: i32,
    /// Second row, 0 to -4.
    pub row2: i32,
}

impl Penalties {
    /// Sum of both rows.
    pub fn total(&self) -> i32 {
        self.row1 + self.row2
    }
}

/// A participant.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitiativeEntry {
    /// Unique display name.
    pub name: String,
    /// How the value is rolled.
    pub expression: InitiativeExpression,
    /// Rolled value.
    pub original_value: i32,
    /// Condition penalties.
    #[serde(default)]
    pub penalties: Penalties,
    /// Rolled value plus penalties.
    pub current_value: i32,
}

impl InitiativeEntry {
    fn recompute(&mut self) {
        self.current_value = self.original_value + self.penalties.total();
    }

    /// Action slots: the current value, then every 10 less, while positive.
    pub fn slots(&self) -> Vec<i32> {
        let mut slots = Vec::new();
        let mut value = self.current_value;
        while value > 0 {
            slots.push(value);
            value -= PASS_COST;
        }
        slots
    }
}

/// One action in the turn order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TurnSlot {
    /// Participant.
    pub name: String,
    /// Slot value.
    pub value: i32,
    /// Penalty points applied, as a positive number.
    pub penalty: i32,
    /// Participant's expression.
    pub expression: InitiativeExpression,
}

impl TurnSlot {
    /// `[value]( :: [-penalty]) name (expression)`
    pub fn render(&self) -> String {
        if self.penalty != 0 {
            format!("[{}] :: [-{}] {} ({})", self.value, self.penalty, self.name, self.expression)
        } else {
            format!("[{}] {} ({})", self.value, self.name, self.expression)
        }
    }
}

/// Scheduler errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchedulerError {
    /// Name missing.
    #[error("please enter a valid name and initiative")]
    EmptyName,

    /// Malformed expression.
    #[error(transparent)]
    Expression(#[from] ExpressionError),

    /// No participant with this name.
    #[error("no initiative entry named \"{0}\"")]
    UnknownEntry(String),
}

/// Build the turn order for a list of participants.
pub fn compute_order(entries: &[InitiativeEntry]) -> Vec<TurnSlot> {
    let mut queues: Vec<(&InitiativeEntry, std::vec::IntoIter<i32>)> = entries
        .iter()
        .map(|e| (e, e.slots().into_iter()))
        .collect();

    let mut order = Vec::new();
    loop {
        let mut round: Vec<TurnSlot> = queues
            .iter_mut()
            .filter_map(|(entry, slots)| {
                slots.next().map(|value| TurnSlot {
                    name: entry.name.clone(),
                    value,
                    penalty: entry.original_value - entry.current_value,
                    expression: entry.expression,
                })
            })
            .collect();

        if round.is_empty() {
            break;
        }

        // Stable, so ties keep insertion order
        round.sort_by(|a, b| b.value.cmp(&a.value));
        order.extend(round);
    }
    order
}

/// Participants, their rolled values and the strike cursor.
#[derive(Debug)]
pub struct InitiativeScheduler {
    entries: Vec<InitiativeEntry>,
    rng: DeterministicRng,
    struck: usize,
}

impl InitiativeScheduler {
    /// Empty scheduler rolling with `rng`.
    pub fn new(rng: DeterministicRng) -> Self {
        Self {
            entries: Vec::new(),
            rng,
            struck: 0,
        }
    }

    /// Participants in insertion order.
    pub fn entries(&self) -> &[InitiativeEntry] {
        &self.entries
    }

    /// Participant by name.
    pub fn get(&self, name: &str) -> Option<&InitiativeEntry> {
        self.entries.iter().find(|e| e.name == name)
    }

    /// Add a participant, or re-roll an existing one keeping its penalties.
    pub fn add_or_update(&mut self, name: &str, expression: &str) -> Result<&InitiativeEntry, SchedulerError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(SchedulerError::EmptyName);
        }
        let expression = InitiativeExpression::parse(expression.trim())?;
        let rolled = expression.roll_value(&mut self.rng);

        let index = match self.entries.iter().position(|e| e.name == name) {
            Some(index) => {
                let entry = &mut self.entries[index];
                entry.expression = expression;
                entry.original_value = rolled;
                entry.recompute();
                index
            }
            None => {
                self.entries.push(InitiativeEntry {
                    name: name.to_string(),
                    expression,
                    original_value: rolled,
                    penalties: Penalties::default(),
                    current_value: rolled,
                });
                self.entries.len() - 1
            }
        };

        debug!(entry = name, %expression, rolled, "initiative set");
        Ok(&self.entries[index])
    }

    /// Remove a participant.
    pub fn remove(&mut self, name: &str) -> Option<InitiativeEntry> {
        let index = self.entries.iter().position(|e| e.name == name)?;
        Some(self.entries.remove(index))
    }

    /// Roll every participant again and clear the strike marks.
    pub fn reroll_all(&mut self) {
        for entry in &mut self.entries {
            entry.original_value = entry.expression.roll_value(&mut self.rng);
            entry.recompute();
        }
        self.struck = 0;
    }

    /// Keep only the named participants.
    pub fn retain(&mut self, names: &[&str]) {
        self.entries.retain(|e| names.contains(&e.name.as_str()));
        self.struck = 0;
    }

    /// Replace all participants, e.g. from a stored profile.
    pub fn restore(&mut self, entries: Vec<InitiativeEntry>) {
        self.entries = entries;
        self.struck = 0;
    }

    /// Set a condition box. `None` clears the row.
    pub fn set_condition(
        &mut self,
        name: &str,
        row: ConditionRow,
        level: Option<Severity>,
    ) -> Result<&InitiativeEntry, SchedulerError> {
        let entry = self
            .entries
            .iter_mut()
            .find(|e| e.name == name)
            .ok_or_else(|| SchedulerError::UnknownEntry(name.to_string()))?;

        let penalty = condition_penalty(level);
        match row {
            ConditionRow::Row1 => entry.penalties.row1 = penalty,
            ConditionRow::Row2 => entry.penalties.row2 = penalty,
        }
        entry.recompute();
        Ok(entry)
    }

    /// Turn order of the current participants.
    pub fn compute_order(&self) -> Vec<TurnSlot> {
        compute_order(&self.entries)
    }

    /// Strike the next row. Returns false at the end of the table.
    pub fn advance(&mut self) -> bool {
        let rows = self.compute_order().len();
        if self.struck < rows {
            self.struck += 1;
            true
        } else {
            false
        }
    }

    /// Strike every row up to and including `index`.
    pub fn step(&mut self, index: usize) {
        let rows = self.compute_order().len();
        self.struck = (index + 1).min(rows);
    }

    /// Clear all strike marks.
    pub fn reset(&mut self) {
        self.struck = 0;
    }

    /// Number of struck rows.
    pub fn struck(&self) -> usize {
        self.struck
    }

    /// Render the table with strike marks applied.
    pub fn render(&self) -> InitiativeTable {
        let rows = self
            .compute_order()
            .iter()
            .enumerate()
            .map(|(i, slot)| TableRow {
                text: slot.render(),
                struck: i < self.struck,
            })
            .collect();
        InitiativeTable::new(rows)
    }
}
