//! Rendered Initiative Table
//!
//! The table as it travels over the sync bus: one row per turn slot, rows
//! joined by `<br>`, already-played rows wrapped in `<s>...</s>`.

use std::fmt;

use serde::{Serialize, Deserialize};

/// Row separator on the wire.
pub const ROW_SEPARATOR: &str = "<br>";

const STRIKE_OPEN: &str = "<s>";
const STRIKE_CLOSE: &str = "</s>";

/// One line of the table.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableRow {
    /// Row text, e.g. `[13] :: [-2] Kira (2d6+9)`.
    pub text: String,
    /// Turn already taken.
    pub struck: bool,
}

/// How far away the reader's own turn is.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "turns", rename_all = "snake_case")]
pub enum TurnHint {
    /// First open row.
    Now,
    /// Open rows before ours.
    InTurns(usize),
    /// Name not in any open row.
    NotListed,
}

impl fmt::Display for TurnHint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TurnHint::Now => write!(f, "Now!"),
            TurnHint::InTurns(n) => write!(f, "{} turn(s)", n),
            TurnHint::NotListed => write!(f, "No"),
        }
    }
}

/// A rendered initiative table.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitiativeTable {
    rows: Vec<TableRow>,
}

impl InitiativeTable {
    /// Table from rows.
    pub fn new(rows: Vec<TableRow>) -> Self {
        Self { rows }
    }

    /// Parse a wire message. An empty message is an empty table.
    pub fn parse(message: &str) -> Self {
        if message.trim().is_empty() {
            return Self::default();
        }

        let rows = message
            .split(ROW_SEPARATOR)
            .map(|line| match line.strip_prefix(STRIKE_OPEN) {
                Some(inner) => TableRow {
                    text: inner.strip_suffix(STRIKE_CLOSE).unwrap_or(inner).to_string(),
                    struck: true,
                },
                None => TableRow {
                    text: line.to_string(),
                    struck: false,
                },
            })
            .collect();

        Self { rows }
    }

    /// Wire form.
    pub fn to_message(&self) -> String {
        self.rows
            .iter()
            .map(|row| {
                if row.struck {
                    format!("{}{}{}", STRIKE_OPEN, row.text, STRIKE_CLOSE)
                } else {
                    row.text.clone()
                }
            })
            .collect::<Vec<_>>()
            .join(ROW_SEPARATOR)
    }

    /// Rows in turn order.
    pub fn rows(&self) -> &[TableRow] {
        &self.rows
    }

    /// No rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Find the first open row mentioning `name`.
    pub fn turn_hint(&self, name: &str) -> TurnHint {
        if name.is_empty() {
            return TurnHint::NotListed;
        }
        match self
            .rows
            .iter()
            .filter(|row| !row.struck)
            .position(|row| row.text.contains(name))
        {
            Some(0) => TurnHint::Now,
            Some(n) => TurnHint::InTurns(n),
            None => TurnHint::NotListed,
        }
    }
}

impl fmt::Display for InitiativeTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.rows.is_empty() {
            return write!(f, "No current Ini-table");
        }
        for (i, row) in self.rows.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            if row.struck {
                write!(f, "~~{}~~", row.text)?;
            } else {
                write!(f, "{}", row.text)?;
            }
        }
        Ok(())
    }
}
