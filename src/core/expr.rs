//! Initiative Expressions
//!
//! Either a flat value (`17`) or a dice formula (`2d6`, `3d6+14`).

use std::fmt;
use std::str::FromStr;

use serde::{Serialize, Deserialize};
use thiserror::Error;

use super::rng::{DeterministicRng, DIE_FACES};

/// Most dice one expression may roll.
pub const MAX_DICE: u32 = 20;

/// Largest die.
pub const MAX_FACES: u32 = 100;

/// Largest modifier.
pub const MAX_VALUE: u32 = 1000;

/// Largest flat value: anything a bounded dice expression can roll.
pub const MAX_TOTAL: u32 = MAX_DICE * MAX_FACES + MAX_VALUE;

/// A parsed initiative expression. Serialized in its text form.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum InitiativeExpression {
    /// Fixed value.
    Flat {
        /// The value.
        value: u32,
    },
    /// `<count>d<faces>(+<modifier>)`.
    Dice {
        /// Number of dice.
        count: u32,
        /// Faces per die.
        faces: u32,
        /// Flat bonus.
        modifier: u32,
    },
}

/// Expression errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExpressionError {
    /// Does not match `N` or `NdM(+K)`.
    #[error("invalid initiative expression \"{0}\", use something like 14, 2d6 or 3d6+14")]
    Malformed(String),

    /// Count, faces or value past the supported range.
    #[error("initiative expression \"{0}\" is out of range (at most 20 dice of 100 faces, modifiers up to 1000, flat values up to 3000)")]
    OutOfRange(String),

    /// Own initiative must be written `Xd6+Y`.
    #[error("invalid initiative value \"{0}\", use the format 1d6+10")]
    NotSelfRegistration(String),
}

impl InitiativeExpression {
    /// Parse `^(\d+|\d+d\d+(\+\d+)?)$` within the initiative range.
    pub fn parse(input: &str) -> Result<Self, ExpressionError> {
        let expr = Self::parse_notation(input)?;
        let in_range = match expr {
            InitiativeExpression::Flat { value } => value <= MAX_TOTAL,
            InitiativeExpression::Dice { count, faces, modifier } => {
                count <= MAX_DICE && faces <= MAX_FACES && modifier <= MAX_VALUE
            }
        };
        if !in_range {
            return Err(ExpressionError::OutOfRange(input.to_string()));
        }
        Ok(expr)
    }

    /// Grammar only, any `u32` terms. Dice pools use this; they are not
    /// initiative values.
    pub fn parse_notation(input: &str) -> Result<Self, ExpressionError> {
        let malformed = || ExpressionError::Malformed(input.to_string());

        let Some((count, rest)) = input.split_once('d') else {
            return parse_number(input)
                .map(|value| InitiativeExpression::Flat { value })
                .ok_or_else(malformed);
        };

        let (faces, modifier) = match rest.split_once('+') {
            Some((faces, modifier)) => (faces, Some(modifier)),
            None => (rest, None),
        };

        let count = parse_number(count).ok_or_else(malformed)?;
        let faces = parse_number(faces).ok_or_else(malformed)?;
        let modifier = match modifier {
            Some(m) => parse_number(m).ok_or_else(malformed)?,
            None => 0,
        };

        Ok(InitiativeExpression::Dice { count, faces, modifier })
    }

    /// Parse the stricter `Xd6+Y` form used for a participant's own initiative.
    pub fn parse_self_registration(input: &str) -> Result<Self, ExpressionError> {
        let not_self = || ExpressionError::NotSelfRegistration(input.to_string());

        if !input.contains('+') {
            return Err(not_self());
        }
        match Self::parse(input) {
            Ok(expr @ InitiativeExpression::Dice { faces: DIE_FACES, .. }) => Ok(expr),
            _ => Err(not_self()),
        }
    }

    /// Roll the expression. Parsed expressions stay at or below 3000;
    /// hand-built ones saturate.
    pub fn roll(&self, rng: &mut DeterministicRng) -> u32 {
        match *self {
            InitiativeExpression::Flat { value } => value,
            InitiativeExpression::Dice { count, faces, modifier } => (0..count)
                .map(|_| rng.roll_die(faces))
                .fold(modifier, u32::saturating_add),
        }
    }

    /// Roll as a signed initiative value.
    pub fn roll_value(&self, rng: &mut DeterministicRng) -> i32 {
        i32::try_from(self.roll(rng)).unwrap_or(i32::MAX)
    }
}

impl fmt::Display for InitiativeExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            InitiativeExpression::Flat { value } => write!(f, "{}", value),
            InitiativeExpression::Dice { count, faces, modifier: 0 } => write!(f, "{}d{}", count, faces),
            InitiativeExpression::Dice { count, faces, modifier } => {
                write!(f, "{}d{}+{}", count, faces, modifier)
            }
        }
    }
}

impl TryFrom<String> for InitiativeExpression {
    type Error = ExpressionError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<InitiativeExpression> for String {
    fn from(expr: InitiativeExpression) -> String {
        expr.to_string()
    }
}

impl FromStr for InitiativeExpression {
    type Err = ExpressionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

fn parse_number(s: &str) -> Option<u32> {
    if s.is_empty() || !s.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}
