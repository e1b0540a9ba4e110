//! Damage Codes
//!
//! A damage code is `<power><level>`, e.g. `8M`. Levels climb `L < M < S < T`
//! and continue past `T` as `T+1`, `T+2`, ...
//!
//! Offensive successes raise the level (two successes per step, plus one step
//! for every three shots); defensive successes lower it until nothing is left.

use std::fmt;
use std::str::FromStr;

use serde::{Serialize, Deserialize};
use thiserror::Error;

/// Marker used in dice sets that carry no damage code.
pub const NO_DAMAGE_CODE: &str = "-";

/// Successes needed per level step.
const SUCCESSES_PER_STEP: u32 = 2;

/// Shots needed per bonus level step.
const SHOTS_PER_STEP: u32 = 3;

/// Base damage severity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Severity {
    /// L
    Light = 0,
    /// M
    Moderate = 1,
    /// S
    Serious = 2,
    /// T
    Deadly = 3,
}

impl Severity {
    /// All levels in ascending order.
    pub const ALL: [Severity; 4] = [
        Severity::Light,
        Severity::Moderate,
        Severity::Serious,
        Severity::Deadly,
    ];

    /// Position on the scale (L = 0).
    #[inline]
    pub fn index(self) -> u32 {
        self as u32
    }

    /// Level at a scale position.
    pub fn from_index(index: u32) -> Option<Severity> {
        Self::ALL.get(index as usize).copied()
    }

    /// Single-letter code.
    pub fn letter(self) -> char {
        match self {
            Severity::Light => 'L',
            Severity::Moderate => 'M',
            Severity::Serious => 'S',
            Severity::Deadly => 'T',
        }
    }

    /// Parse a level letter, ignoring case.
    pub fn from_letter(letter: char) -> Option<Severity> {
        match letter.to_ascii_uppercase() {
            'L' => Some(Severity::Light),
            'M' => Some(Severity::Moderate),
            'S' => Some(Severity::Serious),
            'T' => Some(Severity::Deadly),
            _ => None,
        }
    }
}

/// A damage level: one of the base levels or `T+n`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DamageLevel {
    /// L, M, S or T.
    Base(Severity),
    /// T+n.
    Overflow(u32),
}

impl DamageLevel {
    /// Total ordering rank: L = 0 ... T = 3, T+n = 3 + n.
    pub fn rank(self) -> u32 {
        match self {
            DamageLevel::Base(severity) => severity.index(),
            DamageLevel::Overflow(n) => Severity::Deadly.index() + n,
        }
    }
}

impl fmt::Display for DamageLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DamageLevel::Base(severity) => write!(f, "{}", severity.letter()),
            DamageLevel::Overflow(n) => write!(f, "T+{}", n),
        }
    }
}

impl FromStr for DamageLevel {
    type Err = DamageCodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut chars = s.chars();
        let severity = chars
            .next()
            .and_then(Severity::from_letter)
            .ok_or_else(|| DamageCodeError::InvalidDamageLevel(s.to_string()))?;
        let rest = chars.as_str();

        if rest.is_empty() {
            return Ok(DamageLevel::Base(severity));
        }

        // Only T may carry an overflow suffix
        let digits = rest
            .strip_prefix('+')
            .filter(|d| is_digits(d))
            .ok_or_else(|| DamageCodeError::InvalidDamageLevel(s.to_string()))?;
        if severity != Severity::Deadly {
            return Err(DamageCodeError::InvalidDamageLevel(s.to_uppercase()));
        }
        let n = digits
            .parse::<u32>()
            .map_err(|_| DamageCodeError::InvalidDamageLevel(s.to_string()))?;
        Ok(DamageLevel::Overflow(n))
    }
}

/// A full damage code, e.g. `8M` or `12T+1`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DamageCode {
    /// Power level.
    pub power: u32,
    /// Damage level.
    pub level: DamageLevel,
}

impl DamageCode {
    /// Create a new damage code.
    pub const fn new(power: u32, level: DamageLevel) -> Self {
        Self { power, level }
    }

    /// Parse `^(\d+)([LMST])(\+\d+)?$`, letter case-insensitive.
    pub fn parse(code: &str) -> Result<DamageCode, DamageCodeError> {
        let split = code
            .find(|c: char| !c.is_ascii_digit())
            .ok_or_else(|| DamageCodeError::InvalidDamageCode(code.to_string()))?;
        let (power, level) = code.split_at(split);

        if power.is_empty() || !is_level_shape(level) {
            return Err(DamageCodeError::InvalidDamageCode(code.to_string()));
        }

        let power = power
            .parse::<u32>()
            .map_err(|_| DamageCodeError::InvalidDamageCode(code.to_string()))?;
        let level = level.parse::<DamageLevel>()?;

        Ok(DamageCode { power, level })
    }
}

impl fmt::Display for DamageCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.power, self.level)
    }
}

impl FromStr for DamageCode {
    type Err = DamageCodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DamageCode::parse(s)
    }
}

/// Result of a defensive reduction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReducedDamage {
    /// Remaining damage level.
    Level(DamageLevel),
    /// Reduced below L.
    NoDamage,
}

impl ReducedDamage {
    /// Apply a further defensive reduction. `NoDamage` stays `NoDamage`.
    pub fn reduce(self, successes: u32) -> ReducedDamage {
        match self {
            ReducedDamage::Level(level) => calculate_reduced_damage_code(level, successes),
            ReducedDamage::NoDamage => ReducedDamage::NoDamage,
        }
    }

    /// Ordering rank; `None` for no damage.
    pub fn rank(self) -> Option<u32> {
        match self {
            ReducedDamage::Level(level) => Some(level.rank()),
            ReducedDamage::NoDamage => None,
        }
    }
}

impl fmt::Display for ReducedDamage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReducedDamage::Level(level) => write!(f, "{}", level),
            ReducedDamage::NoDamage => write!(f, "no damage"),
        }
    }
}

/// Damage code errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DamageCodeError {
    /// Code does not match `<power><level>`.
    #[error("invalid damage code \"{0}\", use something like 9M or 14S")]
    InvalidDamageCode(String),

    /// Level is not L, M, S, T or T+n, or cannot be used here.
    #[error("invalid damage level: {0}")]
    InvalidDamageLevel(String),
}

/// Raise a damage code by offensive successes.
///
/// The power grows by one per extra shot. The level grows one step per two
/// successes and one step per three shots; every four steps past L wrap into
/// one `T+` overflow, and any overflow replaces the base level entirely.
pub fn calculate_damage_code(
    power: u32,
    level: DamageLevel,
    shots: u32,
    successes: u32,
) -> Result<DamageCode, DamageCodeError> {
    let base = match level {
        DamageLevel::Base(severity) => severity,
        DamageLevel::Overflow(_) => {
            return Err(DamageCodeError::InvalidDamageLevel(level.to_string()));
        }
    };

    let power = power.saturating_add(shots).saturating_sub(1);
    let levels = Severity::ALL.len() as u32;
    let top = levels - 1;

    let mut index = base.index() + successes / SUCCESSES_PER_STEP + shots / SHOTS_PER_STEP;
    let mut overflow = 0;
    while index >= levels {
        overflow += 1;
        index -= levels;
    }

    // Boundary fold; index is already below the scale length here
    if index == top && overflow > 0 {
        overflow += (index - top) / 2;
    }

    let level = if overflow > 0 {
        DamageLevel::Overflow(overflow)
    } else {
        match Severity::from_index(index) {
            Some(severity) => DamageLevel::Base(severity),
            None => return Err(DamageCodeError::InvalidDamageLevel(index.to_string())),
        }
    };

    Ok(DamageCode { power, level })
}

/// Lower a damage level by defensive successes.
///
/// Two successes remove one step. `T+n` loses overflow first; whatever is left
/// over continues down from T. Dropping below L means no damage.
pub fn calculate_reduced_damage_code(level: DamageLevel, successes: u32) -> ReducedDamage {
    let mut steps = successes / SUCCESSES_PER_STEP;

    let index = match level {
        DamageLevel::Base(severity) => severity.index(),
        DamageLevel::Overflow(n) => {
            if steps <= n {
                return ReducedDamage::Level(DamageLevel::Overflow(n - steps));
            }
            steps -= n;
            Severity::Deadly.index()
        }
    };

    match index.checked_sub(steps).and_then(Severity::from_index) {
        Some(severity) => ReducedDamage::Level(DamageLevel::Base(severity)),
        None => ReducedDamage::NoDamage,
    }
}

fn is_digits(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_digit())
}

/// `[LMSTlmst](\+\d+)?`
fn is_level_shape(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if Severity::from_letter(c).is_some() => {}
        _ => return false,
    }
    let rest = chars.as_str();
    rest.is_empty() || rest.strip_prefix('+').map(is_digits).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn base(severity: Severity) -> DamageLevel {
        DamageLevel::Base(severity)
    }

    #[test]
    fn test_parse_codes() {
        assert_eq!(DamageCode::parse("8M").unwrap(), DamageCode::new(8, base(Severity::Moderate)));
        assert_eq!(DamageCode::parse("14s").unwrap(), DamageCode::new(14, base(Severity::Serious)));
        assert_eq!(DamageCode::parse("12T+2").unwrap(), DamageCode::new(12, DamageLevel::Overflow(2)));
        assert_eq!("9L".parse::<DamageCode>().unwrap().to_string(), "9L");
    }

    #[test]
    fn test_parse_rejects_malformed() {
        for bad in ["", "-", "M", "8", "8X", "8MM", "8M+", "8 M", "x8M", "8T+a"] {
            assert!(
                matches!(DamageCode::parse(bad), Err(DamageCodeError::InvalidDamageCode(_))),
                "accepted {:?}",
                bad
            );
        }
    }

    #[test]
    fn test_overflow_only_on_t() {
        assert!(matches!(
            DamageCode::parse("8M+1"),
            Err(DamageCodeError::InvalidDamageLevel(_))
        ));
    }

    #[test]
    fn test_damage_code_worked_example() {
        // 8M, one shot, two successes: M + 1 step = S
        let code = calculate_damage_code(8, base(Severity::Moderate), 1, 2).unwrap();
        assert_eq!(code.to_string(), "8S");
    }

    #[test]
    fn test_damage_code_shot_bonus() {
        // Three shots: power +2, one bonus step
        let code = calculate_damage_code(6, base(Severity::Light), 3, 0).unwrap();
        assert_eq!(code.to_string(), "8M");

        // Two shots: power +1, no bonus step
        let code = calculate_damage_code(6, base(Severity::Light), 2, 1).unwrap();
        assert_eq!(code.to_string(), "7L");
    }

    #[test]
    fn test_damage_code_overflow() {
        // S + 2 steps = index 4 -> T+1
        let code = calculate_damage_code(10, base(Severity::Serious), 1, 4).unwrap();
        assert_eq!(code.to_string(), "10T+1");

        // T + 1 step = index 4 -> T+1
        let code = calculate_damage_code(10, base(Severity::Deadly), 1, 2).unwrap();
        assert_eq!(code.level, DamageLevel::Overflow(1));

        // L + 8 steps = index 8 -> T+2
        let code = calculate_damage_code(5, base(Severity::Light), 1, 16).unwrap();
        assert_eq!(code.level, DamageLevel::Overflow(2));

        // Index 7 wraps to T with one overflow, which replaces the level
        let code = calculate_damage_code(5, base(Severity::Light), 1, 14).unwrap();
        assert_eq!(code.level, DamageLevel::Overflow(1));
    }

    #[test]
    fn test_damage_code_rejects_overflow_input() {
        assert!(calculate_damage_code(8, DamageLevel::Overflow(1), 1, 2).is_err());
    }

    #[test]
    fn test_reduced_damage_base() {
        assert_eq!(
            calculate_reduced_damage_code(base(Severity::Serious), 2),
            ReducedDamage::Level(base(Severity::Moderate))
        );
        assert_eq!(
            calculate_reduced_damage_code(base(Severity::Serious), 3),
            ReducedDamage::Level(base(Severity::Moderate))
        );
        assert_eq!(
            calculate_reduced_damage_code(base(Severity::Moderate), 4),
            ReducedDamage::NoDamage
        );
        assert_eq!(
            calculate_reduced_damage_code(base(Severity::Light), 0),
            ReducedDamage::Level(base(Severity::Light))
        );
    }

    #[test]
    fn test_reduced_damage_overflow() {
        assert_eq!(
            calculate_reduced_damage_code(DamageLevel::Overflow(3), 2),
            ReducedDamage::Level(DamageLevel::Overflow(2))
        );
        assert_eq!(
            calculate_reduced_damage_code(DamageLevel::Overflow(1), 2).to_string(),
            "T+0"
        );
        // T+1 minus two steps: one step left over below T
        assert_eq!(
            calculate_reduced_damage_code(DamageLevel::Overflow(1), 4),
            ReducedDamage::Level(base(Severity::Serious))
        );
        assert_eq!(
            calculate_reduced_damage_code(DamageLevel::Overflow(1), 12),
            ReducedDamage::NoDamage
        );
    }

    proptest! {
        #[test]
        fn prop_damage_monotonic(
            power in 0u32..30,
            level in 0u32..4,
            shots in 1u32..10,
            amount in 0u32..20,
        ) {
            let level = base(Severity::from_index(level).unwrap());
            let mut previous = calculate_damage_code(power, level, shots, 0).unwrap();
            for successes in 1..=amount {
                let next = calculate_damage_code(power, level, shots, successes).unwrap();
                prop_assert_eq!(next.power, previous.power);
                prop_assert!(next.level.rank() >= previous.level.rank());
                previous = next;
            }
        }

        #[test]
        fn prop_zero_successes_only_shot_bonus(
            power in 0u32..30,
            level in 0u32..4,
            shots in 1u32..3,
        ) {
            let level = base(Severity::from_index(level).unwrap());
            let code = calculate_damage_code(power, level, shots, 0).unwrap();
            prop_assert_eq!(code.power, power + shots - 1);
            prop_assert_eq!(code.level, level);
        }

        #[test]
        fn prop_reduction_never_raises(
            power in 0u32..30,
            level in 0u32..4,
            shots in 1u32..10,
            successes in 0u32..20,
        ) {
            let level = base(Severity::from_index(level).unwrap());
            let raised = calculate_damage_code(power, level, shots, successes).unwrap();
            let reduced = calculate_reduced_damage_code(raised.level, successes);
            if let Some(rank) = reduced.rank() {
                prop_assert!(rank <= raised.level.rank());
            }
            prop_assert_eq!(ReducedDamage::NoDamage.reduce(successes), ReducedDamage::NoDamage);
        }
    }
}
