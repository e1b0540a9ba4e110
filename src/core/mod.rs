//! Core primitives.
//!
//! Pure, synchronous building blocks: damage-code arithmetic, initiative
//! expressions, the seeded dice generator and name hashing.

pub mod damage;
pub mod expr;
pub mod rng;
pub mod hash;

// Re-export core types
pub use damage::{
    DamageCode, DamageLevel, Severity, ReducedDamage, DamageCodeError,
    calculate_damage_code, calculate_reduced_damage_code, NO_DAMAGE_CODE,
};
pub use expr::{InitiativeExpression, ExpressionError};
pub use rng::{DeterministicRng, DIE_FACES};
pub use hash::colour_tag;
