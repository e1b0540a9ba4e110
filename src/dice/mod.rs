//! Dice resolution.
//!
//! Dice set configuration, exploding-dice chains and the engine that turns
//! platform callbacks into finished outcomes. Nothing here performs I/O.

pub mod registry;
pub mod chain;
pub mod engine;
pub mod outcome;

pub use registry::{DiceSetConfig, DiceSetRegistry, Role, RegistryError};
pub use chain::{ChainId, ChainState, DieChain, DieResult, RollChain, RollId};
pub use engine::{
    CompletedRoll, RerollRequest, Resolution, RollEngine, ThrowError, ThrowRequest,
};
pub use outcome::{reroll_note, DamageOutcome, ResultGroup, RollOutcome};
