//! # Combat Helm
//!
//! Tabletop combat companion: exploding-d6 throws, damage codes, karma
//! rerolls, a shared throw log and GM-driven initiative, synchronised
//! between clients over a one-way message bus.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       COMBAT HELM                            │
//! ├─────────────────────────────────────────────────────────────┤
//! │  core/           - Pure primitives                           │
//! │  ├── damage.rs   - Damage codes, raise and reduce            │
//! │  ├── expr.rs     - Initiative dice expressions               │
//! │  ├── rng.rs      - Seeded Xorshift128+ PRNG                  │
//! │  └── hash.rs     - Player colour tags                        │
//! │                                                              │
//! │  dice/           - Throw resolution (no I/O)                 │
//! │  ├── registry.rs - Offense and defence dice sets             │
//! │  ├── chain.rs    - Exploding dice chains                     │
//! │  ├── engine.rs   - Roll tracking, rerolls, karma             │
//! │  └── outcome.rs  - Finished throws and their messages        │
//! │                                                              │
//! │  initiative/     - Turn order (no I/O)                       │
//! │  ├── scheduler.rs- Participants, rounds, penalties           │
//! │  └── table.rs    - Rendered wire table                       │
//! │                                                              │
//! │  network/        - Host edge (async)                         │
//! │  ├── protocol.rs - Sync envelopes                            │
//! │  ├── router.rs   - Inbound dispatch, GM gating               │
//! │  ├── platform.rs - Dice, bus, chat, identity traits          │
//! │  ├── loopback.rs - In-process collaborators                  │
//! │  ├── log.rs      - Shared throw log                          │
//! │  └── session.rs  - One connected client                      │
//! │                                                              │
//! │  config.rs       - Runtime settings                          │
//! │  storage.rs      - Profile document                          │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Roll Lifecycle
//!
//! A throw becomes a chain tracked under the platform's roll id. Sixes
//! explode: the engine asks for rerolls and the chain moves to the new id
//! while keeping its dice. When nothing explodes any more the chain is
//! finalized into successes and a damage code, or a plain sum for open
//! throws. Results for ids the engine does not know are ignored, so
//! duplicate or foreign callbacks do no harm.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod config;
pub mod core;
pub mod dice;
pub mod initiative;
pub mod network;
pub mod storage;

// Re-export commonly used types
pub use config::HelmConfig;
pub use core::damage::{calculate_damage_code, calculate_reduced_damage_code, DamageCode, DamageLevel};
pub use core::rng::DeterministicRng;
pub use dice::{DiceSetConfig, DiceSetRegistry, Role, RollEngine, RollOutcome};
pub use initiative::{InitiativeScheduler, InitiativeTable, TurnHint};
pub use network::{CombatHelm, Envelope, HelmError, HelmEvent, SyncRouter};
pub use storage::{FileProfileStore, Profile, ProfileStore};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
