//! Sync Router
//!
//! Stateless inbound dispatch. A payload is decoded, checked against the
//! local client's rights and turned into one [`Dispatch`] for the session to
//! apply. Anything undecodable, unknown or not permitted is logged and
//! dropped; nothing here ever fails the caller.

use tracing::{debug, warn};

use crate::dice::registry::{DiceSetConfig, Role};
use crate::initiative::table::InitiativeTable;
use super::log::LogEntry;
use super::protocol::{decode, Envelope, Inbound, SyncMessage};

/// What an inbound payload asks the local client to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    /// Add a dice set assigned by a GM.
    AssignThrow {
        /// Target list.
        role: Role,
        /// The set.
        set: DiceSetConfig,
    },
    /// Append to the throw log.
    AppendLog(LogEntry),
    /// Enter a participant's reported initiative.
    SetInitiative {
        /// Participant.
        name: String,
        /// Reported total.
        total: u32,
    },
    /// Replace the displayed initiative table.
    ReplaceTable(InitiativeTable),
    /// Glitch effect.
    Glitch {
        /// Effect command.
        command: String,
    },
    /// Hacking minigame started.
    HackStarted {
        /// Difficulty.
        difficulty: u32,
        /// Allowed attempts.
        attempts: u32,
    },
    /// Hacking minigame ended.
    HackEnded {
        /// Solved.
        success: bool,
    },
}

/// Inbound dispatcher.
#[derive(Debug, Clone, Copy, Default)]
pub struct SyncRouter {
    is_gm: bool,
}

impl SyncRouter {
    /// Router for a client with or without GM rights.
    pub fn new(is_gm: bool) -> Self {
        Self { is_gm }
    }

    /// Whether privileged kinds are accepted.
    pub fn is_gm(&self) -> bool {
        self.is_gm
    }

    /// Route one delivered payload.
    pub fn route(&self, message: &SyncMessage) -> Option<Dispatch> {
        let envelope = match decode(&message.payload) {
            Ok(Inbound::Known(envelope)) => envelope,
            Ok(Inbound::Unknown { kind }) => {
                warn!(kind = %kind, from = %message.sender.player_name, "unknown envelope type dropped");
                return None;
            }
            Err(e) => {
                warn!(error = %e, from = %message.sender.player_name, "undecodable payload dropped");
                return None;
            }
        };

        debug!(kind = envelope.kind(), from = %message.sender.player_name, "envelope received");

        match envelope {
            Envelope::Offense(assignment) => Some(Dispatch::AssignThrow {
                role: Role::Offense,
                set: assignment.to_set(),
            }),
            Envelope::Open(assignment) => Some(Dispatch::AssignThrow {
                role: Role::Offense,
                set: DiceSetConfig::open_throw(assignment.name, assignment.amount),
            }),
            Envelope::Defence(assignment) => Some(Dispatch::AssignThrow {
                role: Role::Defence,
                set: assignment.to_set(),
            }),
            Envelope::DiceLog(log) => {
                // Sender identity comes from the transport only
                Some(Dispatch::AppendLog(LogEntry::new(
                    message.sender.player_name.clone(),
                    message.sender.player_id.clone(),
                    log.log,
                )))
            }
            Envelope::SetInitiative(set) => {
                if !self.is_gm {
                    debug!("setini ignored without GM rights");
                    return None;
                }
                match set.message.participant() {
                    Some(name) => Some(Dispatch::SetInitiative {
                        name: name.to_string(),
                        total: set.message.1,
                    }),
                    None => {
                        warn!(label = %set.message.0, "setini without a quoted name dropped");
                        None
                    }
                }
            }
            Envelope::FetchInitiative(fetch) => {
                Some(Dispatch::ReplaceTable(InitiativeTable::parse(&fetch.message)))
            }
            Envelope::Glitch { command } => Some(Dispatch::Glitch { command }),
            Envelope::Hack { difficulty, attempts } => {
                Some(Dispatch::HackStarted { difficulty, attempts })
            }
            Envelope::EndHack { success } => Some(Dispatch::HackEnded { success }),
        }
    }
}
