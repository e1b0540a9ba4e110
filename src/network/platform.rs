//! Host Collaborators
//!
//! The host application provides dice rolling, the sync bus, chat and the
//! identity directory. The session only sees these traits.

use std::future::Future;

use serde::{Serialize, Deserialize};
use thiserror::Error;

use crate::dice::chain::RollId;
use crate::dice::outcome::ResultGroup;
use super::protocol::{ClientId, Recipients};

/// Dice platform errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlatformError {
    /// Roll could not be put in the tray.
    #[error("roll submission failed: {0}")]
    SubmitFailed(String),

    /// Result display failed.
    #[error("result display failed: {0}")]
    DisplayFailed(String),

    /// Identity lookup failed.
    #[error("identity lookup failed: {0}")]
    Identity(String),
}

/// Sync bus and chat errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BusError {
    /// Nothing could be sent.
    #[error("send failed: {0}")]
    SendFailed(String),

    /// Bus is shut down.
    #[error("bus closed")]
    Closed,
}

/// Performs physical rolls.
pub trait DicePlatform: Send + Sync {
    /// Put dice in the tray; returns the roll id results will carry.
    fn submit_roll(
        &self,
        label: &str,
        expression: &str,
    ) -> impl Future<Output = Result<RollId, PlatformError>> + Send;

    /// Show result groups to everyone.
    fn show_result(&self, groups: &[ResultGroup]) -> impl Future<Output = Result<(), PlatformError>> + Send;
}

/// One-way pub/sub between clients.
pub trait SyncBus: Send + Sync {
    /// Fire and forget.
    fn publish(&self, payload: String, recipients: &Recipients) -> impl Future<Output = Result<(), BusError>> + Send;
}

/// Human-readable chat.
pub trait ChatChannel: Send + Sync {
    /// Send a chat line.
    fn send_chat(&self, text: &str, target: &Recipients) -> impl Future<Output = Result<(), BusError>> + Send;
}

/// Who the local client is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Connection id.
    pub client_id: ClientId,
    /// Player id.
    pub player_id: String,
    /// Display name.
    pub player_name: String,
    /// GM rights.
    pub can_gm: bool,
}

/// Resolves the local identity, once at startup.
pub trait IdentityDirectory: Send + Sync {
    /// Local identity.
    fn whoami(&self) -> impl Future<Output = Result<Identity, PlatformError>> + Send;
}

/// Asynchronous notifications from the dice platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlatformEvent {
    /// Faces of a roll.
    RollResults {
        /// Roll id.
        roll_id: RollId,
        /// Result groups.
        groups: Vec<ResultGroup>,
    },
    /// Roll was removed before it resolved.
    RollRemoved {
        /// Roll id.
        roll_id: RollId,
    },
}
