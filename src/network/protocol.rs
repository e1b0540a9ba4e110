//! Protocol Messages
//!
//! Wire format for the peer sync bus. Every payload is a flat JSON object
//! with a `type` discriminator; the remaining fields depend on the type.
//! There is no version field and no acknowledgement.
//!
//! Numbers typed into GM forms may arrive as strings, so numeric fields are
//! read leniently.

use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

use crate::dice::registry::DiceSetConfig;
use crate::core::damage::NO_DAMAGE_CODE;

/// Opaque per-connection id.
pub type ClientId = String;

// =============================================================================
// ENVELOPES
// =============================================================================

/// Known envelope kinds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Envelope {
    /// GM assigns an offensive throw.
    #[serde(rename = "off")]
    Offense(ThrowAssignment),

    /// GM assigns an open throw.
    #[serde(rename = "open")]
    Open(ThrowAssignment),

    /// GM assigns a defence throw.
    #[serde(rename = "dev")]
    Defence(ThrowAssignment),

    /// Throw log line.
    #[serde(rename = "dicelog")]
    DiceLog(DiceLog),

    /// A participant reports their own initiative to the GMs.
    #[serde(rename = "setini")]
    SetInitiative(SetInitiative),

    /// Rendered initiative table.
    #[serde(rename = "fetchini")]
    FetchInitiative(FetchInitiative),

    /// Glitch effect.
    #[serde(rename = "glitch")]
    Glitch {
        /// Effect command.
        command: String,
    },

    /// Start of a hacking minigame.
    #[serde(rename = "hack")]
    Hack {
        /// Difficulty.
        #[serde(rename = "diff", deserialize_with = "lenient_u32")]
        difficulty: u32,
        /// Allowed attempts.
        #[serde(deserialize_with = "lenient_u32")]
        attempts: u32,
    },

    /// End of a hacking minigame.
    #[serde(rename = "endHack")]
    EndHack {
        /// Whether it was solved.
        #[serde(rename = "succ")]
        success: bool,
    },
}

impl Envelope {
    /// Wire `type` of this envelope.
    pub fn kind(&self) -> &'static str {
        match self {
            Envelope::Offense(_) => "off",
            Envelope::Open(_) => "open",
            Envelope::Defence(_) => "dev",
            Envelope::DiceLog(_) => "dicelog",
            Envelope::SetInitiative(_) => "setini",
            Envelope::FetchInitiative(_) => "fetchini",
            Envelope::Glitch { .. } => "glitch",
            Envelope::Hack { .. } => "hack",
            Envelope::EndHack { .. } => "endHack",
        }
    }

    /// Kind names this build understands.
    pub const KNOWN_KINDS: [&'static str; 9] = [
        "off", "open", "dev", "dicelog", "setini", "fetchini", "glitch", "hack", "endHack",
    ];
}

/// A decoded inbound payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// Known kind.
    Known(Envelope),
    /// Well-formed, but the kind is not understood.
    Unknown {
        /// Received `type`.
        kind: String,
    },
}

/// Throw profile sent by a GM.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThrowAssignment {
    /// Dice set name.
    pub name: String,
    /// Threshold.
    #[serde(rename = "mw", default, deserialize_with = "lenient_u32")]
    pub threshold: u32,
    /// Dice amount.
    #[serde(deserialize_with = "lenient_u32")]
    pub amount: u32,
    /// Damage code or `-`.
    #[serde(rename = "dmg", default = "no_damage")]
    pub damage_code: String,
    /// Shot count.
    #[serde(rename = "bullets", default = "one", deserialize_with = "lenient_u32")]
    pub shots: u32,
}

fn no_damage() -> String {
    NO_DAMAGE_CODE.to_string()
}

fn one() -> u32 {
    1
}

impl ThrowAssignment {
    /// Assignment from a dice set.
    pub fn from_set(set: &DiceSetConfig) -> Self {
        Self {
            name: set.name.clone(),
            threshold: set.threshold,
            amount: set.amount,
            damage_code: set.damage_code.clone(),
            shots: set.shots,
        }
    }

    /// Dice set as stored by the receiver.
    pub fn to_set(&self) -> DiceSetConfig {
        DiceSetConfig::new(
            self.name.clone(),
            self.threshold,
            self.amount,
            self.damage_code.clone(),
            self.shots.max(1),
        )
    }
}

/// Log line; the receiver stamps the sender fields from the transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiceLog {
    /// Log text.
    pub log: String,
    /// Sender name, never trusted from the payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub player_name: Option<String>,
    /// Sender id, never trusted from the payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub player_id: Option<String>,
}

impl DiceLog {
    /// Outbound log line.
    pub fn new(log: impl Into<String>) -> Self {
        Self {
            log: log.into(),
            player_name: None,
            player_id: None,
        }
    }
}

/// `[label, total]` where label looks like `Initiative: "Kira"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitiativeReport(
    pub String,
    #[serde(deserialize_with = "lenient_u32")] pub u32,
);

impl InitiativeReport {
    /// Name between the first pair of double quotes of the label.
    pub fn participant(&self) -> Option<&str> {
        let start = self.0.find('"')? + 1;
        let len = self.0[start..].find('"')?;
        let name = &self.0[start..start + len];
        (!name.is_empty()).then_some(name)
    }
}

/// Own initiative sent to the GMs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetInitiative {
    /// Label and total.
    pub message: InitiativeReport,
}

/// Rendered table, rows joined by `<br>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchInitiative {
    /// Table text; empty when no table exists.
    #[serde(default)]
    pub message: String,
}

// =============================================================================
// TRANSPORT
// =============================================================================

/// Who a payload goes to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "ids", rename_all = "snake_case")]
pub enum Recipients {
    /// Every connected client.
    Board,
    /// Clients with GM rights.
    Gms,
    /// Specific connections.
    Clients(Vec<ClientId>),
}

impl Recipients {
    /// Narrow-cast to one connection.
    pub fn client(id: impl Into<ClientId>) -> Self {
        Recipients::Clients(vec![id.into()])
    }
}

/// Sender as verified by the transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sender {
    /// Connection id.
    pub client_id: ClientId,
    /// Player id.
    pub player_id: String,
    /// Player display name.
    pub player_name: String,
}

/// A payload as delivered by the bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncMessage {
    /// Verified sender.
    pub sender: Sender,
    /// Raw JSON text.
    pub payload: String,
}

// =============================================================================
// ENCODING
// =============================================================================

/// Protocol errors.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Not JSON, or fields of a known kind are wrong.
    #[error("malformed payload: {0}")]
    Malformed(#[from] serde_json::Error),

    /// Valid JSON without a string `type`.
    #[error("payload has no type")]
    MissingType,
}

/// Encode an envelope.
pub fn encode(envelope: &Envelope) -> Result<String, ProtocolError> {
    Ok(serde_json::to_string(envelope)?)
}

/// Decode a payload. Unknown kinds are not an error.
pub fn decode(payload: &str) -> Result<Inbound, ProtocolError> {
    let value: serde_json::Value = serde_json::from_str(payload)?;
    let kind = value
        .get("type")
        .and_then(|t| t.as_str())
        .ok_or(ProtocolError::MissingType)?
        .to_string();

    if !Envelope::KNOWN_KINDS.contains(&kind.as_str()) {
        return Ok(Inbound::Unknown { kind });
    }
    Ok(Inbound::Known(serde_json::from_value(value)?))
}

/// Number or numeric string.
fn lenient_u32<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::Number(n) => n
            .as_u64()
            .and_then(|n| u32::try_from(n).ok())
            .ok_or_else(|| D::Error::custom(format!("not a count: {}", n))),
        serde_json::Value::String(s) if s.trim().is_empty() => Ok(0),
        serde_json::Value::String(s) => s
            .trim()
            .parse()
            .map_err(|_| D::Error::custom(format!("not a count: {:?}", s))),
        other => Err(D::Error::custom(format!("not a count: {}", other))),
    }
}
