//! Profile Storage
//!
//! The whole client state is one JSON document: dice sets, the GM's
//! initiative list, the own initiative and the recent throw log.

use std::future::Future;
use std::path::PathBuf;

use serde::{Serialize, Deserialize};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::core::expr::InitiativeExpression;
use crate::dice::registry::DiceSetConfig;
use crate::initiative::scheduler::InitiativeEntry;
use crate::network::log::LogEntry;

/// Throw log entries kept in a saved profile.
pub const THROW_DATA_LIMIT: usize = 50;

/// Own initiative: `[name, expression]`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonalInitiative(pub String, pub InitiativeExpression);

impl PersonalInitiative {
    /// Participant name.
    pub fn name(&self) -> &str {
        &self.0
    }

    /// `Xd6+Y` expression.
    pub fn expression(&self) -> InitiativeExpression {
        self.1
    }
}

/// Stored client state.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    /// Offensive dice sets.
    #[serde(default)]
    pub dice_set_list: Vec<DiceSetConfig>,
    /// Defensive dice sets.
    #[serde(default)]
    pub defence_dice_set_list: Vec<DiceSetConfig>,
    /// GM initiative list.
    #[serde(default)]
    pub initiative_data: Vec<InitiativeEntry>,
    /// Own initiative.
    #[serde(default)]
    pub personal_initiative_data: Option<PersonalInitiative>,
    /// Recent throw log.
    #[serde(default)]
    pub throw_data: Vec<LogEntry>,
}

impl Profile {
    /// Keep only the newest [`THROW_DATA_LIMIT`] log entries.
    pub fn trim_throw_data(&mut self) {
        if self.throw_data.len() > THROW_DATA_LIMIT {
            let excess = self.throw_data.len() - THROW_DATA_LIMIT;
            self.throw_data.drain(..excess);
        }
    }

    /// Serialize to JSON.
    pub fn to_json(&self) -> Result<String, ProfileError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Deserialize from JSON.
    pub fn from_json(text: &str) -> Result<Self, ProfileError> {
        Ok(serde_json::from_str(text)?)
    }
}

/// Storage errors.
#[derive(Debug, Error)]
pub enum ProfileError {
    /// Reading or writing failed.
    #[error("profile I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Document is not a profile.
    #[error("invalid profile document: {0}")]
    Format(#[from] serde_json::Error),
}

/// Load/save of the profile document.
pub trait ProfileStore: Send + Sync {
    /// Stored profile, `None` if nothing was saved yet.
    fn load(&self) -> impl Future<Output = Result<Option<Profile>, ProfileError>> + Send;

    /// Replace the stored profile. The throw log is trimmed first.
    fn save(&self, profile: &Profile) -> impl Future<Output = Result<(), ProfileError>> + Send;
}

fn trimmed_json(profile: &Profile) -> Result<String, ProfileError> {
    let mut profile = profile.clone();
    profile.trim_throw_data();
    profile.to_json()
}

/// Profile kept in a JSON file.
#[derive(Clone, Debug)]
pub struct FileProfileStore {
    path: PathBuf,
}

impl FileProfileStore {
    /// Store at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// File location.
    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

impl ProfileStore for FileProfileStore {
    async fn load(&self) -> Result<Option<Profile>, ProfileError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(text) => {
                debug!(path = %self.path.display(), bytes = text.len(), "profile loaded");
                Ok(Some(Profile::from_json(&text)?))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, profile: &Profile) -> Result<(), ProfileError> {
        let text = trimmed_json(profile)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &text).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        info!(path = %self.path.display(), "profile saved");
        Ok(())
    }
}

/// Profile kept in memory as JSON text.
#[derive(Debug, Default)]
pub struct MemoryProfileStore {
    document: Mutex<Option<String>>,
}

impl MemoryProfileStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw stored document.
    pub async fn document(&self) -> Option<String> {
        self.document.lock().await.clone()
    }
}

impl ProfileStore for MemoryProfileStore {
    async fn load(&self) -> Result<Option<Profile>, ProfileError> {
        match self.document.lock().await.as_deref() {
            Some(text) => Ok(Some(Profile::from_json(text)?)),
            None => Ok(None),
        }
    }

    async fn save(&self, profile: &Profile) -> Result<(), ProfileError> {
        let text = trimmed_json(profile)?;
        *self.document.lock().await = Some(text);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile_with_log(entries: usize) -> Profile {
        Profile {
            dice_set_list: vec![DiceSetConfig::new("Pistol", 4, 3, "8M", 1)],
            throw_data: (0..entries).map(|i| LogEntry::new("Kira", "p1", i.to_string())).collect(),
            ..Profile::default()
        }
    }

    #[test]
    fn test_trim_keeps_newest() {
        let mut profile = profile_with_log(60);
        profile.trim_throw_data();
        assert_eq!(profile.throw_data.len(), THROW_DATA_LIMIT);
        assert_eq!(profile.throw_data[0].log, "10");
    }

    #[test]
    fn test_field_names() {
        let mut profile = profile_with_log(1);
        profile.personal_initiative_data = Some(PersonalInitiative(
            "Kira".to_string(),
            InitiativeExpression::parse("1d6+10").unwrap(),
        ));
        let json: serde_json::Value = serde_json::from_str(&profile.to_json().unwrap()).unwrap();
        assert!(json["diceSetList"].is_array());
        assert!(json["defenceDiceSetList"].is_array());
        assert!(json["initiativeData"].is_array());
        assert_eq!(json["personalInitiativeData"][0], "Kira");
        assert_eq!(json["personalInitiativeData"][1], "1d6+10");
        assert_eq!(json["throwData"][0]["playerName"], "Kira");
    }

    #[test]
    fn test_missing_fields_default() {
        let profile = Profile::from_json(r#"{"diceSetList":[]}"#).unwrap();
        assert_eq!(profile, Profile::default());
        assert!(Profile::from_json("42").is_err());
    }

    #[tokio::test]
    async fn test_memory_store_trims_on_save() {
        let store = MemoryProfileStore::new();
        assert!(store.load().await.unwrap().is_none());

        store.save(&profile_with_log(70)).await.unwrap();
        let loaded = store.load().await.unwrap().unwrap();
        assert_eq!(loaded.throw_data.len(), THROW_DATA_LIMIT);
        assert_eq!(loaded.dice_set_list[0].name, "Pistol");
    }

    #[tokio::test]
    async fn test_file_store_round_trip() {
        let path = std::env::temp_dir().join(format!("combat-helm-{}.json", uuid::Uuid::new_v4()));
        let store = FileProfileStore::new(&path);
        assert!(store.load().await.unwrap().is_none());

        store.save(&profile_with_log(3)).await.unwrap();
        let loaded = store.load().await.unwrap().unwrap();
        assert_eq!(loaded.throw_data.len(), 3);

        tokio::fs::remove_file(&path).await.unwrap();
    }
}
