//! Session configuration.

use std::path::PathBuf;

use chrono::Utc;

use crate::core::rng::{derive_seed, DeterministicRng};
use crate::network::log::DEFAULT_LOG_CAPACITY;

/// Runtime settings of a [`CombatHelm`](crate::network::session::CombatHelm).
#[derive(Clone, Debug)]
pub struct HelmConfig {
    /// Send results to the GMs only, without log broadcast.
    pub gm_mode: bool,
    /// Stop exploding dice once a single face already beats the threshold.
    pub avoid_unneeded_explosion: bool,
    /// Throw log length.
    pub log_capacity: usize,
    /// Where the file profile store keeps its JSON document.
    pub profile_path: PathBuf,
    /// Fixed seed for initiative rolls; random when unset.
    pub rng_seed: Option<u64>,
    /// Presentation event buffer.
    pub event_buffer: usize,
}

impl Default for HelmConfig {
    fn default() -> Self {
        Self {
            gm_mode: false,
            avoid_unneeded_explosion: false,
            log_capacity: DEFAULT_LOG_CAPACITY,
            profile_path: PathBuf::from("combat-helm-profile.json"),
            rng_seed: None,
            event_buffer: 256,
        }
    }
}

fn flag(value: Option<String>) -> Option<bool> {
    value.map(|v| v == "true" || v == "1")
}

impl HelmConfig {
    /// Create config from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Create config from any `HELM_*` variable source.
    pub fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            gm_mode: flag(var("HELM_GM_MODE")).unwrap_or(defaults.gm_mode),
            avoid_unneeded_explosion: flag(var("HELM_AVOID_UNNEEDED_EXPLOSION"))
                .unwrap_or(defaults.avoid_unneeded_explosion),
            log_capacity: var("HELM_LOG_CAPACITY")
                .and_then(|v| v.parse().ok())
                .filter(|&n: &usize| n > 0)
                .unwrap_or(defaults.log_capacity),
            profile_path: var("HELM_PROFILE_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.profile_path),
            rng_seed: var("HELM_RNG_SEED").and_then(|v| v.parse().ok()),
            event_buffer: defaults.event_buffer,
        }
    }

    /// Generator for initiative rolls of the client called `label`.
    pub fn rng(&self, label: &str) -> DeterministicRng {
        match self.rng_seed {
            Some(seed) => DeterministicRng::new(seed ^ derive_seed(label)),
            None => {
                let now = Utc::now().timestamp_nanos_opt().unwrap_or_default() as u64;
                DeterministicRng::new(now ^ derive_seed(label))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = HelmConfig::default();
        assert!(!config.gm_mode);
        assert!(!config.avoid_unneeded_explosion);
        assert_eq!(config.log_capacity, 50);
        assert!(config.rng_seed.is_none());
    }

    fn lookup(vars: &[(&str, &str)]) -> HelmConfig {
        let vars: HashMap<String, String> =
            vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        HelmConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_from_lookup() {
        let config = lookup(&[
            ("HELM_GM_MODE", "true"),
            ("HELM_AVOID_UNNEEDED_EXPLOSION", "1"),
            ("HELM_LOG_CAPACITY", "20"),
            ("HELM_PROFILE_PATH", "/tmp/kira.json"),
            ("HELM_RNG_SEED", "42"),
        ]);
        assert!(config.gm_mode);
        assert!(config.avoid_unneeded_explosion);
        assert_eq!(config.log_capacity, 20);
        assert_eq!(config.profile_path, PathBuf::from("/tmp/kira.json"));
        assert_eq!(config.rng_seed, Some(42));
    }

    #[test]
    fn test_from_lookup_rejects_bad_values() {
        let config = lookup(&[
            ("HELM_GM_MODE", "yes"),
            ("HELM_LOG_CAPACITY", "0"),
            ("HELM_RNG_SEED", "-3"),
        ]);
        assert!(!config.gm_mode);
        assert_eq!(config.log_capacity, DEFAULT_LOG_CAPACITY);
        assert_eq!(config.rng_seed, None);

        assert_eq!(lookup(&[("HELM_LOG_CAPACITY", "many")]).log_capacity, DEFAULT_LOG_CAPACITY);
        assert_eq!(lookup(&[]).profile_path, HelmConfig::default().profile_path);
    }

    #[test]
    fn test_seeded_rng_is_reproducible() {
        let config = HelmConfig {
            rng_seed: Some(99),
            ..HelmConfig::default()
        };
        assert_eq!(config.rng("gm").roll_d6(8), config.rng("gm").roll_d6(8));
    }
}
