//! Name Hashing
//!
//! Stable colour tags for throw-log entries. Every client derives the same
//! tag for the same player name, so the shared log looks identical everywhere.

use sha2::{Sha256, Digest};

/// Colour used when a name is too short to derive a tag from.
pub const FALLBACK_COLOUR: &str = "#bc0d0d";

/// Number of leading characters that feed the colour tag.
const COLOUR_KEY_CHARS: usize = 3;

/// Derive a `#rrggbb` colour tag from a player name.
///
/// Only the first three characters count, so "Kira" and "Kiran" share a colour.
pub fn colour_tag(name: &str) -> String {
    let key: String = name.chars().take(COLOUR_KEY_CHARS).collect();
    if key.chars().count() < COLOUR_KEY_CHARS {
        return FALLBACK_COLOUR.to_string();
    }

    let mut hasher = Sha256::new();
    hasher.update(b"COMBAT_HELM_COLOUR_V1");
    hasher.update(key.to_lowercase().as_bytes());
    let hash = hasher.finalize();

    format!("#{}", hex::encode(&hash[..3]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_colour_tag_format() {
        let tag = colour_tag("Valkyrie");
        assert_eq!(tag.len(), 7);
        assert!(tag.starts_with('#'));
        assert!(tag[1..].chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_colour_tag_uses_prefix() {
        assert_eq!(colour_tag("Kira"), colour_tag("Kiran"));
        assert_eq!(colour_tag("kira"), colour_tag("KIRA"));
        assert_ne!(colour_tag("Kira"), colour_tag("Zed the Fixer"));
    }

    #[test]
    fn test_short_name_fallback() {
        assert_eq!(colour_tag("Jo"), FALLBACK_COLOUR);
        assert_eq!(colour_tag(""), FALLBACK_COLOUR);
    }
}
