//! Throw Log
//!
//! The shared, visible list of throw results. Every client keeps its own
//! copy, fed by `dicelog` envelopes; entries are display-ordered only.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Serialize, Deserialize};

use crate::core::hash::colour_tag;

/// Default number of entries kept.
pub const DEFAULT_LOG_CAPACITY: usize = 50;

/// Characters of the player name shown in front of an entry.
const DISPLAY_NAME_CHARS: usize = 10;

/// One log line.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    /// Sender name, as reported by the transport.
    pub player_name: String,
    /// Sender id, as reported by the transport.
    pub player_id: String,
    /// Log text.
    pub log: String,
    /// Local receive time.
    pub received_at: DateTime<Utc>,
    /// `#rrggbb` tag derived from the player name.
    pub colour: String,
}

impl LogEntry {
    /// Entry received now.
    pub fn new(player_name: impl Into<String>, player_id: impl Into<String>, log: impl Into<String>) -> Self {
        let player_name = player_name.into();
        Self {
            colour: colour_tag(&player_name),
            player_name,
            player_id: player_id.into(),
            log: log.into(),
            received_at: Utc::now(),
        }
    }

    /// Player name cut to display length.
    pub fn display_name(&self) -> String {
        self.player_name.chars().take(DISPLAY_NAME_CHARS).collect()
    }

    /// `[hh:mm:ss] name: text`
    pub fn render(&self) -> String {
        format!("[{}] {}: {}", self.received_at.format("%H:%M:%S"), self.display_name(), self.log)
    }
}

/// Bounded log, oldest entries evicted first.
#[derive(Clone, Debug)]
pub struct ThrowLog {
    entries: VecDeque<LogEntry>,
    capacity: usize,
}

impl Default for ThrowLog {
    fn default() -> Self {
        Self::new(DEFAULT_LOG_CAPACITY)
    }
}

impl ThrowLog {
    /// Empty log holding at most `capacity` entries.
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    /// Log seeded with stored entries; only the newest fit.
    pub fn with_entries(capacity: usize, entries: Vec<LogEntry>) -> Self {
        let mut log = Self::new(capacity);
        for entry in entries {
            log.append(entry);
        }
        log
    }

    /// Append an entry. Returns the evicted one, if any.
    pub fn append(&mut self, entry: LogEntry) -> Option<LogEntry> {
        let evicted = if self.entries.len() >= self.capacity {
            self.entries.pop_front()
        } else {
            None
        };
        self.entries.push_back(entry);
        evicted
    }

    /// Entries, oldest first.
    pub fn entries(&self) -> impl Iterator<Item = &LogEntry> {
        self.entries.iter()
    }

    /// Entries whose player name starts with `prefix`, ignoring case.
    /// An empty prefix matches everything.
    pub fn filter(&self, prefix: &str) -> Vec<&LogEntry> {
        let prefix = prefix.trim().to_lowercase();
        self.entries
            .iter()
            .filter(|e| prefix.is_empty() || e.player_name.trim().to_lowercase().starts_with(&prefix))
            .collect()
    }

    /// Copy of all entries, oldest first.
    pub fn to_vec(&self) -> Vec<LogEntry> {
        self.entries.iter().cloned().collect()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// No entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Maximum number of entries.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capacity_evicts_oldest() {
        let mut log = ThrowLog::new(3);
        for i in 0..3 {
            assert!(log.append(LogEntry::new("Kira", "p1", format!("roll {}", i))).is_none());
        }
        let evicted = log.append(LogEntry::new("Kira", "p1", "roll 3")).unwrap();
        assert_eq!(evicted.log, "roll 0");
        assert_eq!(log.len(), 3);
        assert_eq!(log.entries().next().unwrap().log, "roll 1");
    }

    #[test]
    fn test_filter_by_prefix() {
        let mut log = ThrowLog::default();
        log.append(LogEntry::new("Kira", "p1", "a"));
        log.append(LogEntry::new("Ash", "p2", "b"));
        log.append(LogEntry::new("kiran", "p3", "c"));

        let kira: Vec<&str> = log.filter("KI").iter().map(|e| e.log.as_str()).collect();
        assert_eq!(kira, vec!["a", "c"]);
        assert_eq!(log.filter("").len(), 3);
        assert!(log.filter("zed").is_empty());
    }

    #[test]
    fn test_entry_render() {
        let entry = LogEntry::new("Maximilian the Bold", "p9", "Pistol => 3 D6: 2 success(es)");
        assert_eq!(entry.display_name(), "Maximilian");
        assert!(entry.render().ends_with("Maximilian: Pistol => 3 D6: 2 success(es)"));
        assert_eq!(entry.colour, colour_tag("Maximilian the Bold"));
    }

    #[test]
    fn test_with_entries_keeps_newest() {
        let entries = (0..5).map(|i| LogEntry::new("Ash", "p2", i.to_string())).collect();
        let log = ThrowLog::with_entries(2, entries);
        let texts: Vec<String> = log.entries().map(|e| e.log.clone()).collect();
        assert_eq!(texts, vec!["3", "4"]);
    }
}
