use crate::log_entry::{DedupKey, LogEntry};
use crate::status::Status;
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Insertion-ordered, deduplicated log entries. Only `clear` shrinks it.
#[derive(Debug, Default)]
pub struct LogCollection {
    entries: Vec<LogEntry>,
    keys: HashSet<DedupKey>,
}

impl LogCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends the entry unless one with the same dedup key is already present.
    pub fn merge(&mut self, entry: LogEntry) -> bool {
        if !self.keys.insert(entry.dedup_key()) {
            return false;
        }
        self.entries.push(entry);
        true
    }

    /// Returns how many entries were new.
    pub fn merge_all<I>(&mut self, entries: I) -> usize
    where
        I: IntoIterator<Item = LogEntry>,
    {
        entries
            .into_iter()
            .filter(|entry| self.merge(entry.clone()))
            .count()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.keys.clear();
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Which transport, if any, currently feeds the collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    ConnectingPush,
    PushActive,
    PollActive,
}

/// Body of `GET /logs`. Elements are kept raw so that one bad entry does not
/// cost the whole list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogsResponse {
    #[serde(default)]
    pub logs: Option<Vec<serde_json::Value>>,
}

impl LogsResponse {
    /// Decodes every element, dropping the ones that are not log entries.
    pub fn into_entries(self) -> Vec<LogEntry> {
        self.logs
            .unwrap_or_default()
            .into_iter()
            .filter_map(|raw| match serde_json::from_value::<LogEntry>(raw.clone()) {
                Ok(entry) => Some(entry),
                Err(e) => {
                    debug!("Dropping malformed log entry: {} ({})", e, raw);
                    None
                }
            })
            .collect()
    }
}

/// What observers of a session see after every state change.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub entries: Vec<LogEntry>,
    pub status: Status,
    pub last_error: Option<String>,
    /// Bumped on every successful clear so observers can reset their cursor.
    pub clear_count: u64,
}

impl Default for Snapshot {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            status: Status::Disconnected,
            last_error: None,
            clear_count: 0,
        }
    }
}
