use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Severity used to classify an entry for display.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    #[default]
    Debug,
}

impl LogLevel {
    /// Case-insensitive; anything unrecognised is classified as `Debug`.
    pub fn classify(raw: Option<&str>) -> Self {
        match raw.map(|s| s.trim().to_ascii_uppercase()).as_deref() {
            Some("ERROR") => LogLevel::Error,
            Some("WARN") => LogLevel::Warn,
            Some("INFO") => LogLevel::Info,
            _ => LogLevel::Debug,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Error => "ERROR",
            LogLevel::Warn => "WARN",
            LogLevel::Info => "INFO",
            LogLevel::Debug => "DEBUG",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for LogLevel {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        // Non-string levels (numbers, null) are classified too rather than rejected.
        let raw = serde_json::Value::deserialize(deserializer)?;
        Ok(LogLevel::classify(raw.as_str()))
    }
}

/// Identity of a log event across transports.
pub type DedupKey = (String, String);

/// A single log record as reported by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    #[serde(default)]
    pub level: LogLevel,
    /// Server-assigned; never parsed or reordered here.
    pub timestamp: String,
    pub message: String,
}

impl LogEntry {
    #[cfg(test)]
    pub fn new(level: LogLevel, timestamp: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level,
            timestamp: timestamp.into(),
            message: message.into(),
        }
    }

    pub fn dedup_key(&self) -> DedupKey {
        (self.timestamp.clone(), self.message.clone())
    }
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] [{}] {}", self.level, self.timestamp, self.message)
    }
}
