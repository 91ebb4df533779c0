//! Activity feed and console log.
//!
//! Both are insertion-ordered and append-only; entries are never mutated
//! after they are created.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// ActivityItem
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityKind {
    Stt,
    Agent,
    Tts,
    Tool,
}

/// One entry of the activity feed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActivityItem {
    pub id: Uuid,
    pub kind: ActivityKind,
    pub label: String,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub args: Option<serde_json::Value>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct ActivityLog {
    items: Vec<ActivityItem>,
}

impl ActivityLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry and return a copy of it for notification.
    pub fn add(
        &mut self,
        kind: ActivityKind,
        label: impl Into<String>,
        text: impl Into<String>,
        args: Option<serde_json::Value>,
    ) -> ActivityItem {
        let item = ActivityItem {
            id: Uuid::new_v4(),
            kind,
            label: label.into(),
            text: text.into(),
            args,
            timestamp: Utc::now(),
        };
        self.items.push(item.clone());
        item
    }

    pub fn items(&self) -> &[ActivityItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }
}

// ---------------------------------------------------------------------------
// LogStream
// ---------------------------------------------------------------------------

/// One user-visible console line.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogEntry {
    pub id: Uuid,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

/// Session console shown to the user.  Separate from the `log` facade, which
/// is for diagnostics.
#[derive(Debug, Clone, Default)]
pub struct LogStream {
    entries: Vec<LogEntry>,
}

impl LogStream {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn log(&mut self, message: impl Into<String>) -> LogEntry {
        let entry = LogEntry {
            id: Uuid::new_v4(),
            message: message.into(),
            timestamp: Utc::now(),
        };
        self.entries.push(entry.clone());
        entry
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

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn activity_preserves_insertion_order() {
        let mut log = ActivityLog::new();
        log.add(ActivityKind::Stt, "Transcription", "hello", None);
        log.add(ActivityKind::Agent, "Agent Response", "Hi", None);
        let kinds: Vec<_> = log.items().iter().map(|i| i.kind).collect();
        assert_eq!(kinds, vec![ActivityKind::Stt, ActivityKind::Agent]);
    }

    #[test]
    fn ids_are_unique() {
        let mut log = ActivityLog::new();
        let a = log.add(ActivityKind::Tool, "a", "", None);
        let b = log.add(ActivityKind::Tool, "b", "", None);
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn activity_serializes_kind_lowercase_and_skips_missing_args() {
        let mut log = ActivityLog::new();
        let item = log.add(ActivityKind::Tool, "Tool called: search", "x", None);
        let v = serde_json::to_value(&item).unwrap();
        assert_eq!(v["kind"], "tool");
        assert!(v.get("args").is_none());

        let item = log.add(ActivityKind::Tool, "t", "x", Some(json!({"q": 1})));
        let v = serde_json::to_value(&item).unwrap();
        assert_eq!(v["args"]["q"], 1);
    }

    #[test]
    fn log_stream_appends_and_clears() {
        let mut logs = LogStream::new();
        logs.log("Session started.");
        logs.log("Audio capture started.");
        assert_eq!(logs.len(), 2);
        assert_eq!(logs.entries()[1].message, "Audio capture started.");
        logs.clear();
        assert!(logs.is_empty());
    }
}
