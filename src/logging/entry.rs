//! Log entry types
//!
//! Timestamped records of controller notifications, as printed by the console.

use crate::controller::Notification;
use serde::Serialize;

/// What a notification carried
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    StatusChanged,
    TelemetryReceived,
}

/// Notification stamped with the local time it was rendered
#[derive(Debug, Clone, Serialize)]
pub struct LogEntry {
    pub at: String, // HH:MM:SS.mmm
    pub kind: EntryKind,
    pub text: String,
}

impl LogEntry {
    /// Current timestamp as HH:MM:SS.mmm
    #[inline]
    fn now() -> String {
        chrono::Local::now().format("%H:%M:%S%.3f").to_string()
    }

    pub fn from_notification(notification: Notification) -> Self {
        let (kind, text) = match notification {
            Notification::StatusChanged(text) => (EntryKind::StatusChanged, text),
            Notification::TelemetryReceived(text) => (EntryKind::TelemetryReceived, text),
        };
        Self {
            at: Self::now(),
            kind,
            text,
        }
    }

    /// One human-readable line; telemetry gets `unit` appended
    pub fn render(&self, unit: &str) -> String {
        match self.kind {
            EntryKind::StatusChanged => format!("[{}] * {}", self.at, self.text),
            EntryKind::TelemetryReceived if unit.is_empty() => {
                format!("[{}] {}", self.at, self.text)
            }
            EntryKind::TelemetryReceived => format!("[{}] {} {}", self.at, self.text, unit),
        }
    }

    /// One JSON object
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| format!("{{\"text\":{:?}}}", self.text))
    }
}
