use chrono::{DateTime, Utc};
use courier_core::Priority;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Default retry budget for a newly enqueued entry.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Lifecycle status of an [`OfflineEntry`].
///
/// `pending → syncing → completed` on success; a transport failure returns a
/// syncing entry to `pending` with its retry count incremented; an entry whose
/// retry count reaches its budget becomes terminally `failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryStatus {
    /// Waiting for a sync pass.
    Pending,
    /// Dispatch in flight.
    Syncing,
    /// Delivered successfully. Terminal.
    Completed,
    /// Retry budget exhausted. Terminal; never resubmitted automatically.
    Failed,
}

impl std::fmt::Display for EntryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            EntryStatus::Pending => "pending",
            EntryStatus::Syncing => "syncing",
            EntryStatus::Completed => "completed",
            EntryStatus::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for EntryStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(EntryStatus::Pending),
            "syncing" => Ok(EntryStatus::Syncing),
            "completed" => Ok(EntryStatus::Completed),
            "failed" => Ok(EntryStatus::Failed),
            other => Err(format!("unknown entry status: {other}")),
        }
    }
}

/// A durably persisted task awaiting network availability.
///
/// Entries survive process restarts; the store is written before any dispatch
/// attempt is made.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OfflineEntry {
    /// Unique identifier.
    pub id: Uuid,
    /// Task type / capability key used to resolve the execution backend.
    pub entry_type: String,
    /// Opaque payload handed to the backend on dispatch.
    pub payload: serde_json::Value,
    /// Urgency carried over from the originating task.
    pub priority: Priority,
    /// Current lifecycle status.
    pub status: EntryStatus,
    /// Number of failed dispatch attempts so far. Never exceeds `max_retries`.
    pub retry_count: u32,
    /// Retry budget; once `retry_count` reaches it the entry is terminal.
    pub max_retries: u32,
    /// UTC creation timestamp; sync passes process entries in this order.
    pub created_at: DateTime<Utc>,
}

impl OfflineEntry {
    /// Create a new pending entry with the default retry budget.
    pub fn new(entry_type: impl Into<String>, payload: serde_json::Value, priority: Priority) -> Self {
        Self {
            id: Uuid::new_v4(),
            entry_type: entry_type.into(),
            payload,
            priority,
            status: EntryStatus::Pending,
            retry_count: 0,
            max_retries: DEFAULT_MAX_RETRIES,
            created_at: Utc::now(),
        }
    }

    /// Override the retry budget.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// True when the retry budget is exhausted.
    pub fn retries_exhausted(&self) -> bool {
        self.retry_count >= self.max_retries
    }

    /// True when the entry is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self.status, EntryStatus::Completed | EntryStatus::Failed)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_new_entry_defaults() {
        let entry = OfflineEntry::new(
            "send_reminders",
            serde_json::json!({"text": "dentist"}),
            Priority::Medium,
        );
        assert_eq!(entry.status, EntryStatus::Pending);
        assert_eq!(entry.retry_count, 0);
        assert_eq!(entry.max_retries, DEFAULT_MAX_RETRIES);
        assert!(!entry.retries_exhausted());
        assert!(!entry.is_terminal());
    }

    #[test]
    fn test_retries_exhausted_boundary() {
        let mut entry = OfflineEntry::new("t", serde_json::Value::Null, Priority::Low)
            .with_max_retries(2);
        entry.retry_count = 1;
        assert!(!entry.retries_exhausted());
        entry.retry_count = 2;
        assert!(entry.retries_exhausted());
    }

    #[test]
    fn test_status_round_trip() {
        for status in [
            EntryStatus::Pending,
            EntryStatus::Syncing,
            EntryStatus::Completed,
            EntryStatus::Failed,
        ] {
            let parsed: EntryStatus = status.to_string().parse().unwrap();
            assert_eq!(parsed, status);
        }
        assert!("bogus".parse::<EntryStatus>().is_err());
    }
}
