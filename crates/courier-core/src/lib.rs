//! Core types and error definitions for the Courier task dispatcher.
//!
//! This crate provides the vocabulary shared across all Courier crates:
//! the unified error enum, task categories, and priorities.
//!
//! # Main types
//!
//! - [`CourierError`] — Unified error enum for all Courier subsystems.
//! - [`CourierResult`] — Convenience alias for `Result<T, CourierError>`.
//! - [`TaskCategory`] — Coarse classification of an atomic task.
//! - [`Priority`] — Urgency level attached to tasks and offline entries.

use serde::{Deserialize, Serialize};

// --- Error types ---

/// Top-level error type for the Courier system.
///
/// The first group of variants is the dispatch/sync taxonomy; the rest are
/// infrastructure errors (storage, configuration, serialization, I/O).
#[derive(Debug, thiserror::Error)]
pub enum CourierError {
    /// No agent is currently available to take a task. Recoverable: the
    /// caller may retry later or defer the task to the offline queue.
    #[error("no agent available for dispatch")]
    NoAgentAvailable,

    /// An agent with the same identity but different definition is already
    /// registered.
    #[error("duplicate agent registration: {0}")]
    DuplicateAgent(String),

    /// An agent status transition that violates the registry state machine,
    /// e.g. marking an agent busy without a task reference. Programmer error;
    /// logged with full context where it surfaces.
    #[error("invalid state transition: {0}")]
    InvalidStateTransition(String),

    /// A task whose type or payload is not allowed to rest in the durable
    /// offline store. Policy rejection, surfaced to the caller immediately.
    #[error("unsafe for offline queue: {0}")]
    UnsafeForOffline(String),

    /// A dispatch attempt failed at the transport level (backend error or
    /// timeout). Recoverable: drives the offline retry state machine.
    #[error("transport failure: {0}")]
    Transport(String),

    /// An offline entry exhausted its retry budget. Terminal for that entry;
    /// never aborts the rest of the sync pass.
    #[error("retry limit exceeded for offline entry {0}")]
    RetryLimitExceeded(uuid::Uuid),

    /// An unknown queue, task, or offline entry identifier.
    #[error("not found: {0}")]
    NotFound(String),

    /// An error from the durable store layer.
    #[error("storage error: {0}")]
    Storage(String),

    /// An error in configuration parsing or validation.
    #[error("config error: {0}")]
    Config(String),

    /// A JSON serialization or deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A standard I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A convenience `Result` alias using [`CourierError`].
pub type CourierResult<T> = Result<T, CourierError>;

// --- Task vocabulary ---

/// Coarse classification of an atomic task, derived from its description.
///
/// Derivation is a keyword heuristic, not semantic understanding; see the
/// decomposer in `courier-dispatch`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskCategory {
    /// Purchases and ordering (groceries, retail).
    Shopping,
    /// Bookings, reservations, and service visits.
    Appointment,
    /// Reminders and outbound messages.
    Notification,
    /// Payments, transfers, billing.
    Financial,
    /// Deliveries, pickups, transport.
    Logistics,
    /// Health-related tasks (prescriptions, checkups).
    Medical,
    /// Anything that matched no other category.
    General,
}

impl std::fmt::Display for TaskCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TaskCategory::Shopping => "shopping",
            TaskCategory::Appointment => "appointment",
            TaskCategory::Notification => "notification",
            TaskCategory::Financial => "financial",
            TaskCategory::Logistics => "logistics",
            TaskCategory::Medical => "medical",
            TaskCategory::General => "general",
        };
        write!(f, "{s}")
    }
}

/// Urgency level attached to tasks and offline entries.
///
/// Ordered so that `Low < Medium < High < Urgent`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    /// Routine work; no deadline pressure.
    Low,
    /// The default when no priority keyword is present.
    Medium,
    /// Should be handled ahead of routine work.
    High,
    /// Requires immediate attention.
    Urgent,
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Medium
    }
}

impl std::str::FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Priority::Low),
            "medium" => Ok(Priority::Medium),
            "high" => Ok(Priority::High),
            "urgent" => Ok(Priority::Urgent),
            other => Err(format!("unknown priority: {other}")),
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
            Priority::Urgent => "urgent",
        };
        write!(f, "{s}")
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_ordering() {
        assert!(Priority::Low < Priority::Medium);
        assert!(Priority::Medium < Priority::High);
        assert!(Priority::High < Priority::Urgent);
        assert_eq!(Priority::default(), Priority::Medium);
    }

    #[test]
    fn test_category_serialization() {
        let json = serde_json::to_string(&TaskCategory::Appointment).unwrap();
        assert_eq!(json, "\"appointment\"");
        let parsed: TaskCategory = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, TaskCategory::Appointment);
    }

    #[test]
    fn test_error_display() {
        let err = CourierError::NoAgentAvailable;
        assert_eq!(err.to_string(), "no agent available for dispatch");

        let err = CourierError::Transport("connection reset".into());
        assert!(err.to_string().contains("connection reset"));
    }
}
