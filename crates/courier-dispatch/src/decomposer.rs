//! Request decomposition.
//!
//! A user request arrives as free text and leaves as an ordered list of task
//! drafts, one per sentence, each tagged with a category and priority derived
//! from keyword tables. Sentence order is preserved because later steps may
//! depend on earlier ones.

use courier_core::{Priority, TaskCategory};
use tracing::debug;

/// A task draft produced by decomposition, before identity and lifecycle
/// state are attached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskDraft {
    /// The trimmed sentence.
    pub description: String,
    /// Category derived from the sentence text.
    pub category: TaskCategory,
    /// Priority derived from the sentence text.
    pub priority: Priority,
}

/// Splits a request into ordered task drafts.
pub trait Decomposer: Send + Sync {
    /// Decompose `request` into drafts, in request order. An empty or
    /// blank request yields no drafts.
    fn decompose(&self, request: &str) -> Vec<TaskDraft>;
}

/// Category keyword tables, scanned in declaration order. The first category
/// with a hit wins, so earlier rows shadow later ones ("remind me about the
/// dentist" is a notification, not a medical task).
const CATEGORY_KEYWORDS: &[(TaskCategory, &[&str])] = &[
    (
        TaskCategory::Shopping,
        &["order", "buy", "purchase", "groceries", "shopping"],
    ),
    (
        TaskCategory::Appointment,
        &["book", "appointment", "schedule", "reserve", "service", "repair"],
    ),
    (
        TaskCategory::Notification,
        &["remind", "notify", "alert", "tell me"],
    ),
    (
        TaskCategory::Financial,
        &["pay", "payment", "bill", "transfer", "invoice"],
    ),
    (
        TaskCategory::Logistics,
        &["deliver", "pickup", "pick up", "ship", "transport"],
    ),
    (
        TaskCategory::Medical,
        &["doctor", "dentist", "medication", "prescription", "pharmacy", "clinic"],
    ),
];

const URGENT_KEYWORDS: &[&str] = &["urgent", "emergency", "immediately", "right away", "asap"];
const HIGH_KEYWORDS: &[&str] = &["important", "priority"];
const LOW_KEYWORDS: &[&str] = &["routine", "weekly", "whenever", "eventually"];

/// Keyword-table decomposer: sentence split on `.`, `!`, `?`, then per-sentence
/// category and priority classification.
#[derive(Debug, Default)]
pub struct KeywordDecomposer;

impl KeywordDecomposer {
    /// Create a decomposer.
    pub fn new() -> Self {
        Self
    }

    fn classify_category(sentence: &str) -> TaskCategory {
        for (category, keywords) in CATEGORY_KEYWORDS {
            if keywords.iter().any(|kw| sentence.contains(kw)) {
                return *category;
            }
        }
        TaskCategory::General
    }

    fn classify_priority(sentence: &str) -> Priority {
        if URGENT_KEYWORDS.iter().any(|kw| sentence.contains(kw)) {
            Priority::Urgent
        } else if HIGH_KEYWORDS.iter().any(|kw| sentence.contains(kw)) {
            Priority::High
        } else if LOW_KEYWORDS.iter().any(|kw| sentence.contains(kw)) {
            Priority::Low
        } else {
            Priority::Medium
        }
    }
}

impl Decomposer for KeywordDecomposer {
    fn decompose(&self, request: &str) -> Vec<TaskDraft> {
        let drafts: Vec<TaskDraft> = request
            .split(['.', '!', '?'])
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|sentence| {
                let lowered = sentence.to_lowercase();
                TaskDraft {
                    description: sentence.to_string(),
                    category: Self::classify_category(&lowered),
                    priority: Self::classify_priority(&lowered),
                }
            })
            .collect();
        debug!(count = drafts.len(), "request decomposed");
        drafts
    }
}
