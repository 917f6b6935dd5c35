//! Built-in agent roster.

use crate::types::Agent;
use courier_core::TaskCategory;

/// The default set of specialized agents registered at startup.
///
/// One agent per routine household concern plus a generalist. Capability tags
/// are matched as substrings of task descriptions (underscores read as
/// spaces), so tags are chosen to mirror how requests are phrased.
pub fn default_roster() -> Vec<Agent> {
    vec![
        Agent::new(
            "grocery-agent",
            "Grocery Agent",
            TaskCategory::Shopping,
            tags(&["order_groceries", "groceries", "shopping", "buy"]),
        ),
        Agent::new(
            "booking-agent",
            "Booking Agent",
            TaskCategory::Appointment,
            tags(&["book", "appointment", "schedule", "reserve"]),
        ),
        Agent::new(
            "reminder-agent",
            "Reminder Agent",
            TaskCategory::Notification,
            tags(&["remind", "notify", "alert"]),
        ),
        Agent::new(
            "finance-agent",
            "Finance Agent",
            TaskCategory::Financial,
            tags(&["pay", "bill", "transfer", "invoice"]),
        ),
        Agent::new(
            "courier-agent",
            "Courier Agent",
            TaskCategory::Logistics,
            tags(&["deliver", "pickup", "pick_up", "ship"]),
        ),
        Agent::new(
            "health-agent",
            "Health Agent",
            TaskCategory::Medical,
            tags(&["doctor", "dentist", "medication", "prescription", "pharmacy"]),
        ),
        Agent::new(
            "general-agent",
            "General Agent",
            TaskCategory::General,
            tags(&["assist"]),
        ),
    ]
}

fn tags(tags: &[&str]) -> Vec<String> {
    tags.iter().map(|s| (*s).to_string()).collect()
}
