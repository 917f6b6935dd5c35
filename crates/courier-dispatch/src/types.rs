use chrono::{DateTime, Utc};
use courier_core::{Priority, TaskCategory};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Live status of a registered agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    /// Free to take a task.
    Available,
    /// Working on exactly one task.
    Busy,
    /// Unreachable; excluded from routing.
    Offline,
}

impl std::fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AgentStatus::Available => "available",
            AgentStatus::Busy => "busy",
            AgentStatus::Offline => "offline",
        };
        write!(f, "{s}")
    }
}

/// Rolling performance record per agent, updated on task release.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct PerformanceRecord {
    /// Tasks this agent has finished, successfully or not.
    pub tasks_completed: u64,
    /// Tasks that ended in success.
    pub successful_tasks: u64,
    /// Accumulated execution time across finished tasks.
    pub total_duration_ms: u64,
}

impl PerformanceRecord {
    /// Record one finished task.
    pub fn record(&mut self, success: bool, duration_ms: u64) {
        self.tasks_completed += 1;
        if success {
            self.successful_tasks += 1;
        }
        self.total_duration_ms += duration_ms;
    }

    /// Fraction of finished tasks that succeeded. Agents with no history
    /// start at 1.0.
    pub fn success_rate(&self) -> f64 {
        if self.tasks_completed == 0 {
            1.0
        } else {
            self.successful_tasks as f64 / self.tasks_completed as f64
        }
    }

    /// Average task duration, if any tasks have finished.
    pub fn average_duration_ms(&self) -> Option<u64> {
        if self.tasks_completed == 0 {
            None
        } else {
            Some(self.total_duration_ms / self.tasks_completed)
        }
    }
}

/// A specialized executor registered with a fixed set of capability tags.
///
/// The capability list is immutable after creation; status and the current
/// task reference are mutated only through the registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    /// Stable identity, e.g. `grocery-agent`.
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// The agent's home category.
    pub category: TaskCategory,
    /// Ordered capability tags advertised for routing.
    pub capabilities: Vec<String>,
    /// Live status.
    pub status: AgentStatus,
    /// The one in-progress task while busy. An agent whose status is busy
    /// always has exactly one current task.
    pub current_task: Option<Uuid>,
    /// Rolling performance record.
    pub performance: PerformanceRecord,
}

impl Agent {
    /// Create an available agent with the given identity and capabilities.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        category: TaskCategory,
        capabilities: Vec<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            category,
            capabilities,
            status: AgentStatus::Available,
            current_task: None,
            performance: PerformanceRecord::default(),
        }
    }

    /// Whether two registrations describe the same agent definition.
    /// Status and telemetry are ignored; registration is idempotent on these
    /// fields.
    pub fn same_definition(&self, other: &Agent) -> bool {
        self.id == other.id
            && self.name == other.name
            && self.category == other.category
            && self.capabilities == other.capabilities
    }
}

/// Lifecycle status of an atomic task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Not yet dispatched.
    Pending,
    /// Assigned and executing.
    InProgress,
    /// Finished successfully. Terminal.
    Completed,
    /// Finished unsuccessfully. Terminal.
    Failed {
        /// Why the task failed.
        reason: String,
    },
}

/// One atomic unit of work derived from a user request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Unique identifier.
    pub id: Uuid,
    /// The trimmed sentence this task was derived from.
    pub description: String,
    /// Derived category.
    pub category: TaskCategory,
    /// Lifecycle status.
    pub status: TaskStatus,
    /// The agent executing this task, once routed.
    pub assigned_agent: Option<String>,
    /// Derived priority.
    pub priority: Priority,
    /// UTC creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Set when the task reaches a terminal state.
    pub completed_at: Option<DateTime<Utc>>,
    /// Result payload returned by the execution backend.
    pub result: Option<serde_json::Value>,
}

impl Task {
    /// Create a pending task.
    pub fn new(description: impl Into<String>, category: TaskCategory, priority: Priority) -> Self {
        Self {
            id: Uuid::new_v4(),
            description: description.into(),
            category,
            status: TaskStatus::Pending,
            assigned_agent: None,
            priority,
            created_at: Utc::now(),
            completed_at: None,
            result: None,
        }
    }

    /// Whether the task reached a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self.status, TaskStatus::Completed | TaskStatus::Failed { .. })
    }
}

/// Lifecycle status of a task queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueStatus {
    /// Has non-terminal tasks; eligible for execution.
    Active,
    /// Execution suspended; no further dispatch until resumed.
    Paused,
    /// Every task completed. Terminal.
    Completed,
    /// All tasks terminal and at least one failed. Terminal.
    Failed,
}

/// The ordered set of tasks derived from one request.
///
/// Insertion order is execution order; later steps may depend on earlier ones
/// completing, so tasks are never reordered or run in parallel within a queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskQueue {
    /// Unique identifier.
    pub id: Uuid,
    /// The requesting user.
    pub user_id: String,
    /// Tasks in execution order.
    pub tasks: Vec<Task>,
    /// Lifecycle status.
    pub status: QueueStatus,
    /// UTC creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Estimated completion, from per-task agent average durations.
    pub estimated_completion: DateTime<Utc>,
}

impl TaskQueue {
    /// Create an active queue.
    pub fn new(user_id: impl Into<String>, tasks: Vec<Task>, estimated_completion: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.into(),
            tasks,
            status: QueueStatus::Active,
            created_at: Utc::now(),
            estimated_completion,
        }
    }

    /// Recompute queue status from task states after an execution pass.
    ///
    /// Completed iff every task completed; failed iff all tasks are terminal
    /// and at least one failed; a paused queue stays paused. Queues with
    /// remaining non-terminal tasks (e.g. deferred offline) stay active.
    pub fn recompute_status(&mut self) {
        if self.status == QueueStatus::Paused {
            return;
        }
        let all_terminal = self.tasks.iter().all(Task::is_terminal);
        let any_failed = self
            .tasks
            .iter()
            .any(|t| matches!(t.status, TaskStatus::Failed { .. }));

        self.status = if all_terminal && !any_failed {
            QueueStatus::Completed
        } else if all_terminal {
            QueueStatus::Failed
        } else {
            QueueStatus::Active
        };
    }

    /// Index of the first non-terminal task, if any. Resumption re-enters
    /// the execution loop here.
    pub fn first_non_terminal(&self) -> Option<usize> {
        self.tasks.iter().position(|t| !t.is_terminal())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_performance_record() {
        let mut record = PerformanceRecord::default();
        assert_eq!(record.success_rate(), 1.0);
        assert!(record.average_duration_ms().is_none());

        record.record(true, 100);
        record.record(false, 300);
        assert_eq!(record.tasks_completed, 2);
        assert_eq!(record.success_rate(), 0.5);
        assert_eq!(record.average_duration_ms(), Some(200));
    }

    #[test]
    fn test_agent_same_definition_ignores_telemetry() {
        let a = Agent::new("x", "X", TaskCategory::General, vec!["assist".into()]);
        let mut b = a.clone();
        b.status = AgentStatus::Busy;
        b.performance.record(true, 10);
        assert!(a.same_definition(&b));

        let mut c = a.clone();
        c.capabilities.push("extra".into());
        assert!(!a.same_definition(&c));
    }

    #[test]
    fn test_queue_status_invariant() {
        let mut queue = TaskQueue::new(
            "user-1",
            vec![
                Task::new("a", TaskCategory::General, Priority::Medium),
                Task::new("b", TaskCategory::General, Priority::Medium),
            ],
            Utc::now(),
        );

        queue.recompute_status();
        assert_eq!(queue.status, QueueStatus::Active);

        queue.tasks[0].status = TaskStatus::Completed;
        queue.recompute_status();
        assert_eq!(queue.status, QueueStatus::Active);
        assert_eq!(queue.first_non_terminal(), Some(1));

        queue.tasks[1].status = TaskStatus::Completed;
        queue.recompute_status();
        assert_eq!(queue.status, QueueStatus::Completed);
    }

    #[test]
    fn test_queue_failed_when_all_terminal_with_failure() {
        let mut queue = TaskQueue::new(
            "user-1",
            vec![
                Task::new("a", TaskCategory::General, Priority::Medium),
                Task::new("b", TaskCategory::General, Priority::Medium),
            ],
            Utc::now(),
        );
        queue.tasks[0].status = TaskStatus::Completed;
        queue.tasks[1].status = TaskStatus::Failed {
            reason: "backend outage".into(),
        };
        queue.recompute_status();
        assert_eq!(queue.status, QueueStatus::Failed);
    }

    #[test]
    fn test_paused_queue_stays_paused() {
        let mut queue = TaskQueue::new("user-1", Vec::new(), Utc::now());
        queue.status = QueueStatus::Paused;
        queue.recompute_status();
        assert_eq!(queue.status, QueueStatus::Paused);
    }

    #[test]
    fn test_task_status_serialization() {
        let status = TaskStatus::Failed {
            reason: "timeout".into(),
        };
        let json = serde_json::to_string(&status).unwrap();
        assert!(json.contains("timeout"));
        let parsed: TaskStatus = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, status);
    }
}
