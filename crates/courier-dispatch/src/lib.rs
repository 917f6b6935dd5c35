//! Agent registry, capability routing, decomposition, and task queues for
//! the Courier task dispatcher.
//!
//! A free-text request flows through this crate as follows: the
//! [`KeywordDecomposer`] splits it into ordered [`Task`]s, the
//! [`QueueManager`] wraps them in a [`TaskQueue`], and execution routes each
//! task through the [`Router`] to an agent held in the [`AgentRegistry`].
//! Dispatch itself goes through `courier-sync`, which also parks tasks in the
//! offline queue when connectivity is down. The [`Coordinator`] ties the
//! pieces together behind one facade.

/// The coordinator facade.
pub mod coordinator;
/// Request decomposition into ordered task drafts.
pub mod decomposer;
/// Queue creation and sequential execution.
pub mod queue;
/// The shared agent registry.
pub mod registry;
/// Built-in agent roster.
pub mod roster;
/// Capability-based task routing.
pub mod router;
/// Domain types: agents, tasks, queues.
pub mod types;

pub use coordinator::Coordinator;
pub use decomposer::{Decomposer, KeywordDecomposer, TaskDraft};
pub use queue::{ExecutionReport, QueueManager, StepOutcome, StepReport, DEFAULT_TASK_DURATION_MS};
pub use registry::AgentRegistry;
pub use roster::default_roster;
pub use router::Router;
pub use types::{
    Agent, AgentStatus, PerformanceRecord, QueueStatus, Task, TaskQueue, TaskStatus,
};
