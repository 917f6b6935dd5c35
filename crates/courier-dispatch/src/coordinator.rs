//! The coordinator: single entry point over registry, queues, and sync.

use crate::decomposer::KeywordDecomposer;
use crate::queue::{ExecutionReport, QueueManager};
use crate::registry::AgentRegistry;
use crate::types::{Agent, TaskQueue};
use courier_core::{CourierError, CourierResult, Priority};
use courier_sync::{ConnectivityMonitor, SyncEngine, SyncReport, SyncStats};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::info;
use uuid::Uuid;

/// Facade over the dispatch and sync subsystems.
///
/// Owns the agent registry, the queue manager, and a handle to the sync
/// engine, and exposes the operations callers use: queue lifecycle, agent
/// introspection, and the offline queue. Cheap to share behind an `Arc`.
pub struct Coordinator {
    registry: Arc<AgentRegistry>,
    engine: Arc<SyncEngine>,
    queues: QueueManager,
    shutdown_tx: watch::Sender<bool>,
}

impl Coordinator {
    /// Create a coordinator over the given sync engine, registering the
    /// roster. Fails when the roster contains conflicting definitions.
    pub async fn new(engine: Arc<SyncEngine>, roster: Vec<Agent>) -> CourierResult<Self> {
        let registry = Arc::new(AgentRegistry::new());
        for agent in roster {
            registry.register(agent).await?;
        }

        let queues = QueueManager::new(
            Arc::clone(&registry),
            Arc::clone(&engine),
            Box::new(KeywordDecomposer::new()),
        );
        let (shutdown_tx, _) = watch::channel(false);
        Ok(Self {
            registry,
            engine,
            queues,
            shutdown_tx,
        })
    }

    // --- Queue lifecycle ---

    /// Decompose a request into an ordered task queue.
    pub async fn create_queue(&self, user_id: &str, request: &str) -> CourierResult<TaskQueue> {
        self.queues.create(user_id, request).await
    }

    /// Execute a queue's tasks sequentially.
    pub async fn execute_queue(&self, queue_id: Uuid) -> CourierResult<ExecutionReport> {
        self.queues.execute(queue_id).await
    }

    /// Current snapshot of a queue.
    pub async fn queue_status(&self, queue_id: Uuid) -> CourierResult<TaskQueue> {
        self.queues.status(queue_id).await
    }

    /// Suspend execution of an active queue.
    pub async fn pause_queue(&self, queue_id: Uuid) -> CourierResult<()> {
        self.queues.pause(queue_id).await
    }

    /// Resume a paused queue.
    pub async fn resume_queue(&self, queue_id: Uuid) -> CourierResult<()> {
        self.queues.resume(queue_id).await
    }

    // --- Agents ---

    /// Register an additional agent at runtime.
    pub async fn register_agent(&self, agent: Agent) -> CourierResult<()> {
        self.registry.register(agent).await
    }

    /// All registered agents, in registration order.
    pub async fn list_agents(&self) -> Vec<Agent> {
        self.registry.list().await
    }

    /// Snapshot of one agent, including status and performance.
    pub async fn agent_status(&self, agent_id: &str) -> CourierResult<Agent> {
        self.registry
            .get(agent_id)
            .await
            .ok_or_else(|| CourierError::NotFound(format!("agent {agent_id}")))
    }

    // --- Offline queue ---

    /// Queue work for deferred execution, bypassing decomposition.
    pub async fn enqueue_offline(
        &self,
        entry_type: impl Into<String>,
        payload: serde_json::Value,
        priority: Priority,
    ) -> CourierResult<Uuid> {
        self.engine.enqueue(entry_type, payload, priority).await
    }

    /// Run one sync pass now. `Ok(None)` when a pass is already in flight.
    pub async fn sync_now(&self) -> CourierResult<Option<SyncReport>> {
        self.engine.sync_all().await
    }

    /// Per-status counts over the offline store.
    pub async fn offline_statistics(&self) -> CourierResult<SyncStats> {
        self.engine.statistics().await
    }

    /// The connectivity signal shared with the sync engine.
    pub fn connectivity(&self) -> &ConnectivityMonitor {
        self.engine.connectivity()
    }

    // --- Background sync ---

    /// Start the periodic sync timer. The task stops when [`Self::shutdown`]
    /// is called.
    pub fn spawn_sync_timer(&self) -> JoinHandle<()> {
        self.engine.spawn(self.shutdown_tx.subscribe())
    }

    /// Signal all spawned timers to stop.
    pub fn shutdown(&self) {
        info!("coordinator shutting down");
        let _ = self.shutdown_tx.send(true);
    }
}
