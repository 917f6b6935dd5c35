//! Queue creation and sequential execution.

use crate::decomposer::Decomposer;
use crate::registry::AgentRegistry;
use crate::router::{capability_scorer, Router};
use crate::types::{QueueStatus, Task, TaskQueue, TaskStatus};
use chrono::Utc;
use courier_core::{CourierError, CourierResult};
use courier_sync::SyncEngine;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};
use uuid::Uuid;

/// Assumed task duration for ETA estimates when the routed agent has no
/// execution history yet.
pub const DEFAULT_TASK_DURATION_MS: u64 = 30_000;

/// What happened to one task during an execution pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepOutcome {
    /// The task executed successfully.
    Completed,
    /// The task failed terminally.
    Failed {
        /// Why the step failed.
        reason: String,
    },
    /// Connectivity was down; the task was parked in the offline queue and
    /// stays pending in the task queue.
    Deferred {
        /// The offline entry holding the deferred work.
        entry: Uuid,
    },
}

/// Per-task record of an execution pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepReport {
    /// The task this step executed.
    pub task: Uuid,
    /// Task description, for human-readable reports.
    pub description: String,
    /// The agent that handled the step, when one was acquired.
    pub agent: Option<String>,
    /// What happened.
    pub outcome: StepOutcome,
}

/// Result of one `execute` pass over a queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionReport {
    /// The executed queue.
    pub queue: Uuid,
    /// One record per task visited this pass.
    pub steps: Vec<StepReport>,
    /// Queue status after the pass.
    pub status: QueueStatus,
}

impl ExecutionReport {
    /// One-line summary of the pass.
    pub fn summary(&self) -> String {
        let mut completed = 0;
        let mut failed = 0;
        let mut deferred = 0;
        for step in &self.steps {
            match step.outcome {
                StepOutcome::Completed => completed += 1,
                StepOutcome::Failed { .. } => failed += 1,
                StepOutcome::Deferred { .. } => deferred += 1,
            }
        }
        format!(
            "{completed} completed, {failed} failed, {deferred} deferred (queue {:?})",
            self.status
        )
    }
}

/// Owns all task queues and drives their execution.
///
/// Execution is strictly sequential within a queue (insertion order, one task
/// at a time) and partial-failure tolerant: a failed task never aborts the
/// rest of the pass. Concurrent `execute` calls on the same queue are
/// rejected; different queues may execute concurrently and compete for agents
/// through the registry.
pub struct QueueManager {
    queues: RwLock<HashMap<Uuid, TaskQueue>>,
    registry: Arc<AgentRegistry>,
    router: Router,
    engine: Arc<SyncEngine>,
    decomposer: Box<dyn Decomposer>,
    executing: Mutex<HashSet<Uuid>>,
}

impl QueueManager {
    /// Create a manager over the shared registry and sync engine.
    pub fn new(
        registry: Arc<AgentRegistry>,
        engine: Arc<SyncEngine>,
        decomposer: Box<dyn Decomposer>,
    ) -> Self {
        Self {
            queues: RwLock::new(HashMap::new()),
            router: Router::new(Arc::clone(&registry)),
            registry,
            engine,
            decomposer,
            executing: Mutex::new(HashSet::new()),
        }
    }

    /// Decompose a request into an ordered queue of tasks.
    ///
    /// Fails with [`CourierError::Config`] when the request decomposes to
    /// nothing. The completion estimate sums per-task agent history, falling
    /// back to [`DEFAULT_TASK_DURATION_MS`] per task.
    pub async fn create(&self, user_id: &str, request: &str) -> CourierResult<TaskQueue> {
        let drafts = self.decomposer.decompose(request);
        if drafts.is_empty() {
            return Err(CourierError::Config(format!(
                "request from {user_id} decomposed to no tasks"
            )));
        }

        let tasks: Vec<Task> = drafts
            .into_iter()
            .map(|d| Task::new(d.description, d.category, d.priority))
            .collect();

        let mut total_ms: u64 = 0;
        for task in &tasks {
            let estimate = self
                .registry
                .estimate_duration_ms(capability_scorer(&task.description))
                .await
                .unwrap_or(DEFAULT_TASK_DURATION_MS);
            total_ms += estimate;
        }
        let estimated_completion = Utc::now() + chrono::Duration::milliseconds(total_ms as i64);

        let queue = TaskQueue::new(user_id, tasks, estimated_completion);
        info!(queue = %queue.id, user = user_id, tasks = queue.tasks.len(), "queue created");
        self.queues.write().await.insert(queue.id, queue.clone());
        Ok(queue)
    }

    /// Current snapshot of a queue.
    pub async fn status(&self, queue_id: Uuid) -> CourierResult<TaskQueue> {
        self.queues
            .read()
            .await
            .get(&queue_id)
            .cloned()
            .ok_or_else(|| CourierError::NotFound(format!("queue {queue_id}")))
    }

    /// Suspend execution of an active queue.
    pub async fn pause(&self, queue_id: Uuid) -> CourierResult<()> {
        let mut queues = self.queues.write().await;
        let queue = queues
            .get_mut(&queue_id)
            .ok_or_else(|| CourierError::NotFound(format!("queue {queue_id}")))?;
        if queue.status != QueueStatus::Active {
            return Err(CourierError::InvalidStateTransition(format!(
                "cannot pause queue {queue_id} while {:?}",
                queue.status
            )));
        }
        queue.status = QueueStatus::Paused;
        info!(queue = %queue_id, "queue paused");
        Ok(())
    }

    /// Resume a paused queue. Execution re-enters at the first non-terminal
    /// task on the next `execute` call.
    pub async fn resume(&self, queue_id: Uuid) -> CourierResult<()> {
        let mut queues = self.queues.write().await;
        let queue = queues
            .get_mut(&queue_id)
            .ok_or_else(|| CourierError::NotFound(format!("queue {queue_id}")))?;
        if queue.status != QueueStatus::Paused {
            return Err(CourierError::InvalidStateTransition(format!(
                "cannot resume queue {queue_id} while {:?}",
                queue.status
            )));
        }
        queue.status = QueueStatus::Active;
        info!(queue = %queue_id, "queue resumed");
        Ok(())
    }

    /// Execute a queue's tasks in insertion order.
    ///
    /// Visits each non-terminal task once: routes it, dispatches it, and
    /// records the outcome. Failures mark the task failed and move on;
    /// offline-deferrable tasks are parked in the sync engine and stay
    /// pending. A second `execute` on a queue already in flight is rejected
    /// with [`CourierError::InvalidStateTransition`].
    pub async fn execute(&self, queue_id: Uuid) -> CourierResult<ExecutionReport> {
        {
            let mut executing = self.executing.lock().await;
            if !executing.insert(queue_id) {
                return Err(CourierError::InvalidStateTransition(format!(
                    "queue {queue_id} is already executing"
                )));
            }
        }
        let result = self.execute_inner(queue_id).await;
        self.executing.lock().await.remove(&queue_id);
        result
    }

    async fn execute_inner(&self, queue_id: Uuid) -> CourierResult<ExecutionReport> {
        let snapshot = self.status(queue_id).await?;
        if snapshot.status != QueueStatus::Active {
            return Ok(ExecutionReport {
                queue: queue_id,
                steps: Vec::new(),
                status: snapshot.status,
            });
        }

        let start = snapshot.first_non_terminal().unwrap_or(snapshot.tasks.len());
        let mut steps = Vec::new();

        for index in start..snapshot.tasks.len() {
            // Re-read each iteration: a concurrent pause takes effect between
            // steps, and task state may have moved.
            let current = self.status(queue_id).await?;
            if current.status == QueueStatus::Paused {
                info!(queue = %queue_id, "execution interrupted by pause");
                break;
            }
            let task = current.tasks[index].clone();
            if task.is_terminal() {
                continue;
            }

            let (updated, step) = self.execute_task(task).await?;
            steps.push(step);
            self.store_task(queue_id, index, updated).await?;
        }

        let mut queues = self.queues.write().await;
        let queue = queues
            .get_mut(&queue_id)
            .ok_or_else(|| CourierError::NotFound(format!("queue {queue_id}")))?;
        queue.recompute_status();
        info!(queue = %queue_id, status = ?queue.status, steps = steps.len(), "execution pass done");
        Ok(ExecutionReport {
            queue: queue_id,
            steps,
            status: queue.status,
        })
    }

    /// Run one task to an outcome. The returned task carries the new state.
    async fn execute_task(&self, mut task: Task) -> CourierResult<(Task, StepReport)> {
        let entry_type = task.category.to_string();
        let payload = json!({
            "task_id": task.id,
            "description": task.description,
            "priority": task.priority,
        });

        // Offline: park deferrable work in the sync engine and keep the task
        // pending; non-deferrable work fails now rather than resting on disk.
        if !self.engine.connectivity().is_online() {
            if self.engine.is_safe_for_offline(&entry_type, &payload) {
                let entry = self
                    .engine
                    .enqueue(entry_type, payload, task.priority)
                    .await?;
                info!(task = %task.id, entry = %entry, "task deferred to offline queue");
                let step = StepReport {
                    task: task.id,
                    description: task.description.clone(),
                    agent: None,
                    outcome: StepOutcome::Deferred { entry },
                };
                return Ok((task, step));
            }

            let reason = "connectivity lost and task is not deferrable".to_string();
            warn!(task = %task.id, "{reason}");
            task.status = TaskStatus::Failed {
                reason: reason.clone(),
            };
            task.completed_at = Some(Utc::now());
            let step = StepReport {
                task: task.id,
                description: task.description.clone(),
                agent: None,
                outcome: StepOutcome::Failed { reason },
            };
            return Ok((task, step));
        }

        let agent = match self.router.assign(&task).await {
            Ok(agent) => agent,
            Err(CourierError::NoAgentAvailable) => {
                let reason = CourierError::NoAgentAvailable.to_string();
                warn!(task = %task.id, "{reason}");
                task.status = TaskStatus::Failed {
                    reason: reason.clone(),
                };
                task.completed_at = Some(Utc::now());
                let step = StepReport {
                    task: task.id,
                    description: task.description.clone(),
                    agent: None,
                    outcome: StepOutcome::Failed { reason },
                };
                return Ok((task, step));
            }
            Err(e) => return Err(e),
        };

        task.status = TaskStatus::InProgress;
        task.assigned_agent = Some(agent.id.clone());

        // Dispatch under the matched capability so backends can key on the
        // skill; fallback assignments dispatch under the category.
        let dispatch_type =
            Router::matched_capability(&agent, &task.description).unwrap_or(entry_type);
        let request =
            courier_sync::DispatchRequest::new(dispatch_type, payload, task.priority);

        let started = Instant::now();
        let outcome = match self.engine.dispatch(&request).await {
            Ok(result) => {
                let duration_ms = started.elapsed().as_millis() as u64;
                self.registry
                    .release_with_result(&agent.id, true, duration_ms)
                    .await?;
                task.status = TaskStatus::Completed;
                task.completed_at = Some(Utc::now());
                task.result = Some(result);
                info!(task = %task.id, agent = %agent.id, duration_ms, "task completed");
                StepOutcome::Completed
            }
            Err(e) => {
                let duration_ms = started.elapsed().as_millis() as u64;
                self.registry
                    .release_with_result(&agent.id, false, duration_ms)
                    .await?;
                let reason = e.to_string();
                warn!(task = %task.id, agent = %agent.id, error = %reason, "task failed");
                task.status = TaskStatus::Failed {
                    reason: reason.clone(),
                };
                task.completed_at = Some(Utc::now());
                StepOutcome::Failed { reason }
            }
        };

        let step = StepReport {
            task: task.id,
            description: task.description.clone(),
            agent: Some(agent.id),
            outcome,
        };
        Ok((task, step))
    }

    async fn store_task(&self, queue_id: Uuid, index: usize, task: Task) -> CourierResult<()> {
        let mut queues = self.queues.write().await;
        let queue = queues
            .get_mut(&queue_id)
            .ok_or_else(|| CourierError::NotFound(format!("queue {queue_id}")))?;
        queue.tasks[index] = task;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::decomposer::KeywordDecomposer;
    use crate::roster::default_roster;
    use async_trait::async_trait;
    use courier_sync::{
        BackendRegistry, ConnectivityMonitor, DispatchRequest, ExecutionBackend,
        MemoryOfflineStore,
    };
    use std::sync::atomic::{AtomicBool, Ordering};

    struct ScriptedBackend {
        fail: AtomicBool,
    }

    impl ScriptedBackend {
        fn succeeding() -> Self {
            Self {
                fail: AtomicBool::new(false),
            }
        }

        fn failing() -> Self {
            Self {
                fail: AtomicBool::new(true),
            }
        }
    }

    #[async_trait]
    impl ExecutionBackend for ScriptedBackend {
        async fn execute(&self, request: &DispatchRequest) -> CourierResult<serde_json::Value> {
            if self.fail.load(Ordering::SeqCst) {
                Err(CourierError::Transport("scripted failure".into()))
            } else {
                Ok(json!({ "handled": request.entry_type }))
            }
        }
    }

    async fn manager_with(backend: ScriptedBackend, online: bool) -> QueueManager {
        let registry = Arc::new(AgentRegistry::new());
        for agent in default_roster() {
            registry.register(agent).await.unwrap();
        }
        let mut backends = BackendRegistry::new();
        backends.set_fallback(Arc::new(backend));
        let engine = Arc::new(SyncEngine::new(
            Arc::new(MemoryOfflineStore::new()),
            Arc::new(backends),
            ConnectivityMonitor::new(online),
        ));
        QueueManager::new(registry, engine, Box::new(KeywordDecomposer::new()))
    }

    #[tokio::test]
    async fn test_create_orders_tasks_by_sentence() {
        let manager = manager_with(ScriptedBackend::succeeding(), true).await;
        let queue = manager
            .create(
                "user-1",
                "Order groceries for the week. Book a dentist appointment. Remind me to call mom.",
            )
            .await
            .unwrap();

        assert_eq!(queue.tasks.len(), 3);
        assert_eq!(queue.status, QueueStatus::Active);
        assert!(queue.estimated_completion > queue.created_at);
    }

    #[tokio::test]
    async fn test_create_empty_request_rejected() {
        let manager = manager_with(ScriptedBackend::succeeding(), true).await;
        let err = manager.create("user-1", "   ").await.unwrap_err();
        assert!(matches!(err, CourierError::Config(_)));
    }

    #[tokio::test]
    async fn test_execute_completes_all_tasks_in_order() {
        let manager = manager_with(ScriptedBackend::succeeding(), true).await;
        let queue = manager
            .create("user-1", "Order groceries. Remind me to stretch.")
            .await
            .unwrap();

        let report = manager.execute(queue.id).await.unwrap();
        assert_eq!(report.status, QueueStatus::Completed);
        assert_eq!(report.steps.len(), 2);
        assert!(report
            .steps
            .iter()
            .all(|s| s.outcome == StepOutcome::Completed));
        assert_eq!(report.steps[0].agent.as_deref(), Some("grocery-agent"));
        assert_eq!(report.steps[1].agent.as_deref(), Some("reminder-agent"));

        // Agents were released and recorded the work.
        let snapshot = manager.status(queue.id).await.unwrap();
        assert!(snapshot.tasks.iter().all(Task::is_terminal));
        let grocery = manager.registry.get("grocery-agent").await.unwrap();
        assert_eq!(grocery.performance.tasks_completed, 1);
        assert!(grocery.current_task.is_none());
    }

    #[tokio::test]
    async fn test_failure_does_not_abort_pass() {
        let manager = manager_with(ScriptedBackend::failing(), true).await;
        let queue = manager
            .create("user-1", "Order groceries. Remind me to stretch.")
            .await
            .unwrap();

        let report = manager.execute(queue.id).await.unwrap();
        assert_eq!(report.steps.len(), 2);
        assert!(report
            .steps
            .iter()
            .all(|s| matches!(s.outcome, StepOutcome::Failed { .. })));
        assert_eq!(report.status, QueueStatus::Failed);
        assert!(report.summary().contains("2 failed"));
    }

    #[tokio::test]
    async fn test_offline_defers_safe_tasks() {
        let manager = manager_with(ScriptedBackend::succeeding(), false).await;
        let queue = manager
            .create("user-1", "Remind me to water the plants.")
            .await
            .unwrap();

        let report = manager.execute(queue.id).await.unwrap();
        assert_eq!(report.steps.len(), 1);
        assert!(matches!(
            report.steps[0].outcome,
            StepOutcome::Deferred { .. }
        ));
        // Deferred work keeps the queue active and the task pending.
        assert_eq!(report.status, QueueStatus::Active);
        let snapshot = manager.status(queue.id).await.unwrap();
        assert_eq!(snapshot.tasks[0].status, TaskStatus::Pending);
        assert_eq!(manager.engine.statistics().await.unwrap().pending, 1);
    }

    #[tokio::test]
    async fn test_offline_fails_non_deferrable_tasks() {
        let manager = manager_with(ScriptedBackend::succeeding(), false).await;
        let queue = manager
            .create("user-1", "Pay the electricity bill.")
            .await
            .unwrap();

        let report = manager.execute(queue.id).await.unwrap();
        assert!(matches!(
            report.steps[0].outcome,
            StepOutcome::Failed { .. }
        ));
        assert_eq!(report.status, QueueStatus::Failed);
        // Nothing financial may rest in the offline store.
        assert_eq!(manager.engine.statistics().await.unwrap().total, 0);
    }

    #[tokio::test]
    async fn test_pause_blocks_execution_and_resume_reenters() {
        let manager = manager_with(ScriptedBackend::succeeding(), true).await;
        let queue = manager
            .create("user-1", "Order groceries. Remind me to stretch.")
            .await
            .unwrap();

        manager.pause(queue.id).await.unwrap();
        let report = manager.execute(queue.id).await.unwrap();
        assert!(report.steps.is_empty());
        assert_eq!(report.status, QueueStatus::Paused);

        manager.resume(queue.id).await.unwrap();
        let report = manager.execute(queue.id).await.unwrap();
        assert_eq!(report.steps.len(), 2);
        assert_eq!(report.status, QueueStatus::Completed);
    }

    #[tokio::test]
    async fn test_pause_requires_active_queue() {
        let manager = manager_with(ScriptedBackend::succeeding(), true).await;
        let queue = manager.create("user-1", "Order groceries.").await.unwrap();
        manager.execute(queue.id).await.unwrap();

        let err = manager.pause(queue.id).await.unwrap_err();
        assert!(matches!(err, CourierError::InvalidStateTransition(_)));
    }

    #[tokio::test]
    async fn test_unknown_queue_not_found() {
        let manager = manager_with(ScriptedBackend::succeeding(), true).await;
        let err = manager.status(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, CourierError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_no_agent_available_marks_task_failed() {
        // Empty registry: routing cannot succeed.
        let mut backends = BackendRegistry::new();
        backends.set_fallback(Arc::new(ScriptedBackend::succeeding()));
        let engine = Arc::new(SyncEngine::new(
            Arc::new(MemoryOfflineStore::new()),
            Arc::new(backends),
            ConnectivityMonitor::new(true),
        ));
        let manager = QueueManager::new(
            Arc::new(AgentRegistry::new()),
            engine,
            Box::new(KeywordDecomposer::new()),
        );

        let queue = manager.create("user-1", "Order groceries.").await.unwrap();
        let report = manager.execute(queue.id).await.unwrap();
        assert!(matches!(
            report.steps[0].outcome,
            StepOutcome::Failed { .. }
        ));
        assert_eq!(report.status, QueueStatus::Failed);
    }

    #[tokio::test]
    async fn test_overlapping_execute_rejected() {
        let manager = Arc::new(manager_with(ScriptedBackend::succeeding(), true).await);
        let queue = manager.create("user-1", "Order groceries.").await.unwrap();

        // Hold the guard manually to simulate an in-flight pass.
        manager.executing.lock().await.insert(queue.id);
        let err = manager.execute(queue.id).await.unwrap_err();
        assert!(matches!(err, CourierError::InvalidStateTransition(_)));

        manager.executing.lock().await.remove(&queue.id);
        assert!(manager.execute(queue.id).await.is_ok());
    }
}
