use crate::types::{Agent, AgentStatus};
use courier_core::{CourierError, CourierResult};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::{info, warn};
use uuid::Uuid;

struct RegistryInner {
    agents: HashMap<String, Agent>,
    /// Registration order; routing tie-breaks resolve to the earliest entry.
    order: Vec<String>,
}

/// The capability registry: the one shared mutable resource.
///
/// All status transitions happen under a single write lock, which gives them
/// compare-and-set semantics: an agent becomes busy only if it is currently
/// available, so concurrent queues competing for the same agent can never
/// double-book it.
pub struct AgentRegistry {
    inner: RwLock<RegistryInner>,
}

impl AgentRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(RegistryInner {
                agents: HashMap::new(),
                order: Vec::new(),
            }),
        }
    }

    /// Register an agent.
    ///
    /// Re-registering the identical definition is a no-op (idempotent);
    /// registering a different definition under an existing identity fails
    /// with [`CourierError::DuplicateAgent`].
    pub async fn register(&self, agent: Agent) -> CourierResult<()> {
        let mut inner = self.inner.write().await;
        if let Some(existing) = inner.agents.get(&agent.id) {
            if existing.same_definition(&agent) {
                return Ok(());
            }
            return Err(CourierError::DuplicateAgent(agent.id));
        }

        info!(agent = %agent.id, category = %agent.category, "agent registered");
        inner.order.push(agent.id.clone());
        inner.agents.insert(agent.id.clone(), agent);
        Ok(())
    }

    /// Look up an agent by identity.
    pub async fn get(&self, id: &str) -> Option<Agent> {
        let inner = self.inner.read().await;
        inner.agents.get(id).cloned()
    }

    /// All agents, in registration order.
    pub async fn list(&self) -> Vec<Agent> {
        let inner = self.inner.read().await;
        inner
            .order
            .iter()
            .filter_map(|id| inner.agents.get(id).cloned())
            .collect()
    }

    /// Set an agent's status from external health reporting.
    ///
    /// Transitioning to busy requires a task reference; transitioning to
    /// available or offline clears the current task.
    pub async fn set_status(
        &self,
        id: &str,
        status: AgentStatus,
        task: Option<Uuid>,
    ) -> CourierResult<()> {
        let mut inner = self.inner.write().await;
        let agent = inner
            .agents
            .get_mut(id)
            .ok_or_else(|| CourierError::NotFound(format!("agent {id}")))?;

        match status {
            AgentStatus::Busy => {
                let task = task.ok_or_else(|| {
                    CourierError::InvalidStateTransition(format!(
                        "agent {id} cannot become busy without a task reference"
                    ))
                })?;
                agent.current_task = Some(task);
            }
            AgentStatus::Available | AgentStatus::Offline => {
                agent.current_task = None;
            }
        }
        agent.status = status;
        Ok(())
    }

    /// Atomically pick the best available agent by score and mark it busy.
    ///
    /// Scoring, selection, and the `available → busy` transition happen under
    /// one write lock. The highest non-zero scorer wins, ties broken by
    /// registration order; with no positive score the first available agent
    /// is chosen as graceful degradation. Fails with
    /// [`CourierError::NoAgentAvailable`] when nothing is available.
    pub async fn select_and_acquire<F>(&self, task_id: Uuid, score: F) -> CourierResult<Agent>
    where
        F: Fn(&Agent) -> usize,
    {
        let mut inner = self.inner.write().await;

        let mut best: Option<(&str, usize)> = None;
        let mut first_available: Option<&str> = None;
        for id in &inner.order {
            let Some(agent) = inner.agents.get(id) else {
                continue;
            };
            if agent.status != AgentStatus::Available {
                continue;
            }
            if first_available.is_none() {
                first_available = Some(id);
            }
            let s = score(agent);
            // Strictly-greater keeps the earliest registration on ties.
            if s > 0 && best.map_or(true, |(_, cur)| s > cur) {
                best = Some((id, s));
            }
        }

        let chosen = best
            .map(|(id, _)| id)
            .or(first_available)
            .ok_or(CourierError::NoAgentAvailable)?
            .to_string();

        if best.is_none() {
            warn!(agent = %chosen, "no capability match; falling back to first available agent");
        }

        let agent = inner
            .agents
            .get_mut(&chosen)
            .ok_or_else(|| CourierError::NotFound(format!("agent {chosen}")))?;
        agent.status = AgentStatus::Busy;
        agent.current_task = Some(task_id);
        Ok(agent.clone())
    }

    /// Return a busy agent to the pool without recording an outcome
    /// (e.g. the task was deferred offline rather than executed).
    pub async fn release(&self, id: &str) -> CourierResult<()> {
        self.release_inner(id, None).await
    }

    /// Return a busy agent to the pool and update its performance record.
    pub async fn release_with_result(
        &self,
        id: &str,
        success: bool,
        duration_ms: u64,
    ) -> CourierResult<()> {
        self.release_inner(id, Some((success, duration_ms))).await
    }

    async fn release_inner(
        &self,
        id: &str,
        outcome: Option<(bool, u64)>,
    ) -> CourierResult<()> {
        let mut inner = self.inner.write().await;
        let agent = inner
            .agents
            .get_mut(id)
            .ok_or_else(|| CourierError::NotFound(format!("agent {id}")))?;

        if agent.status != AgentStatus::Busy {
            return Err(CourierError::InvalidStateTransition(format!(
                "agent {id} released while {}",
                agent.status
            )));
        }

        if let Some((success, duration_ms)) = outcome {
            agent.performance.record(success, duration_ms);
        }
        agent.status = AgentStatus::Available;
        agent.current_task = None;
        Ok(())
    }

    /// Average duration of the best-scoring agent, for queue ETA estimates.
    /// Considers all agents regardless of status; returns `None` when no
    /// agent scores or the best scorer has no history.
    pub async fn estimate_duration_ms<F>(&self, score: F) -> Option<u64>
    where
        F: Fn(&Agent) -> usize,
    {
        let inner = self.inner.read().await;
        let mut best: Option<(&Agent, usize)> = None;
        for id in &inner.order {
            let Some(agent) = inner.agents.get(id) else {
                continue;
            };
            let s = score(agent);
            if s > 0 && best.map_or(true, |(_, cur)| s > cur) {
                best = Some((agent, s));
            }
        }
        best.and_then(|(agent, _)| agent.performance.average_duration_ms())
    }
}

impl Default for AgentRegistry {
    fn default() -> Self {
        Self::new()
    }
}
