use crate::registry::AgentRegistry;
use crate::types::{Agent, Task};
use courier_core::CourierResult;
use std::sync::Arc;
use tracing::info;

/// Routes tasks to the best-matching available agent.
///
/// The match score is the number of the agent's capability tags whose
/// normalized text (lowercase, underscores as spaces) appears as a substring
/// of the task description. Selection and the busy transition are atomic in
/// the registry, so two queues racing for the same agent cannot both win.
pub struct Router {
    registry: Arc<AgentRegistry>,
}

impl Router {
    /// Create a router over the shared registry.
    pub fn new(registry: Arc<AgentRegistry>) -> Self {
        Self { registry }
    }

    /// Assign the task to an agent and mark it busy.
    ///
    /// The caller is responsible for releasing the agent after the task
    /// completes or fails. Fails with `NoAgentAvailable` when no agent is
    /// available at all.
    pub async fn assign(&self, task: &Task) -> CourierResult<Agent> {
        let score = capability_scorer(&task.description);
        let agent = self.registry.select_and_acquire(task.id, score).await?;
        info!(task = %task.id, agent = %agent.id, "task routed");
        Ok(agent)
    }

    /// The capability tag of `agent` that best matches `description`, used
    /// as the dispatch key. Falls back to `None` when nothing matches
    /// (fallback assignments dispatch under the task category instead).
    pub fn matched_capability(agent: &Agent, description: &str) -> Option<String> {
        let haystack = description.to_lowercase();
        agent
            .capabilities
            .iter()
            .find(|tag| haystack.contains(&normalize_tag(tag)))
            .cloned()
    }
}

/// Build the scoring closure for a task description.
pub(crate) fn capability_scorer(description: &str) -> impl Fn(&Agent) -> usize {
    let haystack = description.to_lowercase();
    move |agent| {
        agent
            .capabilities
            .iter()
            .filter(|tag| haystack.contains(&normalize_tag(tag)))
            .count()
    }
}

fn normalize_tag(tag: &str) -> String {
    tag.to_lowercase().replace('_', " ")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::types::AgentStatus;
    use courier_core::{CourierError, Priority, TaskCategory};

    fn make_task(description: &str) -> Task {
        Task::new(description, TaskCategory::General, Priority::Medium)
    }

    fn make_agent(id: &str, capabilities: &[&str]) -> Agent {
        Agent::new(
            id,
            id,
            TaskCategory::General,
            capabilities.iter().map(|s| (*s).to_string()).collect(),
        )
    }

    async fn registry_with(agents: Vec<Agent>) -> Arc<AgentRegistry> {
        let registry = Arc::new(AgentRegistry::new());
        for agent in agents {
            registry.register(agent).await.unwrap();
        }
        registry
    }

    #[tokio::test]
    async fn test_capability_match_wins() {
        let registry = registry_with(vec![
            make_agent("reminder-agent", &["send_reminders", "remind"]),
            make_agent("grocery-agent", &["order_groceries", "buy"]),
        ])
        .await;
        let router = Router::new(registry);

        let task = make_task("order groceries for the week");
        let agent = router.assign(&task).await.unwrap();
        assert_eq!(agent.id, "grocery-agent");
        assert_eq!(agent.status, AgentStatus::Busy);
        assert_eq!(agent.current_task, Some(task.id));
    }

    #[tokio::test]
    async fn test_underscores_match_as_spaces() {
        let registry =
            registry_with(vec![make_agent("booking-agent", &["book_appointments"])]).await;
        let router = Router::new(registry);

        let task = make_task("Please book appointments with the dentist");
        let agent = router.assign(&task).await.unwrap();
        assert_eq!(agent.id, "booking-agent");
    }

    #[tokio::test]
    async fn test_higher_overlap_beats_single_match() {
        let registry = registry_with(vec![
            make_agent("narrow", &["order"]),
            make_agent("broad", &["order", "groceries"]),
        ])
        .await;
        let router = Router::new(registry);

        let agent = router
            .assign(&make_task("order groceries today"))
            .await
            .unwrap();
        assert_eq!(agent.id, "broad");
    }

    #[tokio::test]
    async fn test_fallback_to_first_available() {
        let registry = registry_with(vec![
            make_agent("generalist", &["assist"]),
            make_agent("specialist", &["order_groceries"]),
        ])
        .await;
        let router = Router::new(registry);

        // No capability matches: the first-registered available agent wins.
        let agent = router.assign(&make_task("fold the laundry")).await.unwrap();
        assert_eq!(agent.id, "generalist");
    }

    #[tokio::test]
    async fn test_no_agent_available_when_all_busy() {
        let registry = registry_with(vec![make_agent("grocery-agent", &["order_groceries"])]).await;
        let router = Router::new(Arc::clone(&registry));

        let first = make_task("order groceries for the week");
        router.assign(&first).await.unwrap();

        let err = router
            .assign(&make_task("anything else"))
            .await
            .unwrap_err();
        assert!(matches!(err, CourierError::NoAgentAvailable));

        // Releasing makes the agent routable again.
        registry
            .release_with_result("grocery-agent", true, 50)
            .await
            .unwrap();
        assert!(router.assign(&make_task("order groceries")).await.is_ok());
    }

    #[tokio::test]
    async fn test_offline_agents_are_skipped() {
        let registry = registry_with(vec![
            make_agent("away", &["order_groceries"]),
            make_agent("present", &["order_groceries"]),
        ])
        .await;
        registry
            .set_status("away", AgentStatus::Offline, None)
            .await
            .unwrap();
        let router = Router::new(registry);

        let agent = router.assign(&make_task("order groceries")).await.unwrap();
        assert_eq!(agent.id, "present");
    }

    #[test]
    fn test_matched_capability() {
        let agent = make_agent("a", &["book_appointments", "reserve"]);
        assert_eq!(
            Router::matched_capability(&agent, "book appointments tomorrow"),
            Some("book_appointments".to_string())
        );
        assert_eq!(Router::matched_capability(&agent, "water the garden"), None);
    }
}
