//! Router
//!
//! Entry point owning one task graph. `route_query` plans, merges,
//! compacts and starts work and returns at once; `poll_next_instructions`
//! is then called repeatedly to collect results.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::agents::{describe_agents, index_agents, AgentDirectory};
use crate::config::RouterConfig;
use crate::error::{RouterError, RouterResult};
use crate::events::{CompletionBus, ListenerId};
use crate::graph::state::GraphState;
use crate::graph::{compact_chains, merge_tasks, CompletedTask, GraphSnapshot, Task, TaskOutcome};
use crate::planner::{PlanRequest, Planner};
use crate::reporter::{Instructions, StatusReporter};
use crate::scheduler::Scheduler;

pub const BACKGROUND_INSTRUCTIONS: &str =
    "The request is being processed in the background and will complete on its own. End the call now.";

pub const POLL_INSTRUCTIONS: &str = "The request is now being processed in the background. Poll for the next instructions to check on the status and receive the results.";

/// Response of [`Router::route_query`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteResponse {
    /// Tasks of the whole graph still without a result
    pub task_ids_in_progress: Vec<String>,
    /// The planner judged that the caller will not wait for the result
    pub is_async: bool,
    pub instructions: String,
}

struct RouterInner {
    state: Arc<Mutex<GraphState>>,
    bus: Arc<CompletionBus>,
    directory: Arc<dyn AgentDirectory>,
    planner: Arc<dyn Planner>,
    scheduler: Scheduler,
    reporter: StatusReporter,
    config: RouterConfig,
}

/// Handle to one task graph and its collaborators
///
/// Cheap to clone; clones share the same graph.
#[derive(Clone)]
pub struct Router {
    inner: Arc<RouterInner>,
}

impl Router {
    pub fn new(directory: Arc<dyn AgentDirectory>, planner: Arc<dyn Planner>) -> Self {
        Self::with_config(directory, planner, RouterConfig::default())
    }

    pub fn with_config(
        directory: Arc<dyn AgentDirectory>,
        planner: Arc<dyn Planner>,
        config: RouterConfig,
    ) -> Self {
        let state = Arc::new(Mutex::new(GraphState::default()));
        let bus = Arc::new(CompletionBus::new());
        let scheduler = Scheduler::new(state.clone(), bus.clone(), config.clone());
        let reporter = StatusReporter::new(state.clone(), bus.clone(), config.clone());
        Self {
            inner: Arc::new(RouterInner {
                state,
                bus,
                directory,
                planner,
                scheduler,
                reporter,
                config,
            }),
        }
    }

    pub fn config(&self) -> &RouterConfig {
        &self.inner.config
    }

    /// Plan the query, add the new tasks to the graph and start them.
    ///
    /// Returns as soon as execution is started. Directory and planner
    /// failures leave the graph unchanged.
    pub async fn route_query(&self, query: &str) -> RouterResult<RouteResponse> {
        let agents = self
            .inner
            .directory
            .list_agents()
            .await
            .map_err(|e| RouterError::Directory(format!("{e:#}")))?;

        let request = PlanRequest {
            query: query.to_string(),
            agents: describe_agents(&agents),
            in_flight: self.inner.state.lock().tasks.values().cloned().collect(),
        };
        tracing::info!(
            query = %crate::logging::truncate_for_log(query, self.inner.config.log_truncate_len),
            agents = request.agents.len(),
            in_flight = request.in_flight.len(),
            "Routing query"
        );

        let plan = self
            .inner
            .planner
            .propose_plan(&request)
            .await
            .map_err(|e| RouterError::PlanGeneration(format!("{e:#}")))?;

        {
            let mut state = self.inner.state.lock();
            let added = merge_tasks(&mut state.tasks, plan.tasks.into_iter().map(Task::from));
            let compaction = compact_chains(&state.tasks, &state.started_ids());
            tracing::info!(
                added = added.len(),
                composites = compaction.composite_count(),
                tasks = compaction.tasks.len(),
                "Merged plan into graph"
            );
            state.tasks = compaction.tasks;
        }

        self.inner
            .scheduler
            .start_execution(Arc::new(index_agents(agents)))?;

        let task_ids_in_progress = self.inner.state.lock().ids_in_progress();
        let instructions = if plan.is_async {
            BACKGROUND_INSTRUCTIONS
        } else {
            POLL_INSTRUCTIONS
        };
        Ok(RouteResponse {
            task_ids_in_progress,
            is_async: plan.is_async,
            instructions: instructions.to_string(),
        })
    }

    /// Wait (bounded by the poll timeout) for new results
    pub async fn poll_next_instructions(&self) -> Instructions {
        self.inner.reporter.poll_next_instructions().await
    }

    /// Copy of the current graph
    pub fn current_graph(&self) -> GraphSnapshot {
        self.inner.state.lock().snapshot()
    }

    pub fn is_executing(&self) -> bool {
        self.inner.state.lock().is_executing()
    }

    /// Error of the last task whose execution aborted
    pub fn execution_failure(&self) -> Option<RouterError> {
        self.inner.state.lock().last_failure.clone()
    }

    pub fn on_task_completed<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&CompletedTask) + Send + Sync + 'static,
    {
        self.inner.bus.on_task_completed(listener)
    }

    /// Wait at most `timeout` for the next task of the graph to finish.
    pub async fn wait_for_completion(&self, timeout: Duration) -> Option<CompletedTask> {
        self.inner.bus.wait_next(timeout).await
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.inner.bus.remove_listener(id)
    }

    pub fn listener_count(&self) -> usize {
        self.inner.bus.listener_count()
    }

    /// Add a task without starting it; an existing id is kept.
    pub fn inject_task(&self, task: Task) -> bool {
        let mut state = self.inner.state.lock();
        !merge_tasks(&mut state.tasks, [task]).is_empty()
    }

    /// Store a successful result for a pending task and notify listeners.
    pub fn complete_task(&self, task_id: &str, value: Value) -> RouterResult<()> {
        let completed = {
            let mut state = self.inner.state.lock();
            let task = state
                .tasks
                .get_mut(task_id)
                .ok_or_else(|| RouterError::TaskNotFound(task_id.to_string()))?;
            if !task.outcome.is_pending() {
                return Ok(());
            }
            task.outcome = TaskOutcome::succeeded(value);
            CompletedTask::from(&*task)
        };
        self.inner.bus.notify(&completed);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::StaticDirectory;
    use crate::planner::{ProposedPlan, StaticPlanner};
    use anyhow::anyhow;
    use async_trait::async_trait;
    use serde_json::json;

    struct FailingPlanner;

    #[async_trait]
    impl Planner for FailingPlanner {
        async fn propose_plan(&self, _request: &PlanRequest) -> anyhow::Result<ProposedPlan> {
            Err(anyhow!("model refused"))
        }
    }

    fn empty_router() -> Router {
        Router::new(
            Arc::new(StaticDirectory::default()),
            Arc::new(StaticPlanner::default()),
        )
    }

    #[tokio::test]
    async fn test_plan_failure_leaves_graph_empty() {
        let router = Router::new(Arc::new(StaticDirectory::default()), Arc::new(FailingPlanner));

        let err = router.route_query("anything").await.unwrap_err();

        assert_eq!(err, RouterError::PlanGeneration("model refused".to_string()));
        assert!(router.current_graph().is_empty());
        assert!(!router.is_executing());
    }

    #[tokio::test]
    async fn test_empty_plan_starts_nothing() {
        let router = empty_router();

        let response = router.route_query("hello").await.unwrap();

        assert!(response.task_ids_in_progress.is_empty());
        assert_eq!(response.instructions, POLL_INSTRUCTIONS);
        assert!(!router.is_executing());
    }

    #[test]
    fn test_inject_and_complete() {
        let router = empty_router();
        let published = Arc::new(Mutex::new(Vec::new()));
        let sink = published.clone();
        let id = router.on_task_completed(move |t| sink.lock().push(t.id.clone()));

        assert!(router.inject_task(Task::new("a", "x", "A")));
        assert!(!router.inject_task(Task::new("a", "y", "other")));
        router.complete_task("a", json!("done")).unwrap();

        let graph = router.current_graph();
        assert_eq!(graph.get("a").unwrap().agent, "x");
        assert_eq!(graph.get("a").unwrap().outcome.value(), Some(&json!("done")));
        assert_eq!(*published.lock(), vec!["a".to_string()]);
        assert!(router.remove_listener(id));
    }

    #[test]
    fn test_complete_unknown_task() {
        let router = empty_router();
        assert_eq!(
            router.complete_task("ghost", json!(null)),
            Err(RouterError::TaskNotFound("ghost".to_string()))
        );
    }
}
