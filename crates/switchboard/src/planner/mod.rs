//! Planner boundary
//!
//! A planner turns a natural-language query into proposed tasks. It gets
//! the available agents and the tasks already in flight so it can reuse
//! running work instead of proposing it again, and so it can add
//! prerequisite tasks (for example "find my location") when an agent needs
//! an input it cannot obtain itself.

mod model;

pub use model::*;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::agents::AgentDescriptor;
use crate::graph::Task;

/// Input handed to a planner
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanRequest {
    pub query: String,
    pub agents: Vec<AgentDescriptor>,
    pub in_flight: Vec<Task>,
}

/// A task as proposed by a planner
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProposedTask {
    pub id: String,
    pub agent: String,
    pub prompt: String,
    #[serde(default)]
    pub depends_on: Vec<String>,
}

impl ProposedTask {
    pub fn new(
        id: impl Into<String>,
        agent: impl Into<String>,
        prompt: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            agent: agent.into(),
            prompt: prompt.into(),
            depends_on: Vec::new(),
        }
    }

    /// Set dependencies
    pub fn with_dependencies(mut self, dependencies: Vec<impl Into<String>>) -> Self {
        self.depends_on = dependencies.into_iter().map(Into::into).collect();
        self
    }
}

impl From<ProposedTask> for Task {
    fn from(proposed: ProposedTask) -> Self {
        Task::new(proposed.id, proposed.agent, proposed.prompt)
            .with_dependencies(proposed.depends_on)
    }
}

/// Planner output
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProposedPlan {
    /// The caller does not intend to wait for completion
    #[serde(default)]
    pub is_async: bool,
    #[serde(default)]
    pub tasks: Vec<ProposedTask>,
}

impl ProposedPlan {
    pub fn new(tasks: Vec<ProposedTask>) -> Self {
        Self {
            is_async: false,
            tasks,
        }
    }

    pub fn with_async(mut self, is_async: bool) -> Self {
        self.is_async = is_async;
        self
    }
}

/// Turns a query into proposed tasks
#[async_trait]
pub trait Planner: Send + Sync {
    async fn propose_plan(&self, request: &PlanRequest) -> Result<ProposedPlan>;
}

/// Planner that always proposes the same plan
///
/// Re-proposing is harmless: the merger keeps the first task for each id.
#[derive(Debug, Clone, Default)]
pub struct StaticPlanner {
    plan: ProposedPlan,
}

impl StaticPlanner {
    pub fn new(plan: ProposedPlan) -> Self {
        Self { plan }
    }
}

#[async_trait]
impl Planner for StaticPlanner {
    async fn propose_plan(&self, request: &PlanRequest) -> Result<ProposedPlan> {
        tracing::debug!(
            query = %request.query,
            tasks = self.plan.tasks.len(),
            "Returning static plan"
        );
        Ok(self.plan.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_proposed_plan_parses_camel_case() {
        let plan: ProposedPlan = serde_json::from_value(json!({
            "isAsync": true,
            "tasks": [
                { "id": "get-location", "agent": "location", "prompt": "Where am I", "dependsOn": [] },
                { "id": "get-weather", "agent": "weather", "prompt": "Weather", "dependsOn": ["get-location"] }
            ]
        }))
        .unwrap();

        assert!(plan.is_async);
        assert_eq!(plan.tasks[1].depends_on, vec!["get-location".to_string()]);
    }

    #[test]
    fn test_missing_fields_default() {
        let plan: ProposedPlan = serde_json::from_value(json!({
            "tasks": [{ "id": "a", "agent": "x", "prompt": "p" }]
        }))
        .unwrap();

        assert!(!plan.is_async);
        assert!(plan.tasks[0].depends_on.is_empty());
    }

    #[test]
    fn test_proposed_task_into_pending_task() {
        let task: Task = ProposedTask::new("b", "maps", "Route")
            .with_dependencies(vec!["a"])
            .into();

        assert_eq!(task.depends_on, vec!["a".to_string()]);
        assert!(task.outcome.is_pending());
        assert!(!task.reported);
    }

    #[tokio::test]
    async fn test_static_planner_returns_its_plan() {
        let plan = ProposedPlan::new(vec![ProposedTask::new("a", "x", "p")]).with_async(true);
        let planner = StaticPlanner::new(plan.clone());
        let request = PlanRequest {
            query: "anything".to_string(),
            agents: Vec::new(),
            in_flight: Vec::new(),
        };

        assert_eq!(planner.propose_plan(&request).await.unwrap(), plan);
    }
}
