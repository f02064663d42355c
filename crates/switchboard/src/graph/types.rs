//! Task graph data types
//!
//! A [`Task`] is one unit of work bound to an agent, a prompt and the ids of
//! the tasks whose results it needs. Its [`TaskOutcome`] moves from
//! `Pending` to a terminal state exactly once.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Tasks keyed by id, in insertion order
pub type TaskMap = IndexMap<String, Task>;

/// Terminal or pending state of a task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum TaskOutcome {
    /// Not finished yet (or never started)
    #[default]
    Pending,
    /// The agent produced a value
    #[serde(rename_all = "camelCase")]
    Succeeded {
        value: Value,
        completed_at: DateTime<Utc>,
    },
    /// The task failed or could not run
    #[serde(rename_all = "camelCase")]
    Failed {
        error: String,
        completed_at: DateTime<Utc>,
    },
}

impl TaskOutcome {
    /// Create a successful outcome stamped with the current time
    pub fn succeeded(value: Value) -> Self {
        Self::Succeeded {
            value,
            completed_at: Utc::now(),
        }
    }

    /// Create a failed outcome stamped with the current time
    pub fn failed(error: impl Into<String>) -> Self {
        Self::Failed {
            error: error.into(),
            completed_at: Utc::now(),
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }

    /// Whether the task has a result (successful or not)
    pub fn is_terminal(&self) -> bool {
        !self.is_pending()
    }

    pub fn value(&self) -> Option<&Value> {
        match self {
            Self::Succeeded { value, .. } => Some(value),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            Self::Failed { error, .. } => Some(error),
            _ => None,
        }
    }
}

/// A node of the task graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    /// Unique id within the graph
    pub id: String,
    /// Id of the agent that runs this task
    pub agent: String,
    /// Self-contained instruction for the agent
    pub prompt: String,
    /// Ids of tasks whose results this task needs
    #[serde(default)]
    pub depends_on: Vec<String>,
    /// Current outcome
    #[serde(default)]
    pub outcome: TaskOutcome,
    /// Whether the outcome has been handed to a poller
    #[serde(default)]
    pub reported: bool,
    /// Ids of the original tasks when this is a composite task
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub merged_from: Vec<String>,
}

impl Task {
    /// Create a new pending task without dependencies
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
            outcome: TaskOutcome::Pending,
            reported: false,
            merged_from: Vec::new(),
        }
    }

    /// Set dependencies
    pub fn with_dependencies(mut self, dependencies: Vec<impl Into<String>>) -> Self {
        self.depends_on = dependencies.into_iter().map(Into::into).collect();
        self
    }

    pub fn has_result(&self) -> bool {
        self.outcome.is_terminal()
    }

    pub fn depends_on_task(&self, task_id: &str) -> bool {
        self.depends_on.iter().any(|d| d == task_id)
    }

    pub fn is_composite(&self) -> bool {
        !self.merged_from.is_empty()
    }
}

/// Serialisable copy of the graph, without execution handles
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphSnapshot {
    pub tasks: Vec<Task>,
    /// Whether a graph-level execution is in progress
    pub executing: bool,
}

impl GraphSnapshot {
    pub fn get(&self, task_id: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == task_id)
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

/// Published on the completion bus whenever a task reaches a terminal outcome
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletedTask {
    pub id: String,
    pub agent: String,
    pub outcome: TaskOutcome,
}

impl From<&Task> for CompletedTask {
    fn from(task: &Task) -> Self {
        Self {
            id: task.id.clone(),
            agent: task.agent.clone(),
            outcome: task.outcome.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_task_builder() {
        let task = Task::new("get-weather", "weather", "Get weather for Aarhus")
            .with_dependencies(vec!["get-location"]);

        assert_eq!(task.id, "get-weather");
        assert_eq!(task.depends_on, vec!["get-location".to_string()]);
        assert!(task.outcome.is_pending());
        assert!(!task.reported);
        assert!(!task.is_composite());
        assert!(task.depends_on_task("get-location"));
    }

    #[test]
    fn test_outcome_accessors() {
        let ok = TaskOutcome::succeeded(json!("Sunny"));
        assert!(ok.is_terminal());
        assert_eq!(ok.value(), Some(&json!("Sunny")));
        assert_eq!(ok.error(), None);

        let failed = TaskOutcome::failed("boom");
        assert!(failed.is_terminal());
        assert_eq!(failed.value(), None);
        assert_eq!(failed.error(), Some("boom"));
    }

    #[test]
    fn test_task_serializes_camel_case() {
        let task = Task::new("b", "maps", "Route").with_dependencies(vec!["a"]);
        let value = serde_json::to_value(&task).unwrap();

        assert_eq!(value["dependsOn"], json!(["a"]));
        assert_eq!(value["outcome"]["status"], json!("pending"));
        assert!(value.get("mergedFrom").is_none());
    }

    #[test]
    fn test_task_deserializes_with_defaults() {
        let task: Task = serde_json::from_value(json!({
            "id": "t1",
            "agent": "weather",
            "prompt": "Get weather"
        }))
        .unwrap();

        assert!(task.depends_on.is_empty());
        assert!(task.outcome.is_pending());
    }
}
