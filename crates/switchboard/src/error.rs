//! Router error types

use thiserror::Error;

/// Result type alias for router operations
pub type RouterResult<T> = Result<T, RouterError>;

/// Error types for routing, scheduling and reporting.
///
/// Payloads are plain strings so the error is `Clone` and can be handed to
/// every dependent awaiting a shared execution handle.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RouterError {
    /// A task names an agent the directory does not know
    #[error("Agent not found: {0}")]
    AgentNotFound(String),

    /// A task referenced a dependency that owns no execution handle
    #[error("Dependency task {dependency} not found or not started for task {task_id}")]
    DependencyNotStarted { task_id: String, dependency: String },

    /// An upstream task failed, so this one never ran
    #[error("Task {task_id} skipped: dependency {dependency} failed: {reason}")]
    DependencyFailed {
        task_id: String,
        dependency: String,
        reason: String,
    },

    /// The agent call itself returned an error
    #[error("Agent {agent} failed on task {task_id}: {message}")]
    AgentInvocation {
        task_id: String,
        agent: String,
        message: String,
    },

    /// The planner could not produce a task graph
    #[error("Plan generation failed: {0}")]
    PlanGeneration(String),

    /// The capability directory could not list agents
    #[error("Agent directory unavailable: {0}")]
    Directory(String),

    /// The spawned task ended without writing an outcome (panic or runtime shutdown)
    #[error("Task {task_id} aborted: {reason}")]
    TaskAborted { task_id: String, reason: String },

    /// A task already carried a failed outcome before it was scheduled
    #[error("Task {task_id} failed: {reason}")]
    TaskFailed { task_id: String, reason: String },

    /// No task with this id exists in the graph
    #[error("Task not found: {0}")]
    TaskNotFound(String),

    /// Invalid or unreadable configuration
    #[error("Configuration error: {0}")]
    Config(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages_name_the_task() {
        let err = RouterError::DependencyNotStarted {
            task_id: "get-weather".to_string(),
            dependency: "get-location".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Dependency task get-location not found or not started for task get-weather"
        );

        let err = RouterError::AgentInvocation {
            task_id: "t1".to_string(),
            agent: "weather".to_string(),
            message: "timeout".to_string(),
        };
        assert!(err.to_string().contains("weather"));
        assert!(err.to_string().contains("timeout"));
    }

    #[test]
    fn test_error_is_cloneable() {
        let err = RouterError::AgentNotFound("maps".to_string());
        assert_eq!(err.clone(), err);
    }
}
