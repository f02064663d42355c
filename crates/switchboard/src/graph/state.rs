//! Shared graph state
//!
//! One `GraphState` lives behind the router's mutex. Merger, optimizer and
//! scheduler mutate it; the status reporter reads it and clears it once
//! every task has a result.

use std::collections::{HashMap, HashSet};

use tokio::task::JoinHandle;

use super::types::{GraphSnapshot, TaskMap};
use crate::error::RouterError;
use crate::scheduler::TaskHandle;

#[derive(Default)]
pub(crate) struct GraphState {
    pub(crate) tasks: TaskMap,
    /// Execution handle per started task
    pub(crate) handles: HashMap<String, TaskHandle>,
    /// Graph-level execution, present while the supervisor runs
    pub(crate) supervisor: Option<JoinHandle<()>>,
    /// Bumped whenever new execution handles are created
    pub(crate) generation: u64,
    /// Failure the supervisor or scheduler could not attach to a task result
    pub(crate) last_failure: Option<RouterError>,
}

impl GraphState {
    /// A leaf is a task no other task depends on.
    pub(crate) fn is_leaf(&self, task_id: &str) -> bool {
        !self.tasks.values().any(|t| t.depends_on_task(task_id))
    }

    /// Ids of tasks with a result that no poller has seen yet
    pub(crate) fn unreported_completions(&self) -> Vec<String> {
        self.tasks
            .values()
            .filter(|t| t.has_result() && !t.reported)
            .map(|t| t.id.clone())
            .collect()
    }

    pub(crate) fn ids_in_progress(&self) -> Vec<String> {
        self.tasks
            .values()
            .filter(|t| !t.has_result())
            .map(|t| t.id.clone())
            .collect()
    }

    pub(crate) fn all_completed(&self) -> bool {
        self.tasks.values().all(|t| t.has_result())
    }

    pub(crate) fn started_ids(&self) -> HashSet<String> {
        self.handles.keys().cloned().collect()
    }

    pub(crate) fn is_executing(&self) -> bool {
        self.supervisor
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    pub(crate) fn snapshot(&self) -> GraphSnapshot {
        GraphSnapshot {
            tasks: self.tasks.values().cloned().collect(),
            executing: self.is_executing(),
        }
    }

    /// Drop every task and handle, ready for an unrelated query.
    ///
    /// A running supervisor keeps its own clones of the handles and exits
    /// on its own once they resolve.
    pub(crate) fn reset(&mut self) {
        self.tasks.clear();
        self.handles.clear();
    }
}
