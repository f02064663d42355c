//! Poll protocol
//!
//! Callers poll repeatedly for newly finished work. Each poll waits a
//! bounded time for a completion, hands out every result nobody has seen
//! yet (leaves first) and says whether to poll again.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::time::Instant;

use crate::config::RouterConfig;
use crate::events::CompletionBus;
use crate::graph::state::GraphState;

pub const STILL_PROCESSING_INSTRUCTIONS: &str =
    "Still processing the request. Poll again to wait a bit longer for it to complete.";

pub const ALL_COMPLETED_INSTRUCTIONS: &str =
    "All tasks have completed. Summarize the new completed task results in a detailed manner.";

pub const PARTIAL_LEAF_INSTRUCTIONS: &str = "More tasks have finished, but not all tasks have completed yet. Summarize the new completed task results briefly, then poll again.";

pub const PARTIAL_INTERMEDIATE_INSTRUCTIONS: &str = "More tasks have finished, but not all tasks have completed yet. Mention briefly that the information was received, then poll again.";

/// Coarse state of a poll response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PollStatus {
    /// Nothing finished within the wait
    StillProcessing,
    /// Some tasks finished, others are still running
    Partial,
    /// Every task has a result; the graph was cleared
    AllCompleted,
}

/// One reported task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletedTaskResult {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Response of one poll
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Instructions {
    pub status: PollStatus,
    pub instructions: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_task_results: Option<Vec<CompletedTaskResult>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_ids_in_progress: Option<Vec<String>>,
}

impl Instructions {
    fn still_processing() -> Self {
        Self {
            status: PollStatus::StillProcessing,
            instructions: STILL_PROCESSING_INSTRUCTIONS.to_string(),
            completed_task_results: None,
            task_ids_in_progress: None,
        }
    }

    pub fn is_done(&self) -> bool {
        self.status == PollStatus::AllCompleted
    }
}

pub(crate) struct StatusReporter {
    state: Arc<Mutex<GraphState>>,
    bus: Arc<CompletionBus>,
    config: RouterConfig,
}

impl StatusReporter {
    pub(crate) fn new(
        state: Arc<Mutex<GraphState>>,
        bus: Arc<CompletionBus>,
        config: RouterConfig,
    ) -> Self {
        Self { state, bus, config }
    }

    /// Wait (bounded) for unreported results and describe them.
    ///
    /// Never fails: a poll that sees nothing new before the deadline says
    /// so and leaves the graph untouched.
    pub(crate) async fn poll_next_instructions(&self) -> Instructions {
        let deadline = Instant::now() + self.config.poll_timeout();
        loop {
            let waiter = {
                let mut state = self.state.lock();
                let ready = state.unreported_completions();
                if !ready.is_empty() {
                    return report(&mut state, &ready);
                }
                // subscribe under the lock so a completion cannot slip in between
                self.bus.register_waiter()
            };

            if waiter.wait_until(deadline).await.is_none() {
                tracing::debug!("Poll timed out with nothing new");
                return Instructions::still_processing();
            }
        }
    }
}

fn report(state: &mut GraphState, ready: &[String]) -> Instructions {
    let leaves: Vec<&String> = ready.iter().filter(|id| state.is_leaf(id)).collect();
    let has_leaves = !leaves.is_empty();
    let batch: Vec<&String> = if has_leaves {
        leaves
    } else {
        ready.iter().collect()
    };

    let mut results = Vec::with_capacity(batch.len());
    for id in batch {
        let Some(task) = state.tasks.get_mut(id.as_str()) else {
            continue;
        };
        task.reported = true;
        results.push(CompletedTaskResult {
            id: task.id.clone(),
            result: if has_leaves {
                task.outcome.value().cloned()
            } else {
                None
            },
            error: task.outcome.error().map(str::to_string),
        });
    }

    if state.all_completed() {
        tracing::info!(reported = results.len(), "All tasks completed, clearing graph");
        state.reset();
        return Instructions {
            status: PollStatus::AllCompleted,
            instructions: ALL_COMPLETED_INSTRUCTIONS.to_string(),
            completed_task_results: Some(results),
            task_ids_in_progress: None,
        };
    }

    let in_progress = state.ids_in_progress();
    tracing::debug!(
        reported = results.len(),
        in_progress = in_progress.len(),
        leaves = has_leaves,
        "Reporting partial progress"
    );
    Instructions {
        status: PollStatus::Partial,
        instructions: if has_leaves {
            PARTIAL_LEAF_INSTRUCTIONS
        } else {
            PARTIAL_INTERMEDIATE_INSTRUCTIONS
        }
        .to_string(),
        completed_task_results: Some(results),
        task_ids_in_progress: Some(in_progress),
    }
}
