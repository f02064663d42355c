//! Dependency-aware task scheduler
//!
//! Starts every unstarted task of the graph on the tokio runtime. A started
//! task waits for the execution handles of all its dependencies, then runs
//! its agent with the dependency results prepended to its prompt. A
//! supervisor keeps the graph-level execution alive until every handle,
//! including handles added by later routes, has resolved. A panicking agent
//! fails its own task before any dependent observes the failure.

use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::future::{self, BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use serde_json::Value;

use crate::agents::Agent;
use crate::config::RouterConfig;
use crate::error::{RouterError, RouterResult};
use crate::events::CompletionBus;
use crate::graph::state::GraphState;
use crate::graph::{render_tree, CompletedTask, Task, TaskOutcome};
use crate::logging::truncate_for_log;

/// Cloneable execution handle of a started task
pub(crate) type TaskHandle = Shared<BoxFuture<'static, RouterResult<()>>>;

/// Agents available to one execution pass, keyed by id
pub(crate) type AgentIndex = Arc<HashMap<String, Arc<dyn Agent>>>;

fn ready_handle(result: RouterResult<()>) -> TaskHandle {
    future::ready(result).boxed().shared()
}

#[derive(Clone)]
pub(crate) struct Scheduler {
    state: Arc<Mutex<GraphState>>,
    bus: Arc<CompletionBus>,
    config: RouterConfig,
}

impl Scheduler {
    pub(crate) fn new(
        state: Arc<Mutex<GraphState>>,
        bus: Arc<CompletionBus>,
        config: RouterConfig,
    ) -> Self {
        Self { state, bus, config }
    }

    /// Start every task that has no execution handle yet.
    ///
    /// Idempotent: tasks already started are left alone and at most one
    /// supervisor runs at a time. Returns the first `DependencyNotStarted`
    /// error when some task could not be started.
    pub(crate) fn start_execution(&self, agents: AgentIndex) -> RouterResult<()> {
        let (first_error, completions) = {
            let mut state = self.state.lock();

            if self.config.render_graph_on_start && !state.tasks.is_empty() {
                tracing::debug!("Task graph:\n{}", render_tree(&state.tasks));
            }

            let outcome = self.schedule_pending(&mut state, &agents);

            if !state.is_executing() && !state.handles.is_empty() {
                let supervisor = self.clone();
                state.supervisor = Some(tokio::spawn(async move { supervisor.supervise().await }));
                tracing::info!(tasks = state.tasks.len(), "Graph execution started");
            }
            outcome
        };

        for completed in &completions {
            self.bus.notify(completed);
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Give every unstarted task a handle, dependencies first.
    ///
    /// Terminal tasks without a handle (injected or completed by hand) get a
    /// ready one. A pass that starts nothing means the remaining tasks wait
    /// on an id that will never get a handle; the first of them is failed
    /// and the scan goes on, so its dependents fail in turn when they run.
    fn schedule_pending(
        &self,
        state: &mut GraphState,
        agents: &AgentIndex,
    ) -> (Option<RouterError>, Vec<CompletedTask>) {
        let GraphState {
            tasks,
            handles,
            generation,
            ..
        } = state;
        let handles_before = handles.len();

        for task in tasks.values() {
            if task.has_result() && !handles.contains_key(&task.id) {
                let result = match &task.outcome {
                    TaskOutcome::Failed { error, .. } => Err(RouterError::TaskFailed {
                        task_id: task.id.clone(),
                        reason: error.clone(),
                    }),
                    _ => Ok(()),
                };
                handles.insert(task.id.clone(), ready_handle(result));
            }
        }

        let mut unstarted: Vec<String> = tasks
            .values()
            .filter(|t| !handles.contains_key(&t.id))
            .map(|t| t.id.clone())
            .collect();
        unstarted.sort_by_key(|id| tasks.get(id).map_or(0, |t| t.depends_on.len()));

        let mut first_error = None;
        let mut completions = Vec::new();

        while !unstarted.is_empty() {
            let mut progressed = false;
            unstarted.retain(|id| {
                let Some(task) = tasks.get(id) else {
                    return false;
                };
                let dependencies: Option<Vec<(String, TaskHandle)>> = task
                    .depends_on
                    .iter()
                    .map(|dep| handles.get(dep).map(|h| (dep.clone(), h.clone())))
                    .collect();
                match dependencies {
                    Some(dependencies) => {
                        let handle = self.spawn_task(task.clone(), dependencies, agents.clone());
                        handles.insert(id.clone(), handle);
                        progressed = true;
                        false
                    }
                    None => true,
                }
            });

            if progressed || unstarted.is_empty() {
                continue;
            }

            let stuck_id = unstarted.remove(0);
            let Some(task) = tasks.get_mut(&stuck_id) else {
                continue;
            };
            let dependency = task
                .depends_on
                .iter()
                .find(|dep| !handles.contains_key(*dep))
                .cloned()
                .unwrap_or_default();
            let err = RouterError::DependencyNotStarted {
                task_id: stuck_id.clone(),
                dependency,
            };
            tracing::error!(task_id = %stuck_id, error = %err, "Cannot start task");

            task.outcome = TaskOutcome::failed(err.to_string());
            completions.push(CompletedTask::from(&*task));
            handles.insert(stuck_id, ready_handle(Err(err.clone())));
            first_error.get_or_insert(err);
        }

        if handles.len() != handles_before {
            *generation += 1;
        }
        (first_error, completions)
    }

    fn spawn_task(
        &self,
        task: Task,
        dependencies: Vec<(String, TaskHandle)>,
        agents: AgentIndex,
    ) -> TaskHandle {
        let task_id = task.id.clone();
        tracing::debug!(
            task_id = %task_id,
            agent = %task.agent,
            dependencies = dependencies.len(),
            "Scheduling task"
        );

        let scheduler = self.clone();
        let join = tokio::spawn(async move {
            let task_id = task.id.clone();
            match AssertUnwindSafe(scheduler.run_task(task, dependencies, agents))
                .catch_unwind()
                .await
            {
                Ok(result) => result,
                Err(panic) => scheduler.abort(&task_id, panic_message(&*panic)),
            }
        });

        let scheduler = self.clone();
        async move {
            match join.await {
                Ok(result) => result,
                Err(e) => scheduler.abort(&task_id, e.to_string()),
            }
        }
        .boxed()
        .shared()
    }

    /// Fail a task whose execution ended abnormally and keep the error as
    /// the graph's last failure.
    fn abort(&self, task_id: &str, reason: String) -> RouterResult<()> {
        let err = RouterError::TaskAborted {
            task_id: task_id.to_string(),
            reason,
        };
        tracing::error!(task_id, error = %err, "Task execution aborted");
        self.state.lock().last_failure = Some(err.clone());
        self.finish(task_id, Err(err))
    }

    async fn run_task(
        &self,
        task: Task,
        dependencies: Vec<(String, TaskHandle)>,
        agents: AgentIndex,
    ) -> RouterResult<()> {
        let (dependency_ids, dependency_handles): (Vec<String>, Vec<TaskHandle>) =
            dependencies.into_iter().unzip();
        let results = future::join_all(dependency_handles).await;

        let failed_dependency = dependency_ids
            .iter()
            .zip(results)
            .find_map(|(id, result)| result.err().map(|e| (id.clone(), e)));
        if let Some((dependency, cause)) = failed_dependency {
            let err = RouterError::DependencyFailed {
                task_id: task.id.clone(),
                dependency,
                reason: cause.to_string(),
            };
            tracing::warn!(task_id = %task.id, error = %err, "Skipping task");
            return self.finish(&task.id, Err(err));
        }

        let result = self.invoke_agent(&task, &dependency_ids, &agents).await;
        self.finish(&task.id, result)
    }

    async fn invoke_agent(
        &self,
        task: &Task,
        dependency_ids: &[String],
        agents: &AgentIndex,
    ) -> RouterResult<Value> {
        let agent = agents
            .get(&task.agent)
            .cloned()
            .ok_or_else(|| RouterError::AgentNotFound(task.agent.clone()))?;

        let context = {
            let state = self.state.lock();
            dependency_ids
                .iter()
                .filter_map(|id| {
                    state
                        .tasks
                        .get(id)
                        .and_then(|t| t.outcome.value())
                        .map(|value| (id.clone(), value.clone()))
                })
                .collect::<Vec<_>>()
        };
        let prompt = prompt_with_context(&task.prompt, &context);

        let truncate = self.config.log_truncate_len;
        tracing::info!(
            task_id = %task.id,
            agent = %task.agent,
            prompt = %truncate_for_log(&prompt, truncate),
            "Running task"
        );

        match agent.invoke(&prompt).await {
            Ok(response) => {
                tracing::info!(
                    task_id = %task.id,
                    output = %truncate_for_log(&response.text, truncate),
                    "Task completed"
                );
                Ok(Value::String(response.text))
            }
            Err(e) => Err(RouterError::AgentInvocation {
                task_id: task.id.clone(),
                agent: task.agent.clone(),
                message: format!("{e:#}"),
            }),
        }
    }

    /// Store the outcome if the task is still pending and publish it.
    fn finish(&self, task_id: &str, result: RouterResult<Value>) -> RouterResult<()> {
        let completed = {
            let mut state = self.state.lock();
            match state.tasks.get_mut(task_id) {
                Some(task) if task.outcome.is_pending() => {
                    task.outcome = match &result {
                        Ok(value) => TaskOutcome::succeeded(value.clone()),
                        Err(e) => TaskOutcome::failed(e.to_string()),
                    };
                    Some(CompletedTask::from(&*task))
                }
                _ => None,
            }
        };

        if let Err(e) = &result {
            tracing::warn!(task_id, error = %e, "Task failed");
        }
        if let Some(completed) = completed {
            self.bus.notify(&completed);
        }
        result.map(|_| ())
    }

    /// Await all handles until a round ends with no new handles created.
    async fn supervise(&self) {
        loop {
            let (generation, handles) = {
                let state = self.state.lock();
                let handles: Vec<(String, TaskHandle)> = state
                    .handles
                    .iter()
                    .map(|(id, h)| (id.clone(), h.clone()))
                    .collect();
                (state.generation, handles)
            };

            let results =
                future::join_all(handles.into_iter().map(|(id, h)| async move { (id, h.await) }))
                    .await;

            let mut completions = Vec::new();
            let finished = {
                let mut state = self.state.lock();
                for (task_id, result) in results {
                    let Err(err @ RouterError::TaskAborted { .. }) = result else {
                        continue;
                    };
                    // Normally already recorded by the task's own handle
                    let Some(task) = state.tasks.get_mut(&task_id) else {
                        continue;
                    };
                    if !task.outcome.is_pending() {
                        continue;
                    }
                    task.outcome = TaskOutcome::failed(err.to_string());
                    completions.push(CompletedTask::from(&*task));
                    tracing::error!(task_id = %task_id, error = %err, "Task execution aborted");
                    state.last_failure = Some(err);
                }

                if state.generation == generation {
                    state.supervisor = None;
                    true
                } else {
                    false
                }
            };

            for completed in &completions {
                self.bus.notify(completed);
            }
            if finished {
                tracing::info!("Graph execution finished");
                break;
            }
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        format!("panicked: {message}")
    } else if let Some(message) = panic.downcast_ref::<String>() {
        format!("panicked: {message}")
    } else {
        "panicked".to_string()
    }
}

/// Prepend the dependency results to a task prompt.
pub(crate) fn prompt_with_context(prompt: &str, context: &[(String, Value)]) -> String {
    if context.is_empty() {
        return prompt.to_string();
    }
    let blocks = context
        .iter()
        .map(|(id, value)| {
            let json = serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string());
            format!("## {id} result\n```json\n{json}\n```")
        })
        .collect::<Vec<_>>()
        .join("\n\n");
    format!("# Context\n{blocks}\n\n# Task Prompt\n{prompt}")
}
