//! Language-model backed planner
//!
//! Renders the decomposition instructions, the query, the available agents
//! and the in-flight tasks into one prompt, asks a model for a JSON plan
//! and parses the answer.

use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use indoc::indoc;

use super::{PlanRequest, Planner, ProposedPlan};
use crate::agents::Agent;

/// Instructions given to the planning model
pub const PLANNER_INSTRUCTIONS: &str = indoc! {r#"
    You split a user request into a directed acyclic graph of tasks, each
    handled by one of the available agents.

    Every task has:
    - `id`: a unique kebab-case identifier
    - `agent`: the exact id of an available agent
    - `prompt`: a self-contained instruction with every detail the agent needs
    - `dependsOn`: ids of the tasks whose output this task needs

    Rules:
    - Only give an agent work its description and tools cover. Leave out
      sub-requests no agent can handle.
    - If an agent needs an input it cannot get itself (for example the
      current location) and no current task provides it, add a task that
      does and list it in `dependsOn`.
    - Prompts never mention task ids, other agents or the graph.
    - The current tasks are already running. Do not propose them again;
      only add tasks for parts of the request they do not cover. Return an
      empty `tasks` array when nothing is missing.
    - Prefer few, well-scoped tasks. Tasks nothing depends on should answer
      what the user asked for.
    - Set `isAsync` to true only when the user does not want to wait for
      the result.

    Answer with JSON only: {"isAsync": false, "tasks": [...]}
"#};

/// Planner that asks a language model for the plan
pub struct ModelPlanner {
    model: Arc<dyn Agent>,
}

impl ModelPlanner {
    pub fn new(model: Arc<dyn Agent>) -> Self {
        Self { model }
    }

    /// Full prompt sent to the model
    pub fn render_prompt(&self, request: &PlanRequest) -> Result<String> {
        let agents = serde_json::to_string_pretty(&request.agents)?;
        let tasks = serde_json::to_string_pretty(&request.in_flight)?;
        Ok(format!(
            "{PLANNER_INSTRUCTIONS}\n# User query\n> {}\n\n# Agents available\n```json\n{agents}\n```\n\n# Current tasks\n```json\n{tasks}\n```\n",
            request.query
        ))
    }
}

#[async_trait]
impl Planner for ModelPlanner {
    async fn propose_plan(&self, request: &PlanRequest) -> Result<ProposedPlan> {
        let prompt = self.render_prompt(request)?;
        let response = self
            .model
            .invoke(&prompt)
            .await
            .with_context(|| format!("planning model {} failed", self.model.id()))?;
        parse_plan(&response.text)
    }
}

/// Parse a plan from model output, tolerating a Markdown code fence or
/// text around the JSON object.
pub fn parse_plan(text: &str) -> Result<ProposedPlan> {
    let body = extract_json(text).ok_or_else(|| anyhow!("no JSON object in planner output"))?;
    serde_json::from_str(body).context("planner output is not a valid plan")
}

fn extract_json(text: &str) -> Option<&str> {
    let text = text.trim();
    let text = match text.split_once("```") {
        Some((_, after)) => {
            let after = after.strip_prefix("json").unwrap_or(after);
            after.split_once("```").map_or(after, |(body, _)| body)
        }
        None => text,
    };
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if start >= end {
        return None;
    }
    text.get(start..=end)
}
