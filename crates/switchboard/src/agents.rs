//! Agents and the capability directory
//!
//! An agent is an external capability provider invoked with a prompt. The
//! directory lists the agents currently available for routing.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A tool exposed by an agent, described for the planner
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolInfo {
    /// Tool name/id
    pub name: String,
    /// Names of the parameters the tool accepts
    #[serde(default)]
    pub input_params: Vec<String>,
}

impl ToolInfo {
    pub fn new(name: impl Into<String>, input_params: Vec<impl Into<String>>) -> Self {
        Self {
            name: name.into(),
            input_params: input_params.into_iter().map(Into::into).collect(),
        }
    }
}

/// Text answer of an agent invocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentResponse {
    pub text: String,
}

impl AgentResponse {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

/// Capability provider
///
/// Implemented by the application; invocations are best-effort and never
/// retried by the router.
#[async_trait]
pub trait Agent: Send + Sync {
    /// Id used by tasks to address this agent
    fn id(&self) -> &str;

    /// What the agent can do, in plain language
    fn description(&self) -> &str;

    /// Tools the agent can call
    fn tools(&self) -> Vec<ToolInfo> {
        Vec::new()
    }

    /// Run the agent on a prompt
    async fn invoke(&self, prompt: &str) -> Result<AgentResponse>;
}

/// Agent capabilities as shown to the planner
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentDescriptor {
    pub id: String,
    pub description: String,
    #[serde(default)]
    pub tools: Vec<ToolInfo>,
}

impl AgentDescriptor {
    pub fn from_agent(agent: &dyn Agent) -> Self {
        Self {
            id: agent.id().to_string(),
            description: agent.description().to_string(),
            tools: agent.tools(),
        }
    }
}

/// Capabilities of every listed agent, in listing order
pub fn describe_agents(agents: &[Arc<dyn Agent>]) -> Vec<AgentDescriptor> {
    agents
        .iter()
        .map(|agent| AgentDescriptor::from_agent(agent.as_ref()))
        .collect()
}

/// Source of the agents available for routing
#[async_trait]
pub trait AgentDirectory: Send + Sync {
    async fn list_agents(&self) -> Result<Vec<Arc<dyn Agent>>>;
}

/// Directory backed by a fixed list of agents
#[derive(Clone, Default)]
pub struct StaticDirectory {
    agents: Vec<Arc<dyn Agent>>,
}

impl StaticDirectory {
    pub fn new(agents: Vec<Arc<dyn Agent>>) -> Self {
        Self { agents }
    }

    /// Add an agent
    pub fn with_agent(mut self, agent: Arc<dyn Agent>) -> Self {
        self.agents.push(agent);
        self
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}

#[async_trait]
impl AgentDirectory for StaticDirectory {
    async fn list_agents(&self) -> Result<Vec<Arc<dyn Agent>>> {
        Ok(self.agents.clone())
    }
}

/// Agents keyed by id; later duplicates win
pub(crate) fn index_agents(agents: Vec<Arc<dyn Agent>>) -> HashMap<String, Arc<dyn Agent>> {
    agents
        .into_iter()
        .map(|agent| (agent.id().to_string(), agent))
        .collect()
}
