//! Switchboard - routes natural-language requests through agents
//!
//! A request is planned into a graph of tasks, each bound to an agent.
//! Tasks run concurrently as soon as their dependencies have results, and
//! the caller collects finished work by polling.

pub mod agents;
pub mod config;
pub mod error;
pub mod events;
pub mod graph;
pub mod logging;
pub mod planner;
pub mod reporter;
pub mod router;
mod scheduler;

pub use agents::{Agent, AgentDescriptor, AgentDirectory, AgentResponse, StaticDirectory, ToolInfo};
pub use config::RouterConfig;
pub use error::{RouterError, RouterResult};
pub use events::{CompletionBus, CompletionWaiter, ListenerId};
pub use graph::{CompletedTask, GraphSnapshot, Task, TaskOutcome};
pub use planner::{ModelPlanner, PlanRequest, Planner, ProposedPlan, ProposedTask, StaticPlanner};
pub use reporter::{CompletedTaskResult, Instructions, PollStatus};
pub use router::{RouteResponse, Router};
