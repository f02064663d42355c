//! Switchboard CLI
//!
//! Runs a fixed plan against echo agents and prints every poll response,
//! or shows what the optimizer makes of a plan.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use switchboard::graph::{compact_chains, merge_tasks, render_tree, TaskMap};
use switchboard::logging::init_tracing;
use switchboard::{
    Agent, AgentResponse, PollStatus, ProposedPlan, Router, RouterConfig, StaticDirectory,
    StaticPlanner, Task,
};

#[derive(Parser)]
#[command(name = "switchboard", about = "Route requests through a graph of agents")]
struct Cli {
    /// Emit JSON log lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Execute a plan with echo agents and poll until it completes
    Run {
        /// Plan file (YAML or JSON)
        #[arg(long)]
        plan: PathBuf,

        /// Query text handed to the planner
        #[arg(long, default_value = "")]
        query: String,

        /// Agent ids to register (defaults to the agents the plan uses)
        #[arg(long, value_delimiter = ',')]
        agents: Option<Vec<String>>,

        /// Override the poll timeout
        #[arg(long)]
        poll_timeout_ms: Option<u64>,
    },
    /// Print the optimized task graph of a plan without running it
    Optimize {
        #[arg(long)]
        plan: PathBuf,
    },
}

/// Agent answering with its own prompt
struct EchoAgent {
    id: String,
    description: String,
}

impl EchoAgent {
    fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        let description = format!("Echoes the prompt it receives ({id})");
        Self { id, description }
    }
}

#[async_trait]
impl Agent for EchoAgent {
    fn id(&self) -> &str {
        &self.id
    }

    fn description(&self) -> &str {
        &self.description
    }

    async fn invoke(&self, prompt: &str) -> Result<AgentResponse> {
        tokio::time::sleep(Duration::from_millis(50)).await;
        Ok(AgentResponse::new(format!("[{}] {}", self.id, prompt)))
    }
}

fn load_plan(path: &Path) -> Result<ProposedPlan> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read plan {}", path.display()))?;
    let is_json = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
    let plan = if is_json {
        serde_json::from_str(&content).context("Invalid JSON plan")?
    } else {
        serde_yaml::from_str(&content).context("Invalid YAML plan")?
    };
    Ok(plan)
}

fn plan_agents(plan: &ProposedPlan) -> Vec<String> {
    let mut seen = HashSet::new();
    plan.tasks
        .iter()
        .filter(|t| seen.insert(t.agent.clone()))
        .map(|t| t.agent.clone())
        .collect()
}

fn optimized_graph(plan: &ProposedPlan) -> TaskMap {
    let mut tasks = TaskMap::default();
    merge_tasks(&mut tasks, plan.tasks.iter().cloned().map(Task::from));
    compact_chains(&tasks, &HashSet::new()).tasks
}

async fn run(
    mut config: RouterConfig,
    plan: ProposedPlan,
    query: String,
    agents: Option<Vec<String>>,
    poll_timeout_ms: Option<u64>,
) -> Result<()> {
    if let Some(ms) = poll_timeout_ms {
        config = config.with_poll_timeout(Duration::from_millis(ms));
    }

    let agent_ids = agents.unwrap_or_else(|| plan_agents(&plan));
    let directory = agent_ids
        .into_iter()
        .fold(StaticDirectory::default(), |dir, id| {
            dir.with_agent(Arc::new(EchoAgent::new(id)))
        });
    tracing::info!(agents = directory.len(), "Registered echo agents");

    let router = Router::with_config(
        Arc::new(directory),
        Arc::new(StaticPlanner::new(plan)),
        config,
    );

    let response = router.route_query(&query).await?;
    println!("{}", serde_json::to_string_pretty(&response)?);

    loop {
        let instructions = router.poll_next_instructions().await;
        println!("{}", serde_json::to_string_pretty(&instructions)?);
        if instructions.is_done() {
            break;
        }
        if instructions.status == PollStatus::StillProcessing && router.current_graph().is_empty() {
            break;
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = RouterConfig::load()?;
    init_tracing(&config, cli.json_logs)?;

    match cli.command {
        Command::Run {
            plan,
            query,
            agents,
            poll_timeout_ms,
        } => run(config, load_plan(&plan)?, query, agents, poll_timeout_ms).await,
        Command::Optimize { plan } => {
            let tasks = optimized_graph(&load_plan(&plan)?);
            eprintln!("{}", render_tree(&tasks));
            let tasks: Vec<&Task> = tasks.values().collect();
            println!("{}", serde_json::to_string_pretty(&tasks)?);
            Ok(())
        }
    }
}
