//! Graph optimizer
//!
//! Collapses strictly sequential chains of same-agent tasks into a single
//! composite task so the agent is invoked once instead of once per step.
//!
//! A chain starts at a task with no dependency inside its agent group and
//! extends to a successor only while:
//! - the current task has exactly one same-agent dependent,
//! - that dependent's only same-agent dependency is the current task,
//! - that dependent has no dependency on any other agent's task.
//!
//! Only tasks that have not started are considered; started tasks pass
//! through untouched and count as foreign for chain detection. A chain whose
//! composite id is already taken is left as is.

use std::collections::{HashMap, HashSet};

use indexmap::IndexMap;

use super::types::{Task, TaskMap, TaskOutcome};

/// Separator joining member ids into a composite id
pub const COMPOSITE_ID_SEPARATOR: &str = "+";

/// Separator joining member prompts into a composite prompt
pub const COMPOSITE_PROMPT_SEPARATOR: &str = "\nThen:\n";

/// Result of an optimization pass
#[derive(Debug, Clone, Default)]
pub struct Compaction {
    /// Rewritten graph
    pub tasks: TaskMap,
    /// Member id -> composite id, for every task folded into a composite
    pub merged: HashMap<String, String>,
}

impl Compaction {
    /// Number of composite tasks created
    pub fn composite_count(&self) -> usize {
        self.merged.values().collect::<HashSet<_>>().len()
    }

    /// Id of the task that now carries `task_id`'s work
    pub fn resolve<'a>(&'a self, task_id: &'a str) -> &'a str {
        self.merged.get(task_id).map(String::as_str).unwrap_or(task_id)
    }
}

/// Collapse same-agent chains among the tasks not listed in `started`.
pub fn compact_chains(tasks: &TaskMap, started: &HashSet<String>) -> Compaction {
    let eligible = |task: &Task| !started.contains(&task.id) && task.outcome.is_pending();

    let mut groups: IndexMap<&str, Vec<&Task>> = IndexMap::new();
    for task in tasks.values().filter(|t| eligible(*t)) {
        groups.entry(task.agent.as_str()).or_default().push(task);
    }

    let mut chains: Vec<Vec<&Task>> = Vec::new();
    for members in groups.values().filter(|m| m.len() > 1) {
        chains.extend(find_chains(members));
    }

    let mut taken: HashSet<String> = tasks.keys().cloned().collect();
    let mut merged: HashMap<String, String> = HashMap::new();
    let mut composites: HashMap<String, Task> = HashMap::new();
    for chain in &chains {
        let composite = build_composite(chain);
        if !taken.insert(composite.id.clone()) {
            tracing::debug!(
                task_id = %composite.id,
                "Composite id already taken, leaving chain as is"
            );
            continue;
        }
        for member in chain {
            merged.insert(member.id.clone(), composite.id.clone());
        }
        composites.insert(chain[0].id.clone(), composite);
    }

    let mut redirects = folded_members(tasks);
    redirects.extend(merged.clone());

    let mut out = TaskMap::new();
    for task in tasks.values() {
        let mut task = match merged.get(&task.id) {
            None => task.clone(),
            Some(_) => match composites.remove(&task.id) {
                Some(composite) => composite,
                None => continue,
            },
        };
        task.depends_on = rewrite_dependencies(&task.depends_on, &redirects, &task.id);
        out.insert(task.id.clone(), task);
    }

    if !merged.is_empty() {
        tracing::debug!(
            folded = merged.len(),
            "Collapsed sequential same-agent tasks"
        );
    }

    Compaction { tasks: out, merged }
}

/// Maximal strict chains within one agent group, in group order.
fn find_chains<'a>(members: &[&'a Task]) -> Vec<Vec<&'a Task>> {
    let group: HashSet<&str> = members.iter().map(|t| t.id.as_str()).collect();

    let mut successors: HashMap<&str, Vec<&'a Task>> = HashMap::new();
    for task in members {
        for dep in intra_group_deps(task, &group) {
            successors.entry(dep).or_default().push(*task);
        }
    }

    let mut chains = Vec::new();
    for root in members
        .iter()
        .filter(|t| intra_group_deps(t, &group).is_empty())
    {
        let mut chain = vec![*root];
        let mut current: &Task = root;
        loop {
            let next = match successors.get(current.id.as_str()) {
                Some(next) if next.len() == 1 => next[0],
                _ => break,
            };
            if intra_group_deps(next, &group) != [current.id.as_str()]
                || has_foreign_deps(next, &group)
            {
                break;
            }
            chain.push(next);
            current = next;
        }
        if chain.len() > 1 {
            chains.push(chain);
        }
    }
    chains
}

/// Member id -> composite id for composites already in the graph whose
/// members are no longer tasks of their own.
fn folded_members(tasks: &TaskMap) -> HashMap<String, String> {
    let mut out = HashMap::new();
    for task in tasks.values().filter(|t| t.is_composite()) {
        for member in &task.merged_from {
            if !tasks.contains_key(member) {
                out.insert(member.clone(), task.id.clone());
            }
        }
    }
    out
}

fn intra_group_deps<'t>(task: &'t Task, group: &HashSet<&str>) -> Vec<&'t str> {
    let mut deps: Vec<&str> = Vec::new();
    for dep in &task.depends_on {
        if group.contains(dep.as_str()) && !deps.contains(&dep.as_str()) {
            deps.push(dep);
        }
    }
    deps
}

fn has_foreign_deps(task: &Task, group: &HashSet<&str>) -> bool {
    task.depends_on.iter().any(|d| !group.contains(d.as_str()))
}

fn build_composite(chain: &[&Task]) -> Task {
    let member_ids: Vec<String> = chain.iter().map(|t| t.id.clone()).collect();

    let mut depends_on: Vec<String> = Vec::new();
    for dep in chain.iter().flat_map(|t| t.depends_on.iter()) {
        if !member_ids.contains(dep) && !depends_on.contains(dep) {
            depends_on.push(dep.clone());
        }
    }

    let mut merged_from = Vec::new();
    for member in chain {
        if member.is_composite() {
            merged_from.extend(member.merged_from.iter().cloned());
        } else {
            merged_from.push(member.id.clone());
        }
    }

    Task {
        id: member_ids.join(COMPOSITE_ID_SEPARATOR),
        agent: chain[0].agent.clone(),
        prompt: chain
            .iter()
            .map(|t| t.prompt.as_str())
            .collect::<Vec<_>>()
            .join(COMPOSITE_PROMPT_SEPARATOR),
        depends_on,
        outcome: TaskOutcome::Pending,
        reported: false,
        merged_from,
    }
}

fn rewrite_dependencies(
    depends_on: &[String],
    merged: &HashMap<String, String>,
    own_id: &str,
) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(depends_on.len());
    for dep in depends_on {
        let target = merged.get(dep).unwrap_or(dep);
        if target != own_id && !out.contains(target) {
            out.push(target.clone());
        }
    }
    out
}
