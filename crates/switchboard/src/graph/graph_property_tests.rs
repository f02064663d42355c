//! Property-based tests for graph merging and compaction

#[cfg(test)]
mod property_tests {
    use std::collections::HashSet;

    use proptest::prelude::*;

    use crate::graph::{compact_chains, merge_tasks, Task, TaskMap, TaskOutcome};

    // Random DAG: task i may only depend on tasks with a lower index
    fn dag_strategy() -> impl Strategy<Value = Vec<Task>> {
        (1usize..12)
            .prop_flat_map(|n| {
                (
                    prop::collection::vec(0usize..3, n),
                    prop::collection::vec(prop::collection::vec(any::<bool>(), n), n),
                )
            })
            .prop_map(|(agents, edges)| {
                let n = agents.len();
                (0..n)
                    .map(|i| {
                        let deps: Vec<String> = (0..i)
                            .filter(|&j| edges[i][j])
                            .map(|j| format!("t{j}"))
                            .collect();
                        Task::new(format!("t{i}"), format!("agent-{}", agents[i]), format!("step {i}"))
                            .with_dependencies(deps)
                    })
                    .collect()
            })
    }

    // DAG from an earlier round: some tasks already started or finished, plus
    // finished composites whose ids a fresh chain over t{i}, t{i+1} would reuse
    fn seeded_graph_strategy() -> impl Strategy<Value = (TaskMap, HashSet<String>)> {
        dag_strategy()
            .prop_flat_map(|tasks| {
                let n = tasks.len();
                (
                    Just(tasks),
                    prop::collection::vec(0u8..4, n),
                    prop::collection::vec(any::<bool>(), n),
                )
            })
            .prop_map(|(tasks, states, decoys)| {
                let mut graph = TaskMap::new();
                for i in (0..tasks.len().saturating_sub(1)).filter(|&i| decoys[i]) {
                    let id = format!("t{i}+t{}", i + 1);
                    let mut composite = Task::new(id.clone(), tasks[i].agent.clone(), "earlier");
                    composite.merged_from = vec![tasks[i].id.clone(), tasks[i + 1].id.clone()];
                    composite.outcome = TaskOutcome::succeeded(serde_json::json!(id));
                    graph.insert(id, composite);
                }

                let mut started = HashSet::new();
                for (mut task, state) in tasks.into_iter().zip(states) {
                    match state {
                        1 => task.outcome = TaskOutcome::succeeded(serde_json::json!(task.id)),
                        2 => task.outcome = TaskOutcome::failed("boom"),
                        3 => {
                            started.insert(task.id.clone());
                        }
                        _ => {}
                    }
                    graph.insert(task.id.clone(), task);
                }
                (graph, started)
            })
    }

    fn to_map(tasks: &[Task]) -> TaskMap {
        tasks.iter().map(|t| (t.id.clone(), t.clone())).collect()
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        #[test]
        fn merge_never_changes_first_inserted_task(
            tasks in dag_strategy(),
            prompt in "[a-z ]{1,20}"
        ) {
            let mut graph = to_map(&tasks);
            let before = graph.clone();

            let rivals: Vec<Task> = tasks
                .iter()
                .map(|t| Task::new(t.id.clone(), "rival", prompt.clone()))
                .collect();
            let added = merge_tasks(&mut graph, rivals.clone());
            prop_assert!(added.is_empty());
            let added_again = merge_tasks(&mut graph, rivals);
            prop_assert!(added_again.is_empty());

            prop_assert_eq!(graph, before);
        }

        #[test]
        fn compaction_preserves_every_dependency(tasks in dag_strategy()) {
            let graph = to_map(&tasks);
            let result = compact_chains(&graph, &HashSet::new());

            for task in &tasks {
                let holder = result.resolve(&task.id);
                prop_assert!(result.tasks.contains_key(holder), "missing holder for {}", task.id);

                for dep in &task.depends_on {
                    let dep_holder = result.resolve(dep);
                    if dep_holder == holder {
                        continue;
                    }
                    prop_assert!(
                        result.tasks[holder].depends_on.iter().any(|d| d == dep_holder),
                        "{} -> {} lost after compaction", task.id, dep
                    );
                }
            }
        }

        #[test]
        fn compaction_never_creates_self_or_dangling_edges(tasks in dag_strategy()) {
            let graph = to_map(&tasks);
            let result = compact_chains(&graph, &HashSet::new());

            for task in result.tasks.values() {
                prop_assert!(!task.depends_on_task(&task.id));
                for dep in &task.depends_on {
                    prop_assert!(result.tasks.contains_key(dep));
                }
            }
        }

        #[test]
        fn compaction_keeps_started_and_finished_tasks_intact(
            (graph, started) in seeded_graph_strategy()
        ) {
            let result = compact_chains(&graph, &started);

            for (id, task) in &graph {
                if !task.outcome.is_pending() || started.contains(id) {
                    let kept = result.tasks.get(id);
                    prop_assert!(kept.is_some(), "{} vanished", id);
                    if let Some(kept) = kept {
                        prop_assert_eq!(&kept.outcome, &task.outcome);
                        prop_assert_eq!(&kept.prompt, &task.prompt);
                        prop_assert_eq!(&kept.merged_from, &task.merged_from);
                    }
                }
                prop_assert!(result.tasks.contains_key(result.resolve(id)));
            }
            for composite in result.merged.values() {
                prop_assert!(!graph.contains_key(composite), "{} overwritten", composite);
            }
        }

        #[test]
        fn compaction_over_seeded_graph_has_no_dangling_edges(
            (graph, started) in seeded_graph_strategy()
        ) {
            let result = compact_chains(&graph, &started);

            for task in result.tasks.values() {
                prop_assert!(!task.depends_on_task(&task.id));
                for dep in &task.depends_on {
                    prop_assert!(result.tasks.contains_key(dep));
                }
            }
        }

        #[test]
        fn composites_only_join_same_agent_tasks(tasks in dag_strategy()) {
            let graph = to_map(&tasks);
            let result = compact_chains(&graph, &HashSet::new());

            for (member, composite) in &result.merged {
                prop_assert_eq!(&graph[member].agent, &result.tasks[composite].agent);
            }
        }
    }
}
