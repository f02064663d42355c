//! ASCII rendering of the task graph for logs

use std::collections::{HashMap, HashSet};

use super::types::TaskMap;

/// Render the graph as an indented tree.
///
/// Roots are tasks without an in-graph dependency; a task with several
/// dependencies appears under each of them. Cycles are cut at the first
/// repeated id on a path.
pub fn render_tree(tasks: &TaskMap) -> String {
    if tasks.is_empty() {
        return "(empty graph)".to_string();
    }

    let mut children: HashMap<&str, Vec<&str>> = HashMap::new();
    for task in tasks.values() {
        for dep in &task.depends_on {
            if tasks.contains_key(dep) {
                children.entry(dep.as_str()).or_default().push(task.id.as_str());
            }
        }
    }

    let roots: Vec<&str> = tasks
        .values()
        .filter(|t| t.depends_on.iter().all(|d| !tasks.contains_key(d)))
        .map(|t| t.id.as_str())
        .collect();

    let mut lines = Vec::new();
    let mut path = HashSet::new();
    for (index, root) in roots.iter().enumerate() {
        draw(root, "", index == roots.len() - 1, &children, &mut path, &mut lines);
    }
    lines.join("\n")
}

fn draw<'a>(
    task_id: &'a str,
    prefix: &str,
    is_last: bool,
    children: &HashMap<&'a str, Vec<&'a str>>,
    path: &mut HashSet<&'a str>,
    lines: &mut Vec<String>,
) {
    let connector = if is_last { "└── " } else { "├── " };
    if !path.insert(task_id) {
        lines.push(format!("{prefix}{connector}{task_id} (cycle)"));
        return;
    }
    lines.push(format!("{prefix}{connector}{task_id}"));

    let child_prefix = format!("{prefix}{}", if is_last { "    " } else { "│   " });
    if let Some(kids) = children.get(task_id) {
        for (index, child) in kids.iter().enumerate() {
            draw(child, &child_prefix, index == kids.len() - 1, children, path, lines);
        }
    }
    path.remove(task_id);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::types::Task;

    fn map(tasks: Vec<Task>) -> TaskMap {
        tasks.into_iter().map(|t| (t.id.clone(), t)).collect()
    }

    #[test]
    fn test_render_empty() {
        assert_eq!(render_tree(&TaskMap::new()), "(empty graph)");
    }

    #[test]
    fn test_render_diamond() {
        let tasks = map(vec![
            Task::new("loc", "location", "Where am I"),
            Task::new("weather", "weather", "Weather").with_dependencies(vec!["loc"]),
            Task::new("traffic", "maps", "Traffic").with_dependencies(vec!["loc"]),
            Task::new("calendar", "cal", "Today"),
        ]);

        let rendered = render_tree(&tasks);

        assert_eq!(
            rendered,
            "├── loc\n│   ├── weather\n│   └── traffic\n└── calendar"
        );
    }

    #[test]
    fn test_render_cycle_terminates() {
        let tasks = map(vec![
            Task::new("root", "x", "R"),
            Task::new("a", "x", "A").with_dependencies(vec!["root", "b"]),
            Task::new("b", "x", "B").with_dependencies(vec!["a"]),
        ]);

        let rendered = render_tree(&tasks);

        assert!(rendered.contains("(cycle)"));
    }
}
