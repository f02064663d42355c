//! Graph merging
//!
//! Unions newly proposed tasks into the in-flight graph. An id already
//! present, or already folded into a composite, is never overwritten. No cycle or dangling-dependency check is
//! done here; such defects surface when the scheduler tries to start the
//! affected tasks.

use std::collections::HashSet;

use super::types::{Task, TaskMap};

/// Merge `proposed` into `existing`, first writer wins.
///
/// Returns the ids that were actually added, in insertion order.
pub fn merge_tasks(existing: &mut TaskMap, proposed: impl IntoIterator<Item = Task>) -> Vec<String> {
    let folded: HashSet<String> = existing
        .values()
        .flat_map(|t| t.merged_from.iter().cloned())
        .collect();

    let mut added = Vec::new();
    for task in proposed {
        if existing.contains_key(&task.id) {
            tracing::debug!(task_id = %task.id, "Skipping already known task");
            continue;
        }
        if folded.contains(&task.id) {
            tracing::debug!(task_id = %task.id, "Skipping task already folded into a composite");
            continue;
        }
        added.push(task.id.clone());
        existing.insert(task.id.clone(), task);
    }
    added
}
