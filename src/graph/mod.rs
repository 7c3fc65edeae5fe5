/**
 * Dependency Graph
 *
 * DESIGN DECISION: Pure in-memory adjacency list rebuilt from the task set, no mutation
 * tracked internally - "done" is read from the caller's status map, not from the graph
 * WHY: the graph is a pure in-memory view computed from the task set; it is rebuilt whenever
 * the task set changes rather than incrementally mutated, so it must stay cheap to re-derive
 * without carrying execution state itself
 *
 * REASONING CHAIN:
 * 1. `build_graph` only needs (task id, its declared dependency ids) pairs
 * 2. Readiness/blocking questions take the live status map as a separate argument so the
 *    same graph instance answers them as statuses change, with no graph mutation required
 * 3. Cycle detection uses DFS + an in-stack set rather than an in-degree exhaustion check,
 *    because the exact offending cycle path is required, which a "leftover nodes" signal
 *    does not produce directly
 * 4. `try_add_edge` copies the graph, adds the edge, validates, and only returns the new
 *    graph on success
 *
 * PATTERN: adjacency list + DFS cycle detection, grounded on a dependency graph's
 * topological-sort structure, reworked from a mutable completion-tracking graph into a pure
 * query surface
 *
 * PERFORMANCE: all operations are O(V+E).
 */

use std::collections::{HashMap, HashSet};

use crate::error::{Error, Result};
use crate::model::{Task, TaskId, TaskStatus};

/// node -> [prerequisite nodes]. Missing entries are treated as empty.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    adjacency: HashMap<TaskId, Vec<TaskId>>,
}

impl DependencyGraph {
    pub fn prerequisites(&self, id: TaskId) -> &[TaskId] {
        self.adjacency.get(&id).map(|v| v.as_slice()).unwrap_or(&[])
    }

    pub fn nodes(&self) -> impl Iterator<Item = &TaskId> {
        self.adjacency.keys()
    }

    fn dependents_of(&self, id: TaskId) -> Vec<TaskId> {
        self.adjacency
            .iter()
            .filter(|(_, deps)| deps.contains(&id))
            .map(|(node, _)| *node)
            .collect()
    }
}

/// Build the adjacency list from the task set.
pub fn build_graph(tasks: &[Task]) -> DependencyGraph {
    let mut adjacency = HashMap::new();
    for task in tasks {
        adjacency.insert(task.id, task.dependencies.clone());
    }
    DependencyGraph { adjacency }
}

/// DFS with a recursion (in-stack) set. On the first back-edge, returns the cycle as the
/// path from the re-entered node through the stack back to itself.
pub fn validate_no_cycles(graph: &DependencyGraph) -> std::result::Result<(), Vec<TaskId>> {
    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        InStack,
        Done,
    }

    let mut marks: HashMap<TaskId, Mark> = HashMap::new();
    let mut stack: Vec<TaskId> = Vec::new();

    fn dfs(
        node: TaskId,
        graph: &DependencyGraph,
        marks: &mut HashMap<TaskId, Mark>,
        stack: &mut Vec<TaskId>,
    ) -> std::result::Result<(), Vec<TaskId>> {
        marks.insert(node, Mark::InStack);
        stack.push(node);

        for &prereq in graph.prerequisites(node) {
            match marks.get(&prereq) {
                Some(Mark::InStack) => {
                    // Found the cycle: path from the re-entered node through the stack back to itself.
                    let start = stack.iter().position(|&n| n == prereq).unwrap();
                    let mut cycle: Vec<TaskId> = stack[start..].to_vec();
                    cycle.push(prereq);
                    return Err(cycle);
                }
                Some(Mark::Done) => continue,
                None => dfs(prereq, graph, marks, stack)?,
            }
        }

        stack.pop();
        marks.insert(node, Mark::Done);
        Ok(())
    }

    for &node in graph.nodes() {
        if !marks.contains_key(&node) {
            dfs(node, graph, &mut marks, &mut stack)?;
        }
    }
    Ok(())
}

/// Every node whose status is `backlog` AND every prerequisite has status `done`.
pub fn get_ready_task_ids(graph: &DependencyGraph, statuses: &HashMap<TaskId, TaskStatus>) -> Vec<TaskId> {
    graph
        .nodes()
        .copied()
        .filter(|&id| {
            matches!(statuses.get(&id), Some(TaskStatus::Backlog))
                && graph
                    .prerequisites(id)
                    .iter()
                    .all(|p| matches!(statuses.get(p), Some(TaskStatus::Done)))
        })
        .collect()
}

/// All transitive prerequisites of `id` in topological order (prerequisite first), with no
/// duplicates even under a diamond shape.
pub fn get_dependency_chain(graph: &DependencyGraph, id: TaskId) -> Vec<TaskId> {
    let mut visited: HashSet<TaskId> = HashSet::new();
    let mut ordered: Vec<TaskId> = Vec::new();

    fn visit(node: TaskId, graph: &DependencyGraph, visited: &mut HashSet<TaskId>, ordered: &mut Vec<TaskId>) {
        for &prereq in graph.prerequisites(node) {
            if visited.insert(prereq) {
                visit(prereq, graph, visited, ordered);
                ordered.push(prereq);
            }
        }
    }

    visit(id, graph, &mut visited, &mut ordered);
    ordered
}

/// Prerequisites of `id` not yet `done`.
pub fn is_task_blocked(graph: &DependencyGraph, id: TaskId, statuses: &HashMap<TaskId, TaskStatus>) -> Vec<TaskId> {
    graph
        .prerequisites(id)
        .iter()
        .copied()
        .filter(|p| !matches!(statuses.get(p), Some(TaskStatus::Done)))
        .collect()
}

/// Copy the graph, add the edge `child depends on parent`, validate, and return the new
/// graph only on success. The original graph is left untouched either way.
pub fn try_add_edge(graph: &DependencyGraph, child: TaskId, parent: TaskId) -> Result<DependencyGraph> {
    let mut candidate = graph.clone();
    candidate.adjacency.entry(child).or_default().push(parent);
    validate_no_cycles(&candidate).map_err(|cycle| {
        Error::CycleDetected(cycle.iter().map(|id| id.to_string()).collect::<Vec<_>>().join(" -> "))
    })?;
    Ok(candidate)
}

/// Re-evaluate the ready set after `completed_id` reaches `done`; returns the newly-ready
/// dependents. A thin convenience over `get_ready_task_ids` scoped
/// to the direct dependents of the task that just finished.
pub fn newly_unblocked(
    graph: &DependencyGraph,
    completed_id: TaskId,
    statuses: &HashMap<TaskId, TaskStatus>,
) -> Vec<TaskId> {
    let ready = get_ready_task_ids(graph, statuses);
    let dependents: HashSet<TaskId> = graph.dependents_of(completed_id).into_iter().collect();
    ready.into_iter().filter(|id| dependents.contains(id)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(id: TaskId, deps: Vec<TaskId>, status: TaskStatus) -> (Task, TaskStatus) {
        let mut t = Task::new(id, format!("t{}", id), "d", crate::model::Tier::L1, 0);
        t.dependencies = deps;
        (t, status)
    }

    fn build(pairs: Vec<(Task, TaskStatus)>) -> (DependencyGraph, HashMap<TaskId, TaskStatus>) {
        let tasks: Vec<Task> = pairs.iter().map(|(t, _)| t.clone()).collect();
        let statuses: HashMap<TaskId, TaskStatus> = pairs.iter().map(|(t, s)| (t.id, *s)).collect();
        (build_graph(&tasks), statuses)
    }

    #[test]
    fn test_ready_task_ids_matches_spec_definition() {
        let (a, _) = task(1, vec![], TaskStatus::Done);
        let (b, _) = task(2, vec![1], TaskStatus::Backlog);
        let (c, _) = task(3, vec![], TaskStatus::Backlog);
        let (graph, statuses) = build(vec![(a, TaskStatus::Done), (b, TaskStatus::Backlog), (c, TaskStatus::Backlog)]);

        let mut ready = get_ready_task_ids(&graph, &statuses);
        ready.sort();
        assert_eq!(ready, vec![2, 3]);
    }

    #[test]
    fn test_ready_excludes_task_with_incomplete_prerequisite() {
        let (a, _) = task(1, vec![], TaskStatus::Backlog);
        let (b, _) = task(2, vec![1], TaskStatus::Backlog);
        let (graph, statuses) = build(vec![(a, TaskStatus::Backlog), (b, TaskStatus::Backlog)]);

        let ready = get_ready_task_ids(&graph, &statuses);
        assert_eq!(ready, vec![1]);
    }

    #[test]
    fn test_validate_no_cycles_on_dag() {
        let (a, _) = task(1, vec![], TaskStatus::Backlog);
        let (b, _) = task(2, vec![1], TaskStatus::Backlog);
        let (graph, _) = build(vec![(a, TaskStatus::Backlog), (b, TaskStatus::Backlog)]);
        assert!(validate_no_cycles(&graph).is_ok());
    }

    #[test]
    fn test_validate_no_cycles_detects_direct_cycle() {
        let (a, _) = task(1, vec![2], TaskStatus::Backlog);
        let (b, _) = task(2, vec![1], TaskStatus::Backlog);
        let (graph, _) = build(vec![(a, TaskStatus::Backlog), (b, TaskStatus::Backlog)]);
        let err = validate_no_cycles(&graph).unwrap_err();
        assert!(err.contains(&1) && err.contains(&2));
    }

    #[test]
    fn test_disconnected_graph_is_valid() {
        let (a, _) = task(1, vec![], TaskStatus::Backlog);
        let (b, _) = task(2, vec![], TaskStatus::Backlog);
        let (graph, _) = build(vec![(a, TaskStatus::Backlog), (b, TaskStatus::Backlog)]);
        assert!(validate_no_cycles(&graph).is_ok());
    }

    #[test]
    fn test_dependency_chain_diamond_no_duplicates() {
        // D depends on B and C, both of which depend on A. Chain of D must list A once.
        let (a, _) = task(1, vec![], TaskStatus::Backlog);
        let (b, _) = task(2, vec![1], TaskStatus::Backlog);
        let (c, _) = task(3, vec![1], TaskStatus::Backlog);
        let (d, _) = task(4, vec![2, 3], TaskStatus::Backlog);
        let (graph, _) = build(vec![
            (a, TaskStatus::Backlog),
            (b, TaskStatus::Backlog),
            (c, TaskStatus::Backlog),
            (d, TaskStatus::Backlog),
        ]);

        let chain = get_dependency_chain(&graph, 4);
        assert_eq!(chain.iter().filter(|&&id| id == 1).count(), 1);
        // A must appear before both B and C.
        let pos_a = chain.iter().position(|&id| id == 1).unwrap();
        let pos_b = chain.iter().position(|&id| id == 2).unwrap();
        let pos_c = chain.iter().position(|&id| id == 3).unwrap();
        assert!(pos_a < pos_b && pos_a < pos_c);
    }

    #[test]
    fn test_is_task_blocked_lists_incomplete_prerequisites() {
        let (a, _) = task(1, vec![], TaskStatus::Backlog);
        let (b, _) = task(2, vec![], TaskStatus::Done);
        let (c, _) = task(3, vec![1, 2], TaskStatus::Backlog);
        let (graph, statuses) = build(vec![
            (a, TaskStatus::Backlog),
            (b, TaskStatus::Done),
            (c, TaskStatus::Backlog),
        ]);

        assert_eq!(is_task_blocked(&graph, 3, &statuses), vec![1]);
    }

    #[test]
    fn test_try_add_edge_rejects_cycle_and_leaves_original_untouched() {
        let (a, _) = task(1, vec![], TaskStatus::Backlog);
        let (b, _) = task(2, vec![1], TaskStatus::Backlog);
        let (graph, _) = build(vec![(a, TaskStatus::Backlog), (b, TaskStatus::Backlog)]);

        let result = try_add_edge(&graph, 1, 2);
        assert!(result.is_err());
        // Original graph still has no edge from 1 to 2.
        assert!(graph.prerequisites(1).is_empty());
    }

    #[test]
    fn test_try_add_edge_accepts_valid_edge() {
        let (a, _) = task(1, vec![], TaskStatus::Backlog);
        let (b, _) = task(2, vec![], TaskStatus::Backlog);
        let (graph, _) = build(vec![(a, TaskStatus::Backlog), (b, TaskStatus::Backlog)]);

        let updated = try_add_edge(&graph, 2, 1).unwrap();
        assert_eq!(updated.prerequisites(2), &[1]);
    }

    #[test]
    fn test_newly_unblocked_on_completion() {
        let (a, _) = task(1, vec![], TaskStatus::Done);
        let (b, _) = task(2, vec![1], TaskStatus::Backlog);
        let (graph, statuses) = build(vec![(a, TaskStatus::Done), (b, TaskStatus::Backlog)]);

        let unblocked = newly_unblocked(&graph, 1, &statuses);
        assert_eq!(unblocked, vec![2]);
    }
}
