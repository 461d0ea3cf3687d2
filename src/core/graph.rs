//! Dependency graph for task scheduling.
//!
//! This module provides the `DependencyGraph` structure that represents
//! task dependencies as a directed graph, enabling topological batching
//! and parallel execution of independent tasks. The analyzer guarantees
//! acyclicity before a graph reaches the scheduler.

use crate::core::task::{Task, TaskId};
use crate::error::{Error, Result};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};

/// Origin of a dependency edge.
///
/// Edges either come from the decomposer's explicit dependency names
/// or from the static type-precedence table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum DependencyKind {
    /// Declared by name in the task descriptor.
    #[default]
    Explicit,
    /// Derived from the task-type precedence table.
    TypePrecedence,
}

impl std::fmt::Display for DependencyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DependencyKind::Explicit => write!(f, "explicit"),
            DependencyKind::TypePrecedence => write!(f, "type_precedence"),
        }
    }
}

/// An edge dropped while breaking a dependency cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DroppedEdge {
    /// Name of the dependency-side task.
    pub from: String,
    /// Name of the dependent-side task.
    pub to: String,
}

impl std::fmt::Display for DroppedEdge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} -> {}", self.from, self.to)
    }
}

/// The task dependency graph.
///
/// Nodes are tasks; an edge `A -> B` means A must complete before B can
/// start. Backed by petgraph's `DiGraph` with an id-to-index map for
/// fast lookups.
pub struct DependencyGraph {
    /// The underlying directed graph.
    graph: DiGraph<Task, DependencyKind>,
    /// Index mapping from TaskId to NodeIndex.
    task_index: HashMap<TaskId, NodeIndex>,
}

impl DependencyGraph {
    /// Create a new empty graph.
    pub fn new() -> Self {
        Self {
            graph: DiGraph::new(),
            task_index: HashMap::new(),
        }
    }

    /// Add a task node.
    ///
    /// If a task with the same id already exists, the existing node
    /// index is returned and the graph is unchanged.
    pub fn add_task(&mut self, task: Task) -> NodeIndex {
        if let Some(&index) = self.task_index.get(&task.id) {
            return index;
        }

        let id = task.id;
        let index = self.graph.add_node(task);
        self.task_index.insert(id, index);
        index
    }

    /// Add a dependency edge: `from` must complete before `to` starts.
    ///
    /// Self-edges are rejected and duplicate edges are ignored. Unlike
    /// the analyzer's output guarantee, this method allows cycles to
    /// form; the analyzer breaks them afterwards.
    ///
    /// # Errors
    /// Returns an error if either endpoint is not a known task.
    pub fn add_edge(&mut self, from: &TaskId, to: &TaskId, kind: DependencyKind) -> Result<()> {
        if from == to {
            return Err(Error::Validation(format!(
                "Self-dependency on task {}",
                from
            )));
        }

        let from_index = *self
            .task_index
            .get(from)
            .ok_or_else(|| Error::Validation(format!("Task {} not found in graph", from)))?;
        let to_index = *self
            .task_index
            .get(to)
            .ok_or_else(|| Error::Validation(format!("Task {} not found in graph", to)))?;

        if self.graph.find_edge(from_index, to_index).is_none() {
            self.graph.add_edge(from_index, to_index, kind);
        }
        Ok(())
    }

    /// Get a reference to a task by its id.
    pub fn task(&self, id: &TaskId) -> Option<&Task> {
        self.task_index
            .get(id)
            .and_then(|&index| self.graph.node_weight(index))
    }

    /// Get all tasks in insertion order.
    pub fn all_tasks(&self) -> Vec<&Task> {
        self.graph.node_weights().collect()
    }

    /// Number of task nodes.
    pub fn task_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Number of dependency edges.
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Check whether the graph is empty.
    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    /// Check if a dependency edge exists between two tasks.
    pub fn contains_edge(&self, from: &TaskId, to: &TaskId) -> bool {
        match (self.task_index.get(from), self.task_index.get(to)) {
            (Some(&f), Some(&t)) => self.graph.find_edge(f, t).is_some(),
            _ => false,
        }
    }

    /// Tasks the given task depends on (incoming edges).
    pub fn dependencies_of(&self, id: &TaskId) -> Vec<&Task> {
        self.neighbors(id, Direction::Incoming)
    }

    /// Tasks that depend on the given task (outgoing edges).
    pub fn dependents_of(&self, id: &TaskId) -> Vec<&Task> {
        self.neighbors(id, Direction::Outgoing)
    }

    fn neighbors(&self, id: &TaskId, dir: Direction) -> Vec<&Task> {
        if let Some(&index) = self.task_index.get(id) {
            self.graph
                .neighbors_directed(index, dir)
                .filter_map(|n| self.graph.node_weight(n))
                .collect()
        } else {
            Vec::new()
        }
    }

    /// In-degree (count of unresolved dependencies) per task.
    pub fn in_degrees(&self) -> HashMap<TaskId, usize> {
        self.graph
            .node_indices()
            .filter_map(|index| {
                let task = self.graph.node_weight(index)?;
                let degree = self
                    .graph
                    .neighbors_directed(index, Direction::Incoming)
                    .count();
                Some((task.id, degree))
            })
            .collect()
    }

    /// All direct and transitive dependents of a task.
    ///
    /// Used to mark downstream tasks as blocked when a dependency
    /// permanently fails.
    pub fn transitive_dependents(&self, id: &TaskId) -> HashSet<TaskId> {
        let mut result = HashSet::new();
        let Some(&start) = self.task_index.get(id) else {
            return result;
        };

        let mut queue = VecDeque::from([start]);
        while let Some(index) = queue.pop_front() {
            for next in self.graph.neighbors_directed(index, Direction::Outgoing) {
                if let Some(task) = self.graph.node_weight(next) {
                    if result.insert(task.id) {
                        queue.push_back(next);
                    }
                }
            }
        }
        result
    }

    /// Find one dependency cycle, if any exists.
    ///
    /// Depth-first search with an explicit recursion stack; a back-edge
    /// to a node on the stack signals a cycle. Returns the cycle's task
    /// ids in edge order (each id has an edge to the next, and the last
    /// has an edge back to the first). Deterministic for a given
    /// insertion order.
    pub fn find_cycle(&self) -> Option<Vec<TaskId>> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            Unvisited,
            OnStack,
            Done,
        }

        let mut marks = vec![Mark::Unvisited; self.graph.node_count()];

        for start in self.graph.node_indices() {
            if marks[start.index()] != Mark::Unvisited {
                continue;
            }

            // Stack of (node, iterator position into its sorted successors).
            let mut stack: Vec<(NodeIndex, Vec<NodeIndex>, usize)> = Vec::new();
            marks[start.index()] = Mark::OnStack;
            stack.push((start, self.sorted_successors(start), 0));

            while let Some((node, succs, pos)) = stack.last_mut() {
                if *pos >= succs.len() {
                    marks[node.index()] = Mark::Done;
                    stack.pop();
                    continue;
                }
                let next = succs[*pos];
                *pos += 1;

                match marks[next.index()] {
                    Mark::OnStack => {
                        // Back-edge: collect the stack segment from `next` down.
                        let cycle_start = stack
                            .iter()
                            .position(|(n, _, _)| *n == next)
                            .unwrap_or_default();
                        let cycle = stack[cycle_start..]
                            .iter()
                            .filter_map(|(n, _, _)| self.graph.node_weight(*n))
                            .map(|t| t.id)
                            .collect();
                        return Some(cycle);
                    }
                    Mark::Unvisited => {
                        marks[next.index()] = Mark::OnStack;
                        stack.push((next, self.sorted_successors(next), 0));
                    }
                    Mark::Done => {}
                }
            }
        }
        None
    }

    fn sorted_successors(&self, index: NodeIndex) -> Vec<NodeIndex> {
        let mut succs: Vec<NodeIndex> = self
            .graph
            .neighbors_directed(index, Direction::Outgoing)
            .collect();
        succs.sort_by_key(|n| n.index());
        succs
    }

    /// Break a detected cycle by removing one of its edges.
    ///
    /// The dropped edge is the one whose source task has the lowest
    /// priority; ties are broken by task name, then id, so resolution
    /// is deterministic.
    ///
    /// # Errors
    /// Returns an error if the cycle refers to unknown tasks or edges,
    /// which indicates graph corruption.
    pub fn break_cycle(&mut self, cycle: &[TaskId]) -> Result<DroppedEdge> {
        if cycle.len() < 2 {
            return Err(Error::Validation(
                "Cycle must contain at least two tasks".to_string(),
            ));
        }

        // Pick the cycle edge whose source is least important. Priority
        // orders Critical first, so the maximum tuple is the least urgent.
        let mut chosen = 0usize;
        let mut best_key = None;
        for (i, id) in cycle.iter().enumerate() {
            let task = self
                .task(id)
                .ok_or_else(|| Error::Validation(format!("Task {} not found in graph", id)))?;
            let key = (task.priority, task.name.clone(), task.id);
            if best_key.as_ref().map_or(true, |best| key > *best) {
                chosen = i;
                best_key = Some(key);
            }
        }

        let i = chosen;
        let from = cycle[i];
        let to = cycle[(i + 1) % cycle.len()];

        let from_index = self.task_index[&from];
        let to_index = self.task_index[&to];
        let edge = self
            .graph
            .find_edge(from_index, to_index)
            .ok_or_else(|| Error::Validation(format!("Cycle edge {} -> {} not found", from, to)))?;
        self.graph.remove_edge(edge);

        Ok(DroppedEdge {
            from: self.task(&from).map(|t| t.name.clone()).unwrap_or_default(),
            to: self.task(&to).map(|t| t.name.clone()).unwrap_or_default(),
        })
    }
}

impl Default for DependencyGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for DependencyGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DependencyGraph")
            .field("tasks", &self.task_count())
            .field("edges", &self.edge_count())
            .finish()
    }
}
