//! Topological batching of the dependency graph.
//!
//! The `ExecutionScheduler` converts an acyclic dependency graph into an
//! ordered sequence of batches. Every task in a batch has all of its
//! dependencies in earlier batches, so batch members are safe to run
//! concurrently.

use crate::core::{DependencyGraph, TaskId};
use crate::error::{Error, Result};
use tracing::debug;

/// Converts a dependency graph into parallel-executable batches.
pub struct ExecutionScheduler;

impl ExecutionScheduler {
    /// Produce topological batches using Kahn's algorithm.
    ///
    /// Batch 0 holds every task with no unresolved dependencies; after a
    /// batch "completes", dependents whose in-degree drops to zero form
    /// the next batch. Within a batch, tasks are sorted by priority then
    /// name so higher-priority work starts first when capacity is
    /// limited, and so output is deterministic.
    ///
    /// # Errors
    /// Returns [`Error::UnresolvedCycle`] if tasks remain after no
    /// further progress; this cannot happen for graphs produced by the
    /// dependency analyzer.
    pub fn schedule(graph: &DependencyGraph) -> Result<Vec<Vec<TaskId>>> {
        let mut in_degrees = graph.in_degrees();
        let mut remaining = graph.task_count();
        let mut batches = Vec::new();

        while remaining > 0 {
            let mut batch: Vec<TaskId> = in_degrees
                .iter()
                .filter(|(_, &degree)| degree == 0)
                .map(|(&id, _)| id)
                .collect();

            if batch.is_empty() {
                return Err(Error::UnresolvedCycle { remaining });
            }

            Self::order_batch(graph, &mut batch);

            for id in &batch {
                in_degrees.remove(id);
                for dependent in graph.dependents_of(id) {
                    if let Some(degree) = in_degrees.get_mut(&dependent.id) {
                        *degree = degree.saturating_sub(1);
                    }
                }
            }

            remaining -= batch.len();
            debug!(batch = batches.len(), size = batch.len(), "Batch scheduled");
            batches.push(batch);
        }

        Ok(batches)
    }

    /// Sort a batch by priority (critical first), then by task name.
    fn order_batch(graph: &DependencyGraph, batch: &mut [TaskId]) {
        batch.sort_by(|a, b| {
            let ta = graph.task(a);
            let tb = graph.task(b);
            match (ta, tb) {
                (Some(ta), Some(tb)) => (ta.priority, &ta.name).cmp(&(tb.priority, &tb.name)),
                _ => std::cmp::Ordering::Equal,
            }
        });
    }

    /// Index of the batch each task belongs to.
    ///
    /// Convenience for asserting topological validity: a dependency's
    /// batch index is always smaller than its dependent's.
    pub fn batch_index(batches: &[Vec<TaskId>]) -> std::collections::HashMap<TaskId, usize> {
        batches
            .iter()
            .enumerate()
            .flat_map(|(i, batch)| batch.iter().map(move |id| (*id, i)))
            .collect()
    }
}
