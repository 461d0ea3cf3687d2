//! Planning pipeline: specs in, immutable execution plan out.
//!
//! Runs dependency analysis, capability matching, load balancing and
//! batch scheduling in that order and collects every warning the stages
//! raise into the plan's risk annotations.

use crate::core::{DependencyGraph, Task, TaskId, TaskSpec};
use crate::error::Result;
use crate::orchestration::analyzer::DependencyAnalyzer;
use crate::orchestration::balancer::LoadBalancer;
use crate::orchestration::matcher::{AgentCapability, AgentType, Assignments, CapabilityMatcher};
use crate::orchestration::scheduler::ExecutionScheduler;
use tracing::info;

/// Immutable output of the planning pipeline.
///
/// Everything the engine needs to run: tasks, the resolved dependency
/// graph, batch order and per-task agent assignments. Risk annotations
/// surface planning decisions a human may want to review.
#[derive(Debug)]
pub struct ExecutionPlan {
    /// All tasks, in spec order.
    pub tasks: Vec<Task>,
    /// Topological batches; every batch runs after the previous one.
    pub batches: Vec<Vec<TaskId>>,
    /// Agent type assigned to each task.
    pub assignments: Assignments,
    /// Resolved dependency graph.
    pub graph: DependencyGraph,
    /// Estimated total minutes: sum over batches of the longest task.
    pub estimated_minutes: u64,
    /// Fallback assignments, resolved cycles, residual imbalance.
    pub risks: Vec<String>,
}

impl ExecutionPlan {
    /// Agent type assigned to a task, if the task is part of the plan.
    pub fn assigned_type(&self, task_id: &TaskId) -> Option<&AgentType> {
        self.assignments.get(task_id)
    }

    /// Number of tasks in the plan.
    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }
}

/// Builds an [`ExecutionPlan`] from task specs and agent capabilities.
pub struct Planner {
    matcher: CapabilityMatcher,
}

impl Planner {
    /// Create a planner with the given fallback agent type.
    pub fn new(fallback: impl Into<AgentType>) -> Self {
        Self {
            matcher: CapabilityMatcher::new(fallback),
        }
    }

    /// Run the full pipeline.
    ///
    /// # Errors
    /// Returns an error for an empty spec list, a fallback agent type
    /// with no capability profile, or a dependency graph that cannot be
    /// reduced to batches.
    pub fn plan(
        &self,
        specs: Vec<TaskSpec>,
        mut capabilities: Vec<AgentCapability>,
    ) -> Result<ExecutionPlan> {
        let tasks: Vec<Task> = specs.into_iter().map(Task::from_spec).collect();

        let analysis = DependencyAnalyzer::analyze(&tasks)?;
        let mut risks = analysis.warnings;
        let graph = analysis.graph;

        let match_report = self.matcher.assign(&tasks, &mut capabilities)?;
        risks.extend(match_report.warnings);
        let mut assignments = match_report.assignments;

        let balance = LoadBalancer::balance(&mut assignments, &graph, &capabilities);
        if balance.rebalanced() {
            risks.push(format!(
                "Load imbalance detected (variation {:.2}); {} task(s) reassigned (variation now {:.2})",
                balance.variation_before, balance.moved, balance.variation_after
            ));
        }

        let batches = ExecutionScheduler::schedule(&graph)?;
        let estimated_minutes = Self::estimate_minutes(&batches, &graph);

        info!(
            tasks = tasks.len(),
            batches = batches.len(),
            estimated_minutes,
            risks = risks.len(),
            "Execution plan ready"
        );

        Ok(ExecutionPlan {
            tasks,
            batches,
            assignments,
            graph,
            estimated_minutes,
            risks,
        })
    }

    /// Critical-path estimate: batches run sequentially, tasks within a
    /// batch run in parallel, so each batch costs its longest task.
    fn estimate_minutes(batches: &[Vec<TaskId>], graph: &DependencyGraph) -> u64 {
        batches
            .iter()
            .map(|batch| {
                batch
                    .iter()
                    .filter_map(|id| graph.task(id))
                    .map(|task| task.estimated_minutes)
                    .max()
                    .unwrap_or(0)
            })
            .sum()
    }
}
