//! Dependency analysis for decomposed task lists.
//!
//! The `DependencyAnalyzer` builds a directed dependency graph from the
//! tasks' explicit (named) dependencies and the implicit type-precedence
//! rules, then detects and deterministically resolves cycles so the
//! scheduler always receives an acyclic graph.

use crate::core::{DependencyGraph, DependencyKind, Task, TaskId, TaskType};
use crate::error::{Error, Result};
use std::collections::HashMap;
use tracing::warn;

/// Static type-precedence rules: every task of the left type must
/// complete before any task of the right types may start.
///
/// Kept as one explicit table rather than scattered conditionals so the
/// analyzer's acyclicity guarantee stays easy to verify.
pub const TYPE_PRECEDENCE: &[(TaskType, &[TaskType])] = &[
    (
        TaskType::RequirementAnalysis,
        &[
            TaskType::ProductDesign,
            TaskType::ArchitectureDesign,
            TaskType::ProjectPlanning,
        ],
    ),
    (TaskType::ArchitectureDesign, &[TaskType::CodeGeneration]),
    (TaskType::ProjectPlanning, &[TaskType::CodeGeneration]),
    (
        TaskType::CodeGeneration,
        &[TaskType::QualityAssurance, TaskType::Documentation],
    ),
];

/// Output of dependency analysis: the acyclic graph plus warnings for
/// every anomaly that was recovered automatically.
#[derive(Debug)]
pub struct AnalysisReport {
    /// The dependency graph; guaranteed acyclic.
    pub graph: DependencyGraph,
    /// Human-readable warnings (unresolved names, broken cycles).
    pub warnings: Vec<String>,
}

/// Builds and validates the task dependency graph.
pub struct DependencyAnalyzer;

impl DependencyAnalyzer {
    /// Analyze a task list into an acyclic dependency graph.
    ///
    /// Explicit dependency names that resolve to no task are dropped
    /// with a warning. Cycles are broken deterministically (the edge
    /// leaving the lowest-priority task in the cycle is removed) and
    /// reported as warnings, never as errors.
    ///
    /// # Errors
    /// Returns [`Error::EmptyPlan`] for an empty task list; this is a
    /// configuration error, not a recoverable anomaly.
    pub fn analyze(tasks: &[Task]) -> Result<AnalysisReport> {
        if tasks.is_empty() {
            return Err(Error::EmptyPlan);
        }

        let mut graph = DependencyGraph::new();
        let mut warnings = Vec::new();

        for task in tasks {
            graph.add_task(task.clone());
        }

        let by_name: HashMap<&str, TaskId> =
            tasks.iter().map(|t| (t.name.as_str(), t.id)).collect();

        // Explicit edges from declared dependency names.
        for task in tasks {
            for dep_name in &task.dependencies {
                match by_name.get(dep_name.as_str()) {
                    Some(dep_id) if *dep_id == task.id => {
                        warnings.push(format!(
                            "Task '{}' depends on itself; dependency ignored",
                            task.name
                        ));
                    }
                    Some(dep_id) => {
                        graph.add_edge(dep_id, &task.id, DependencyKind::Explicit)?;
                    }
                    None => {
                        warn!(task = %task.name, dependency = %dep_name, "Unresolved dependency name");
                        warnings.push(format!(
                            "Task '{}' references unknown dependency '{}'; edge dropped",
                            task.name, dep_name
                        ));
                    }
                }
            }
        }

        Self::add_implicit_edges(tasks, &mut graph)?;
        Self::resolve_cycles(&mut graph, &mut warnings)?;

        Ok(AnalysisReport { graph, warnings })
    }

    /// Add type-precedence edges: every task of a prerequisite type
    /// precedes every task of a dependent type.
    fn add_implicit_edges(tasks: &[Task], graph: &mut DependencyGraph) -> Result<()> {
        for (prereq_type, dependent_types) in TYPE_PRECEDENCE {
            for prereq in tasks.iter().filter(|t| t.task_type == *prereq_type) {
                for dependent in tasks
                    .iter()
                    .filter(|t| dependent_types.contains(&t.task_type))
                {
                    if prereq.id == dependent.id {
                        continue;
                    }
                    graph.add_edge(&prereq.id, &dependent.id, DependencyKind::TypePrecedence)?;
                }
            }
        }
        Ok(())
    }

    /// Break cycles until the graph is acyclic.
    ///
    /// Each pass removes exactly one edge, so this terminates after at
    /// most `edge_count` iterations.
    fn resolve_cycles(graph: &mut DependencyGraph, warnings: &mut Vec<String>) -> Result<()> {
        while let Some(cycle) = graph.find_cycle() {
            let names: Vec<String> = cycle
                .iter()
                .filter_map(|id| graph.task(id).map(|t| t.name.clone()))
                .collect();
            let dropped = graph.break_cycle(&cycle)?;
            warn!(cycle = ?names, dropped = %dropped, "Dependency cycle resolved");
            warnings.push(format!(
                "Dependency cycle through [{}] resolved by dropping edge {}",
                names.join(", "),
                dropped
            ));
        }
        Ok(())
    }
}
