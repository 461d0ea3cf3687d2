//! Load balancing across agent types.
//!
//! After matching, per-agent-type cumulative load can be skewed. The
//! `LoadBalancer` measures the coefficient of variation across agent
//! types and, past a threshold, transfers movable tasks from the most-
//! to the least-loaded type. This is a single-pass heuristic, not an
//! optimizer: one call moves at most half of the movable candidates
//! between the two extreme types.

use crate::core::DependencyGraph;
use crate::orchestration::matcher::{AgentCapability, AgentType, Assignments};
use std::collections::HashMap;
use tracing::{debug, info};

/// Coefficient-of-variation threshold above which rebalancing triggers.
pub const VARIANCE_THRESHOLD: f64 = 0.2;

/// Outcome of one balancing pass.
#[derive(Debug, Clone, PartialEq)]
pub struct BalanceReport {
    /// Coefficient of variation before balancing.
    pub variation_before: f64,
    /// Coefficient of variation after balancing.
    pub variation_after: f64,
    /// Number of tasks moved between agent types.
    pub moved: usize,
}

impl BalanceReport {
    /// Whether the pass changed any assignments.
    pub fn rebalanced(&self) -> bool {
        self.moved > 0
    }
}

/// Transfers load between over- and under-loaded agent types.
pub struct LoadBalancer;

impl LoadBalancer {
    /// Rebalance assignments in place if load variation is excessive.
    ///
    /// Per-type load is measured in hours of estimated duration. If the
    /// coefficient of variation (stddev / mean) across the given
    /// capabilities is at or below [`VARIANCE_THRESHOLD`] the
    /// assignments are returned unchanged.
    pub fn balance(
        assignments: &mut Assignments,
        graph: &DependencyGraph,
        capabilities: &[AgentCapability],
    ) -> BalanceReport {
        let loads = Self::load_hours(assignments, graph, capabilities);
        let before = Self::coefficient_of_variation(&loads);

        if before <= VARIANCE_THRESHOLD || capabilities.len() < 2 {
            return BalanceReport {
                variation_before: before,
                variation_after: before,
                moved: 0,
            };
        }

        let Some((busiest, idlest)) = Self::extremes(&loads) else {
            return BalanceReport {
                variation_before: before,
                variation_after: before,
                moved: 0,
            };
        };

        // Tasks on the busiest type whose type the idlest type supports,
        // sorted by name for determinism. Only the destination's support
        // is checked, deliberately: a task fallback-assigned to a type
        // that does not support it can still move off the overloaded
        // type this way.
        let idle_capability = capabilities
            .iter()
            .find(|c| c.agent_type == idlest);
        let mut candidates: Vec<_> = assignments
            .iter()
            .filter(|(_, agent)| **agent == busiest)
            .filter_map(|(id, _)| graph.task(id))
            .filter(|task| {
                idle_capability.map_or(false, |c| c.supports(task.task_type))
            })
            .map(|task| (task.name.clone(), task.id))
            .collect();
        candidates.sort();

        let to_move = candidates.len() / 2;
        for (name, id) in candidates.into_iter().take(to_move) {
            debug!(task = %name, from = %busiest, to = %idlest, "Task moved");
            assignments.insert(id, idlest.clone());
        }

        let after = Self::coefficient_of_variation(&Self::load_hours(
            assignments,
            graph,
            capabilities,
        ));
        if to_move > 0 {
            info!(
                moved = to_move,
                from = %busiest,
                to = %idlest,
                variation_before = before,
                variation_after = after,
                "Load rebalanced"
            );
        }

        BalanceReport {
            variation_before: before,
            variation_after: after,
            moved: to_move,
        }
    }

    /// Cumulative assigned hours per agent type. Types with no
    /// assignments count as zero load.
    pub fn load_hours(
        assignments: &Assignments,
        graph: &DependencyGraph,
        capabilities: &[AgentCapability],
    ) -> HashMap<AgentType, f64> {
        let mut loads: HashMap<AgentType, f64> = capabilities
            .iter()
            .map(|c| (c.agent_type.clone(), 0.0))
            .collect();
        for (id, agent) in assignments {
            if let Some(task) = graph.task(id) {
                *loads.entry(agent.clone()).or_insert(0.0) += task.estimated_hours();
            }
        }
        loads
    }

    /// stddev / mean over the load values; zero for degenerate inputs.
    pub fn coefficient_of_variation(loads: &HashMap<AgentType, f64>) -> f64 {
        if loads.len() < 2 {
            return 0.0;
        }
        let n = loads.len() as f64;
        let mean = loads.values().sum::<f64>() / n;
        if mean <= f64::EPSILON {
            return 0.0;
        }
        let variance = loads.values().map(|l| (l - mean).powi(2)).sum::<f64>() / n;
        variance.sqrt() / mean
    }

    /// The most- and least-loaded agent types; ties broken by type name
    /// for determinism.
    fn extremes(loads: &HashMap<AgentType, f64>) -> Option<(AgentType, AgentType)> {
        let mut ordered: Vec<_> = loads.iter().collect();
        ordered.sort_by(|a, b| {
            a.1.partial_cmp(b.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(b.0))
        });
        let idlest = ordered.first()?.0.clone();
        let busiest = ordered.last()?.0.clone();
        if busiest == idlest {
            return None;
        }
        Some((busiest, idlest))
    }
}
