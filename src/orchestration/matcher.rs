//! Capability-based task assignment.
//!
//! The `CapabilityMatcher` assigns each task to an agent type using a
//! score that rewards efficiency and skill overlap and penalizes load.
//! Assignment is a single pass in priority order; when no agent type is
//! eligible the task falls back to a designated default type with a
//! warning rather than failing the plan.

use crate::core::{Task, TaskId, TaskType};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, warn};

/// Weight of the skill-overlap fraction in the match score.
pub const SKILL_WEIGHT: f64 = 0.3;
/// Weight of the normalized current load in the match score.
pub const LOAD_WEIGHT: f64 = 0.2;

/// Identifier for a category of executor.
///
/// Ordered so score ties break deterministically.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgentType(pub String);

impl AgentType {
    /// Create an agent type from a name.
    pub fn new(name: &str) -> Self {
        Self(name.to_string())
    }
}

impl std::fmt::Display for AgentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for AgentType {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// Capability profile of one agent type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentCapability {
    /// The agent type this profile describes.
    pub agent_type: AgentType,
    /// Skills the agent type offers.
    pub skills: Vec<String>,
    /// Task types this agent type can execute.
    pub supported_types: Vec<TaskType>,
    /// How many tasks of this type may run concurrently.
    pub max_concurrent: usize,
    /// Static efficiency score in 0-1.
    pub efficiency: f64,
    /// Cumulative normalized load; reset at the start of each
    /// planning pass.
    #[serde(default)]
    pub current_load: f64,
    /// Tasks assigned in the current planning pass.
    #[serde(default)]
    pub assigned: usize,
}

impl AgentCapability {
    /// Create a capability profile.
    pub fn new(
        agent_type: impl Into<AgentType>,
        skills: &[&str],
        supported_types: &[TaskType],
        max_concurrent: usize,
        efficiency: f64,
    ) -> Self {
        Self {
            agent_type: agent_type.into(),
            skills: skills.iter().map(|s| s.to_string()).collect(),
            supported_types: supported_types.to_vec(),
            max_concurrent: max_concurrent.max(1),
            efficiency: efficiency.clamp(0.0, 1.0),
            current_load: 0.0,
            assigned: 0,
        }
    }

    /// Whether this agent type can execute the given task type.
    pub fn supports(&self, task_type: TaskType) -> bool {
        self.supported_types.contains(&task_type)
    }

    /// Fraction of the task's required skills this agent type covers.
    /// A task with no required skills scores a neutral zero.
    pub fn skill_overlap(&self, task: &Task) -> f64 {
        if task.required_skills.is_empty() {
            return 0.0;
        }
        let matched = task
            .required_skills
            .iter()
            .filter(|s| self.skills.contains(s))
            .count();
        matched as f64 / task.required_skills.len() as f64
    }

    /// Match score for a task: efficiency plus weighted skill overlap
    /// minus weighted load.
    pub fn score(&self, task: &Task) -> f64 {
        self.efficiency + SKILL_WEIGHT * self.skill_overlap(task) - LOAD_WEIGHT * self.current_load
    }

    /// Record an assignment, bumping load by the task's normalized
    /// duration: `minutes / (60 * max_concurrent)`.
    pub fn record_assignment(&mut self, task: &Task) {
        self.assigned += 1;
        self.current_load +=
            task.estimated_minutes as f64 / (60.0 * self.max_concurrent as f64);
    }
}

/// Task-to-agent-type assignment map.
pub type Assignments = HashMap<TaskId, AgentType>;

/// Output of capability matching.
#[derive(Debug)]
pub struct MatchReport {
    /// Assignment of every task to an agent type.
    pub assignments: Assignments,
    /// Warnings for fallback assignments.
    pub warnings: Vec<String>,
}

/// Assigns tasks to agent types by capability score.
pub struct CapabilityMatcher {
    /// Agent type receiving tasks no profile is eligible for.
    fallback: AgentType,
}

impl CapabilityMatcher {
    /// Create a matcher with the given fallback agent type.
    pub fn new(fallback: impl Into<AgentType>) -> Self {
        Self {
            fallback: fallback.into(),
        }
    }

    /// The configured fallback agent type.
    pub fn fallback(&self) -> &AgentType {
        &self.fallback
    }

    /// Assign every task to an agent type.
    ///
    /// Tasks are processed in priority order (critical first; original
    /// order preserved within a priority level). Loads and per-pass
    /// assignment counts are reset before matching.
    ///
    /// # Errors
    /// Returns [`Error::UnknownAgentType`] if the fallback type has no
    /// capability profile; this is a configuration error.
    pub fn assign(
        &self,
        tasks: &[Task],
        capabilities: &mut [AgentCapability],
    ) -> Result<MatchReport> {
        if !capabilities
            .iter()
            .any(|c| c.agent_type == self.fallback)
        {
            return Err(Error::UnknownAgentType(self.fallback.0.clone()));
        }

        for capability in capabilities.iter_mut() {
            capability.current_load = 0.0;
            capability.assigned = 0;
        }

        let mut ordered: Vec<&Task> = tasks.iter().collect();
        ordered.sort_by_key(|t| t.priority); // stable: original order within a level

        let mut assignments = Assignments::new();
        let mut warnings = Vec::new();

        for task in ordered {
            let chosen = match Self::best_candidate(task, capabilities) {
                Some(index) => index,
                None => {
                    warn!(task = %task.name, fallback = %self.fallback, "No eligible agent type, using fallback");
                    warnings.push(format!(
                        "No eligible agent type for task '{}' ({}); assigned to fallback '{}'",
                        task.name, task.task_type, self.fallback
                    ));
                    capabilities
                        .iter()
                        .position(|c| c.agent_type == self.fallback)
                        .ok_or_else(|| Error::UnknownAgentType(self.fallback.0.clone()))?
                }
            };

            let capability = &mut capabilities[chosen];
            capability.record_assignment(task);
            debug!(
                task = %task.name,
                agent_type = %capability.agent_type,
                load = capability.current_load,
                "Task assigned"
            );
            assignments.insert(task.id, capability.agent_type.clone());
        }

        Ok(MatchReport {
            assignments,
            warnings,
        })
    }

    /// Index of the eligible capability with the highest score; ties
    /// broken by agent type identifier.
    fn best_candidate(task: &Task, capabilities: &[AgentCapability]) -> Option<usize> {
        let mut best: Option<(usize, f64)> = None;
        for (index, capability) in capabilities.iter().enumerate() {
            if !capability.supports(task.task_type) || capability.assigned >= capability.max_concurrent
            {
                continue;
            }
            let score = capability.score(task);
            let wins = match best {
                None => true,
                Some((best_index, best_score)) => {
                    score > best_score
                        || (score == best_score
                            && capability.agent_type < capabilities[best_index].agent_type)
                }
            };
            if wins {
                best = Some((index, score));
            }
        }
        best.map(|(index, _)| index)
    }
}
