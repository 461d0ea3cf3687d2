//! Task data model for the execution engine.
//!
//! Tasks are the atomic units of work produced by an external decomposer
//! and consumed by the planner. They are immutable once constructed;
//! runtime state lives in `TaskExecution` records, not here.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a task within a plan.
///
/// Uses UUID v4 for generation and provides a short form display
/// for human-readable output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub Uuid);

impl TaskId {
    /// Create a new unique task identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Return first 8 characters of the UUID for display.
    pub fn short(&self) -> String {
        self.0.to_string()[..8].to_string()
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for TaskId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Task priority, ordered from most to least urgent.
///
/// The matcher processes tasks in this order, and the scheduler sorts
/// batch members by it so urgent work starts first under limited capacity.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    /// Failure requires immediate human attention.
    Critical,
    /// Important work; failures are escalated after retries.
    High,
    /// Normal work.
    #[default]
    Medium,
    /// Best-effort work.
    Low,
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Priority::Critical => write!(f, "critical"),
            Priority::High => write!(f, "high"),
            Priority::Medium => write!(f, "medium"),
            Priority::Low => write!(f, "low"),
        }
    }
}

impl Priority {
    /// Whether a terminal failure of this task should be escalated
    /// to a human operator.
    pub fn escalates(&self) -> bool {
        matches!(self, Priority::Critical | Priority::High)
    }
}

/// Category of work a task represents.
///
/// Task types determine which agent types may execute a task and feed
/// the implicit type-precedence edges in the dependency analyzer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    /// Analysis of requirements; precedes all design work.
    RequirementAnalysis,
    /// User-facing product design.
    ProductDesign,
    /// Technical architecture design.
    ArchitectureDesign,
    /// Milestone and work breakdown planning.
    ProjectPlanning,
    /// Implementation work.
    CodeGeneration,
    /// Testing and verification of generated code.
    QualityAssurance,
    /// Written documentation for completed work.
    Documentation,
}

impl std::fmt::Display for TaskType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskType::RequirementAnalysis => write!(f, "requirement_analysis"),
            TaskType::ProductDesign => write!(f, "product_design"),
            TaskType::ArchitectureDesign => write!(f, "architecture_design"),
            TaskType::ProjectPlanning => write!(f, "project_planning"),
            TaskType::CodeGeneration => write!(f, "code_generation"),
            TaskType::QualityAssurance => write!(f, "quality_assurance"),
            TaskType::Documentation => write!(f, "documentation"),
        }
    }
}

/// Raw task descriptor as produced by the external decomposer.
///
/// Names are unique within one plan and dependency references are by name.
/// The planner turns these into [`Task`]s with generated ids.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSpec {
    /// Unique (within the plan) human-readable name.
    pub name: String,
    /// Category of work.
    pub task_type: TaskType,
    /// Urgency of the task.
    #[serde(default)]
    pub priority: Priority,
    /// Estimated duration in minutes.
    pub estimated_minutes: u64,
    /// Names of tasks this task waits on.
    #[serde(default)]
    pub dependencies: Vec<String>,
    /// Expected outputs.
    #[serde(default)]
    pub deliverables: Vec<String>,
    /// Conditions under which the task counts as done.
    #[serde(default)]
    pub acceptance_criteria: Vec<String>,
    /// Skills an executing agent should have; used for match scoring.
    #[serde(default)]
    pub required_skills: Vec<String>,
}

impl TaskSpec {
    /// Create a minimal spec with the given name and type.
    pub fn new(name: &str, task_type: TaskType) -> Self {
        Self {
            name: name.to_string(),
            task_type,
            priority: Priority::Medium,
            estimated_minutes: 30,
            dependencies: Vec::new(),
            deliverables: Vec::new(),
            acceptance_criteria: Vec::new(),
            required_skills: Vec::new(),
        }
    }

    /// Set the priority.
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Set the estimated duration in minutes.
    pub fn with_minutes(mut self, minutes: u64) -> Self {
        self.estimated_minutes = minutes;
        self
    }

    /// Set the dependency names.
    pub fn with_dependencies(mut self, deps: &[&str]) -> Self {
        self.dependencies = deps.iter().map(|d| d.to_string()).collect();
        self
    }

    /// Set the required skills.
    pub fn with_skills(mut self, skills: &[&str]) -> Self {
        self.required_skills = skills.iter().map(|s| s.to_string()).collect();
        self
    }
}

/// An immutable unit of work within one plan.
///
/// Created once from a [`TaskSpec`] and never mutated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Unique identifier for this task.
    pub id: TaskId,
    /// Human-readable name, unique within the plan.
    pub name: String,
    /// Category of work.
    pub task_type: TaskType,
    /// Urgency of the task.
    pub priority: Priority,
    /// Estimated duration in minutes.
    pub estimated_minutes: u64,
    /// Names of tasks this task waits on.
    pub dependencies: Vec<String>,
    /// Expected outputs.
    pub deliverables: Vec<String>,
    /// Conditions under which the task counts as done.
    pub acceptance_criteria: Vec<String>,
    /// Skills an executing agent should have.
    pub required_skills: Vec<String>,
    /// When the task was created.
    pub created_at: DateTime<Utc>,
}

impl Task {
    /// Build a task from a raw descriptor, generating a fresh id.
    pub fn from_spec(spec: TaskSpec) -> Self {
        Self {
            id: TaskId::new(),
            name: spec.name,
            task_type: spec.task_type,
            priority: spec.priority,
            estimated_minutes: spec.estimated_minutes,
            dependencies: spec.dependencies,
            deliverables: spec.deliverables,
            acceptance_criteria: spec.acceptance_criteria,
            required_skills: spec.required_skills,
            created_at: Utc::now(),
        }
    }

    /// Estimated duration expressed in hours.
    pub fn estimated_hours(&self) -> f64 {
        self.estimated_minutes as f64 / 60.0
    }
}
