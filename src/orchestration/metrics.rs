//! Runtime execution records and plan-scoped metrics.
//!
//! `TaskExecution` is the mutable runtime record for a single task in a
//! plan run; `ExecutionMetrics` is the aggregate the monitoring loop
//! recomputes; `ExecutionSummary` is the engine's final output consumed
//! by downstream result integration.

use crate::core::TaskId;
use crate::orchestration::matcher::AgentType;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Lifecycle state of one task execution.
///
/// `Failed` may transition back to `Running` via retry until attempts
/// are exhausted; `Blocked` is terminal and means a dependency
/// permanently failed, distinct from a failure of the task itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum ExecutionState {
    /// Not yet dispatched.
    Pending,
    /// Currently running on an executor.
    Running,
    /// Finished successfully.
    Completed,
    /// Own execution failed after retries.
    Failed {
        /// Last error returned by the executor.
        error: String,
    },
    /// Never dispatched because a dependency permanently failed.
    Blocked {
        /// Why the task was blocked.
        reason: String,
    },
}

impl ExecutionState {
    /// Whether the state is terminal.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ExecutionState::Completed
                | ExecutionState::Failed { .. }
                | ExecutionState::Blocked { .. }
        )
    }
}

impl std::fmt::Display for ExecutionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutionState::Pending => write!(f, "pending"),
            ExecutionState::Running => write!(f, "running"),
            ExecutionState::Completed => write!(f, "completed"),
            ExecutionState::Failed { error } => write!(f, "failed: {}", error),
            ExecutionState::Blocked { reason } => write!(f, "blocked: {}", reason),
        }
    }
}

/// Mutable runtime record for one task within one plan run.
///
/// Owned exclusively by the engine; safe to read once terminal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskExecution {
    /// The task being executed.
    pub task_id: TaskId,
    /// Agent type the task was assigned to.
    pub agent_type: AgentType,
    /// Current lifecycle state.
    pub state: ExecutionState,
    /// When execution first started.
    pub started_at: Option<DateTime<Utc>>,
    /// When a terminal state was reached.
    pub finished_at: Option<DateTime<Utc>>,
    /// Retries performed after the initial attempt.
    pub retry_count: u32,
    /// Result payload on success.
    pub result: Option<serde_json::Value>,
}

impl TaskExecution {
    /// Create a pending record.
    pub fn new(task_id: TaskId, agent_type: AgentType) -> Self {
        Self {
            task_id,
            agent_type,
            state: ExecutionState::Pending,
            started_at: None,
            finished_at: None,
            retry_count: 0,
            result: None,
        }
    }

    /// Transition to running, recording the first start time.
    pub fn start(&mut self) {
        self.state = ExecutionState::Running;
        if self.started_at.is_none() {
            self.started_at = Some(Utc::now());
        }
    }

    /// Transition to completed with a result payload.
    pub fn complete(&mut self, result: serde_json::Value) {
        self.state = ExecutionState::Completed;
        self.result = Some(result);
        self.finished_at = Some(Utc::now());
    }

    /// Transition to failed with the last executor error.
    pub fn fail(&mut self, error: &str) {
        self.state = ExecutionState::Failed {
            error: error.to_string(),
        };
        self.finished_at = Some(Utc::now());
    }

    /// Transition to blocked with a reason.
    pub fn block(&mut self, reason: &str) {
        self.state = ExecutionState::Blocked {
            reason: reason.to_string(),
        };
        self.finished_at = Some(Utc::now());
    }

    /// Wall-clock execution time in seconds, if both timestamps exist.
    pub fn execution_seconds(&self) -> Option<f64> {
        match (self.started_at, self.finished_at) {
            (Some(start), Some(end)) => {
                Some((end - start).num_milliseconds().max(0) as f64 / 1000.0)
            }
            _ => None,
        }
    }
}

/// Escalation event for a failed high-priority task.
///
/// Fire-and-forget: the sink must never block the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Escalation {
    /// The task whose retries were exhausted.
    pub task_id: TaskId,
    /// Agent type that executed the task.
    pub agent_type: AgentType,
    /// Last executor error.
    pub error: String,
    /// Retries performed before giving up.
    pub retry_count: u32,
    /// When the escalation was raised.
    pub escalated_at: DateTime<Utc>,
}

/// Plan-scoped aggregate metrics.
///
/// Mutated only by the engine's synchronized update path and the
/// monitoring loop; read by the final summary.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecutionMetrics {
    /// Total tasks in the plan.
    pub total_tasks: usize,
    /// Tasks completed successfully.
    pub completed_tasks: usize,
    /// Tasks failed after retries.
    pub failed_tasks: usize,
    /// Tasks blocked by failed dependencies.
    pub blocked_tasks: usize,
    /// failed / (completed + failed); 0 when nothing is terminal yet.
    pub error_rate: f64,
    /// Mean execution seconds over finished tasks.
    pub average_execution_secs: f64,
    /// Completed tasks per hour of elapsed time.
    pub throughput_per_hour: f64,
    /// Busy fraction (0-1) per agent type.
    pub utilization: HashMap<AgentType, f64>,
}

impl ExecutionMetrics {
    /// Recompute the aggregate from the current execution records.
    ///
    /// `capacities` maps each agent type to its max concurrency so
    /// utilization is normalized to 0-1, and `elapsed` is wall-clock
    /// time since the run started.
    pub fn recompute(
        executions: &HashMap<TaskId, TaskExecution>,
        capacities: &HashMap<AgentType, usize>,
        elapsed: Duration,
    ) -> Self {
        let total_tasks = executions.len();
        let mut completed_tasks = 0;
        let mut failed_tasks = 0;
        let mut blocked_tasks = 0;
        let mut execution_secs = Vec::new();
        let mut busy_secs: HashMap<AgentType, f64> = HashMap::new();

        for execution in executions.values() {
            match &execution.state {
                ExecutionState::Completed => completed_tasks += 1,
                ExecutionState::Failed { .. } => failed_tasks += 1,
                ExecutionState::Blocked { .. } => blocked_tasks += 1,
                _ => {}
            }
            if let Some(secs) = execution.execution_seconds() {
                execution_secs.push(secs);
                *busy_secs.entry(execution.agent_type.clone()).or_insert(0.0) += secs;
            }
        }

        let finished = completed_tasks + failed_tasks;
        let error_rate = if finished > 0 {
            failed_tasks as f64 / finished as f64
        } else {
            0.0
        };
        let average_execution_secs = if execution_secs.is_empty() {
            0.0
        } else {
            execution_secs.iter().sum::<f64>() / execution_secs.len() as f64
        };
        let elapsed_secs = elapsed.as_secs_f64();
        let throughput_per_hour = if elapsed_secs > 0.0 {
            completed_tasks as f64 * 3600.0 / elapsed_secs
        } else {
            0.0
        };

        let utilization = busy_secs
            .into_iter()
            .map(|(agent, busy)| {
                let capacity = capacities.get(&agent).copied().unwrap_or(1).max(1);
                let fraction = if elapsed_secs > 0.0 {
                    (busy / (elapsed_secs * capacity as f64)).clamp(0.0, 1.0)
                } else {
                    0.0
                };
                (agent, fraction)
            })
            .collect();

        Self {
            total_tasks,
            completed_tasks,
            failed_tasks,
            blocked_tasks,
            error_rate,
            average_execution_secs,
            throughput_per_hour,
            utilization,
        }
    }
}

/// Per-task entry in the final summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskReport {
    /// Terminal (or last observed) state.
    pub status: ExecutionState,
    /// Result payload for completed tasks.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    /// Last error for failed tasks.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Retries performed.
    pub retry_count: u32,
}

impl From<&TaskExecution> for TaskReport {
    fn from(execution: &TaskExecution) -> Self {
        let error = match &execution.state {
            ExecutionState::Failed { error } => Some(error.clone()),
            ExecutionState::Blocked { reason } => Some(reason.clone()),
            _ => None,
        };
        Self {
            status: execution.state.clone(),
            result: execution.result.clone(),
            error,
            retry_count: execution.retry_count,
        }
    }
}

/// Final output of one plan run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionSummary {
    /// Total tasks in the plan.
    pub total_tasks: usize,
    /// Tasks completed successfully.
    pub completed_tasks: usize,
    /// Tasks failed after retries.
    pub failed_tasks: usize,
    /// Tasks blocked by failed dependencies.
    pub blocked_tasks: usize,
    /// completed / total, expressed as 0-100.
    pub success_rate: f64,
    /// Mean execution seconds over finished tasks.
    pub average_execution_secs: f64,
    /// Wall-clock seconds for the whole run.
    pub total_execution_secs: f64,
    /// Completed tasks per hour.
    pub throughput_per_hour: f64,
    /// Busy fraction (0-1) per agent type.
    pub agent_utilization: HashMap<AgentType, f64>,
    /// Per-task outcomes keyed by task id.
    pub per_task_results: HashMap<TaskId, TaskReport>,
    /// Whether the error-rate threshold paused dispatch at any point.
    pub degraded: bool,
    /// Whether the plan was cancelled before all batches ran.
    pub cancelled: bool,
}
