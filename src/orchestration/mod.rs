//! Planning and execution pipeline.
//!
//! `analyzer` resolves task dependencies into a DAG, `matcher` assigns
//! tasks to agent types, `balancer` evens out per-type load, `scheduler`
//! cuts the DAG into parallel batches, `planner` chains the four into an
//! [`planner::ExecutionPlan`], and `engine` runs the plan against the
//! executors registered in `executor`.

pub mod analyzer;
pub mod balancer;
pub mod engine;
pub mod executor;
pub mod matcher;
pub mod metrics;
pub mod planner;
pub mod scheduler;

pub use analyzer::{AnalysisReport, DependencyAnalyzer};
pub use balancer::{BalanceReport, LoadBalancer};
pub use engine::ParallelExecutionEngine;
pub use executor::{AgentExecutor, ExecutorError, ExecutorRegistry};
pub use matcher::{AgentCapability, AgentType, Assignments, CapabilityMatcher, MatchReport};
pub use metrics::{
    Escalation, ExecutionMetrics, ExecutionState, ExecutionSummary, TaskExecution, TaskReport,
};
pub use planner::{ExecutionPlan, Planner};
pub use scheduler::ExecutionScheduler;
