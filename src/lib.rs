pub mod config;
pub mod core;
pub mod error;
pub mod orchestration;

pub use config::EngineConfig;
pub use core::{DependencyGraph, Priority, Task, TaskId, TaskSpec, TaskType};
pub use error::{Error, Result};
pub use orchestration::{
    AgentCapability, AgentExecutor, AgentType, ExecutionPlan, ExecutionSummary, ExecutorRegistry,
    ParallelExecutionEngine, Planner,
};
