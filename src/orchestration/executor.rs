//! Executor seam between the engine and the domain agents.
//!
//! Domain agents (requirements analysis, code generation, ...) are
//! external collaborators behind one uniform contract: execute a task,
//! return a JSON result or an error string. Concrete executors are
//! registered per agent type at startup.

use crate::core::Task;
use crate::orchestration::matcher::AgentType;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

/// Error string returned by an executor; the engine owns retry policy,
/// so executors report plain failures.
pub type ExecutorError = String;

/// Uniform contract every domain agent implements.
///
/// Must be safe to call concurrently for distinct tasks; the engine
/// enforces the per-agent-type concurrency cap, the executor need not.
#[async_trait]
pub trait AgentExecutor: Send + Sync {
    /// Perform the task's work and return its result payload.
    async fn execute(&self, task: &Task) -> std::result::Result<serde_json::Value, ExecutorError>;
}

/// Registry mapping agent types to their executor implementations.
#[derive(Default, Clone)]
pub struct ExecutorRegistry {
    executors: HashMap<AgentType, Arc<dyn AgentExecutor>>,
}

impl ExecutorRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an executor for an agent type, replacing any previous
    /// registration.
    pub fn register(&mut self, agent_type: impl Into<AgentType>, executor: Arc<dyn AgentExecutor>) {
        self.executors.insert(agent_type.into(), executor);
    }

    /// Look up the executor for an agent type.
    pub fn get(&self, agent_type: &AgentType) -> Option<Arc<dyn AgentExecutor>> {
        self.executors.get(agent_type).cloned()
    }

    /// Whether an executor is registered for the agent type.
    pub fn contains(&self, agent_type: &AgentType) -> bool {
        self.executors.contains_key(agent_type)
    }

    /// Number of registered executors.
    pub fn len(&self) -> usize {
        self.executors.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.executors.is_empty()
    }
}

impl std::fmt::Debug for ExecutorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutorRegistry")
            .field("agent_types", &self.executors.keys().collect::<Vec<_>>())
            .finish()
    }
}
