//! Parallel plan execution with bounded concurrency.
//!
//! The engine runs an [`ExecutionPlan`] batch by batch. Batches execute
//! strictly in order; tasks within a batch run concurrently, bounded by
//! a system-wide semaphore and a per-agent-type semaphore. Failures are
//! retried with exponential backoff, high-priority exhaustion escalates
//! on a channel sink, and a monitoring loop pauses dispatch while the
//! error rate is above the configured threshold.

use crate::config::EngineConfig;
use crate::core::{Task, TaskId};
use crate::error::{Error, Result};
use crate::orchestration::executor::{AgentExecutor, ExecutorRegistry};
use crate::orchestration::matcher::{AgentCapability, AgentType};
use crate::orchestration::metrics::{
    Escalation, ExecutionMetrics, ExecutionState, ExecutionSummary, TaskExecution, TaskReport,
};
use crate::orchestration::planner::ExecutionPlan;
use chrono::Utc;
use futures::future::join_all;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, RwLock, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

type ExecutionRecords = Arc<RwLock<HashMap<TaskId, TaskExecution>>>;

/// Executes plans against registered agent executors.
pub struct ParallelExecutionEngine {
    config: EngineConfig,
    registry: ExecutorRegistry,
    /// Max concurrency per agent type, from the capability profiles.
    limits: HashMap<AgentType, usize>,
    escalations: Option<mpsc::UnboundedSender<Escalation>>,
}

impl ParallelExecutionEngine {
    /// Create an engine from config, executors and capability profiles.
    ///
    /// The capability profiles supply each agent type's concurrency
    /// limit; types without a profile fall back to the system-wide
    /// limit.
    pub fn new(
        config: EngineConfig,
        registry: ExecutorRegistry,
        capabilities: &[AgentCapability],
    ) -> Self {
        let limits = capabilities
            .iter()
            .map(|c| (c.agent_type.clone(), c.max_concurrent))
            .collect();
        Self {
            config,
            registry,
            limits,
            escalations: None,
        }
    }

    /// Attach a sink for escalations of exhausted high-priority tasks.
    ///
    /// The channel is unbounded; sending never blocks execution, and a
    /// dropped receiver is ignored.
    pub fn with_escalations(mut self, sink: mpsc::UnboundedSender<Escalation>) -> Self {
        self.escalations = Some(sink);
        self
    }

    /// Execute a plan to completion.
    pub async fn execute(&self, plan: &ExecutionPlan) -> Result<ExecutionSummary> {
        self.execute_with_cancellation(plan, CancellationToken::new())
            .await
    }

    /// Execute a plan, stopping early if `cancel` fires.
    ///
    /// On cancellation no new batch starts, in-flight tasks drain, and
    /// the partial summary is returned with `cancelled = true`.
    ///
    /// # Errors
    /// Returns [`Error::MissingExecutor`] before any task runs if an
    /// assigned agent type has no registered executor.
    pub async fn execute_with_cancellation(
        &self,
        plan: &ExecutionPlan,
        cancel: CancellationToken,
    ) -> Result<ExecutionSummary> {
        for agent_type in plan.assignments.values() {
            if !self.registry.contains(agent_type) {
                return Err(Error::MissingExecutor(agent_type.to_string()));
            }
        }

        let started = Instant::now();
        let records: ExecutionRecords = Arc::new(RwLock::new(
            plan.tasks
                .iter()
                .filter_map(|task| {
                    plan.assignments
                        .get(&task.id)
                        .map(|agent| (task.id, TaskExecution::new(task.id, agent.clone())))
                })
                .collect(),
        ));
        let metrics = Arc::new(RwLock::new(ExecutionMetrics::default()));
        let degraded = Arc::new(AtomicBool::new(false));
        let was_degraded = Arc::new(AtomicBool::new(false));

        let monitor_cancel = CancellationToken::new();
        let monitor = tokio::spawn(Self::monitor_loop(
            Arc::clone(&records),
            self.limits.clone(),
            started,
            Arc::clone(&metrics),
            Arc::clone(&degraded),
            Arc::clone(&was_degraded),
            self.config.failure_threshold,
            self.config.monitor_interval,
            monitor_cancel.clone(),
        ));

        let system = Arc::new(Semaphore::new(self.config.max_concurrent_agents));
        let type_semaphores: HashMap<AgentType, Arc<Semaphore>> = self
            .limits
            .iter()
            .map(|(agent, limit)| (agent.clone(), Arc::new(Semaphore::new((*limit).max(1)))))
            .collect();
        let default_semaphore = Arc::new(Semaphore::new(self.config.max_concurrent_agents));

        let mut cancelled = false;
        for (batch_number, batch) in plan.batches.iter().enumerate() {
            if cancel.is_cancelled() {
                cancelled = true;
                break;
            }

            self.pause_while_degraded(&degraded, &cancel).await;
            if cancel.is_cancelled() {
                cancelled = true;
                break;
            }

            let runnable = Self::propagate_blocked(plan, batch, &records).await;
            info!(
                batch = batch_number + 1,
                runnable = runnable.len(),
                blocked = batch.len() - runnable.len(),
                "Batch started"
            );

            let mut futures = Vec::with_capacity(runnable.len());
            for task_id in runnable {
                let Some(task) = plan.graph.task(&task_id) else {
                    continue;
                };
                let Some(agent) = plan.assignments.get(&task_id) else {
                    continue;
                };
                let executor = self
                    .registry
                    .get(agent)
                    .ok_or_else(|| Error::MissingExecutor(agent.to_string()))?;
                let type_semaphore = type_semaphores
                    .get(agent)
                    .unwrap_or(&default_semaphore)
                    .clone();
                futures.push(self.run_task(
                    task.clone(),
                    agent.clone(),
                    executor,
                    Arc::clone(&system),
                    type_semaphore,
                    Arc::clone(&records),
                    cancel.clone(),
                ));
            }
            join_all(futures).await;
            Self::refresh_metrics(
                &records,
                &self.limits,
                started,
                &metrics,
                &degraded,
                &was_degraded,
                self.config.failure_threshold,
            )
            .await;
        }
        if cancel.is_cancelled() {
            cancelled = true;
        }

        monitor_cancel.cancel();
        monitor
            .await
            .map_err(|e| Error::TaskJoin(e.to_string()))?;

        let summary = self
            .build_summary(&records, started, was_degraded.load(Ordering::SeqCst), cancelled)
            .await;
        info!(
            completed = summary.completed_tasks,
            failed = summary.failed_tasks,
            blocked = summary.blocked_tasks,
            success_rate = summary.success_rate,
            cancelled = summary.cancelled,
            "Plan finished"
        );
        Ok(summary)
    }

    /// Mark batch members with a failed or blocked dependency as
    /// blocked and return the ids that may run.
    async fn propagate_blocked(
        plan: &ExecutionPlan,
        batch: &[TaskId],
        records: &ExecutionRecords,
    ) -> Vec<TaskId> {
        let mut guard = records.write().await;
        let mut runnable = Vec::with_capacity(batch.len());
        for task_id in batch {
            let reason = plan.graph.dependencies_of(task_id).iter().find_map(|dep| {
                match guard.get(&dep.id).map(|r| &r.state) {
                    Some(ExecutionState::Failed { .. }) => {
                        Some(format!("dependency '{}' failed", dep.name))
                    }
                    Some(ExecutionState::Blocked { .. }) => {
                        Some(format!("dependency '{}' was blocked", dep.name))
                    }
                    _ => None,
                }
            });
            match reason {
                Some(reason) => {
                    if let Some(record) = guard.get_mut(task_id) {
                        warn!(task = %task_id, reason = %reason, "Task blocked");
                        record.block(&reason);
                    }
                }
                None => runnable.push(*task_id),
            }
        }
        runnable
    }

    /// Hold off the next batch while the degraded flag is set, up to
    /// `pause_cooldown`.
    async fn pause_while_degraded(&self, degraded: &AtomicBool, cancel: &CancellationToken) {
        if !degraded.load(Ordering::SeqCst) {
            return;
        }
        warn!("Error rate above threshold, pausing before next batch");
        let deadline = Instant::now() + self.config.pause_cooldown;
        while degraded.load(Ordering::SeqCst) && Instant::now() < deadline {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(self.config.monitor_interval) => {}
            }
        }
    }

    /// Run one task through its executor, retrying with exponential
    /// backoff until success or `max_retries` is exhausted.
    ///
    /// Both permits are released while the task sleeps out a backoff,
    /// so a retrying task never holds a concurrency slot idle.
    #[allow(clippy::too_many_arguments)]
    async fn run_task(
        &self,
        task: Task,
        agent: AgentType,
        executor: Arc<dyn AgentExecutor>,
        system: Arc<Semaphore>,
        type_semaphore: Arc<Semaphore>,
        records: ExecutionRecords,
        cancel: CancellationToken,
    ) {
        let mut attempt = 0u32;
        loop {
            let Ok(system_permit) = system.acquire().await else {
                return;
            };
            let Ok(type_permit) = type_semaphore.acquire().await else {
                return;
            };

            if let Some(record) = records.write().await.get_mut(&task.id) {
                record.start();
            }
            info!(task = %task.name, agent = %agent, attempt, "Task started");

            match executor.execute(&task).await {
                Ok(result) => {
                    if let Some(record) = records.write().await.get_mut(&task.id) {
                        record.complete(result);
                    }
                    info!(task = %task.name, agent = %agent, "Task completed");
                    return;
                }
                Err(message) => {
                    if attempt >= self.config.max_retries {
                        error!(
                            task = %task.name,
                            agent = %agent,
                            retries = attempt,
                            error = %message,
                            "Task failed, retries exhausted"
                        );
                        if let Some(record) = records.write().await.get_mut(&task.id) {
                            record.fail(&message);
                        }
                        self.escalate(&task, &agent, &message, attempt);
                        return;
                    }
                    let delay = self.config.backoff_delay(attempt);
                    warn!(
                        task = %task.name,
                        agent = %agent,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %message,
                        "Task failed, retrying"
                    );
                    drop(type_permit);
                    drop(system_permit);
                    tokio::select! {
                        _ = cancel.cancelled() => {
                            if let Some(record) = records.write().await.get_mut(&task.id) {
                                record.fail("cancelled before retry");
                            }
                            return;
                        }
                        _ = tokio::time::sleep(delay) => {}
                    }
                    attempt += 1;
                    if let Some(record) = records.write().await.get_mut(&task.id) {
                        record.retry_count = attempt;
                    }
                }
            }
        }
    }

    /// Emit an escalation for an exhausted high-priority task.
    fn escalate(&self, task: &Task, agent: &AgentType, message: &str, retry_count: u32) {
        if !task.priority.escalates() {
            return;
        }
        let Some(sink) = &self.escalations else {
            return;
        };
        let escalation = Escalation {
            task_id: task.id,
            agent_type: agent.clone(),
            error: message.to_string(),
            retry_count,
            escalated_at: Utc::now(),
        };
        warn!(task = %task.name, priority = %task.priority, "Task escalated");
        // A dropped receiver is not the engine's problem.
        let _ = sink.send(escalation);
    }

    /// Recompute metrics from the current records and update the
    /// degraded flags. Shared by the monitor loop and the post-batch
    /// refresh so the pause decision never waits on a timer tick.
    #[allow(clippy::too_many_arguments)]
    async fn refresh_metrics(
        records: &ExecutionRecords,
        limits: &HashMap<AgentType, usize>,
        started: Instant,
        metrics: &Arc<RwLock<ExecutionMetrics>>,
        degraded: &AtomicBool,
        was_degraded: &AtomicBool,
        failure_threshold: f64,
    ) {
        let snapshot = records.read().await.clone();
        let updated = ExecutionMetrics::recompute(&snapshot, limits, started.elapsed());
        let over = updated.error_rate > failure_threshold;
        if over && !degraded.swap(true, Ordering::SeqCst) {
            was_degraded.store(true, Ordering::SeqCst);
            warn!(
                error_rate = updated.error_rate,
                failure_threshold, "Execution degraded"
            );
        } else if !over {
            degraded.store(false, Ordering::SeqCst);
        }
        *metrics.write().await = updated;
    }

    /// Periodic metrics refresh; raises and clears the degraded flag.
    #[allow(clippy::too_many_arguments)]
    async fn monitor_loop(
        records: ExecutionRecords,
        limits: HashMap<AgentType, usize>,
        started: Instant,
        metrics: Arc<RwLock<ExecutionMetrics>>,
        degraded: Arc<AtomicBool>,
        was_degraded: Arc<AtomicBool>,
        failure_threshold: f64,
        interval: Duration,
        cancel: CancellationToken,
    ) {
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = ticker.tick() => {
                    Self::refresh_metrics(
                        &records,
                        &limits,
                        started,
                        &metrics,
                        &degraded,
                        &was_degraded,
                        failure_threshold,
                    )
                    .await;
                }
            }
        }
    }

    async fn build_summary(
        &self,
        records: &ExecutionRecords,
        started: Instant,
        degraded: bool,
        cancelled: bool,
    ) -> ExecutionSummary {
        let guard = records.read().await;
        let elapsed = started.elapsed();
        let metrics = ExecutionMetrics::recompute(&guard, &self.limits, elapsed);
        let success_rate = if metrics.total_tasks > 0 {
            metrics.completed_tasks as f64 * 100.0 / metrics.total_tasks as f64
        } else {
            0.0
        };
        let total_execution_secs: f64 = guard
            .values()
            .filter_map(TaskExecution::execution_seconds)
            .sum();

        ExecutionSummary {
            total_tasks: metrics.total_tasks,
            completed_tasks: metrics.completed_tasks,
            failed_tasks: metrics.failed_tasks,
            blocked_tasks: metrics.blocked_tasks,
            success_rate,
            average_execution_secs: metrics.average_execution_secs,
            total_execution_secs,
            throughput_per_hour: metrics.throughput_per_hour,
            agent_utilization: metrics.utilization,
            per_task_results: guard
                .iter()
                .map(|(id, record)| (*id, TaskReport::from(record)))
                .collect(),
            degraded,
            cancelled,
        }
    }
}
