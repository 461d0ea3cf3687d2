//! Retry, escalation, blocking and cancellation tests.
//!
//! These tests verify the engine's failure handling: exponential
//! backoff retries, escalation of exhausted high-priority tasks,
//! blocked propagation to dependents and cooperative cancellation.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use conductor::orchestration::{ExecutionState, TaskReport};
use conductor::{ParallelExecutionEngine, Planner, Priority, TaskSpec, TaskType};

use crate::fixtures::{
    fast_config, full_registry, independent_specs, standard_capabilities, FlakyExecutor,
    RecordingExecutor, SelectiveFailExecutor,
};

/// Test: Transient failures are retried to success
/// Given an executor that fails twice then recovers
/// When a single task runs with max_retries 2
/// Then the task completes after exactly three attempts
#[tokio::test]
async fn test_transient_failure_recovers() {
    let capabilities = standard_capabilities();
    let plan = Planner::new("coder")
        .plan(independent_specs(1), capabilities.clone())
        .unwrap();
    let executor = FlakyExecutor::new(2);
    let engine = ParallelExecutionEngine::new(
        fast_config(),
        full_registry(executor.clone()),
        &capabilities,
    );

    let summary = engine.execute(&plan).await.unwrap();

    assert_eq!(summary.completed_tasks, 1);
    assert_eq!(summary.failed_tasks, 0);
    assert_eq!(executor.call_count(), 3);
    let report = summary.per_task_results.values().next().unwrap();
    assert_eq!(report.retry_count, 2);
}

/// Test: Exhausted critical tasks escalate exactly once
/// Given one critical and one low-priority task that always fail
/// When retries are exhausted
/// Then exactly one escalation arrives, for the critical task
#[tokio::test]
async fn test_critical_exhaustion_escalates() {
    let capabilities = standard_capabilities();
    let specs = vec![
        TaskSpec::new("critical-fix", TaskType::CodeGeneration)
            .with_minutes(10)
            .with_priority(Priority::Critical),
        TaskSpec::new("nice-to-have", TaskType::CodeGeneration)
            .with_minutes(10)
            .with_priority(Priority::Low),
    ];
    let plan = Planner::new("coder")
        .plan(specs, capabilities.clone())
        .unwrap();
    let executor = SelectiveFailExecutor::new(&["critical-fix", "nice-to-have"]);
    let (sink, mut escalations) = mpsc::unbounded_channel();
    let engine = ParallelExecutionEngine::new(
        fast_config(),
        full_registry(executor),
        &capabilities,
    )
    .with_escalations(sink);

    let summary = engine.execute(&plan).await.unwrap();

    assert_eq!(summary.failed_tasks, 2);
    let escalation = escalations.try_recv().unwrap();
    assert_eq!(escalation.retry_count, 2);
    assert!(escalation.error.contains("critical-fix"));
    assert!(escalations.try_recv().is_err(), "low priority must not escalate");
}

/// Test: Failure blocks the whole downstream chain
/// Given a failing task with direct and transitive dependents
/// When the engine executes
/// Then dependents are Blocked with a reason naming the failed link
#[tokio::test]
async fn test_failure_blocks_downstream() {
    let capabilities = standard_capabilities();
    let specs = vec![
        TaskSpec::new("base", TaskType::CodeGeneration).with_minutes(10),
        TaskSpec::new("middle", TaskType::CodeGeneration)
            .with_minutes(10)
            .with_dependencies(&["base"]),
        TaskSpec::new("top", TaskType::CodeGeneration)
            .with_minutes(10)
            .with_dependencies(&["middle"]),
        TaskSpec::new("unrelated", TaskType::CodeGeneration).with_minutes(10),
    ];
    let plan = Planner::new("coder")
        .plan(specs, capabilities.clone())
        .unwrap();
    let engine = ParallelExecutionEngine::new(
        fast_config(),
        full_registry(SelectiveFailExecutor::new(&["base"])),
        &capabilities,
    );

    let summary = engine.execute(&plan).await.unwrap();

    assert_eq!(summary.failed_tasks, 1);
    assert_eq!(summary.blocked_tasks, 2);
    assert_eq!(summary.completed_tasks, 1);

    let by_name: HashMap<&str, &TaskReport> = plan
        .tasks
        .iter()
        .map(|t| (t.name.as_str(), &summary.per_task_results[&t.id]))
        .collect();
    assert!(matches!(by_name["base"].status, ExecutionState::Failed { .. }));
    assert!(matches!(by_name["middle"].status, ExecutionState::Blocked { .. }));
    assert!(matches!(by_name["top"].status, ExecutionState::Blocked { .. }));
    assert_eq!(by_name["unrelated"].status, ExecutionState::Completed);
    assert!(by_name["middle"].error.as_deref().unwrap().contains("'base'"));
    assert!(by_name["top"].error.as_deref().unwrap().contains("'middle'"));
}

/// Test: A failing run is reported as degraded
/// Given every task permanently failing
/// When the monitor observes the error rate
/// Then the summary carries the degraded flag
#[tokio::test]
async fn test_degraded_flag_raised() {
    let capabilities = standard_capabilities();
    // Two batches so the monitor can observe failures between them.
    let mut specs = independent_specs(4);
    specs.push(
        TaskSpec::new("after", TaskType::CodeGeneration)
            .with_minutes(10)
            .with_dependencies(&["task-0"]),
    );
    let plan = Planner::new("coder")
        .plan(specs, capabilities.clone())
        .unwrap();
    let failing =
        SelectiveFailExecutor::new(&["task-0", "task-1", "task-2", "task-3", "after"]);
    let engine = ParallelExecutionEngine::new(
        fast_config(),
        full_registry(failing),
        &capabilities,
    );

    let summary = engine.execute(&plan).await.unwrap();

    assert_eq!(summary.completed_tasks, 0);
    assert!(summary.degraded);
}

/// Test: The degraded pause delays dispatch and clears on recovery
/// Given a first batch whose failure pushes the error rate over threshold
/// When the following batch succeeds and brings the rate back under it
/// Then that batch waits out the cooldown and the final batch starts promptly
#[tokio::test]
async fn test_degraded_pause_delays_then_clears() {
    let capabilities = standard_capabilities();
    let specs = vec![
        TaskSpec::new("seed-fail", TaskType::CodeGeneration).with_minutes(10),
        TaskSpec::new("seed-ok", TaskType::CodeGeneration).with_minutes(10),
        TaskSpec::new("mid-0", TaskType::CodeGeneration)
            .with_minutes(10)
            .with_dependencies(&["seed-ok"]),
        TaskSpec::new("mid-1", TaskType::CodeGeneration)
            .with_minutes(10)
            .with_dependencies(&["seed-ok"]),
        TaskSpec::new("mid-2", TaskType::CodeGeneration)
            .with_minutes(10)
            .with_dependencies(&["seed-ok"]),
        TaskSpec::new("mid-3", TaskType::CodeGeneration)
            .with_minutes(10)
            .with_dependencies(&["seed-ok"]),
        TaskSpec::new("tail", TaskType::CodeGeneration)
            .with_minutes(10)
            .with_dependencies(&["mid-0"]),
    ];
    let plan = Planner::new("coder")
        .plan(specs, capabilities.clone())
        .unwrap();
    let executor = SelectiveFailExecutor::new(&["seed-fail"]);
    let mut config = fast_config();
    config.max_retries = 0;
    config.monitor_interval = Duration::from_millis(10);
    config.pause_cooldown = Duration::from_millis(200);
    let engine =
        ParallelExecutionEngine::new(config, full_registry(executor.clone()), &capabilities);

    let summary = engine.execute(&plan).await.unwrap();

    // One failure among two finished tasks is a 0.5 error rate, above
    // the 0.3 threshold. Four more successes bring it down to 1/6.
    assert_eq!(summary.failed_tasks, 1);
    assert_eq!(summary.completed_tasks, 6);
    assert!(summary.degraded, "a transient pause must still be reported");

    let batch_one = executor.started_at("seed-ok").await;
    let batch_two = executor.started_at("mid-0").await;
    let batch_three = executor.started_at("tail").await;
    assert!(
        batch_two - batch_one >= Duration::from_millis(150),
        "second batch dispatched without waiting out the cooldown"
    );
    assert!(
        batch_three - batch_two < Duration::from_millis(100),
        "third batch paused even though the error rate had recovered"
    );
}

/// Test: Cancellation stops new batches and drains in-flight work
/// Given a sequential chain and a token cancelled mid-run
/// When the engine executes with that token
/// Then the summary is partial and flagged cancelled
#[tokio::test]
async fn test_cancellation_returns_partial_summary() {
    let capabilities = standard_capabilities();
    let specs = vec![
        TaskSpec::new("one", TaskType::CodeGeneration).with_minutes(10),
        TaskSpec::new("two", TaskType::CodeGeneration)
            .with_minutes(10)
            .with_dependencies(&["one"]),
        TaskSpec::new("three", TaskType::CodeGeneration)
            .with_minutes(10)
            .with_dependencies(&["two"]),
    ];
    let plan = Planner::new("coder")
        .plan(specs, capabilities.clone())
        .unwrap();
    let executor = RecordingExecutor::new(Duration::from_millis(20));
    let engine = ParallelExecutionEngine::new(
        fast_config(),
        full_registry(executor),
        &capabilities,
    );

    let cancel = CancellationToken::new();
    let canceller = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(30)).await;
        canceller.cancel();
    });

    let summary = engine
        .execute_with_cancellation(&plan, cancel)
        .await
        .unwrap();

    assert!(summary.cancelled);
    assert!(summary.completed_tasks >= 1, "in-flight work must drain");
    assert!(summary.completed_tasks < 3);
    assert_eq!(summary.per_task_results.len(), 3);
}
