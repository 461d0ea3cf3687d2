//! Concurrency bounds and batch ordering tests.
//!
//! These tests verify that the engine runs batches strictly in order
//! and never exceeds the system-wide or per-type concurrency limits.

use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use conductor::orchestration::ExecutionState;
use conductor::{
    AgentCapability, ParallelExecutionEngine, Planner, TaskSpec, TaskType,
};

use crate::fixtures::{
    fast_config, full_registry, independent_specs, standard_capabilities, web_project_specs,
    EchoExecutor, RecordingExecutor,
};

/// Test: End-to-end run of a realistic project
/// Given the web project plan and echo executors
/// When the engine executes
/// Then every task completes and the summary totals add up
#[tokio::test]
async fn test_web_project_executes_completely() {
    let capabilities = standard_capabilities();
    let plan = Planner::new("coder")
        .plan(web_project_specs(), capabilities.clone())
        .unwrap();
    let engine = ParallelExecutionEngine::new(
        fast_config(),
        full_registry(Arc::new(EchoExecutor)),
        &capabilities,
    );

    let summary = engine.execute(&plan).await.unwrap();

    assert_eq!(summary.total_tasks, 8);
    assert_eq!(summary.completed_tasks, 8);
    assert_eq!(summary.failed_tasks, 0);
    assert_eq!(summary.blocked_tasks, 0);
    assert!((summary.success_rate - 100.0).abs() < f64::EPSILON);
    assert!(!summary.degraded);
    assert!(!summary.cancelled);
    assert_eq!(summary.per_task_results.len(), 8);
    for report in summary.per_task_results.values() {
        assert_eq!(report.status, ExecutionState::Completed);
    }
}

/// Test: Batches run strictly in order
/// Given a three-stage dependency chain with two tasks per stage
/// When the engine executes
/// Then no task starts before every task of the previous stage started
#[tokio::test]
async fn test_batches_run_in_order() {
    let capabilities = vec![AgentCapability::new(
        "coder",
        &["rust"],
        &[TaskType::CodeGeneration],
        4,
        0.9,
    )];
    let specs = vec![
        TaskSpec::new("s1-a", TaskType::CodeGeneration).with_minutes(10),
        TaskSpec::new("s1-b", TaskType::CodeGeneration).with_minutes(10),
        TaskSpec::new("s2-a", TaskType::CodeGeneration)
            .with_minutes(10)
            .with_dependencies(&["s1-a", "s1-b"]),
        TaskSpec::new("s2-b", TaskType::CodeGeneration)
            .with_minutes(10)
            .with_dependencies(&["s1-a"]),
        TaskSpec::new("s3-a", TaskType::CodeGeneration)
            .with_minutes(10)
            .with_dependencies(&["s2-a", "s2-b"]),
    ];
    let plan = Planner::new("coder")
        .plan(specs, capabilities.clone())
        .unwrap();
    let executor = RecordingExecutor::new(Duration::from_millis(2));
    let engine = ParallelExecutionEngine::new(
        fast_config(),
        full_registry(executor.clone()),
        &capabilities,
    );

    engine.execute(&plan).await.unwrap();

    let order = executor.start_order().await;
    let position: HashMap<&str, usize> = order
        .iter()
        .enumerate()
        .map(|(i, name)| (name.as_str(), i))
        .collect();
    let stage = |name: &str| -> usize {
        match &name[..2] {
            "s1" => 1,
            "s2" => 2,
            _ => 3,
        }
    };
    for earlier in &order {
        for later in &order {
            if position[earlier.as_str()] < position[later.as_str()] {
                assert!(
                    stage(earlier) <= stage(later),
                    "'{}' started before '{}' despite a later stage",
                    earlier,
                    later
                );
            }
        }
    }
}

/// Test: Per-type concurrency bound holds under load
/// Given 12 independent tasks and a type limit of 2
/// When the engine executes
/// Then at most 2 tasks ever run at once
#[tokio::test]
async fn test_per_type_limit_holds() {
    let capabilities = vec![AgentCapability::new(
        "coder",
        &["rust"],
        &[TaskType::CodeGeneration],
        2,
        0.9,
    )];
    let plan = Planner::new("coder")
        .plan(independent_specs(12), capabilities.clone())
        .unwrap();
    let executor = RecordingExecutor::new(Duration::from_millis(5));
    let engine = ParallelExecutionEngine::new(
        fast_config(),
        full_registry(executor.clone()),
        &capabilities,
    );

    let summary = engine.execute(&plan).await.unwrap();

    assert_eq!(summary.completed_tasks, 12);
    assert!(executor.peak.load(Ordering::SeqCst) <= 2);
}

/// Test: System-wide concurrency bound holds across types
/// Given generous per-type limits but a system limit of 3
/// When the engine executes
/// Then at most 3 tasks ever run at once
#[tokio::test]
async fn test_system_limit_holds() {
    let capabilities = vec![AgentCapability::new(
        "coder",
        &["rust"],
        &[TaskType::CodeGeneration],
        16,
        0.9,
    )];
    let plan = Planner::new("coder")
        .plan(independent_specs(10), capabilities.clone())
        .unwrap();
    let executor = RecordingExecutor::new(Duration::from_millis(5));
    let mut config = fast_config();
    config.max_concurrent_agents = 3;
    let engine =
        ParallelExecutionEngine::new(config, full_registry(executor.clone()), &capabilities);

    engine.execute(&plan).await.unwrap();

    assert!(executor.peak.load(Ordering::SeqCst) <= 3);
}

/// Test: Utilization is reported per type and stays in range
/// Given a completed run
/// When the summary is built
/// Then every utilization value is between 0 and 1
#[tokio::test]
async fn test_utilization_in_range() {
    let capabilities = standard_capabilities();
    let plan = Planner::new("coder")
        .plan(web_project_specs(), capabilities.clone())
        .unwrap();
    let engine = ParallelExecutionEngine::new(
        fast_config(),
        full_registry(Arc::new(EchoExecutor)),
        &capabilities,
    );

    let summary = engine.execute(&plan).await.unwrap();

    assert!(!summary.agent_utilization.is_empty());
    for fraction in summary.agent_utilization.values() {
        assert!(*fraction >= 0.0 && *fraction <= 1.0);
    }
    assert!(summary.total_execution_secs >= 0.0);
    assert!(summary.throughput_per_hour > 0.0);
}
