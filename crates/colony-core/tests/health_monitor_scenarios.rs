//! End-to-end health-monitor scenario: a worker goes stuck on a running
//! task past its timeout, and `auto_heal` either reassigns the task to a
//! replacement worker or cancels it once the retry budget is exhausted.

use std::sync::Arc;

use chrono::{Duration, Utc};
use colony_core::contracts::DurableStore;
use colony_core::graph;
use colony_core::health::{HealActionKind, HealthMonitor, HealthMonitorConfig};
use colony_core::model::{ChildStatus, PlanTask, TaskStatus};
use colony_test_utils::{test_child, Harness};

fn long_task() -> PlanTask {
    PlanTask {
        title: "long running".to_string(),
        description: "grind away".to_string(),
        agent_role: "generalist".to_string(),
        dependencies: vec![],
        estimated_cost_cents: 100,
        priority: 0,
        timeout_ms: 60_000,
    }
}

fn monitor(harness: &Harness) -> HealthMonitor {
    HealthMonitor::new(
        harness.store.clone(),
        harness.transport.clone(),
        harness.tracker.clone(),
        harness.funding.clone(),
        HealthMonitorConfig::default(),
    )
}

/// Seeds a worker whose task is stuck past `timeout_ms + timeout_grace`,
/// keeping `last_checked` fresh so only the timeout signal (not the
/// inactivity one) trips `stuck_on_task`, and the funding balance healthy
/// so `out_of_credits` never fires alongside it.
async fn seed_stuck_worker(harness: &Harness, address: &str) -> uuid::Uuid {
    let child = test_child(address, "generalist", ChildStatus::Busy);
    harness.store.update_child(child.clone()).await.unwrap();
    harness.funding.set_balance(address, 1000).await;

    let goal = harness.store.create_goal("long haul".into(), "".into()).await.unwrap();
    let tasks = graph::decompose_goal(harness.store.as_ref(), goal.id, &[long_task()]).await.unwrap();
    let task_id = tasks[0].id;

    graph::assign_task(harness.store.as_ref(), task_id, address).await.unwrap();
    graph::mark_running(harness.store.as_ref(), task_id).await.unwrap();

    let started_at = Utc::now() - Duration::minutes(30);
    harness
        .store
        .update_task_status(task_id, TaskStatus::Running, Some(address.to_string()), Some(started_at))
        .await
        .unwrap();

    task_id
}

#[tokio::test]
async fn stuck_task_is_reassigned_to_an_idle_replacement() {
    let harness = Harness::new();
    let task_id = seed_stuck_worker(&harness, "worker-stuck").await;
    harness.tracker.seed(test_child("worker-idle", "generalist", ChildStatus::Idle)).await;

    let issues = monitor(&harness).check().await.unwrap();
    assert!(issues.get("worker-stuck").unwrap().contains(&colony_core::health::HealthIssue::StuckOnTask));

    let actions = monitor(&harness).auto_heal().await.unwrap();
    assert_eq!(actions.len(), 1);
    let action = &actions[0];
    assert_eq!(action.kind, HealActionKind::Reassign);
    assert_eq!(action.agent_address, "worker-stuck");
    assert!(action.success);

    let task = harness.store.get_task_by_id(task_id).await.unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Assigned);
    assert_eq!(task.assigned_to.as_deref(), Some("worker-idle"));
    assert!(task.result.is_none());
    assert_eq!(task.retry.retry_count, 1);
}

#[tokio::test]
async fn stuck_task_past_its_retry_budget_is_cancelled_instead_of_reassigned() {
    let harness = Harness::new();
    let task_id = seed_stuck_worker(&harness, "worker-stuck").await;
    harness.tracker.seed(test_child("worker-idle", "generalist", ChildStatus::Idle)).await;

    let mut task = harness.store.get_task_by_id(task_id).await.unwrap().unwrap();
    task.retry.retry_count = task.retry.max_retries;
    harness.store.update_task_retry(task_id, task.retry).await.unwrap();

    let actions = monitor(&harness).auto_heal().await.unwrap();
    assert_eq!(actions.len(), 1);
    assert_eq!(actions[0].kind, HealActionKind::Reassign);
    assert!(actions[0].success);

    let task = harness.store.get_task_by_id(task_id).await.unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Failed);
    assert!(matches!(
        task.result,
        Some(colony_core::model::TaskResult::Failure {
            kind: colony_core::model::FailureKind::StuckTaskCancelled,
            ..
        })
    ));
}

#[tokio::test]
async fn healthy_worker_has_no_issues_and_needs_no_action() {
    let harness = Harness::new();
    let child = test_child("worker-fine", "generalist", ChildStatus::Idle);
    harness.store.update_child(child).await.unwrap();
    harness.funding.set_balance("worker-fine", 1000).await;

    let issues = monitor(&harness).check().await.unwrap();
    assert!(issues.is_empty());

    let actions = monitor(&harness).auto_heal().await.unwrap();
    assert!(actions.is_empty());
}
