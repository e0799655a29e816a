//! End-to-end task-graph scenarios: how a goal's dependency graph
//! progresses through `graph::` operations alone, without the FSM.

use colony_core::contracts::DurableStore;
use colony_core::graph;
use colony_core::model::{PlanTask, TaskResult, TaskStatus};
use colony_store::MemoryStore;

fn plan_task(title: &str, deps: Vec<usize>) -> PlanTask {
    PlanTask {
        title: title.to_string(),
        description: format!("do {title}"),
        agent_role: "generalist".to_string(),
        dependencies: deps,
        estimated_cost_cents: 100,
        priority: 0,
        timeout_ms: 60_000,
    }
}

#[tokio::test]
async fn linear_chain_propagates_through_completion() {
    let store = MemoryStore::new();
    let goal = store.create_goal("ship it".into(), "".into()).await.unwrap();

    let tasks = graph::decompose_goal(
        store.as_ref(),
        goal.id,
        &[plan_task("A", vec![]), plan_task("B", vec![0]), plan_task("C", vec![1])],
    )
    .await
    .unwrap();
    let (a, b, c) = (tasks[0].id, tasks[1].id, tasks[2].id);

    assert_eq!(store.get_task_by_id(a).await.unwrap().unwrap().status, TaskStatus::Pending);
    assert_eq!(store.get_task_by_id(b).await.unwrap().unwrap().status, TaskStatus::Blocked);
    assert_eq!(store.get_task_by_id(c).await.unwrap().unwrap().status, TaskStatus::Blocked);

    graph::assign_task(store.as_ref(), a, "worker-a").await.unwrap();
    graph::complete_task(store.as_ref(), a, TaskResult::Success { output: serde_json::json!({}) }, None)
        .await
        .unwrap();
    assert_eq!(store.get_task_by_id(b).await.unwrap().unwrap().status, TaskStatus::Pending);
    assert_eq!(store.get_task_by_id(c).await.unwrap().unwrap().status, TaskStatus::Blocked);

    graph::assign_task(store.as_ref(), b, "worker-b").await.unwrap();
    graph::complete_task(store.as_ref(), b, TaskResult::Success { output: serde_json::json!({}) }, None)
        .await
        .unwrap();
    assert_eq!(store.get_task_by_id(c).await.unwrap().unwrap().status, TaskStatus::Pending);

    graph::assign_task(store.as_ref(), c, "worker-c").await.unwrap();
    graph::complete_task(store.as_ref(), c, TaskResult::Success { output: serde_json::json!({}) }, None)
        .await
        .unwrap();

    let goal = store.get_goal_by_id(goal.id).await.unwrap().unwrap();
    assert_eq!(goal.status, colony_core::model::GoalStatus::Completed);

    let progress = graph::get_goal_progress(store.as_ref(), goal.id).await.unwrap();
    assert_eq!(progress.total, 3);
    assert_eq!(progress.completed, 3);
    assert_eq!(progress.failed, 0);
    assert_eq!(progress.blocked, 0);
}

#[tokio::test]
async fn parallel_fan_out_assigns_all_three_independently() {
    let store = MemoryStore::new();
    let goal = store.create_goal("fan out".into(), "".into()).await.unwrap();

    let tasks = graph::decompose_goal(
        store.as_ref(),
        goal.id,
        &[plan_task("A", vec![]), plan_task("B", vec![]), plan_task("C", vec![])],
    )
    .await
    .unwrap();

    let ready = graph::get_ready_tasks(store.as_ref(), goal.id).await.unwrap();
    assert_eq!(ready.len(), 3);

    let workers = ["worker-1", "worker-2", "worker-3"];
    for (task, worker) in tasks.iter().zip(workers.iter()) {
        graph::assign_task(store.as_ref(), task.id, worker).await.unwrap();
    }

    let mut assigned_to: Vec<String> = Vec::new();
    for task in &tasks {
        let fetched = store.get_task_by_id(task.id).await.unwrap().unwrap();
        assert_eq!(fetched.status, TaskStatus::Assigned);
        assigned_to.push(fetched.assigned_to.unwrap());
    }
    assigned_to.sort();
    let mut expected: Vec<String> = workers.iter().map(|s| s.to_string()).collect();
    expected.sort();
    assert_eq!(assigned_to, expected);
}

#[tokio::test]
async fn tie_break_orders_by_priority_then_created_at_then_id() {
    let store = MemoryStore::new();
    let goal = store.create_goal("tie break".into(), "".into()).await.unwrap();

    let tasks = graph::decompose_goal(
        store.as_ref(),
        goal.id,
        &[plan_task("low", vec![]), plan_task("high", vec![]), plan_task("mid", vec![])],
    )
    .await
    .unwrap();

    // All three were created with equal (zero) priority and nearly
    // identical timestamps, so the ordering must fall back to id.
    let ready = graph::get_ready_tasks(store.as_ref(), goal.id).await.unwrap();
    assert_eq!(ready.len(), 3);
    let mut sorted_ids: Vec<_> = tasks.iter().map(|t| t.id).collect();
    sorted_ids.sort();
    let ready_ids: Vec<_> = ready.iter().map(|t| t.id).collect();
    assert_eq!(ready_ids, sorted_ids);
}

#[tokio::test]
async fn double_complete_is_rejected_and_does_not_double_credit_cost() {
    let store = MemoryStore::new();
    let goal = store.create_goal("double complete".into(), "".into()).await.unwrap();
    let tasks = graph::decompose_goal(store.as_ref(), goal.id, &[plan_task("A", vec![])]).await.unwrap();
    let task_id = tasks[0].id;

    graph::assign_task(store.as_ref(), task_id, "worker-a").await.unwrap();
    graph::complete_task(store.as_ref(), task_id, TaskResult::Success { output: serde_json::json!({}) }, Some(500))
        .await
        .unwrap();

    let err = graph::complete_task(
        store.as_ref(),
        task_id,
        TaskResult::Success { output: serde_json::json!({}) },
        Some(500),
    )
    .await
    .unwrap_err();
    assert!(err.to_string().contains("completed") || err.to_string().to_lowercase().contains("complete"));

    let task = store.get_task_by_id(task_id).await.unwrap().unwrap();
    assert_eq!(task.cost.actual_cost_cents, Some(500));
}

#[tokio::test]
async fn cancelling_a_replanned_failure_lets_the_goal_roll_up() {
    let store = MemoryStore::new();
    let goal = store.create_goal("replanned goal".into(), "".into()).await.unwrap();

    let original = graph::decompose_goal(store.as_ref(), goal.id, &[plan_task("A", vec![])]).await.unwrap();
    let failed_id = original[0].id;
    graph::assign_task(store.as_ref(), failed_id, "worker-a").await.unwrap();
    graph::fail_task(store.as_ref(), failed_id, "boom".into(), false).await.unwrap();
    assert_eq!(store.get_task_by_id(failed_id).await.unwrap().unwrap().status, TaskStatus::Failed);

    // A cancelled-but-unreplaced failure must never roll the goal up on
    // its own.
    graph::cancel_task(store.as_ref(), failed_id).await.unwrap();
    assert_eq!(store.get_task_by_id(failed_id).await.unwrap().unwrap().status, TaskStatus::Cancelled);
    assert!(store.get_goal_by_id(goal.id).await.unwrap().unwrap().status != colony_core::model::GoalStatus::Completed);

    let replacement = graph::decompose_goal(store.as_ref(), goal.id, &[plan_task("A retry", vec![])]).await.unwrap();
    graph::assign_task(store.as_ref(), replacement[0].id, "worker-b").await.unwrap();
    graph::complete_task(
        store.as_ref(),
        replacement[0].id,
        TaskResult::Success { output: serde_json::json!({}) },
        None,
    )
    .await
    .unwrap();

    let goal = store.get_goal_by_id(goal.id).await.unwrap().unwrap();
    assert_eq!(goal.status, colony_core::model::GoalStatus::Completed);

    // Cancelling an already-cancelled task is a no-op, not an error.
    graph::cancel_task(store.as_ref(), failed_id).await.unwrap();
}
