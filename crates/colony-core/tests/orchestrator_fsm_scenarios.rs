//! End-to-end orchestrator FSM scenarios: replanning and the replan
//! budget, driven through repeated `tick()` calls against an in-memory
//! store and the shared fakes from `colony-test-utils`.

use chrono::Utc;
use colony_core::contracts::DurableStore;
use colony_core::model::{OrchestratorState, Phase};
use colony_core::orchestrator::{Orchestrator, OrchestratorConfig, STATE_KEY};
use colony_test_utils::{test_child, Harness};

fn orchestrator(harness: &Harness, max_replans: i32) -> Orchestrator {
    Orchestrator::new(
        harness.store.clone(),
        harness.inference.clone(),
        harness.transport.clone(),
        harness.tracker.clone(),
        colony_core::messaging::HandlerRegistry::new(),
        OrchestratorConfig {
            max_replans,
            ..OrchestratorConfig::default()
        },
    )
}

async fn save_state(harness: &Harness, state: &OrchestratorState) {
    let raw = serde_json::to_string(state).unwrap();
    harness.store.set_kv(STATE_KEY, raw).await.unwrap();
}

async fn load_state(harness: &Harness) -> OrchestratorState {
    let raw = harness.store.get_kv(STATE_KEY).await.unwrap().unwrap();
    serde_json::from_str(&raw).unwrap()
}

fn task_result_envelope(task_id: uuid::Uuid, success: bool, transient: bool) -> String {
    let content = serde_json::json!({
        "success": success,
        "transient": transient,
        "error": if success { serde_json::Value::Null } else { serde_json::json!("worker reported failure") },
    })
    .to_string();

    let message = serde_json::json!({
        "id": uuid::Uuid::new_v4(),
        "type": "task_result",
        "from": "worker-a",
        "to": "orchestrator",
        "goal_id": serde_json::Value::Null,
        "task_id": task_id,
        "content": content,
        "priority": "normal",
        "requires_response": false,
        "expires_at": serde_json::Value::Null,
        "created_at": Utc::now(),
    });

    serde_json::json!({
        "protocol": "colony_message_v1",
        "sentAt": Utc::now(),
        "message": message,
    })
    .to_string()
}

const BYPASS_CLASSIFICATION: &str = r#"{"estimatedSteps":1,"reason":"trivial","stepOutline":["do it"]}"#;

fn cheap_replan_plan() -> String {
    serde_json::json!({
        "analysis": "retry with a different approach",
        "strategy": "simpler path",
        "tasks": [{
            "title": "retry",
            "description": "retry the goal",
            "agentRole": "generalist",
            "dependencies": [],
            "estimatedCostCents": 10,
            "priority": 0,
            "timeoutMs": 60_000,
        }],
        "estimatedTotalCostCents": 10,
        "estimatedTimeMinutes": 5,
    })
    .to_string()
}

/// Drives `idle -> classifying -> executing` and assigns the one bypass
/// task to a seeded worker, returning its id.
async fn run_to_first_assignment(harness: &Harness, orchestrator: &Orchestrator) -> uuid::Uuid {
    harness.tracker.seed(test_child("worker-a", "generalist", colony_core::model::ChildStatus::Idle)).await;
    harness.inference.push_json(BYPASS_CLASSIFICATION);

    orchestrator.tick().await.unwrap(); // idle -> classifying
    orchestrator.tick().await.unwrap(); // classifying -> executing (bypass)
    let summary = orchestrator.tick().await.unwrap(); // executing: dispatch
    assert_eq!(summary.tasks_assigned, 1);

    let state = load_state(harness).await;
    let goal_id = state.goal_id.unwrap();
    let tasks = harness.store.get_tasks_by_goal(goal_id).await.unwrap();
    tasks[0].id
}

#[tokio::test]
async fn replan_on_failure_increments_replan_count_and_reaches_plan_review() {
    let harness = Harness::new();
    let orchestrator = orchestrator(&harness, 3);
    harness.store.create_goal("flaky goal".into(), "".into()).await.unwrap();

    let task_id = run_to_first_assignment(&harness, &orchestrator).await;

    harness.store.insert_inbox_message(task_result_envelope(task_id, false, false)).await.unwrap();
    orchestrator.tick().await.unwrap(); // executing: processes failure -> replanning

    let state = load_state(&harness).await;
    assert_eq!(state.phase, Phase::Replanning);
    assert_eq!(state.replan_count, 0);

    harness.inference.push_json(cheap_replan_plan());
    orchestrator.tick().await.unwrap(); // replanning -> plan_review

    let state = load_state(&harness).await;
    assert_eq!(state.phase, Phase::PlanReview);
    assert_eq!(state.replan_count, 1);
}

#[tokio::test]
async fn exhausted_replan_budget_fails_the_goal() {
    let harness = Harness::new();
    let orchestrator = orchestrator(&harness, 3);
    harness.store.create_goal("doomed goal".into(), "".into()).await.unwrap();

    let task_id = run_to_first_assignment(&harness, &orchestrator).await;

    // Pre-exhaust the replan budget before the failure is processed.
    let mut state = load_state(&harness).await;
    state.replan_count = 3;
    save_state(&harness, &state).await;

    harness.store.insert_inbox_message(task_result_envelope(task_id, false, false)).await.unwrap();
    orchestrator.tick().await.unwrap(); // executing: processes failure -> failed

    let state = load_state(&harness).await;
    assert_eq!(state.phase, Phase::Failed);

    orchestrator.tick().await.unwrap(); // failed: write goal status, reset state

    let goal_id = state.goal_id.unwrap();
    let goal = harness.store.get_goal_by_id(goal_id).await.unwrap().unwrap();
    assert_eq!(goal.status, colony_core::model::GoalStatus::Failed);

    let state = load_state(&harness).await;
    assert_eq!(state.phase, Phase::Idle);
}

fn fan_out_plan() -> String {
    serde_json::json!({
        "analysis": "three independent chunks",
        "strategy": "split and parallelize",
        "tasks": [
            {"title": "A", "description": "do A", "agentRole": "generalist", "dependencies": [], "estimatedCostCents": 10, "priority": 0, "timeoutMs": 60_000},
            {"title": "B", "description": "do B", "agentRole": "generalist", "dependencies": [], "estimatedCostCents": 10, "priority": 0, "timeoutMs": 60_000},
            {"title": "C", "description": "do C", "agentRole": "generalist", "dependencies": [], "estimatedCostCents": 10, "priority": 0, "timeoutMs": 60_000},
        ],
        "estimatedTotalCostCents": 30,
        "estimatedTimeMinutes": 15,
    })
    .to_string()
}

#[tokio::test]
async fn parallel_fan_out_assigns_three_distinct_workers_in_one_tick() {
    let harness = Harness::new();
    let orchestrator = orchestrator(&harness, 3);
    harness.store.create_goal("fan out via FSM".into(), "".into()).await.unwrap();

    for address in ["worker-1", "worker-2", "worker-3"] {
        harness.tracker.seed(test_child(address, "generalist", colony_core::model::ChildStatus::Idle)).await;
    }
    harness.inference.push_json(r#"{"estimatedSteps":5,"reason":"multi-step","stepOutline":["A","B","C"]}"#);
    harness.inference.push_json(fan_out_plan());

    orchestrator.tick().await.unwrap(); // idle -> classifying
    orchestrator.tick().await.unwrap(); // classifying -> planning
    orchestrator.tick().await.unwrap(); // planning -> plan_review
    orchestrator.tick().await.unwrap(); // plan_review -> executing (auto-approved, well under budget)
    let summary = orchestrator.tick().await.unwrap(); // executing: dispatch all three

    assert_eq!(summary.tasks_assigned, 3);

    let children = harness.tracker.all().await;
    let assigned_to: std::collections::HashSet<String> = children
        .iter()
        .filter(|c| c.status == colony_core::model::ChildStatus::Busy)
        .map(|c| c.address.clone())
        .collect();
    assert_eq!(assigned_to.len(), 3, "each ready task must land on a distinct worker, not pile onto one");
}

#[tokio::test]
async fn replan_reaches_completion_after_the_old_failure_is_cancelled() {
    let harness = Harness::new();
    let orchestrator = orchestrator(&harness, 3);
    harness.store.create_goal("recoverable goal".into(), "".into()).await.unwrap();

    let task_id = run_to_first_assignment(&harness, &orchestrator).await;

    harness.store.insert_inbox_message(task_result_envelope(task_id, false, false)).await.unwrap();
    orchestrator.tick().await.unwrap(); // executing: processes failure -> replanning

    harness.inference.push_json(cheap_replan_plan());
    orchestrator.tick().await.unwrap(); // replanning -> plan_review: cancels the old failure

    let state = load_state(&harness).await;
    let goal_id = state.goal_id.unwrap();
    let old_task = harness.store.get_task_by_id(task_id).await.unwrap().unwrap();
    assert_eq!(old_task.status, colony_core::model::TaskStatus::Cancelled);

    // The tracker, not the orchestrator, reports a worker idle again once
    // it's done with a task; simulate that heartbeat here.
    harness.tracker.update_status("worker-a", colony_core::model::ChildStatus::Idle).await.unwrap();

    orchestrator.tick().await.unwrap(); // plan_review -> executing (auto-approved)
    let summary = orchestrator.tick().await.unwrap(); // executing: dispatch the replan's one task
    assert_eq!(summary.tasks_assigned, 1);

    let tasks = harness.store.get_tasks_by_goal(goal_id).await.unwrap();
    let retry_task = tasks.iter().find(|t| t.id != task_id).unwrap();
    harness
        .store
        .insert_inbox_message(task_result_envelope(retry_task.id, true, false))
        .await
        .unwrap();
    orchestrator.tick().await.unwrap(); // executing: processes success -> complete
    orchestrator.tick().await.unwrap(); // complete: write goal status, reset state

    let goal = harness.store.get_goal_by_id(goal_id).await.unwrap().unwrap();
    assert_eq!(goal.status, colony_core::model::GoalStatus::Completed);
}

#[tokio::test]
async fn process_inbox_is_idempotent_on_an_empty_second_call() {
    let harness = Harness::new();
    let registry = colony_core::messaging::HandlerRegistry::new();

    let first = colony_core::messaging::process_inbox(harness.store.as_ref(), &registry).await.unwrap();
    assert!(first.is_empty());
    let second = colony_core::messaging::process_inbox(harness.store.as_ref(), &registry).await.unwrap();
    assert!(second.is_empty());
}
