//! Task graph: authoritative model of task structure and progression for
//! one goal. Every operation here takes `&dyn DurableStore` so the same
//! logic runs unmodified against any backing store.

use std::collections::{HashSet, VecDeque};

use chrono::Utc;
use uuid::Uuid;

use crate::contracts::DurableStore;
use crate::error::BusinessRuleViolation;
use crate::model::{
    CostAccounting, FailureKind, Goal, GoalProgress, GoalStatus, PlanTask, RetryMeta, Task,
    TaskResult, TaskStatus,
};

/// Retry budget assigned to every task decomposed from a plan. `PlanTask`
/// carries a per-task timeout but not a per-task retry budget, so the
/// graph applies one uniform default; see DESIGN.md.
pub const DEFAULT_MAX_RETRIES: i32 = 3;

/// Failures specific to task-graph operations.
#[derive(Debug, thiserror::Error)]
pub enum TaskGraphError {
    #[error("task {task_id} not found")]
    NotFound { task_id: Uuid },

    #[error("task[{task_index}] depends on unknown task index {dependency_index}")]
    UnknownDependency {
        task_index: usize,
        dependency_index: usize,
    },

    #[error("dependency graph contains a cycle")]
    DependencyCycle,

    #[error(transparent)]
    InvalidTransition(#[from] BusinessRuleViolation),

    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

type Result<T> = std::result::Result<T, TaskGraphError>;

pub async fn create_goal(
    store: &dyn DurableStore,
    title: String,
    description: String,
) -> anyhow::Result<Goal> {
    store.create_goal(title, description).await
}

/// Inserts `plan_tasks` as a goal's task graph. Dependency indices are
/// resolved to freshly minted task ids; a task starts `blocked` if it has
/// any dependency, else `pending`. The dependency graph is re-checked for
/// cycles here as a defensive measure independent of the planner
/// validator, since this is the point `spec.md` names as where acyclicity
/// is "enforced at insertion".
pub async fn decompose_goal(
    store: &dyn DurableStore,
    goal_id: Uuid,
    plan_tasks: &[PlanTask],
) -> Result<Vec<Task>> {
    check_acyclic(plan_tasks)?;

    let ids: Vec<Uuid> = (0..plan_tasks.len()).map(|_| Uuid::new_v4()).collect();
    let now = Utc::now();
    let mut tasks = Vec::with_capacity(plan_tasks.len());

    for (index, plan_task) in plan_tasks.iter().enumerate() {
        let mut dependencies = Vec::with_capacity(plan_task.dependencies.len());
        for &dep_index in &plan_task.dependencies {
            let dep_id = ids.get(dep_index).copied().ok_or(TaskGraphError::UnknownDependency {
                task_index: index,
                dependency_index: dep_index,
            })?;
            dependencies.push(dep_id);
        }

        let status = if dependencies.is_empty() {
            TaskStatus::Pending
        } else {
            TaskStatus::Blocked
        };

        let task = Task {
            id: ids[index],
            goal_id,
            parent_id: None,
            title: plan_task.title.clone(),
            description: plan_task.description.clone(),
            agent_role: plan_task.agent_role.clone(),
            priority: plan_task.priority,
            dependencies,
            status,
            assigned_to: None,
            result: None,
            retry: RetryMeta {
                retry_count: 0,
                max_retries: DEFAULT_MAX_RETRIES,
                timeout_ms: plan_task.timeout_ms,
            },
            cost: CostAccounting {
                estimated_cost_cents: plan_task.estimated_cost_cents,
                actual_cost_cents: None,
            },
            created_at: now,
            started_at: None,
            completed_at: None,
        };

        store.insert_task(task.clone()).await?;
        tasks.push(task);
    }

    Ok(tasks)
}

/// `pending ⇒ assigned`. Fails if the task is not currently `pending`.
pub async fn assign_task(store: &dyn DurableStore, task_id: Uuid, worker_address: &str) -> Result<Task> {
    let mut task = fetch(store, task_id).await?;
    if task.status != TaskStatus::Pending {
        return Err(BusinessRuleViolation::AssignNonPending {
            task_id,
            actual: task.status,
        }
        .into());
    }

    let now = Utc::now();
    task.status = TaskStatus::Assigned;
    task.assigned_to = Some(worker_address.to_owned());
    task.started_at = Some(now);

    store
        .update_task_status(task_id, TaskStatus::Assigned, task.assigned_to.clone(), task.started_at)
        .await?;

    Ok(task)
}

/// `assigned ⇒ running`.
pub async fn mark_running(store: &dyn DurableStore, task_id: Uuid) -> Result<Task> {
    let mut task = fetch(store, task_id).await?;
    if task.status != TaskStatus::Assigned {
        return Err(BusinessRuleViolation::InvalidTransition {
            task_id,
            from: task.status,
            to: TaskStatus::Running,
        }
        .into());
    }

    task.status = TaskStatus::Running;
    store
        .update_task_status(task_id, TaskStatus::Running, task.assigned_to.clone(), task.started_at)
        .await?;

    Ok(task)
}

/// `{assigned, running} ⇒ completed`, given a successful result. Then
/// unblocks direct dependents and rolls the goal up if every task is now
/// `completed`. `actual_cost_cents`, when known (e.g. reported by the
/// worker alongside its result), is recorded; otherwise the task's
/// estimate is used.
pub async fn complete_task(
    store: &dyn DurableStore,
    task_id: Uuid,
    result: TaskResult,
    actual_cost_cents: Option<i64>,
) -> Result<Task> {
    let mut task = fetch(store, task_id).await?;

    if task.status == TaskStatus::Completed {
        return Err(BusinessRuleViolation::DoubleComplete { task_id }.into());
    }
    if !matches!(task.status, TaskStatus::Assigned | TaskStatus::Running) {
        return Err(BusinessRuleViolation::CompleteUnassigned {
            task_id,
            actual: task.status,
        }
        .into());
    }
    if !result.success() {
        return Err(BusinessRuleViolation::CompleteUnassigned {
            task_id,
            actual: task.status,
        }
        .into());
    }

    let now = Utc::now();
    let actual_cost = actual_cost_cents.unwrap_or(task.cost.estimated_cost_cents);

    task.status = TaskStatus::Completed;
    task.result = Some(result);
    task.completed_at = Some(now);
    task.cost.actual_cost_cents = Some(actual_cost);

    store
        .update_task_result(task_id, task.result.clone(), task.completed_at, Some(actual_cost))
        .await?;
    store
        .update_task_status(task_id, TaskStatus::Completed, task.assigned_to.clone(), task.started_at)
        .await?;

    unblock_dependents(store, task.goal_id, task_id).await?;
    rollup_goal(store, task.goal_id).await?;

    Ok(task)
}

/// `{assigned, running} ⇒ {pending (retry), failed}`. Dependents of a
/// permanently failed task are left `blocked` forever; they are never
/// cascaded to `failed`.
pub async fn fail_task(
    store: &dyn DurableStore,
    task_id: Uuid,
    error: String,
    transient: bool,
) -> Result<Task> {
    let mut task = fetch(store, task_id).await?;
    if !matches!(task.status, TaskStatus::Assigned | TaskStatus::Running) {
        return Err(BusinessRuleViolation::FailUnassigned {
            task_id,
            actual: task.status,
        }
        .into());
    }

    if transient && task.retry.eligible_for_retry() {
        task.retry.retry_count += 1;
        task.status = TaskStatus::Pending;
        task.assigned_to = None;
        task.started_at = None;

        store.update_task_retry(task_id, task.retry).await?;
        store
            .update_task_status(task_id, TaskStatus::Pending, None, None)
            .await?;
    } else {
        task.status = TaskStatus::Failed;
        task.result = Some(TaskResult::Failure {
            kind: FailureKind::WorkerReported,
            error,
        });
        task.completed_at = Some(Utc::now());

        store
            .update_task_result(task_id, task.result.clone(), task.completed_at, None)
            .await?;
        store
            .update_task_status(task_id, TaskStatus::Failed, task.assigned_to.clone(), task.started_at)
            .await?;
    }

    Ok(task)
}

/// Supersede a `failed` task that a replan has just replaced, so it stops
/// re-triggering `phase_executing`'s replanning gate and stops blocking
/// `rollup_goal`. Idempotent: cancelling an already-`cancelled` task is a
/// no-op rather than an error, since a retried replan could observe it twice.
pub async fn cancel_task(store: &dyn DurableStore, task_id: Uuid) -> Result<Task> {
    let mut task = fetch(store, task_id).await?;
    if task.status == TaskStatus::Cancelled {
        return Ok(task);
    }
    if task.status != TaskStatus::Failed {
        return Err(BusinessRuleViolation::InvalidTransition {
            task_id,
            from: task.status,
            to: TaskStatus::Cancelled,
        }
        .into());
    }

    task.status = TaskStatus::Cancelled;
    store
        .update_task_status(task_id, TaskStatus::Cancelled, task.assigned_to.clone(), task.started_at)
        .await?;

    Ok(task)
}

/// All `pending` tasks for a goal, ordered `(priority desc, created_at
/// asc, id asc)` — the last tiebreak exists purely so ordering is
/// deterministic under equal priority and timestamp in tests.
pub async fn get_ready_tasks(store: &dyn DurableStore, goal_id: Uuid) -> anyhow::Result<Vec<Task>> {
    let mut tasks: Vec<Task> = store
        .get_tasks_by_goal(goal_id)
        .await?
        .into_iter()
        .filter(|t| t.status == TaskStatus::Pending)
        .collect();

    tasks.sort_by(|a, b| {
        b.priority
            .cmp(&a.priority)
            .then(a.created_at.cmp(&b.created_at))
            .then(a.id.cmp(&b.id))
    });

    Ok(tasks)
}

pub async fn get_goal_progress(store: &dyn DurableStore, goal_id: Uuid) -> anyhow::Result<GoalProgress> {
    let tasks = store.get_tasks_by_goal(goal_id).await?;
    let mut progress = GoalProgress {
        total: tasks.len() as u32,
        ..Default::default()
    };

    for task in &tasks {
        match task.status {
            TaskStatus::Pending => progress.pending += 1,
            TaskStatus::Blocked => progress.blocked += 1,
            TaskStatus::Assigned => progress.assigned += 1,
            TaskStatus::Running => progress.running += 1,
            TaskStatus::Completed => progress.completed += 1,
            TaskStatus::Failed => progress.failed += 1,
            TaskStatus::Cancelled => progress.cancelled += 1,
        }
    }

    Ok(progress)
}

async fn fetch(store: &dyn DurableStore, task_id: Uuid) -> Result<Task> {
    store
        .get_task_by_id(task_id)
        .await?
        .ok_or(TaskGraphError::NotFound { task_id })
}

/// Local unblocking step: for each direct dependent `D` of `completed_id`
/// that is currently `blocked`, promote it to `pending` once *every* one
/// of its dependencies is `completed`. Not a transitive sweep — each call
/// only considers direct dependents of the task that just completed.
async fn unblock_dependents(store: &dyn DurableStore, goal_id: Uuid, completed_id: Uuid) -> anyhow::Result<()> {
    let tasks = store.get_tasks_by_goal(goal_id).await?;
    let completed: HashSet<Uuid> = tasks
        .iter()
        .filter(|t| t.status == TaskStatus::Completed)
        .map(|t| t.id)
        .collect();

    for task in &tasks {
        if task.status == TaskStatus::Blocked
            && task.dependencies.contains(&completed_id)
            && task.dependencies.iter().all(|dep| completed.contains(dep))
        {
            store
                .update_task_status(task.id, TaskStatus::Pending, None, None)
                .await?;
        }
    }

    Ok(())
}

/// A goal rolls up once every task is settled favorably: `completed`, or
/// `cancelled` (superseded by a replan), with at least one task actually
/// `completed` so an all-cancelled goal never rolls up.
async fn rollup_goal(store: &dyn DurableStore, goal_id: Uuid) -> anyhow::Result<()> {
    let tasks = store.get_tasks_by_goal(goal_id).await?;
    let settled = !tasks.is_empty()
        && tasks
            .iter()
            .all(|t| matches!(t.status, TaskStatus::Completed | TaskStatus::Cancelled));
    let any_completed = tasks.iter().any(|t| t.status == TaskStatus::Completed);
    if settled && any_completed {
        store.update_goal_status(goal_id, GoalStatus::Completed).await?;
    }
    Ok(())
}

/// Kahn's algorithm over the plan's dependency-index adjacency list,
/// mirroring the planner validator's own cycle check.
fn check_acyclic(plan_tasks: &[PlanTask]) -> Result<()> {
    let n = plan_tasks.len();
    let mut in_degree = vec![0usize; n];
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); n];

    for (i, task) in plan_tasks.iter().enumerate() {
        for &dep in &task.dependencies {
            if dep >= n {
                continue;
            }
            dependents[dep].push(i);
            in_degree[i] += 1;
        }
    }

    let mut queue: VecDeque<usize> = (0..n).filter(|&i| in_degree[i] == 0).collect();
    let mut visited = 0usize;

    while let Some(node) = queue.pop_front() {
        visited += 1;
        for &dependent in &dependents[node] {
            in_degree[dependent] -= 1;
            if in_degree[dependent] == 0 {
                queue.push_back(dependent);
            }
        }
    }

    if visited != n {
        return Err(TaskGraphError::DependencyCycle);
    }

    Ok(())
}
