//! Orchestrator FSM: drives one goal through
//! `idle -> classifying -> planning -> plan_review -> executing ->
//! (replanning|complete|failed)`, one phase advance per [`Orchestrator::tick`].
//!
//! Mirrors the corpus's `run_orchestrator` loop in spirit (a bounded
//! per-iteration unit of work, semaphore-free here since a tick dispatches
//! at most one batch of ready tasks rather than spawning supervised
//! lifecycles) but trades its `loop { ... }` for a single phase advance per
//! call, since `spec.md` requires the FSM state to be the unit of
//! crash-safety rather than an in-process loop.

mod handlers;
mod prompts;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::contracts::{AgentTracker, ChatMessage, ChatRequest, DurableStore, InferenceClient, Transport};
use crate::graph;
use crate::messaging::{self, HandlerRegistry};
use crate::model::{
    AgentEvent, AgentMessage, ChildAgent, ChildStatus, Goal, GoalStatus, MessagePriority,
    MessageType, OrchestratorState, Phase, PlanTask, PlannerOutput, Task, TaskStatus,
};
use crate::validator::validate_planner_output;

use handlers::{TaskOutcomeKind, TaskResultHandler};
pub use prompts::{ClassifierOutput, CLASSIFIER_SYSTEM_PROMPT, PLANNER_SYSTEM_PROMPT};

/// Persisted KV key for the single-record orchestrator state.
pub const STATE_KEY: &str = "orchestrator.state";
/// Persisted KV key template for the last validated plan of a goal.
pub fn plan_key(goal_id: Uuid) -> String {
    format!("orchestrator.plan.{goal_id}")
}
/// Persisted KV key an external approver flips to unblock `plan_review`.
pub fn approval_key(goal_id: Uuid) -> String {
    format!("orchestrator.plan_review.{goal_id}.approved")
}
/// Survival-tier annotation consumed only to forward into LLM prompts.
pub const TIER_KEY: &str = "current_tier";

/// Role and timeout used for the classification bypass's single-task plan.
pub const BYPASS_AGENT_ROLE: &str = "generalist";
pub const BYPASS_TASK_TIMEOUT_MS: i64 = 600_000;

/// The four named tuning knobs from `spec.md` §4.4, plus a CLI-only
/// cadence field `tick()` itself never reads.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Replan budget before a goal transitions `failed`.
    pub max_replans: i32,
    /// Plans estimated strictly below this auto-approve in `plan_review`.
    pub auto_budget_threshold: i64,
    /// Plans with `estimatedSteps` above this bypass the one-task shortcut.
    pub classification_threshold: i64,
    /// When true, the orchestrator only uses already-idle workers and never
    /// emits a `spawn_requested` event for an unmatched ready task.
    pub disable_spawn: bool,
    /// Cadence an external driver should call `tick()` at. Not read by
    /// `tick()` itself — see `spec.md` §5 ("a tick is a single awaitable
    /// unit").
    pub tick_interval: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_replans: 3,
            auto_budget_threshold: 5_000,
            classification_threshold: 3,
            disable_spawn: false,
            tick_interval: Duration::from_secs(5),
        }
    }
}

/// `{phase, tasksAssigned, tasksCompleted, tasksFailed, goalsActive,
/// agentsActive}` from `spec.md` §6.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TickSummary {
    pub phase: Phase,
    pub tasks_assigned: u32,
    pub tasks_completed: u32,
    pub tasks_failed: u32,
    pub goals_active: u32,
    pub agents_active: u32,
}

impl TickSummary {
    fn new(phase: Phase) -> Self {
        Self {
            phase,
            tasks_assigned: 0,
            tasks_completed: 0,
            tasks_failed: 0,
            goals_active: 0,
            agents_active: 0,
        }
    }
}

/// The task-result payload carried in an `AgentMessage.content` string for
/// messages of type `task_result`. `spec.md` leaves the wire shape of
/// `content` to the implementation beyond "opaque string; usually JSON";
/// this is the schema this core reads and writes (see DESIGN.md).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskResultPayload {
    pub success: bool,
    #[serde(default)]
    pub output: Option<Value>,
    #[serde(default)]
    pub error: Option<String>,
    /// Whether a failure is transient (retry-eligible) or terminal.
    /// Defaults to `true` so an unrecognized worker report gets one retry
    /// rather than burning the goal's whole replan budget immediately.
    #[serde(default)]
    pub transient: Option<bool>,
    #[serde(default)]
    pub actual_cost_cents: Option<i64>,
}

/// Drives a single active goal's FSM, one phase per [`tick`](Self::tick).
/// Constructed from the four external contracts plus a handler registry,
/// per `spec.md` §9's "constructors take these as explicit parameters"
/// guidance — no module-level state.
pub struct Orchestrator {
    store: Arc<dyn DurableStore>,
    inference: Arc<dyn InferenceClient>,
    transport: Arc<dyn Transport>,
    tracker: Arc<dyn AgentTracker>,
    registry: HandlerRegistry,
    task_outcomes: Arc<Mutex<Vec<TaskOutcomeKind>>>,
    config: OrchestratorConfig,
}

impl Orchestrator {
    /// Builds the orchestrator with its own internal `task_result` handler
    /// wired into `registry` (overwriting any existing registration for
    /// that type), plus whatever other handler slots the caller filled in.
    /// Mirrors `spec.md` §9: handlers are function values bound here, at
    /// construction, not an inheritance hierarchy.
    pub fn new(
        store: Arc<dyn DurableStore>,
        inference: Arc<dyn InferenceClient>,
        transport: Arc<dyn Transport>,
        tracker: Arc<dyn AgentTracker>,
        mut registry: HandlerRegistry,
        config: OrchestratorConfig,
    ) -> Self {
        let task_outcomes = Arc::new(Mutex::new(Vec::new()));
        registry.register(
            MessageType::TaskResult,
            Box::new(TaskResultHandler::new(Arc::clone(&store), Arc::clone(&task_outcomes))),
        );

        Self {
            store,
            inference,
            transport,
            tracker,
            registry,
            task_outcomes,
            config,
        }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    async fn load_state(&self) -> anyhow::Result<OrchestratorState> {
        match self.store.get_kv(STATE_KEY).await? {
            Some(raw) => Ok(serde_json::from_str(&raw).context("orchestrator.state is corrupt")?),
            None => Ok(OrchestratorState::new()),
        }
    }

    async fn save_state(&self, state: &OrchestratorState) -> anyhow::Result<()> {
        let raw = serde_json::to_string(state).expect("OrchestratorState is always serializable");
        self.store.set_kv(STATE_KEY, raw).await
    }

    /// Advance the FSM by exactly one phase. On success, persists the new
    /// state as the transaction's final write; on error, the tick aborts
    /// and the next call retries from the same persisted phase (`spec.md`
    /// §4.4's persistence rule and §7's propagation policy).
    pub async fn tick(&self) -> anyhow::Result<TickSummary> {
        let mut state = self.load_state().await?;

        if let Some(goal_id) = state.goal_id {
            if let Some(goal) = self.store.get_goal_by_id(goal_id).await? {
                if goal.status == GoalStatus::Cancelled {
                    state = OrchestratorState::new();
                    self.save_state(&state).await?;
                    return Ok(TickSummary::new(Phase::Idle));
                }
            }
        }

        let mut summary = TickSummary::new(state.phase);

        match state.phase {
            Phase::Idle => self.phase_idle(&mut state, &mut summary).await?,
            Phase::Classifying => self.phase_classifying(&mut state).await?,
            Phase::Planning => self.phase_planning(&mut state).await?,
            Phase::PlanReview => self.phase_plan_review(&mut state).await?,
            Phase::Executing => self.phase_executing(&mut state, &mut summary).await?,
            Phase::Replanning => self.phase_replanning(&mut state).await?,
            Phase::Complete => self.phase_complete(&mut state).await?,
            Phase::Failed => self.phase_failed(&mut state).await?,
        }

        summary.phase = state.phase;
        self.save_state(&state).await?;
        Ok(summary)
    }

    async fn phase_idle(&self, state: &mut OrchestratorState, summary: &mut TickSummary) -> anyhow::Result<()> {
        let active_goals = self.store.get_active_goals().await?;
        summary.goals_active = active_goals.len() as u32;

        if let Some(oldest) = active_goals.into_iter().min_by_key(|g| g.created_at) {
            state.goal_id = Some(oldest.id);
            state.phase = Phase::Classifying;
        }
        Ok(())
    }

    async fn phase_classifying(&self, state: &mut OrchestratorState) -> anyhow::Result<()> {
        let goal_id = state.goal_id.context("classifying phase requires an active goal")?;
        let goal = self
            .store
            .get_goal_by_id(goal_id)
            .await?
            .with_context(|| format!("goal {goal_id} not found"))?;

        let classification = self.classify(&goal).await?;

        // §4.4 bypass requires both a low step count and no implied
        // dependencies; a `stepOutline` with more than one entry implies
        // the steps are meant to run in some order, i.e. dependencies.
        let implies_dependencies = classification.step_outline.len() > 1;
        if classification.estimated_steps <= self.config.classification_threshold && !implies_dependencies {
            let bypass = PlanTask {
                title: goal.title.clone(),
                description: goal.description.clone(),
                agent_role: BYPASS_AGENT_ROLE.to_string(),
                dependencies: Vec::new(),
                estimated_cost_cents: 0,
                priority: 0,
                timeout_ms: BYPASS_TASK_TIMEOUT_MS,
            };
            graph::decompose_goal(self.store.as_ref(), goal_id, std::slice::from_ref(&bypass)).await?;
            state.phase = Phase::Executing;
        } else {
            state.phase = Phase::Planning;
        }
        Ok(())
    }

    async fn phase_planning(&self, state: &mut OrchestratorState) -> anyhow::Result<()> {
        let goal_id = state.goal_id.context("planning phase requires an active goal")?;
        let goal = self
            .store
            .get_goal_by_id(goal_id)
            .await?
            .with_context(|| format!("goal {goal_id} not found"))?;

        let raw = self.plan(&goal).await?;
        let output = validate_planner_output(&raw)?;

        self.persist_plan(goal_id, &output).await?;
        graph::decompose_goal(self.store.as_ref(), goal_id, &output.tasks).await?;
        state.phase = Phase::PlanReview;
        Ok(())
    }

    async fn phase_plan_review(&self, state: &mut OrchestratorState) -> anyhow::Result<()> {
        let goal_id = state.goal_id.context("plan_review phase requires an active goal")?;

        let Some(raw_plan) = self.store.get_kv(&plan_key(goal_id)).await? else {
            // Plan already materialized by a prior pass; nothing to review.
            state.phase = Phase::Executing;
            return Ok(());
        };
        let plan: PlannerOutput = serde_json::from_str(&raw_plan).context("cached plan is corrupt")?;

        // Resolved open question (DESIGN.md): auto-approve uses strict `<`.
        if plan.estimated_total_cost_cents < self.config.auto_budget_threshold {
            state.phase = Phase::Executing;
            return Ok(());
        }

        let approved = self.store.get_kv(&approval_key(goal_id)).await?;
        if approved.as_deref() == Some("true") {
            state.phase = Phase::Executing;
            return Ok(());
        }

        self.store
            .insert_event(
                AgentEvent::new(
                    "plan_review_required",
                    format!("plan estimated at {} cents awaits approval", plan.estimated_total_cost_cents),
                )
                .with_goal(goal_id),
            )
            .await?;
        Ok(())
    }

    async fn phase_executing(&self, state: &mut OrchestratorState, summary: &mut TickSummary) -> anyhow::Result<()> {
        let goal_id = state.goal_id.context("executing phase requires an active goal")?;

        if self.store.get_goal_by_id(goal_id).await?.is_none() {
            *state = OrchestratorState::new();
            return Ok(());
        }

        self.task_outcomes.lock().await.clear();
        messaging::process_inbox(self.store.as_ref(), &self.registry).await?;
        let outcomes = std::mem::take(&mut *self.task_outcomes.lock().await);
        let mut failed_this_tick = None;
        for outcome in &outcomes {
            match outcome {
                TaskOutcomeKind::Completed(_) => summary.tasks_completed += 1,
                TaskOutcomeKind::Failed(task_id) => {
                    summary.tasks_failed += 1;
                    failed_this_tick.get_or_insert(*task_id);
                }
                TaskOutcomeKind::Retried(_) => {}
            }
        }

        // Gate the replanning transition on a failure this tick produced,
        // not a full-table scan: a task already replanned away stays
        // `Failed` in its own row (see `phase_replanning`'s cancellation),
        // and re-scanning every row would re-trigger `-> replanning` on it
        // forever, burning the replan budget on an already-handled failure.
        if let Some(failed_task_id) = failed_this_tick {
            let failed = self
                .store
                .get_task_by_id(failed_task_id)
                .await?
                .with_context(|| format!("failed task {failed_task_id} not found"))?;
            if state.replan_count < self.config.max_replans {
                state.failed_task_id = Some(failed.id);
                state.failed_error = failed.result.as_ref().map(|r| format!("{r:?}"));
                state.phase = Phase::Replanning;
                return Ok(());
            } else {
                state.phase = Phase::Failed;
                state.failed_error = failed.result.as_ref().map(|r| format!("{r:?}"));
                return Ok(());
            }
        }

        let children = self.store.get_children().await?;
        summary.agents_active = children
            .iter()
            .filter(|c| matches!(c.status, ChildStatus::Busy))
            .count() as u32;

        let ready = graph::get_ready_tasks(self.store.as_ref(), goal_id).await?;
        for task in ready {
            self.dispatch_ready_task(goal_id, &task, summary).await?;
        }

        if let Some(goal) = self.store.get_goal_by_id(goal_id).await? {
            if goal.status == GoalStatus::Completed {
                state.phase = Phase::Complete;
            }
        }
        Ok(())
    }

    async fn dispatch_ready_task(&self, goal_id: Uuid, task: &Task, summary: &mut TickSummary) -> anyhow::Result<()> {
        let Some(worker) = self.find_worker_for(&task.agent_role).await? else {
            if !self.config.disable_spawn {
                self.store
                    .insert_event(
                        AgentEvent::new("spawn_requested", task.agent_role.clone())
                            .with_goal(goal_id)
                            .with_task(task.id),
                    )
                    .await?;
            }
            return Ok(());
        };

        match graph::assign_task(self.store.as_ref(), task.id, &worker.address).await {
            Ok(_) => {
                summary.tasks_assigned += 1;
                let message = AgentMessage {
                    id: Uuid::new_v4(),
                    kind: MessageType::TaskAssignment,
                    from: "orchestrator".to_string(),
                    to: worker.address.clone(),
                    goal_id: Some(goal_id),
                    task_id: Some(task.id),
                    content: serde_json::json!({
                        "title": task.title,
                        "description": task.description,
                        "timeoutMs": task.retry.timeout_ms,
                    })
                    .to_string(),
                    priority: message_priority_for(task.priority),
                    requires_response: true,
                    expires_at: None,
                    created_at: Utc::now(),
                };
                if let Err(err) = messaging::send(self.store.as_ref(), self.transport.as_ref(), message).await {
                    tracing::warn!(task_id = %task.id, worker = %worker.address, error = %err, "task_assignment send failed");
                }
                // Mark the worker busy immediately so the next ready task
                // this tick doesn't see it as idle again via `find_worker_for`.
                self.tracker.update_status(&worker.address, ChildStatus::Busy).await?;
            }
            Err(err) => {
                tracing::warn!(task_id = %task.id, error = %err, "assign_task failed for a ready task");
            }
        }
        Ok(())
    }

    /// "find an idle worker whose role matches (or best-for-task)" —
    /// `spec.md` §4.4 step 5.
    async fn find_worker_for(&self, role: &str) -> anyhow::Result<Option<ChildAgent>> {
        let idle = self.tracker.get_idle().await?;
        if let Some(matched) = idle.into_iter().find(|c| c.role == role) {
            return Ok(Some(matched));
        }
        self.tracker.get_best_for_task(role).await
    }

    async fn phase_replanning(&self, state: &mut OrchestratorState) -> anyhow::Result<()> {
        let goal_id = state.goal_id.context("replanning phase requires an active goal")?;
        let goal = self
            .store
            .get_goal_by_id(goal_id)
            .await?
            .with_context(|| format!("goal {goal_id} not found"))?;
        let failed_task_id = state.failed_task_id.context("replanning phase requires a failed task")?;
        let failed_task = self
            .store
            .get_task_by_id(failed_task_id)
            .await?
            .with_context(|| format!("failed task {failed_task_id} not found"))?;

        let raw = self
            .replan(&goal, &failed_task, state.failed_error.as_deref().unwrap_or(""))
            .await?;
        let output = validate_planner_output(&raw)?;

        self.persist_plan(goal_id, &output).await?;
        graph::decompose_goal(self.store.as_ref(), goal_id, &output.tasks).await?;
        // Supersede the old failure so it stops re-triggering the
        // executing-phase replanning gate and stops blocking rollup.
        graph::cancel_task(self.store.as_ref(), failed_task_id).await?;

        state.replan_count += 1;
        state.failed_task_id = None;
        state.failed_error = None;
        state.phase = Phase::PlanReview;
        Ok(())
    }

    async fn phase_complete(&self, state: &mut OrchestratorState) -> anyhow::Result<()> {
        if let Some(goal_id) = state.goal_id {
            self.store.update_goal_status(goal_id, GoalStatus::Completed).await?;
        }
        *state = OrchestratorState::new();
        Ok(())
    }

    async fn phase_failed(&self, state: &mut OrchestratorState) -> anyhow::Result<()> {
        if let Some(goal_id) = state.goal_id {
            self.store.update_goal_status(goal_id, GoalStatus::Failed).await?;
            if let Some(error) = &state.failed_error {
                self.store
                    .insert_event(AgentEvent::new("goal_failed", error.clone()).with_goal(goal_id))
                    .await?;
            }
        }
        *state = OrchestratorState::new();
        Ok(())
    }

    async fn persist_plan(&self, goal_id: Uuid, output: &PlannerOutput) -> anyhow::Result<()> {
        let raw = serde_json::to_string(output).expect("PlannerOutput is always serializable");
        self.store.set_kv(&plan_key(goal_id), raw).await
    }

    async fn current_tier(&self) -> anyhow::Result<Option<String>> {
        self.store.get_kv(TIER_KEY).await
    }

    async fn classify(&self, goal: &Goal) -> anyhow::Result<ClassifierOutput> {
        let tier = self.current_tier().await?;
        let request = ChatRequest {
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: CLASSIFIER_SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: prompts::classifier_prompt(goal),
                },
            ],
            tier,
            response_format: Some(serde_json::json!({"type": "json_object"})),
            ..Default::default()
        };
        let response = self.inference.chat(request).await?;
        let value: Value = serde_json::from_str(&response.content).context("classifier output is not valid JSON")?;
        serde_json::from_value(value).context("classifier output missing required fields")
    }

    async fn plan(&self, goal: &Goal) -> anyhow::Result<Value> {
        let tier = self.current_tier().await?;
        let idle = self.tracker.get_idle().await.unwrap_or_default();
        let request = ChatRequest {
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: PLANNER_SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: prompts::planner_prompt(goal, tier.as_deref(), &idle),
                },
            ],
            response_format: Some(serde_json::json!({"type": "json_object"})),
            ..Default::default()
        };
        let response = self.inference.chat(request).await?;
        serde_json::from_str(&response.content).context("planner output is not valid JSON")
    }

    async fn replan(&self, goal: &Goal, failed_task: &Task, failed_error: &str) -> anyhow::Result<Value> {
        let tier = self.current_tier().await?;
        let idle = self.tracker.get_idle().await.unwrap_or_default();
        let request = ChatRequest {
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: PLANNER_SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: prompts::replan_prompt(goal, failed_task, failed_error, tier.as_deref(), &idle),
                },
            ],
            response_format: Some(serde_json::json!({"type": "json_object"})),
            ..Default::default()
        };
        let response = self.inference.chat(request).await?;
        serde_json::from_str(&response.content).context("replanner output is not valid JSON")
    }
}

/// Concrete mapping from a task's integer priority to a message priority,
/// since `spec.md` only says "priority derived from task priority" without
/// naming thresholds (see DESIGN.md).
pub fn message_priority_for(task_priority: i32) -> MessagePriority {
    match task_priority {
        p if p >= 8 => MessagePriority::Critical,
        p if p >= 5 => MessagePriority::High,
        p if p >= 1 => MessagePriority::Normal,
        _ => MessagePriority::Low,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_mapping_covers_the_full_range() {
        assert_eq!(message_priority_for(10), MessagePriority::Critical);
        assert_eq!(message_priority_for(8), MessagePriority::Critical);
        assert_eq!(message_priority_for(7), MessagePriority::High);
        assert_eq!(message_priority_for(5), MessagePriority::High);
        assert_eq!(message_priority_for(4), MessagePriority::Normal);
        assert_eq!(message_priority_for(1), MessagePriority::Normal);
        assert_eq!(message_priority_for(0), MessagePriority::Low);
        assert_eq!(message_priority_for(-1), MessagePriority::Low);
    }
}
