//! Health monitor / auto-healer: a second control loop, independent of the
//! orchestrator FSM, that audits worker agents each invocation and repairs
//! the ones showing a known pathology.
//!
//! Grounded on the corpus's orphaned-task recovery pass at the top of
//! `run_orchestrator` (reset-then-retry-or-escalate), generalized from
//! "tasks an orchestrator restart left stranded" to the fuller signal set
//! `spec.md` §4.5 names (crash, stuck, credits, error rate) and run on its
//! own cadence rather than once at orchestrator startup.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::contracts::{AgentTracker, DurableStore, FundingContract, Transport};
use crate::messaging;
use crate::model::{
    AgentMessage, ChildAgent, ChildStatus, FailureKind, MessagePriority, MessageType, Task,
    TaskResult, TaskStatus,
};

/// The numeric thresholds `spec.md` §4.5 names in prose, externalized so a
/// deployment can retune without recompiling the detection logic —
/// the same shape as `OrchestratorConfig`.
#[derive(Debug, Clone)]
pub struct HealthMonitorConfig {
    /// `process_crashed`: last activity older than this.
    pub crashed_after: chrono::Duration,
    /// `stuck_on_task`: last activity older than this while a task is active.
    pub stuck_after: chrono::Duration,
    /// Extra grace window added to a running task's `timeoutMs`.
    pub timeout_grace: chrono::Duration,
    /// `out_of_credits`: balance below this many cents.
    pub credit_threshold_cents: i64,
    /// `error_loop`: minimum sample count before the rate is meaningful.
    pub error_loop_min_samples: u32,
    /// `error_loop`: failure-rate threshold over the sample window.
    pub error_loop_rate: f64,
    /// Window the error-rate sample is drawn from before falling back to
    /// the last 25 tasks.
    pub error_window: chrono::Duration,
    /// `fund`: top up to this target balance.
    pub fund_target_cents: i64,
    /// `fund`: never transfer less than this.
    pub fund_min_transfer_cents: i64,
}

impl Default for HealthMonitorConfig {
    fn default() -> Self {
        Self {
            crashed_after: chrono::Duration::minutes(45),
            stuck_after: chrono::Duration::minutes(15),
            timeout_grace: chrono::Duration::minutes(2),
            credit_threshold_cents: 10,
            error_loop_min_samples: 3,
            error_loop_rate: 0.6,
            error_window: chrono::Duration::hours(6),
            fund_target_cents: 250,
            fund_min_transfer_cents: 50,
        }
    }
}

/// A detected worker pathology. A worker may carry more than one at once;
/// [`HealthMonitor::auto_heal`] applies at most one action per worker per
/// invocation, per the precedence order in `spec.md` §4.5.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthIssue {
    ProcessCrashed,
    StuckOnTask,
    OutOfCredits,
    ErrorLoop,
}

/// The kind of repair [`HealthMonitor::auto_heal`] took for one worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealActionKind {
    Stop,
    Fund,
    Restart,
    Reassign,
}

/// One repair attempt, always returned regardless of outcome — `spec.md`
/// §4.5's closing sentence: "Each action yields `{type, agentAddress,
/// reason, success}`; all are returned to the caller."
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealAction {
    pub kind: HealActionKind,
    pub agent_address: String,
    pub reason: String,
    pub success: bool,
}

/// Audits worker agents and repairs the ones showing a known pathology.
/// Runs on its own cadence, independent of [`crate::orchestrator::Orchestrator`].
pub struct HealthMonitor {
    store: Arc<dyn DurableStore>,
    transport: Arc<dyn Transport>,
    tracker: Arc<dyn AgentTracker>,
    funding: Arc<dyn FundingContract>,
    config: HealthMonitorConfig,
}

impl HealthMonitor {
    pub fn new(
        store: Arc<dyn DurableStore>,
        transport: Arc<dyn Transport>,
        tracker: Arc<dyn AgentTracker>,
        funding: Arc<dyn FundingContract>,
        config: HealthMonitorConfig,
    ) -> Self {
        Self {
            store,
            transport,
            tracker,
            funding,
            config,
        }
    }

    pub fn config(&self) -> &HealthMonitorConfig {
        &self.config
    }

    /// Audit every tracked child and report its issue set (empty entries
    /// are omitted). Read-only: takes no healing action.
    pub async fn check(&self) -> anyhow::Result<HashMap<String, HashSet<HealthIssue>>> {
        let children = self.store.get_children().await?;
        let mut report = HashMap::with_capacity(children.len());
        for child in &children {
            let issues = self.detect_issues(child).await?;
            if !issues.is_empty() {
                report.insert(child.address.clone(), issues);
            }
        }
        Ok(report)
    }

    /// Audit every tracked child and repair the ones with issues, in
    /// precedence order `error_loop > out_of_credits > process_crashed >
    /// stuck_on_task`, applying one action per worker per invocation.
    pub async fn auto_heal(&self) -> anyhow::Result<Vec<HealAction>> {
        let children = self.store.get_children().await?;
        let mut actions = Vec::new();

        for child in &children {
            let issues = self.detect_issues(child).await?;
            if issues.is_empty() {
                continue;
            }

            if issues.contains(&HealthIssue::ErrorLoop) {
                actions.push(self.heal_stop(child).await);
            } else if issues.contains(&HealthIssue::OutOfCredits) {
                actions.push(self.heal_fund(child).await);
            } else if issues.contains(&HealthIssue::ProcessCrashed) {
                actions.push(self.heal_restart(child).await);
            } else if issues.contains(&HealthIssue::StuckOnTask) {
                if let Some(action) = self.heal_reassign(child).await? {
                    actions.push(action);
                }
            }
        }

        Ok(actions)
    }

    async fn detect_issues(&self, child: &ChildAgent) -> anyhow::Result<HashSet<HealthIssue>> {
        let mut issues = HashSet::new();
        let now = Utc::now();
        let last_activity = child.last_checked;
        let active_task = self.active_task_for(&child.address).await?;

        if child.status.is_crashed() || now - last_activity > self.config.crashed_after {
            issues.insert(HealthIssue::ProcessCrashed);
        }

        let stuck_by_inactivity = active_task.is_some() && now - last_activity > self.config.stuck_after;
        let stuck_by_timeout = active_task.as_ref().is_some_and(|t| {
            t.status == TaskStatus::Running
                && t.started_at.is_some_and(|started| {
                    now > started + chrono::Duration::milliseconds(t.retry.timeout_ms) + self.config.timeout_grace
                })
        });
        if stuck_by_inactivity || stuck_by_timeout {
            issues.insert(HealthIssue::StuckOnTask);
        }

        let balance = self.funding.get_balance(&child.address).await.unwrap_or(i64::MAX);
        if balance < self.config.credit_threshold_cents {
            issues.insert(HealthIssue::OutOfCredits);
        }

        let (samples, failures) = self.error_rate_samples(&child.address).await?;
        if !samples.is_empty()
            && samples.len() as u32 >= self.config.error_loop_min_samples
            && failures as f64 / samples.len() as f64 >= self.config.error_loop_rate
        {
            issues.insert(HealthIssue::ErrorLoop);
        }

        Ok(issues)
    }

    /// The single task in `{assigned, running}` assigned to this worker,
    /// preferring `running`, then the oldest `created_at`. Scoped to
    /// currently active goals since `DurableStore` exposes no
    /// cross-goal/by-assignee task query (see DESIGN.md).
    async fn active_task_for(&self, address: &str) -> anyhow::Result<Option<Task>> {
        let goals = self.store.get_active_goals().await?;
        let mut candidates = Vec::new();
        for goal in goals {
            let tasks = self.store.get_tasks_by_goal(goal.id).await?;
            candidates.extend(tasks.into_iter().filter(|t| {
                t.assigned_to.as_deref() == Some(address)
                    && matches!(t.status, TaskStatus::Assigned | TaskStatus::Running)
            }));
        }
        candidates.sort_by(|a, b| {
            let rank = |t: &Task| if t.status == TaskStatus::Running { 0 } else { 1 };
            rank(a).cmp(&rank(b)).then(a.created_at.cmp(&b.created_at))
        });
        Ok(candidates.into_iter().next())
    }

    /// Completed/failed tasks assigned to this worker within
    /// `error_window`, falling back to the last 25 by recency when the
    /// windowed sample is smaller than `error_loop_min_samples`.
    async fn error_rate_samples(&self, address: &str) -> anyhow::Result<(Vec<Task>, usize)> {
        let goals = self.store.get_active_goals().await?;
        let mut all = Vec::new();
        for goal in goals {
            let tasks = self.store.get_tasks_by_goal(goal.id).await?;
            all.extend(tasks.into_iter().filter(|t| {
                t.assigned_to.as_deref() == Some(address)
                    && matches!(t.status, TaskStatus::Completed | TaskStatus::Failed)
            }));
        }
        all.sort_by(|a, b| b.completed_at.cmp(&a.completed_at));

        let now = Utc::now();
        let windowed: Vec<Task> = all
            .iter()
            .cloned()
            .filter(|t| t.completed_at.is_some_and(|c| now - c <= self.config.error_window))
            .collect();

        let samples = if windowed.len() as u32 >= self.config.error_loop_min_samples {
            windowed
        } else {
            all.into_iter().take(25).collect()
        };
        let failures = samples.iter().filter(|t| t.status == TaskStatus::Failed).count();
        Ok((samples, failures))
    }

    async fn find_replacement(&self, exclude: &str) -> anyhow::Result<Option<ChildAgent>> {
        let idle = self.tracker.get_idle().await?;
        if let Some(candidate) = idle.into_iter().find(|c| c.address != exclude) {
            return Ok(Some(candidate));
        }
        if let Some(candidate) = self.tracker.get_best_for_task("generalist").await? {
            if candidate.address != exclude {
                return Ok(Some(candidate));
            }
        }
        Ok(None)
    }

    async fn send_shutdown(&self, child: &ChildAgent, reason: &str) -> bool {
        let message = AgentMessage {
            id: Uuid::new_v4(),
            kind: MessageType::ShutdownRequest,
            from: "health_monitor".to_string(),
            to: child.address.clone(),
            goal_id: None,
            task_id: None,
            content: reason.to_string(),
            priority: MessagePriority::Critical,
            requires_response: false,
            expires_at: None,
            created_at: Utc::now(),
        };
        match messaging::send(self.store.as_ref(), self.transport.as_ref(), message).await {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!(agent = %child.address, error = %err, "shutdown_request send failed");
                false
            }
        }
    }

    async fn heal_stop(&self, child: &ChildAgent) -> HealAction {
        let reason = format!("error_loop detected for {}", child.address);
        let sent = self.send_shutdown(child, &reason).await;
        let status_ok = self.tracker.update_status(&child.address, ChildStatus::Stopped).await.is_ok();
        HealAction {
            kind: HealActionKind::Stop,
            agent_address: child.address.clone(),
            reason,
            success: sent && status_ok,
        }
    }

    async fn heal_fund(&self, child: &ChildAgent) -> HealAction {
        let balance = self.funding.get_balance(&child.address).await.unwrap_or(0);
        let amount = (self.config.fund_target_cents - balance).max(self.config.fund_min_transfer_cents);
        let result = self.funding.fund_child(&child.address, amount).await;
        let success = result.map(|r| r.success).unwrap_or(false);
        HealAction {
            kind: HealActionKind::Fund,
            agent_address: child.address.clone(),
            reason: format!("topped up {} by {} cents toward a {} cent target", child.address, amount, self.config.fund_target_cents),
            success,
        }
    }

    async fn heal_restart(&self, child: &ChildAgent) -> HealAction {
        let reason = format!("process_crashed detected for {}", child.address);
        let sent = self.send_shutdown(child, &reason).await;
        let status_ok = self.tracker.update_status(&child.address, ChildStatus::Starting).await.is_ok();
        HealAction {
            kind: HealActionKind::Restart,
            agent_address: child.address.clone(),
            reason,
            success: sent && status_ok,
        }
    }

    async fn heal_reassign(&self, child: &ChildAgent) -> anyhow::Result<Option<HealAction>> {
        let Some(task) = self.active_task_for(&child.address).await? else {
            return Ok(None);
        };

        let mut retry = task.retry;
        retry.retry_count += 1;

        if retry.retry_count > retry.max_retries {
            self.store.update_task_retry(task.id, retry).await?;
            let result = TaskResult::Failure {
                kind: FailureKind::StuckTaskCancelled,
                error: format!("worker {} was stuck past the task's retry budget", child.address),
            };
            self.store.update_task_result(task.id, Some(result), Some(Utc::now()), None).await?;
            self.store
                .update_task_status(task.id, TaskStatus::Failed, task.assigned_to.clone(), task.started_at)
                .await?;
            return Ok(Some(HealAction {
                kind: HealActionKind::Reassign,
                agent_address: child.address.clone(),
                reason: format!("task {} exceeded its retry budget while stuck, cancelled", task.id),
                success: true,
            }));
        }

        let replacement = self.find_replacement(&child.address).await?;
        let new_status = if replacement.is_some() { TaskStatus::Assigned } else { TaskStatus::Pending };
        let new_assignee = replacement.as_ref().map(|c| c.address.clone());

        self.store.update_task_retry(task.id, retry).await?;
        self.store.update_task_result(task.id, None, None, None).await?;
        self.store
            .update_task_status(task.id, new_status, new_assignee.clone(), None)
            .await?;

        let reason = match &new_assignee {
            Some(addr) => format!("task {} reassigned from {} to {addr}", task.id, child.address),
            None => format!("task {} reset to pending, no replacement worker available", task.id),
        };
        Ok(Some(HealAction {
            kind: HealActionKind::Reassign,
            agent_address: child.address.clone(),
            reason,
            success: true,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_thresholds_match_spec() {
        let config = HealthMonitorConfig::default();
        assert_eq!(config.crashed_after, chrono::Duration::minutes(45));
        assert_eq!(config.stuck_after, chrono::Duration::minutes(15));
        assert_eq!(config.timeout_grace, chrono::Duration::minutes(2));
        assert_eq!(config.credit_threshold_cents, 10);
        assert_eq!(config.error_loop_min_samples, 3);
        assert!((config.error_loop_rate - 0.6).abs() < f64::EPSILON);
        assert_eq!(config.fund_target_cents, 250);
        assert_eq!(config.fund_min_transfer_cents, 50);
    }
}
