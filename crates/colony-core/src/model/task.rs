//! Task records: the nodes of a goal's dependency graph.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Status of a task within its goal's dependency graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Blocked,
    Assigned,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Blocked => "blocked",
            Self::Assigned => "assigned",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

impl FromStr for TaskStatus {
    type Err = TaskStatusParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "blocked" => Ok(Self::Blocked),
            "assigned" => Ok(Self::Assigned),
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(TaskStatusParseError(other.to_owned())),
        }
    }
}

/// Error returned when parsing an invalid [`TaskStatus`] string.
#[derive(Debug, Clone)]
pub struct TaskStatusParseError(pub String);

impl fmt::Display for TaskStatusParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid task status: {:?}", self.0)
    }
}

impl std::error::Error for TaskStatusParseError {}

/// Why a task's attempt ended in failure, distinguishing an ordinary worker
/// report from a health-monitor intervention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The worker reported `task_result` with `success = false`.
    WorkerReported,
    /// The health monitor cancelled a task stuck past its retry budget.
    StuckTaskCancelled,
}

/// The nullable sum type recorded on a task once it leaves `running`/`assigned`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TaskResult {
    Success { output: serde_json::Value },
    Failure { kind: FailureKind, error: String },
}

impl TaskResult {
    /// Mirrors the invariant `completed ⇒ result.success = true`.
    pub fn success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}

/// Retry bookkeeping for a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryMeta {
    pub retry_count: i32,
    pub max_retries: i32,
    pub timeout_ms: i64,
}

impl RetryMeta {
    pub fn eligible_for_retry(&self) -> bool {
        self.retry_count < self.max_retries
    }
}

/// Cost accounting for a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct CostAccounting {
    pub estimated_cost_cents: i64,
    pub actual_cost_cents: Option<i64>,
}

/// A node in a goal's dependency graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub goal_id: Uuid,
    pub parent_id: Option<Uuid>,
    pub title: String,
    pub description: String,
    pub agent_role: String,
    pub priority: i32,
    /// Ordered dependency ids, within the same goal.
    pub dependencies: Vec<Uuid>,
    pub status: TaskStatus,
    pub assigned_to: Option<String>,
    pub result: Option<TaskResult>,
    pub retry: RetryMeta,
    pub cost: CostAccounting,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Task {
    /// `blocked ⇔ at least one dependency is not completed` and the
    /// converse invariants from the data model: recomputes what the
    /// status *should* be from dependency completion, independent of
    /// what is currently stored. Used by tests and by the unblocking
    /// algorithm in `graph`.
    pub fn deps_all_completed(&self, completed: impl Fn(Uuid) -> bool) -> bool {
        self.dependencies.iter().all(|dep| completed(*dep))
    }
}

/// Per-goal status rollup. `total` is the sum of every other field and
/// must equal the number of tasks for the goal (see `spec` §8).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GoalProgress {
    pub total: u32,
    pub pending: u32,
    pub blocked: u32,
    pub assigned: u32,
    pub running: u32,
    pub completed: u32,
    pub failed: u32,
    pub cancelled: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_status_display_roundtrip() {
        let variants = [
            TaskStatus::Pending,
            TaskStatus::Blocked,
            TaskStatus::Assigned,
            TaskStatus::Running,
            TaskStatus::Completed,
            TaskStatus::Failed,
            TaskStatus::Cancelled,
        ];
        for v in &variants {
            let s = v.to_string();
            let parsed: TaskStatus = s.parse().expect("should parse");
            assert_eq!(*v, parsed);
        }
    }

    #[test]
    fn task_status_invalid() {
        assert!("nope".parse::<TaskStatus>().is_err());
    }

    #[test]
    fn retry_meta_eligibility() {
        let meta = RetryMeta {
            retry_count: 2,
            max_retries: 3,
            timeout_ms: 1000,
        };
        assert!(meta.eligible_for_retry());
        let exhausted = RetryMeta {
            retry_count: 3,
            ..meta
        };
        assert!(!exhausted.eligible_for_retry());
    }

    #[test]
    fn task_result_success_flag() {
        let ok = TaskResult::Success {
            output: serde_json::json!({"ok": true}),
        };
        assert!(ok.success());

        let err = TaskResult::Failure {
            kind: FailureKind::WorkerReported,
            error: "boom".to_string(),
        };
        assert!(!err.success());
    }
}
