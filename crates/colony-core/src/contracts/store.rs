use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::model::{AgentEvent, ChildAgent, Goal, GoalStatus, InboxRow, RetryMeta, Task, TaskResult, TaskStatus};

/// Transactional persistence for goals, tasks, inbox, KV blobs, events,
/// and children. Every call is expected to be a short, atomic operation;
/// the core never holds a transaction open across an `await` on another
/// contract.
#[async_trait]
pub trait DurableStore: Send + Sync {
    // Goals
    async fn create_goal(&self, title: String, description: String) -> anyhow::Result<Goal>;
    async fn get_goal_by_id(&self, id: Uuid) -> anyhow::Result<Option<Goal>>;
    async fn get_active_goals(&self) -> anyhow::Result<Vec<Goal>>;
    async fn update_goal_status(&self, id: Uuid, status: GoalStatus) -> anyhow::Result<()>;

    // Tasks
    async fn insert_task(&self, task: Task) -> anyhow::Result<()>;
    async fn get_task_by_id(&self, id: Uuid) -> anyhow::Result<Option<Task>>;
    async fn get_tasks_by_goal(&self, goal_id: Uuid) -> anyhow::Result<Vec<Task>>;
    async fn update_task_status(
        &self,
        id: Uuid,
        status: TaskStatus,
        assigned_to: Option<String>,
        started_at: Option<DateTime<Utc>>,
    ) -> anyhow::Result<()>;
    async fn update_task_retry(&self, id: Uuid, retry: RetryMeta) -> anyhow::Result<()>;
    async fn update_task_result(
        &self,
        id: Uuid,
        result: Option<TaskResult>,
        completed_at: Option<DateTime<Utc>>,
        actual_cost_cents: Option<i64>,
    ) -> anyhow::Result<()>;

    // Inbox
    async fn get_unprocessed_inbox_messages(&self, limit: usize) -> anyhow::Result<Vec<InboxRow>>;
    async fn mark_inbox_message_processed(&self, id: Uuid) -> anyhow::Result<()>;
    async fn insert_inbox_message(&self, raw: String) -> anyhow::Result<Uuid>;

    // KV
    async fn get_kv(&self, key: &str) -> anyhow::Result<Option<String>>;
    async fn set_kv(&self, key: &str, value: String) -> anyhow::Result<()>;

    // Events
    async fn insert_event(&self, event: AgentEvent) -> anyhow::Result<()>;

    // Children
    async fn get_children(&self) -> anyhow::Result<Vec<ChildAgent>>;
    async fn get_child_by_address(&self, address: &str) -> anyhow::Result<Option<ChildAgent>>;
    async fn update_child(&self, child: ChildAgent) -> anyhow::Result<()>;
}

fn _assert_object_safe(_: &dyn DurableStore) {}
