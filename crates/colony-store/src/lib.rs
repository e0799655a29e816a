//! Reference in-memory implementation of `colony_core::contracts::DurableStore`.
//!
//! Grounded on the corpus's `gator-db` query modules (one function per
//! operation, `anyhow::Context` on every fallible step) but backed by a
//! single `tokio::sync::Mutex`-guarded in-process table set rather than a
//! `PgPool`, per the concurrency model's "single writer" resolution: a
//! reference implementation doesn't need row-level locking when a mutex
//! already serializes every mutation.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use colony_core::contracts::DurableStore;
use colony_core::model::{AgentEvent, ChildAgent, Goal, GoalStatus, InboxRow, RetryMeta, Task, TaskResult, TaskStatus};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Debug, Default, Serialize, Deserialize)]
struct Tables {
    goals: HashMap<Uuid, Goal>,
    tasks: HashMap<Uuid, Task>,
    inbox: HashMap<Uuid, (InboxRow, bool)>,
    kv: HashMap<String, String>,
    events: Vec<AgentEvent>,
    children: HashMap<String, ChildAgent>,
}

/// A single-process, single-writer `DurableStore`. Every table lives
/// behind one mutex; callers never see partial writes across fields of
/// the same operation, but two operations never run concurrently either —
/// fine for a colony driven by one `tick()`/`auto_heal()` loop at a time.
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            tables: Mutex::new(Tables::default()),
        })
    }

    /// Serialize every table to a single JSON document, so a process-local
    /// driver (e.g. `colony-cli`) can persist state across invocations
    /// without this crate knowing anything about files or paths.
    pub async fn export_snapshot(&self) -> String {
        let tables = self.tables.lock().await;
        serde_json::to_string(&*tables).expect("Tables is always serializable")
    }

    /// Rebuild a store from a document produced by [`Self::export_snapshot`].
    pub fn from_snapshot(raw: &str) -> anyhow::Result<Arc<Self>> {
        let tables: Tables = serde_json::from_str(raw).context("store snapshot is corrupt")?;
        Ok(Arc::new(Self {
            tables: Mutex::new(tables),
        }))
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self {
            tables: Mutex::new(Tables::default()),
        }
    }
}

#[async_trait]
impl DurableStore for MemoryStore {
    async fn create_goal(&self, title: String, description: String) -> anyhow::Result<Goal> {
        let goal = Goal {
            id: Uuid::new_v4(),
            title,
            description,
            status: GoalStatus::Active,
            strategy: None,
            deadline: None,
            expected_revenue_cents: None,
            actual_revenue_cents: None,
            created_at: Utc::now(),
            completed_at: None,
        };
        let mut tables = self.tables.lock().await;
        tables.goals.insert(goal.id, goal.clone());
        Ok(goal)
    }

    async fn get_goal_by_id(&self, id: Uuid) -> anyhow::Result<Option<Goal>> {
        let tables = self.tables.lock().await;
        Ok(tables.goals.get(&id).cloned())
    }

    async fn get_active_goals(&self) -> anyhow::Result<Vec<Goal>> {
        let tables = self.tables.lock().await;
        let mut goals: Vec<Goal> = tables
            .goals
            .values()
            .filter(|g| g.status == GoalStatus::Active)
            .cloned()
            .collect();
        goals.sort_by_key(|g| g.created_at);
        Ok(goals)
    }

    async fn update_goal_status(&self, id: Uuid, status: GoalStatus) -> anyhow::Result<()> {
        let mut tables = self.tables.lock().await;
        let goal = tables
            .goals
            .get_mut(&id)
            .with_context(|| format!("goal {id} not found"))?;
        goal.status = status;
        if matches!(status, GoalStatus::Completed | GoalStatus::Failed | GoalStatus::Cancelled) {
            goal.completed_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn insert_task(&self, task: Task) -> anyhow::Result<()> {
        let mut tables = self.tables.lock().await;
        tables.tasks.insert(task.id, task);
        Ok(())
    }

    async fn get_task_by_id(&self, id: Uuid) -> anyhow::Result<Option<Task>> {
        let tables = self.tables.lock().await;
        Ok(tables.tasks.get(&id).cloned())
    }

    async fn get_tasks_by_goal(&self, goal_id: Uuid) -> anyhow::Result<Vec<Task>> {
        let tables = self.tables.lock().await;
        Ok(tables.tasks.values().filter(|t| t.goal_id == goal_id).cloned().collect())
    }

    async fn update_task_status(
        &self,
        id: Uuid,
        status: TaskStatus,
        assigned_to: Option<String>,
        started_at: Option<DateTime<Utc>>,
    ) -> anyhow::Result<()> {
        let mut tables = self.tables.lock().await;
        let task = tables
            .tasks
            .get_mut(&id)
            .with_context(|| format!("task {id} not found"))?;
        task.status = status;
        task.assigned_to = assigned_to;
        task.started_at = started_at;
        Ok(())
    }

    async fn update_task_retry(&self, id: Uuid, retry: RetryMeta) -> anyhow::Result<()> {
        let mut tables = self.tables.lock().await;
        let task = tables
            .tasks
            .get_mut(&id)
            .with_context(|| format!("task {id} not found"))?;
        task.retry = retry;
        Ok(())
    }

    async fn update_task_result(
        &self,
        id: Uuid,
        result: Option<TaskResult>,
        completed_at: Option<DateTime<Utc>>,
        actual_cost_cents: Option<i64>,
    ) -> anyhow::Result<()> {
        let mut tables = self.tables.lock().await;
        let task = tables
            .tasks
            .get_mut(&id)
            .with_context(|| format!("task {id} not found"))?;
        task.result = result;
        task.completed_at = completed_at;
        if actual_cost_cents.is_some() {
            task.cost.actual_cost_cents = actual_cost_cents;
        }
        Ok(())
    }

    async fn get_unprocessed_inbox_messages(&self, limit: usize) -> anyhow::Result<Vec<InboxRow>> {
        let tables = self.tables.lock().await;
        let mut rows: Vec<InboxRow> = tables
            .inbox
            .values()
            .filter(|(_, processed)| !processed)
            .map(|(row, _)| row.clone())
            .collect();
        rows.sort_by_key(|r| r.created_at);
        rows.truncate(limit);
        Ok(rows)
    }

    async fn mark_inbox_message_processed(&self, id: Uuid) -> anyhow::Result<()> {
        let mut tables = self.tables.lock().await;
        let entry = tables
            .inbox
            .get_mut(&id)
            .with_context(|| format!("inbox message {id} not found"))?;
        entry.1 = true;
        Ok(())
    }

    async fn insert_inbox_message(&self, raw: String) -> anyhow::Result<Uuid> {
        let id = Uuid::new_v4();
        let row = InboxRow {
            id,
            raw,
            created_at: Utc::now(),
        };
        let mut tables = self.tables.lock().await;
        tables.inbox.insert(id, (row, false));
        Ok(id)
    }

    async fn get_kv(&self, key: &str) -> anyhow::Result<Option<String>> {
        let tables = self.tables.lock().await;
        Ok(tables.kv.get(key).cloned())
    }

    async fn set_kv(&self, key: &str, value: String) -> anyhow::Result<()> {
        let mut tables = self.tables.lock().await;
        tables.kv.insert(key.to_string(), value);
        Ok(())
    }

    async fn insert_event(&self, event: AgentEvent) -> anyhow::Result<()> {
        let mut tables = self.tables.lock().await;
        tables.events.push(event);
        Ok(())
    }

    async fn get_children(&self) -> anyhow::Result<Vec<ChildAgent>> {
        let tables = self.tables.lock().await;
        Ok(tables.children.values().cloned().collect())
    }

    async fn get_child_by_address(&self, address: &str) -> anyhow::Result<Option<ChildAgent>> {
        let tables = self.tables.lock().await;
        Ok(tables.children.get(address).cloned())
    }

    async fn update_child(&self, child: ChildAgent) -> anyhow::Result<()> {
        let mut tables = self.tables.lock().await;
        tables.children.insert(child.address.clone(), child);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_and_fetch_goal_roundtrips() {
        let store = MemoryStore::new();
        let goal = store.create_goal("t".into(), "d".into()).await.unwrap();
        let fetched = store.get_goal_by_id(goal.id).await.unwrap().unwrap();
        assert_eq!(fetched.id, goal.id);
        assert_eq!(fetched.status, GoalStatus::Active);
    }

    #[tokio::test]
    async fn active_goals_excludes_terminal_ones() {
        let store = MemoryStore::new();
        let active = store.create_goal("a".into(), "".into()).await.unwrap();
        let done = store.create_goal("b".into(), "".into()).await.unwrap();
        store.update_goal_status(done.id, GoalStatus::Completed).await.unwrap();

        let active_goals = store.get_active_goals().await.unwrap();
        assert_eq!(active_goals.len(), 1);
        assert_eq!(active_goals[0].id, active.id);
    }

    #[tokio::test]
    async fn kv_roundtrips() {
        let store = MemoryStore::new();
        assert!(store.get_kv("missing").await.unwrap().is_none());
        store.set_kv("k", "v".to_string()).await.unwrap();
        assert_eq!(store.get_kv("k").await.unwrap(), Some("v".to_string()));
    }

    #[tokio::test]
    async fn inbox_messages_drain_in_creation_order_and_mark_processed() {
        let store = MemoryStore::new();
        let first = store.insert_inbox_message("one".into()).await.unwrap();
        let _second = store.insert_inbox_message("two".into()).await.unwrap();

        let unprocessed = store.get_unprocessed_inbox_messages(10).await.unwrap();
        assert_eq!(unprocessed.len(), 2);
        assert_eq!(unprocessed[0].id, first);

        store.mark_inbox_message_processed(first).await.unwrap();
        let remaining = store.get_unprocessed_inbox_messages(10).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_ne!(remaining[0].id, first);
    }

    #[tokio::test]
    async fn update_task_status_fails_for_unknown_task() {
        let store = MemoryStore::new();
        let err = store
            .update_task_status(Uuid::new_v4(), TaskStatus::Assigned, None, None)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("not found"));
    }
}
