//! The `task_result` handler bound into the orchestrator's registry at
//! construction, plus the shared buffer it reports outcomes through.
//!
//! Mirrors the corpus's `mpsc`-channel result collection in
//! `orchestrator::run_orchestrator` (spawned lifecycles report back
//! through a channel the main loop drains), simplified to a shared
//! `Mutex<Vec<_>>` since inbox processing here is sequential rather than
//! concurrently spawned.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::contracts::DurableStore;
use crate::graph;
use crate::messaging::MessageHandler;
use crate::model::{AgentMessage, TaskResult, TaskStatus};

use super::TaskResultPayload;

/// What became of a task as a result of one `task_result` message,
/// carrying the task's id so the phase that reads these outcomes back
/// (`phase_executing`) can act on the task this tick actually touched
/// rather than re-scanning every row in the goal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOutcomeKind {
    Completed(Uuid),
    Failed(Uuid),
    /// Transient failure within the retry budget: reset to `pending`, not
    /// a terminal outcome the tick summary counts.
    Retried(Uuid),
}

pub struct TaskResultHandler {
    store: Arc<dyn DurableStore>,
    outcomes: Arc<Mutex<Vec<TaskOutcomeKind>>>,
}

impl TaskResultHandler {
    pub fn new(store: Arc<dyn DurableStore>, outcomes: Arc<Mutex<Vec<TaskOutcomeKind>>>) -> Self {
        Self { store, outcomes }
    }
}

#[async_trait]
impl MessageHandler for TaskResultHandler {
    async fn handle(&self, message: &AgentMessage) -> anyhow::Result<()> {
        let task_id = message
            .task_id
            .ok_or_else(|| anyhow::anyhow!("task_result message is missing taskId"))?;
        let payload: TaskResultPayload = serde_json::from_str(&message.content)?;

        let kind = if payload.success {
            graph::complete_task(
                self.store.as_ref(),
                task_id,
                TaskResult::Success {
                    output: payload.output.unwrap_or(Value::Null),
                },
                payload.actual_cost_cents,
            )
            .await?;
            TaskOutcomeKind::Completed(task_id)
        } else {
            let task = graph::fail_task(
                self.store.as_ref(),
                task_id,
                payload.error.unwrap_or_else(|| "worker reported failure".to_string()),
                payload.transient.unwrap_or(true),
            )
            .await?;
            if task.status == TaskStatus::Failed {
                TaskOutcomeKind::Failed(task_id)
            } else {
                TaskOutcomeKind::Retried(task_id)
            }
        };

        self.outcomes.lock().await.push(kind);
        Ok(())
    }
}
