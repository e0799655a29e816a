//! Audit events recorded through the durable store's event-insertion
//! contract, independent of `tracing` spans used for live observability.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One row in the append-only audit log. `event_type` is an open string
/// tag (`"message_sent"`, `"task_assigned"`, `"heal_reassign"`, ...)
/// rather than a fixed enum, since new call sites may introduce new kinds
/// without touching the store contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentEvent {
    pub event_type: String,
    pub agent_address: Option<String>,
    pub goal_id: Option<Uuid>,
    pub task_id: Option<Uuid>,
    pub content: String,
    pub token_count: Option<i64>,
    pub created_at: DateTime<Utc>,
}

impl AgentEvent {
    pub fn new(event_type: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            agent_address: None,
            goal_id: None,
            task_id: None,
            content: content.into(),
            token_count: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_agent(mut self, address: impl Into<String>) -> Self {
        self.agent_address = Some(address.into());
        self
    }

    pub fn with_goal(mut self, goal_id: Uuid) -> Self {
        self.goal_id = Some(goal_id);
        self
    }

    pub fn with_task(mut self, task_id: Uuid) -> Self {
        self.task_id = Some(task_id);
        self
    }
}
