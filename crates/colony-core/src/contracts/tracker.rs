use async_trait::async_trait;

use crate::model::{ChildAgent, ChildStatus};

/// Registration details for a freshly spawned child, before it has a
/// tracked status.
#[derive(Debug, Clone)]
pub struct NewChild {
    pub address: String,
    pub name: String,
    pub role: String,
    pub sandbox_id: Option<String>,
}

/// Child-agent directory: who exists, who is idle, who best matches a
/// role. The health monitor and orchestrator both mutate status through
/// this contract rather than the durable store directly, since liveness
/// tracking may be backed by something other than the store (heartbeats,
/// a process supervisor, ...).
#[async_trait]
pub trait AgentTracker: Send + Sync {
    async fn get_idle(&self) -> anyhow::Result<Vec<ChildAgent>>;
    async fn get_best_for_task(&self, role: &str) -> anyhow::Result<Option<ChildAgent>>;
    async fn update_status(&self, address: &str, status: ChildStatus) -> anyhow::Result<()>;
    async fn register(&self, child: NewChild) -> anyhow::Result<ChildAgent>;
}

fn _assert_object_safe(_: &dyn AgentTracker) {}
