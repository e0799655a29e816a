//! Local, no-external-service adapters for the four contracts this
//! workspace ships no real implementation of.
//!
//! `spec.md` §1 scopes concrete LLM-provider, transport, and funding
//! integrations out as non-goals, so a CLI that only had `colony-core`
//! and `colony-store` to build on would have nothing to drive `tick()`
//! with. These adapters are a deliberately minimal stand-in — an operator
//! wiring a production deployment swaps them for real clients (see
//! `DESIGN.md`) without touching `colony-core`.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use colony_core::contracts::{
    AgentTracker, ChatRequest, ChatResponse, DurableStore, FundResult, FundingContract,
    InferenceClient, NewChild, RecallResult, Transport, Usage,
};
use colony_core::model::{ChildAgent, ChildStatus};
use colony_core::orchestrator::CLASSIFIER_SYSTEM_PROMPT;
use tokio::sync::Mutex;

/// Always classifies a goal as a single step, routing every goal through
/// the classification bypass rather than ever reaching the planner. A
/// real provider would replace this entirely; this one exists so `colony
/// run` has something to drive without external configuration.
pub struct EchoInferenceClient;

impl EchoInferenceClient {
    pub fn new() -> Self {
        Self
    }
}

impl Default for EchoInferenceClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl InferenceClient for EchoInferenceClient {
    async fn chat(&self, request: ChatRequest) -> anyhow::Result<ChatResponse> {
        let is_classifier = request
            .messages
            .first()
            .is_some_and(|m| m.content == CLASSIFIER_SYSTEM_PROMPT);

        let content = if is_classifier {
            serde_json::json!({
                "estimatedSteps": 1,
                "reason": "no inference provider configured; routing every goal to a single generalist task",
                "stepOutline": ["complete the goal directly"],
            })
            .to_string()
        } else {
            serde_json::json!({
                "analysis": "no inference provider configured",
                "strategy": "handle the goal as a single generalist task",
                "tasks": [{
                    "title": "complete the goal",
                    "description": "no planning provider is configured; handled as one task",
                    "agentRole": "generalist",
                    "dependencies": [],
                    "estimatedCostCents": 0,
                    "priority": 0,
                    "timeoutMs": 600_000,
                }],
                "customRoles": [],
                "risks": [],
                "estimatedTotalCostCents": 0,
                "estimatedTimeMinutes": 5,
            })
            .to_string()
        };

        Ok(ChatResponse {
            content,
            tool_calls: Vec::new(),
            usage: Usage::default(),
        })
    }
}

/// Logs every delivery instead of sending it anywhere.
pub struct LogTransport;

impl LogTransport {
    pub fn new() -> Self {
        Self
    }
}

impl Default for LogTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for LogTransport {
    async fn deliver(&self, to: &str, envelope: &str) -> anyhow::Result<()> {
        tracing::info!(to, envelope, "delivering message (no transport configured)");
        Ok(())
    }

    async fn get_recipients(&self) -> anyhow::Result<Vec<String>> {
        Ok(Vec::new())
    }
}

/// An in-process credit ledger. Every address starts at `starting_balance_cents`
/// the first time it's touched.
pub struct LedgerFunding {
    balances: Mutex<HashMap<String, i64>>,
    starting_balance_cents: i64,
}

impl LedgerFunding {
    pub fn new(starting_balance_cents: i64) -> Self {
        Self {
            balances: Mutex::new(HashMap::new()),
            starting_balance_cents,
        }
    }
}

#[async_trait]
impl FundingContract for LedgerFunding {
    async fn fund_child(&self, address: &str, cents: i64) -> anyhow::Result<FundResult> {
        let mut balances = self.balances.lock().await;
        *balances.entry(address.to_string()).or_insert(self.starting_balance_cents) += cents;
        Ok(FundResult { success: true })
    }

    async fn recall_credits(&self, address: &str) -> anyhow::Result<RecallResult> {
        let mut balances = self.balances.lock().await;
        let balance = balances.entry(address.to_string()).or_insert(self.starting_balance_cents);
        let amount = *balance;
        *balance = 0;
        Ok(RecallResult {
            success: true,
            amount_cents: amount,
        })
    }

    async fn get_balance(&self, address: &str) -> anyhow::Result<i64> {
        let mut balances = self.balances.lock().await;
        Ok(*balances.entry(address.to_string()).or_insert(self.starting_balance_cents))
    }
}

/// Backs `AgentTracker` with the same `DurableStore` children table,
/// rather than a separate heartbeat system — the simplest correct choice
/// for a single-process reference deployment (`contracts::tracker`
/// documents liveness tracking as allowed to live elsewhere; here "elsewhere"
/// is the store itself).
pub struct StoreBackedTracker {
    store: Arc<dyn DurableStore>,
}

impl StoreBackedTracker {
    pub fn new(store: Arc<dyn DurableStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl AgentTracker for StoreBackedTracker {
    async fn get_idle(&self) -> anyhow::Result<Vec<ChildAgent>> {
        Ok(self
            .store
            .get_children()
            .await?
            .into_iter()
            .filter(|c| c.status == ChildStatus::Idle)
            .collect())
    }

    async fn get_best_for_task(&self, role: &str) -> anyhow::Result<Option<ChildAgent>> {
        let children = self.store.get_children().await?;
        Ok(children
            .iter()
            .find(|c| c.status == ChildStatus::Idle && c.role == role)
            .or_else(|| children.iter().find(|c| c.status == ChildStatus::Idle))
            .cloned())
    }

    async fn update_status(&self, address: &str, status: ChildStatus) -> anyhow::Result<()> {
        let mut child = self
            .store
            .get_child_by_address(address)
            .await?
            .ok_or_else(|| anyhow::anyhow!("no such child {address}"))?;
        child.status = status;
        child.last_checked = Utc::now();
        self.store.update_child(child).await
    }

    async fn register(&self, child: NewChild) -> anyhow::Result<ChildAgent> {
        let agent = ChildAgent {
            address: child.address,
            name: child.name,
            role: child.role,
            status: ChildStatus::Starting,
            sandbox_id: child.sandbox_id,
            last_checked: Utc::now(),
        };
        self.store.update_child(agent.clone()).await?;
        Ok(agent)
    }
}
