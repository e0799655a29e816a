//! Shared fakes and fixtures for colony integration tests.
//!
//! The corpus's own `gator-test-utils` wraps a real, disposable Postgres
//! instance per test; this workspace's core never talks to a database
//! directly; the contract it drives instead is `DurableStore`, already
//! satisfied in-process by `colony-store::MemoryStore`. What integration
//! tests still need faked are the other four contracts — inference,
//! transport, funding, and the agent tracker — since none of them have a
//! reference implementation in this workspace. Each fake here is a small
//! `Mutex`-guarded struct, scriptable enough for `colony-core/tests/` to
//! assert on what the orchestrator sent/spent/assigned.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use colony_core::contracts::{
    AgentTracker, ChatRequest, ChatResponse, DurableStore, FundResult, FundingContract,
    InferenceClient, NewChild, RecallResult, Transport, Usage,
};
use colony_core::model::{ChildAgent, ChildStatus};
use tokio::sync::Mutex;

/// Replays a scripted queue of [`ChatResponse`]s, falling back to an
/// empty JSON object once the queue is drained so a test that only cares
/// about the first few calls doesn't have to script every one.
pub struct FakeInferenceClient {
    queue: Mutex<VecDeque<ChatResponse>>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl FakeInferenceClient {
    pub fn new() -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Queue a response whose `content` is the given JSON-shaped string.
    pub fn push_json(&self, content: impl Into<String>) {
        let response = ChatResponse {
            content: content.into(),
            tool_calls: Vec::new(),
            usage: Usage::default(),
        };
        self.queue.try_lock().expect("uncontended in test setup").push_back(response);
    }

    pub async fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().await.clone()
    }
}

impl Default for FakeInferenceClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl InferenceClient for FakeInferenceClient {
    async fn chat(&self, request: ChatRequest) -> anyhow::Result<ChatResponse> {
        self.requests.lock().await.push(request);
        let mut queue = self.queue.lock().await;
        Ok(queue.pop_front().unwrap_or_else(|| ChatResponse {
            content: "{}".to_string(),
            tool_calls: Vec::new(),
            usage: Usage::default(),
        }))
    }
}

/// Records every envelope handed to `deliver` instead of sending it
/// anywhere. `fail_for` lets a test force delivery failures for specific
/// recipients, to exercise the messaging layer's retry/backoff path.
pub struct FakeTransport {
    delivered: Mutex<Vec<(String, String)>>,
    fail_for: Mutex<Vec<String>>,
    recipients: Mutex<Vec<String>>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self {
            delivered: Mutex::new(Vec::new()),
            fail_for: Mutex::new(Vec::new()),
            recipients: Mutex::new(Vec::new()),
        }
    }

    pub async fn add_recipient(&self, address: impl Into<String>) {
        self.recipients.lock().await.push(address.into());
    }

    pub async fn set_failing(&self, address: impl Into<String>) {
        self.fail_for.lock().await.push(address.into());
    }

    pub async fn delivered(&self) -> Vec<(String, String)> {
        self.delivered.lock().await.clone()
    }
}

impl Default for FakeTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn deliver(&self, to: &str, envelope: &str) -> anyhow::Result<()> {
        if self.fail_for.lock().await.iter().any(|addr| addr == to) {
            anyhow::bail!("fake transport configured to fail delivery to {to}");
        }
        self.delivered.lock().await.push((to.to_string(), envelope.to_string()));
        Ok(())
    }

    async fn get_recipients(&self) -> anyhow::Result<Vec<String>> {
        Ok(self.recipients.lock().await.clone())
    }
}

/// An in-memory treasury. Balances default to zero; seed with
/// [`FakeFundingContract::set_balance`] before running a scenario.
pub struct FakeFundingContract {
    balances: Mutex<HashMap<String, i64>>,
    transfers: Mutex<Vec<(String, i64)>>,
}

impl FakeFundingContract {
    pub fn new() -> Self {
        Self {
            balances: Mutex::new(HashMap::new()),
            transfers: Mutex::new(Vec::new()),
        }
    }

    pub async fn set_balance(&self, address: impl Into<String>, cents: i64) {
        self.balances.lock().await.insert(address.into(), cents);
    }

    pub async fn transfers(&self) -> Vec<(String, i64)> {
        self.transfers.lock().await.clone()
    }
}

impl Default for FakeFundingContract {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FundingContract for FakeFundingContract {
    async fn fund_child(&self, address: &str, cents: i64) -> anyhow::Result<FundResult> {
        let mut balances = self.balances.lock().await;
        *balances.entry(address.to_string()).or_insert(0) += cents;
        self.transfers.lock().await.push((address.to_string(), cents));
        Ok(FundResult { success: true })
    }

    async fn recall_credits(&self, address: &str) -> anyhow::Result<RecallResult> {
        let mut balances = self.balances.lock().await;
        let balance = balances.entry(address.to_string()).or_insert(0);
        let amount = *balance;
        *balance = 0;
        Ok(RecallResult {
            success: true,
            amount_cents: amount,
        })
    }

    async fn get_balance(&self, address: &str) -> anyhow::Result<i64> {
        Ok(*self.balances.lock().await.get(address).unwrap_or(&0))
    }
}

/// A directory of child agents a test seeds up front, mutated only
/// through `update_status`/`register` the way the real contract would be.
pub struct FakeAgentTracker {
    children: Mutex<Vec<ChildAgent>>,
}

impl FakeAgentTracker {
    pub fn new() -> Self {
        Self {
            children: Mutex::new(Vec::new()),
        }
    }

    pub async fn seed(&self, child: ChildAgent) {
        self.children.lock().await.push(child);
    }

    pub async fn all(&self) -> Vec<ChildAgent> {
        self.children.lock().await.clone()
    }
}

impl Default for FakeAgentTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Builds a `ChildAgent` with sensible test defaults.
pub fn test_child(address: &str, role: &str, status: ChildStatus) -> ChildAgent {
    ChildAgent {
        address: address.to_string(),
        name: address.to_string(),
        role: role.to_string(),
        status,
        sandbox_id: None,
        last_checked: Utc::now(),
    }
}

#[async_trait]
impl AgentTracker for FakeAgentTracker {
    async fn get_idle(&self) -> anyhow::Result<Vec<ChildAgent>> {
        Ok(self
            .children
            .lock()
            .await
            .iter()
            .filter(|c| c.status == ChildStatus::Idle)
            .cloned()
            .collect())
    }

    async fn get_best_for_task(&self, role: &str) -> anyhow::Result<Option<ChildAgent>> {
        let children = self.children.lock().await;
        Ok(children
            .iter()
            .find(|c| c.status == ChildStatus::Idle && c.role == role)
            .or_else(|| children.iter().find(|c| c.status == ChildStatus::Idle))
            .cloned())
    }

    async fn update_status(&self, address: &str, status: ChildStatus) -> anyhow::Result<()> {
        let mut children = self.children.lock().await;
        let child = children
            .iter_mut()
            .find(|c| c.address == address)
            .ok_or_else(|| anyhow::anyhow!("no such child {address}"))?;
        child.status = status;
        child.last_checked = Utc::now();
        Ok(())
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
        self.children.lock().await.push(agent.clone());
        Ok(agent)
    }
}

/// Bundles an in-memory store with fakes for the other four contracts,
/// the way a test needs them wired to construct an `Orchestrator` or
/// `HealthMonitor` in one call.
pub struct Harness {
    pub store: Arc<dyn DurableStore>,
    pub inference: Arc<FakeInferenceClient>,
    pub transport: Arc<FakeTransport>,
    pub funding: Arc<FakeFundingContract>,
    pub tracker: Arc<FakeAgentTracker>,
}

impl Harness {
    pub fn new() -> Self {
        Self {
            store: colony_store::MemoryStore::new(),
            inference: Arc::new(FakeInferenceClient::new()),
            transport: Arc::new(FakeTransport::new()),
            funding: Arc::new(FakeFundingContract::new()),
            tracker: Arc::new(FakeAgentTracker::new()),
        }
    }
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fake_transport_records_deliveries_and_honors_failures() {
        let transport = FakeTransport::new();
        transport.deliver("worker-1", "hello").await.unwrap();
        assert_eq!(transport.delivered().await, vec![("worker-1".to_string(), "hello".to_string())]);

        transport.set_failing("worker-2").await;
        assert!(transport.deliver("worker-2", "hello").await.is_err());
    }

    #[tokio::test]
    async fn fake_funding_tracks_balance_and_transfers() {
        let funding = FakeFundingContract::new();
        funding.set_balance("worker-1", 100).await;
        funding.fund_child("worker-1", 50).await.unwrap();
        assert_eq!(funding.get_balance("worker-1").await.unwrap(), 150);
        assert_eq!(funding.transfers().await, vec![("worker-1".to_string(), 50)]);
    }

    #[tokio::test]
    async fn fake_tracker_prefers_idle_matching_role() {
        let tracker = FakeAgentTracker::new();
        tracker.seed(test_child("w1", "researcher", ChildStatus::Busy)).await;
        tracker.seed(test_child("w2", "generalist", ChildStatus::Idle)).await;

        let best = tracker.get_best_for_task("researcher").await.unwrap();
        assert_eq!(best.unwrap().address, "w2");
    }
}
