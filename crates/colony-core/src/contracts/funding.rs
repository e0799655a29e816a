use async_trait::async_trait;

#[derive(Debug, Clone, Copy)]
pub struct FundResult {
    pub success: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct RecallResult {
    pub success: bool,
    pub amount_cents: i64,
}

/// Credit accounting for child agents. The health monitor tops up
/// `out_of_credits` workers through this contract; it never touches a
/// ledger directly.
#[async_trait]
pub trait FundingContract: Send + Sync {
    async fn fund_child(&self, address: &str, cents: i64) -> anyhow::Result<FundResult>;
    async fn recall_credits(&self, address: &str) -> anyhow::Result<RecallResult>;
    async fn get_balance(&self, address: &str) -> anyhow::Result<i64>;
}

fn _assert_object_safe(_: &dyn FundingContract) {}
