use async_trait::async_trait;

/// Message delivery. The concrete transport (local DB row, network relay,
/// ...) is out of scope; the core only needs a recipient address and an
/// already-serialized envelope string.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn deliver(&self, to: &str, envelope: &str) -> anyhow::Result<()>;
    async fn get_recipients(&self) -> anyhow::Result<Vec<String>>;
}

fn _assert_object_safe(_: &dyn Transport) {}
