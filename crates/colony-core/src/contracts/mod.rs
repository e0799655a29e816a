//! External interfaces: the five contracts the core calls out through.
//!
//! Each is an object-safe, `Send + Sync`, `#[async_trait]` trait so an
//! orchestrator can be constructed from `Arc<dyn Trait>` parameters
//! instead of reaching for module-level singletons. `colony-store` ships
//! the one real `DurableStore` implementation this workspace carries;
//! `colony-test-utils` ships fakes for the other four.

mod funding;
mod inference;
mod store;
mod tracker;
mod transport;

pub use funding::{FundResult, FundingContract, RecallResult};
pub use inference::{ChatMessage, ChatRequest, ChatResponse, InferenceClient, ToolCall, Usage};
pub use store::DurableStore;
pub use tracker::{AgentTracker, NewChild};
pub use transport::Transport;
