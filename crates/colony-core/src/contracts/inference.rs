use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One turn in a chat-style prompt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

/// Input to [`InferenceClient::chat`]. `tier` carries the survival-tier
/// annotation (`high`/`normal`/`low_compute`/`critical`/`dead`); the core
/// only forwards it, it never interprets it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    pub model: Option<String>,
    pub tier: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub tools: Option<Value>,
    pub response_format: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub name: String,
    pub arguments: Value,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub total_tokens: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    pub content: String,
    #[serde(default)]
    pub tool_calls: Vec<ToolCall>,
    pub usage: Usage,
}

/// LLM inference: a single `chat` call. Provider selection, streaming,
/// circuit breaking, and retry-on-429/5xx live entirely in the
/// implementation; the core awaits one call per classify/plan/replan
/// step and treats failures it receives as already-exhausted.
#[async_trait]
pub trait InferenceClient: Send + Sync {
    async fn chat(&self, request: ChatRequest) -> anyhow::Result<ChatResponse>;
}

fn _assert_object_safe(_: &dyn InferenceClient) {}
