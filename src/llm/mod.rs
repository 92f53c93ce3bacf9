//! LLM 层：客户端抽象与实现（OpenAI 兼容 / DeepSeek / Mock）、嵌入、结构化调用

pub mod deepseek;
pub mod embedding;
pub mod message;
pub mod mock;
pub mod openai;
pub mod structured;
pub mod traits;

use std::sync::Arc;

pub use deepseek::{create_deepseek_client, DEEPSEEK_CHAT, DEEPSEEK_REASONER};
pub use embedding::{create_embedder_from_config, Embedder, OpenAiEmbedder};
pub use message::{Message, Role};
pub use mock::{MockEmbedder, MockLlmClient};
pub use openai::{create_openai_client, OpenAiClient, SamplingParams, TokenUsage};
pub use structured::{extract_json_block, structured_call};
pub use traits::{LlmClient, LlmError};

use crate::config::LlmSection;

/// 按 `[llm] provider` 创建客户端；对应 API Key 缺失时退化为 MockLlmClient
pub fn create_llm_client_from_config(cfg: &LlmSection) -> Arc<dyn LlmClient> {
    let has_key = |name: &str| {
        std::env::var(name)
            .map(|v| !v.trim().is_empty())
            .unwrap_or(false)
    };
    match cfg.provider.as_str() {
        "mock" => Arc::new(MockLlmClient::new()),
        "deepseek" if has_key("DEEPSEEK_API_KEY") || has_key("OPENAI_API_KEY") => {
            tracing::info!(model = %cfg.model, "Using DeepSeek LLM");
            Arc::new(create_deepseek_client(cfg))
        }
        "openai" if has_key("OPENAI_API_KEY") => {
            tracing::info!(model = %cfg.model, "Using OpenAI-compatible LLM");
            Arc::new(create_openai_client(cfg))
        }
        other => {
            tracing::warn!(provider = %other, "No API key for LLM provider, using mock client");
            Arc::new(MockLlmClient::new())
        }
    }
}
