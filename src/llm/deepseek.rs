//! DeepSeek API 客户端（OpenAI 兼容格式）
//!
//! - Base URL: https://api.deepseek.com
//! - 模型: deepseek-chat (常规对话), deepseek-reasoner (思考模式)

use crate::config::LlmSection;
use crate::llm::OpenAiClient;

pub const DEEPSEEK_BASE_URL: &str = "https://api.deepseek.com";
pub const DEEPSEEK_CHAT: &str = "deepseek-chat";
pub const DEEPSEEK_REASONER: &str = "deepseek-reasoner";

/// 创建 DeepSeek 客户端
///
/// - API Key 优先取 `DEEPSEEK_API_KEY`，其次 `OPENAI_API_KEY`
/// - 配置里的 model 若仍是 OpenAI 模型名（gpt-*），改用 `deepseek-chat`
/// - `[llm] base_url` 可覆盖默认端点
pub fn create_deepseek_client(cfg: &LlmSection) -> OpenAiClient {
    let api_key = std::env::var("DEEPSEEK_API_KEY")
        .ok()
        .or_else(|| std::env::var("OPENAI_API_KEY").ok())
        .unwrap_or_default();

    let model = if cfg.model.starts_with("deepseek") {
        cfg.model.clone()
    } else {
        DEEPSEEK_CHAT.to_string()
    };

    let base_url = cfg.base_url.as_deref().unwrap_or(DEEPSEEK_BASE_URL);
    OpenAiClient::new(Some(base_url), &model, Some(api_key.as_str())).with_params(cfg.into())
}
