//! LLM 客户端抽象
//!
//! 所有后端（OpenAI 兼容 / DeepSeek / Mock）实现 LlmClient::complete；Planner、Supervisor 与生成 Agent 只依赖该 trait。

use async_trait::async_trait;
use thiserror::Error;

use crate::llm::Message;

/// LLM 调用错误
#[derive(Debug, Error)]
pub enum LlmError {
    /// 网络、鉴权、超时或构造请求失败
    #[error("LLM request failed: {0}")]
    Request(String),

    #[error("LLM returned an empty response")]
    EmptyResponse,

    /// 输出无法解析为期望的结构
    #[error("LLM output is invalid: {0}")]
    InvalidOutput(String),
}

/// LLM 客户端 trait
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// 非流式完成，返回首条 choice 的文本
    async fn complete(&self, messages: &[Message]) -> Result<String, LlmError>;

    /// 获取累计 token 使用统计：(prompt_tokens, completion_tokens, total_tokens)
    /// 默认返回 (0, 0, 0)，具体实现可覆盖
    fn token_usage(&self) -> (u64, u64, u64) {
        (0, 0, 0)
    }

    /// 后端名称，用于日志与健康检查
    fn name(&self) -> &str {
        "llm"
    }
}
