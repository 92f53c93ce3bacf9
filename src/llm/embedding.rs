//! 嵌入 API：供检索与文档入库使用，调用 OpenAI 兼容的 /embeddings 端点

use std::sync::Arc;

use async_openai::config::OpenAIConfig;
use async_openai::types::embeddings::{CreateEmbeddingRequestArgs, EmbeddingInput};
use async_openai::Client;
use async_trait::async_trait;

use crate::config::EmbeddingSection;
use crate::llm::{LlmError, MockEmbedder};

/// 嵌入提供方：文本 → 定长向量
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError>;

    /// 输出向量维度（用于创建集合）
    fn dimension(&self) -> usize;
}

/// 使用 async-openai 调用 OpenAI 兼容的 embeddings API
#[derive(Clone)]
pub struct OpenAiEmbedder {
    client: Client<OpenAIConfig>,
    model: String,
    dimension: usize,
}

impl OpenAiEmbedder {
    /// 与 LLM 共用 OPENAI_API_KEY；base_url 为空时走官方端点
    pub fn new(base_url: Option<&str>, model: &str, api_key: Option<&str>, dimension: usize) -> Self {
        let api_key = api_key
            .map(String::from)
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
            .unwrap_or_default();

        let config = if let Some(url) = base_url {
            OpenAIConfig::new().with_api_base(url).with_api_key(api_key)
        } else {
            OpenAIConfig::new().with_api_key(api_key)
        };

        Self {
            client: Client::with_config(config),
            model: model.to_string(),
            dimension,
        }
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(LlmError::InvalidOutput("cannot embed empty text".into()));
        }
        let request = CreateEmbeddingRequestArgs::default()
            .model(&self.model)
            .input(EmbeddingInput::String(text.to_string()))
            .build()
            .map_err(|e| LlmError::Request(e.to_string()))?;
        let response = self
            .client
            .embeddings()
            .create(request)
            .await
            .map_err(|e| LlmError::Request(e.to_string()))?;
        response
            .data
            .into_iter()
            .next()
            .map(|e| e.embedding)
            .ok_or(LlmError::EmptyResponse)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// 从 `[embedding]` 配置创建嵌入提供方
///
/// provider = "mock" 或未设置 OPENAI_API_KEY 时退化为本地确定性的 MockEmbedder。
pub fn create_embedder_from_config(cfg: &EmbeddingSection) -> Arc<dyn Embedder> {
    let key = std::env::var("OPENAI_API_KEY").ok().filter(|k| !k.trim().is_empty());
    match (cfg.provider.as_str(), key) {
        ("mock", _) => Arc::new(MockEmbedder::new(cfg.dimension)),
        (_, None) => {
            tracing::warn!("OPENAI_API_KEY not set, falling back to mock embedder");
            Arc::new(MockEmbedder::new(cfg.dimension))
        }
        (_, Some(key)) => Arc::new(OpenAiEmbedder::new(
            cfg.base_url.as_deref(),
            &cfg.model,
            Some(key.as_str()),
            cfg.dimension,
        )),
    }
}
