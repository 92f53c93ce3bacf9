//! 服务构建器：按配置一次性创建所有协作组件，CLI 与 HTTP 服务共用
//!
//! 每个组件都可通过 `with_*` 覆盖（测试中注入 Mock）。

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;

use crate::cache::{create_cache_from_config, ResponseCache};
use crate::config::AppConfig;
use crate::llm::{create_embedder_from_config, create_llm_client_from_config, Embedder, LlmClient};
use crate::rag::{create_index_from_config, IngestionPipeline, VectorIndex};
use crate::tools::{create_tool_executor, ToolProvider};
use crate::workflow::{ChatWorkflow, Retriever};

pub struct ServicesBuilder {
    config: AppConfig,
    llm: Option<Arc<dyn LlmClient>>,
    embedder: Option<Arc<dyn Embedder>>,
    index: Option<Arc<dyn VectorIndex>>,
    cache: Option<Arc<dyn ResponseCache>>,
    tools: Option<Arc<dyn ToolProvider>>,
}

impl ServicesBuilder {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            llm: None,
            embedder: None,
            index: None,
            cache: None,
            tools: None,
        }
    }

    pub fn with_llm(mut self, llm: Arc<dyn LlmClient>) -> Self {
        self.llm = Some(llm);
        self
    }

    pub fn with_embedder(mut self, embedder: Arc<dyn Embedder>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    pub fn with_index(mut self, index: Arc<dyn VectorIndex>) -> Self {
        self.index = Some(index);
        self
    }

    pub fn with_cache(mut self, cache: Arc<dyn ResponseCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_tools(mut self, tools: Arc<dyn ToolProvider>) -> Self {
        self.tools = Some(tools);
        self
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// 构建所有组件；缓存或向量库后端配置错误时失败
    pub fn build(self) -> anyhow::Result<Services> {
        let config = self.config;

        let llm = match self.llm {
            Some(llm) => llm,
            None => create_llm_client_from_config(&config.llm),
        };
        let embedder = match self.embedder {
            Some(e) => e,
            None => create_embedder_from_config(&config.embedding),
        };
        let index = match self.index {
            Some(i) => i,
            None => create_index_from_config(&config.vector_store).context("creating vector store")?,
        };
        let cache = match self.cache {
            Some(c) => c,
            None => create_cache_from_config(&config.cache).context("creating response cache")?,
        };
        let tools: Arc<dyn ToolProvider> = match self.tools {
            Some(t) => t,
            None => Arc::new(create_tool_executor(&config.tools)),
        };

        let retriever = Retriever::from_config(Arc::clone(&index), Arc::clone(&embedder), &config.vector_store);
        let workflow = Arc::new(ChatWorkflow::new(
            Arc::clone(&llm),
            Arc::clone(&tools),
            Arc::clone(&cache),
            retriever,
            &config.workflow,
        ));
        let ingestion = Arc::new(IngestionPipeline::new(
            Arc::clone(&index),
            Arc::clone(&embedder),
            config.vector_store.collection.clone(),
            &config.ingestion,
        ));

        tracing::info!(
            llm = llm.name(),
            vector_store = index.backend(),
            cache = cache.name(),
            "[Services] ready"
        );

        Ok(Services {
            config,
            llm,
            embedder,
            index,
            cache,
            tools,
            workflow,
            ingestion,
        })
    }
}

/// 预构建的服务集合，可在多个请求间共享
#[derive(Clone)]
pub struct Services {
    pub config: AppConfig,
    pub llm: Arc<dyn LlmClient>,
    pub embedder: Arc<dyn Embedder>,
    pub index: Arc<dyn VectorIndex>,
    pub cache: Arc<dyn ResponseCache>,
    pub tools: Arc<dyn ToolProvider>,
    pub workflow: Arc<ChatWorkflow>,
    pub ingestion: Arc<IngestionPipeline>,
}

/// 便捷函数：加载配置（失败时使用默认值）并返回构建器
pub fn create_services_builder(config_path: Option<PathBuf>) -> ServicesBuilder {
    let config = crate::config::load_config(config_path).unwrap_or_else(|e| {
        tracing::warn!("Config load failed ({}), using defaults", e);
        AppConfig::default()
    });
    ServicesBuilder::new(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::ChatInput;

    fn offline_config() -> AppConfig {
        let mut config = AppConfig::default();
        config.llm.provider = "mock".into();
        config.embedding.provider = "mock".into();
        config.embedding.dimension = 32;
        config.vector_store.backend = "memory".into();
        config.cache.backend = "memory".into();
        config
    }

    #[tokio::test]
    async fn test_build_offline_services() {
        let services = ServicesBuilder::new(offline_config()).build().unwrap();
        assert_eq!(services.llm.name(), "mock");
        assert_eq!(services.index.backend(), "memory");

        let out = services
            .workflow
            .run(ChatInput::new("u1", "hello there"))
            .await
            .unwrap();
        assert!(!out.response.is_empty());
    }

    #[test]
    fn test_unknown_cache_backend_fails() {
        let mut config = offline_config();
        config.cache.backend = "redis".into();
        assert!(ServicesBuilder::new(config).build().is_err());
    }
}
