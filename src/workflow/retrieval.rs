//! 检索阶段：向量库 top-K 召回；失败只记日志，不中断请求

use std::sync::Arc;

use crate::config::VectorStoreSection;
use crate::llm::Embedder;
use crate::rag::VectorIndex;
use crate::workflow::state::RetrievedDocs;

pub struct Retriever {
    index: Arc<dyn VectorIndex>,
    embedder: Arc<dyn Embedder>,
    collection: String,
    top_k: usize,
    score_threshold: f32,
}

impl Retriever {
    pub fn new(
        index: Arc<dyn VectorIndex>,
        embedder: Arc<dyn Embedder>,
        collection: impl Into<String>,
        top_k: usize,
        score_threshold: f32,
    ) -> Self {
        Self {
            index,
            embedder,
            collection: collection.into(),
            top_k,
            score_threshold,
        }
    }

    pub fn from_config(
        index: Arc<dyn VectorIndex>,
        embedder: Arc<dyn Embedder>,
        cfg: &VectorStoreSection,
    ) -> Self {
        Self::new(index, embedder, cfg.collection.clone(), cfg.top_k, cfg.score_threshold)
    }

    pub async fn retrieve(&self, query: &str) -> RetrievedDocs {
        let embedding = match self.embedder.embed(query).await {
            Ok(v) => v,
            Err(e) => {
                tracing::error!(error = %e, "[Retrieval] embedding failed");
                return RetrievedDocs::Failed;
            }
        };
        match self
            .index
            .search(&self.collection, &embedding, self.top_k, self.score_threshold)
            .await
        {
            Ok(passages) if passages.is_empty() => {
                tracing::info!("[Retrieval] no documents above threshold");
                RetrievedDocs::NoMatches
            }
            Ok(passages) => {
                tracing::info!(count = passages.len(), "[Retrieval] documents found");
                RetrievedDocs::Found(passages)
            }
            Err(e) => {
                tracing::error!(collection = %self.collection, error = %e, "[Retrieval] search failed");
                RetrievedDocs::Failed
            }
        }
    }
}
