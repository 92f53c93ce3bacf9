//! RAG 层：文档加载、分块、向量索引（Qdrant / 内存）与入库流水线

pub mod chunker;
pub mod index;
pub mod ingest;
pub mod loader;
pub mod qdrant;

use std::sync::Arc;

pub use chunker::{split_by_headers, Chunker, ChunkingConfig, Section};
pub use index::{cosine_similarity, Distance, InMemoryIndex, IndexError, Passage, Point, VectorIndex};
pub use ingest::{IngestError, IngestReport, IngestionPipeline};
pub use loader::{convert_to_markdown, Document, FileType};
pub use qdrant::QdrantIndex;

use crate::config::VectorStoreSection;

/// 按 `[vector_store] backend` 创建索引
pub fn create_index_from_config(cfg: &VectorStoreSection) -> Result<Arc<dyn VectorIndex>, IndexError> {
    match cfg.backend.as_str() {
        "memory" => Ok(Arc::new(InMemoryIndex::new())),
        "qdrant" => Ok(Arc::new(QdrantIndex::from_config(cfg)?)),
        other => Err(IndexError::Request(format!("unknown vector store backend: {}", other))),
    }
}
