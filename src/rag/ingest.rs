//! 文档入库流水线：加载 → 规整 → 按标题再按长度分块 → 嵌入 → 批量写入向量索引
//!
//! 加载失败（读文件、不支持的类型）直接返回错误；嵌入或向量库写入失败不返回 Err，
//! 而是报告 stored_count = 0 并把原因放进 IngestReport.error。

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use thiserror::Error;
use walkdir::WalkDir;

use crate::config::IngestionSection;
use crate::llm::{Embedder, LlmError};
use crate::rag::chunker::{split_by_headers, Chunker, ChunkingConfig};
use crate::rag::loader::{self, Document, FileType};
use crate::rag::{Distance, IndexError, Point, VectorIndex};

pub const CHUNK_STRATEGY: &str = "header_then_recursive";
const NO_CHUNKS: &str = "No chunks to store";

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("unsupported file type: {0}")]
    UnsupportedFileType(String),

    #[error("failed to read document: {0}")]
    Io(#[from] std::io::Error),

    #[error("vector index error: {0}")]
    Index(#[from] IndexError),

    #[error("embedding failed: {0}")]
    Embedding(#[from] LlmError),
}

/// 入库结果（HTTP /ingestion/upload 直接返回）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestReport {
    pub stored_count: usize,
    pub error: Option<String>,
}

/// 已分好的块
#[derive(Debug, Clone)]
pub struct Chunk {
    pub content: String,
    pub metadata: Map<String, Value>,
}

/// 入库流水线：持有向量索引与嵌入提供方
pub struct IngestionPipeline {
    index: Arc<dyn VectorIndex>,
    embedder: Arc<dyn Embedder>,
    collection: String,
    chunker: Chunker,
    upsert_batch: usize,
}

impl IngestionPipeline {
    pub fn new(
        index: Arc<dyn VectorIndex>,
        embedder: Arc<dyn Embedder>,
        collection: impl Into<String>,
        cfg: &IngestionSection,
    ) -> Self {
        Self {
            index,
            embedder,
            collection: collection.into(),
            chunker: Chunker::new(ChunkingConfig::new(cfg.chunk_size, cfg.chunk_overlap)),
            upsert_batch: cfg.upsert_batch.max(1),
        }
    }

    /// 先按 # / ## / ### 切节，再对每节定长切分；每块合并文档元数据与标题、位置信息
    pub fn chunk_documents(&self, documents: &[Document]) -> Vec<Chunk> {
        let mut chunks = Vec::new();
        for doc in documents {
            for (section_index, section) in split_by_headers(&doc.content).iter().enumerate() {
                let pieces = self.chunker.split(&section.content);
                let total = pieces.len();
                for (chunk_index, content) in pieces.into_iter().enumerate() {
                    let mut metadata = doc.metadata.clone();
                    for (level, title) in &section.headers {
                        metadata.insert(format!("h{}", level), json!(title));
                    }
                    metadata.insert("section_index".into(), json!(section_index));
                    metadata.insert("chunk_strategy".into(), json!(CHUNK_STRATEGY));
                    metadata.insert("chunk_index".into(), json!(chunk_index));
                    metadata.insert("total_chunks_in_section".into(), json!(total));
                    metadata.insert("chunk_size".into(), json!(content.chars().count()));
                    chunks.push(Chunk { content, metadata });
                }
            }
        }
        chunks
    }

    /// 对已加载的文档分块、嵌入、写入
    pub async fn ingest_documents(&self, documents: &[Document]) -> Result<IngestReport, IngestError> {
        let chunks = self.chunk_documents(documents);
        if chunks.is_empty() {
            tracing::warn!("[Ingest] {}", NO_CHUNKS);
            return Ok(IngestReport {
                stored_count: 0,
                error: Some(NO_CHUNKS.to_string()),
            });
        }

        match self.embed_and_store(chunks).await {
            Ok(stored) => {
                tracing::info!(
                    collection = %self.collection,
                    stored,
                    backend = self.index.backend(),
                    "[Ingest] stored chunks"
                );
                Ok(IngestReport {
                    stored_count: stored,
                    error: None,
                })
            }
            Err(e) => {
                tracing::error!(error = %e, collection = %self.collection, "[Ingest] store failed");
                Ok(IngestReport {
                    stored_count: 0,
                    error: Some(e.to_string()),
                })
            }
        }
    }

    /// 建集合、全部嵌入后分批写入；任何一步失败整次入库视为失败
    async fn embed_and_store(&self, chunks: Vec<Chunk>) -> Result<usize, IngestError> {
        self.index
            .ensure_collection(&self.collection, self.embedder.dimension(), Distance::Cosine)
            .await?;

        let mut points = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            let vector = self.embedder.embed(&chunk.content).await?;
            points.push(Point {
                id: uuid::Uuid::new_v4().to_string(),
                vector,
                payload: json!({ "content": chunk.content, "metadata": chunk.metadata }),
            });
        }

        let total = points.len();
        let mut points = points;
        while !points.is_empty() {
            let rest = points.split_off(self.upsert_batch.min(points.len()));
            self.index.upsert(&self.collection, points).await?;
            points = rest;
        }
        Ok(total)
    }

    /// 上传的文件：file_name 决定类型
    pub async fn ingest_bytes(&self, file_name: &str, bytes: &[u8]) -> Result<IngestReport, IngestError> {
        let docs = loader::load_bytes(file_name, bytes)?;
        tracing::info!(file = %file_name, documents = docs.len(), "[Ingest] loaded upload");
        self.ingest_documents(&docs).await
    }

    pub async fn ingest_file(&self, path: &Path) -> Result<IngestReport, IngestError> {
        let docs = loader::load_file(path).await?;
        tracing::info!(file = %path.display(), documents = docs.len(), "[Ingest] loaded file");
        self.ingest_documents(&docs).await
    }

    /// 文件直接入库；目录递归遍历，只处理支持的扩展名
    pub async fn ingest_path(&self, path: &Path) -> Vec<(PathBuf, Result<IngestReport, IngestError>)> {
        if path.is_file() {
            return vec![(path.to_path_buf(), self.ingest_file(path).await)];
        }
        let files: Vec<PathBuf> = WalkDir::new(path)
            .follow_links(false)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| e.into_path())
            .filter(|p| FileType::from_name(&p.to_string_lossy()).is_some())
            .collect();

        let mut results = Vec::with_capacity(files.len());
        for file in files {
            let report = self.ingest_file(&file).await;
            results.push((file, report));
        }
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockEmbedder;
    use crate::rag::{InMemoryIndex, Passage};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// 第 fail_at 次 upsert 起失败，其余委托给内存索引
    struct FlakyIndex {
        inner: InMemoryIndex,
        upserts: AtomicUsize,
        fail_at: usize,
    }

    #[async_trait]
    impl VectorIndex for FlakyIndex {
        async fn ensure_collection(&self, name: &str, size: usize, distance: Distance) -> Result<(), IndexError> {
            self.inner.ensure_collection(name, size, distance).await
        }

        async fn upsert(&self, collection: &str, points: Vec<Point>) -> Result<(), IndexError> {
            if self.upserts.fetch_add(1, Ordering::SeqCst) + 1 >= self.fail_at {
                return Err(IndexError::Request("down".into()));
            }
            self.inner.upsert(collection, points).await
        }

        async fn search(&self, collection: &str, query: &[f32], k: usize, threshold: f32) -> Result<Vec<Passage>, IndexError> {
            self.inner.search(collection, query, k, threshold).await
        }

        async fn delete_collection(&self, name: &str) -> Result<(), IndexError> {
            self.inner.delete_collection(name).await
        }

        async fn ping(&self) -> Result<(), IndexError> {
            Ok(())
        }

        fn backend(&self) -> &'static str {
            "flaky"
        }
    }

    struct BrokenEmbedder;

    #[async_trait]
    impl Embedder for BrokenEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>, LlmError> {
            Err(LlmError::Request("quota exceeded".into()))
        }

        fn dimension(&self) -> usize {
            32
        }
    }

    fn five_paragraphs() -> String {
        (0..5)
            .map(|i| format!("Paragraph {} about quarterly margins.", i))
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    fn pipeline(index: Arc<InMemoryIndex>, batch: usize) -> IngestionPipeline {
        let cfg = IngestionSection {
            chunk_size: 80,
            chunk_overlap: 10,
            upsert_batch: batch,
        };
        IngestionPipeline::new(index, Arc::new(MockEmbedder::new(32)), "documents", &cfg)
    }

    #[tokio::test]
    async fn test_ingest_markdown_metadata() {
        let index = Arc::new(InMemoryIndex::new());
        let p = pipeline(index.clone(), 64);
        let md = "# Apple 10-K\n## Risks\nSupply chain concentration in Asia.\n## Outlook\nServices growth continues.";
        let report = p.ingest_bytes("aapl.md", md.as_bytes()).await.unwrap();
        assert_eq!(
            report,
            IngestReport {
                stored_count: 2,
                error: None
            }
        );
        assert_eq!(index.len("documents").await, 2);

        let docs = loader::load_bytes("aapl.md", md.as_bytes()).unwrap();
        let chunks = p.chunk_documents(&docs);
        let m = &chunks[1].metadata;
        assert_eq!(m["h1"], "Apple 10-K");
        assert_eq!(m["h2"], "Outlook");
        assert_eq!(m["section_index"], 1);
        assert_eq!(m["chunk_index"], 0);
        assert_eq!(m["total_chunks_in_section"], 1);
        assert_eq!(m["chunk_strategy"], CHUNK_STRATEGY);
        assert_eq!(m["source"], "aapl.md");
    }

    #[tokio::test]
    async fn test_empty_document_reports_no_chunks() {
        let p = pipeline(Arc::new(InMemoryIndex::new()), 64);
        let report = p.ingest_bytes("empty.txt", b"   \n\n ").await.unwrap();
        assert_eq!(report.stored_count, 0);
        assert_eq!(report.error.as_deref(), Some(NO_CHUNKS));
    }

    #[tokio::test]
    async fn test_batches_cover_all_chunks() {
        let index = Arc::new(InMemoryIndex::new());
        let p = pipeline(index.clone(), 2);
        let report = p.ingest_bytes("notes.txt", five_paragraphs().as_bytes()).await.unwrap();
        assert_eq!(report.stored_count, 5);
        assert_eq!(index.len("documents").await, 5);
    }

    #[tokio::test]
    async fn test_failed_batch_reports_zero_stored() {
        let index = Arc::new(FlakyIndex {
            inner: InMemoryIndex::new(),
            upserts: AtomicUsize::new(0),
            fail_at: 2,
        });
        let cfg = IngestionSection {
            chunk_size: 80,
            chunk_overlap: 10,
            upsert_batch: 2,
        };
        let p = IngestionPipeline::new(index.clone(), Arc::new(MockEmbedder::new(32)), "documents", &cfg);

        let report = p.ingest_bytes("notes.txt", five_paragraphs().as_bytes()).await.unwrap();
        assert_eq!(report.stored_count, 0);
        assert!(report.error.unwrap().contains("down"));
        assert_eq!(index.upserts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_embedding_failure_is_reported_not_raised() {
        let index = Arc::new(InMemoryIndex::new());
        let cfg = IngestionSection {
            chunk_size: 80,
            chunk_overlap: 10,
            upsert_batch: 64,
        };
        let p = IngestionPipeline::new(index.clone(), Arc::new(BrokenEmbedder), "documents", &cfg);

        let report = p.ingest_bytes("notes.txt", b"Revenue was flat.").await.unwrap();
        assert_eq!(report.stored_count, 0);
        assert!(report.error.unwrap().contains("quota exceeded"));
        assert_eq!(index.len("documents").await, 0);
    }

    #[tokio::test]
    async fn test_ingest_path_walks_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "Revenue was flat.").unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();
        std::fs::write(dir.path().join("nested/b.md"), "# Title\nbody").unwrap();
        std::fs::write(dir.path().join("skip.pdf"), "binary").unwrap();

        let p = pipeline(Arc::new(InMemoryIndex::new()), 64);
        let results = p.ingest_path(dir.path()).await;
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|(_, r)| r.as_ref().unwrap().stored_count == 1));
    }

    #[tokio::test]
    async fn test_unsupported_upload() {
        let p = pipeline(Arc::new(InMemoryIndex::new()), 64);
        let err = p.ingest_bytes("report.pdf", b"%PDF").await.unwrap_err();
        assert!(matches!(err, IngestError::UnsupportedFileType(_)));
    }
}
