//! 向量索引抽象与进程内实现
//!
//! VectorIndex 覆盖检索与入库所需的全部操作：ensure_collection / upsert / search / delete_collection / ping。
//! Qdrant 实现见 `rag::qdrant`；InMemoryIndex 用于测试与无外部依赖的本地运行。

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;

#[derive(Debug, Error)]
pub enum IndexError {
    /// 网络或连接错误
    #[error("vector index request failed: {0}")]
    Request(String),

    /// 服务端返回非成功状态码
    #[error("vector index returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("failed to decode vector index response: {0}")]
    Decode(String),

    #[error("vector dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

/// 距离度量
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Distance {
    Cosine,
    Dot,
    Euclid,
}

/// 待写入的点：id + 向量 + payload
#[derive(Debug, Clone)]
pub struct Point {
    pub id: String,
    pub vector: Vec<f32>,
    pub payload: serde_json::Value,
}

/// 检索命中的段落
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Passage {
    pub content: String,
    #[serde(default)]
    pub metadata: serde_json::Value,
    pub score: f32,
}

impl Passage {
    /// 从 `{content, metadata}` payload 构造；缺少 content 时返回 None
    pub fn from_payload(payload: &serde_json::Value, score: f32) -> Option<Self> {
        let content = payload.get("content")?.as_str()?.to_string();
        let metadata = payload
            .get("metadata")
            .cloned()
            .unwrap_or(serde_json::Value::Null);
        Some(Self {
            content,
            metadata,
            score,
        })
    }
}

#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// 集合不存在时创建；已存在则不做任何事
    async fn ensure_collection(
        &self,
        name: &str,
        vector_size: usize,
        distance: Distance,
    ) -> Result<(), IndexError>;

    async fn upsert(&self, collection: &str, points: Vec<Point>) -> Result<(), IndexError>;

    /// 返回得分 ≥ score_threshold 的前 k 个结果，最相似在前
    async fn search(
        &self,
        collection: &str,
        query: &[f32],
        k: usize,
        score_threshold: f32,
    ) -> Result<Vec<Passage>, IndexError>;

    async fn delete_collection(&self, name: &str) -> Result<(), IndexError>;

    /// 健康检查
    async fn ping(&self) -> Result<(), IndexError>;

    /// 后端名称，用于日志与健康检查
    fn backend(&self) -> &'static str;
}

/// 余弦相似度；长度不同或含零向量时返回 0
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

fn score(distance: Distance, a: &[f32], b: &[f32]) -> f32 {
    match distance {
        Distance::Cosine => cosine_similarity(a, b),
        Distance::Dot => a.iter().zip(b.iter()).map(|(x, y)| x * y).sum(),
        // 与 Qdrant 一致：欧氏距离越小越相似，取负值作为得分
        Distance::Euclid => -a
            .iter()
            .zip(b.iter())
            .map(|(x, y)| (x - y) * (x - y))
            .sum::<f32>()
            .sqrt(),
    }
}

struct Collection {
    vector_size: usize,
    distance: Distance,
    /// id → (vector, payload)；保留插入顺序用于同分排序
    points: Vec<(String, Vec<f32>, serde_json::Value)>,
}

/// 进程内向量索引
#[derive(Default)]
pub struct InMemoryIndex {
    collections: RwLock<HashMap<String, Collection>>,
}

impl InMemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self, collection: &str) -> usize {
        self.collections
            .read()
            .await
            .get(collection)
            .map(|c| c.points.len())
            .unwrap_or(0)
    }
}

#[async_trait]
impl VectorIndex for InMemoryIndex {
    async fn ensure_collection(
        &self,
        name: &str,
        vector_size: usize,
        distance: Distance,
    ) -> Result<(), IndexError> {
        let mut collections = self.collections.write().await;
        collections
            .entry(name.to_string())
            .or_insert_with(|| Collection {
                vector_size,
                distance,
                points: Vec::new(),
            });
        Ok(())
    }

    async fn upsert(&self, collection: &str, points: Vec<Point>) -> Result<(), IndexError> {
        let mut collections = self.collections.write().await;
        let coll = collections
            .get_mut(collection)
            .ok_or_else(|| IndexError::Status {
                status: 404,
                body: format!("collection {} not found", collection),
            })?;
        for p in points {
            if p.vector.len() != coll.vector_size {
                return Err(IndexError::DimensionMismatch {
                    expected: coll.vector_size,
                    actual: p.vector.len(),
                });
            }
            match coll.points.iter_mut().find(|(id, _, _)| *id == p.id) {
                Some(existing) => *existing = (p.id, p.vector, p.payload),
                None => coll.points.push((p.id, p.vector, p.payload)),
            }
        }
        Ok(())
    }

    async fn search(
        &self,
        collection: &str,
        query: &[f32],
        k: usize,
        score_threshold: f32,
    ) -> Result<Vec<Passage>, IndexError> {
        let collections = self.collections.read().await;
        let Some(coll) = collections.get(collection) else {
            return Err(IndexError::Status {
                status: 404,
                body: format!("collection {} not found", collection),
            });
        };
        if query.len() != coll.vector_size {
            return Err(IndexError::DimensionMismatch {
                expected: coll.vector_size,
                actual: query.len(),
            });
        }

        let mut scored: Vec<(f32, &serde_json::Value)> = coll
            .points
            .iter()
            .map(|(_, v, payload)| (score(coll.distance, query, v), payload))
            .filter(|(s, _)| *s >= score_threshold)
            .collect();
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

        Ok(scored
            .into_iter()
            .take(k)
            .filter_map(|(s, payload)| Passage::from_payload(payload, s))
            .collect())
    }

    async fn delete_collection(&self, name: &str) -> Result<(), IndexError> {
        self.collections.write().await.remove(name);
        Ok(())
    }

    async fn ping(&self) -> Result<(), IndexError> {
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn point(id: &str, vector: Vec<f32>, content: &str) -> Point {
        Point {
            id: id.to_string(),
            vector,
            payload: json!({"content": content, "metadata": {"source": "t.txt"}}),
        }
    }

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 2.0]), 0.0);
    }

    #[tokio::test]
    async fn test_search_threshold_and_order() {
        let index = InMemoryIndex::new();
        index
            .ensure_collection("documents", 2, Distance::Cosine)
            .await
            .unwrap();
        index
            .upsert(
                "documents",
                vec![
                    point("a", vec![1.0, 0.0], "exact"),
                    point("b", vec![0.9, 0.1], "close"),
                    point("c", vec![0.0, 1.0], "far"),
                ],
            )
            .await
            .unwrap();

        let hits = index
            .search("documents", &[1.0, 0.0], 5, 0.8)
            .await
            .unwrap();
        let contents: Vec<_> = hits.iter().map(|p| p.content.as_str()).collect();
        assert_eq!(contents, vec!["exact", "close"]);
        assert_eq!(hits[0].metadata["source"], "t.txt");

        let top1 = index.search("documents", &[1.0, 0.0], 1, 0.0).await.unwrap();
        assert_eq!(top1.len(), 1);
    }

    #[tokio::test]
    async fn test_dimension_mismatch_and_missing_collection() {
        let index = InMemoryIndex::new();
        assert!(matches!(
            index.search("nope", &[1.0], 5, 0.0).await,
            Err(IndexError::Status { status: 404, .. })
        ));
        index.ensure_collection("d", 3, Distance::Cosine).await.unwrap();
        let err = index
            .upsert("d", vec![point("x", vec![1.0], "bad")])
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            IndexError::DimensionMismatch {
                expected: 3,
                actual: 1
            }
        ));
    }

    #[tokio::test]
    async fn test_upsert_replaces_same_id() {
        let index = InMemoryIndex::new();
        index.ensure_collection("d", 2, Distance::Cosine).await.unwrap();
        index.upsert("d", vec![point("x", vec![1.0, 0.0], "v1")]).await.unwrap();
        index.upsert("d", vec![point("x", vec![1.0, 0.0], "v2")]).await.unwrap();
        assert_eq!(index.len("d").await, 1);
        let hits = index.search("d", &[1.0, 0.0], 5, 0.0).await.unwrap();
        assert_eq!(hits[0].content, "v2");
    }
}
