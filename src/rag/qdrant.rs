//! Qdrant 向量索引（REST API，reqwest）
//!
//! - GET/PUT `/collections/{name}`：检查 / 创建集合
//! - PUT `/collections/{name}/points?wait=true`：写入点
//! - POST `/collections/{name}/points/search`：检索（limit + score_threshold + with_payload）
//! - DELETE `/collections/{name}`
//!
//! 网络错误与 5xx 按指数退避重试 max_retries 次；4xx 直接返回。

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Deserialize;
use serde_json::json;
use tokio::time::sleep;

use crate::config::VectorStoreSection;
use crate::rag::{Distance, IndexError, Passage, Point, VectorIndex};

pub struct QdrantIndex {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    max_retries: u32,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    result: Vec<ScoredPoint>,
}

#[derive(Debug, Deserialize)]
struct ScoredPoint {
    score: f32,
    #[serde(default)]
    payload: serde_json::Value,
}

fn distance_name(distance: Distance) -> &'static str {
    match distance {
        Distance::Cosine => "Cosine",
        Distance::Dot => "Dot",
        Distance::Euclid => "Euclid",
    }
}

impl QdrantIndex {
    pub fn new(
        base_url: &str,
        api_key: Option<String>,
        timeout: Duration,
        max_retries: u32,
    ) -> Result<Self, IndexError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| IndexError::Request(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            max_retries,
        })
    }

    /// 按 `[vector_store]` 配置创建；api_key 未配置时读 QDRANT_API_KEY
    pub fn from_config(cfg: &VectorStoreSection) -> Result<Self, IndexError> {
        let api_key = cfg
            .api_key
            .clone()
            .or_else(|| std::env::var("QDRANT_API_KEY").ok());
        Self::new(
            &cfg.url,
            api_key,
            Duration::from_secs(cfg.timeout_secs.max(1)),
            cfg.max_retries,
        )
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorize(&self, req: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => req.header("api-key", key),
            None => req,
        }
    }

    /// 发送请求；网络错误和 5xx 重试，其余状态码原样返回给调用方判断
    async fn send<F>(&self, op: &str, build: F) -> Result<reqwest::Response, IndexError>
    where
        F: Fn() -> RequestBuilder,
    {
        let mut retries = 0;
        loop {
            let result = self.authorize(build()).send().await;
            let retryable = match &result {
                Ok(resp) => resp.status().is_server_error(),
                Err(_) => true,
            };
            if retryable && retries < self.max_retries {
                let reason = match &result {
                    Ok(resp) => resp.status().to_string(),
                    Err(e) => e.to_string(),
                };
                tracing::warn!(
                    "Qdrant {} failed (attempt {}/{}): {}",
                    op,
                    retries + 1,
                    self.max_retries,
                    reason
                );
                retries += 1;
                sleep(Duration::from_millis(100 * 2u64.pow(retries))).await;
                continue;
            }
            return result.map_err(|e| IndexError::Request(e.to_string()));
        }
    }

    async fn expect_success(resp: reqwest::Response) -> Result<reqwest::Response, IndexError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().await.unwrap_or_default();
        Err(IndexError::Status {
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl VectorIndex for QdrantIndex {
    async fn ensure_collection(
        &self,
        name: &str,
        vector_size: usize,
        distance: Distance,
    ) -> Result<(), IndexError> {
        let path = format!("/collections/{}", name);
        let resp = self.send("get collection", || self.client.get(self.url(&path))).await?;
        match resp.status() {
            s if s.is_success() => return Ok(()),
            StatusCode::NOT_FOUND => {}
            _ => {
                Self::expect_success(resp).await?;
            }
        }

        tracing::info!(collection = %name, vector_size, "[Qdrant] creating collection");
        let body = json!({
            "vectors": { "size": vector_size, "distance": distance_name(distance) }
        });
        let resp = self
            .send("create collection", || self.client.put(self.url(&path)).json(&body))
            .await?;
        Self::expect_success(resp).await?;
        Ok(())
    }

    async fn upsert(&self, collection: &str, points: Vec<Point>) -> Result<(), IndexError> {
        if points.is_empty() {
            return Ok(());
        }
        let path = format!("/collections/{}/points?wait=true", collection);
        let body = json!({
            "points": points
                .iter()
                .map(|p| json!({ "id": p.id, "vector": p.vector, "payload": p.payload }))
                .collect::<Vec<_>>()
        });
        let resp = self
            .send("upsert", || self.client.put(self.url(&path)).json(&body))
            .await?;
        Self::expect_success(resp).await?;
        tracing::debug!(collection = %collection, count = points.len(), "[Qdrant] upserted points");
        Ok(())
    }

    async fn search(
        &self,
        collection: &str,
        query: &[f32],
        k: usize,
        score_threshold: f32,
    ) -> Result<Vec<Passage>, IndexError> {
        let path = format!("/collections/{}/points/search", collection);
        let body = json!({
            "vector": query,
            "limit": k,
            "score_threshold": score_threshold,
            "with_payload": true,
        });
        let resp = self
            .send("search", || self.client.post(self.url(&path)).json(&body))
            .await?;
        let resp = Self::expect_success(resp).await?;
        let parsed: SearchResponse = resp
            .json()
            .await
            .map_err(|e| IndexError::Decode(e.to_string()))?;

        Ok(parsed
            .result
            .iter()
            .filter_map(|p| Passage::from_payload(&p.payload, p.score))
            .collect())
    }

    async fn delete_collection(&self, name: &str) -> Result<(), IndexError> {
        let path = format!("/collections/{}", name);
        let resp = self
            .send("delete collection", || self.client.delete(self.url(&path)))
            .await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }
        Self::expect_success(resp).await?;
        Ok(())
    }

    async fn ping(&self) -> Result<(), IndexError> {
        let resp = self
            .send("list collections", || self.client.get(self.url("/collections")))
            .await?;
        Self::expect_success(resp).await?;
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "qdrant"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn index(server: &MockServer, max_retries: u32) -> QdrantIndex {
        QdrantIndex::new(
            &server.uri(),
            Some("secret".into()),
            Duration::from_secs(5),
            max_retries,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_ensure_collection_creates_when_missing() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/collections/documents"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/collections/documents"))
            .and(header("api-key", "secret"))
            .and(body_partial_json(json!({
                "vectors": {"size": 1536, "distance": "Cosine"}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"result": true})))
            .expect(1)
            .mount(&server)
            .await;

        index(&server, 0)
            .ensure_collection("documents", 1536, Distance::Cosine)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_ensure_collection_noop_when_present() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/collections/documents"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"result": {}})))
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        index(&server, 0)
            .ensure_collection("documents", 1536, Distance::Cosine)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_search_parses_payload() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/collections/documents/points/search"))
            .and(body_partial_json(json!({
                "limit": 5, "score_threshold": 0.8, "with_payload": true
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "result": [
                    {"id": "a", "score": 0.93, "payload": {"content": "AAPL revenue", "metadata": {"source": "10k.txt"}}},
                    {"id": "b", "score": 0.85, "payload": {"no_content": true}}
                ],
                "status": "ok",
                "time": 0.001
            })))
            .mount(&server)
            .await;

        let hits = index(&server, 0)
            .search("documents", &[0.1, 0.2], 5, 0.8)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].content, "AAPL revenue");
        assert_eq!(hits[0].metadata["source"], "10k.txt");
    }

    #[tokio::test]
    async fn test_retries_server_errors_then_fails() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/collections/documents/points/search"))
            .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
            .expect(3)
            .mount(&server)
            .await;

        let err = index(&server, 2)
            .search("documents", &[0.1], 5, 0.8)
            .await
            .unwrap_err();
        assert!(matches!(err, IndexError::Status { status: 503, .. }));
    }

    #[tokio::test]
    async fn test_client_errors_are_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/collections/documents/points"))
            .respond_with(ResponseTemplate::new(400).set_body_string("bad vector"))
            .expect(1)
            .mount(&server)
            .await;

        let point = Point {
            id: "p1".into(),
            vector: vec![0.1],
            payload: json!({"content": "x"}),
        };
        let err = index(&server, 3)
            .upsert("documents", vec![point])
            .await
            .unwrap_err();
        assert!(matches!(err, IndexError::Status { status: 400, ref body } if body == "bad vector"));
    }
}
