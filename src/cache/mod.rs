//! 响应缓存：规范化查询 → 已生成的回答 + 元数据
//!
//! - **memory**: moka 进程内缓存（容量上限 + TTL）
//! - **sqlite**: rusqlite 持久化缓存（读时校验 TTL，过期行惰性删除）
//!
//! 工作流只通过 `get_cached` / `store` 访问缓存：读失败按未命中处理，写失败只记日志，二者都不会让请求失败。

pub mod memory;
pub mod sqlite;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use memory::MemoryCache;
pub use sqlite::SqliteCache;

use crate::config::CacheSection;

/// 缓存条目元数据
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheMetadata {
    pub tools_called: Vec<String>,
}

/// 缓存条目：回答文本 + 调用过的工具
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub response: String,
    pub metadata: CacheMetadata,
}

impl CacheEntry {
    pub fn new(response: impl Into<String>, tools_called: Vec<String>) -> Self {
        Self {
            response: response.into(),
            metadata: CacheMetadata { tools_called },
        }
    }
}

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache backend error: {0}")]
    Backend(String),

    #[error("cache entry (de)serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// 缓存后端抽象；key 已规范化
#[async_trait]
pub trait ResponseCache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>, CacheError>;

    async fn set(&self, key: &str, entry: &CacheEntry) -> Result<(), CacheError>;

    /// 健康检查
    async fn ping(&self) -> Result<(), CacheError>;

    fn name(&self) -> &'static str;
}

/// 规范化查询：去首尾空白、转小写、连续空白压成一个空格
pub fn normalize_query(query: &str) -> String {
    query
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// 查缓存；后端错误记 warn 并视为未命中
pub async fn get_cached(cache: &dyn ResponseCache, query: &str) -> Option<CacheEntry> {
    let key = normalize_query(query);
    match cache.get(&key).await {
        Ok(Some(entry)) => {
            tracing::info!(backend = cache.name(), "[Cache] hit");
            Some(entry)
        }
        Ok(None) => {
            tracing::debug!(backend = cache.name(), "[Cache] miss");
            None
        }
        Err(e) => {
            tracing::warn!(backend = cache.name(), error = %e, "[Cache] lookup failed, treating as miss");
            None
        }
    }
}

/// 写缓存（尽力而为）；失败只记 warn
pub async fn store(cache: &dyn ResponseCache, query: &str, response: &str, tools_called: &[String]) {
    let key = normalize_query(query);
    let entry = CacheEntry::new(response, tools_called.to_vec());
    match cache.set(&key, &entry).await {
        Ok(()) => tracing::info!(backend = cache.name(), "[Cache] stored response"),
        Err(e) => tracing::warn!(backend = cache.name(), error = %e, "[Cache] store failed"),
    }
}

/// 按 `[cache] backend` 创建缓存后端
pub fn create_cache_from_config(cfg: &CacheSection) -> Result<Arc<dyn ResponseCache>, CacheError> {
    let ttl = Duration::from_secs(cfg.ttl_secs);
    match cfg.backend.as_str() {
        "sqlite" => {
            if let Some(parent) = cfg.path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent).map_err(|e| CacheError::Backend(e.to_string()))?;
            }
            Ok(Arc::new(SqliteCache::open(&cfg.path, ttl)?))
        }
        "memory" => Ok(Arc::new(MemoryCache::new(cfg.max_entries, ttl))),
        other => Err(CacheError::Backend(format!("unknown cache backend: {}", other))),
    }
}
