//! 进程内响应缓存（moka future cache）

use std::time::Duration;

use async_trait::async_trait;
use moka::future::Cache;

use crate::cache::{CacheEntry, CacheError, ResponseCache};

pub struct MemoryCache {
    cache: Cache<String, CacheEntry>,
}

impl MemoryCache {
    pub fn new(max_capacity: u64, ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_capacity)
            .time_to_live(ttl)
            .build();
        Self { cache }
    }

    pub async fn invalidate(&self, key: &str) {
        self.cache.invalidate(key).await;
    }

    /// 先处理 moka 挂起的维护任务，计数才准确
    pub async fn entry_count(&self) -> u64 {
        self.cache.run_pending_tasks().await;
        self.cache.entry_count()
    }
}

#[async_trait]
impl ResponseCache for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>, CacheError> {
        Ok(self.cache.get(key).await)
    }

    async fn set(&self, key: &str, entry: &CacheEntry) -> Result<(), CacheError> {
        self.cache.insert(key.to_string(), entry.clone()).await;
        Ok(())
    }

    async fn ping(&self) -> Result<(), CacheError> {
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
