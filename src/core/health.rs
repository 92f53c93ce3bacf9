//! 依赖健康检查：LLM、响应缓存、向量库

use std::time::Duration;

use serde::Serialize;

use crate::cache::ResponseCache;
use crate::llm::{LlmClient, Message};
use crate::rag::VectorIndex;

/// LLM 探活的上限时间
const LLM_PROBE_TIMEOUT: Duration = Duration::from_secs(20);

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub component: &'static str,
    pub backend: String,
    pub healthy: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl HealthReport {
    fn from_result<E: std::fmt::Display>(component: &'static str, backend: &str, result: Result<(), E>) -> Self {
        let detail = result.err().map(|e| e.to_string());
        if let Some(ref d) = detail {
            tracing::warn!(component, backend, detail = %d, "[Health] check failed");
        }
        Self {
            component,
            backend: backend.to_string(),
            healthy: detail.is_none(),
            detail,
        }
    }
}

pub async fn check_llm(llm: &dyn LlmClient) -> HealthReport {
    let messages = [
        Message::system("Health check. Reply with the single word OK."),
        Message::user("ping"),
    ];
    let result = match tokio::time::timeout(LLM_PROBE_TIMEOUT, llm.complete(&messages)).await {
        Ok(r) => r.map(|_| ()).map_err(|e| e.to_string()),
        Err(_) => Err(format!("no reply within {}s", LLM_PROBE_TIMEOUT.as_secs())),
    };
    HealthReport::from_result("llm", llm.name(), result)
}

pub async fn check_cache(cache: &dyn ResponseCache) -> HealthReport {
    HealthReport::from_result("cache", cache.name(), cache.ping().await)
}

pub async fn check_vector_store(index: &dyn VectorIndex) -> HealthReport {
    HealthReport::from_result("vector_store", index.backend(), index.ping().await)
}
