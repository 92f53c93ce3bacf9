//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `FINRAG__*` 覆盖（双下划线表示嵌套，如 `FINRAG__CACHE__BACKEND=sqlite`）。
//! API Key 只从环境变量读取（OPENAI_API_KEY / DEEPSEEK_API_KEY / QDRANT_API_KEY），不写入配置文件。

use std::path::PathBuf;

use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub llm: LlmSection,
    pub embedding: EmbeddingSection,
    pub vector_store: VectorStoreSection,
    pub cache: CacheSection,
    pub workflow: WorkflowSection,
    pub tools: ToolsSection,
    pub ingestion: IngestionSection,
    pub server: ServerSection,
}

/// [app] 段：应用名、日志级别与日志目录
#[derive(Debug, Clone, Deserialize)]
pub struct AppSection {
    #[serde(default = "default_app_name")]
    pub name: String,
    /// 默认日志级别，RUST_LOG 优先
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// 设置后额外写入 {log_dir}/finrag.log
    pub log_dir: Option<PathBuf>,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            name: default_app_name(),
            log_level: default_log_level(),
            log_dir: None,
        }
    }
}

fn default_app_name() -> String {
    "Finance Agentic RAG Chatbot".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

/// [llm] 段：后端选择、采样参数与超时
#[derive(Debug, Clone, Deserialize)]
pub struct LlmSection {
    /// 后端：openai / deepseek / mock；无可用 API Key 时回退到 mock
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    pub base_url: Option<String>,
    #[serde(default)]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_seed")]
    pub seed: i64,
    #[serde(default)]
    pub timeouts: LlmTimeoutsSection,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            base_url: None,
            temperature: 0.0,
            max_tokens: default_max_tokens(),
            seed: default_seed(),
            timeouts: LlmTimeoutsSection::default(),
        }
    }
}

fn default_provider() -> String {
    "openai".to_string()
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_max_tokens() -> u32 {
    16000
}

fn default_seed() -> i64 {
    42
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmTimeoutsSection {
    #[serde(default = "default_request_timeout")]
    pub request: u64,
}

impl Default for LlmTimeoutsSection {
    fn default() -> Self {
        Self {
            request: default_request_timeout(),
        }
    }
}

fn default_request_timeout() -> u64 {
    60
}

/// [embedding] 段：嵌入模型与向量维度
#[derive(Debug, Clone, Deserialize)]
pub struct EmbeddingSection {
    /// openai / mock
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_embedding_model")]
    pub model: String,
    pub base_url: Option<String>,
    #[serde(default = "default_dimension")]
    pub dimension: usize,
}

impl Default for EmbeddingSection {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_embedding_model(),
            base_url: None,
            dimension: default_dimension(),
        }
    }
}

fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}

fn default_dimension() -> usize {
    1536
}

/// [vector_store] 段：向量库后端、集合名与检索参数
#[derive(Debug, Clone, Deserialize)]
pub struct VectorStoreSection {
    /// qdrant / memory
    #[serde(default = "default_vector_backend")]
    pub backend: String,
    #[serde(default = "default_qdrant_url")]
    pub url: String,
    /// 一般留空，由 QDRANT_API_KEY 提供
    pub api_key: Option<String>,
    #[serde(default = "default_collection")]
    pub collection: String,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_score_threshold")]
    pub score_threshold: f32,
    #[serde(default = "default_vector_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for VectorStoreSection {
    fn default() -> Self {
        Self {
            backend: default_vector_backend(),
            url: default_qdrant_url(),
            api_key: None,
            collection: default_collection(),
            top_k: default_top_k(),
            score_threshold: default_score_threshold(),
            timeout_secs: default_vector_timeout_secs(),
            max_retries: default_max_retries(),
        }
    }
}

fn default_vector_backend() -> String {
    "qdrant".to_string()
}

fn default_qdrant_url() -> String {
    "http://localhost:6333".to_string()
}

fn default_collection() -> String {
    "documents".to_string()
}

fn default_top_k() -> usize {
    5
}

fn default_score_threshold() -> f32 {
    0.8
}

fn default_vector_timeout_secs() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    2
}

/// [cache] 段：响应缓存后端与过期时间
#[derive(Debug, Clone, Deserialize)]
pub struct CacheSection {
    /// memory / sqlite
    #[serde(default = "default_cache_backend")]
    pub backend: String,
    /// sqlite 后端的数据库文件
    #[serde(default = "default_cache_path")]
    pub path: PathBuf,
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
    #[serde(default = "default_max_entries")]
    pub max_entries: u64,
}

impl Default for CacheSection {
    fn default() -> Self {
        Self {
            backend: default_cache_backend(),
            path: default_cache_path(),
            ttl_secs: default_ttl_secs(),
            max_entries: default_max_entries(),
        }
    }
}

fn default_cache_backend() -> String {
    "memory".to_string()
}

fn default_cache_path() -> PathBuf {
    PathBuf::from("data/cache.sqlite")
}

fn default_ttl_secs() -> u64 {
    86_400
}

fn default_max_entries() -> u64 {
    10_000
}

/// [workflow] 段：监督循环上限与生成 Agent 步数上限
#[derive(Debug, Clone, Deserialize)]
pub struct WorkflowSection {
    /// 单次请求内 Supervisor 最多被调用的次数
    #[serde(default = "default_transition_cap")]
    pub transition_cap: usize,
    #[serde(default = "default_agent_max_steps")]
    pub agent_max_steps: usize,
}

impl Default for WorkflowSection {
    fn default() -> Self {
        Self {
            transition_cap: default_transition_cap(),
            agent_max_steps: default_agent_max_steps(),
        }
    }
}

fn default_transition_cap() -> usize {
    10
}

fn default_agent_max_steps() -> usize {
    8
}

/// [tools] 段：工具超时、Search 域名白名单、行情接口地址
#[derive(Debug, Clone, Deserialize)]
pub struct ToolsSection {
    /// 单次工具调用超时（秒）
    #[serde(default = "default_tool_timeout_secs")]
    pub tool_timeout_secs: u64,
    #[serde(default)]
    pub search: SearchSection,
    #[serde(default)]
    pub quote: QuoteSection,
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            tool_timeout_secs: default_tool_timeout_secs(),
            search: SearchSection::default(),
            quote: QuoteSection::default(),
        }
    }
}

fn default_tool_timeout_secs() -> u64 {
    30
}

/// [tools.search] 段：抓取 URL 的超时、最大字符数、允许的域名白名单
#[derive(Debug, Clone, Deserialize)]
pub struct SearchSection {
    #[serde(default = "default_search_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_result_chars")]
    pub max_result_chars: usize,
    #[serde(default = "default_allowed_domains")]
    pub allowed_domains: Vec<String>,
}

impl Default for SearchSection {
    fn default() -> Self {
        Self {
            timeout_secs: default_search_timeout_secs(),
            max_result_chars: default_max_result_chars(),
            allowed_domains: default_allowed_domains(),
        }
    }
}

fn default_search_timeout_secs() -> u64 {
    15
}

fn default_max_result_chars() -> usize {
    8000
}

fn default_allowed_domains() -> Vec<String> {
    vec![
        // 监管披露
        "www.sec.gov".into(),
        "efts.sec.gov".into(),
        // 行情与财经媒体
        "finance.yahoo.com".into(),
        "www.nasdaq.com".into(),
        "www.marketwatch.com".into(),
        "www.reuters.com".into(),
        "www.cnbc.com".into(),
        "www.macrotrends.net".into(),
        "stockanalysis.com".into(),
        // 百科
        "en.wikipedia.org".into(),
        "www.investopedia.com".into(),
    ]
}

/// [tools.quote] 段：行情接口（Yahoo Finance chart API 兼容）
#[derive(Debug, Clone, Deserialize)]
pub struct QuoteSection {
    #[serde(default = "default_quote_base_url")]
    pub base_url: String,
}

impl Default for QuoteSection {
    fn default() -> Self {
        Self {
            base_url: default_quote_base_url(),
        }
    }
}

fn default_quote_base_url() -> String {
    "https://query1.finance.yahoo.com".to_string()
}

/// [ingestion] 段：分块大小、重叠与批量写入大小
#[derive(Debug, Clone, Deserialize)]
pub struct IngestionSection {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
    #[serde(default = "default_upsert_batch")]
    pub upsert_batch: usize,
}

impl Default for IngestionSection {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            upsert_batch: default_upsert_batch(),
        }
    }
}

fn default_chunk_size() -> usize {
    800
}

fn default_chunk_overlap() -> usize {
    100
}

fn default_upsert_batch() -> usize {
    64
}

/// [server] 段：HTTP 监听地址
#[derive(Debug, Clone, Deserialize)]
pub struct ServerSection {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8000".to_string()
}

/// 从 config 目录加载配置，环境变量 FINRAG__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 FINRAG__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("FINRAG")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_retrieval_contract() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.vector_store.top_k, 5);
        assert!((cfg.vector_store.score_threshold - 0.8).abs() < f32::EPSILON);
        assert_eq!(cfg.vector_store.collection, "documents");
        assert_eq!(cfg.embedding.dimension, 1536);
        assert_eq!(cfg.workflow.transition_cap, 10);
        assert_eq!(cfg.ingestion.chunk_size, 800);
        assert_eq!(cfg.ingestion.chunk_overlap, 100);
    }

    #[test]
    fn test_load_from_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("finrag.toml");
        std::fs::write(
            &path,
            r#"
[cache]
backend = "sqlite"
ttl_secs = 60

[workflow]
transition_cap = 4
"#,
        )
        .unwrap();

        let cfg = load_config(Some(path)).unwrap();
        assert_eq!(cfg.cache.backend, "sqlite");
        assert_eq!(cfg.cache.ttl_secs, 60);
        assert_eq!(cfg.workflow.transition_cap, 4);
        // 未出现的段落走默认值
        assert_eq!(cfg.vector_store.top_k, 5);
        assert_eq!(cfg.server.bind, "127.0.0.1:8000");
    }
}
