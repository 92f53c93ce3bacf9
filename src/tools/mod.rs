//! 工具箱：注册表、执行器（超时 + 审计）与金融工具（网页抓取、股票行情）

pub mod executor;
pub mod quote;
pub mod registry;
pub mod schema;
pub mod search;

pub use executor::ToolExecutor;
pub use quote::StockQuoteTool;
pub use registry::{inventory_json, Tool, ToolDescriptor, ToolError, ToolProvider, ToolRegistry};
pub use schema::{tool_call_schema_json, ToolCall};
pub use search::SearchTool;

use crate::config::ToolsSection;

/// 按 `[tools]` 配置注册内置工具并包装为执行器
pub fn create_tool_executor(cfg: &ToolsSection) -> ToolExecutor {
    let mut registry = ToolRegistry::new();
    registry.register(SearchTool::from_config(&cfg.search));
    registry.register(StockQuoteTool::new(&cfg.quote.base_url, cfg.search.timeout_secs));
    tracing::info!(tools = ?registry.tool_names(), "[Tools] registered");
    ToolExecutor::new(registry, cfg.tool_timeout_secs)
}
