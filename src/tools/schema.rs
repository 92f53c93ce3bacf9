//! 工具调用 JSON Schema 生成（schemars）
//!
//! 用于将「合法 tool call」的 JSON 结构注入生成 Agent 的 system prompt，减少 LLM 输出格式错误。

use schemars::{schema_for, JsonSchema};
use serde::Deserialize;

/// 工具调用请求格式：与生成 Agent 解析的 `{"tool": "...", "args": {...}}` 一致
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ToolCall {
    /// 工具名，如 search、stock_quote
    pub tool: String,
    /// 工具参数，依工具不同而不同
    #[serde(default)]
    pub args: serde_json::Value,
}

/// 返回工具调用的 JSON Schema 字符串，可拼入 system prompt
pub fn tool_call_schema_json() -> String {
    let schema = schema_for!(ToolCall);
    serde_json::to_string_pretty(&schema).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_names_fields() {
        let schema = tool_call_schema_json();
        assert!(schema.contains("\"tool\""));
        assert!(schema.contains("\"args\""));
    }
}
