//! 结构化调用：把输出类型的 JSON Schema（schemars 生成）注入 system prompt，再把回复解析成该类型
//!
//! Planner（`{"steps": [...]}`）与 Supervisor（`{"next_node": "..."}`）共用。

use schemars::{schema_for, JsonSchema};
use serde::de::DeserializeOwned;

use crate::llm::{LlmClient, LlmError, Message};

/// 从模型回复中取出 JSON：优先 ```json 围栏，其次首个 `{` 到最后一个 `}`
pub fn extract_json_block(output: &str) -> Option<&str> {
    let trimmed = output.trim();
    if let Some(start) = trimmed.find("```json") {
        let rest = &trimmed[start + 7..];
        return Some(rest.find("```").map(|end| rest[..end].trim()).unwrap_or(rest.trim()));
    }
    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    (end > start).then(|| &trimmed[start..=end])
}

/// 输出类型 T 的 JSON Schema（格式化字符串）
pub fn schema_json<T: JsonSchema>() -> String {
    let schema = schema_for!(T);
    serde_json::to_string_pretty(&schema).unwrap_or_default()
}

/// 调用 LLM 并把回复解析为 T；解析失败返回 LlmError::InvalidOutput
pub async fn structured_call<T>(
    llm: &dyn LlmClient,
    system_prompt: &str,
    user_message: &str,
) -> Result<T, LlmError>
where
    T: DeserializeOwned + JsonSchema,
{
    let system = format!(
        "{}\n\nRespond only with a JSON object matching this schema:\n```json\n{}\n```",
        system_prompt,
        schema_json::<T>()
    );
    let messages = vec![Message::system(system), Message::user(user_message)];
    let output = llm.complete(&messages).await?;

    let json = extract_json_block(&output)
        .ok_or_else(|| LlmError::InvalidOutput(format!("no JSON object in: {}", output.trim())))?;
    serde_json::from_str(json).map_err(|e| LlmError::InvalidOutput(format!("{}: {}", e, json)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockLlmClient;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, JsonSchema)]
    struct Steps {
        steps: Vec<String>,
    }

    #[test]
    fn test_extract_fenced_and_bare_json() {
        let fenced = "Here you go:\n```json\n{\"steps\": []}\n```\nthanks";
        assert_eq!(extract_json_block(fenced), Some("{\"steps\": []}"));
        assert_eq!(extract_json_block("ok {\"a\": 1} done"), Some("{\"a\": 1}"));
        assert_eq!(extract_json_block("no json here"), None);
    }

    #[tokio::test]
    async fn test_structured_call_parses_and_injects_schema() {
        let mock = MockLlmClient::new().on_fn("PLAN-TEST", |msgs| {
            assert!(msgs[0].content.contains("\"steps\""));
            Ok("```json\n{\"steps\": [\"a\", \"b\"]}\n```".to_string())
        });
        let out: Steps = structured_call(&mock, "PLAN-TEST", "q").await.unwrap();
        assert_eq!(out.steps, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_structured_call_rejects_wrong_shape() {
        let mock = MockLlmClient::new().on("PLAN-TEST", ["{\"oops\": 1}"]);
        let err = structured_call::<Steps>(&mock, "PLAN-TEST", "q")
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::InvalidOutput(_)));
    }
}
