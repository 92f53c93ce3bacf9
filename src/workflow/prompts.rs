//! Prompt 模板与固定文案
//!
//! 模板中的 `{name}` 占位符由 render 单遍替换，插入内容里的花括号不会被再次解析。

/// Planner 角色首句，同时作为 Mock 客户端的匹配标记
pub const PLANNER_ROLE: &str = "You are a strategic financial planning assistant";
pub const SUPERVISOR_ROLE: &str = "You are the supervisor of a financial agentic RAG workflow";
pub const GENERATOR_ROLE: &str = "You are an expert investment analyst specializing in public equities";

/// 非金融问题时 Planner 给出的唯一一步
pub const DIRECT_RESPONSE_STEP: &str = "Respond directly to the query without using tools.";

/// 尚未检索时给 Supervisor / 生成 Agent 看的文档占位
pub const NO_DOCUMENTS: &str = "No documents.";
/// 检索执行过但没有命中
pub const NO_DOCUMENTS_FOUND: &str = "No documents found for the query.";
/// 尚未生成回答
pub const NO_RESPONSE: &str = "No response so far.";

pub const SUPERVISOR_APOLOGY: &str = "Sorry, I encountered an error while supervising the workflow.";

pub fn generator_apology(error: &str) -> String {
    format!(
        "Sorry, I encountered an error while generating the response: {}",
        error
    )
}

pub const PLANNING_TEMPLATE: &str = r#"[ROLE]
You are a strategic financial planning assistant. You break financial and investment questions down into logical, actionable steps.

[USER QUERY]
{query}

[TOOLS AVAILABLE]
{tools}

[NODES]
- retrieval: fetch relevant financial documents from the vector database.
- generator: write the final answer; it may call tools.
- __end__: finish the workflow and deliver the final response.

[INSTRUCTIONS]
1. Decide whether the [USER QUERY] is about finance or investing.
   - If it is, plan 3 to 5 sequential steps that lead to a good answer.
   - If it is not, return exactly one step: "Respond directly to the query without using tools."
2. Each step states its goal, the tools or nodes it uses, and the output it is expected to produce.
3. Order the steps so that earlier steps enable later ones."#;

pub const SUPERVISION_TEMPLATE: &str = r#"[ROLE]
You are the supervisor of a financial agentic RAG workflow. You follow the [PLAN], pick the single node from [NODES] that runs next, and judge the [RESPONSE SO FAR]. The user must end up with a complete and accurate answer.

[USER QUERY]
{query}

[PLAN]
{plan}

[DOCUMENTS]
{docs}

[RESPONSE SO FAR]
{response}

[NODES]
- retrieval: fetch relevant financial documents from the vector database.
- generator: write the final answer; it may call tools.
- __end__: finish the workflow and deliver the final response.

[INSTRUCTIONS]
1. Read the [PLAN] and the [NODES] and reason step by step.
2. Never run a node again unless doing so would change the state.
3. Never run nodes in parallel.
4. Routing rules:
   - If the [PLAN] says to respond to the query directly, go to "generator".
   - If [DOCUMENTS] already holds retrieved documents, or says "No documents found for the query.", go to "generator".
   - If the [RESPONSE SO FAR] asks the user for more information, go to "__end__".
   - If the [RESPONSE SO FAR] is complete, go to "__end__"."#;

pub const GENERATION_TEMPLATE: &str = r#"[ROLE]
You are an expert investment analyst specializing in public equities. You study earnings reports, financial statements, SEC filings, industry trends, competitive moats and risk factors. Your work is rigorous, evidence-based and transparent.

[USER QUERY]
{query}

[TOOLS]
{tools}

[DOCUMENTS]
{docs}

[INSTRUCTIONS]
1. Use only the [TOOLS] and [DOCUMENTS]. If something is missing, say so explicitly.
2. If they hold nothing relevant to the [USER QUERY], admit that you do not know.
3. For finance or investment questions, structure the answer as:
   - Final Recommendation (BUY / HOLD / SELL with a target price)
   - Key Assumptions
   - Top 3 Financial Metrics & Trends (growth, margins, cash flow)
   - Valuation vs Peers
   - Risks & Catalysts
4. For any other question, answer plainly without financial jargon.
5. Return the final answer once all reasoning and tool use is done."#;

/// 工具调用协议说明，附在生成 Agent 的 system prompt 之后
pub const TOOL_PROTOCOL: &str = r#"[TOOL CALLS]
To call a tool, reply with only a JSON object of this shape and nothing else:
{schema}
The tool result comes back in the next message as "Observation (<tool>): ...".
When you are done, reply with the final answer as plain text (no JSON)."#;

/// 单遍替换 `{name}` 占位符；未知占位符原样保留
pub fn render(template: &str, vars: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        let replaced = after.find('}').and_then(|end| {
            let name = &after[..end];
            vars.iter()
                .find(|(k, _)| *k == name)
                .map(|(_, v)| (end, *v))
        });
        match replaced {
            Some((end, value)) => {
                out.push_str(value);
                rest = &after[end + 1..];
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_single_pass() {
        let out = render("q={query} d={docs} {unknown}", &[("query", "{docs}"), ("docs", "D")]);
        assert_eq!(out, "q={docs} d=D {unknown}");
    }

    #[test]
    fn test_templates_carry_role_markers() {
        assert!(PLANNING_TEMPLATE.contains(PLANNER_ROLE));
        assert!(SUPERVISION_TEMPLATE.contains(SUPERVISOR_ROLE));
        assert!(GENERATION_TEMPLATE.contains(GENERATOR_ROLE));
        assert!(PLANNING_TEMPLATE.contains(DIRECT_RESPONSE_STEP));
    }

    #[test]
    fn test_render_keeps_json_braces() {
        let out = render(TOOL_PROTOCOL, &[("schema", "{\"tool\": \"x\"}")]);
        assert!(out.contains("{\"tool\": \"x\"}"));
    }
}
