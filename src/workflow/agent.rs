//! 工具调用 Agent：有界 ReAct 循环
//!
//! 模型每轮要么回复一个 JSON tool call（`{"tool": ..., "args": {...}}`），要么回复纯文本答案。
//! 工具结果（包括失败）以 `Observation (<tool>): ...` 写回对话，直到给出答案或步数用尽。

use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;

use crate::llm::{extract_json_block, LlmClient, LlmError, Message, Role};
use crate::tools::{tool_call_schema_json, ToolCall, ToolProvider};
use crate::workflow::prompts::{render, TOOL_PROTOCOL};

/// 日志中 Observation 预览的最大字符数
const OBSERVATION_PREVIEW_CHARS: usize = 200;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error("agent exceeded {max_steps} steps without a final answer")]
    StepLimit { max_steps: usize },

    #[error("agent finished without a final answer")]
    EmptyAnswer,
}

/// 一次工具调用记录
#[derive(Debug, Clone)]
pub struct ToolInvocation {
    pub tool: String,
    pub args: Value,
    pub ok: bool,
}

/// Agent 运行记录：完整对话与工具调用序列
#[derive(Debug, Clone, Default)]
pub struct AgentTranscript {
    pub messages: Vec<Message>,
    pub tool_invocations: Vec<ToolInvocation>,
}

impl AgentTranscript {
    /// 按首次出现顺序去重后的工具名
    pub fn tools_used(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for inv in &self.tool_invocations {
            if !names.contains(&inv.tool) {
                names.push(inv.tool.clone());
            }
        }
        names
    }

    /// 最后一条非空且不是 tool call 的 assistant 消息
    pub fn final_answer(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .filter(|m| m.role == Role::Assistant)
            .map(|m| m.content.trim())
            .find(|c| !c.is_empty() && parse_tool_call(c).is_none())
    }
}

/// 回复是 tool call 时返回解析结果
pub fn parse_tool_call(reply: &str) -> Option<ToolCall> {
    let json = extract_json_block(reply)?;
    let call: ToolCall = serde_json::from_str(json).ok()?;
    if call.tool.trim().is_empty() {
        None
    } else {
        Some(call)
    }
}

fn preview(text: &str) -> String {
    let mut p: String = text.chars().take(OBSERVATION_PREVIEW_CHARS).collect();
    if text.chars().count() > OBSERVATION_PREVIEW_CHARS {
        p.push_str("...");
    }
    p
}

pub struct ToolAgent {
    llm: Arc<dyn LlmClient>,
    tools: Arc<dyn ToolProvider>,
    max_steps: usize,
}

impl ToolAgent {
    pub fn new(llm: Arc<dyn LlmClient>, tools: Arc<dyn ToolProvider>, max_steps: usize) -> Self {
        Self {
            llm,
            tools,
            max_steps: max_steps.max(1),
        }
    }

    /// 运行 Agent；system_prompt 之后会自动附上工具调用协议
    pub async fn run(&self, system_prompt: &str, message: &str) -> Result<AgentTranscript, AgentError> {
        let schema = tool_call_schema_json();
        let protocol = render(TOOL_PROTOCOL, &[("schema", schema.as_str())]);
        let mut transcript = AgentTranscript {
            messages: vec![
                Message::system(format!("{}\n\n{}", system_prompt, protocol)),
                Message::user(message),
            ],
            tool_invocations: Vec::new(),
        };

        for step in 1..=self.max_steps {
            tracing::debug!(step, max_steps = self.max_steps, "[Agent] thinking");
            let reply = self.llm.complete(&transcript.messages).await?;
            transcript.messages.push(Message::assistant(reply.clone()));

            let Some(call) = parse_tool_call(&reply) else {
                if reply.trim().is_empty() {
                    return Err(AgentError::EmptyAnswer);
                }
                tracing::info!(
                    steps = step,
                    tool_calls = transcript.tool_invocations.len(),
                    "[Agent] final answer"
                );
                return Ok(transcript);
            };

            tracing::info!(tool = %call.tool, "[Agent] tool call");
            let (ok, observation) = match self.tools.invoke(&call.tool, call.args.clone()).await {
                Ok(out) => (true, out),
                Err(e) => (false, format!("Error: {}", e)),
            };
            tracing::debug!(tool = %call.tool, ok, preview = %preview(&observation), "[Agent] observation");
            transcript.messages.push(Message::user(format!(
                "Observation ({}): {}",
                call.tool, observation
            )));
            transcript.tool_invocations.push(ToolInvocation {
                tool: call.tool,
                args: call.args,
                ok,
            });
        }

        Err(AgentError::StepLimit {
            max_steps: self.max_steps,
        })
    }
}
