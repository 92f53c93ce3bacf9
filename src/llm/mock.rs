//! Mock LLM 客户端与 Mock 嵌入（用于测试与离线运行，无需 API）
//!
//! MockLlmClient 按 system prompt 中的标记串匹配规则：
//! - `on(marker, reply)`：按顺序返回脚本化回复，最后一条会一直重复
//! - `on_fn(marker, f)`：动态回复
//! - `fail_on(marker, msg)`：返回 LlmError::Request
//!
//! 无规则命中时使用离线默认行为：Planner 给出单步直接回答计划，Supervisor 在尚无回复时路由到 generator、
//! 否则结束，其余调用回显用户消息。

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::llm::{Embedder, LlmClient, LlmError, Message, Role};
use crate::workflow::prompts::{DIRECT_RESPONSE_STEP, NO_RESPONSE, PLANNER_ROLE, SUPERVISOR_ROLE};

type ReplyFn = Arc<dyn Fn(&[Message]) -> Result<String, LlmError> + Send + Sync>;

enum Reply {
    Scripted(VecDeque<Result<String, String>>),
    Dynamic(ReplyFn),
}

struct Rule {
    marker: String,
    reply: Reply,
    calls: usize,
}

impl Rule {
    fn next(&mut self, messages: &[Message]) -> Result<String, LlmError> {
        self.calls += 1;
        match &mut self.reply {
            Reply::Scripted(queue) => {
                let item = if queue.len() > 1 {
                    queue.pop_front()
                } else {
                    queue.front().cloned()
                };
                match item {
                    Some(Ok(text)) => Ok(text),
                    Some(Err(msg)) => Err(LlmError::Request(msg)),
                    None => Err(LlmError::EmptyResponse),
                }
            }
            Reply::Dynamic(f) => f(messages),
        }
    }
}

/// Mock 客户端：规则匹配 + 离线默认行为
#[derive(Default)]
pub struct MockLlmClient {
    rules: Mutex<Vec<Rule>>,
    total_calls: Mutex<usize>,
}

impl MockLlmClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// system prompt 包含 marker 时依次返回 replies（最后一条重复）
    pub fn on<I, S>(self, marker: &str, replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let queue = replies.into_iter().map(|r| Ok(r.into())).collect();
        self.push_rule(marker, Reply::Scripted(queue))
    }

    pub fn on_fn<F>(self, marker: &str, f: F) -> Self
    where
        F: Fn(&[Message]) -> Result<String, LlmError> + Send + Sync + 'static,
    {
        self.push_rule(marker, Reply::Dynamic(Arc::new(f)))
    }

    pub fn fail_on(self, marker: &str, message: &str) -> Self {
        let queue = VecDeque::from(vec![Err(message.to_string())]);
        self.push_rule(marker, Reply::Scripted(queue))
    }

    fn push_rule(self, marker: &str, reply: Reply) -> Self {
        if let Ok(mut rules) = self.rules.lock() {
            rules.push(Rule {
                marker: marker.to_string(),
                reply,
                calls: 0,
            });
        }
        self
    }

    /// 某条规则被命中的次数
    pub fn calls(&self, marker: &str) -> usize {
        self.rules
            .lock()
            .map(|rules| {
                rules
                    .iter()
                    .filter(|r| r.marker == marker)
                    .map(|r| r.calls)
                    .sum()
            })
            .unwrap_or(0)
    }

    /// 全部 complete 调用次数（含默认行为）
    pub fn total_calls(&self) -> usize {
        self.total_calls.lock().map(|n| *n).unwrap_or(0)
    }
}

fn system_text(messages: &[Message]) -> String {
    let system: Vec<&str> = messages
        .iter()
        .filter(|m| m.role == Role::System)
        .map(|m| m.content.as_str())
        .collect();
    if system.is_empty() {
        messages
            .iter()
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    } else {
        system.join("\n")
    }
}

fn offline_reply(messages: &[Message]) -> String {
    let system = system_text(messages);
    if system.contains(PLANNER_ROLE) {
        return serde_json::json!({ "steps": [DIRECT_RESPONSE_STEP] }).to_string();
    }
    if system.contains(SUPERVISOR_ROLE) {
        let next = if system.contains(NO_RESPONSE) {
            "generator"
        } else {
            "__end__"
        };
        return serde_json::json!({ "next_node": next }).to_string();
    }
    let last_user = messages
        .iter()
        .rev()
        .find(|m| m.role == Role::User)
        .map(|m| m.content.as_str())
        .unwrap_or("(no input)");
    format!("Mock response: {}", last_user)
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, messages: &[Message]) -> Result<String, LlmError> {
        if let Ok(mut n) = self.total_calls.lock() {
            *n += 1;
        }
        let system = system_text(messages);
        {
            let mut rules = self
                .rules
                .lock()
                .map_err(|_| LlmError::Request("mock rules poisoned".into()))?;
            if let Some(rule) = rules.iter_mut().find(|r| system.contains(&r.marker)) {
                return rule.next(messages);
            }
        }
        Ok(offline_reply(messages))
    }

    fn name(&self) -> &str {
        "mock"
    }
}

/// 确定性嵌入：词袋哈希到固定维度后 L2 归一化，同样的文本得到同样的向量
#[derive(Debug, Clone)]
pub struct MockEmbedder {
    dimension: usize,
}

impl MockEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    fn bucket(&self, token: &str) -> usize {
        // FNV-1a
        let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
        for b in token.bytes() {
            hash ^= b as u64;
            hash = hash.wrapping_mul(0x0100_0000_01b3);
        }
        (hash % self.dimension as u64) as usize
    }
}

#[async_trait]
impl Embedder for MockEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError> {
        if text.trim().is_empty() {
            return Err(LlmError::InvalidOutput("cannot embed empty text".into()));
        }
        let mut vector = vec![0.0f32; self.dimension];
        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            vector[self.bucket(&token.to_lowercase())] += 1.0;
        }
        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|x| *x /= norm);
        }
        Ok(vector)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}
