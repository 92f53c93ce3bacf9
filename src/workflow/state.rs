//! 工作流状态：一次请求内逐步累积的记录，以及输入 / 输出类型

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::rag::Passage;
use crate::workflow::prompts::{DIRECT_RESPONSE_STEP, NO_DOCUMENTS, NO_DOCUMENTS_FOUND, NO_RESPONSE};

/// 用户输入（收到后不再修改）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatInput {
    pub user_id: String,
    pub message: String,
}

impl ChatInput {
    pub fn new(user_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            message: message.into(),
        }
    }
}

/// Planner 输出：有序的自然语言步骤，可以为空
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Plan {
    /// Ordered steps needed to answer the query
    pub steps: Vec<String>,
}

impl Plan {
    /// 计划是否只要求直接回答（非金融问题）
    pub fn is_direct_response(&self) -> bool {
        let direct = DIRECT_RESPONSE_STEP.trim_end_matches('.').to_lowercase();
        !self.steps.is_empty()
            && self.steps.iter().all(|s| {
                let s = s.trim().trim_end_matches('.').to_lowercase();
                s == direct || s.starts_with("respond directly")
            })
    }

    /// 编号列表形式，拼入 Supervisor prompt
    pub fn render(&self) -> String {
        if self.steps.is_empty() {
            return "[]".to_string();
        }
        self.steps
            .iter()
            .enumerate()
            .map(|(i, s)| format!("{}. {}", i + 1, s.trim()))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// 检索结果三态（另加失败）；占位文案只在 render 时出现
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "passages", rename_all = "snake_case")]
pub enum RetrievedDocs {
    #[default]
    NotAttempted,
    Found(Vec<Passage>),
    NoMatches,
    Failed,
}

impl RetrievedDocs {
    pub fn render(&self) -> String {
        match self {
            Self::NotAttempted => NO_DOCUMENTS.to_string(),
            Self::NoMatches => NO_DOCUMENTS_FOUND.to_string(),
            Self::Failed => String::new(),
            Self::Found(passages) => passages
                .iter()
                .enumerate()
                .map(|(i, p)| format!("Document {}: \n{}", i + 1, p.content))
                .collect::<Vec<_>>()
                .join("\n\n"),
        }
    }

    pub fn attempted(&self) -> bool {
        !matches!(self, Self::NotAttempted)
    }
}

/// 单次请求的工作流状态；各阶段只写自己的字段
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkflowState {
    pub message: String,
    pub plan: Option<Plan>,
    /// Planner 时刻的工具清单快照（JSON）
    pub tools: Option<String>,
    pub retrieved_docs: RetrievedDocs,
    pub response: Option<String>,
    pub tools_used: Option<Vec<String>>,
    pub is_cached: bool,
}

impl WorkflowState {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Self::default()
        }
    }

    /// 给 Supervisor 看的回答（无回答时为占位文案）
    pub fn response_or_placeholder(&self) -> &str {
        self.response
            .as_deref()
            .filter(|r| !r.trim().is_empty())
            .unwrap_or(NO_RESPONSE)
    }

    pub fn has_response(&self) -> bool {
        self.response.as_deref().is_some_and(|r| !r.trim().is_empty())
    }

    pub fn tools_or_empty(&self) -> &str {
        self.tools.as_deref().unwrap_or("[]")
    }

    pub fn into_output(self) -> ChatOutput {
        ChatOutput {
            response: self.response.unwrap_or_default(),
            tools_used: self.tools_used.unwrap_or_default(),
            is_cached: self.is_cached,
        }
    }
}

/// 一次请求的最终结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatOutput {
    pub response: String,
    pub tools_used: Vec<String>,
    pub is_cached: bool,
}
