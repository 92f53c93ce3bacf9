//! 生成阶段：在工具与检索文档约束下运行 Agent，写回答案并写缓存

use std::sync::Arc;

use crate::cache::{self, ResponseCache};
use crate::workflow::agent::{AgentError, ToolAgent};
use crate::workflow::prompts::{generator_apology, render, GENERATION_TEMPLATE};
use crate::workflow::state::WorkflowState;

/// 生成阶段写回状态的两个字段
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationUpdate {
    pub response: String,
    pub tools_used: Vec<String>,
}

pub struct Generator {
    agent: ToolAgent,
    cache: Arc<dyn ResponseCache>,
}

impl Generator {
    pub fn new(agent: ToolAgent, cache: Arc<dyn ResponseCache>) -> Self {
        Self { agent, cache }
    }

    /// 从不返回错误：失败时给出致歉文案与空工具列表
    pub async fn generate(&self, state: &WorkflowState) -> GenerationUpdate {
        match self.answer(state).await {
            Ok((response, tools_used)) => {
                cache::store(self.cache.as_ref(), &state.message, &response, &tools_used).await;
                tracing::info!(tools_used = ?tools_used, "[Generator] response ready");
                GenerationUpdate { response, tools_used }
            }
            Err(e) => {
                tracing::error!(error = %e, "[Generator] generation failed");
                GenerationUpdate {
                    response: generator_apology(&e.to_string()),
                    tools_used: Vec::new(),
                }
            }
        }
    }

    async fn answer(&self, state: &WorkflowState) -> Result<(String, Vec<String>), AgentError> {
        let docs = state.retrieved_docs.render();
        let system = render(
            GENERATION_TEMPLATE,
            &[
                ("query", state.message.as_str()),
                ("tools", state.tools_or_empty()),
                ("docs", docs.as_str()),
            ],
        );
        let transcript = self.agent.run(&system, &state.message).await?;
        let response = transcript
            .final_answer()
            .map(str::to_string)
            .ok_or(AgentError::EmptyAnswer)?;
        Ok((response, transcript.tools_used()))
    }
}
