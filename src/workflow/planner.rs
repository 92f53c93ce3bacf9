//! Planner：把用户问题拆成有序步骤（非金融问题只给一步「直接回答」）

use std::sync::Arc;

use crate::core::WorkflowError;
use crate::llm::{structured_call, LlmClient};
use crate::workflow::prompts::{render, PLANNING_TEMPLATE};
use crate::workflow::state::Plan;

pub struct Planner {
    llm: Arc<dyn LlmClient>,
}

impl Planner {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }

    /// 生成计划；任何失败都会让本次请求失败
    pub async fn plan(&self, message: &str, tools_json: &str) -> Result<Plan, WorkflowError> {
        let system = render(PLANNING_TEMPLATE, &[("query", message), ("tools", tools_json)]);
        let plan: Plan = structured_call(self.llm.as_ref(), &system, message)
            .await
            .map_err(WorkflowError::Planning)?;
        tracing::info!(steps = plan.steps.len(), "[Planner] plan ready");
        for (i, step) in plan.steps.iter().enumerate() {
            tracing::debug!("[Planner] step {}: {}", i + 1, step);
        }
        Ok(plan)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockLlmClient;
    use crate::workflow::prompts::{DIRECT_RESPONSE_STEP, PLANNER_ROLE};

    #[tokio::test]
    async fn test_plan_parses_fenced_json() {
        let llm = MockLlmClient::new().on(
            PLANNER_ROLE,
            ["Here is the plan:\n```json\n{\"steps\": [\"Retrieve filings\", \"Fetch quote\", \"Recommend\"]}\n```"],
        );
        let planner = Planner::new(Arc::new(llm));
        let plan = planner.plan("Should I buy AAPL stock?", "[]").await.unwrap();
        assert_eq!(plan.steps.len(), 3);
        assert!(!plan.is_direct_response());
    }

    #[tokio::test]
    async fn test_offline_plan_is_direct() {
        let planner = Planner::new(Arc::new(MockLlmClient::new()));
        let plan = planner.plan("What is the weather today?", "[]").await.unwrap();
        assert_eq!(plan.steps, vec![DIRECT_RESPONSE_STEP.to_string()]);
    }

    #[tokio::test]
    async fn test_planner_failure_is_fatal() {
        let llm = MockLlmClient::new().fail_on(PLANNER_ROLE, "rate limited");
        let planner = Planner::new(Arc::new(llm));
        let err = planner.plan("Should I buy AAPL stock?", "[]").await.unwrap_err();
        assert!(matches!(err, WorkflowError::Planning(_)));

        let llm = MockLlmClient::new().on(PLANNER_ROLE, ["not json at all"]);
        let planner = Planner::new(Arc::new(llm));
        assert!(planner.plan("Should I buy AAPL stock?", "[]").await.is_err());
    }
}
