//! Supervisor：每个阶段结束后决定下一步（retrieval / generator / terminate）
//!
//! 模型给出的决定先经过确定性的 [`guard`]：同一阶段在输入未变时不会再次进入，
//! 直接回答的计划不会进入 retrieval。被改写的决定记 warn。

use std::sync::Arc;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::llm::{structured_call, LlmClient};
use crate::workflow::prompts::{render, SUPERVISION_TEMPLATE, SUPERVISOR_APOLOGY};
use crate::workflow::state::{Plan, WorkflowState};

/// 下一步路由；模型也可以把 terminate 写成 `__end__`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Route {
    Retrieval,
    Generator,
    /// Finish the workflow (also accepted as "__end__")
    #[serde(alias = "__end__")]
    Terminate,
}

impl Route {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Retrieval => "retrieval",
            Self::Generator => "generator",
            Self::Terminate => "terminate",
        }
    }
}

impl std::fmt::Display for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct SupervisorDecision {
    /// The single node to run next
    pub next_node: Route,
}

/// 记录 retrieval / generator 上次运行时的输入指纹
#[derive(Debug, Clone, Default)]
pub struct StageLedger {
    retrieval: Option<String>,
    generator: Option<String>,
}

impl StageLedger {
    fn fingerprint(route: Route, state: &WorkflowState) -> Option<String> {
        match route {
            Route::Retrieval => Some(state.message.clone()),
            Route::Generator => Some(format!(
                "{}\u{1f}{}\u{1f}{}",
                state.message,
                state.tools_or_empty(),
                state.retrieved_docs.render()
            )),
            Route::Terminate => None,
        }
    }

    /// 在阶段执行前调用
    pub fn record(&mut self, route: Route, state: &WorkflowState) {
        let fp = Self::fingerprint(route, state);
        match route {
            Route::Retrieval => self.retrieval = fp,
            Route::Generator => self.generator = fp,
            Route::Terminate => {}
        }
    }

    /// 当前输入下该阶段是否还没跑过
    pub fn is_fresh(&self, route: Route, state: &WorkflowState) -> bool {
        let last = match route {
            Route::Retrieval => &self.retrieval,
            Route::Generator => &self.generator,
            Route::Terminate => return true,
        };
        last.as_ref() != Self::fingerprint(route, state).as_ref()
    }
}

/// 纯函数：把模型的决定修正为一个保证推进的路由
pub fn guard(decision: Route, state: &WorkflowState, ledger: &StageLedger) -> Route {
    let generator_fresh = ledger.is_fresh(Route::Generator, state);
    let generator_or_end = if generator_fresh {
        Route::Generator
    } else {
        Route::Terminate
    };
    match decision {
        Route::Retrieval => {
            let direct = state.plan.as_ref().is_some_and(Plan::is_direct_response);
            if direct || state.retrieved_docs.attempted() || !ledger.is_fresh(Route::Retrieval, state) {
                generator_or_end
            } else {
                Route::Retrieval
            }
        }
        Route::Generator => generator_or_end,
        Route::Terminate if !state.has_response() => generator_or_end,
        Route::Terminate => Route::Terminate,
    }
}

/// 一次 Supervisor 决策的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupervisorOutcome {
    pub route: Route,
    /// 模型原始决定；调用失败时为 None
    pub proposed: Option<Route>,
    /// 调用失败时写入 response 的致歉文案
    pub fallback_response: Option<String>,
}

impl SupervisorOutcome {
    pub fn overridden(&self) -> bool {
        self.proposed.is_some_and(|p| p != self.route)
    }
}

pub struct Supervisor {
    llm: Arc<dyn LlmClient>,
}

impl Supervisor {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }

    /// 决定下一步；从不返回错误
    pub async fn decide(&self, state: &WorkflowState, ledger: &StageLedger) -> SupervisorOutcome {
        let plan = state.plan.as_ref().map(Plan::render).unwrap_or_else(|| "[]".to_string());
        let docs = state.retrieved_docs.render();
        let system = render(
            SUPERVISION_TEMPLATE,
            &[
                ("query", state.message.as_str()),
                ("plan", plan.as_str()),
                ("docs", docs.as_str()),
                ("response", state.response_or_placeholder()),
            ],
        );

        match structured_call::<SupervisorDecision>(self.llm.as_ref(), &system, "Choose the next node.").await {
            Ok(decision) => {
                let route = guard(decision.next_node, state, ledger);
                if route != decision.next_node {
                    tracing::warn!(
                        proposed = %decision.next_node,
                        route = %route,
                        "[Supervisor] decision overridden"
                    );
                } else {
                    tracing::info!(route = %route, "[Supervisor] next node");
                }
                SupervisorOutcome {
                    route,
                    proposed: Some(decision.next_node),
                    fallback_response: None,
                }
            }
            Err(e) => {
                tracing::error!(error = %e, "[Supervisor] decision failed, terminating");
                SupervisorOutcome {
                    route: Route::Terminate,
                    proposed: None,
                    fallback_response: Some(SUPERVISOR_APOLOGY.to_string()),
                }
            }
        }
    }
}
