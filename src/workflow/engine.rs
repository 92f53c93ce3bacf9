//! 工作流控制器
//!
//! 缓存命中直接返回；否则 Planner 出计划，再由 Supervisor 在 retrieval / generator 之间调度，
//! 直到 Supervisor 给出 terminate。Supervisor 调用次数超过上限时以 TransitionLimit 失败。

use std::sync::Arc;

use futures_util::Stream;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::cache::{self, ResponseCache};
use crate::config::WorkflowSection;
use crate::core::WorkflowError;
use crate::llm::LlmClient;
use crate::tools::{inventory_json, ToolProvider};
use crate::workflow::agent::ToolAgent;
use crate::workflow::events::{Node, WorkflowEvent};
use crate::workflow::generator::Generator;
use crate::workflow::planner::Planner;
use crate::workflow::retrieval::Retriever;
use crate::workflow::state::{ChatInput, ChatOutput, WorkflowState};
use crate::workflow::supervisor::{Route, StageLedger, Supervisor};

type EventTx = mpsc::UnboundedSender<WorkflowEvent>;

fn emit(events: Option<&EventTx>, ev: WorkflowEvent) {
    if let Some(tx) = events {
        let _ = tx.send(ev);
    }
}

fn emit_response(events: Option<&EventTx>, state: &WorkflowState) {
    if let Some(text) = state.response.as_deref().filter(|r| !r.trim().is_empty()) {
        emit(events, WorkflowEvent::Response { text: text.to_string() });
    }
}

/// 无状态，可在并发请求间共享（Arc）
pub struct ChatWorkflow {
    cache: Arc<dyn ResponseCache>,
    tools: Arc<dyn ToolProvider>,
    planner: Planner,
    supervisor: Supervisor,
    retriever: Retriever,
    generator: Generator,
    transition_cap: usize,
}

impl ChatWorkflow {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        tools: Arc<dyn ToolProvider>,
        cache: Arc<dyn ResponseCache>,
        retriever: Retriever,
        cfg: &WorkflowSection,
    ) -> Self {
        let agent = ToolAgent::new(Arc::clone(&llm), Arc::clone(&tools), cfg.agent_max_steps);
        Self {
            generator: Generator::new(agent, Arc::clone(&cache)),
            planner: Planner::new(Arc::clone(&llm)),
            supervisor: Supervisor::new(llm),
            cache,
            tools,
            retriever,
            transition_cap: cfg.transition_cap,
        }
    }

    pub async fn run(&self, input: ChatInput) -> Result<ChatOutput, WorkflowError> {
        self.run_with_events(input, None).await
    }

    /// 运行并在结束时发出 Done / Error 事件
    pub async fn run_with_events(
        &self,
        input: ChatInput,
        events: Option<EventTx>,
    ) -> Result<ChatOutput, WorkflowError> {
        let result = self
            .execute(&input, events.as_ref())
            .await
            .map(WorkflowState::into_output);
        match &result {
            Ok(output) => emit(events.as_ref(), WorkflowEvent::Done { output: output.clone() }),
            Err(e) => emit(events.as_ref(), WorkflowEvent::Error { message: e.to_string() }),
        }
        result
    }

    /// 事件流；最后一个事件一定是 Done 或 Error。
    /// 流被丢弃（如 SSE 客户端断开）时后台运行随之取消，不再发起 LLM / 工具调用，也不写缓存。
    pub fn stream(self: Arc<Self>, input: ChatInput) -> impl Stream<Item = WorkflowEvent> + Send + 'static {
        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        tokio::spawn(async move {
            tokio::select! {
                biased;
                _ = token.cancelled() => {
                    tracing::info!("[Workflow] stream dropped, run cancelled");
                }
                _ = self.run_with_events(input, Some(tx)) => {}
            }
        });
        let guard = cancel.drop_guard();
        futures_util::stream::unfold((rx, guard), |(mut rx, guard)| async move {
            rx.recv().await.map(|ev| (ev, (rx, guard)))
        })
    }

    /// 执行一次请求，返回完整的最终状态
    pub async fn execute(
        &self,
        input: &ChatInput,
        events: Option<&EventTx>,
    ) -> Result<WorkflowState, WorkflowError> {
        if input.message.trim().is_empty() {
            return Err(WorkflowError::InvalidInput("message must not be empty".into()));
        }
        tracing::info!(user_id = %input.user_id, "[Workflow] new request");
        let mut state = WorkflowState::new(input.message.clone());

        emit(events, WorkflowEvent::NodeStarted { node: Node::Cache });
        if let Some(entry) = cache::get_cached(self.cache.as_ref(), &state.message).await {
            state.response = Some(entry.response);
            state.tools_used = Some(entry.metadata.tools_called);
            state.is_cached = true;
            emit_response(events, &state);
            tracing::info!("[Workflow] served from cache");
            return Ok(state);
        }

        emit(events, WorkflowEvent::NodeStarted { node: Node::Planner });
        let tools = inventory_json(self.tools.as_ref()).await;
        let plan = self.planner.plan(&state.message, &tools).await?;
        emit(events, WorkflowEvent::Plan { steps: plan.steps.clone() });
        state.plan = Some(plan);
        state.tools = Some(tools);

        let mut ledger = StageLedger::default();
        let mut transitions = 0usize;
        loop {
            transitions += 1;
            if transitions > self.transition_cap {
                tracing::warn!(limit = self.transition_cap, "[Workflow] transition cap reached");
                return Err(WorkflowError::TransitionLimit {
                    limit: self.transition_cap,
                });
            }

            emit(events, WorkflowEvent::NodeStarted { node: Node::Supervisor });
            let outcome = self.supervisor.decide(&state, &ledger).await;
            emit(
                events,
                WorkflowEvent::Route {
                    route: outcome.route,
                    overridden: outcome.overridden(),
                },
            );
            if let Some(apology) = outcome.fallback_response {
                state.response = Some(apology);
                emit_response(events, &state);
            }

            match outcome.route {
                Route::Terminate => break,
                Route::Retrieval => {
                    ledger.record(Route::Retrieval, &state);
                    emit(events, WorkflowEvent::NodeStarted { node: Node::Retrieval });
                    state.retrieved_docs = self.retriever.retrieve(&state.message).await;
                }
                Route::Generator => {
                    ledger.record(Route::Generator, &state);
                    emit(events, WorkflowEvent::NodeStarted { node: Node::Generator });
                    let update = self.generator.generate(&state).await;
                    state.response = Some(update.response);
                    state.tools_used = Some(update.tools_used);
                    emit_response(events, &state);
                }
            }
        }

        tracing::info!(transitions, "[Workflow] finished");
        Ok(state)
    }
}
