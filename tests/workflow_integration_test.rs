//! 工作流集成测试：脚本化 Mock LLM + 内存向量库 + 内存缓存，覆盖直接回答、检索生成、缓存命中、检索失败与调度上限

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use serde_json::{json, Value};

use finrag::cache::MemoryCache;
use finrag::config::AppConfig;
use finrag::core::{Services, ServicesBuilder, WorkflowError};
use finrag::llm::{Embedder, LlmError, Message, MockEmbedder, MockLlmClient};
use finrag::rag::{Distance, InMemoryIndex, IndexError, Passage, Point, VectorIndex};
use finrag::tools::{Tool, ToolError, ToolExecutor, ToolRegistry};
use finrag::workflow::prompts::{
    DIRECT_RESPONSE_STEP, GENERATOR_ROLE, NO_RESPONSE, PLANNER_ROLE, SUPERVISOR_ROLE,
};
use finrag::workflow::{ChatInput, Node, RetrievedDocs, Route, WorkflowEvent};

const DIM: usize = 64;
const WEATHER: &str = "What is the weather today?";
const AAPL: &str = "Should I buy AAPL stock?";
const FILING: &str = "Apple FY2024 10-K: revenue of $391B, services gross margin of 74%.";

struct FakeQuote;

#[async_trait]
impl Tool for FakeQuote {
    fn name(&self) -> &str {
        "stock_quote"
    }
    fn description(&self) -> &str {
        "Latest price and 5-day change for a ticker."
    }
    fn parameters_schema(&self) -> Value {
        json!({"type": "object", "properties": {"symbol": {"type": "string"}}})
    }
    async fn execute(&self, args: Value) -> Result<String, ToolError> {
        Ok(format!("{}: last 226.05, 5d change +1.20%", args["symbol"].as_str().unwrap_or("?")))
    }
}

/// search 总是失败的向量库
struct DownIndex;

#[async_trait]
impl VectorIndex for DownIndex {
    async fn ensure_collection(&self, _: &str, _: usize, _: Distance) -> Result<(), IndexError> {
        Err(IndexError::Request("connection refused".into()))
    }
    async fn upsert(&self, _: &str, _: Vec<Point>) -> Result<(), IndexError> {
        Err(IndexError::Request("connection refused".into()))
    }
    async fn search(&self, _: &str, _: &[f32], _: usize, _: f32) -> Result<Vec<Passage>, IndexError> {
        Err(IndexError::Request("connection refused".into()))
    }
    async fn delete_collection(&self, _: &str) -> Result<(), IndexError> {
        Ok(())
    }
    async fn ping(&self) -> Result<(), IndexError> {
        Err(IndexError::Request("connection refused".into()))
    }
    fn backend(&self) -> &'static str {
        "down"
    }
}

fn system_of(messages: &[Message]) -> &str {
    messages.first().map(|m| m.content.as_str()).unwrap_or_default()
}

/// 按 prompt 内容决定路由：还没检索就检索，还没回答就生成，否则结束
fn scripted_supervisor(messages: &[Message]) -> Result<String, LlmError> {
    let system = system_of(messages);
    let next = if system.contains("[DOCUMENTS]\nNo documents.\n") && system.contains(NO_RESPONSE) {
        "retrieval"
    } else if system.contains(NO_RESPONSE) {
        "generator"
    } else {
        "__end__"
    };
    Ok(json!({ "next_node": next }).to_string())
}

/// 先查行情，再给出带检索证据的结论
fn scripted_analyst(messages: &[Message]) -> Result<String, LlmError> {
    let observed = messages
        .last()
        .is_some_and(|m| m.content.starts_with("Observation (stock_quote)"));
    if !observed {
        return Ok(r#"{"tool": "stock_quote", "args": {"symbol": "AAPL"}}"#.to_string());
    }
    let evidence = if system_of(messages).contains("Document 1: \nApple FY2024 10-K") {
        "10-K filing"
    } else {
        "no filings"
    };
    Ok(format!("Final Recommendation: BUY (target $250). Evidence: {}.", evidence))
}

/// Planner 与生成 Agent 的脚本；Supervisor 规则由调用方追加（先注册的规则优先匹配）
fn analyst_llm() -> MockLlmClient {
    MockLlmClient::new()
        .on(
            PLANNER_ROLE,
            [r#"```json
{"steps": ["Retrieve AAPL filings from the knowledge base", "Fetch the current AAPL quote", "Analyse growth, margins and valuation", "Write a BUY/HOLD/SELL recommendation"]}
```"#],
        )
        .on_fn(GENERATOR_ROLE, scripted_analyst)
}

fn financial_llm() -> MockLlmClient {
    analyst_llm().on_fn(SUPERVISOR_ROLE, scripted_supervisor)
}

async fn seeded_index() -> Arc<InMemoryIndex> {
    let index = Arc::new(InMemoryIndex::new());
    let embedder = MockEmbedder::new(DIM);
    index.ensure_collection("documents", DIM, Distance::Cosine).await.unwrap();
    index
        .upsert(
            "documents",
            vec![Point {
                id: "aapl-10k-0".into(),
                vector: embedder.embed(AAPL).await.unwrap(),
                payload: json!({"content": FILING, "metadata": {"source": "aapl_10k.txt"}}),
            }],
        )
        .await
        .unwrap();
    index
}

fn build(llm: Arc<MockLlmClient>, index: Arc<dyn VectorIndex>, cap: usize) -> Services {
    let mut config = AppConfig::default();
    config.workflow.transition_cap = cap;
    config.embedding.dimension = DIM;

    let mut registry = ToolRegistry::new();
    registry.register(FakeQuote);

    ServicesBuilder::new(config)
        .with_llm(llm)
        .with_embedder(Arc::new(MockEmbedder::new(DIM)))
        .with_index(index)
        .with_cache(Arc::new(MemoryCache::new(100, Duration::from_secs(60))))
        .with_tools(Arc::new(ToolExecutor::new(registry, 5)))
        .build()
        .unwrap()
}

fn routes(events: &[WorkflowEvent]) -> Vec<Route> {
    events
        .iter()
        .filter_map(|e| match e {
            WorkflowEvent::Route { route, .. } => Some(*route),
            _ => None,
        })
        .collect()
}

async fn run_collecting(services: &Services, message: &str) -> (Result<finrag::ChatOutput, WorkflowError>, Vec<WorkflowEvent>) {
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let result = services
        .workflow
        .run_with_events(ChatInput::new("u1", message), Some(tx))
        .await;
    let mut events = Vec::new();
    while let Ok(ev) = rx.try_recv() {
        events.push(ev);
    }
    (result, events)
}

#[tokio::test]
async fn test_direct_answer_for_non_financial_query() {
    let llm = Arc::new(
        MockLlmClient::new()
            .on(PLANNER_ROLE, [json!({"steps": [DIRECT_RESPONSE_STEP]}).to_string()])
            .on_fn(SUPERVISOR_ROLE, scripted_supervisor)
            .on(GENERATOR_ROLE, ["I can't check live weather, but a forecast site can."]),
    );
    let services = build(llm.clone(), seeded_index().await, 10);

    let (result, events) = run_collecting(&services, WEATHER).await;
    let out = result.unwrap();
    assert_eq!(out.response, "I can't check live weather, but a forecast site can.");
    assert!(out.tools_used.is_empty());
    assert!(!out.is_cached);

    // 直接回答的计划不经过检索
    assert_eq!(routes(&events), vec![Route::Generator, Route::Terminate]);
    assert!(!events
        .iter()
        .any(|e| matches!(e, WorkflowEvent::NodeStarted { node: Node::Retrieval })));
}

#[tokio::test]
async fn test_financial_query_retrieves_then_generates() {
    let llm = Arc::new(financial_llm());
    let services = build(llm.clone(), seeded_index().await, 10);

    let (result, events) = run_collecting(&services, AAPL).await;
    let out = result.unwrap();
    assert_eq!(out.response, "Final Recommendation: BUY (target $250). Evidence: 10-K filing.");
    assert_eq!(out.tools_used, vec!["stock_quote".to_string()]);
    assert_eq!(
        routes(&events),
        vec![Route::Retrieval, Route::Generator, Route::Terminate]
    );
    assert!(matches!(events.last(), Some(WorkflowEvent::Done { .. })));
    assert_eq!(llm.calls(PLANNER_ROLE), 1);
}

#[tokio::test]
async fn test_repeat_query_is_served_from_cache() {
    let llm = Arc::new(financial_llm());
    let services = build(llm.clone(), seeded_index().await, 10);

    let first = services.workflow.run(ChatInput::new("u1", AAPL)).await.unwrap();
    let calls_after_first = llm.total_calls();

    let (result, events) = run_collecting(&services, "  should i buy AAPL   stock? ").await;
    let second = result.unwrap();
    assert!(second.is_cached);
    assert_eq!(second.response, first.response);
    assert_eq!(second.tools_used, vec!["stock_quote".to_string()]);

    // 命中缓存时不调用 Planner / Supervisor / 生成
    assert_eq!(llm.total_calls(), calls_after_first);
    assert_eq!(llm.calls(PLANNER_ROLE), 1);
    assert!(routes(&events).is_empty());
}

#[tokio::test]
async fn test_retrieval_failure_continues_with_empty_docs() {
    let llm = Arc::new(financial_llm());
    let services = build(llm.clone(), Arc::new(DownIndex), 10);

    let state = services
        .workflow
        .execute(&ChatInput::new("u1", AAPL), None)
        .await
        .unwrap();
    assert_eq!(state.retrieved_docs, RetrievedDocs::Failed);
    assert_eq!(state.retrieved_docs.render(), "");
    assert_eq!(
        state.response.as_deref(),
        Some("Final Recommendation: BUY (target $250). Evidence: no filings.")
    );
}

#[tokio::test]
async fn test_no_matches_does_not_reenter_retrieval() {
    // Supervisor 始终要求检索；守卫保证检索只跑一次
    let llm = Arc::new(
        analyst_llm().on(SUPERVISOR_ROLE, [r#"{"next_node": "retrieval"}"#]),
    );
    let empty = Arc::new(InMemoryIndex::new());
    empty.ensure_collection("documents", DIM, Distance::Cosine).await.unwrap();
    let services = build(llm.clone(), empty, 10);

    let (result, events) = run_collecting(&services, AAPL).await;
    let out = result.unwrap();
    assert!(out.response.ends_with("Evidence: no filings."));
    assert_eq!(
        routes(&events),
        vec![Route::Retrieval, Route::Generator, Route::Terminate]
    );
    let overridden = events
        .iter()
        .filter(|e| matches!(e, WorkflowEvent::Route { overridden: true, .. }))
        .count();
    assert_eq!(overridden, 2);
}

#[tokio::test]
async fn test_transition_cap_is_an_error() {
    let llm = Arc::new(financial_llm());
    let services = build(llm, seeded_index().await, 1);

    let (result, events) = run_collecting(&services, AAPL).await;
    match result {
        Err(WorkflowError::TransitionLimit { limit }) => assert_eq!(limit, 1),
        other => panic!("expected transition limit, got {:?}", other),
    }
    assert!(matches!(events.last(), Some(WorkflowEvent::Error { .. })));
}

#[tokio::test]
async fn test_planner_failure_fails_request() {
    let llm = Arc::new(MockLlmClient::new().fail_on(PLANNER_ROLE, "rate limited"));
    let services = build(llm, seeded_index().await, 10);
    let err = services.workflow.run(ChatInput::new("u1", AAPL)).await.unwrap_err();
    assert!(matches!(err, WorkflowError::Planning(_)));
}

#[tokio::test]
async fn test_supervisor_failure_returns_apology() {
    let llm = Arc::new(analyst_llm().fail_on(SUPERVISOR_ROLE, "timeout"));
    let services = build(llm, seeded_index().await, 10);
    let out = services.workflow.run(ChatInput::new("u1", AAPL)).await.unwrap();
    assert_eq!(
        out.response,
        "Sorry, I encountered an error while supervising the workflow."
    );
}

#[tokio::test]
async fn test_stream_yields_response_then_done() {
    let llm = Arc::new(financial_llm());
    let services = build(llm, seeded_index().await, 10);

    let events: Vec<WorkflowEvent> = services
        .workflow
        .clone()
        .stream(ChatInput::new("u1", AAPL))
        .collect()
        .await;
    let responses: Vec<&str> = events
        .iter()
        .filter_map(|e| match e {
            WorkflowEvent::Response { text } => Some(text.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(responses.len(), 1);
    match events.last() {
        Some(WorkflowEvent::Done { output }) => assert_eq!(output.response, responses[0]),
        other => panic!("expected done, got {:?}", other),
    }
}
