//! 金融 Agentic RAG 工作流：缓存 → Planner → Supervisor 调度检索 / 生成

pub mod agent;
pub mod engine;
pub mod events;
pub mod generator;
pub mod planner;
pub mod prompts;
pub mod retrieval;
pub mod state;
pub mod supervisor;

pub use agent::{AgentError, AgentTranscript, ToolAgent, ToolInvocation};
pub use engine::ChatWorkflow;
pub use events::{Node, WorkflowEvent};
pub use generator::{GenerationUpdate, Generator};
pub use planner::Planner;
pub use retrieval::Retriever;
pub use state::{ChatInput, ChatOutput, Plan, RetrievedDocs, WorkflowState};
pub use supervisor::{guard, Route, StageLedger, Supervisor, SupervisorDecision, SupervisorOutcome};
