//! 工作流过程事件：供 SSE 与 CLI 流式展示

use serde::Serialize;

use crate::workflow::state::ChatOutput;
use crate::workflow::supervisor::Route;

/// 工作流节点
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Node {
    Cache,
    Planner,
    Supervisor,
    Retrieval,
    Generator,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkflowEvent {
    NodeStarted { node: Node },
    Plan { steps: Vec<String> },
    /// Supervisor 的路由；overridden 表示模型的决定被改写
    Route { route: Route, overridden: bool },
    /// response 的每次非空更新
    Response { text: String },
    Done { output: ChatOutput },
    Error { message: String },
}

impl WorkflowEvent {
    /// SSE event 名称
    pub fn name(&self) -> &'static str {
        match self {
            Self::NodeStarted { .. } => "node_started",
            Self::Plan { .. } => "plan",
            Self::Route { .. } => "route",
            Self::Response { .. } => "response",
            Self::Done { .. } => "done",
            Self::Error { .. } => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done { .. } | Self::Error { .. })
    }
}
