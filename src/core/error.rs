//! 工作流错误类型
//!
//! 只有输入校验、Planner 失败与调度上限会穿出工作流边界；
//! Supervisor / 生成失败以致歉文案恢复，检索失败以空结果恢复。

use thiserror::Error;

use crate::llm::LlmError;

#[derive(Error, Debug)]
pub enum WorkflowError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Planning failed: {0}")]
    Planning(#[from] LlmError),

    #[error("Workflow exceeded the transition limit of {limit} supervisor steps")]
    TransitionLimit { limit: usize },
}
