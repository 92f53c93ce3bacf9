//! finrag - Rust 金融 Agentic RAG 问答系统
//!
//! 模块划分：
//! - **cache**: 响应缓存（moka 内存 / SQLite），按规范化问题命中
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 工作流错误、服务构建、健康检查、优雅关闭
//! - **llm**: LLM 与 Embedding 客户端抽象与实现（OpenAI 兼容 / DeepSeek / Mock）
//! - **observability**: tracing 日志初始化
//! - **rag**: 文档加载、切分、入库与向量检索（Qdrant / 内存）
//! - **tools**: 工具箱（网页抓取、股票行情）与执行器
//! - **workflow**: Planner、Supervisor、检索与生成阶段、工作流控制器
//! - **server**: axum HTTP 接口（feature `web`）

pub mod cache;
pub mod config;
pub mod core;
pub mod llm;
pub mod observability;
pub mod rag;
#[cfg(feature = "web")]
pub mod server;
pub mod tools;
pub mod workflow;

pub use crate::core::{Services, ServicesBuilder, WorkflowError};
pub use crate::workflow::{ChatInput, ChatOutput, ChatWorkflow};
