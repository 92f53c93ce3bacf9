//! 核心层：错误类型、服务构建、健康检查、优雅关闭

pub mod builder;
pub mod error;
pub mod health;
pub mod shutdown;

pub use builder::{create_services_builder, Services, ServicesBuilder};
pub use error::WorkflowError;
pub use health::{check_cache, check_llm, check_vector_store, HealthReport};
pub use shutdown::{wait_for_signal, ShutdownManager, ShutdownReason};
