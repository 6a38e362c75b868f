//! 基础设施层
//!
//! 仓储的内存实现、到Worker的HTTP客户端、YARN作业清理以及指标导出

pub mod executor_client;
pub mod memory;
pub mod observability;
pub mod yarn;

pub use executor_client::HttpTaskExecutorClient;
pub use memory::{
    InMemoryCommandRepository, InMemoryTaskInstanceRepository,
    InMemoryWorkflowDefinitionRepository, InMemoryWorkflowInstanceRepository,
};
pub use observability::install_prometheus_exporter;
pub use yarn::YarnJobCleaner;
