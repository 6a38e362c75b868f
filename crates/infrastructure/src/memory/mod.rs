//! 仓储的内存实现，用于嵌入式部署与测试

mod command;
mod task_instance;
mod workflow_definition;
mod workflow_instance;

pub use command::InMemoryCommandRepository;
pub use task_instance::InMemoryTaskInstanceRepository;
pub use workflow_definition::InMemoryWorkflowDefinitionRepository;
pub use workflow_instance::InMemoryWorkflowInstanceRepository;
