//! 工作流编排的领域模型
//!
//! 包含持久化实体、状态枚举、心跳记录、静态DAG以及仓储抽象

pub mod dag;
pub mod entities;
pub mod heartbeat;
pub mod ports;
pub mod repositories;
pub mod value_objects;

pub use dag::{DagNode, WorkflowDag};
pub use entities::*;
pub use heartbeat::*;
pub use ports::*;
pub use orchestrator_errors::{OrchestratorError, OrchestratorResult};
pub use repositories::*;
pub use value_objects::*;
