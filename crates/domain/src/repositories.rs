//! 领域仓储抽象
//!
//! 定义持久化层的窄接口，Master引擎只通过这些trait访问存储

use async_trait::async_trait;

use crate::entities::{Command, TaskInstance, WorkflowDefinition, WorkflowInstance};
use crate::value_objects::Host;
use orchestrator_errors::OrchestratorResult;

#[async_trait]
pub trait WorkflowDefinitionRepository: Send + Sync {
    async fn save(&self, definition: &WorkflowDefinition) -> OrchestratorResult<()>;
    async fn find_by_code_and_version(
        &self,
        code: i64,
        version: i32,
    ) -> OrchestratorResult<Option<WorkflowDefinition>>;
    /// 最新发布的版本
    async fn find_latest(&self, code: i64) -> OrchestratorResult<Option<WorkflowDefinition>>;
}

#[async_trait]
pub trait WorkflowInstanceRepository: Send + Sync {
    /// 插入并返回分配了ID的实例
    async fn create(&self, instance: &WorkflowInstance) -> OrchestratorResult<WorkflowInstance>;
    async fn update(&self, instance: &WorkflowInstance) -> OrchestratorResult<()>;
    async fn find_by_id(&self, id: i64) -> OrchestratorResult<Option<WorkflowInstance>>;
    /// 由指定Master负责且处于需要容错状态的实例
    async fn query_need_failover_workflow_instances(
        &self,
        host: &Host,
    ) -> OrchestratorResult<Vec<WorkflowInstance>>;
}

#[async_trait]
pub trait TaskInstanceRepository: Send + Sync {
    async fn create(&self, instance: &TaskInstance) -> OrchestratorResult<TaskInstance>;
    async fn update(&self, instance: &TaskInstance) -> OrchestratorResult<()>;
    async fn find_by_id(&self, id: i64) -> OrchestratorResult<Option<TaskInstance>>;
    /// 工作流实例下每个节点的最新有效尝试
    async fn query_valid_task_list_by_workflow_instance_id(
        &self,
        workflow_instance_id: i64,
    ) -> OrchestratorResult<Vec<TaskInstance>>;
    /// 分配在指定Worker上且尚未结束的有效任务实例
    async fn query_need_failover_task_instances(
        &self,
        host: &Host,
    ) -> OrchestratorResult<Vec<TaskInstance>>;
}

#[async_trait]
pub trait CommandRepository: Send + Sync {
    async fn insert(&self, command: &Command) -> OrchestratorResult<Command>;
    /// 按优先级取出最多limit条命令，取出即删除
    async fn claim_commands(&self, limit: usize) -> OrchestratorResult<Vec<Command>>;
    async fn count(&self) -> OrchestratorResult<usize>;
}
