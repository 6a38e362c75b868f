use orchestrator_config::{DispatchConfig, MasterConfig};
use orchestrator_domain::{
    CommandRepository, Host, TaskExecutorClient, TaskInstanceRepository,
    WorkflowDefinitionRepository, WorkflowInstanceRepository,
};
use std::sync::Arc;

use crate::dispatch::TaskDispatchQueue;
use crate::metrics::MasterMetrics;
use crate::repository::WorkflowExecutionRunnableRepository;

/// 引擎各组件共享的依赖
pub struct MasterContext {
    pub master_host: Host,
    pub master_config: MasterConfig,
    pub dispatch_config: DispatchConfig,
    pub workflow_definition_repository: Arc<dyn WorkflowDefinitionRepository>,
    pub workflow_instance_repository: Arc<dyn WorkflowInstanceRepository>,
    pub task_instance_repository: Arc<dyn TaskInstanceRepository>,
    pub command_repository: Arc<dyn CommandRepository>,
    pub workflow_runnables: Arc<WorkflowExecutionRunnableRepository>,
    pub dispatch_queue: Arc<TaskDispatchQueue>,
    pub executor_client: Arc<dyn TaskExecutorClient>,
    pub metrics: Arc<MasterMetrics>,
}
