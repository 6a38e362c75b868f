//! Master对外部系统的调用端口

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::entities::TaskInstance;
use crate::value_objects::Host;
use orchestrator_errors::OrchestratorResult;

/// 下发给Worker的任务
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskDispatchRequest {
    pub task_instance: TaskInstance,
    /// Worker回报状态的Master地址
    pub master_host: Host,
    #[serde(default)]
    pub global_params: HashMap<String, String>,
}

/// 新Master接管Worker上仍在运行的任务
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TakeOverRequest {
    pub task_instance_id: i64,
    pub workflow_instance_id: i64,
    pub master_host: Host,
}

/// Master到Worker的调用
#[async_trait]
pub trait TaskExecutorClient: Send + Sync {
    /// Worker拒绝任务时返回 DispatchRejected
    async fn dispatch_task(&self, host: &Host, request: &TaskDispatchRequest)
        -> OrchestratorResult<()>;
    async fn kill_task(&self, host: &Host, task_instance_id: i64) -> OrchestratorResult<()>;
    async fn pause_task(&self, host: &Host, task_instance_id: i64) -> OrchestratorResult<()>;
    /// Worker上不存在该任务时返回 false
    async fn take_over_task(&self, host: &Host, request: &TakeOverRequest)
        -> OrchestratorResult<bool>;
}

/// 清理任务在外部系统中拉起的作业，例如YARN应用
#[async_trait]
pub trait ExternalJobCleaner: Send + Sync {
    async fn kill_applications(&self, app_ids: &[String]) -> OrchestratorResult<()>;
}

/// 未配置外部系统时使用
pub struct NoopJobCleaner;

#[async_trait]
impl ExternalJobCleaner for NoopJobCleaner {
    async fn kill_applications(&self, _app_ids: &[String]) -> OrchestratorResult<()> {
        Ok(())
    }
}
