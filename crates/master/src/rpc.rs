//! Master对外提供的操作
//!
//! Worker的任务状态回调与用户的工作流、任务控制都在这里转换为事件，
//! 发布到所属工作流的事件总线。传输层（HTTP）在api crate中。

use chrono::{DateTime, Utc};
use orchestrator_domain::{
    Command, CommandType, FailureStrategy, Host, Priority, TaskExecutionStatus, WorkerHeartBeat,
    WorkflowExecutionStatus,
};
use orchestrator_errors::{OrchestratorError, OrchestratorResult};
use orchestrator_registry::{NodeType, RegistryClient};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

use crate::command::WorkflowTrigger;
use crate::context::MasterContext;
use crate::events::{TaskLifecycleEvent, WorkflowLifecycleEvent};
use crate::runnable::WorkflowExecutionRunnable;
use crate::statemachine::WorkflowState;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRunningRequest {
    pub task_instance_id: i64,
    pub workflow_instance_id: i64,
    pub host: Host,
    pub start_time: DateTime<Utc>,
    #[serde(default)]
    pub app_ids: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskFinishKind {
    Success,
    Failed,
    Killed,
    Paused,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskFinishRequest {
    pub task_instance_id: i64,
    pub workflow_instance_id: i64,
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub cause: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerWorkflowRequest {
    pub workflow_definition_code: i64,
    #[serde(default)]
    pub workflow_definition_version: Option<i32>,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub failure_strategy: FailureStrategy,
    #[serde(default)]
    pub start_params: HashMap<String, String>,
    #[serde(default)]
    pub schedule_time: Option<DateTime<Utc>>,
}

impl TriggerWorkflowRequest {
    pub fn new(workflow_definition_code: i64) -> Self {
        Self {
            workflow_definition_code,
            workflow_definition_version: None,
            priority: Priority::default(),
            failure_strategy: FailureStrategy::default(),
            start_params: HashMap::new(),
            schedule_time: None,
        }
    }

    fn to_command(&self, command_type: CommandType) -> Command {
        let mut command = Command::new(command_type, self.workflow_definition_code);
        command.workflow_definition_version = self.workflow_definition_version;
        command.priority = self.priority;
        command.failure_strategy = self.failure_strategy;
        command.command_params = self.start_params.clone();
        command.schedule_time = self.schedule_time;
        command
    }
}

/// 补数：每个调度时间生成一个工作流实例
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackfillRequest {
    #[serde(flatten)]
    pub workflow: TriggerWorkflowRequest,
    pub schedule_times: Vec<DateTime<Utc>>,
}

pub struct MasterRpcService {
    context: Arc<MasterContext>,
    trigger: Arc<WorkflowTrigger>,
    registry_client: RegistryClient,
}

impl MasterRpcService {
    pub fn new(
        context: Arc<MasterContext>,
        trigger: Arc<WorkflowTrigger>,
        registry_client: RegistryClient,
    ) -> Self {
        Self {
            context,
            trigger,
            registry_client,
        }
    }

    pub fn master_host(&self) -> &Host {
        &self.context.master_host
    }

    pub async fn running_workflow_count(&self) -> usize {
        self.context.workflow_runnables.len().await
    }

    async fn local_workflow(
        &self,
        workflow_instance_id: i64,
    ) -> OrchestratorResult<Arc<WorkflowExecutionRunnable>> {
        self.context
            .workflow_runnables
            .get(workflow_instance_id)
            .await
            .ok_or(OrchestratorError::WorkflowNotRunningHere {
                id: workflow_instance_id,
            })
    }

    // ---- Worker回调 ----

    /// 注册或刷新Worker心跳，上报时间以Master收到的时间为准
    pub async fn report_worker_heartbeat(
        &self,
        mut heartbeat: WorkerHeartBeat,
    ) -> OrchestratorResult<()> {
        if heartbeat.host.trim().is_empty() {
            return Err(OrchestratorError::InvalidArgument(
                "Worker地址不能为空".to_string(),
            ));
        }
        heartbeat.report_time = Utc::now();
        debug!("Worker {} 心跳", heartbeat.address());
        self.registry_client.register_worker(&heartbeat).await
    }

    /// Worker主动下线，按失效处理其上的任务
    pub async fn unregister_worker(&self, host: &Host) -> OrchestratorResult<()> {
        info!("Worker {} 主动下线", host);
        self.registry_client.unregister(NodeType::Worker, host).await
    }

    pub async fn report_task_running(&self, request: TaskRunningRequest) -> OrchestratorResult<()> {
        let wf = self.local_workflow(request.workflow_instance_id).await?;
        debug!(
            "任务实例 {} 在 {} 上开始运行",
            request.task_instance_id, request.host
        );
        wf.publish(TaskLifecycleEvent::Running {
            task_instance_id: request.task_instance_id,
            host: request.host,
            start_time: request.start_time,
            app_ids: request.app_ids,
        })
    }

    pub async fn report_task_finished(
        &self,
        kind: TaskFinishKind,
        request: TaskFinishRequest,
    ) -> OrchestratorResult<()> {
        let wf = self.local_workflow(request.workflow_instance_id).await?;
        let task_instance_id = request.task_instance_id;
        let end_time = request.end_time.unwrap_or_else(Utc::now);
        debug!("任务实例 {} 回报结束: {:?}", task_instance_id, kind);
        let event = match kind {
            TaskFinishKind::Success => TaskLifecycleEvent::Success {
                task_instance_id,
                end_time,
            },
            TaskFinishKind::Failed => TaskLifecycleEvent::Failed {
                task_instance_id,
                end_time,
                cause: request.cause.unwrap_or_default(),
            },
            TaskFinishKind::Killed => TaskLifecycleEvent::Killed {
                task_instance_id,
                end_time,
            },
            TaskFinishKind::Paused => TaskLifecycleEvent::Paused {
                task_instance_id,
                end_time,
            },
        };
        wf.publish(event)
    }

    // ---- 工作流控制 ----

    pub async fn trigger_workflow(&self, request: &TriggerWorkflowRequest) -> OrchestratorResult<i64> {
        self.trigger
            .handle_command(&request.to_command(CommandType::StartWorkflow))
            .await
    }

    pub async fn schedule_workflow(
        &self,
        request: &TriggerWorkflowRequest,
    ) -> OrchestratorResult<i64> {
        if request.schedule_time.is_none() {
            return Err(OrchestratorError::invalid_argument("调度触发需要 schedule_time"));
        }
        self.trigger
            .handle_command(&request.to_command(CommandType::Scheduler))
            .await
    }

    pub async fn backfill_workflow(&self, request: &BackfillRequest) -> OrchestratorResult<Vec<i64>> {
        if request.schedule_times.is_empty() {
            return Err(OrchestratorError::invalid_argument("补数需要至少一个调度时间"));
        }
        let mut schedule_times = request.schedule_times.clone();
        schedule_times.sort();
        schedule_times.dedup();

        let mut ids = Vec::with_capacity(schedule_times.len());
        for schedule_time in schedule_times {
            let mut command = request.workflow.to_command(CommandType::Backfill);
            command.schedule_time = Some(schedule_time);
            ids.push(self.trigger.handle_command(&command).await?);
        }
        info!("补数提交了 {} 个工作流实例", ids.len());
        Ok(ids)
    }

    pub async fn repeat_run_workflow(&self, workflow_instance_id: i64) -> OrchestratorResult<i64> {
        self.recover(workflow_instance_id, CommandType::RepeatRunning, |s| s.is_finished())
            .await
    }

    pub async fn recover_failure_workflow(
        &self,
        workflow_instance_id: i64,
    ) -> OrchestratorResult<i64> {
        self.recover(workflow_instance_id, CommandType::RecoverFromFailure, |s| {
            matches!(
                s,
                WorkflowExecutionStatus::Failure | WorkflowExecutionStatus::Stopped
            )
        })
        .await
    }

    pub async fn recover_suspend_workflow(
        &self,
        workflow_instance_id: i64,
    ) -> OrchestratorResult<i64> {
        self.recover(workflow_instance_id, CommandType::RecoverSuspended, |s| {
            matches!(
                s,
                WorkflowExecutionStatus::Paused | WorkflowExecutionStatus::Stopped
            )
        })
        .await
    }

    async fn recover<F>(
        &self,
        workflow_instance_id: i64,
        command_type: CommandType,
        accepts: F,
    ) -> OrchestratorResult<i64>
    where
        F: Fn(WorkflowExecutionStatus) -> bool,
    {
        let instance = self
            .context
            .workflow_instance_repository
            .find_by_id(workflow_instance_id)
            .await?
            .ok_or_else(|| OrchestratorError::workflow_instance_not_found(workflow_instance_id))?;
        if !accepts(instance.state) {
            return Err(OrchestratorError::illegal_transition(format!(
                "{} 不能执行 {:?}",
                instance.entity_description(),
                command_type
            )));
        }
        self.trigger
            .handle_command(&Command::recover(command_type, &instance))
            .await
    }

    pub async fn pause_workflow(&self, workflow_instance_id: i64) -> OrchestratorResult<()> {
        let wf = self.local_workflow(workflow_instance_id).await?;
        let state = wf.state().await;
        if state != WorkflowState::Running {
            return Err(OrchestratorError::illegal_transition(format!(
                "工作流实例 {} 处于 {:?}，无法暂停",
                workflow_instance_id, state
            )));
        }
        info!("请求暂停工作流实例 {}", workflow_instance_id);
        wf.publish(WorkflowLifecycleEvent::Pause)
    }

    pub async fn stop_workflow(&self, workflow_instance_id: i64) -> OrchestratorResult<()> {
        let wf = self.local_workflow(workflow_instance_id).await?;
        let state = wf.state().await;
        if !matches!(state, WorkflowState::Running | WorkflowState::Pausing) {
            return Err(OrchestratorError::illegal_transition(format!(
                "工作流实例 {} 处于 {:?}，无法停止",
                workflow_instance_id, state
            )));
        }
        info!("请求停止工作流实例 {}", workflow_instance_id);
        wf.publish(WorkflowLifecycleEvent::Stop)
    }

    // ---- 任务控制 ----

    async fn task_workflow(
        &self,
        task_instance_id: i64,
    ) -> OrchestratorResult<Arc<WorkflowExecutionRunnable>> {
        let task = self
            .context
            .task_instance_repository
            .find_by_id(task_instance_id)
            .await?
            .ok_or_else(|| OrchestratorError::task_instance_not_found(task_instance_id))?;
        self.local_workflow(task.workflow_instance_id).await
    }

    pub async fn kill_task(&self, task_instance_id: i64) -> OrchestratorResult<()> {
        let wf = self.task_workflow(task_instance_id).await?;
        wf.publish(TaskLifecycleEvent::Kill { task_instance_id })
    }

    pub async fn pause_task(&self, task_instance_id: i64) -> OrchestratorResult<()> {
        let wf = self.task_workflow(task_instance_id).await?;
        wf.publish(TaskLifecycleEvent::Pause { task_instance_id })
    }

    pub async fn force_start_task(&self, task_instance_id: i64) -> OrchestratorResult<()> {
        let wf = self.task_workflow(task_instance_id).await?;
        let runnable = wf
            .dag()
            .get_task_execution_runnable_by_id(task_instance_id)
            .await
            .ok_or_else(|| OrchestratorError::task_instance_not_found(task_instance_id))?;
        let state = runnable.state().await;
        if !(state.is_failure() || state == TaskExecutionStatus::Paused) {
            return Err(OrchestratorError::illegal_transition(format!(
                "任务实例 {} 处于 {:?}，无法强制成功",
                task_instance_id, state
            )));
        }
        wf.publish(TaskLifecycleEvent::ForceStart { task_instance_id })
    }
}
