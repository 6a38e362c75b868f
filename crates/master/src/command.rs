//! 命令消费与工作流触发
//!
//! 新建类命令（启动、调度、补数）创建工作流实例；恢复类命令复用已有实例，
//! 按命令类型从历史任务中恢复运行期DAG后重新启动。

use chrono::Utc;
use orchestrator_domain::{
    Command, CommandType, TakeOverRequest, TaskExecutionStatus, TaskInstance, WorkflowDefinition,
    WorkflowExecutionStatus, WorkflowInstance,
};
use orchestrator_errors::{OrchestratorError, OrchestratorResult};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::context::MasterContext;
use crate::event_bus::WorkflowEventBusCoordinator;
use crate::events::WorkflowLifecycleEvent;
use crate::runnable::{TaskExecutionRunnable, WorkflowExecutionRunnable};

/// 恢复时对单个历史任务的处理
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RestoreDecision {
    /// 保留结果，节点不再运行
    Keep,
    /// 作废该任务，节点按拓扑重新触发
    Rerun,
    /// 仍在Worker上运行，尝试接管
    TakeOver,
    /// 沿用未分发的任务重新入队
    Requeue,
    /// 生成一次新的尝试
    NewAttempt,
}

fn restore_decision(command_type: CommandType, state: TaskExecutionStatus) -> RestoreDecision {
    use TaskExecutionStatus::*;
    match (command_type, state) {
        (CommandType::RepeatRunning, _) => RestoreDecision::Rerun,
        (_, Success | ForcedSuccess) => RestoreDecision::Keep,
        (CommandType::RecoverFromFailure, Failure | Killed) => RestoreDecision::Rerun,
        (CommandType::RecoverSuspended, Paused | Killed) => RestoreDecision::Rerun,
        (_, Paused | Killed | Failure) => RestoreDecision::Keep,
        (_, Dispatched | Running) => RestoreDecision::TakeOver,
        (_, Submitted) => RestoreDecision::Requeue,
        (_, NeedFaultTolerance) => RestoreDecision::NewAttempt,
    }
}

/// 把命令转化为运行中的工作流
pub struct WorkflowTrigger {
    context: Arc<MasterContext>,
    event_bus: Arc<WorkflowEventBusCoordinator>,
}

impl WorkflowTrigger {
    pub fn new(context: Arc<MasterContext>, event_bus: Arc<WorkflowEventBusCoordinator>) -> Self {
        Self { context, event_bus }
    }

    /// 处理一条命令，返回开始运行的工作流实例ID
    pub async fn handle_command(&self, command: &Command) -> OrchestratorResult<i64> {
        let (instance, definition) = if command.command_type.is_recovery() {
            self.prepare_recovery(command).await?
        } else {
            self.create_instance(command).await?
        };

        let wf = Arc::new(WorkflowExecutionRunnable::new(
            instance,
            Arc::new(definition),
        )?);
        if command.command_type.is_recovery() {
            self.restore_tasks(&wf, command.command_type).await?;
        }

        self.context.workflow_runnables.insert(wf.clone()).await?;
        self.context.metrics.record_workflow_submit();
        self.context
            .metrics
            .set_running_workflows(self.context.workflow_runnables.len().await);

        self.event_bus.start(wf.clone()).await?;
        wf.publish(WorkflowLifecycleEvent::Start)?;
        info!(
            "命令 {:?} 已提交工作流实例 {}",
            command.command_type,
            wf.id()
        );
        Ok(wf.id())
    }

    async fn find_definition(
        &self,
        code: i64,
        version: Option<i32>,
    ) -> OrchestratorResult<WorkflowDefinition> {
        let repository = &self.context.workflow_definition_repository;
        let definition = match version {
            Some(version) => repository.find_by_code_and_version(code, version).await?,
            None => repository.find_latest(code).await?,
        };
        definition.ok_or(OrchestratorError::WorkflowDefinitionNotFound { code })
    }

    async fn create_instance(
        &self,
        command: &Command,
    ) -> OrchestratorResult<(WorkflowInstance, WorkflowDefinition)> {
        let definition = self
            .find_definition(
                command.workflow_definition_code,
                command.workflow_definition_version,
            )
            .await?;

        let mut instance = WorkflowInstance::new(&definition, command.command_type);
        instance.priority = command.priority;
        instance.failure_strategy = command.failure_strategy;
        instance.schedule_time = command.schedule_time;
        instance.start_params = command.command_params.clone();
        instance.host = Some(self.context.master_host.clone());
        instance.run_times = 1;
        let instance = self
            .context
            .workflow_instance_repository
            .create(&instance)
            .await?;
        Ok((instance, definition))
    }

    async fn prepare_recovery(
        &self,
        command: &Command,
    ) -> OrchestratorResult<(WorkflowInstance, WorkflowDefinition)> {
        let id = command.workflow_instance_id.ok_or_else(|| {
            OrchestratorError::invalid_argument(format!(
                "{:?} 命令缺少工作流实例ID",
                command.command_type
            ))
        })?;
        if self.context.workflow_runnables.contains(id).await {
            return Err(OrchestratorError::WorkflowAlreadyRunning { id });
        }
        let mut instance = self
            .context
            .workflow_instance_repository
            .find_by_id(id)
            .await?
            .ok_or_else(|| OrchestratorError::workflow_instance_not_found(id))?;
        let definition = self
            .find_definition(
                instance.workflow_definition_code,
                Some(instance.workflow_definition_version),
            )
            .await?;

        instance.command_type = command.command_type;
        instance.state = WorkflowExecutionStatus::Submitted;
        instance.host = Some(self.context.master_host.clone());
        instance.restart_time = Some(Utc::now());
        instance.end_time = None;
        instance.failure_cause = None;
        instance.run_times += 1;
        self.context
            .workflow_instance_repository
            .update(&instance)
            .await?;
        Ok((instance, definition))
    }

    /// 根据命令类型把历史任务恢复为运行体
    async fn restore_tasks(
        &self,
        wf: &Arc<WorkflowExecutionRunnable>,
        command_type: CommandType,
    ) -> OrchestratorResult<()> {
        let tasks = self
            .context
            .task_instance_repository
            .query_valid_task_list_by_workflow_instance_id(wf.id())
            .await?;

        for task in tasks {
            if wf.dag().task_definition(&task.name).is_none() {
                debug!("任务 {} 已不在工作流定义中，忽略", task.name);
                continue;
            }
            let decision = restore_decision(command_type, task.state);
            debug!("恢复任务实例 {} ({:?}): {:?}", task.id, task.state, decision);
            match decision {
                RestoreDecision::Keep | RestoreDecision::Requeue => self.store(wf, task).await,
                RestoreDecision::Rerun => self.invalidate(task).await?,
                RestoreDecision::TakeOver => self.take_over(wf, task).await?,
                RestoreDecision::NewAttempt => self.new_attempt(wf, task).await?,
            }
        }
        Ok(())
    }

    async fn store(&self, wf: &WorkflowExecutionRunnable, task: TaskInstance) {
        wf.dag()
            .store_task_execution_runnable(Arc::new(TaskExecutionRunnable::new(task)))
            .await;
    }

    async fn invalidate(&self, mut task: TaskInstance) -> OrchestratorResult<()> {
        task.valid = false;
        self.context.task_instance_repository.update(&task).await
    }

    async fn new_attempt(
        &self,
        wf: &WorkflowExecutionRunnable,
        mut task: TaskInstance,
    ) -> OrchestratorResult<()> {
        let next = task.new_attempt(false);
        task.valid = false;
        self.context.task_instance_repository.update(&task).await?;
        let next = self.context.task_instance_repository.create(&next).await?;
        self.store(wf, next).await;
        Ok(())
    }

    /// 接管Worker上仍在运行的任务，失败时重新提交
    async fn take_over(
        &self,
        wf: &WorkflowExecutionRunnable,
        mut task: TaskInstance,
    ) -> OrchestratorResult<()> {
        let Some(host) = task.host.clone() else {
            return self.new_attempt(wf, task).await;
        };
        let request = TakeOverRequest {
            task_instance_id: task.id,
            workflow_instance_id: wf.id(),
            master_host: self.context.master_host.clone(),
        };
        match self
            .context
            .executor_client
            .take_over_task(&host, &request)
            .await
        {
            Ok(true) => {
                info!("已接管Worker {} 上的任务实例 {}", host, task.id);
                self.store(wf, task).await;
                Ok(())
            }
            Ok(false) => {
                info!("Worker {} 上已不存在任务实例 {}，重新提交", host, task.id);
                task.state = TaskExecutionStatus::NeedFaultTolerance;
                self.new_attempt(wf, task).await
            }
            Err(e) => {
                warn!("接管任务实例 {} 失败: {}，重新提交", task.id, e);
                task.state = TaskExecutionStatus::NeedFaultTolerance;
                self.new_attempt(wf, task).await
            }
        }
    }
}

/// 周期性地从命令仓储领取命令
pub struct CommandConsumer {
    context: Arc<MasterContext>,
    trigger: Arc<WorkflowTrigger>,
}

impl CommandConsumer {
    pub fn new(context: Arc<MasterContext>, trigger: Arc<WorkflowTrigger>) -> Self {
        Self { context, trigger }
    }

    pub async fn run(self: Arc<Self>, mut shutdown_rx: broadcast::Receiver<()>) {
        let interval = Duration::from_millis(self.context.master_config.command_fetch_interval_ms);
        let mut ticker = tokio::time::interval(interval);
        info!("命令消费循环启动，间隔: {:?}", interval);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.consume_once().await {
                        error!("领取命令失败: {}", e);
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("命令消费循环停止");
                    break;
                }
            }
        }
    }

    /// 在运行上限内领取一批命令，返回成功启动的工作流数
    pub async fn consume_once(&self) -> OrchestratorResult<usize> {
        let running = self.context.workflow_runnables.len().await;
        let capacity = self
            .context
            .master_config
            .max_running_workflows
            .saturating_sub(running);
        if capacity == 0 {
            debug!("运行中的工作流已达上限 {}", running);
            return Ok(0);
        }

        let limit = capacity.min(self.context.master_config.command_fetch_batch_size.max(1));
        let commands = self.context.command_repository.claim_commands(limit).await?;
        let mut started = 0;
        for command in commands {
            match self.trigger.handle_command(&command).await {
                Ok(_) => started += 1,
                Err(e) => error!(
                    "处理命令 {} ({:?}) 失败: {}",
                    command.id, command.command_type, e
                ),
            }
        }
        Ok(started)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_restore_decisions() {
        use TaskExecutionStatus::*;

        assert_eq!(
            restore_decision(CommandType::RepeatRunning, Success),
            RestoreDecision::Rerun
        );
        assert_eq!(
            restore_decision(CommandType::RecoverFromFailure, Success),
            RestoreDecision::Keep
        );
        assert_eq!(
            restore_decision(CommandType::RecoverFromFailure, Failure),
            RestoreDecision::Rerun
        );
        assert_eq!(
            restore_decision(CommandType::RecoverFromFailure, Paused),
            RestoreDecision::Keep
        );
        assert_eq!(
            restore_decision(CommandType::RecoverSuspended, Paused),
            RestoreDecision::Rerun
        );
        assert_eq!(
            restore_decision(CommandType::RecoverSuspended, Failure),
            RestoreDecision::Keep
        );
        assert_eq!(
            restore_decision(CommandType::RecoverTolerantFault, Running),
            RestoreDecision::TakeOver
        );
        assert_eq!(
            restore_decision(CommandType::RecoverTolerantFault, Submitted),
            RestoreDecision::Requeue
        );
        assert_eq!(
            restore_decision(CommandType::RecoverTolerantFault, NeedFaultTolerance),
            RestoreDecision::NewAttempt
        );
    }
}
