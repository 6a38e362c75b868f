use async_trait::async_trait;
use chrono::Utc;
use orchestrator_domain::{TaskExecutionStatus, WorkflowExecutionStatus};
use orchestrator_errors::OrchestratorResult;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::{WorkflowState, WorkflowStateAction};
use crate::context::MasterContext;
use crate::events::{TaskLifecycleEvent, WorkflowLifecycleEvent};
use crate::runnable::WorkflowExecutionRunnable;
use crate::topology::{self, CancelKind};

type Wf = Arc<WorkflowExecutionRunnable>;

async fn persist_state(
    ctx: &MasterContext,
    wf: &Wf,
    status: WorkflowExecutionStatus,
) -> OrchestratorResult<()> {
    let instance = wf.update_instance(|i| i.state = status).await;
    ctx.workflow_instance_repository.update(&instance).await
}

/// 进入暂停中或停止中：取消任务并开始等待在途任务
async fn begin_cancel(
    ctx: &MasterContext,
    wf: &Wf,
    kind: CancelKind,
) -> OrchestratorResult<()> {
    let (next, status, done_event) = match kind {
        CancelKind::Pause => (
            WorkflowState::Pausing,
            WorkflowExecutionStatus::ReadyPause,
            WorkflowLifecycleEvent::Paused,
        ),
        CancelKind::Kill => (
            WorkflowState::Stopping,
            WorkflowExecutionStatus::ReadyStop,
            WorkflowLifecycleEvent::Stopped,
        ),
    };
    wf.transition_to(next).await?;
    persist_state(ctx, wf, status).await?;
    info!("工作流实例 {} 进入 {:?}", wf.id(), next);

    topology::cancel_active_tasks(ctx, wf, kind).await;
    topology::spawn_cancel_timeout(ctx, wf, done_event.clone());
    publish_when_drained(wf, done_event).await
}

/// 没有未结束的任务时发布终态事件
async fn publish_when_drained(wf: &Wf, event: WorkflowLifecycleEvent) -> OrchestratorResult<()> {
    if wf.dag().active_task_execution_runnables().await.is_empty() {
        wf.publish(event)?;
    }
    Ok(())
}

/// 等待超时后仍未结束的任务直接置为给定状态
async fn force_finish_remaining(ctx: &MasterContext, wf: &Wf, state: TaskExecutionStatus) {
    for runnable in wf.dag().active_task_execution_runnables().await {
        warn!(
            "工作流实例 {} 的任务实例 {} 未在等待时间内结束，置为 {:?}",
            wf.id(),
            runnable.id(),
            state
        );
        ctx.dispatch_queue.remove(runnable.id()).await;
        if let Err(e) = topology::mark_finished(ctx, &runnable, state, None).await {
            warn!("更新任务实例 {} 失败: {}", runnable.id(), e);
        }
    }
}

async fn finalize_workflow(ctx: &MasterContext, wf: &Wf) -> OrchestratorResult<()> {
    wf.transition_to(WorkflowState::Finalizing).await?;
    if ctx.workflow_runnables.remove(wf.id()).await.is_none() {
        warn!("工作流实例 {} 不在运行仓库中", wf.id());
    }
    ctx.metrics
        .set_running_workflows(ctx.workflow_runnables.len().await);
    wf.transition_to(WorkflowState::Finalized).await?;
    info!("工作流实例 {} 收尾完成", wf.id());
    Ok(())
}

pub struct CreatedStateAction;

#[async_trait]
impl WorkflowStateAction for CreatedStateAction {
    fn state(&self) -> WorkflowState {
        WorkflowState::Created
    }

    async fn start_event_action(&self, ctx: &MasterContext, wf: &Wf) -> OrchestratorResult<()> {
        wf.transition_to(WorkflowState::Running).await?;

        let now = Utc::now();
        let master_host = ctx.master_host.clone();
        let instance = wf
            .update_instance(|i| {
                i.state = WorkflowExecutionStatus::Running;
                i.host = Some(master_host);
                if i.start_time.is_none() {
                    i.start_time = Some(now);
                }
            })
            .await;
        ctx.workflow_instance_repository.update(&instance).await?;
        ctx.metrics
            .set_running_workflows(ctx.workflow_runnables.len().await);
        info!("{} 开始运行", instance.entity_description());

        // 恢复出的任务：条件节点重新应用分支，待分发的重新入队
        for runnable in wf.dag().task_execution_runnables().await {
            let state = runnable.state().await;
            if runnable.is_conditions() && state.is_finished() {
                topology::apply_conditions_branch(ctx, wf, &runnable).await?;
            } else if state == TaskExecutionStatus::Submitted {
                wf.publish(TaskLifecycleEvent::Dispatch {
                    task_instance_id: runnable.id(),
                    delay_ms: 0,
                })?;
            }
        }

        let triggered = topology::trigger_ready_tasks(ctx, wf).await?;
        debug!("工作流实例 {} 启动时触发 {} 个任务", wf.id(), triggered);
        topology::check_workflow_finish(wf).await
    }

    async fn pause_event_action(&self, ctx: &MasterContext, wf: &Wf) -> OrchestratorResult<()> {
        topology::finish_workflow(ctx, wf, WorkflowState::Paused, None).await
    }

    async fn stop_event_action(&self, ctx: &MasterContext, wf: &Wf) -> OrchestratorResult<()> {
        topology::finish_workflow(ctx, wf, WorkflowState::Stopped, None).await
    }

    async fn failed_event_action(
        &self,
        ctx: &MasterContext,
        wf: &Wf,
        cause: &str,
    ) -> OrchestratorResult<()> {
        topology::finish_workflow(ctx, wf, WorkflowState::Failed, Some(cause.to_string())).await
    }
}

pub struct RunningStateAction;

#[async_trait]
impl WorkflowStateAction for RunningStateAction {
    fn state(&self) -> WorkflowState {
        WorkflowState::Running
    }

    async fn topology_logical_transition_with_task_finish_event_action(
        &self,
        ctx: &MasterContext,
        wf: &Wf,
        task_name: &str,
    ) -> OrchestratorResult<()> {
        topology::on_task_finished(ctx, wf, task_name).await?;
        topology::check_workflow_finish(wf).await
    }

    async fn pause_event_action(&self, ctx: &MasterContext, wf: &Wf) -> OrchestratorResult<()> {
        begin_cancel(ctx, wf, CancelKind::Pause).await
    }

    async fn stop_event_action(&self, ctx: &MasterContext, wf: &Wf) -> OrchestratorResult<()> {
        begin_cancel(ctx, wf, CancelKind::Kill).await
    }

    /// 有任务被单独暂停且其余任务都已结束
    async fn paused_event_action(&self, ctx: &MasterContext, wf: &Wf) -> OrchestratorResult<()> {
        wf.transition_to(WorkflowState::Pausing).await?;
        topology::finish_workflow(ctx, wf, WorkflowState::Paused, None).await
    }

    async fn succeed_event_action(&self, ctx: &MasterContext, wf: &Wf) -> OrchestratorResult<()> {
        topology::finish_workflow(ctx, wf, WorkflowState::Success, None).await
    }

    async fn failed_event_action(
        &self,
        ctx: &MasterContext,
        wf: &Wf,
        cause: &str,
    ) -> OrchestratorResult<()> {
        if !wf.dag().active_task_execution_runnables().await.is_empty() {
            wf.mark_ending();
            topology::cancel_active_tasks(ctx, wf, CancelKind::Kill).await;
        }
        topology::finish_workflow(ctx, wf, WorkflowState::Failed, Some(cause.to_string())).await
    }
}

pub struct PausingStateAction;

#[async_trait]
impl WorkflowStateAction for PausingStateAction {
    fn state(&self) -> WorkflowState {
        WorkflowState::Pausing
    }

    /// 暂停期间结束的任务不再推进下游
    async fn topology_logical_transition_with_task_finish_event_action(
        &self,
        _ctx: &MasterContext,
        wf: &Wf,
        _task_name: &str,
    ) -> OrchestratorResult<()> {
        publish_when_drained(wf, WorkflowLifecycleEvent::Paused).await
    }

    async fn pause_event_action(&self, _ctx: &MasterContext, wf: &Wf) -> OrchestratorResult<()> {
        debug!("工作流实例 {} 已在暂停中", wf.id());
        Ok(())
    }

    async fn paused_event_action(&self, ctx: &MasterContext, wf: &Wf) -> OrchestratorResult<()> {
        force_finish_remaining(ctx, wf, TaskExecutionStatus::Paused).await;
        topology::finish_workflow(ctx, wf, WorkflowState::Paused, None).await
    }

    async fn stop_event_action(&self, ctx: &MasterContext, wf: &Wf) -> OrchestratorResult<()> {
        begin_cancel(ctx, wf, CancelKind::Kill).await
    }

    async fn succeed_event_action(&self, _ctx: &MasterContext, wf: &Wf) -> OrchestratorResult<()> {
        debug!("工作流实例 {} 暂停中，忽略成功事件", wf.id());
        Ok(())
    }

    async fn failed_event_action(
        &self,
        ctx: &MasterContext,
        wf: &Wf,
        cause: &str,
    ) -> OrchestratorResult<()> {
        topology::finish_workflow(ctx, wf, WorkflowState::Failed, Some(cause.to_string())).await
    }
}

pub struct StoppingStateAction;

#[async_trait]
impl WorkflowStateAction for StoppingStateAction {
    fn state(&self) -> WorkflowState {
        WorkflowState::Stopping
    }

    async fn topology_logical_transition_with_task_finish_event_action(
        &self,
        _ctx: &MasterContext,
        wf: &Wf,
        _task_name: &str,
    ) -> OrchestratorResult<()> {
        publish_when_drained(wf, WorkflowLifecycleEvent::Stopped).await
    }

    async fn pause_event_action(&self, _ctx: &MasterContext, wf: &Wf) -> OrchestratorResult<()> {
        debug!("工作流实例 {} 停止中，忽略暂停请求", wf.id());
        Ok(())
    }

    /// 暂停等待超时的遗留事件
    async fn paused_event_action(&self, _ctx: &MasterContext, wf: &Wf) -> OrchestratorResult<()> {
        debug!("工作流实例 {} 停止中，忽略暂停完成事件", wf.id());
        Ok(())
    }

    async fn stop_event_action(&self, _ctx: &MasterContext, wf: &Wf) -> OrchestratorResult<()> {
        debug!("工作流实例 {} 已在停止中", wf.id());
        Ok(())
    }

    async fn stopped_event_action(&self, ctx: &MasterContext, wf: &Wf) -> OrchestratorResult<()> {
        force_finish_remaining(ctx, wf, TaskExecutionStatus::Killed).await;
        topology::finish_workflow(ctx, wf, WorkflowState::Stopped, None).await
    }

    async fn succeed_event_action(&self, _ctx: &MasterContext, wf: &Wf) -> OrchestratorResult<()> {
        debug!("工作流实例 {} 停止中，忽略成功事件", wf.id());
        Ok(())
    }

    async fn failed_event_action(
        &self,
        ctx: &MasterContext,
        wf: &Wf,
        cause: &str,
    ) -> OrchestratorResult<()> {
        topology::finish_workflow(ctx, wf, WorkflowState::Failed, Some(cause.to_string())).await
    }
}

/// 终态：拓扑推进和重复的终态事件都是空操作，只接受Finalize
macro_rules! terminal_state_action {
    ($name:ident, $state:expr) => {
        pub struct $name;

        #[async_trait]
        impl WorkflowStateAction for $name {
            fn state(&self) -> WorkflowState {
                $state
            }

            async fn topology_logical_transition_with_task_finish_event_action(
                &self,
                _ctx: &MasterContext,
                wf: &Wf,
                task_name: &str,
            ) -> OrchestratorResult<()> {
                debug!(
                    "工作流实例 {} 已处于 {:?}，忽略任务 {} 的拓扑推进",
                    wf.id(),
                    $state,
                    task_name
                );
                Ok(())
            }

            async fn paused_event_action(&self, _ctx: &MasterContext, _wf: &Wf) -> OrchestratorResult<()> {
                Ok(())
            }

            async fn stopped_event_action(&self, _ctx: &MasterContext, _wf: &Wf) -> OrchestratorResult<()> {
                Ok(())
            }

            async fn succeed_event_action(&self, _ctx: &MasterContext, _wf: &Wf) -> OrchestratorResult<()> {
                Ok(())
            }

            async fn failed_event_action(
                &self,
                _ctx: &MasterContext,
                _wf: &Wf,
                _cause: &str,
            ) -> OrchestratorResult<()> {
                Ok(())
            }

            async fn finalize_event_action(&self, ctx: &MasterContext, wf: &Wf) -> OrchestratorResult<()> {
                finalize_workflow(ctx, wf).await
            }
        }
    };
}

terminal_state_action!(PausedStateAction, WorkflowState::Paused);
terminal_state_action!(StoppedStateAction, WorkflowState::Stopped);
terminal_state_action!(FailedStateAction, WorkflowState::Failed);
terminal_state_action!(SuccessStateAction, WorkflowState::Success);

/// 收尾中与收尾完成：所有事件都是空操作，重复的Finalize不会再次移除
pub struct FinalizedStateAction {
    state: WorkflowState,
}

impl FinalizedStateAction {
    pub fn finalizing() -> Self {
        Self {
            state: WorkflowState::Finalizing,
        }
    }

    pub fn finalized() -> Self {
        Self {
            state: WorkflowState::Finalized,
        }
    }
}

#[async_trait]
impl WorkflowStateAction for FinalizedStateAction {
    fn state(&self) -> WorkflowState {
        self.state
    }

    async fn topology_logical_transition_with_task_finish_event_action(
        &self,
        _ctx: &MasterContext,
        _wf: &Wf,
        _task_name: &str,
    ) -> OrchestratorResult<()> {
        Ok(())
    }

    async fn paused_event_action(&self, _ctx: &MasterContext, _wf: &Wf) -> OrchestratorResult<()> {
        Ok(())
    }

    async fn stopped_event_action(&self, _ctx: &MasterContext, _wf: &Wf) -> OrchestratorResult<()> {
        Ok(())
    }

    async fn succeed_event_action(&self, _ctx: &MasterContext, _wf: &Wf) -> OrchestratorResult<()> {
        Ok(())
    }

    async fn failed_event_action(
        &self,
        _ctx: &MasterContext,
        _wf: &Wf,
        _cause: &str,
    ) -> OrchestratorResult<()> {
        Ok(())
    }

    async fn finalize_event_action(&self, _ctx: &MasterContext, wf: &Wf) -> OrchestratorResult<()> {
        debug!("工作流实例 {} 已收尾，忽略重复的Finalize", wf.id());
        Ok(())
    }
}
