//! 拓扑推进
//!
//! 状态动作和任务事件处理器共用的DAG操作：触发就绪节点、执行条件节点、
//! 撤回与取消任务、判断工作流是否结束。

use chrono::Utc;
use orchestrator_domain::{FailureStrategy, TaskExecutionStatus, TaskInstance};
use orchestrator_errors::{OrchestratorError, OrchestratorResult};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::context::MasterContext;
use crate::events::{TaskLifecycleEvent, WorkflowLifecycleEvent};
use crate::runnable::{TaskExecutionRunnable, WorkflowExecutionRunnable};
use crate::statemachine::WorkflowState;

/// 取消在途任务的方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelKind {
    Pause,
    Kill,
}

impl CancelKind {
    fn withdrawn_state(&self) -> TaskExecutionStatus {
        match self {
            CancelKind::Pause => TaskExecutionStatus::Paused,
            CancelKind::Kill => TaskExecutionStatus::Killed,
        }
    }
}

/// 按拓扑顺序触发所有就绪节点
pub async fn trigger_ready_tasks(
    ctx: &MasterContext,
    wf: &Arc<WorkflowExecutionRunnable>,
) -> OrchestratorResult<usize> {
    let mut triggered = 0;
    for name in wf.dag().topological_order().await? {
        if wf.dag().is_task_able_to_be_triggered(&name).await {
            trigger_task(ctx, wf, &name).await?;
            triggered += 1;
        }
    }
    Ok(triggered)
}

/// 触发给定节点中已就绪的那些
pub async fn trigger_nodes(
    ctx: &MasterContext,
    wf: &Arc<WorkflowExecutionRunnable>,
    names: &[String],
) -> OrchestratorResult<()> {
    for name in names {
        if wf.is_ending() {
            debug!("工作流实例 {} 正在结束，不再触发 {}", wf.id(), name);
            return Ok(());
        }
        if wf.dag().is_task_able_to_be_triggered(name).await {
            // trigger_task经条件节点会递归回到这里
            Box::pin(trigger_task(ctx, wf, name)).await?;
        }
    }
    Ok(())
}

/// 为节点创建任务实例；条件节点在Master本地执行，其余节点进入分发队列
pub async fn trigger_task(
    ctx: &MasterContext,
    wf: &Arc<WorkflowExecutionRunnable>,
    name: &str,
) -> OrchestratorResult<()> {
    let definition = wf.dag().task_definition(name).ok_or_else(|| {
        OrchestratorError::InvalidDag(format!("节点 {name} 没有对应的任务定义"))
    })?;
    let instance = wf.instance().await;
    let task = TaskInstance::from_definition(definition, &instance);
    let task = ctx.task_instance_repository.create(&task).await?;

    let runnable = Arc::new(TaskExecutionRunnable::new(task));
    wf.dag()
        .store_task_execution_runnable(runnable.clone())
        .await;
    ctx.metrics.record_task_submit();
    info!(
        "工作流实例 {} 触发任务 {} (任务实例ID: {})",
        wf.id(),
        name,
        runnable.id()
    );

    if runnable.is_conditions() {
        execute_conditions(ctx, wf, &runnable).await
    } else {
        wf.publish(TaskLifecycleEvent::Dispatch {
            task_instance_id: runnable.id(),
            delay_ms: 0,
        })
    }
}

/// 条件节点：直接上游全部成功走成功分支，否则走失败分支，未选中的分支被跳过
async fn execute_conditions(
    ctx: &MasterContext,
    wf: &Arc<WorkflowExecutionRunnable>,
    runnable: &Arc<TaskExecutionRunnable>,
) -> OrchestratorResult<()> {
    let now = Utc::now();
    let all_success = apply_conditions_branch(ctx, wf, runnable).await?;

    let task = runnable
        .update(|t| {
            t.state = TaskExecutionStatus::Success;
            t.host = Some(ctx.master_host.clone());
            t.start_time = Some(now);
            t.end_time = Some(now);
        })
        .await;
    ctx.task_instance_repository.update(&task).await?;
    ctx.metrics.record_task_finish("success");
    debug!(
        "条件任务 {} 执行完成，上游{}",
        runnable.name(),
        if all_success { "全部成功" } else { "存在失败" }
    );

    wf.publish(WorkflowLifecycleEvent::TopologyLogicalTransitionWithTaskFinish {
        task_instance_id: runnable.id(),
        task_name: runnable.name().to_string(),
    })
}

/// 按上游结果跳过条件节点未选中的分支，返回上游是否全部成功
pub async fn apply_conditions_branch(
    ctx: &MasterContext,
    wf: &Arc<WorkflowExecutionRunnable>,
    runnable: &TaskExecutionRunnable,
) -> OrchestratorResult<bool> {
    let dag = wf.dag();
    let mut all_success = true;
    for pre in dag.get_direct_pre_task_execution_runnable(runnable.name()).await {
        if !pre.is_success().await {
            all_success = false;
        }
    }

    let branches = dag
        .task_definition(runnable.name())
        .and_then(|t| t.condition_result())
        .unwrap_or_default();
    let (taken, not_taken) = if all_success {
        (&branches.success_node, &branches.failed_node)
    } else {
        (&branches.failed_node, &branches.success_node)
    };

    let mut skipped = Vec::new();
    for name in not_taken {
        if taken.contains(name) {
            continue;
        }
        skipped.extend(dag.skip_node_recursively(name).await);
    }

    // 被跳过节点的下游可能因此就绪
    for name in &skipped {
        let post_nodes = dag.get_direct_post_nodes(name).await;
        trigger_nodes(ctx, wf, &post_nodes).await?;
    }
    Ok(all_success)
}

/// 任务结束后推进下游
pub async fn on_task_finished(
    ctx: &MasterContext,
    wf: &Arc<WorkflowExecutionRunnable>,
    task_name: &str,
) -> OrchestratorResult<()> {
    let dag = wf.dag();
    let Some(runnable) = dag.get_task_execution_runnable_by_name(task_name).await else {
        warn!("工作流实例 {} 中不存在任务 {} 的运行体", wf.id(), task_name);
        return Ok(());
    };
    let state = runnable.state().await;
    let post_nodes = dag.get_direct_post_nodes(task_name).await;

    if state.is_success() {
        return trigger_nodes(ctx, wf, &post_nodes).await;
    }

    if state.is_failure() {
        if has_conditions_downstream(wf, task_name).await {
            // 条件节点只要求上游结束
            return trigger_nodes(ctx, wf, &post_nodes).await;
        }
        if wf.context().failure_strategy == FailureStrategy::End && !wf.is_ending() {
            info!(
                "工作流实例 {} 的任务 {} 失败，失败策略为End，停止其余任务",
                wf.id(),
                task_name
            );
            wf.mark_ending();
            cancel_active_tasks(ctx, wf, CancelKind::Kill).await;
        }
    }
    Ok(())
}

async fn has_conditions_downstream(wf: &WorkflowExecutionRunnable, task_name: &str) -> bool {
    wf.dag()
        .get_direct_post_nodes(task_name)
        .await
        .iter()
        .any(|post| {
            wf.dag()
                .task_definition(post)
                .map(|t| t.is_conditions())
                .unwrap_or(false)
        })
}

/// 没有在途任务时判断工作流结果并发布对应事件
pub async fn check_workflow_finish(wf: &Arc<WorkflowExecutionRunnable>) -> OrchestratorResult<()> {
    let dag = wf.dag();
    if !dag.active_task_execution_runnables().await.is_empty() {
        return Ok(());
    }

    let mut failed = Vec::new();
    let mut paused = Vec::new();
    let mut unreached = Vec::new();
    for name in dag.node_names().await {
        if dag.is_skipped(&name).await {
            continue;
        }
        let Some(runnable) = dag.get_task_execution_runnable_by_name(&name).await else {
            unreached.push(name);
            continue;
        };
        let state = runnable.state().await;
        if state.is_success() {
            continue;
        }
        if state == TaskExecutionStatus::Paused {
            paused.push(name);
        } else if !(state.is_failure() && has_conditions_downstream(wf, &name).await) {
            failed.push(name);
        }
    }

    if !failed.is_empty() {
        failed.sort();
        return wf.publish(WorkflowLifecycleEvent::Failed {
            cause: format!("任务未成功完成: {}", failed.join(", ")),
        });
    }
    if !paused.is_empty() {
        return wf.publish(WorkflowLifecycleEvent::Paused);
    }
    if !unreached.is_empty() {
        unreached.sort();
        return wf.publish(WorkflowLifecycleEvent::Failed {
            cause: format!("任务未被触发: {}", unreached.join(", ")),
        });
    }
    wf.publish(WorkflowLifecycleEvent::Succeed)
}

/// 撤回未分发的任务，对已分发的任务尽力发送暂停或终止
pub async fn cancel_active_tasks(
    ctx: &MasterContext,
    wf: &Arc<WorkflowExecutionRunnable>,
    kind: CancelKind,
) {
    for runnable in wf.dag().active_task_execution_runnables().await {
        if let Err(e) = cancel_task(ctx, wf, &runnable, kind).await {
            warn!("取消任务实例 {} 失败: {}", runnable.id(), e);
        }
    }
}

/// 取消单个任务：未分发的直接置为结束状态，已分发的通知Worker
pub async fn cancel_task(
    ctx: &MasterContext,
    wf: &Arc<WorkflowExecutionRunnable>,
    runnable: &Arc<TaskExecutionRunnable>,
    kind: CancelKind,
) -> OrchestratorResult<()> {
    let snapshot = runnable.snapshot().await;
    match snapshot.state {
        TaskExecutionStatus::Submitted | TaskExecutionStatus::NeedFaultTolerance => {
            ctx.dispatch_queue.remove(runnable.id()).await;
            mark_finished(ctx, runnable, kind.withdrawn_state(), None).await?;
            debug!("已撤回未分发的任务实例 {}", runnable.id());
            publish_task_finished(wf, runnable)
        }
        TaskExecutionStatus::Dispatched | TaskExecutionStatus::Running => {
            let Some(host) = snapshot.host else {
                return Ok(());
            };
            match kind {
                CancelKind::Pause => ctx.executor_client.pause_task(&host, runnable.id()).await,
                CancelKind::Kill => ctx.executor_client.kill_task(&host, runnable.id()).await,
            }
        }
        _ => Ok(()),
    }
}

/// 把任务置为结束状态并持久化
pub async fn mark_finished(
    ctx: &MasterContext,
    runnable: &TaskExecutionRunnable,
    state: TaskExecutionStatus,
    cause: Option<String>,
) -> OrchestratorResult<TaskInstance> {
    let now = Utc::now();
    let task = runnable
        .update(|t| {
            t.state = state;
            t.end_time = Some(now);
            if cause.is_some() {
                t.failure_cause = cause;
            }
        })
        .await;
    ctx.task_instance_repository.update(&task).await?;
    ctx.metrics.record_task_finish(task_result_label(state));
    Ok(task)
}

pub fn task_result_label(state: TaskExecutionStatus) -> &'static str {
    match state {
        TaskExecutionStatus::Success | TaskExecutionStatus::ForcedSuccess => "success",
        TaskExecutionStatus::Killed => "stop",
        TaskExecutionStatus::Paused => "pause",
        _ => "failure",
    }
}

pub fn publish_task_finished(
    wf: &WorkflowExecutionRunnable,
    runnable: &TaskExecutionRunnable,
) -> OrchestratorResult<()> {
    wf.publish(WorkflowLifecycleEvent::TopologyLogicalTransitionWithTaskFinish {
        task_instance_id: runnable.id(),
        task_name: runnable.name().to_string(),
    })
}

/// 暂停或停止超时后发布终态事件
pub fn spawn_cancel_timeout(
    ctx: &MasterContext,
    wf: &Arc<WorkflowExecutionRunnable>,
    event: WorkflowLifecycleEvent,
) {
    let timeout = Duration::from_secs(ctx.master_config.stop_wait_timeout_seconds);
    let wf = wf.clone();
    tokio::spawn(async move {
        tokio::time::sleep(timeout).await;
        let state = wf.state().await;
        if state.is_terminal() || state.is_finalizing_or_finalized() {
            return;
        }
        debug!("工作流实例 {} 等待在途任务超时", wf.id());
        if let Err(e) = wf.publish(event) {
            debug!("工作流实例 {} 超时事件未送达: {}", wf.id(), e);
        }
    });
}

/// 把工作流推进到终态，持久化后发布Finalize
pub async fn finish_workflow(
    ctx: &MasterContext,
    wf: &Arc<WorkflowExecutionRunnable>,
    target: WorkflowState,
    cause: Option<String>,
) -> OrchestratorResult<()> {
    wf.transition_to(target).await?;

    let now = Utc::now();
    let status = target.execution_status();
    let instance = wf
        .update_instance(|i| {
            if let Some(status) = status {
                i.state = status;
            }
            i.end_time = Some(now);
            if cause.is_some() {
                i.failure_cause = cause.clone();
            }
        })
        .await;
    if let Err(e) = ctx.workflow_instance_repository.update(&instance).await {
        error!("持久化工作流实例 {} 终态失败: {}", wf.id(), e);
    }

    let label = match target {
        WorkflowState::Success => "success",
        WorkflowState::Failed => "failure",
        WorkflowState::Stopped => "stop",
        _ => "pause",
    };
    ctx.metrics.record_workflow_finish(label, wf.elapsed_seconds());
    match &cause {
        Some(cause) => info!("{} 结束: {:?}, 原因: {}", instance.entity_description(), target, cause),
        None => info!("{} 结束: {:?}", instance.entity_description(), target),
    }

    wf.publish(WorkflowLifecycleEvent::Finalize)
}
