use async_trait::async_trait;
use chrono::Utc;
use orchestrator_domain::TaskExecutionStatus;
use orchestrator_errors::{OrchestratorError, OrchestratorResult};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::context::MasterContext;
use crate::events::{TaskLifecycleEvent, TaskLifecycleEventType};
use crate::runnable::{TaskExecutionRunnable, WorkflowExecutionRunnable};
use crate::statemachine::WorkflowState;
use crate::topology::{self, CancelKind};

/// 任务事件处理器，每种事件类型一个
#[async_trait]
pub trait TaskLifecycleEventHandler: Send + Sync {
    fn event_type(&self) -> TaskLifecycleEventType;

    async fn handle(
        &self,
        ctx: &MasterContext,
        wf: &Arc<WorkflowExecutionRunnable>,
        runnable: Arc<TaskExecutionRunnable>,
        event: &TaskLifecycleEvent,
    ) -> OrchestratorResult<()>;
}

fn mismatched(event: &TaskLifecycleEvent) -> OrchestratorError {
    OrchestratorError::Internal(format!("事件 {:?} 被分派到了错误的处理器", event))
}

/// 工作流是否仍在正常推进
async fn is_advancing(wf: &WorkflowExecutionRunnable) -> bool {
    wf.state().await == WorkflowState::Running && !wf.is_ending()
}

/// 创建节点的新一次尝试并放入分发队列
async fn submit_new_attempt(
    ctx: &MasterContext,
    wf: &Arc<WorkflowExecutionRunnable>,
    runnable: &TaskExecutionRunnable,
    count_as_retry: bool,
    delay: Duration,
) -> OrchestratorResult<Arc<TaskExecutionRunnable>> {
    let next = runnable.snapshot().await.new_attempt(count_as_retry);
    let next = ctx.task_instance_repository.create(&next).await?;
    let next = Arc::new(TaskExecutionRunnable::new(next));
    wf.dag().store_task_execution_runnable(next.clone()).await;
    wf.publish(TaskLifecycleEvent::Dispatch {
        task_instance_id: next.id(),
        delay_ms: delay.as_millis() as u64,
    })?;
    Ok(next)
}

pub struct TaskDispatchEventHandler;

#[async_trait]
impl TaskLifecycleEventHandler for TaskDispatchEventHandler {
    fn event_type(&self) -> TaskLifecycleEventType {
        TaskLifecycleEventType::Dispatch
    }

    async fn handle(
        &self,
        ctx: &MasterContext,
        wf: &Arc<WorkflowExecutionRunnable>,
        runnable: Arc<TaskExecutionRunnable>,
        event: &TaskLifecycleEvent,
    ) -> OrchestratorResult<()> {
        let TaskLifecycleEvent::Dispatch { delay_ms, .. } = event else {
            return Err(mismatched(event));
        };
        if runnable.state().await != TaskExecutionStatus::Submitted {
            debug!("任务实例 {} 已不是待分发状态", runnable.id());
            return Ok(());
        }
        if !is_advancing(wf).await {
            debug!("工作流实例 {} 未在运行，任务 {} 不入队", wf.id(), runnable.id());
            return Ok(());
        }
        ctx.dispatch_queue
            .push(runnable, Duration::from_millis(*delay_ms))
            .await;
        ctx.metrics
            .set_dispatch_queue_size(ctx.dispatch_queue.len().await);
        Ok(())
    }
}

pub struct TaskDispatchedEventHandler;

#[async_trait]
impl TaskLifecycleEventHandler for TaskDispatchedEventHandler {
    fn event_type(&self) -> TaskLifecycleEventType {
        TaskLifecycleEventType::Dispatched
    }

    async fn handle(
        &self,
        ctx: &MasterContext,
        wf: &Arc<WorkflowExecutionRunnable>,
        runnable: Arc<TaskExecutionRunnable>,
        event: &TaskLifecycleEvent,
    ) -> OrchestratorResult<()> {
        let TaskLifecycleEvent::Dispatched { host, .. } = event else {
            return Err(mismatched(event));
        };

        let task = runnable.snapshot().await;
        match task.state {
            TaskExecutionStatus::Submitted => {}
            // 发送途中被Master撤回的任务从未记录过Worker，需要终止Worker上的副本
            TaskExecutionStatus::Killed | TaskExecutionStatus::Paused if task.host.is_none() => {
                warn!("任务实例 {} 已被撤回但仍送达 {}，尝试终止", runnable.id(), host);
                return ctx.executor_client.kill_task(host, runnable.id()).await;
            }
            // Worker的运行或结束回报先于分发确认到达
            state => {
                debug!(
                    "任务实例 {} 分发确认晚于状态回报 {:?}，只补记Worker",
                    runnable.id(),
                    state
                );
                if task.host.is_none() || task.dispatch_time.is_none() {
                    let now = Utc::now();
                    let task = runnable
                        .update(|t| {
                            t.host.get_or_insert_with(|| host.clone());
                            t.dispatch_time.get_or_insert(now);
                        })
                        .await;
                    ctx.task_instance_repository.update(&task).await?;
                }
                return Ok(());
            }
        }

        if runnable.dispatch_fail_times() > 0 {
            ctx.metrics.decrease_dispatch_failed_tasks();
        }
        let now = Utc::now();
        let task = runnable
            .update(|t| {
                t.state = TaskExecutionStatus::Dispatched;
                t.host = Some(host.clone());
                t.dispatch_time = Some(now);
            })
            .await;
        ctx.task_instance_repository.update(&task).await?;

        match wf.state().await {
            WorkflowState::Pausing => ctx.executor_client.pause_task(host, runnable.id()).await,
            WorkflowState::Stopping => ctx.executor_client.kill_task(host, runnable.id()).await,
            _ if wf.is_ending() => ctx.executor_client.kill_task(host, runnable.id()).await,
            _ => Ok(()),
        }
    }
}

pub struct TaskDispatchFailedEventHandler;

#[async_trait]
impl TaskLifecycleEventHandler for TaskDispatchFailedEventHandler {
    fn event_type(&self) -> TaskLifecycleEventType {
        TaskLifecycleEventType::DispatchFailed
    }

    async fn handle(
        &self,
        ctx: &MasterContext,
        wf: &Arc<WorkflowExecutionRunnable>,
        runnable: Arc<TaskExecutionRunnable>,
        event: &TaskLifecycleEvent,
    ) -> OrchestratorResult<()> {
        let TaskLifecycleEvent::DispatchFailed { cause, .. } = event else {
            return Err(mismatched(event));
        };
        if runnable.state().await != TaskExecutionStatus::Submitted {
            return Ok(());
        }

        let fail_times = runnable.increase_dispatch_fail_times();
        if fail_times == 1 {
            ctx.metrics.increase_dispatch_failed_tasks();
        }
        let max_failures = ctx.dispatch_config.max_dispatch_failures.max(1);

        if fail_times >= max_failures {
            warn!(
                "任务实例 {} 分发失败 {} 次，置为失败: {}",
                runnable.id(),
                fail_times,
                cause
            );
            ctx.metrics.decrease_dispatch_failed_tasks();
            topology::mark_finished(
                ctx,
                &runnable,
                TaskExecutionStatus::Failure,
                Some(format!("分发失败 {fail_times} 次: {cause}")),
            )
            .await?;
            return topology::publish_task_finished(wf, &runnable);
        }

        if is_advancing(wf).await {
            debug!(
                "任务实例 {} 第 {} 次分发失败，稍后重新分发: {}",
                runnable.id(),
                fail_times,
                cause
            );
            ctx.dispatch_queue
                .push(
                    runnable,
                    Duration::from_millis(ctx.dispatch_config.dispatch_failed_backoff_ms),
                )
                .await;
            return Ok(());
        }

        let state = if wf.state().await == WorkflowState::Pausing {
            TaskExecutionStatus::Paused
        } else {
            TaskExecutionStatus::Killed
        };
        ctx.metrics.decrease_dispatch_failed_tasks();
        topology::mark_finished(ctx, &runnable, state, None).await?;
        topology::publish_task_finished(wf, &runnable)
    }
}

pub struct TaskRunningEventHandler;

#[async_trait]
impl TaskLifecycleEventHandler for TaskRunningEventHandler {
    fn event_type(&self) -> TaskLifecycleEventType {
        TaskLifecycleEventType::Running
    }

    async fn handle(
        &self,
        ctx: &MasterContext,
        wf: &Arc<WorkflowExecutionRunnable>,
        runnable: Arc<TaskExecutionRunnable>,
        event: &TaskLifecycleEvent,
    ) -> OrchestratorResult<()> {
        let TaskLifecycleEvent::Running {
            host,
            start_time,
            app_ids,
            ..
        } = event
        else {
            return Err(mismatched(event));
        };
        if runnable.is_finished().await {
            debug!("任务实例 {} 已结束，忽略运行事件", runnable.id());
            return Ok(());
        }
        if !wf.dag().is_current_attempt(&runnable).await {
            return Ok(());
        }
        let was_running = runnable.state().await == TaskExecutionStatus::Running;
        let task = runnable
            .update(|t| {
                t.state = TaskExecutionStatus::Running;
                t.host = Some(host.clone());
                t.start_time = Some(*start_time);
                if !app_ids.is_empty() {
                    t.app_ids = app_ids.clone();
                }
            })
            .await;
        ctx.task_instance_repository.update(&task).await?;

        if let (false, Some(seconds)) = (was_running, runnable.context().timeout_seconds) {
            spawn_task_timeout(ctx, wf, runnable, Duration::from_secs(seconds));
        }
        Ok(())
    }
}

/// 任务运行超时后终止
fn spawn_task_timeout(
    ctx: &MasterContext,
    wf: &Arc<WorkflowExecutionRunnable>,
    runnable: Arc<TaskExecutionRunnable>,
    timeout: Duration,
) {
    let wf = wf.clone();
    let metrics = ctx.metrics.clone();
    tokio::spawn(async move {
        tokio::time::sleep(timeout).await;
        if runnable.is_finished().await || !wf.dag().is_current_attempt(&runnable).await {
            return;
        }
        warn!("任务实例 {} 运行超过 {:?}，终止", runnable.id(), timeout);
        metrics.record_task_timeout();
        if let Err(e) = wf.publish(TaskLifecycleEvent::Kill {
            task_instance_id: runnable.id(),
        }) {
            debug!("任务实例 {} 超时事件未送达: {}", runnable.id(), e);
        }
    });
}

/// Worker回报的终态：Success / Failed / Killed / Paused
pub struct TaskFinishedEventHandler {
    event_type: TaskLifecycleEventType,
}

impl TaskFinishedEventHandler {
    pub fn new(event_type: TaskLifecycleEventType) -> Self {
        Self { event_type }
    }
}

#[async_trait]
impl TaskLifecycleEventHandler for TaskFinishedEventHandler {
    fn event_type(&self) -> TaskLifecycleEventType {
        self.event_type
    }

    async fn handle(
        &self,
        ctx: &MasterContext,
        wf: &Arc<WorkflowExecutionRunnable>,
        runnable: Arc<TaskExecutionRunnable>,
        event: &TaskLifecycleEvent,
    ) -> OrchestratorResult<()> {
        let (state, end_time, cause) = match event {
            TaskLifecycleEvent::Success { end_time, .. } => {
                (TaskExecutionStatus::Success, *end_time, None)
            }
            TaskLifecycleEvent::Failed {
                end_time, cause, ..
            } => (TaskExecutionStatus::Failure, *end_time, Some(cause.clone())),
            TaskLifecycleEvent::Killed { end_time, .. } => {
                (TaskExecutionStatus::Killed, *end_time, None)
            }
            TaskLifecycleEvent::Paused { end_time, .. } => {
                (TaskExecutionStatus::Paused, *end_time, None)
            }
            other => return Err(mismatched(other)),
        };

        if runnable.is_finished().await {
            debug!("任务实例 {} 已结束，忽略重复的 {} 事件", runnable.id(), self.event_type);
            return Ok(());
        }
        if !wf.dag().is_current_attempt(&runnable).await {
            debug!("任务实例 {} 已被新的尝试替代，忽略 {} 事件", runnable.id(), self.event_type);
            return Ok(());
        }

        let task = runnable
            .update(|t| {
                t.state = state;
                t.end_time = Some(end_time);
                if cause.is_some() {
                    t.failure_cause = cause;
                }
            })
            .await;
        ctx.task_instance_repository.update(&task).await?;
        ctx.metrics
            .record_task_finish(topology::task_result_label(state));
        info!("任务实例 {} ({}) 结束: {:?}", task.id, task.name, state);

        if state == TaskExecutionStatus::Failure && task.can_retry() && is_advancing(wf).await {
            let delay = Duration::from_secs(task.retry_interval_seconds);
            let next = submit_new_attempt(ctx, wf, &runnable, true, delay).await?;
            ctx.metrics.record_task_retry();
            info!(
                "任务 {} 第 {}/{} 次重试，新任务实例ID: {}",
                task.name,
                task.retry_times + 1,
                task.max_retry_times,
                next.id()
            );
            return Ok(());
        }

        topology::publish_task_finished(wf, &runnable)
    }
}

/// 用户发起的终止或暂停单个任务
pub struct TaskCancelEventHandler {
    kind: CancelKind,
}

impl TaskCancelEventHandler {
    pub fn kill() -> Self {
        Self {
            kind: CancelKind::Kill,
        }
    }

    pub fn pause() -> Self {
        Self {
            kind: CancelKind::Pause,
        }
    }
}

#[async_trait]
impl TaskLifecycleEventHandler for TaskCancelEventHandler {
    fn event_type(&self) -> TaskLifecycleEventType {
        match self.kind {
            CancelKind::Kill => TaskLifecycleEventType::Kill,
            CancelKind::Pause => TaskLifecycleEventType::Pause,
        }
    }

    async fn handle(
        &self,
        ctx: &MasterContext,
        wf: &Arc<WorkflowExecutionRunnable>,
        runnable: Arc<TaskExecutionRunnable>,
        _event: &TaskLifecycleEvent,
    ) -> OrchestratorResult<()> {
        if runnable.is_finished().await {
            return Err(OrchestratorError::illegal_transition(format!(
                "任务实例 {} 已结束",
                runnable.id()
            )));
        }
        info!("{:?} 任务实例 {}", self.kind, runnable.id());
        topology::cancel_task(ctx, wf, &runnable, self.kind).await
    }
}

/// 任务所在Worker失效，重新提交一次不计入重试次数的尝试
pub struct TaskFailoverEventHandler;

#[async_trait]
impl TaskLifecycleEventHandler for TaskFailoverEventHandler {
    fn event_type(&self) -> TaskLifecycleEventType {
        TaskLifecycleEventType::Failover
    }

    async fn handle(
        &self,
        ctx: &MasterContext,
        wf: &Arc<WorkflowExecutionRunnable>,
        runnable: Arc<TaskExecutionRunnable>,
        _event: &TaskLifecycleEvent,
    ) -> OrchestratorResult<()> {
        if runnable.is_finished().await || !wf.dag().is_current_attempt(&runnable).await {
            debug!("任务实例 {} 无需容错", runnable.id());
            return Ok(());
        }

        let task = runnable
            .update(|t| t.state = TaskExecutionStatus::NeedFaultTolerance)
            .await;
        ctx.task_instance_repository.update(&task).await?;
        ctx.metrics.record_task_failover();

        if is_advancing(wf).await {
            let next = submit_new_attempt(ctx, wf, &runnable, false, Duration::ZERO).await?;
            info!(
                "任务实例 {} 容错，重新提交为任务实例 {}",
                runnable.id(),
                next.id()
            );
            return Ok(());
        }

        let state = if wf.state().await == WorkflowState::Pausing {
            TaskExecutionStatus::Paused
        } else {
            TaskExecutionStatus::Killed
        };
        topology::mark_finished(ctx, &runnable, state, Some("所在Worker已失效".to_string()))
            .await?;
        topology::publish_task_finished(wf, &runnable)
    }
}

/// 把未成功结束的任务强制置为成功并推进下游
pub struct TaskForceStartEventHandler;

#[async_trait]
impl TaskLifecycleEventHandler for TaskForceStartEventHandler {
    fn event_type(&self) -> TaskLifecycleEventType {
        TaskLifecycleEventType::ForceStart
    }

    async fn handle(
        &self,
        ctx: &MasterContext,
        wf: &Arc<WorkflowExecutionRunnable>,
        runnable: Arc<TaskExecutionRunnable>,
        _event: &TaskLifecycleEvent,
    ) -> OrchestratorResult<()> {
        let state = runnable.state().await;
        if !(state.is_failure() || state == TaskExecutionStatus::Paused) {
            return Err(OrchestratorError::illegal_transition(format!(
                "任务实例 {} 处于 {:?}，只有失败、被终止或暂停的任务可以强制成功",
                runnable.id(),
                state
            )));
        }
        let task = runnable
            .update(|t| t.state = TaskExecutionStatus::ForcedSuccess)
            .await;
        ctx.task_instance_repository.update(&task).await?;
        info!("任务实例 {} ({}) 被强制置为成功", task.id, task.name);
        topology::publish_task_finished(wf, &runnable)
    }
}

/// 按事件类型索引的任务事件处理器
pub struct TaskEventHandlerRegistry {
    handlers: HashMap<TaskLifecycleEventType, Arc<dyn TaskLifecycleEventHandler>>,
}

impl TaskEventHandlerRegistry {
    pub fn empty() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    pub fn register(&mut self, handler: Arc<dyn TaskLifecycleEventHandler>) {
        self.handlers.insert(handler.event_type(), handler);
    }

    pub fn get(
        &self,
        event_type: TaskLifecycleEventType,
    ) -> OrchestratorResult<Arc<dyn TaskLifecycleEventHandler>> {
        self.handlers.get(&event_type).cloned().ok_or_else(|| {
            OrchestratorError::Internal(format!("未注册 {} 事件的处理器", event_type))
        })
    }
}

impl Default for TaskEventHandlerRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register(Arc::new(TaskDispatchEventHandler));
        registry.register(Arc::new(TaskDispatchedEventHandler));
        registry.register(Arc::new(TaskDispatchFailedEventHandler));
        registry.register(Arc::new(TaskRunningEventHandler));
        for event_type in [
            TaskLifecycleEventType::Success,
            TaskLifecycleEventType::Failed,
            TaskLifecycleEventType::Killed,
            TaskLifecycleEventType::Paused,
        ] {
            registry.register(Arc::new(TaskFinishedEventHandler::new(event_type)));
        }
        registry.register(Arc::new(TaskCancelEventHandler::kill()));
        registry.register(Arc::new(TaskCancelEventHandler::pause()));
        registry.register(Arc::new(TaskFailoverEventHandler));
        registry.register(Arc::new(TaskForceStartEventHandler));
        registry
    }
}
