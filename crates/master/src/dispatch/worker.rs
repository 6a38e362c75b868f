use orchestrator_domain::{TaskDispatchRequest, TaskExecutionStatus};
use std::sync::Arc;
use tokio::sync::{broadcast, Semaphore};
use tracing::{debug, info, warn};

use crate::context::MasterContext;
use crate::events::TaskLifecycleEvent;
use crate::runnable::{TaskExecutionRunnable, WorkflowExecutionRunnable};

use super::TaskDispatcher;

/// 从分发队列取任务并在受限的并发下发送给Worker
///
/// 分发结果以 Dispatched / DispatchFailed 事件回到所属工作流的事件总线。
pub struct TaskDispatchWorker {
    context: Arc<MasterContext>,
    dispatcher: Arc<TaskDispatcher>,
}

impl TaskDispatchWorker {
    pub fn new(context: Arc<MasterContext>, dispatcher: Arc<TaskDispatcher>) -> Self {
        Self {
            context,
            dispatcher,
        }
    }

    pub async fn run(self: Arc<Self>, mut shutdown_rx: broadcast::Receiver<()>) {
        let pool_size = self.context.master_config.dispatch_pool_size.max(1);
        let semaphore = Arc::new(Semaphore::new(pool_size));
        info!("任务分发循环启动，并发上限: {}", pool_size);

        loop {
            let runnable = tokio::select! {
                runnable = self.context.dispatch_queue.take() => runnable,
                _ = shutdown_rx.recv() => {
                    info!("任务分发循环停止");
                    break;
                }
            };

            let permit = match semaphore.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => break,
            };
            let worker = self.clone();
            tokio::spawn(async move {
                let _permit = permit;
                worker.dispatch_one(runnable).await;
            });

            self.context
                .metrics
                .set_dispatch_queue_size(self.context.dispatch_queue.len().await);
        }
    }

    /// 分发单个任务并把结果发布到工作流事件总线
    pub async fn dispatch_one(&self, runnable: Arc<TaskExecutionRunnable>) {
        let Some(workflow) = self
            .context
            .workflow_runnables
            .get(runnable.workflow_instance_id())
            .await
        else {
            debug!(
                "工作流实例 {} 已不在当前Master上，丢弃任务 {}",
                runnable.workflow_instance_id(),
                runnable.id()
            );
            return;
        };
        if !self.should_dispatch(&workflow, &runnable).await {
            return;
        }

        let request = TaskDispatchRequest {
            task_instance: runnable.snapshot().await,
            master_host: self.context.master_host.clone(),
            global_params: merged_params(&workflow),
        };
        let event = match self.dispatcher.dispatch(&request).await {
            Ok(host) => TaskLifecycleEvent::Dispatched {
                task_instance_id: runnable.id(),
                host,
            },
            Err(e) => TaskLifecycleEvent::DispatchFailed {
                task_instance_id: runnable.id(),
                cause: e.to_string(),
            },
        };
        if let Err(e) = workflow.publish(event) {
            warn!("发布任务 {} 的分发结果失败: {}", runnable.id(), e);
        }
    }

    async fn should_dispatch(
        &self,
        workflow: &WorkflowExecutionRunnable,
        runnable: &TaskExecutionRunnable,
    ) -> bool {
        let state = runnable.state().await;
        if state != TaskExecutionStatus::Submitted {
            debug!("任务实例 {} 状态为 {:?}，跳过分发", runnable.id(), state);
            return false;
        }
        if !workflow.dag().is_current_attempt(runnable).await {
            debug!("任务实例 {} 已被新的尝试替代，跳过分发", runnable.id());
            return false;
        }
        true
    }
}

/// 定义中的全局参数，启动参数优先
fn merged_params(workflow: &WorkflowExecutionRunnable) -> std::collections::HashMap<String, String> {
    let context = workflow.context();
    let mut params = context.definition.global_params.clone();
    params.extend(
        context
            .start_params
            .iter()
            .map(|(k, v)| (k.clone(), v.clone())),
    );
    params
}
