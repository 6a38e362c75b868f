//! 工作流事件总线消费
//!
//! 每个工作流实例有独立的事件通道和一个消费任务，同一实例的事件严格按
//! 发布顺序串行处理。不同实例之间并行，总并发受 exec_threads 限制。

use orchestrator_errors::{OrchestratorError, OrchestratorResult};
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::context::MasterContext;
use crate::events::{LifecycleEvent, TaskLifecycleEvent, WorkflowLifecycleEvent};
use crate::handlers::{TaskEventHandlerRegistry, WorkflowEventHandlerRegistry};
use crate::listener::{notify_listeners, WorkflowFinishLogListener, WorkflowLifecycleListener};
use crate::runnable::WorkflowExecutionRunnable;
use crate::statemachine::{StateActionRegistry, WorkflowState};

pub struct WorkflowEventBusCoordinator {
    context: Arc<MasterContext>,
    semaphore: Arc<Semaphore>,
    state_actions: StateActionRegistry,
    workflow_handlers: WorkflowEventHandlerRegistry,
    task_handlers: TaskEventHandlerRegistry,
    listeners: Vec<Arc<dyn WorkflowLifecycleListener>>,
}

impl WorkflowEventBusCoordinator {
    pub fn new(context: Arc<MasterContext>) -> Self {
        let permits = context.master_config.exec_threads.max(1);
        Self {
            context,
            semaphore: Arc::new(Semaphore::new(permits)),
            state_actions: StateActionRegistry::default(),
            workflow_handlers: WorkflowEventHandlerRegistry::default(),
            task_handlers: TaskEventHandlerRegistry::default(),
            listeners: vec![Arc::new(WorkflowFinishLogListener)],
        }
    }

    pub fn with_listener(mut self, listener: Arc<dyn WorkflowLifecycleListener>) -> Self {
        self.listeners.push(listener);
        self
    }

    pub fn context(&self) -> &Arc<MasterContext> {
        &self.context
    }

    /// 为工作流启动事件消费任务，同一实例只能启动一次
    pub async fn start(
        self: &Arc<Self>,
        wf: Arc<WorkflowExecutionRunnable>,
    ) -> OrchestratorResult<JoinHandle<()>> {
        let receiver = wf.take_event_receiver().await.ok_or_else(|| {
            OrchestratorError::WorkflowAlreadyRunning { id: wf.id() }
        })?;
        let coordinator = self.clone();
        Ok(tokio::spawn(async move {
            coordinator.consume(wf, receiver).await;
        }))
    }

    async fn consume(
        &self,
        wf: Arc<WorkflowExecutionRunnable>,
        mut receiver: mpsc::UnboundedReceiver<LifecycleEvent>,
    ) {
        debug!("工作流实例 {} 事件消费开始", wf.id());
        while let Some(event) = receiver.recv().await {
            let Ok(_permit) = self.semaphore.acquire().await else {
                break;
            };
            self.fire(&wf, event).await;
            if wf.state().await == WorkflowState::Finalized {
                break;
            }
        }
        debug!("工作流实例 {} 事件消费结束", wf.id());
    }

    /// 同步处理一个事件，调用方负责保证同一实例不并发调用
    pub async fn fire(&self, wf: &Arc<WorkflowExecutionRunnable>, event: LifecycleEvent) {
        match event {
            LifecycleEvent::Workflow(event) => self.fire_workflow_event(wf, event).await,
            LifecycleEvent::Task(event) => self.fire_task_event(wf, event).await,
        }
    }

    async fn fire_workflow_event(
        &self,
        wf: &Arc<WorkflowExecutionRunnable>,
        event: WorkflowLifecycleEvent,
    ) {
        let state = wf.state().await;
        let result = async {
            let action = self.state_actions.get(state)?;
            let handler = self.workflow_handlers.get(event.event_type())?;
            handler.handle(action, &self.context, wf, &event).await
        }
        .await;

        match result {
            Ok(()) => notify_listeners(&self.listeners, wf, &event).await,
            Err(e) => warn!(
                "工作流实例 {} ({:?}) 处理 {} 事件失败: {}",
                wf.id(),
                state,
                event.event_type(),
                e
            ),
        }
    }

    async fn fire_task_event(&self, wf: &Arc<WorkflowExecutionRunnable>, event: TaskLifecycleEvent) {
        let task_instance_id = event.task_instance_id();
        let Some(runnable) = wf
            .dag()
            .get_task_execution_runnable_by_id(task_instance_id)
            .await
        else {
            warn!(
                "工作流实例 {} 中不存在任务实例 {}，丢弃 {} 事件",
                wf.id(),
                task_instance_id,
                event.event_type()
            );
            return;
        };

        let result = match self.task_handlers.get(event.event_type()) {
            Ok(handler) => handler.handle(&self.context, wf, runnable, &event).await,
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            warn!(
                "任务实例 {} 处理 {} 事件失败: {}",
                task_instance_id,
                event.event_type(),
                e
            );
        }
    }
}
