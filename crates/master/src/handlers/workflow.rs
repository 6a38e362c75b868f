use async_trait::async_trait;
use orchestrator_errors::{OrchestratorError, OrchestratorResult};
use std::collections::HashMap;
use std::sync::Arc;

use crate::context::MasterContext;
use crate::events::{WorkflowLifecycleEvent, WorkflowLifecycleEventType};
use crate::runnable::WorkflowExecutionRunnable;
use crate::statemachine::WorkflowStateAction;

/// 工作流事件处理器，每种事件类型一个
#[async_trait]
pub trait WorkflowLifecycleEventHandler: Send + Sync {
    fn event_type(&self) -> WorkflowLifecycleEventType;

    async fn handle(
        &self,
        action: Arc<dyn WorkflowStateAction>,
        ctx: &MasterContext,
        wf: &Arc<WorkflowExecutionRunnable>,
        event: &WorkflowLifecycleEvent,
    ) -> OrchestratorResult<()>;
}

macro_rules! workflow_event_handler {
    ($name:ident, $event_type:ident, |$action:ident, $ctx:ident, $wf:ident, $event:ident| $body:expr) => {
        pub struct $name;

        #[async_trait]
        impl WorkflowLifecycleEventHandler for $name {
            fn event_type(&self) -> WorkflowLifecycleEventType {
                WorkflowLifecycleEventType::$event_type
            }

            async fn handle(
                &self,
                $action: Arc<dyn WorkflowStateAction>,
                $ctx: &MasterContext,
                $wf: &Arc<WorkflowExecutionRunnable>,
                $event: &WorkflowLifecycleEvent,
            ) -> OrchestratorResult<()> {
                $body
            }
        }
    };
}

workflow_event_handler!(WorkflowStartEventHandler, Start, |action, ctx, wf, _event| {
    action.start_event_action(ctx, wf).await
});

workflow_event_handler!(
    WorkflowTopologyLogicalTransitionEventHandler,
    TopologyLogicalTransitionWithTaskFinish,
    |action, ctx, wf, event| {
        match event {
            WorkflowLifecycleEvent::TopologyLogicalTransitionWithTaskFinish { task_name, .. } => {
                action
                    .topology_logical_transition_with_task_finish_event_action(ctx, wf, task_name)
                    .await
            }
            other => Err(mismatched(other)),
        }
    }
);

workflow_event_handler!(WorkflowPauseEventHandler, Pause, |action, ctx, wf, _event| {
    action.pause_event_action(ctx, wf).await
});

workflow_event_handler!(WorkflowPausedEventHandler, Paused, |action, ctx, wf, _event| {
    action.paused_event_action(ctx, wf).await
});

workflow_event_handler!(WorkflowStopEventHandler, Stop, |action, ctx, wf, _event| {
    action.stop_event_action(ctx, wf).await
});

workflow_event_handler!(WorkflowStoppedEventHandler, Stopped, |action, ctx, wf, _event| {
    action.stopped_event_action(ctx, wf).await
});

workflow_event_handler!(WorkflowSucceedEventHandler, Succeed, |action, ctx, wf, _event| {
    action.succeed_event_action(ctx, wf).await
});

workflow_event_handler!(WorkflowFailedEventHandler, Failed, |action, ctx, wf, event| {
    match event {
        WorkflowLifecycleEvent::Failed { cause } => action.failed_event_action(ctx, wf, cause).await,
        other => Err(mismatched(other)),
    }
});

workflow_event_handler!(WorkflowFinalizeEventHandler, Finalize, |action, ctx, wf, _event| {
    action.finalize_event_action(ctx, wf).await
});

fn mismatched(event: &WorkflowLifecycleEvent) -> OrchestratorError {
    OrchestratorError::Internal(format!("事件 {:?} 被分派到了错误的处理器", event))
}

/// 按事件类型索引的工作流事件处理器
pub struct WorkflowEventHandlerRegistry {
    handlers: HashMap<WorkflowLifecycleEventType, Arc<dyn WorkflowLifecycleEventHandler>>,
}

impl WorkflowEventHandlerRegistry {
    pub fn empty() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    pub fn register(&mut self, handler: Arc<dyn WorkflowLifecycleEventHandler>) {
        self.handlers.insert(handler.event_type(), handler);
    }

    pub fn get(
        &self,
        event_type: WorkflowLifecycleEventType,
    ) -> OrchestratorResult<Arc<dyn WorkflowLifecycleEventHandler>> {
        self.handlers.get(&event_type).cloned().ok_or_else(|| {
            OrchestratorError::Internal(format!("未注册 {} 事件的处理器", event_type))
        })
    }
}

impl Default for WorkflowEventHandlerRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register(Arc::new(WorkflowStartEventHandler));
        registry.register(Arc::new(WorkflowTopologyLogicalTransitionEventHandler));
        registry.register(Arc::new(WorkflowPauseEventHandler));
        registry.register(Arc::new(WorkflowPausedEventHandler));
        registry.register(Arc::new(WorkflowStopEventHandler));
        registry.register(Arc::new(WorkflowStoppedEventHandler));
        registry.register(Arc::new(WorkflowSucceedEventHandler));
        registry.register(Arc::new(WorkflowFailedEventHandler));
        registry.register(Arc::new(WorkflowFinalizeEventHandler));
        registry
    }
}
