use orchestrator_domain::{
    CommandType, FailureStrategy, Priority, WorkflowDefinition, WorkflowInstance,
};
use orchestrator_errors::{OrchestratorError, OrchestratorResult};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, Mutex, RwLock};
use tracing::debug;

use crate::dag::WorkflowExecutionDag;
use crate::events::LifecycleEvent;
use crate::statemachine::WorkflowState;

/// 运行中工作流实例的不可变身份
#[derive(Debug, Clone)]
pub struct WorkflowExecutionContext {
    pub workflow_instance_id: i64,
    pub definition: Arc<WorkflowDefinition>,
    pub command_type: CommandType,
    pub failure_strategy: FailureStrategy,
    pub priority: Priority,
    pub start_params: HashMap<String, String>,
}

/// 运行中的工作流实例，持有运行期DAG与事件总线
pub struct WorkflowExecutionRunnable {
    context: WorkflowExecutionContext,
    instance: RwLock<WorkflowInstance>,
    state: RwLock<WorkflowState>,
    dag: WorkflowExecutionDag,
    sender: mpsc::UnboundedSender<LifecycleEvent>,
    receiver: Mutex<Option<mpsc::UnboundedReceiver<LifecycleEvent>>>,
    /// 失败策略为End时，有任务失败后不再触发新任务
    ending: AtomicBool,
    created_at: Instant,
}

impl WorkflowExecutionRunnable {
    pub fn new(
        instance: WorkflowInstance,
        definition: Arc<WorkflowDefinition>,
    ) -> OrchestratorResult<Self> {
        let dag = WorkflowExecutionDag::new(definition.clone())?;
        let (sender, receiver) = mpsc::unbounded_channel();
        let context = WorkflowExecutionContext {
            workflow_instance_id: instance.id,
            definition,
            command_type: instance.command_type,
            failure_strategy: instance.failure_strategy,
            priority: instance.priority,
            start_params: instance.start_params.clone(),
        };
        Ok(Self {
            context,
            instance: RwLock::new(instance),
            state: RwLock::new(WorkflowState::Created),
            dag,
            sender,
            receiver: Mutex::new(Some(receiver)),
            ending: AtomicBool::new(false),
            created_at: Instant::now(),
        })
    }

    pub fn id(&self) -> i64 {
        self.context.workflow_instance_id
    }

    pub fn context(&self) -> &WorkflowExecutionContext {
        &self.context
    }

    pub fn dag(&self) -> &WorkflowExecutionDag {
        &self.dag
    }

    pub fn elapsed_seconds(&self) -> f64 {
        self.created_at.elapsed().as_secs_f64()
    }

    pub async fn state(&self) -> WorkflowState {
        *self.state.read().await
    }

    pub async fn transition_to(&self, next: WorkflowState) -> OrchestratorResult<()> {
        let mut state = self.state.write().await;
        if !state.can_transition_to(next) {
            return Err(OrchestratorError::illegal_transition(format!(
                "工作流实例 {} 无法从 {:?} 转换到 {:?}",
                self.id(),
                *state,
                next
            )));
        }
        debug!("工作流实例 {} 状态变更: {:?} -> {:?}", self.id(), *state, next);
        *state = next;
        Ok(())
    }

    pub async fn instance(&self) -> WorkflowInstance {
        self.instance.read().await.clone()
    }

    pub async fn update_instance<F>(&self, f: F) -> WorkflowInstance
    where
        F: FnOnce(&mut WorkflowInstance),
    {
        let mut instance = self.instance.write().await;
        f(&mut instance);
        instance.clone()
    }

    pub fn publish<E: Into<LifecycleEvent>>(&self, event: E) -> OrchestratorResult<()> {
        self.sender
            .send(event.into())
            .map_err(|_| OrchestratorError::EventBusClosed {
                workflow_instance_id: self.id(),
            })
    }

    /// 事件接收端只能被取走一次
    pub async fn take_event_receiver(&self) -> Option<mpsc::UnboundedReceiver<LifecycleEvent>> {
        self.receiver.lock().await.take()
    }

    pub fn is_ending(&self) -> bool {
        self.ending.load(Ordering::SeqCst)
    }

    pub fn mark_ending(&self) {
        self.ending.store(true, Ordering::SeqCst);
    }
}

impl std::fmt::Debug for WorkflowExecutionRunnable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowExecutionRunnable")
            .field("workflow_instance_id", &self.context.workflow_instance_id)
            .field("definition_code", &self.context.definition.code)
            .finish()
    }
}
