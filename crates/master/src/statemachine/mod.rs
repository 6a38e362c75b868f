//! 工作流生命周期状态机
//!
//! 每个状态对应一个 `WorkflowStateAction`，事件处理器根据工作流当前状态
//! 取出动作并调用与事件对应的方法。未覆盖的方法表示该状态不接受此事件。

mod actions;
mod state;

pub use actions::{
    CreatedStateAction, FailedStateAction, FinalizedStateAction, PausedStateAction,
    PausingStateAction, RunningStateAction, StoppedStateAction, StoppingStateAction,
    SuccessStateAction,
};
pub use state::WorkflowState;

use async_trait::async_trait;
use orchestrator_errors::{OrchestratorError, OrchestratorResult};
use std::collections::HashMap;
use std::sync::Arc;

use crate::context::MasterContext;
use crate::events::WorkflowLifecycleEventType;
use crate::runnable::WorkflowExecutionRunnable;

type Wf = Arc<WorkflowExecutionRunnable>;

fn unsupported(
    state: WorkflowState,
    event: WorkflowLifecycleEventType,
    wf: &WorkflowExecutionRunnable,
) -> OrchestratorError {
    OrchestratorError::illegal_transition(format!(
        "工作流实例 {} 处于 {:?} 状态，不接受 {} 事件",
        wf.id(),
        state,
        event
    ))
}

#[async_trait]
pub trait WorkflowStateAction: Send + Sync {
    fn state(&self) -> WorkflowState;

    async fn start_event_action(&self, _ctx: &MasterContext, wf: &Wf) -> OrchestratorResult<()> {
        Err(unsupported(self.state(), WorkflowLifecycleEventType::Start, wf))
    }

    async fn topology_logical_transition_with_task_finish_event_action(
        &self,
        _ctx: &MasterContext,
        wf: &Wf,
        _task_name: &str,
    ) -> OrchestratorResult<()> {
        Err(unsupported(
            self.state(),
            WorkflowLifecycleEventType::TopologyLogicalTransitionWithTaskFinish,
            wf,
        ))
    }

    async fn pause_event_action(&self, _ctx: &MasterContext, wf: &Wf) -> OrchestratorResult<()> {
        Err(unsupported(self.state(), WorkflowLifecycleEventType::Pause, wf))
    }

    async fn paused_event_action(&self, _ctx: &MasterContext, wf: &Wf) -> OrchestratorResult<()> {
        Err(unsupported(self.state(), WorkflowLifecycleEventType::Paused, wf))
    }

    async fn stop_event_action(&self, _ctx: &MasterContext, wf: &Wf) -> OrchestratorResult<()> {
        Err(unsupported(self.state(), WorkflowLifecycleEventType::Stop, wf))
    }

    async fn stopped_event_action(&self, _ctx: &MasterContext, wf: &Wf) -> OrchestratorResult<()> {
        Err(unsupported(self.state(), WorkflowLifecycleEventType::Stopped, wf))
    }

    async fn succeed_event_action(&self, _ctx: &MasterContext, wf: &Wf) -> OrchestratorResult<()> {
        Err(unsupported(self.state(), WorkflowLifecycleEventType::Succeed, wf))
    }

    async fn failed_event_action(
        &self,
        _ctx: &MasterContext,
        wf: &Wf,
        _cause: &str,
    ) -> OrchestratorResult<()> {
        Err(unsupported(self.state(), WorkflowLifecycleEventType::Failed, wf))
    }

    async fn finalize_event_action(&self, _ctx: &MasterContext, wf: &Wf) -> OrchestratorResult<()> {
        Err(unsupported(self.state(), WorkflowLifecycleEventType::Finalize, wf))
    }
}

/// 按工作流状态索引的状态动作
pub struct StateActionRegistry {
    actions: HashMap<WorkflowState, Arc<dyn WorkflowStateAction>>,
}

impl StateActionRegistry {
    pub fn empty() -> Self {
        Self {
            actions: HashMap::new(),
        }
    }

    pub fn register(&mut self, action: Arc<dyn WorkflowStateAction>) {
        self.actions.insert(action.state(), action);
    }

    pub fn get(&self, state: WorkflowState) -> OrchestratorResult<Arc<dyn WorkflowStateAction>> {
        self.actions.get(&state).cloned().ok_or_else(|| {
            OrchestratorError::Internal(format!("未注册 {:?} 状态的动作", state))
        })
    }
}

impl Default for StateActionRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register(Arc::new(CreatedStateAction));
        registry.register(Arc::new(RunningStateAction));
        registry.register(Arc::new(PausingStateAction));
        registry.register(Arc::new(PausedStateAction));
        registry.register(Arc::new(StoppingStateAction));
        registry.register(Arc::new(StoppedStateAction));
        registry.register(Arc::new(FailedStateAction));
        registry.register(Arc::new(SuccessStateAction));
        registry.register(Arc::new(FinalizedStateAction::finalizing()));
        registry.register(Arc::new(FinalizedStateAction::finalized()));
        registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_state_has_an_action() {
        let registry = StateActionRegistry::default();
        for state in [
            WorkflowState::Created,
            WorkflowState::Running,
            WorkflowState::Pausing,
            WorkflowState::Paused,
            WorkflowState::Stopping,
            WorkflowState::Stopped,
            WorkflowState::Failed,
            WorkflowState::Success,
            WorkflowState::Finalizing,
            WorkflowState::Finalized,
        ] {
            assert_eq!(registry.get(state).unwrap().state(), state);
        }
    }
}
