use orchestrator_domain::WorkflowExecutionStatus;

/// 工作流在Master内存中的状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkflowState {
    Created,
    Running,
    Pausing,
    Paused,
    Stopping,
    Stopped,
    Failed,
    Success,
    Finalizing,
    Finalized,
}

impl WorkflowState {
    /// 执行已结束，等待收尾
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Paused | Self::Stopped | Self::Failed | Self::Success
        )
    }

    pub fn is_finalizing_or_finalized(&self) -> bool {
        matches!(self, Self::Finalizing | Self::Finalized)
    }

    pub fn can_transition_to(&self, next: WorkflowState) -> bool {
        use WorkflowState::*;
        matches!(
            (*self, next),
            (Created, Running | Paused | Stopped | Failed)
                | (Running, Pausing | Stopping | Success | Failed)
                | (Pausing, Paused | Stopping | Failed)
                | (Stopping, Stopped | Failed)
                | (Paused | Stopped | Failed | Success, Finalizing)
                | (Finalizing, Finalized)
        )
    }

    /// 持久化到工作流实例上的状态
    pub fn execution_status(&self) -> Option<WorkflowExecutionStatus> {
        match self {
            Self::Created => Some(WorkflowExecutionStatus::Submitted),
            Self::Running => Some(WorkflowExecutionStatus::Running),
            Self::Pausing => Some(WorkflowExecutionStatus::ReadyPause),
            Self::Paused => Some(WorkflowExecutionStatus::Paused),
            Self::Stopping => Some(WorkflowExecutionStatus::ReadyStop),
            Self::Stopped => Some(WorkflowExecutionStatus::Stopped),
            Self::Failed => Some(WorkflowExecutionStatus::Failure),
            Self::Success => Some(WorkflowExecutionStatus::Success),
            Self::Finalizing | Self::Finalized => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transitions() {
        assert!(WorkflowState::Created.can_transition_to(WorkflowState::Running));
        assert!(WorkflowState::Running.can_transition_to(WorkflowState::Pausing));
        assert!(WorkflowState::Pausing.can_transition_to(WorkflowState::Stopping));
        assert!(WorkflowState::Success.can_transition_to(WorkflowState::Finalizing));
        assert!(WorkflowState::Finalizing.can_transition_to(WorkflowState::Finalized));

        assert!(!WorkflowState::Running.can_transition_to(WorkflowState::Running));
        assert!(!WorkflowState::Success.can_transition_to(WorkflowState::Running));
        assert!(!WorkflowState::Finalized.can_transition_to(WorkflowState::Finalizing));
        assert!(!WorkflowState::Stopping.can_transition_to(WorkflowState::Pausing));
    }

    #[test]
    fn test_execution_status_mapping() {
        assert_eq!(
            WorkflowState::Pausing.execution_status(),
            Some(WorkflowExecutionStatus::ReadyPause)
        );
        assert_eq!(WorkflowState::Finalized.execution_status(), None);
        assert!(WorkflowState::Stopped.is_terminal());
        assert!(!WorkflowState::Stopping.is_terminal());
    }
}
