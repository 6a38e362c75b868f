//! 工作流与任务的生命周期事件

use chrono::{DateTime, Utc};
use orchestrator_domain::Host;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkflowLifecycleEventType {
    Start,
    TopologyLogicalTransitionWithTaskFinish,
    Pause,
    Paused,
    Stop,
    Stopped,
    Succeed,
    Failed,
    Finalize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum WorkflowLifecycleEvent {
    Start,
    /// 某个任务结束（或被跳过）后推进拓扑
    TopologyLogicalTransitionWithTaskFinish {
        task_instance_id: i64,
        task_name: String,
    },
    Pause,
    Paused,
    Stop,
    Stopped,
    Succeed,
    Failed {
        cause: String,
    },
    Finalize,
}

impl WorkflowLifecycleEvent {
    pub fn event_type(&self) -> WorkflowLifecycleEventType {
        match self {
            Self::Start => WorkflowLifecycleEventType::Start,
            Self::TopologyLogicalTransitionWithTaskFinish { .. } => {
                WorkflowLifecycleEventType::TopologyLogicalTransitionWithTaskFinish
            }
            Self::Pause => WorkflowLifecycleEventType::Pause,
            Self::Paused => WorkflowLifecycleEventType::Paused,
            Self::Stop => WorkflowLifecycleEventType::Stop,
            Self::Stopped => WorkflowLifecycleEventType::Stopped,
            Self::Succeed => WorkflowLifecycleEventType::Succeed,
            Self::Failed { .. } => WorkflowLifecycleEventType::Failed,
            Self::Finalize => WorkflowLifecycleEventType::Finalize,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskLifecycleEventType {
    Dispatch,
    Dispatched,
    DispatchFailed,
    Running,
    Success,
    Failed,
    Killed,
    Paused,
    Kill,
    Pause,
    Failover,
    ForceStart,
}

impl TaskLifecycleEventType {
    /// Worker回报的终态事件
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Success | Self::Failed | Self::Killed | Self::Paused
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TaskLifecycleEvent {
    /// 放入分发队列，delay_ms 后可被分发
    Dispatch {
        task_instance_id: i64,
        delay_ms: u64,
    },
    Dispatched {
        task_instance_id: i64,
        host: Host,
    },
    DispatchFailed {
        task_instance_id: i64,
        cause: String,
    },
    Running {
        task_instance_id: i64,
        host: Host,
        start_time: DateTime<Utc>,
        app_ids: Vec<String>,
    },
    Success {
        task_instance_id: i64,
        end_time: DateTime<Utc>,
    },
    Failed {
        task_instance_id: i64,
        end_time: DateTime<Utc>,
        cause: String,
    },
    Killed {
        task_instance_id: i64,
        end_time: DateTime<Utc>,
    },
    Paused {
        task_instance_id: i64,
        end_time: DateTime<Utc>,
    },
    Kill {
        task_instance_id: i64,
    },
    Pause {
        task_instance_id: i64,
    },
    /// 所在Worker失效
    Failover {
        task_instance_id: i64,
    },
    ForceStart {
        task_instance_id: i64,
    },
}

impl TaskLifecycleEvent {
    pub fn event_type(&self) -> TaskLifecycleEventType {
        match self {
            Self::Dispatch { .. } => TaskLifecycleEventType::Dispatch,
            Self::Dispatched { .. } => TaskLifecycleEventType::Dispatched,
            Self::DispatchFailed { .. } => TaskLifecycleEventType::DispatchFailed,
            Self::Running { .. } => TaskLifecycleEventType::Running,
            Self::Success { .. } => TaskLifecycleEventType::Success,
            Self::Failed { .. } => TaskLifecycleEventType::Failed,
            Self::Killed { .. } => TaskLifecycleEventType::Killed,
            Self::Paused { .. } => TaskLifecycleEventType::Paused,
            Self::Kill { .. } => TaskLifecycleEventType::Kill,
            Self::Pause { .. } => TaskLifecycleEventType::Pause,
            Self::Failover { .. } => TaskLifecycleEventType::Failover,
            Self::ForceStart { .. } => TaskLifecycleEventType::ForceStart,
        }
    }

    pub fn task_instance_id(&self) -> i64 {
        match self {
            Self::Dispatch { task_instance_id, .. }
            | Self::Dispatched { task_instance_id, .. }
            | Self::DispatchFailed { task_instance_id, .. }
            | Self::Running { task_instance_id, .. }
            | Self::Success { task_instance_id, .. }
            | Self::Failed { task_instance_id, .. }
            | Self::Killed { task_instance_id, .. }
            | Self::Paused { task_instance_id, .. }
            | Self::Kill { task_instance_id }
            | Self::Pause { task_instance_id }
            | Self::Failover { task_instance_id }
            | Self::ForceStart { task_instance_id } => *task_instance_id,
        }
    }
}

/// 工作流事件总线上传递的事件
#[derive(Debug, Clone, PartialEq)]
pub enum LifecycleEvent {
    Workflow(WorkflowLifecycleEvent),
    Task(TaskLifecycleEvent),
}

impl From<WorkflowLifecycleEvent> for LifecycleEvent {
    fn from(event: WorkflowLifecycleEvent) -> Self {
        LifecycleEvent::Workflow(event)
    }
}

impl From<TaskLifecycleEvent> for LifecycleEvent {
    fn from(event: TaskLifecycleEvent) -> Self {
        LifecycleEvent::Task(event)
    }
}

impl fmt::Display for WorkflowLifecycleEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

impl fmt::Display for TaskLifecycleEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}
