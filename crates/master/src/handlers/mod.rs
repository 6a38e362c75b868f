//! 生命周期事件处理器
//!
//! 工作流事件交给当前状态对应的状态动作处理，任务事件直接由处理器推进。

mod task;
mod workflow;

pub use task::{
    TaskCancelEventHandler, TaskDispatchEventHandler, TaskDispatchFailedEventHandler,
    TaskDispatchedEventHandler, TaskEventHandlerRegistry, TaskFailoverEventHandler,
    TaskFinishedEventHandler, TaskForceStartEventHandler, TaskLifecycleEventHandler,
    TaskRunningEventHandler,
};
pub use workflow::{WorkflowEventHandlerRegistry, WorkflowLifecycleEventHandler};
