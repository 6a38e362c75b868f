mod task;
mod workflow;

pub use task::{TaskExecutionContext, TaskExecutionRunnable, TaskPriorityKey};
pub use workflow::{WorkflowExecutionContext, WorkflowExecutionRunnable};
