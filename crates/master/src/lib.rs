//! Master执行引擎
//!
//! 每个运行中的工作流实例持有一条事件总线，状态机、拓扑推进与任务分发都由
//! 事件驱动；注册中心的节点变化驱动Worker选择快照与失效容错。

pub mod command;
pub mod context;
pub mod dag;
pub mod dispatch;
pub mod event_bus;
pub mod events;
pub mod failover;
pub mod handlers;
pub mod heartbeat;
pub mod listener;
pub mod metrics;
pub mod repository;
pub mod rpc;
pub mod runnable;
pub mod selector;
pub mod server;
pub mod statemachine;
pub mod topology;

pub use command::{CommandConsumer, WorkflowTrigger};
pub use context::MasterContext;
pub use dag::WorkflowExecutionDag;
pub use event_bus::WorkflowEventBusCoordinator;
pub use events::{
    LifecycleEvent, TaskLifecycleEvent, TaskLifecycleEventType, WorkflowLifecycleEvent,
    WorkflowLifecycleEventType,
};
pub use failover::{FailoverCoordinator, HeartbeatExpiryDetector};
pub use listener::WorkflowLifecycleListener;
pub use metrics::MasterMetrics;
pub use repository::WorkflowExecutionRunnableRepository;
pub use rpc::{
    BackfillRequest, MasterRpcService, TaskFinishKind, TaskFinishRequest, TaskRunningRequest,
    TriggerWorkflowRequest,
};
pub use runnable::{TaskExecutionRunnable, WorkflowExecutionRunnable};
pub use server::{MasterRepositories, MasterServer};
pub use statemachine::WorkflowState;
