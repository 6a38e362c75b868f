//! 任务分发：优先级延迟队列、重试发送与分发循环

mod dispatcher;
mod queue;
mod worker;

pub use dispatcher::TaskDispatcher;
pub use queue::TaskDispatchQueue;
pub use worker::TaskDispatchWorker;
