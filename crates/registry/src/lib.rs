//! 注册中心
//!
//! 提供节点注册、心跳、变更订阅与分布式锁。`Registry` 是存储后端的抽象，
//! `RegistryClient` 在其之上封装Master引擎使用的高层操作。

pub mod client;
pub mod memory;
pub mod paths;
pub mod registry;

pub use client::RegistryClient;
pub use memory::InMemoryRegistry;
pub use paths::NodeType;
pub use registry::{Registry, RegistryEvent, RegistryEventType};
