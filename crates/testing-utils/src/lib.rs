//! # Orchestrator Testing Utils
//!
//! 工作区内共享的测试工具：Worker调用的手写mock、测试数据构建器和
//! 异步等待辅助函数。
//!
//! ```toml
//! [dev-dependencies]
//! orchestrator-testing-utils = { path = "../testing-utils" }
//! ```

pub mod builders;
pub mod helpers;
pub mod mocks;

pub use builders::*;
pub use helpers::*;
pub use mocks::*;
