//! # Orchestrator API
//!
//! Master的HTTP接口，基于axum。所有写操作都转交给 [`MasterRpcService`]，
//! 控制类请求在事件发布后立即返回，结果由工作流事件总线异步生效。
//!
//! ## API 端点
//!
//! ### Worker回调
//! - `POST /api/v1/task-events/running`
//! - `POST /api/v1/task-events/{success|failed|killed|paused}`
//!
//! ### 工作流
//! - `POST /api/v1/workflows/trigger` - 手动触发
//! - `POST /api/v1/workflows/schedule` - 调度触发，需要 `schedule_time`
//! - `POST /api/v1/workflows/backfill` - 按调度时间列表补数
//! - `POST /api/v1/workflow-instances/{id}/{repeat-run|recover-failure|recover-suspend|pause|stop}`
//!
//! ### 任务实例
//! - `POST /api/v1/task-instances/{id}/{kill|pause|force-start}`
//!
//! ### 系统
//! - `GET /health`

pub mod error;
pub mod handlers;
pub mod middleware;
pub mod response;
pub mod routes;

use axum::Router;
use orchestrator_config::ApiConfig;
use orchestrator_master::MasterRpcService;
use std::sync::Arc;
use tower::ServiceBuilder;

use middleware::{cors_layer, request_logging, timeout_layer, trace_layer};
pub use routes::{create_routes, AppState};

/// 创建带中间件的完整API应用
pub fn create_app(rpc: Arc<MasterRpcService>, api_config: &ApiConfig) -> Router {
    create_routes(AppState { rpc }).layer(
        ServiceBuilder::new()
            .layer(trace_layer())
            .layer(cors_layer())
            .layer(timeout_layer(api_config.request_timeout_seconds))
            .layer(axum::middleware::from_fn(request_logging)),
    )
}
