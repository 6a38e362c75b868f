use axum::{
    routing::{get, post},
    Router,
};
use orchestrator_master::MasterRpcService;
use std::sync::Arc;

use crate::handlers::{
    health::health_check,
    task_events::{report_finished, report_running},
    task_instances::{force_start_task, kill_task, pause_task},
    workers::{report_heartbeat, unregister},
    workflows::{
        backfill_workflow, pause_workflow, recover_failure, recover_suspend, repeat_run,
        schedule_workflow, stop_workflow, trigger_workflow,
    },
};

/// API应用状态
#[derive(Clone)]
pub struct AppState {
    pub rpc: Arc<MasterRpcService>,
}

/// 创建API路由
pub fn create_routes(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        // Worker回调
        .route("/api/v1/task-events/running", post(report_running))
        .route("/api/v1/task-events/{kind}", post(report_finished))
        .route("/api/v1/workers/heartbeat", post(report_heartbeat))
        .route("/api/v1/workers/unregister", post(unregister))
        // 工作流触发
        .route("/api/v1/workflows/trigger", post(trigger_workflow))
        .route("/api/v1/workflows/schedule", post(schedule_workflow))
        .route("/api/v1/workflows/backfill", post(backfill_workflow))
        // 工作流实例控制
        .route("/api/v1/workflow-instances/{id}/repeat-run", post(repeat_run))
        .route(
            "/api/v1/workflow-instances/{id}/recover-failure",
            post(recover_failure),
        )
        .route(
            "/api/v1/workflow-instances/{id}/recover-suspend",
            post(recover_suspend),
        )
        .route("/api/v1/workflow-instances/{id}/pause", post(pause_workflow))
        .route("/api/v1/workflow-instances/{id}/stop", post(stop_workflow))
        // 任务实例控制
        .route("/api/v1/task-instances/{id}/kill", post(kill_task))
        .route("/api/v1/task-instances/{id}/pause", post(pause_task))
        .route(
            "/api/v1/task-instances/{id}/force-start",
            post(force_start_task),
        )
        .with_state(state)
}
