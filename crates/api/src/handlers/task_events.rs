//! Worker回报任务状态

use axum::{
    extract::{Path, State},
    Json,
};
use orchestrator_master::{TaskFinishKind, TaskFinishRequest, TaskRunningRequest};

use crate::error::ApiResult;
use crate::response::ApiResponse;
use crate::routes::AppState;

pub async fn report_running(
    State(state): State<AppState>,
    Json(request): Json<TaskRunningRequest>,
) -> ApiResult<ApiResponse<()>> {
    let task_instance_id = request.task_instance_id;
    state.rpc.report_task_running(request).await?;
    Ok(ApiResponse::accepted(format!(
        "任务实例 {} 运行状态已受理",
        task_instance_id
    )))
}

pub async fn report_finished(
    State(state): State<AppState>,
    Path(kind): Path<TaskFinishKind>,
    Json(request): Json<TaskFinishRequest>,
) -> ApiResult<ApiResponse<()>> {
    let task_instance_id = request.task_instance_id;
    state.rpc.report_task_finished(kind, request).await?;
    Ok(ApiResponse::accepted(format!(
        "任务实例 {} 结束状态已受理",
        task_instance_id
    )))
}
