//! 工作流触发与实例控制

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use orchestrator_master::{BackfillRequest, TriggerWorkflowRequest};

use crate::error::{ApiError, ApiResult};
use crate::response::{ApiResponse, WorkflowInstanceIds};
use crate::routes::AppState;

type Created = (StatusCode, ApiResponse<WorkflowInstanceIds>);

fn created(ids: Vec<i64>) -> Created {
    (
        StatusCode::CREATED,
        ApiResponse::success(WorkflowInstanceIds {
            workflow_instance_ids: ids,
        }),
    )
}

pub async fn trigger_workflow(
    State(state): State<AppState>,
    Json(request): Json<TriggerWorkflowRequest>,
) -> ApiResult<Created> {
    let id = state.rpc.trigger_workflow(&request).await?;
    Ok(created(vec![id]))
}

pub async fn schedule_workflow(
    State(state): State<AppState>,
    Json(request): Json<TriggerWorkflowRequest>,
) -> ApiResult<Created> {
    let id = state.rpc.schedule_workflow(&request).await?;
    Ok(created(vec![id]))
}

pub async fn backfill_workflow(
    State(state): State<AppState>,
    Json(request): Json<BackfillRequest>,
) -> ApiResult<Created> {
    if request.schedule_times.is_empty() {
        return Err(ApiError::BadRequest("schedule_times 不能为空".to_string()));
    }
    let ids = state.rpc.backfill_workflow(&request).await?;
    Ok(created(ids))
}

pub async fn repeat_run(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Created> {
    let id = state.rpc.repeat_run_workflow(id).await?;
    Ok(created(vec![id]))
}

pub async fn recover_failure(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Created> {
    let id = state.rpc.recover_failure_workflow(id).await?;
    Ok(created(vec![id]))
}

pub async fn recover_suspend(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Created> {
    let id = state.rpc.recover_suspend_workflow(id).await?;
    Ok(created(vec![id]))
}

pub async fn pause_workflow(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<ApiResponse<()>> {
    state.rpc.pause_workflow(id).await?;
    Ok(ApiResponse::accepted(format!("工作流实例 {} 暂停请求已受理", id)))
}

pub async fn stop_workflow(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<ApiResponse<()>> {
    state.rpc.stop_workflow(id).await?;
    Ok(ApiResponse::accepted(format!("工作流实例 {} 停止请求已受理", id)))
}
