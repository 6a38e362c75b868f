use axum::extract::{Path, State};
use tracing::info;

use crate::error::ApiResult;
use crate::response::ApiResponse;
use crate::routes::AppState;

pub async fn kill_task(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<ApiResponse<()>> {
    info!("请求终止任务实例 {}", id);
    state.rpc.kill_task(id).await?;
    Ok(ApiResponse::accepted(format!("任务实例 {} 终止请求已受理", id)))
}

pub async fn pause_task(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<ApiResponse<()>> {
    info!("请求暂停任务实例 {}", id);
    state.rpc.pause_task(id).await?;
    Ok(ApiResponse::accepted(format!("任务实例 {} 暂停请求已受理", id)))
}

pub async fn force_start_task(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<ApiResponse<()>> {
    info!("请求强制成功任务实例 {}", id);
    state.rpc.force_start_task(id).await?;
    Ok(ApiResponse::accepted(format!("任务实例 {} 强制成功请求已受理", id)))
}
