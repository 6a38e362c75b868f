//! Worker注册与心跳

use axum::{extract::State, Json};
use orchestrator_domain::{Host, WorkerHeartBeat};
use serde::{Deserialize, Serialize};

use crate::error::ApiResult;
use crate::response::ApiResponse;
use crate::routes::AppState;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnregisterWorkerRequest {
    pub host: Host,
}

/// 首次上报即注册，之后按间隔刷新
pub async fn report_heartbeat(
    State(state): State<AppState>,
    Json(heartbeat): Json<WorkerHeartBeat>,
) -> ApiResult<ApiResponse<()>> {
    let host = heartbeat.address();
    state.rpc.report_worker_heartbeat(heartbeat).await?;
    Ok(ApiResponse::accepted(format!("Worker {} 心跳已受理", host)))
}

pub async fn unregister(
    State(state): State<AppState>,
    Json(request): Json<UnregisterWorkerRequest>,
) -> ApiResult<ApiResponse<()>> {
    state.rpc.unregister_worker(&request.host).await?;
    Ok(ApiResponse::accepted(format!(
        "Worker {} 已下线",
        request.host
    )))
}
