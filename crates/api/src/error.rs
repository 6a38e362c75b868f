use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use orchestrator_errors::OrchestratorError;
use serde_json::json;
use tracing::error;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("编排错误: {0}")]
    Orchestrator(#[from] OrchestratorError),

    #[error("请求参数错误: {0}")]
    BadRequest(String),
}

impl ApiError {
    fn classify(&self) -> (StatusCode, &'static str) {
        use OrchestratorError::*;
        match self {
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            ApiError::Orchestrator(e) => match e {
                WorkflowDefinitionNotFound { .. } => {
                    (StatusCode::NOT_FOUND, "WORKFLOW_DEFINITION_NOT_FOUND")
                }
                WorkflowInstanceNotFound { .. } => {
                    (StatusCode::NOT_FOUND, "WORKFLOW_INSTANCE_NOT_FOUND")
                }
                TaskInstanceNotFound { .. } => (StatusCode::NOT_FOUND, "TASK_INSTANCE_NOT_FOUND"),
                // 调用方应改投实例所在的Master
                WorkflowNotRunningHere { .. } => (StatusCode::CONFLICT, "WORKFLOW_NOT_RUNNING_HERE"),
                WorkflowAlreadyRunning { .. } => (StatusCode::CONFLICT, "WORKFLOW_ALREADY_RUNNING"),
                IllegalStateTransition(_) => (StatusCode::CONFLICT, "ILLEGAL_STATE_TRANSITION"),
                InvalidArgument(_) => (StatusCode::BAD_REQUEST, "INVALID_ARGUMENT"),
                InvalidDag(_) | CircularDependency => (StatusCode::BAD_REQUEST, "INVALID_DAG"),
                EventBusClosed { .. } => (StatusCode::SERVICE_UNAVAILABLE, "EVENT_BUS_CLOSED"),
                Timeout(_) => (StatusCode::GATEWAY_TIMEOUT, "TIMEOUT"),
                _ => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_type) = self.classify();
        if status.is_server_error() {
            error!("请求处理失败: {}", self);
        }

        let body = Json(json!({
            "success": false,
            "error": {
                "message": self.to_string(),
                "type": error_type,
                "code": status.as_u16(),
            },
            "timestamp": chrono::Utc::now().to_rfc3339(),
        }));

        (status, body).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
