use axum::{extract::State, Json};
use serde_json::{json, Value};

use crate::routes::AppState;

pub async fn health_check(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "service": "orchestrator-master",
        "master": state.rpc.master_host().address(),
        "running_workflows": state.rpc.running_workflow_count().await,
        "version": env!("CARGO_PKG_VERSION")
    }))
}
