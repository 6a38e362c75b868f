use axum::{extract::Path, routing::post, Json, Router};
use orchestrator_domain::{
    CommandType, Host, TakeOverRequest, TaskDefinition, TaskDispatchRequest, TaskExecutorClient,
    TaskInstance, WorkflowDefinition, WorkflowInstance,
};
use orchestrator_errors::OrchestratorError;
use orchestrator_infrastructure::executor_client::WorkerResponse;
use orchestrator_infrastructure::HttpTaskExecutorClient;
use std::collections::HashMap;
use std::time::Duration;

async fn start_worker(accept: bool) -> Host {
    let app = Router::new()
        .route(
            "/api/v1/tasks/dispatch",
            post(move |Json(request): Json<TaskDispatchRequest>| async move {
                Json(WorkerResponse {
                    success: accept,
                    message: (!accept).then(|| format!("队列已满: {}", request.task_instance.name)),
                })
            }),
        )
        .route(
            "/api/v1/tasks/{id}/kill",
            post(|Path(_id): Path<i64>| async {
                Json(WorkerResponse {
                    success: true,
                    message: None,
                })
            }),
        )
        .route(
            "/api/v1/tasks/take-over",
            post(|Json(_request): Json<TakeOverRequest>| async {
                Json(WorkerResponse {
                    success: false,
                    message: Some("任务不存在".to_string()),
                })
            }),
        );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    Host::new(addr.ip().to_string(), addr.port())
}

fn dispatch_request() -> TaskDispatchRequest {
    let definition = WorkflowDefinition {
        code: 1,
        version: 1,
        name: "wf".to_string(),
        task_definitions: vec![],
        relations: vec![],
        global_params: HashMap::new(),
    };
    let workflow = WorkflowInstance::new(&definition, CommandType::StartWorkflow);
    let task_definition = TaskDefinition::new(1, "shell-1", "SHELL");
    TaskDispatchRequest {
        task_instance: TaskInstance::from_definition(&task_definition, &workflow),
        master_host: Host::new("127.0.0.1", 5678),
        global_params: HashMap::new(),
    }
}

#[tokio::test]
async fn test_dispatch_accepted() {
    let host = start_worker(true).await;
    let client = HttpTaskExecutorClient::new(Duration::from_secs(2)).unwrap();
    client.dispatch_task(&host, &dispatch_request()).await.unwrap();
    client.kill_task(&host, 7).await.unwrap();
}

#[tokio::test]
async fn test_dispatch_rejected() {
    let host = start_worker(false).await;
    let client = HttpTaskExecutorClient::new(Duration::from_secs(2)).unwrap();
    let err = client
        .dispatch_task(&host, &dispatch_request())
        .await
        .unwrap_err();
    match &err {
        OrchestratorError::DispatchRejected { reason, .. } => assert!(reason.contains("shell-1")),
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(err.is_host_failure());
}

#[tokio::test]
async fn test_take_over_reports_missing_task() {
    let host = start_worker(true).await;
    let client = HttpTaskExecutorClient::new(Duration::from_secs(2)).unwrap();
    let request = TakeOverRequest {
        task_instance_id: 1,
        workflow_instance_id: 1,
        master_host: Host::new("127.0.0.1", 5678),
    };
    assert!(!client.take_over_task(&host, &request).await.unwrap());
}

#[tokio::test]
async fn test_unreachable_worker_is_host_failure() {
    // 绑定后立即释放端口，确保无人监听
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let client = HttpTaskExecutorClient::new(Duration::from_millis(500)).unwrap();
    let host = Host::new(addr.ip().to_string(), addr.port());
    let err = client
        .dispatch_task(&host, &dispatch_request())
        .await
        .unwrap_err();
    assert!(err.is_host_failure());
    assert!(err.is_retryable());
}
