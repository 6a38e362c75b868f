mod common;

use common::{test_config, worker, TestMaster};
use orchestrator_domain::{Host, ServerStatus, TaskExecutionStatus, WorkflowExecutionStatus};
use orchestrator_testing_utils::{TaskDefinitionBuilder, WorkerHeartBeatBuilder, WorkflowDefinitionBuilder};

fn idle_and_busy_workers() -> (Host, Host, Vec<orchestrator_domain::WorkerHeartBeat>) {
    let idle = WorkerHeartBeatBuilder::new("10.0.0.1", 1234)
        .with_usage(0.0, 0.0, 0.0)
        .build();
    let loaded = WorkerHeartBeatBuilder::new("10.0.0.2", 1234)
        .with_usage(0.5, 0.5, 0.5)
        .build();
    (idle.address(), loaded.address(), vec![idle, loaded])
}

#[tokio::test]
async fn test_unreachable_worker_is_excluded_after_send_attempts() {
    let (preferred, fallback, workers) = idle_and_busy_workers();
    let master = TestMaster::start(&workers).await;
    master.client.fail_host(&preferred);

    let wf = master
        .run(&WorkflowDefinitionBuilder::new(21).shell("a").build())
        .await;
    let a = master.wait_task(&wf, "a", TaskExecutionStatus::Dispatched).await;

    assert_eq!(master.client.dispatch_count_to(&preferred), 3);
    assert_eq!(master.client.dispatch_count_to(&fallback), 1);
    assert_eq!(a.snapshot().await.host, Some(fallback));
    master.shutdown().await;
}

#[tokio::test]
async fn test_rejecting_worker_is_excluded_without_resend() {
    let (preferred, fallback, workers) = idle_and_busy_workers();
    let master = TestMaster::start(&workers).await;
    master.client.reject_host(&preferred);

    let wf = master
        .run(&WorkflowDefinitionBuilder::new(22).shell("a").build())
        .await;
    let a = master.wait_task(&wf, "a", TaskExecutionStatus::Dispatched).await;

    assert_eq!(master.client.dispatch_count_to(&preferred), 1);
    assert_eq!(a.snapshot().await.host, Some(fallback));
    master.shutdown().await;
}

#[tokio::test]
async fn test_busy_worker_is_never_selected() {
    let busy = WorkerHeartBeatBuilder::new("10.0.0.1", 1234)
        .with_usage(0.0, 0.0, 0.0)
        .with_status(ServerStatus::Busy)
        .build();
    let normal = worker("10.0.0.2");
    let busy_host = busy.address();
    let master = TestMaster::start(&[busy, normal.clone()]).await;

    let definition = WorkflowDefinitionBuilder::new(23)
        .shell("a")
        .shell("b")
        .shell("c")
        .build();
    let wf = master.run(&definition).await;
    for name in ["a", "b", "c"] {
        master.wait_task(&wf, name, TaskExecutionStatus::Dispatched).await;
    }

    assert_eq!(master.client.dispatch_count_to(&busy_host), 0);
    assert_eq!(master.client.dispatch_count_to(&normal.address()), 3);
    master.shutdown().await;
}

#[tokio::test]
async fn test_task_fails_after_max_dispatch_failures() {
    let mut config = test_config();
    config.dispatch.max_dispatch_failures = 2;
    let master = TestMaster::start_with(config, &[worker("10.0.0.1")]).await;

    // 没有任何Worker属于gpu分组
    let definition = WorkflowDefinitionBuilder::new(24)
        .task(
            TaskDefinitionBuilder::new(24001, "a")
                .with_worker_group("gpu")
                .build(),
        )
        .build();
    let wf = master.run(&definition).await;

    let a = master.wait_task(&wf, "a", TaskExecutionStatus::Failure).await;
    assert_eq!(a.dispatch_fail_times(), 2);
    assert!(master.client.dispatch_calls().is_empty());
    assert_eq!(master.wait_finalized(&wf).await, WorkflowExecutionStatus::Failure);
    master.shutdown().await;
}

#[tokio::test]
async fn test_dispatch_recovers_when_worker_joins() {
    let master = TestMaster::start(&[worker("10.0.0.1")]).await;
    let definition = WorkflowDefinitionBuilder::new(25)
        .task(
            TaskDefinitionBuilder::new(25001, "a")
                .with_worker_group("gpu")
                .build(),
        )
        .build();
    let wf = master.run(&definition).await;

    let gpu_worker = WorkerHeartBeatBuilder::new("10.0.1.1", 1234)
        .with_group("gpu")
        .build();
    master.registry.register_worker(&gpu_worker).await.unwrap();

    let a = master.wait_task(&wf, "a", TaskExecutionStatus::Dispatched).await;
    assert_eq!(a.snapshot().await.host, Some(gpu_worker.address()));
    master.shutdown().await;
}
