mod common;

use chrono::Utc;
use common::{test_config, worker, TestMaster, WAIT};
use orchestrator_domain::{FailureStrategy, TaskExecutionStatus, WorkflowExecutionStatus};
use orchestrator_master::{
    BackfillRequest, LifecycleEvent, TaskFinishKind, TaskFinishRequest, TaskRunningRequest,
    TriggerWorkflowRequest, WorkflowEventBusCoordinator, WorkflowLifecycleEvent, WorkflowState,
};
use orchestrator_testing_utils::{TaskDefinitionBuilder, TestEnv, WorkflowDefinitionBuilder};
use std::collections::HashSet;
use std::time::Duration;

#[tokio::test]
async fn test_only_root_nodes_are_dispatched_at_start() {
    let master = TestMaster::start(&[worker("10.0.0.1")]).await;
    let definition = WorkflowDefinitionBuilder::new(1)
        .shell("a")
        .shell("b")
        .shell("c")
        .edge("a", "b")
        .edge("c", "b")
        .build();

    let wf = master.run(&definition).await;
    master.wait_task(&wf, "a", TaskExecutionStatus::Dispatched).await;
    master.wait_task(&wf, "c", TaskExecutionStatus::Dispatched).await;

    assert!(master.task(&wf, "b").await.is_none());
    assert_eq!(master.client.dispatch_calls().len(), 2);
    master.shutdown().await;
}

#[tokio::test]
async fn test_join_node_waits_for_every_upstream() {
    let master = TestMaster::start(&[worker("10.0.0.1")]).await;
    let definition = WorkflowDefinitionBuilder::new(2)
        .shell("a")
        .shell("b")
        .shell("c")
        .edge("a", "b")
        .edge("c", "b")
        .build();

    let wf = master.run(&definition).await;
    master.complete(&wf, "a").await;
    master.wait_task(&wf, "a", TaskExecutionStatus::Success).await;

    // c仍在运行，b不能被触发
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(master.task(&wf, "b").await.is_none());

    master.complete(&wf, "c").await;
    master.complete(&wf, "b").await;

    assert_eq!(master.wait_finalized(&wf).await, WorkflowExecutionStatus::Success);
    assert_eq!(master.server.context().workflow_runnables.len().await, 0);
    master.shutdown().await;
}

#[tokio::test]
async fn test_duplicate_finish_report_advances_downstream_once() {
    let master = TestMaster::start(&[worker("10.0.0.1")]).await;
    let definition = WorkflowDefinitionBuilder::new(3)
        .shell("a")
        .shell("b")
        .edge("a", "b")
        .build();

    let wf = master.run(&definition).await;
    let a = master.wait_task(&wf, "a", TaskExecutionStatus::Dispatched).await;
    master.report_running(&a).await;
    master.report_finished(&a, TaskFinishKind::Success).await;
    master.report_finished(&a, TaskFinishKind::Success).await;

    let b = master.wait_task(&wf, "b", TaskExecutionStatus::Dispatched).await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    let dispatched: Vec<i64> = master
        .client
        .dispatch_calls()
        .into_iter()
        .map(|(_, id)| id)
        .collect();
    assert_eq!(dispatched, vec![a.id(), b.id()]);
    assert_eq!(master.task_instances.find_by_workflow_instance_id(wf.id()).await.len(), 2);
    master.shutdown().await;
}

#[tokio::test]
async fn test_failed_task_is_retried_as_new_attempt() {
    let master = TestMaster::start(&[worker("10.0.0.1")]).await;
    let definition = WorkflowDefinitionBuilder::new(4)
        .task(TaskDefinitionBuilder::new(4001, "a").with_retry(1, 0).build())
        .build();

    let wf = master.run(&definition).await;
    let first = master.wait_task(&wf, "a", TaskExecutionStatus::Dispatched).await;
    master.report_running(&first).await;
    master.report_finished(&first, TaskFinishKind::Failed).await;

    let reached = TestEnv::wait_for(
        || async {
            match master.task(&wf, "a").await {
                Some(current) => {
                    current.id() != first.id()
                        && current.state().await == TaskExecutionStatus::Dispatched
                }
                None => false,
            }
        },
        WAIT,
    )
    .await;
    assert!(reached);

    let second = master.task(&wf, "a").await.unwrap();
    assert_eq!(second.snapshot().await.retry_times, 1);
    assert_eq!(first.state().await, TaskExecutionStatus::Failure);

    master.report_running(&second).await;
    master.report_finished(&second, TaskFinishKind::Success).await;
    assert_eq!(master.wait_finalized(&wf).await, WorkflowExecutionStatus::Success);
    master.shutdown().await;
}

#[tokio::test]
async fn test_failure_without_retry_kills_siblings_and_fails_workflow() {
    let master = TestMaster::start(&[worker("10.0.0.1")]).await;
    let definition = WorkflowDefinitionBuilder::new(5)
        .shell("a")
        .shell("b")
        .shell("c")
        .edge("a", "b")
        .build();

    let wf = master.run(&definition).await;
    let a = master.wait_task(&wf, "a", TaskExecutionStatus::Dispatched).await;
    let c = master.wait_task(&wf, "c", TaskExecutionStatus::Dispatched).await;
    master.report_running(&c).await;
    master.wait_task(&wf, "c", TaskExecutionStatus::Running).await;

    master.report_running(&a).await;
    master.report_finished(&a, TaskFinishKind::Failed).await;

    let killed = TestEnv::wait_for(
        || async { master.client.killed_task_ids().contains(&c.id()) },
        WAIT,
    )
    .await;
    assert!(killed);

    master.report_finished(&c, TaskFinishKind::Killed).await;
    assert_eq!(master.wait_finalized(&wf).await, WorkflowExecutionStatus::Failure);
    assert!(master.task(&wf, "b").await.is_none());
    master.shutdown().await;
}

#[tokio::test]
async fn test_conditions_node_follows_failed_branch() {
    let master = TestMaster::start(&[worker("10.0.0.1")]).await;
    let definition = WorkflowDefinitionBuilder::new(6)
        .shell("a")
        .conditions("check", &["on_success"], &["on_failure"])
        .shell("on_success")
        .shell("on_failure")
        .edge("a", "check")
        .edge("check", "on_success")
        .edge("check", "on_failure")
        .build();

    let wf = master.run(&definition).await;
    let a = master.wait_task(&wf, "a", TaskExecutionStatus::Dispatched).await;
    master.report_running(&a).await;
    master.report_finished(&a, TaskFinishKind::Failed).await;

    master.wait_task(&wf, "check", TaskExecutionStatus::Success).await;
    master.complete(&wf, "on_failure").await;

    assert_eq!(master.wait_finalized(&wf).await, WorkflowExecutionStatus::Success);
    assert!(master.task(&wf, "on_success").await.is_none());
    assert!(wf.dag().is_skipped("on_success").await);
    master.shutdown().await;
}

#[tokio::test]
async fn test_pause_waits_for_in_flight_tasks() {
    let master = TestMaster::start(&[worker("10.0.0.1")]).await;
    let definition = WorkflowDefinitionBuilder::new(7)
        .shell("a")
        .shell("b")
        .edge("a", "b")
        .build();

    let wf = master.run(&definition).await;
    let a = master.wait_task(&wf, "a", TaskExecutionStatus::Dispatched).await;
    master.report_running(&a).await;
    master.wait_task(&wf, "a", TaskExecutionStatus::Running).await;

    master.rpc.pause_workflow(wf.id()).await.unwrap();
    master.wait_workflow(&wf, WorkflowState::Pausing).await;
    let paused = TestEnv::wait_for(
        || async { master.client.paused_task_ids().contains(&a.id()) },
        WAIT,
    )
    .await;
    assert!(paused);

    master.report_finished(&a, TaskFinishKind::Paused).await;
    assert_eq!(master.wait_finalized(&wf).await, WorkflowExecutionStatus::Paused);
    assert!(master.task(&wf, "b").await.is_none());
    master.shutdown().await;
}

#[tokio::test]
async fn test_stop_kills_running_tasks() {
    let master = TestMaster::start(&[worker("10.0.0.1")]).await;
    let definition = WorkflowDefinitionBuilder::new(8).shell("a").build();

    let wf = master.run(&definition).await;
    let a = master.wait_task(&wf, "a", TaskExecutionStatus::Dispatched).await;
    master.report_running(&a).await;
    master.wait_task(&wf, "a", TaskExecutionStatus::Running).await;

    master.rpc.stop_workflow(wf.id()).await.unwrap();
    let killed = TestEnv::wait_for(
        || async { master.client.killed_task_ids().contains(&a.id()) },
        WAIT,
    )
    .await;
    assert!(killed);

    master.report_finished(&a, TaskFinishKind::Killed).await;
    assert_eq!(master.wait_finalized(&wf).await, WorkflowExecutionStatus::Stopped);
    master.shutdown().await;
}

/// Worker在分发确认返回前就回报开始运行
async fn start_eager_worker(report_finish: Option<TaskFinishKind>) -> TestMaster {
    let master = TestMaster::start(&[worker("10.0.0.1")]).await;
    let rpc = master.rpc.clone();
    master.client.on_dispatch(move |host, request| {
        let rpc = rpc.clone();
        async move {
            let task = request.task_instance;
            rpc.report_task_running(TaskRunningRequest {
                task_instance_id: task.id,
                workflow_instance_id: task.workflow_instance_id,
                host,
                start_time: Utc::now(),
                app_ids: Vec::new(),
            })
            .await
            .unwrap();
            if let Some(kind) = report_finish {
                rpc.report_task_finished(
                    kind,
                    TaskFinishRequest {
                        task_instance_id: task.id,
                        workflow_instance_id: task.workflow_instance_id,
                        end_time: None,
                        cause: None,
                    },
                )
                .await
                .unwrap();
            }
            // 让回报先于确认被处理
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    });
    master
}

#[tokio::test]
async fn test_running_report_before_dispatch_ack_is_kept() {
    let master = start_eager_worker(None).await;
    let definition = WorkflowDefinitionBuilder::new(20).shell("a").build();

    let wf = master.run(&definition).await;
    let a = master.wait_task(&wf, "a", TaskExecutionStatus::Running).await;
    tokio::time::sleep(Duration::from_millis(500)).await;

    let snapshot = a.snapshot().await;
    assert_eq!(snapshot.state, TaskExecutionStatus::Running);
    assert_eq!(snapshot.host, Some(worker("10.0.0.1").address()));
    assert!(snapshot.dispatch_time.is_some());
    assert!(master.client.killed_task_ids().is_empty());

    master.report_finished(&a, TaskFinishKind::Success).await;
    assert_eq!(master.wait_finalized(&wf).await, WorkflowExecutionStatus::Success);
    master.shutdown().await;
}

#[tokio::test]
async fn test_finish_report_before_dispatch_ack_is_not_killed() {
    let master = start_eager_worker(Some(TaskFinishKind::Success)).await;
    let definition = WorkflowDefinitionBuilder::new(21)
        .shell("a")
        .shell("b")
        .edge("a", "b")
        .build();

    let wf = master.run(&definition).await;
    let a = master.wait_task(&wf, "a", TaskExecutionStatus::Success).await;
    master.wait_task(&wf, "b", TaskExecutionStatus::Success).await;
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert_eq!(a.state().await, TaskExecutionStatus::Success);
    assert!(master.client.killed_task_ids().is_empty());
    assert_eq!(master.wait_finalized(&wf).await, WorkflowExecutionStatus::Success);
    master.shutdown().await;
}

#[tokio::test]
async fn test_stop_finishes_after_wait_when_worker_ignores_kill() {
    let mut config = test_config();
    config.master.stop_wait_timeout_seconds = 1;
    let master = TestMaster::start_with(config, &[worker("10.0.0.1")]).await;
    let definition = WorkflowDefinitionBuilder::new(22).shell("a").build();

    let wf = master.run(&definition).await;
    let a = master.wait_task(&wf, "a", TaskExecutionStatus::Dispatched).await;
    master.report_running(&a).await;
    master.wait_task(&wf, "a", TaskExecutionStatus::Running).await;

    // Worker收到终止请求后不再回报
    master.rpc.stop_workflow(wf.id()).await.unwrap();
    let killed = TestEnv::wait_for(
        || async { master.client.killed_task_ids().contains(&a.id()) },
        WAIT,
    )
    .await;
    assert!(killed);
    assert_eq!(a.state().await, TaskExecutionStatus::Running);

    assert_eq!(master.wait_finalized(&wf).await, WorkflowExecutionStatus::Stopped);
    assert_eq!(a.state().await, TaskExecutionStatus::Killed);
    master.shutdown().await;
}

#[tokio::test]
async fn test_pause_finishes_after_wait_when_worker_ignores_pause() {
    let mut config = test_config();
    config.master.stop_wait_timeout_seconds = 1;
    let master = TestMaster::start_with(config, &[worker("10.0.0.1")]).await;
    let definition = WorkflowDefinitionBuilder::new(23)
        .shell("a")
        .shell("b")
        .edge("a", "b")
        .build();

    let wf = master.run(&definition).await;
    let a = master.wait_task(&wf, "a", TaskExecutionStatus::Dispatched).await;
    master.report_running(&a).await;
    master.wait_task(&wf, "a", TaskExecutionStatus::Running).await;

    master.rpc.pause_workflow(wf.id()).await.unwrap();
    master.wait_workflow(&wf, WorkflowState::Pausing).await;

    assert_eq!(master.wait_finalized(&wf).await, WorkflowExecutionStatus::Paused);
    assert_eq!(a.state().await, TaskExecutionStatus::Paused);
    assert!(master.task(&wf, "b").await.is_none());
    master.shutdown().await;
}

#[tokio::test]
async fn test_pause_rejected_when_workflow_not_running() {
    let master = TestMaster::start(&[worker("10.0.0.1")]).await;

    assert!(master.rpc.pause_workflow(404).await.is_err());
    assert!(master.rpc.stop_workflow(404).await.is_err());
    master.shutdown().await;
}

#[tokio::test]
async fn test_force_start_unblocks_downstream() {
    let master = TestMaster::start(&[worker("10.0.0.1")]).await;
    let definition = WorkflowDefinitionBuilder::new(9)
        .shell("a")
        .shell("b")
        .shell("c")
        .edge("a", "b")
        .build();
    master.deploy(&definition).await;

    let mut request = TriggerWorkflowRequest::new(9);
    request.failure_strategy = FailureStrategy::Continue;
    let wf = master.trigger(&request).await;

    let a = master.wait_task(&wf, "a", TaskExecutionStatus::Dispatched).await;
    let c = master.wait_task(&wf, "c", TaskExecutionStatus::Dispatched).await;
    master.report_running(&c).await;
    master.report_running(&a).await;
    master.wait_task(&wf, "a", TaskExecutionStatus::Running).await;

    // 运行中的任务不能强制成功
    assert!(master.rpc.force_start_task(a.id()).await.is_err());

    master.report_finished(&a, TaskFinishKind::Failed).await;
    master.wait_task(&wf, "a", TaskExecutionStatus::Failure).await;
    assert!(master.task(&wf, "b").await.is_none());

    master.rpc.force_start_task(a.id()).await.unwrap();
    master.wait_task(&wf, "a", TaskExecutionStatus::ForcedSuccess).await;
    master.complete(&wf, "b").await;
    master.report_finished(&c, TaskFinishKind::Success).await;

    assert_eq!(master.wait_finalized(&wf).await, WorkflowExecutionStatus::Success);
    master.shutdown().await;
}

#[tokio::test]
async fn test_finalize_is_idempotent() {
    let master = TestMaster::start(&[worker("10.0.0.1")]).await;
    let definition = WorkflowDefinitionBuilder::new(10).shell("a").build();

    let wf = master.run(&definition).await;
    master.complete(&wf, "a").await;
    assert_eq!(master.wait_finalized(&wf).await, WorkflowExecutionStatus::Success);

    // 事件循环已退出，重复的Finalize直接交给协调器处理
    let coordinator = WorkflowEventBusCoordinator::new(master.server.context().clone());
    coordinator
        .fire(&wf, LifecycleEvent::from(WorkflowLifecycleEvent::Finalize))
        .await;
    coordinator
        .fire(&wf, LifecycleEvent::from(WorkflowLifecycleEvent::Finalize))
        .await;

    assert_eq!(wf.state().await, WorkflowState::Finalized);
    assert_eq!(master.server.context().workflow_runnables.len().await, 0);
    assert_eq!(
        master.persisted_workflow_state(wf.id()).await,
        WorkflowExecutionStatus::Success
    );
    master.shutdown().await;
}

#[tokio::test]
async fn test_backfill_creates_one_instance_per_schedule_time() {
    let master = TestMaster::start(&[worker("10.0.0.1")]).await;
    let definition = WorkflowDefinitionBuilder::new(11).shell("a").build();
    master.deploy(&definition).await;

    let day = chrono::Utc::now();
    let request = BackfillRequest {
        workflow: TriggerWorkflowRequest::new(11),
        schedule_times: vec![day, day - chrono::Duration::days(1), day],
    };
    let ids = master.rpc.backfill_workflow(&request).await.unwrap();

    assert_eq!(ids.len(), 2);
    assert_eq!(ids.iter().collect::<HashSet<_>>().len(), 2);
    assert_eq!(master.workflow_instances.count().await, 2);
    master.shutdown().await;
}
