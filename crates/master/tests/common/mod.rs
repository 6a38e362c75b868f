//! 集成测试共用的Master环境
//!
//! 内存仓储 + 内存注册中心 + mock Worker客户端，Worker的回调通过
//! MasterRpcService模拟。

#![allow(dead_code)]

use chrono::Utc;
use orchestrator_config::AppConfig;
use orchestrator_domain::{
    Host, TaskExecutionStatus, WorkerHeartBeat, WorkflowDefinition, WorkflowDefinitionRepository,
    WorkflowExecutionStatus, WorkflowInstanceRepository,
};
use orchestrator_infrastructure::{
    InMemoryCommandRepository, InMemoryTaskInstanceRepository,
    InMemoryWorkflowDefinitionRepository, InMemoryWorkflowInstanceRepository,
};
use orchestrator_master::{
    MasterRepositories, MasterRpcService, MasterServer, TaskExecutionRunnable, TaskFinishKind,
    TaskFinishRequest, TaskRunningRequest, TriggerWorkflowRequest, WorkflowExecutionRunnable,
    WorkflowState,
};
use orchestrator_registry::{InMemoryRegistry, Registry, RegistryClient};
use orchestrator_testing_utils::{MockJobCleaner, MockTaskExecutorClient, TestEnv, WorkerHeartBeatBuilder};
use std::sync::Arc;
use std::time::Duration;

pub const WAIT: Duration = Duration::from_secs(5);

pub fn master_host() -> Host {
    Host::new("127.0.0.1", 5678)
}

pub fn worker(ip: &str) -> WorkerHeartBeat {
    WorkerHeartBeatBuilder::new(ip, 1234).build()
}

pub fn test_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.dispatch.send_retry_interval_ms = 10;
    config.dispatch.dispatch_failed_backoff_ms = 50;
    config.master.command_fetch_interval_ms = 50;
    config
}

pub struct TestMaster {
    pub server: MasterServer,
    pub rpc: Arc<MasterRpcService>,
    pub client: Arc<MockTaskExecutorClient>,
    pub job_cleaner: Arc<MockJobCleaner>,
    pub registry: RegistryClient,
    pub definitions: Arc<InMemoryWorkflowDefinitionRepository>,
    pub workflow_instances: Arc<InMemoryWorkflowInstanceRepository>,
    pub task_instances: Arc<InMemoryTaskInstanceRepository>,
    pub commands: Arc<InMemoryCommandRepository>,
}

impl TestMaster {
    /// 注册给定Worker后启动Master
    pub async fn start(workers: &[WorkerHeartBeat]) -> Self {
        Self::start_with(test_config(), workers).await
    }

    pub async fn start_with(config: AppConfig, workers: &[WorkerHeartBeat]) -> Self {
        let master = Self::new(config, workers).await;
        master.server.start().await.unwrap();
        master
    }

    /// 只组装不启动，用于在启动前预置仓储或注册中心数据
    pub async fn new(config: AppConfig, workers: &[WorkerHeartBeat]) -> Self {
        let registry: Arc<dyn Registry> = Arc::new(InMemoryRegistry::new());
        let registry_client = RegistryClient::new(registry.clone(), config.registry.clone());
        for heartbeat in workers {
            registry_client.register_worker(heartbeat).await.unwrap();
        }

        let definitions = Arc::new(InMemoryWorkflowDefinitionRepository::new());
        let workflow_instances = Arc::new(InMemoryWorkflowInstanceRepository::new());
        let task_instances = Arc::new(InMemoryTaskInstanceRepository::new());
        let commands = Arc::new(InMemoryCommandRepository::new());
        let client = Arc::new(MockTaskExecutorClient::new());
        let job_cleaner = Arc::new(MockJobCleaner::new());

        let server = MasterServer::new(
            config,
            master_host(),
            MasterRepositories {
                workflow_definitions: definitions.clone(),
                workflow_instances: workflow_instances.clone(),
                task_instances: task_instances.clone(),
                commands: commands.clone(),
            },
            registry,
            client.clone(),
            job_cleaner.clone(),
        );
        Self {
            rpc: server.rpc(),
            server,
            client,
            job_cleaner,
            registry: registry_client,
            definitions,
            workflow_instances,
            task_instances,
            commands,
        }
    }

    pub async fn deploy(&self, definition: &WorkflowDefinition) {
        self.definitions.save(definition).await.unwrap();
    }

    /// 部署并触发，返回运行中的工作流
    pub async fn run(&self, definition: &WorkflowDefinition) -> Arc<WorkflowExecutionRunnable> {
        self.deploy(definition).await;
        self.trigger(&TriggerWorkflowRequest::new(definition.code)).await
    }

    pub async fn trigger(&self, request: &TriggerWorkflowRequest) -> Arc<WorkflowExecutionRunnable> {
        let id = self.rpc.trigger_workflow(request).await.unwrap();
        self.server
            .context()
            .workflow_runnables
            .get(id)
            .await
            .expect("工作流应在本Master上运行")
    }

    pub async fn task(
        &self,
        wf: &WorkflowExecutionRunnable,
        name: &str,
    ) -> Option<Arc<TaskExecutionRunnable>> {
        wf.dag().get_task_execution_runnable_by_name(name).await
    }

    /// 等待节点的当前尝试进入给定状态，返回该尝试
    pub async fn wait_task(
        &self,
        wf: &Arc<WorkflowExecutionRunnable>,
        name: &str,
        state: TaskExecutionStatus,
    ) -> Arc<TaskExecutionRunnable> {
        let reached = TestEnv::wait_for(
            || async {
                match wf.dag().get_task_execution_runnable_by_name(name).await {
                    Some(runnable) => runnable.state().await == state,
                    None => false,
                }
            },
            WAIT,
        )
        .await;
        assert!(reached, "任务 {name} 未进入 {state:?}");
        self.task(wf, name).await.unwrap()
    }

    pub async fn wait_workflow(&self, wf: &Arc<WorkflowExecutionRunnable>, state: WorkflowState) {
        let reached = TestEnv::wait_for(|| async { wf.state().await == state }, WAIT).await;
        assert!(reached, "工作流未进入 {state:?}，当前 {:?}", wf.state().await);
    }

    /// 等待工作流收尾并移出内存，返回落库的终态
    pub async fn wait_finalized(&self, wf: &Arc<WorkflowExecutionRunnable>) -> WorkflowExecutionStatus {
        let context = self.server.context().clone();
        let id = wf.id();
        let removed = TestEnv::wait_for(
            || {
                let context = context.clone();
                async move { !context.workflow_runnables.contains(id).await }
            },
            WAIT,
        )
        .await;
        assert!(removed, "工作流实例 {id} 未收尾，当前 {:?}", wf.state().await);
        assert_eq!(wf.state().await, WorkflowState::Finalized);
        self.persisted_workflow_state(id).await
    }

    pub async fn persisted_workflow_state(&self, id: i64) -> WorkflowExecutionStatus {
        self.workflow_instances
            .find_by_id(id)
            .await
            .unwrap()
            .unwrap()
            .state
    }

    /// 模拟Worker回报任务开始运行
    pub async fn report_running(&self, task: &TaskExecutionRunnable) {
        let snapshot = task.snapshot().await;
        self.rpc
            .report_task_running(TaskRunningRequest {
                task_instance_id: task.id(),
                workflow_instance_id: task.workflow_instance_id(),
                host: snapshot.host.unwrap_or_else(|| Host::new("10.0.0.1", 1234)),
                start_time: Utc::now(),
                app_ids: Vec::new(),
            })
            .await
            .unwrap();
    }

    pub async fn report_finished(&self, task: &TaskExecutionRunnable, kind: TaskFinishKind) {
        self.rpc
            .report_task_finished(
                kind,
                TaskFinishRequest {
                    task_instance_id: task.id(),
                    workflow_instance_id: task.workflow_instance_id(),
                    end_time: None,
                    cause: None,
                },
            )
            .await
            .unwrap();
    }

    /// 运行并成功结束一个已分发的任务
    pub async fn complete(&self, wf: &Arc<WorkflowExecutionRunnable>, name: &str) {
        let task = self.wait_task(wf, name, TaskExecutionStatus::Dispatched).await;
        self.report_running(&task).await;
        self.wait_task(wf, name, TaskExecutionStatus::Running).await;
        self.report_finished(&task, TaskFinishKind::Success).await;
    }

    pub async fn shutdown(self) {
        self.server.stop(Duration::from_secs(1)).await;
    }
}
