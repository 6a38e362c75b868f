//! Master服务组装与生命周期

use chrono::{DateTime, Utc};
use orchestrator_config::AppConfig;
use orchestrator_domain::{
    CommandRepository, ExternalJobCleaner, Host, TaskExecutorClient, TaskInstanceRepository,
    WorkflowDefinitionRepository, WorkflowInstanceRepository,
};
use orchestrator_errors::OrchestratorResult;
use orchestrator_registry::{NodeType, Registry, RegistryClient};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::command::{CommandConsumer, WorkflowTrigger};
use crate::context::MasterContext;
use crate::dispatch::{TaskDispatchQueue, TaskDispatchWorker, TaskDispatcher};
use crate::event_bus::WorkflowEventBusCoordinator;
use crate::failover::{FailoverCoordinator, HeartbeatExpiryDetector};
use crate::heartbeat::MasterHeartBeatReporter;
use crate::metrics::MasterMetrics;
use crate::repository::WorkflowExecutionRunnableRepository;
use crate::rpc::MasterRpcService;
use crate::selector::{HostSelector, WorkerGroupHostCache};

/// Master使用的全部仓储
#[derive(Clone)]
pub struct MasterRepositories {
    pub workflow_definitions: Arc<dyn WorkflowDefinitionRepository>,
    pub workflow_instances: Arc<dyn WorkflowInstanceRepository>,
    pub task_instances: Arc<dyn TaskInstanceRepository>,
    pub commands: Arc<dyn CommandRepository>,
}

pub struct MasterServer {
    config: AppConfig,
    context: Arc<MasterContext>,
    registry_client: RegistryClient,
    host_cache: Arc<WorkerGroupHostCache>,
    rpc: Arc<MasterRpcService>,
    failover: Arc<FailoverCoordinator>,
    dispatch_worker: Arc<TaskDispatchWorker>,
    command_consumer: Arc<CommandConsumer>,
    startup_time: DateTime<Utc>,
    shutdown_tx: broadcast::Sender<()>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl MasterServer {
    pub fn new(
        config: AppConfig,
        master_host: Host,
        repositories: MasterRepositories,
        registry: Arc<dyn Registry>,
        executor_client: Arc<dyn TaskExecutorClient>,
        job_cleaner: Arc<dyn ExternalJobCleaner>,
    ) -> Self {
        let startup_time = Utc::now();
        let registry_client = RegistryClient::new(registry, config.registry.clone());
        let metrics = Arc::new(MasterMetrics::new());

        let context = Arc::new(MasterContext {
            master_host,
            master_config: config.master.clone(),
            dispatch_config: config.dispatch.clone(),
            workflow_definition_repository: repositories.workflow_definitions,
            workflow_instance_repository: repositories.workflow_instances,
            task_instance_repository: repositories.task_instances,
            command_repository: repositories.commands,
            workflow_runnables: Arc::new(WorkflowExecutionRunnableRepository::new()),
            dispatch_queue: Arc::new(TaskDispatchQueue::new()),
            executor_client: executor_client.clone(),
            metrics: metrics.clone(),
        });

        let host_cache = Arc::new(WorkerGroupHostCache::new(registry_client.clone()));
        let selector = Arc::new(HostSelector::from_type(
            host_cache.clone(),
            config.dispatch.host_selector,
        ));
        let dispatcher = Arc::new(TaskDispatcher::new(
            selector,
            executor_client,
            config.dispatch.clone(),
            metrics,
        ));
        let dispatch_worker = Arc::new(TaskDispatchWorker::new(context.clone(), dispatcher));

        let event_bus = Arc::new(WorkflowEventBusCoordinator::new(context.clone()));
        let trigger = Arc::new(WorkflowTrigger::new(context.clone(), event_bus));
        let rpc = Arc::new(MasterRpcService::new(
            context.clone(),
            trigger.clone(),
            registry_client.clone(),
        ));
        let command_consumer = Arc::new(CommandConsumer::new(context.clone(), trigger));
        let failover = Arc::new(FailoverCoordinator::new(
            context.clone(),
            registry_client.clone(),
            job_cleaner,
            config.failover.clone(),
            startup_time,
        ));
        let (shutdown_tx, _) = broadcast::channel(16);

        Self {
            config,
            context,
            registry_client,
            host_cache,
            rpc,
            failover,
            dispatch_worker,
            command_consumer,
            startup_time,
            shutdown_tx,
            handles: Mutex::new(Vec::new()),
        }
    }

    pub fn context(&self) -> &Arc<MasterContext> {
        &self.context
    }

    pub fn rpc(&self) -> Arc<MasterRpcService> {
        self.rpc.clone()
    }

    pub fn failover(&self) -> &Arc<FailoverCoordinator> {
        &self.failover
    }

    pub fn registry_client(&self) -> &RegistryClient {
        &self.registry_client
    }

    pub fn startup_time(&self) -> DateTime<Utc> {
        self.startup_time
    }

    /// 启动自检、注册并拉起后台循环
    pub async fn start(&self) -> OrchestratorResult<()> {
        let host = self.context.master_host.clone();
        info!("Master {} 启动中", host);

        // 自检会清理本地址上一个进程的注册，必须先于注册本节点
        self.failover.self_tolerance().await?;

        let reporter = MasterHeartBeatReporter::new(
            self.registry_client.clone(),
            self.context.clone(),
            self.startup_time,
            Duration::from_secs(self.config.master.heartbeat_interval_seconds),
        );
        reporter.report().await?;
        self.host_cache.refresh().await?;
        let detector = HeartbeatExpiryDetector::new(
            self.registry_client.clone(),
            host.clone(),
            Duration::from_millis(self.config.registry.expiry_check_interval_ms),
        );

        let cache_events = self.registry_client.subscribe(NodeType::Worker).await?;
        let master_events = self.registry_client.subscribe(NodeType::Master).await?;
        let worker_events = self.registry_client.subscribe(NodeType::Worker).await?;

        let mut handles = self.handles.lock().await;
        handles.push(tokio::spawn(reporter.run(self.shutdown_tx.subscribe())));
        handles.push(tokio::spawn(self.host_cache.clone().run(
            cache_events,
            Duration::from_secs(self.config.dispatch.worker_refresh_interval_seconds),
            self.shutdown_tx.subscribe(),
        )));
        handles.push(tokio::spawn(
            self.dispatch_worker
                .clone()
                .run(self.shutdown_tx.subscribe()),
        ));
        handles.push(tokio::spawn(
            self.command_consumer
                .clone()
                .run(self.shutdown_tx.subscribe()),
        ));
        handles.push(tokio::spawn(self.failover.clone().run(
            master_events,
            worker_events,
            self.shutdown_tx.subscribe(),
        )));
        handles.push(tokio::spawn(detector.run(self.shutdown_tx.subscribe())));

        info!("Master {} 已启动", host);
        Ok(())
    }

    /// 通知后台循环退出并在超时内等待，随后从注册中心注销
    pub async fn stop(&self, timeout: Duration) {
        info!("Master {} 停止中", self.context.master_host);
        let _ = self.shutdown_tx.send(());

        let handles: Vec<_> = self.handles.lock().await.drain(..).collect();
        let joined = tokio::time::timeout(timeout, futures::future::join_all(handles)).await;
        if joined.is_err() {
            warn!("等待后台任务退出超时 {:?}", timeout);
        }

        if let Err(e) = self
            .registry_client
            .unregister(NodeType::Master, &self.context.master_host)
            .await
        {
            warn!("注销Master失败: {}", e);
        }
        info!(
            "Master {} 已停止，仍有 {} 个工作流实例在内存中",
            self.context.master_host,
            self.context.workflow_runnables.len().await
        );
    }
}
