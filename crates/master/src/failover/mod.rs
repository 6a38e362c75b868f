//! 节点失效容错
//!
//! 订阅注册中心的Master与Worker节点变更，节点被删除时在对应类型的全局锁内
//! 接管其工作：Worker失效时重新分发其上的任务，Master失效时把其负责的
//! 工作流实例转为容错恢复命令。

use chrono::{DateTime, Utc};
use orchestrator_config::FailoverConfig;
use orchestrator_domain::{
    Command, CommandType, ExternalJobCleaner, Host, TaskInstance, WorkflowExecutionStatus,
    WorkflowInstance,
};
use orchestrator_errors::OrchestratorResult;
use orchestrator_registry::{paths::MASTERS_LOCK, NodeType, RegistryClient, RegistryEvent, RegistryEventType};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};

use crate::context::MasterContext;
use crate::events::TaskLifecycleEvent;

mod detector;

pub use detector::HeartbeatExpiryDetector;

/// Worker上的任务是否需要容错：Worker已不在注册中心，或任务早于Worker
/// 本次启动就已开始（未启动的任务使用提交时间）
pub fn should_failover_task(task: &TaskInstance, worker_startup: Option<DateTime<Utc>>) -> bool {
    match worker_startup {
        None => true,
        Some(startup) => task.effective_start_time() < startup,
    }
}

/// Master负责的工作流是否需要容错
pub fn should_failover_workflow(
    instance: &WorkflowInstance,
    master_startup: Option<DateTime<Utc>>,
) -> bool {
    if instance.history_marker.is_some() || instance.state.is_finished() {
        return false;
    }
    match (master_startup, instance.effective_start_time()) {
        (Some(startup), Some(started)) => started < startup,
        _ => true,
    }
}

pub struct FailoverCoordinator {
    context: Arc<MasterContext>,
    registry_client: RegistryClient,
    job_cleaner: Arc<dyn ExternalJobCleaner>,
    config: FailoverConfig,
    startup_time: DateTime<Utc>,
}

impl FailoverCoordinator {
    pub fn new(
        context: Arc<MasterContext>,
        registry_client: RegistryClient,
        job_cleaner: Arc<dyn ExternalJobCleaner>,
        config: FailoverConfig,
        startup_time: DateTime<Utc>,
    ) -> Self {
        Self {
            context,
            registry_client,
            job_cleaner,
            config,
            startup_time,
        }
    }

    /// 消费注册中心变更直到关闭信号或两个订阅都结束
    pub async fn run(
        self: Arc<Self>,
        mut master_rx: mpsc::Receiver<RegistryEvent>,
        mut worker_rx: mpsc::Receiver<RegistryEvent>,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) {
        info!("容错协调器启动");
        let mut master_open = true;
        let mut worker_open = true;

        while master_open || worker_open {
            tokio::select! {
                event = master_rx.recv(), if master_open => match event {
                    Some(event) => self.handle_registry_event(event).await,
                    None => master_open = false,
                },
                event = worker_rx.recv(), if worker_open => match event {
                    Some(event) => self.handle_registry_event(event).await,
                    None => worker_open = false,
                },
                _ = shutdown_rx.recv() => break,
            }
        }
        info!("容错协调器停止");
    }

    async fn handle_registry_event(&self, event: RegistryEvent) {
        if event.event_type != RegistryEventType::Remove {
            return;
        }
        let Some((node_type, host)) = NodeType::parse_key(&event.key) else {
            debug!("忽略无法解析的注册中心key: {}", event.key);
            return;
        };
        if !self.config.enabled {
            info!("{} {} 已下线，容错未开启", node_type, host);
            return;
        }

        let result = match node_type {
            NodeType::Master if host == self.context.master_host => {
                warn!("注册中心中本Master节点被删除: {}", host);
                return;
            }
            NodeType::Master => self.failover_master(&host).await,
            NodeType::Worker => self.failover_worker(&host).await,
        };
        if let Err(e) = result {
            error!("{} {} 容错失败: {}", node_type, host, e);
        }
    }

    async fn with_lock<Fut>(&self, node_type: NodeType, fut: Fut) -> OrchestratorResult<usize>
    where
        Fut: Future<Output = OrchestratorResult<usize>>,
    {
        self.registry_client
            .with_lock(node_type.failover_lock_path(), fut)
            .await
    }

    /// Worker失效：本Master负责的工作流中分配在该Worker上的任务重新分发，
    /// 返回容错的任务数
    pub async fn failover_worker(&self, host: &Host) -> OrchestratorResult<usize> {
        self.with_lock(NodeType::Worker, self.failover_worker_tasks(host))
            .await
    }

    async fn failover_worker_tasks(&self, host: &Host) -> OrchestratorResult<usize> {
        let startup = self
            .registry_client
            .node_startup_time(NodeType::Worker, host)
            .await?;
        let tasks = self
            .context
            .task_instance_repository
            .query_need_failover_task_instances(host)
            .await?;
        info!("Worker {} 失效，待检查任务 {} 个", host, tasks.len());

        let mut count = 0;
        for task in tasks {
            if !should_failover_task(&task, startup) {
                debug!("任务实例 {} 在Worker重启后提交，无需容错", task.id);
                continue;
            }
            let Some(wf) = self
                .context
                .workflow_runnables
                .get(task.workflow_instance_id)
                .await
            else {
                debug!(
                    "任务实例 {} 所属工作流实例 {} 不在本Master上",
                    task.id, task.workflow_instance_id
                );
                continue;
            };

            if self.config.kill_yarn_job_when_failover && !task.app_ids.is_empty() {
                if let Err(e) = self.job_cleaner.kill_applications(&task.app_ids).await {
                    warn!("终止任务实例 {} 的外部作业失败: {}", task.id, e);
                }
            }
            match wf.publish(TaskLifecycleEvent::Failover {
                task_instance_id: task.id,
            }) {
                Ok(()) => count += 1,
                Err(e) => warn!("任务实例 {} 容错事件发布失败: {}", task.id, e),
            }
        }
        info!("Worker {} 容错完成，重新分发任务 {} 个", host, count);
        Ok(count)
    }

    /// Master失效：其负责的未结束工作流转为容错恢复命令，返回处理的实例数
    pub async fn failover_master(&self, host: &Host) -> OrchestratorResult<usize> {
        self.with_lock(NodeType::Master, async {
            let startup = self
                .registry_client
                .node_startup_time(NodeType::Master, host)
                .await?;
            self.failover_workflows(host, startup).await
        })
        .await
    }

    async fn failover_workflows(
        &self,
        host: &Host,
        startup: Option<DateTime<Utc>>,
    ) -> OrchestratorResult<usize> {
        let instances = self
            .context
            .workflow_instance_repository
            .query_need_failover_workflow_instances(host)
            .await?;
        info!("Master {} 失效，待检查工作流实例 {} 个", host, instances.len());

        let mut count = 0;
        for instance in instances {
            if !should_failover_workflow(&instance, startup) {
                continue;
            }
            if self.context.workflow_runnables.contains(instance.id).await {
                continue;
            }
            match self.failover_workflow(instance).await {
                Ok(id) => {
                    count += 1;
                    info!("工作流实例 {} 已转为容错恢复命令", id);
                }
                Err(e) => error!("工作流实例容错失败: {}", e),
            }
        }
        Ok(count)
    }

    async fn failover_workflow(&self, mut instance: WorkflowInstance) -> OrchestratorResult<i64> {
        instance.host = None;
        instance.state = WorkflowExecutionStatus::Failover;
        self.context
            .workflow_instance_repository
            .update(&instance)
            .await?;
        self.context
            .command_repository
            .insert(&Command::recover(CommandType::RecoverTolerantFault, &instance))
            .await?;
        self.context.metrics.record_workflow_failover();
        Ok(instance.id)
    }

    /// 启动自检：集群中没有其他存活Master时，清理过期注册并接管
    /// 本地址上一个进程以及其他失效Master遗留的工作流
    pub async fn self_tolerance(&self) -> OrchestratorResult<()> {
        self.registry_client
            .with_lock(MASTERS_LOCK, self.self_tolerance_locked())
            .await
    }

    async fn self_tolerance_locked(&self) -> OrchestratorResult<()> {
        let me = &self.context.master_host;
        let masters = self.registry_client.master_heartbeats().await?;
        let others_alive = masters
            .iter()
            .any(|m| m.address() != *me && self.registry_client.is_alive(m.report_time));
        if others_alive {
            debug!("存在其他存活的Master，跳过启动自检");
            return Ok(());
        }

        info!("没有其他存活的Master，执行启动自检");
        let mut stale_masters = Vec::new();
        for master in &masters {
            let host = master.address();
            self.registry_client.unregister(NodeType::Master, &host).await?;
            if host != *me {
                stale_masters.push(host);
            }
        }
        for worker in self.registry_client.worker_heartbeats().await? {
            if !self.registry_client.is_alive(worker.report_time) {
                info!("清理过期的Worker注册: {}", worker.address());
                self.registry_client
                    .unregister(NodeType::Worker, &worker.address())
                    .await?;
            }
        }

        if !self.config.enabled {
            return Ok(());
        }
        self.with_lock(NodeType::Master, async {
            let mut count = self.failover_workflows(me, Some(self.startup_time)).await?;
            for host in &stale_masters {
                count += self.failover_workflows(host, None).await?;
            }
            Ok(count)
        })
        .await
        .map(|_| ())
    }
}
