//! Worker分组快照
//!
//! 快照由注册中心心跳整体重建后原子替换，选择热路径只读快照。

use orchestrator_registry::{RegistryClient, RegistryEvent};
use orchestrator_errors::OrchestratorResult;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, RwLock};
use tracing::{debug, info, warn};

use super::host_weight::HostWeight;

/// 单个Worker分组的快照
#[derive(Debug, Clone, Default)]
pub struct GroupSnapshot {
    /// 可接收任务的Worker（NORMAL且心跳未超时）
    pub available: Vec<HostWeight>,
    /// 注册在该分组下的Worker总数
    pub registered: usize,
}

pub struct WorkerGroupHostCache {
    registry_client: RegistryClient,
    snapshot: RwLock<Arc<HashMap<String, GroupSnapshot>>>,
}

impl WorkerGroupHostCache {
    pub fn new(registry_client: RegistryClient) -> Self {
        Self {
            registry_client,
            snapshot: RwLock::new(Arc::new(HashMap::new())),
        }
    }

    pub async fn snapshot(&self) -> Arc<HashMap<String, GroupSnapshot>> {
        self.snapshot.read().await.clone()
    }

    pub async fn group(&self, worker_group: &str) -> Option<GroupSnapshot> {
        self.snapshot.read().await.get(worker_group).cloned()
    }

    /// 从注册中心重建全部分组快照
    pub async fn refresh(&self) -> OrchestratorResult<()> {
        let heartbeats = self.registry_client.worker_heartbeats().await?;
        let mut groups: HashMap<String, GroupSnapshot> = HashMap::new();

        for heartbeat in &heartbeats {
            let group = groups.entry(heartbeat.worker_group.clone()).or_default();
            group.registered += 1;

            if !self.registry_client.is_alive(heartbeat.report_time) {
                debug!("Worker {} 心跳超时，不参与选择", heartbeat.address());
                continue;
            }
            if !heartbeat.server_status.is_available() {
                debug!(
                    "Worker {} 状态为 {:?}，不参与选择",
                    heartbeat.address(),
                    heartbeat.server_status
                );
                continue;
            }
            group.available.push(HostWeight::from(heartbeat));
        }

        debug!(
            "Worker分组快照已刷新: {} 个分组, {} 个Worker",
            groups.len(),
            heartbeats.len()
        );
        *self.snapshot.write().await = Arc::new(groups);
        Ok(())
    }

    /// 监听Worker节点变化并定期刷新，直到收到关闭信号
    pub async fn run(
        self: Arc<Self>,
        mut events: mpsc::Receiver<RegistryEvent>,
        refresh_interval: Duration,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) {
        info!("Worker分组快照刷新循环启动");
        let mut interval = tokio::time::interval(refresh_interval);
        let mut subscribed = true;

        loop {
            tokio::select! {
                event = events.recv(), if subscribed => {
                    match event {
                        Some(event) => {
                            debug!("Worker节点变化: {} {:?}", event.key, event.event_type);
                        }
                        None => {
                            warn!("Worker节点订阅已关闭，仅依赖定期刷新");
                            subscribed = false;
                        }
                    }
                }
                _ = interval.tick() => {}
                _ = shutdown_rx.recv() => {
                    info!("Worker分组快照刷新循环停止");
                    break;
                }
            }

            if let Err(e) = self.refresh().await {
                warn!("刷新Worker分组快照失败: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use orchestrator_config::RegistryConfig;
    use orchestrator_domain::{ServerStatus, WorkerHeartBeat};
    use orchestrator_registry::{InMemoryRegistry, Registry};

    fn heartbeat(ip: &str, group: &str, status: ServerStatus) -> WorkerHeartBeat {
        let now = Utc::now();
        WorkerHeartBeat {
            host: ip.to_string(),
            port: 1234,
            process_id: 1,
            startup_time: now,
            report_time: now,
            cpu_usage: 0.2,
            memory_usage: 0.2,
            load_average: 0.2,
            server_status: status,
            worker_group: group.to_string(),
            worker_weight: 100,
            waiting_task_count: 0,
        }
    }

    #[tokio::test]
    async fn test_refresh_excludes_unavailable_workers() {
        let registry: Arc<dyn Registry> = Arc::new(InMemoryRegistry::new());
        let client = RegistryClient::new(registry, RegistryConfig::default());
        client
            .register_worker(&heartbeat("10.0.0.1", "default", ServerStatus::Normal))
            .await
            .unwrap();
        client
            .register_worker(&heartbeat("10.0.0.2", "default", ServerStatus::Busy))
            .await
            .unwrap();
        client
            .register_worker(&heartbeat("10.0.0.3", "etl", ServerStatus::Abnormal))
            .await
            .unwrap();
        let mut stale = heartbeat("10.0.0.4", "default", ServerStatus::Normal);
        stale.report_time = Utc::now() - chrono::Duration::seconds(3600);
        client.register_worker(&stale).await.unwrap();

        let cache = WorkerGroupHostCache::new(client);
        cache.refresh().await.unwrap();

        let default = cache.group("default").await.unwrap();
        assert_eq!(default.registered, 3);
        assert_eq!(default.available.len(), 1);
        assert_eq!(default.available[0].host.ip, "10.0.0.1");

        let etl = cache.group("etl").await.unwrap();
        assert_eq!(etl.registered, 1);
        assert!(etl.available.is_empty());

        assert!(cache.group("missing").await.is_none());
    }
}
