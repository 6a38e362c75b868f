use chrono::{DateTime, Utc};
use orchestrator_config::RegistryConfig;
use orchestrator_domain::{Host, MasterHeartBeat, WorkerHeartBeat};
use orchestrator_errors::{OrchestratorError, OrchestratorResult};
use futures::FutureExt;
use serde::de::DeserializeOwned;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

use crate::paths::NodeType;
use crate::registry::{Registry, RegistryEvent};

/// Master使用的注册中心客户端
///
/// 每个客户端实例持有唯一的锁owner标识，用于区分同一地址上的新旧进程。
#[derive(Clone)]
pub struct RegistryClient {
    registry: Arc<dyn Registry>,
    config: RegistryConfig,
    lock_owner: String,
}

impl RegistryClient {
    pub fn new(registry: Arc<dyn Registry>, config: RegistryConfig) -> Self {
        Self {
            registry,
            config,
            lock_owner: uuid::Uuid::new_v4().to_string(),
        }
    }

    pub fn registry(&self) -> Arc<dyn Registry> {
        self.registry.clone()
    }

    pub fn lock_owner(&self) -> &str {
        &self.lock_owner
    }

    /// 有限次重试获取锁，超过次数返回 LockTimeout
    pub async fn acquire_lock(&self, path: &str) -> OrchestratorResult<()> {
        let attempts = self.config.lock_retry_times.max(1);
        for attempt in 1..=attempts {
            if self.registry.try_lock(path, &self.lock_owner).await? {
                debug!("获取锁成功: {}", path);
                return Ok(());
            }
            debug!("获取锁失败: {}, 第 {}/{} 次", path, attempt, attempts);
            if attempt < attempts {
                tokio::time::sleep(Duration::from_millis(self.config.lock_retry_interval_ms))
                    .await;
            }
        }
        Err(OrchestratorError::LockTimeout {
            path: path.to_string(),
        })
    }

    pub async fn try_acquire_lock(&self, path: &str) -> OrchestratorResult<bool> {
        self.registry.try_lock(path, &self.lock_owner).await
    }

    pub async fn release_lock(&self, path: &str) {
        if let Err(e) = self.registry.unlock(path, &self.lock_owner).await {
            warn!("释放锁失败: {}, 错误: {}", path, e);
        }
    }

    /// 在锁内执行 `fut`，无论返回错误还是panic都会释放锁
    pub async fn with_lock<T, Fut>(&self, path: &str, fut: Fut) -> OrchestratorResult<T>
    where
        Fut: Future<Output = OrchestratorResult<T>>,
    {
        self.acquire_lock(path).await?;
        let outcome = AssertUnwindSafe(fut).catch_unwind().await;
        self.release_lock(path).await;
        match outcome {
            Ok(result) => result,
            Err(panic) => {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                error!("持有锁 {} 时发生panic: {}", path, message);
                Err(OrchestratorError::Internal(format!(
                    "持有锁 {path} 时发生panic: {message}"
                )))
            }
        }
    }

    pub async fn register_master(&self, heartbeat: &MasterHeartBeat) -> OrchestratorResult<()> {
        let value = serde_json::to_string(heartbeat)?;
        self.registry
            .put(&NodeType::Master.node_key(&heartbeat.address()), &value)
            .await
    }

    pub async fn register_worker(&self, heartbeat: &WorkerHeartBeat) -> OrchestratorResult<()> {
        let value = serde_json::to_string(heartbeat)?;
        self.registry
            .put(&NodeType::Worker.node_key(&heartbeat.address()), &value)
            .await
    }

    pub async fn unregister(&self, node_type: NodeType, host: &Host) -> OrchestratorResult<()> {
        self.registry.delete(&node_type.node_key(host)).await
    }

    pub async fn node_exists(&self, node_type: NodeType, host: &Host) -> OrchestratorResult<bool> {
        self.registry.exists(&node_type.node_key(host)).await
    }

    pub async fn subscribe(&self, node_type: NodeType) -> OrchestratorResult<mpsc::Receiver<RegistryEvent>> {
        self.registry.subscribe(node_type.node_path()).await
    }

    pub async fn master_heartbeat(&self, host: &Host) -> OrchestratorResult<Option<MasterHeartBeat>> {
        self.read_heartbeat(&NodeType::Master.node_key(host)).await
    }

    pub async fn worker_heartbeat(&self, host: &Host) -> OrchestratorResult<Option<WorkerHeartBeat>> {
        self.read_heartbeat(&NodeType::Worker.node_key(host)).await
    }

    pub async fn master_heartbeats(&self) -> OrchestratorResult<Vec<MasterHeartBeat>> {
        self.read_all(NodeType::Master).await
    }

    pub async fn worker_heartbeats(&self) -> OrchestratorResult<Vec<WorkerHeartBeat>> {
        self.read_all(NodeType::Worker).await
    }

    /// 节点启动时间，节点不存在时返回None
    pub async fn node_startup_time(
        &self,
        node_type: NodeType,
        host: &Host,
    ) -> OrchestratorResult<Option<DateTime<Utc>>> {
        Ok(match node_type {
            NodeType::Master => self.master_heartbeat(host).await?.map(|h| h.startup_time),
            NodeType::Worker => self.worker_heartbeat(host).await?.map(|h| h.startup_time),
        })
    }

    /// 心跳是否在超时时间内刷新过
    pub fn is_alive(&self, report_time: DateTime<Utc>) -> bool {
        let elapsed = Utc::now().signed_duration_since(report_time);
        elapsed.num_seconds() <= self.config.heartbeat_timeout_seconds as i64
    }

    async fn read_heartbeat<T: DeserializeOwned>(&self, key: &str) -> OrchestratorResult<Option<T>> {
        match self.registry.get(key).await? {
            Some(value) => Ok(Some(serde_json::from_str(&value)?)),
            None => Ok(None),
        }
    }

    async fn read_all<T: DeserializeOwned>(&self, node_type: NodeType) -> OrchestratorResult<Vec<T>> {
        let mut heartbeats = Vec::new();
        for child in self.registry.children(node_type.node_path()).await? {
            let key = format!("{}/{}", node_type.node_path(), child);
            match self.read_heartbeat::<T>(&key).await {
                Ok(Some(heartbeat)) => heartbeats.push(heartbeat),
                Ok(None) => {}
                Err(e) => warn!("解析心跳失败: {}, 错误: {}", key, e),
            }
        }
        Ok(heartbeats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryRegistry;
    use orchestrator_domain::ServerStatus;

    fn client(registry: Arc<dyn Registry>) -> RegistryClient {
        RegistryClient::new(
            registry,
            RegistryConfig {
                lock_retry_times: 2,
                lock_retry_interval_ms: 10,
                ..RegistryConfig::default()
            },
        )
    }

    fn worker(ip: &str) -> WorkerHeartBeat {
        let now = Utc::now();
        WorkerHeartBeat {
            host: ip.to_string(),
            port: 1234,
            process_id: 1,
            startup_time: now,
            report_time: now,
            cpu_usage: 0.1,
            memory_usage: 0.1,
            load_average: 0.1,
            server_status: ServerStatus::Normal,
            worker_group: "default".to_string(),
            worker_weight: 100,
            waiting_task_count: 0,
        }
    }

    #[tokio::test]
    async fn test_lock_contention_times_out() {
        let registry: Arc<dyn Registry> = Arc::new(InMemoryRegistry::new());
        let first = client(registry.clone());
        let second = client(registry);

        first.acquire_lock("/lock/failover/worker").await.unwrap();
        let err = second
            .acquire_lock("/lock/failover/worker")
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::LockTimeout { .. }));
        assert!(err.is_retryable());

        first.release_lock("/lock/failover/worker").await;
        second.acquire_lock("/lock/failover/worker").await.unwrap();
    }

    #[tokio::test]
    async fn test_with_lock_releases_on_error() {
        let registry: Arc<dyn Registry> = Arc::new(InMemoryRegistry::new());
        let first = client(registry.clone());
        let second = client(registry);

        let result: OrchestratorResult<()> = first
            .with_lock("/lock/failover/master", async {
                Err(OrchestratorError::Internal("失败".to_string()))
            })
            .await;
        assert!(result.is_err());
        second.acquire_lock("/lock/failover/master").await.unwrap();
    }

    #[tokio::test]
    async fn test_with_lock_releases_on_panic() {
        let registry: Arc<dyn Registry> = Arc::new(InMemoryRegistry::new());
        let first = client(registry.clone());
        let second = client(registry);

        let interrupted = true;
        let result: OrchestratorResult<usize> = first
            .with_lock("/lock/failover/worker", async move {
                if interrupted {
                    panic!("容错中断");
                }
                Ok(0)
            })
            .await;
        let err = result.unwrap_err();
        assert!(matches!(err, OrchestratorError::Internal(ref m) if m.contains("容错中断")));
        second.acquire_lock("/lock/failover/worker").await.unwrap();
    }

    #[tokio::test]
    async fn test_with_lock_returns_value() {
        let registry: Arc<dyn Registry> = Arc::new(InMemoryRegistry::new());
        let client = client(registry);

        let value = client
            .with_lock("/lock/masters", async { Ok(7) })
            .await
            .unwrap();
        assert_eq!(value, 7);
        client.acquire_lock("/lock/masters").await.unwrap();
    }

    #[tokio::test]
    async fn test_worker_heartbeats_round_trip() {
        let registry: Arc<dyn Registry> = Arc::new(InMemoryRegistry::new());
        let client = client(registry.clone());

        client.register_worker(&worker("10.0.0.1")).await.unwrap();
        client.register_worker(&worker("10.0.0.2")).await.unwrap();
        // 无法解析的值被跳过
        registry.put("/nodes/worker/bad:1", "not-json").await.unwrap();

        let heartbeats = client.worker_heartbeats().await.unwrap();
        assert_eq!(heartbeats.len(), 2);

        let host = Host::new("10.0.0.1", 1234);
        assert!(client.node_exists(NodeType::Worker, &host).await.unwrap());
        assert!(client
            .node_startup_time(NodeType::Worker, &host)
            .await
            .unwrap()
            .is_some());

        client.unregister(NodeType::Worker, &host).await.unwrap();
        assert!(!client.node_exists(NodeType::Worker, &host).await.unwrap());
    }

    #[test]
    fn test_is_alive() {
        let registry: Arc<dyn Registry> = Arc::new(InMemoryRegistry::new());
        let client = client(registry);
        assert!(client.is_alive(Utc::now()));
        assert!(!client.is_alive(Utc::now() - chrono::Duration::seconds(3600)));
    }
}
