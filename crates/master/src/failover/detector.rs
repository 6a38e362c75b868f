//! 心跳过期检测
//!
//! 注册中心本身不带租约，节点停止刷新心跳后由这里删除其注册，
//! 删除产生的 Remove 事件再驱动 [`FailoverCoordinator`](super::FailoverCoordinator)。

use chrono::{DateTime, Utc};
use orchestrator_domain::Host;
use orchestrator_errors::OrchestratorResult;
use orchestrator_registry::{NodeType, RegistryClient};
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

pub struct HeartbeatExpiryDetector {
    registry_client: RegistryClient,
    master_host: Host,
    interval: Duration,
}

impl HeartbeatExpiryDetector {
    pub fn new(registry_client: RegistryClient, master_host: Host, interval: Duration) -> Self {
        Self {
            registry_client,
            master_host,
            interval,
        }
    }

    fn is_expired(&self, report_time: DateTime<Utc>) -> bool {
        !self.registry_client.is_alive(report_time)
    }

    /// 删除心跳已过期的Worker与其他Master注册，返回删除的节点数
    pub async fn sweep(&self) -> OrchestratorResult<usize> {
        let mut expired = Vec::new();
        for heartbeat in self.registry_client.worker_heartbeats().await? {
            if self.is_expired(heartbeat.report_time) {
                expired.push((NodeType::Worker, heartbeat.address(), heartbeat.report_time));
            }
        }
        for heartbeat in self.registry_client.master_heartbeats().await? {
            // 本节点的心跳由自己的上报循环负责
            if heartbeat.address() != self.master_host && self.is_expired(heartbeat.report_time) {
                expired.push((NodeType::Master, heartbeat.address(), heartbeat.report_time));
            }
        }

        let mut count = 0;
        for (node_type, host, report_time) in expired {
            if self.still_expired(node_type, &host).await? {
                warn!(
                    "{} {} 心跳过期 (上次心跳: {})，删除注册",
                    node_type,
                    host,
                    report_time.format("%Y-%m-%d %H:%M:%S UTC")
                );
                self.registry_client.unregister(node_type, &host).await?;
                count += 1;
            }
        }
        Ok(count)
    }

    /// 删除前重读一次，避开扫描期间刚刷新的心跳
    async fn still_expired(&self, node_type: NodeType, host: &Host) -> OrchestratorResult<bool> {
        let report_time = match node_type {
            NodeType::Worker => self
                .registry_client
                .worker_heartbeat(host)
                .await?
                .map(|h| h.report_time),
            NodeType::Master => self
                .registry_client
                .master_heartbeat(host)
                .await?
                .map(|h| h.report_time),
        };
        Ok(report_time.is_some_and(|t| self.is_expired(t)))
    }

    pub async fn run(self, mut shutdown_rx: broadcast::Receiver<()>) {
        let mut ticker = tokio::time::interval(self.interval);
        info!("心跳过期检测启动，间隔: {:?}", self.interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.sweep().await {
                        Ok(0) => debug!("没有过期的节点"),
                        Ok(count) => info!("删除了 {} 个过期节点", count),
                        Err(e) => error!("心跳过期检测失败: {}", e),
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("心跳过期检测停止");
                    break;
                }
            }
        }
    }
}
