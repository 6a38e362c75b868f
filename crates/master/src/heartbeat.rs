//! Master心跳上报

use chrono::{DateTime, Utc};
use orchestrator_domain::{MasterHeartBeat, ServerStatus};
use orchestrator_registry::RegistryClient;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::context::MasterContext;

/// 本机资源采样
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SystemUsage {
    pub cpu_usage: f64,
    pub memory_usage: f64,
    pub load_average: f64,
}

impl SystemUsage {
    /// Linux上读取 /proc，其余平台返回0
    pub fn sample() -> Self {
        #[cfg(target_os = "linux")]
        {
            let cpus = std::thread::available_parallelism()
                .map(|n| n.get() as f64)
                .unwrap_or(1.0);
            let load_average = read_load_average().unwrap_or(0.0);
            Self {
                cpu_usage: (load_average / cpus).min(1.0),
                memory_usage: read_memory_usage().unwrap_or(0.0),
                load_average,
            }
        }
        #[cfg(not(target_os = "linux"))]
        {
            Self::default()
        }
    }
}

#[cfg(target_os = "linux")]
fn read_load_average() -> Option<f64> {
    let content = std::fs::read_to_string("/proc/loadavg").ok()?;
    content.split_whitespace().next()?.parse().ok()
}

#[cfg(target_os = "linux")]
fn read_memory_usage() -> Option<f64> {
    let content = std::fs::read_to_string("/proc/meminfo").ok()?;
    let field = |name: &str| -> Option<f64> {
        content
            .lines()
            .find(|line| line.starts_with(name))?
            .split_whitespace()
            .nth(1)?
            .parse()
            .ok()
    };
    let total = field("MemTotal:")?;
    let available = field("MemAvailable:")?;
    if total <= 0.0 {
        return None;
    }
    Some(((total - available) / total).clamp(0.0, 1.0))
}

/// 运行中工作流达到上限时上报BUSY，命令消费随之暂停领取
pub fn server_status(running_workflows: usize, max_running_workflows: usize) -> ServerStatus {
    if running_workflows >= max_running_workflows {
        ServerStatus::Busy
    } else {
        ServerStatus::Normal
    }
}

pub struct MasterHeartBeatReporter {
    registry_client: RegistryClient,
    context: Arc<MasterContext>,
    startup_time: DateTime<Utc>,
    interval: Duration,
}

impl MasterHeartBeatReporter {
    pub fn new(
        registry_client: RegistryClient,
        context: Arc<MasterContext>,
        startup_time: DateTime<Utc>,
        interval: Duration,
    ) -> Self {
        Self {
            registry_client,
            context,
            startup_time,
            interval,
        }
    }

    pub fn build(&self, usage: SystemUsage, running_workflows: usize) -> MasterHeartBeat {
        let host = &self.context.master_host;
        MasterHeartBeat {
            host: host.ip.clone(),
            port: host.port,
            process_id: std::process::id(),
            startup_time: self.startup_time,
            report_time: Utc::now(),
            cpu_usage: usage.cpu_usage,
            memory_usage: usage.memory_usage,
            load_average: usage.load_average,
            server_status: server_status(
                running_workflows,
                self.context.master_config.max_running_workflows,
            ),
        }
    }

    pub async fn report(&self) -> orchestrator_errors::OrchestratorResult<()> {
        let running = self.context.workflow_runnables.len().await;
        let heartbeat = self.build(SystemUsage::sample(), running);
        if heartbeat.server_status == ServerStatus::Busy {
            debug!("Master {} 运行中工作流 {} 个，上报BUSY", self.context.master_host, running);
        }
        self.registry_client.register_master(&heartbeat).await
    }

    pub async fn run(self, mut shutdown_rx: broadcast::Receiver<()>) {
        let mut ticker = tokio::time::interval(self.interval);
        info!("Master心跳上报启动，间隔: {:?}", self.interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.report().await {
                        Ok(()) => debug!("Master {} 心跳已上报", self.context.master_host),
                        Err(e) => warn!("Master {} 心跳上报失败: {}", self.context.master_host, e),
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Master心跳上报停止");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_busy_when_running_workflows_reach_limit() {
        assert_eq!(server_status(0, 10), ServerStatus::Normal);
        assert_eq!(server_status(9, 10), ServerStatus::Normal);
        assert_eq!(server_status(10, 10), ServerStatus::Busy);
    }

    #[test]
    fn test_sampled_usage_is_bounded() {
        let usage = SystemUsage::sample();
        assert!((0.0..=1.0).contains(&usage.cpu_usage));
        assert!((0.0..=1.0).contains(&usage.memory_usage));
        assert!(usage.load_average >= 0.0);
    }
}
